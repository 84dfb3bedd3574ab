//! Splitting the document into finalized text and attributed composition.
//!
//! The document is walked as a partition by the composing flag. Composing
//! spans are further split by display-attribute properties; runs inside a
//! composing span that carry no attribute become pieces with
//! [`AttributeId::NONE`]. Every piece then lands on one side of the
//! determined-text boundary: pieces starting before it are finalized, the
//! rest are composition.
//!
//! Segmentation never mutates the document. Finalized ranges are returned so
//! the caller can erase them once the whole walk succeeded.

use crate::attributes::{AttributeId, AttributeRegistry, DisplayAttributeResolver};
use crate::composition::CompositionOutput;
use crate::context::{EditCookie, PropertyId, TextContext};
use crate::error::{Error, Result};
use crate::range::{read_chunked, Anchor, TextRange};
use crate::reconcile::no_attribute_subrange;
use std::cmp::Ordering;
use tracing::{debug, error};

/// Result of one segmentation walk.
#[derive(Debug, Clone)]
pub struct Segmentation<R> {
    pub output: CompositionOutput,
    /// Finalized ranges in document order, to be erased by the caller.
    pub finalized: Vec<R>,
    /// Characters of finalized text left in place because the session could
    /// not write.
    pub retained: usize,
}

impl<R> Default for Segmentation<R> {
    fn default() -> Self {
        Self {
            output: CompositionOutput::default(),
            finalized: Vec::new(),
            retained: 0,
        }
    }
}

pub struct CompositionSegmenter<'r, 'g, G: ?Sized> {
    resolver: &'r DisplayAttributeResolver<'g, G>,
    chunk: usize,
}

impl<'r, 'g, G: AttributeRegistry + ?Sized> CompositionSegmenter<'r, 'g, G> {
    /// `chunk` bounds how many characters are read per call.
    pub fn new(resolver: &'r DisplayAttributeResolver<'g, G>, chunk: usize) -> Self {
        Self {
            resolver,
            chunk: chunk.max(1),
        }
    }

    /// Segments `range`.
    ///
    /// Under a read-only cookie finalized pieces cannot be erased, so they are
    /// counted in [`Segmentation::retained`] and not reported at all.
    pub fn segment<C: TextContext + ?Sized>(
        &self,
        ctx: &C,
        ec: EditCookie,
        range: &C::Range,
    ) -> Result<Segmentation<C::Range>> {
        let boundary = no_attribute_subrange(ctx, ec, range, &[PropertyId::COMPOSING])?;
        let mut seg = Segmentation::default();

        for span in ctx.property_spans(ec, &[PropertyId::COMPOSING], range)? {
            if !span.is_set(PropertyId::COMPOSING) {
                self.take_piece(ec, &boundary, span.range, AttributeId::NONE, &mut seg)?;
                continue;
            }

            let ids = self.resolver.property_ids();
            if ids.is_empty() {
                self.take_piece(ec, &boundary, span.range, AttributeId::NONE, &mut seg)?;
                continue;
            }
            for piece in ctx.property_spans(ec, ids, &span.range)? {
                let attribute = self.resolver.attribute_for(&piece);
                self.take_piece(ec, &boundary, piece.range, attribute, &mut seg)?;
            }
        }
        Ok(seg)
    }

    /// Segments an interim composition.
    ///
    /// Everything before `interim` is finalized outright. `total` is the full
    /// document length and must leave at least one character once the
    /// interim placeholder is discounted. The interim range itself is
    /// segmented normally. The output carries no cursor.
    pub fn segment_interim<C: TextContext + ?Sized>(
        &self,
        ctx: &C,
        ec: EditCookie,
        full: &C::Range,
        total: usize,
        interim: &C::Range,
    ) -> Result<Segmentation<C::Range>> {
        if full.compare_start(ec, interim, Anchor::Start)? == Ordering::Greater
            || full.compare_end(ec, interim, Anchor::End)? == Ordering::Less
        {
            error!(total, "interim range outside the composition");
            return Err(Error::InterimOutOfBounds);
        }

        let mut seg = Segmentation::default();
        if full.compare_start(ec, interim, Anchor::Start)? == Ordering::Less {
            if total.saturating_sub(1) == 0 {
                error!(total, "interim prefix has no text");
                return Err(Error::EmptyInterimPrefix);
            }
            let mut prefix = full.clone();
            prefix.shift_end_to(ec, interim, Anchor::Start)?;

            let text = read_chunked(&mut prefix.clone(), ec, self.chunk)?;
            if ec.is_writable() {
                seg.output.push_result(&text);
                seg.finalized.push(prefix);
            } else {
                debug!("read-only pass leaves interim prefix in place");
                seg.retained += text.chars().count();
            }
        }

        let inner = self.segment(ctx, ec, interim)?;
        seg.output.push_result(&inner.output.result);
        seg.output.composition = inner.output.composition;
        seg.output.attributes = inner.output.attributes;
        seg.finalized.extend(inner.finalized);
        seg.retained += inner.retained;
        Ok(seg)
    }

    fn take_piece<R: TextRange>(
        &self,
        ec: EditCookie,
        boundary: &R,
        piece: R,
        attribute: AttributeId,
        seg: &mut Segmentation<R>,
    ) -> Result<()> {
        if piece.is_empty(ec)? {
            return Ok(());
        }
        let finalized = boundary.compare_start(ec, &piece, Anchor::Start)? == Ordering::Greater;
        let mut reader = piece.clone();
        let text = read_chunked(&mut reader, ec, self.chunk)?;

        if !finalized {
            seg.output.push_composition(&text, attribute);
        } else if ec.is_writable() {
            seg.output.push_result(&text);
            seg.finalized.push(piece);
        } else {
            debug!("read-only pass leaves finalized text in place");
            seg.retained += text.chars().count();
        }
        Ok(())
    }
}
