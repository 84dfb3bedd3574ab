//! Range arithmetic shared by the reconciliation passes.

use crate::context::{EditCookie, EditRecord, PropertyId, TextContext};
use crate::error::Result;
use crate::range::{Anchor, Halt, TextRange};
use std::cmp::Ordering;
use tracing::{debug, warn};

/// Range from the document start to its end (or to `halt`), with its length
/// in characters.
pub fn full_document_range<C: TextContext + ?Sized>(
    ctx: &C,
    ec: EditCookie,
    halt: Option<Halt<'_, C::Range>>,
) -> Result<(C::Range, usize)> {
    let mut range = ctx.start(ec)?;
    let moved = range.shift_end(ec, isize::MAX, halt)?;
    Ok((range, usize::try_from(moved).unwrap_or(0)))
}

/// Outcome of skipping an already committed prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixAdjustment {
    /// Characters left in the range.
    pub remaining: usize,
    /// Characters actually skipped.
    pub completed: usize,
}

/// Moves `range`'s start past `completed` characters committed earlier.
///
/// Only a prefix strictly shorter than the range is skipped. Otherwise the
/// range is left alone and the prefix is treated as already gone.
pub fn adjust_for_completed_prefix<R: TextRange>(
    range: &mut R,
    ec: EditCookie,
    total: usize,
    completed: usize,
) -> PrefixAdjustment {
    let unchanged = PrefixAdjustment {
        remaining: total,
        completed: 0,
    };
    if completed == 0 || completed >= total {
        return unchanged;
    }

    let mut shifted = range.clone();
    match shifted.shift_start(ec, completed as isize, None) {
        Ok(moved) if moved > 0 && (moved as usize) < total => {
            *range = shifted;
            PrefixAdjustment {
                remaining: total - moved as usize,
                completed: moved as usize,
            }
        }
        Ok(moved) => {
            debug!(moved, completed, "committed prefix could not be skipped");
            unchanged
        }
        Err(e) => {
            warn!(error = %e, "failed to skip committed prefix");
            unchanged
        }
    }
}

/// Where determined text ends.
///
/// Returns the part of `range` from the first character carrying any of
/// `ids` to the end of `range`. Everything before its start is determined
/// text. If no character carries the properties the result is collapsed at
/// `range`'s end.
pub fn no_attribute_subrange<C: TextContext + ?Sized>(
    ctx: &C,
    ec: EditCookie,
    range: &C::Range,
    ids: &[PropertyId],
) -> Result<C::Range> {
    let mut boundary = range.clone();
    for span in ctx.property_spans(ec, ids, range)? {
        if ids.iter().any(|id| span.is_set(*id)) {
            boundary.shift_start_to(ec, &span.range, Anchor::Start)?;
            return Ok(boundary);
        }
    }
    boundary.collapse(ec, Anchor::End)?;
    Ok(boundary)
}

/// Caret offset from the document start, or `None` without a selection.
pub fn cursor_position<C: TextContext + ?Sized>(
    ctx: &C,
    ec: EditCookie,
) -> Result<Option<usize>> {
    let Some(selection) = ctx.selection(ec)? else {
        return Ok(None);
    };
    let halt = Halt::new(&selection.range, selection.active_end);
    let (_, position) = full_document_range(ctx, ec, Some(halt))?;
    Ok(Some(position))
}

/// The selection range, if the selection is an interim one.
pub fn interim_selection<C: TextContext + ?Sized>(
    ctx: &C,
    ec: EditCookie,
) -> Result<Option<C::Range>> {
    Ok(ctx
        .selection(ec)?
        .and_then(|selection| selection.interim_range()))
}

/// Decides whether an edit transaction touched the composition.
///
/// Changed when the selection moved, when the tracked composition span no
/// longer matches the document, or when any non-empty range reports text,
/// composing, or display-attribute updates. A failure to compute the full
/// document range is treated as unchanged.
pub fn has_composition_changed<C: TextContext + ?Sized>(
    ctx: &C,
    ec: EditCookie,
    record: &dyn EditRecord<C::Range>,
) -> Result<bool> {
    if record.selection_changed()? {
        return Ok(true);
    }

    let tracked = match ctx.property_ranges(ec, PropertyId::TRACK_COMPOSITION, None) {
        Ok(runs) => runs,
        Err(e) => {
            debug!(error = %e, "tracked composition unavailable");
            return Ok(true);
        }
    };
    let (Some((first, _)), Some((last, _))) = (tracked.first(), tracked.last()) else {
        return Ok(true);
    };
    let mut tracked_span = first.clone();
    tracked_span.shift_end_to(ec, last, Anchor::End)?;

    let full = match full_document_range(ctx, ec, None) {
        Ok((full, _)) => full,
        Err(e) => {
            warn!(error = %e, "cannot measure document");
            return Ok(false);
        }
    };
    let spans_document = tracked_span
        .compare_start(ec, &full, Anchor::Start)
        .and_then(|start| Ok((start, tracked_span.compare_end(ec, &full, Anchor::End)?)));
    match spans_document {
        Ok((Ordering::Equal, Ordering::Equal)) => {}
        Ok(_) => return Ok(true),
        Err(e) => {
            warn!(error = %e, "cannot compare tracked composition");
            return Ok(false);
        }
    }

    let updates =
        record.text_and_property_updates(&[PropertyId::COMPOSING, PropertyId::ATTRIBUTE])?;
    for range in updates {
        if !range.is_empty(ec)? {
            return Ok(true);
        }
    }
    Ok(false)
}
