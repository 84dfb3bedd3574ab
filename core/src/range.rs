//! Text ranges over a text context.
//!
//! A range is a pair of anchors into the shared document. Ranges are cheap
//! values; moving an anchor never touches the document. Every call takes the
//! [`EditCookie`] of the edit session it runs in, and only writable cookies
//! may replace text.

use crate::context::EditCookie;
use crate::error::Result;
use std::cmp::Ordering;

/// One end of a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Anchor {
    Start,
    End,
}

/// Stops an anchor shift at another range's anchor.
///
/// Shifting toward the halt position stops there even if the requested count
/// would carry the anchor further.
#[derive(Debug)]
pub struct Halt<'a, R> {
    pub range: &'a R,
    pub anchor: Anchor,
}

impl<'a, R> Halt<'a, R> {
    pub fn new(range: &'a R, anchor: Anchor) -> Self {
        Self { range, anchor }
    }
}

impl<R> Clone for Halt<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for Halt<'_, R> {}

/// Anchored span of a text context.
///
/// Counts are in characters. A shift reports how far the anchor actually
/// moved, which is smaller than requested when it hits the document edge or
/// a halt. Shifting the start past the end drags the end along (and the other
/// way around), so a range never inverts.
pub trait TextRange: Clone {
    fn shift_start(
        &mut self,
        ec: EditCookie,
        count: isize,
        halt: Option<Halt<'_, Self>>,
    ) -> Result<isize>;

    fn shift_end(
        &mut self,
        ec: EditCookie,
        count: isize,
        halt: Option<Halt<'_, Self>>,
    ) -> Result<isize>;

    /// Moves this range's start onto `anchor` of `other`.
    fn shift_start_to(&mut self, ec: EditCookie, other: &Self, anchor: Anchor) -> Result<()>;

    /// Moves this range's end onto `anchor` of `other`.
    fn shift_end_to(&mut self, ec: EditCookie, other: &Self, anchor: Anchor) -> Result<()>;

    /// Orders this range's start against `anchor` of `other`.
    fn compare_start(&self, ec: EditCookie, other: &Self, anchor: Anchor) -> Result<Ordering>;

    /// Orders this range's end against `anchor` of `other`.
    fn compare_end(&self, ec: EditCookie, other: &Self, anchor: Anchor) -> Result<Ordering>;

    /// Reads the whole range.
    fn text(&self, ec: EditCookie) -> Result<String>;

    /// Reads up to `max_chars` characters and advances the start past them.
    fn take_text(&mut self, ec: EditCookie, max_chars: usize) -> Result<String>;

    /// Replaces the covered text. Fails with
    /// [`crate::Error::WriteOutsideSession`] under a read-only cookie.
    fn set_text(&mut self, ec: EditCookie, text: &str) -> Result<()>;

    fn is_empty(&self, ec: EditCookie) -> Result<bool>;

    /// Collapses the range onto one of its anchors.
    fn collapse(&mut self, ec: EditCookie, anchor: Anchor) -> Result<()>;
}

/// Reads `range` in chunks of at most `chunk` characters.
///
/// The range itself is consumed: its start ends up at its end.
pub fn read_chunked<R: TextRange>(range: &mut R, ec: EditCookie, chunk: usize) -> Result<String> {
    let chunk = chunk.max(1);
    let mut text = String::new();
    loop {
        let piece = range.take_text(ec, chunk)?;
        if piece.is_empty() {
            break;
        }
        let taken = piece.chars().count();
        text.push_str(&piece);
        if taken < chunk {
            break;
        }
    }
    Ok(text)
}

/// Total character length of `range`.
pub fn char_len<R: TextRange>(range: &R, ec: EditCookie) -> Result<usize> {
    Ok(range.text(ec)?.chars().count())
}
