//! Grapheme stepping and terminal cell widths.
//!
//! The conversion area lays composition text out on a cell grid, so cursor
//! placement is measured in columns rather than characters. Positions are
//! byte offsets into UTF-8 text and always land on grapheme boundaries.

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

/// Cells occupied by one grapheme cluster, clamped to 0..=2.
pub fn cluster_width(cluster: &str) -> usize {
    cluster.width().min(2)
}

/// Steps forward one grapheme from byte offset `pos`.
///
/// Returns the offset after the cluster and its width. At or past the end of
/// the text, or off a character boundary, the position is returned unchanged
/// with width 0.
pub fn grapheme_next(text: &str, pos: usize) -> (usize, usize) {
    let Some(rest) = text.get(pos..) else {
        return (pos.min(text.len()), 0);
    };
    match rest.graphemes(true).next() {
        Some(cluster) => (pos + cluster.len(), cluster_width(cluster)),
        None => (pos, 0),
    }
}

/// Steps backward one grapheme from byte offset `pos`.
pub fn grapheme_prev(text: &str, pos: usize) -> (usize, usize) {
    let Some(head) = text.get(..pos) else {
        return (pos.min(text.len()), 0);
    };
    match head.graphemes(true).next_back() {
        Some(cluster) => (pos - cluster.len(), cluster_width(cluster)),
        None => (pos, 0),
    }
}

/// Columns needed to display `text`.
pub fn str_width(text: &str) -> usize {
    text.graphemes(true).map(cluster_width).sum()
}

/// Columns covered by the first `chars` characters of `text`.
///
/// A cluster the cut falls inside counts in full.
pub fn column_of_char(text: &str, chars: usize) -> usize {
    let cut = text
        .char_indices()
        .nth(chars)
        .map_or(text.len(), |(offset, _)| offset);
    text.grapheme_indices(true)
        .take_while(|(offset, _)| *offset < cut)
        .map(|(_, cluster)| cluster_width(cluster))
        .sum()
}
