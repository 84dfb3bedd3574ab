//! Output of one reconciliation pass.
//!
//! A pass splits the document into finalized text (committed to the terminal
//! buffer as if typed) and composition text (drawn as provisional preedit).
//! Composition text carries one attribute id per character.

use crate::attributes::AttributeId;
use crate::width;

/// Result and composition streams produced by segmentation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositionOutput {
    /// Finalized text, in document order.
    pub result: String,
    /// Provisional composition text, in document order.
    pub composition: String,
    /// One entry per character of `composition`.
    pub attributes: Vec<AttributeId>,
    /// Caret position in characters from the start of `composition`.
    pub cursor: Option<usize>,
}

impl CompositionOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_result(&mut self, text: &str) {
        self.result.push_str(text);
    }

    /// Appends composition text, tagging every character with `attribute`.
    pub fn push_composition(&mut self, text: &str, attribute: AttributeId) {
        self.composition.push_str(text);
        self.attributes
            .extend(std::iter::repeat(attribute).take(text.chars().count()));
    }

    pub fn has_result(&self) -> bool {
        !self.result.is_empty()
    }

    pub fn has_composition(&self) -> bool {
        !self.composition.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_result() && !self.has_composition()
    }

    /// Composition length in characters.
    pub fn composition_len(&self) -> usize {
        self.attributes.len()
    }

    /// Columns the composition occupies.
    pub fn display_width(&self) -> usize {
        width::str_width(&self.composition)
    }

    /// Column of the caret within the composition, if there is a caret.
    pub fn cursor_column(&self) -> Option<usize> {
        self.cursor
            .map(|cursor| width::column_of_char(&self.composition, cursor))
    }

    pub fn clear(&mut self) {
        self.result.clear();
        self.composition.clear();
        self.attributes.clear();
        self.cursor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_track_characters() {
        let mut output = CompositionOutput::new();
        output.push_composition("漢字", AttributeId(7));
        output.push_composition("x", AttributeId::NONE);

        assert_eq!(output.composition_len(), 3);
        assert_eq!(
            output.attributes,
            vec![AttributeId(7), AttributeId(7), AttributeId::NONE]
        );
    }

    #[test]
    fn test_cursor_column_counts_cells() {
        let mut output = CompositionOutput::new();
        output.push_composition("漢字x", AttributeId::NONE);
        assert_eq!(output.cursor_column(), None);

        output.cursor = Some(2);
        assert_eq!(output.cursor_column(), Some(4));
        assert_eq!(output.display_width(), 5);
    }

    #[test]
    fn test_empty_and_clear() {
        let mut output = CompositionOutput::new();
        assert!(output.is_empty());

        output.push_result("ABC");
        assert!(output.has_result());
        assert!(!output.has_composition());

        output.clear();
        assert!(output.is_empty());
    }
}
