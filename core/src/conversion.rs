//! Conversion area: the terminal-side view of the composition.
//!
//! Finalized text is delivered to the buffer as if typed; composition text is
//! drawn as provisional, attributed preedit near the caret.

use crate::attributes::DisplayAttribute;
use crate::error::Result;

pub trait ConversionArea {
    /// Called when the outermost composition starts.
    fn start_composition(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called when the outermost composition ends.
    fn end_composition(&mut self) -> Result<()> {
        Ok(())
    }

    /// Commits finalized text to the buffer.
    fn draw_result(&mut self, text: &str) -> Result<()>;

    /// Draws provisional text. `attributes` has one entry per character and
    /// `cursor` is a character offset into `text`.
    fn draw_composition(
        &mut self,
        text: &str,
        attributes: &[DisplayAttribute],
        cursor: Option<usize>,
    ) -> Result<()>;

    /// Removes any drawn composition.
    fn clear_composition(&mut self) -> Result<()>;
}
