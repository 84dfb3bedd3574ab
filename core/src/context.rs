//! Text context abstraction.
//!
//! The text context is the single logical document that the text-services
//! runtime edits on the user's behalf while a composition is open. It holds
//! the composed text together with per-character properties: the runtime's
//! composing flag, display attributes, and the marker this crate leaves behind
//! after every update pass.
//!
//! Reads and writes are only legal inside an edit session, proven by the
//! [`EditCookie`] the runtime hands out when the session runs.

use crate::error::{Error, Result};
use crate::range::{Anchor, TextRange};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Access mode of an edit session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

impl AccessMode {
    pub fn is_writable(self) -> bool {
        matches!(self, Self::ReadWrite)
    }
}

/// Token proving an edit session is executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EditCookie {
    id: u32,
    access: AccessMode,
}

impl EditCookie {
    pub fn new(id: u32, access: AccessMode) -> Self {
        Self { id, access }
    }

    pub fn id(self) -> u32 {
        self.id
    }

    pub fn access(self) -> AccessMode {
        self.access
    }

    pub fn is_writable(self) -> bool {
        self.access.is_writable()
    }

    /// Fails with [`Error::WriteOutsideSession`] unless the session may write.
    pub fn require_write(self) -> Result<()> {
        if self.is_writable() {
            Ok(())
        } else {
            error!(session = self.id, "write attempted in a read-only session");
            Err(Error::WriteOutsideSession)
        }
    }
}

/// Identifier of a per-character text property.
///
/// Property values are `u32`; zero means unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyId(pub u32);

impl PropertyId {
    /// Set by the runtime on text an input method is still composing.
    pub const COMPOSING: Self = Self(1);
    /// System display-attribute property.
    pub const ATTRIBUTE: Self = Self(2);
    /// Marks the span the last update pass saw as the composition.
    pub const TRACK_COMPOSITION: Self = Self(3);
}

/// One cell of a property partition.
///
/// `values` lists the queried properties that are set over the span, in
/// query order; unset properties are omitted.
#[derive(Debug, Clone)]
pub struct PropertySpan<R> {
    pub range: R,
    pub values: Vec<(PropertyId, u32)>,
}

impl<R> PropertySpan<R> {
    /// Value of `id` over this span, if set.
    pub fn value(&self, id: PropertyId) -> Option<u32> {
        self.values
            .iter()
            .find(|(pid, value)| *pid == id && *value != 0)
            .map(|(_, value)| *value)
    }

    pub fn is_set(&self, id: PropertyId) -> bool {
        self.value(id).is_some()
    }

    pub fn has_any_value(&self) -> bool {
        self.values.iter().any(|(_, value)| *value != 0)
    }
}

/// Current selection of a text context.
#[derive(Debug, Clone)]
pub struct Selection<R> {
    pub range: R,
    /// Anchor the caret sits on.
    pub active_end: Anchor,
    /// Set while an input method shows a provisional single-character
    /// composition (common with Korean input).
    pub interim: bool,
}

impl<R> Selection<R> {
    /// The selection range, if it is an interim one.
    pub fn interim_range(self) -> Option<R> {
        self.interim.then_some(self.range)
    }
}

/// Document the runtime edits.
pub trait TextContext {
    type Range: TextRange;

    /// Empty range at the start of the document.
    fn start(&self, ec: EditCookie) -> Result<Self::Range>;

    /// The default selection, or `None` if the document has none.
    fn selection(&self, ec: EditCookie) -> Result<Option<Selection<Self::Range>>>;

    /// Partitions `within` into maximal spans over which every property in
    /// `ids` holds a constant value.
    ///
    /// Every character of `within` belongs to exactly one span and spans come
    /// back in document order. An empty `within` yields no spans.
    fn property_spans(
        &self,
        ec: EditCookie,
        ids: &[PropertyId],
        within: &Self::Range,
    ) -> Result<Vec<PropertySpan<Self::Range>>>;

    /// Maximal runs carrying a non-zero value for `id`, within `within` or
    /// the whole document.
    fn property_ranges(
        &self,
        ec: EditCookie,
        id: PropertyId,
        within: Option<&Self::Range>,
    ) -> Result<Vec<(Self::Range, u32)>>;

    /// Sets `id` to `value` over `range`. Requires a writable cookie.
    fn set_property(
        &self,
        ec: EditCookie,
        id: PropertyId,
        range: &Self::Range,
        value: u32,
    ) -> Result<()>;

    /// Clears `id` over `range`. Requires a writable cookie.
    fn clear_property(&self, ec: EditCookie, id: PropertyId, range: &Self::Range) -> Result<()>;
}

/// Changes accumulated during one edit transaction.
pub trait EditRecord<R> {
    fn selection_changed(&self) -> Result<bool>;

    /// Ranges whose text or any of the listed properties changed.
    fn text_and_property_updates(&self, ids: &[PropertyId]) -> Result<Vec<R>>;
}
