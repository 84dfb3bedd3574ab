//! Notification interfaces the text-services runtime calls into.
//!
//! Each sink is a narrow trait; the controller implements all of them and
//! [`EventSink`] funnels a single event type into the right one for hosts
//! that dispatch from one place.

use crate::context::{EditCookie, EditRecord};
use crate::error::Result;
use crate::session::{RequestOutcome, SessionKind};

/// Identifies who owns a composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId(pub u32);

impl OwnerId {
    /// Compositions this crate opens itself.
    pub const APPLICATION: Self = Self(0);
}

/// Client id the runtime assigned on activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub u32);

/// Kind of input profile an activation notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    Keyboard,
    Other,
}

pub trait CompositionSink {
    /// Returns whether the composition is accepted.
    fn on_start_composition(&mut self, owner: OwnerId) -> Result<bool>;

    fn on_update_composition(&mut self, owner: OwnerId) -> Result<()>;

    fn on_end_composition(&mut self, owner: OwnerId) -> Result<()>;
}

pub trait TextEditSink<R> {
    /// Called after every edit transaction on the document.
    fn on_end_edit(&mut self, ec: EditCookie, record: &dyn EditRecord<R>)
        -> Result<RequestOutcome>;
}

pub trait ActivationSink {
    fn on_activated(&mut self, profile: ProfileKind, active: bool) -> Result<()>;
}

pub trait FocusSink {
    fn on_focus_changed(&mut self, focused: bool) -> Result<()>;
}

pub trait CleanupContextSink {
    /// The runtime is about to tear the context down; composing marks must go.
    fn on_cleanup_context(&mut self, ec: EditCookie) -> Result<()>;
}

/// Candidate windows and similar input-method UI.
///
/// Input methods draw their own UI, so every element is allowed to show.
pub trait UiElementSink {
    /// Returns whether the input method may show the element.
    fn begin_ui_element(&mut self, _element: u32) -> bool {
        true
    }

    fn update_ui_element(&mut self, _element: u32) {}

    fn end_ui_element(&mut self, _element: u32) {}
}

/// Everything the runtime can tell the controller.
pub enum TextServicesEvent<'a, R> {
    Activated { profile: ProfileKind, active: bool },
    FocusChanged(bool),
    CompositionStarted(OwnerId),
    CompositionUpdated(OwnerId),
    CompositionEnded(OwnerId),
    EndEdit {
        cookie: EditCookie,
        record: &'a dyn EditRecord<R>,
    },
    CleanupContext(EditCookie),
    /// A queued edit session is being run by the runtime.
    EditSession { kind: SessionKind, cookie: EditCookie },
    BeginUiElement(u32),
    UpdateUiElement(u32),
    EndUiElement(u32),
}

/// Reply to a [`TextServicesEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventReply {
    Done,
    /// Whether a composition start or UI element was accepted.
    Accepted(bool),
    Edited(RequestOutcome),
}

pub trait EventSink<R> {
    fn handle_event(&mut self, event: TextServicesEvent<'_, R>) -> Result<EventReply>;
}
