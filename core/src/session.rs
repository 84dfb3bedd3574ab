//! Edit-session scheduling.
//!
//! All document access happens inside edit sessions granted by the
//! text-services runtime. The runtime either runs a session right away or
//! queues it and calls back later. [`EditSessionScheduler`] keeps at most one
//! outstanding request per [`SessionKind`] so bursts of notifications collapse
//! into a single pass.

use crate::context::{AccessMode, EditCookie, TextContext};
use crate::error::Result;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The three reconciliation passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// Reads the finished composition and commits it.
    Complete,
    /// Erases committed text from the document.
    Cleanup,
    /// Re-segments the document and redraws the composition.
    UpdateCompositionString,
}

impl SessionKind {
    pub fn access(self) -> AccessMode {
        match self {
            Self::Complete => AccessMode::ReadOnly,
            Self::Cleanup | Self::UpdateCompositionString => AccessMode::ReadWrite,
        }
    }

    pub fn urgency(self) -> Urgency {
        match self {
            Self::Complete => Urgency::Synchronous,
            Self::Cleanup | Self::UpdateCompositionString => Urgency::AsyncBestEffort,
        }
    }

    fn flag(self) -> PendingSessions {
        match self {
            Self::Complete => PendingSessions::COMPLETE,
            Self::Cleanup => PendingSessions::CLEANUP,
            Self::UpdateCompositionString => PendingSessions::UPDATE_COMPOSITION_STRING,
        }
    }
}

/// How soon a session must run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    /// Run before the request returns.
    Synchronous,
    /// Run whenever the runtime gets to it; may be queued.
    AsyncBestEffort,
}

/// Runtime's answer to a session request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionGrant {
    /// The session may run now under this cookie.
    Immediate(EditCookie),
    /// The runtime will invoke the session later.
    Deferred,
}

/// What a reconciliation request led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOutcome {
    /// The pass ran to completion.
    Ran,
    /// The pass was queued by the runtime.
    Queued,
    /// An identical pass was already outstanding.
    Skipped,
    /// Nothing relevant changed.
    Unchanged,
}

/// Text-services runtime the controller talks to.
pub trait TextServices {
    type Context: TextContext;

    fn context(&self) -> &Self::Context;

    fn request_edit_session(
        &mut self,
        kind: SessionKind,
        access: AccessMode,
        urgency: Urgency,
    ) -> Result<SessionGrant>;

    /// Binds (or unbinds) the document to the focused window.
    fn associate_focus(&mut self, bound: bool) -> Result<()>;

    /// Forces the active composition to end. The runtime follows up with a
    /// composition-end notification.
    fn terminate_composition(&mut self) -> Result<()>;
}

bitflags! {
    /// Session kinds with an outstanding request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PendingSessions: u8 {
        const COMPLETE = 1 << 0;
        const CLEANUP = 1 << 1;
        const UPDATE_COMPOSITION_STRING = 1 << 2;
    }
}

/// Scheduler decision for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ticket {
    /// Run now, then call [`EditSessionScheduler::finish`].
    Run(EditCookie),
    Queued,
    Skipped,
}

#[derive(Debug, Clone, Default)]
pub struct EditSessionScheduler {
    pending: PendingSessions,
}

impl EditSessionScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> PendingSessions {
        self.pending
    }

    pub fn is_pending(&self, kind: SessionKind) -> bool {
        self.pending.contains(kind.flag())
    }

    /// Asks the runtime for a session of `kind` unless one is outstanding.
    ///
    /// A refused request leaves nothing pending.
    pub fn request<S: TextServices + ?Sized>(
        &mut self,
        services: &mut S,
        kind: SessionKind,
    ) -> Result<Ticket> {
        if self.is_pending(kind) {
            debug!(?kind, "edit session already pending");
            return Ok(Ticket::Skipped);
        }

        let grant = services.request_edit_session(kind, kind.access(), kind.urgency())?;
        self.pending.insert(kind.flag());
        match grant {
            SessionGrant::Immediate(cookie) => Ok(Ticket::Run(cookie)),
            SessionGrant::Deferred => {
                debug!(?kind, "edit session queued");
                Ok(Ticket::Queued)
            }
        }
    }

    /// Marks a session as done. Returns whether it was pending.
    pub fn finish(&mut self, kind: SessionKind) -> bool {
        let was = self.is_pending(kind);
        self.pending.remove(kind.flag());
        was
    }

    /// Withdraws a request; a queued session that later runs becomes a no-op.
    pub fn cancel(&mut self, kind: SessionKind) -> bool {
        let was = self.finish(kind);
        if was {
            debug!(?kind, "edit session cancelled");
        }
        was
    }

    /// Withdraws every request and returns what was pending.
    pub fn cancel_all(&mut self) -> PendingSessions {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::memory::MemoryDocument;

    struct ScriptedServices {
        document: MemoryDocument,
        grant: Option<SessionGrant>,
        requests: Vec<SessionKind>,
    }

    impl ScriptedServices {
        fn new(grant: Option<SessionGrant>) -> Self {
            Self {
                document: MemoryDocument::new(),
                grant,
                requests: Vec::new(),
            }
        }
    }

    impl TextServices for ScriptedServices {
        type Context = MemoryDocument;

        fn context(&self) -> &MemoryDocument {
            &self.document
        }

        fn request_edit_session(
            &mut self,
            kind: SessionKind,
            _access: AccessMode,
            _urgency: Urgency,
        ) -> Result<SessionGrant> {
            self.requests.push(kind);
            self.grant.ok_or(Error::SessionRefused(kind))
        }

        fn associate_focus(&mut self, _bound: bool) -> Result<()> {
            Ok(())
        }

        fn terminate_composition(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_session_kind_modes() {
        assert_eq!(SessionKind::Complete.access(), AccessMode::ReadOnly);
        assert_eq!(SessionKind::Complete.urgency(), Urgency::Synchronous);
        assert_eq!(SessionKind::Cleanup.access(), AccessMode::ReadWrite);
        assert_eq!(
            SessionKind::UpdateCompositionString.urgency(),
            Urgency::AsyncBestEffort
        );
    }

    #[test]
    fn test_duplicate_request_is_skipped() {
        let mut services = ScriptedServices::new(Some(SessionGrant::Deferred));
        let mut scheduler = EditSessionScheduler::new();

        let kind = SessionKind::UpdateCompositionString;
        assert_eq!(scheduler.request(&mut services, kind).unwrap(), Ticket::Queued);
        assert_eq!(scheduler.request(&mut services, kind).unwrap(), Ticket::Skipped);
        assert_eq!(services.requests.len(), 1);
        assert!(scheduler.is_pending(kind));

        assert!(scheduler.finish(kind));
        assert!(!scheduler.is_pending(kind));
        assert_eq!(scheduler.request(&mut services, kind).unwrap(), Ticket::Queued);
    }

    #[test]
    fn test_immediate_grant_runs() {
        let cookie = EditCookie::new(9, AccessMode::ReadOnly);
        let mut services = ScriptedServices::new(Some(SessionGrant::Immediate(cookie)));
        let mut scheduler = EditSessionScheduler::new();

        let ticket = scheduler.request(&mut services, SessionKind::Complete).unwrap();
        assert_eq!(ticket, Ticket::Run(cookie));
        assert!(scheduler.is_pending(SessionKind::Complete));
    }

    #[test]
    fn test_refused_request_leaves_nothing_pending() {
        let mut services = ScriptedServices::new(None);
        let mut scheduler = EditSessionScheduler::new();

        let err = scheduler
            .request(&mut services, SessionKind::Cleanup)
            .unwrap_err();
        assert!(err.is_environment());
        assert_eq!(scheduler.pending(), PendingSessions::empty());
    }

    #[test]
    fn test_cancel_all() {
        let mut services = ScriptedServices::new(Some(SessionGrant::Deferred));
        let mut scheduler = EditSessionScheduler::new();
        scheduler.request(&mut services, SessionKind::Cleanup).unwrap();
        scheduler
            .request(&mut services, SessionKind::UpdateCompositionString)
            .unwrap();

        let cancelled = scheduler.cancel_all();
        assert!(cancelled.contains(PendingSessions::CLEANUP));
        assert!(cancelled.contains(PendingSessions::UPDATE_COMPOSITION_STRING));
        assert!(scheduler.pending().is_empty());
        assert!(!scheduler.cancel(SessionKind::Cleanup));
    }
}
