//! Error types for composition reconciliation.
//!
//! Errors fall into two families. Environment errors mean the text-services
//! runtime or the conversion area refused something; the current pass is
//! abandoned and controller state is left as it was. Protocol violations mean
//! a caller broke the notification contract (ending a composition that never
//! started, mutating the document outside a write session). Both abort the
//! current operation; neither panics.
//!
//! Benign races such as a duplicate session request are not errors at all and
//! are reported through [`crate::RequestOutcome`] instead.

use crate::session::SessionKind;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The text-services runtime failed a call.
    #[error("text services call failed: {0}")]
    Environment(String),

    /// The runtime refused to grant an edit session.
    #[error("edit session for {0:?} was refused")]
    SessionRefused(SessionKind),

    /// The conversion area failed to draw.
    #[error("conversion area failed: {0}")]
    Render(String),

    #[error("document mutation attempted outside a read-write edit session")]
    WriteOutsideSession,

    #[error("composition ended without a matching start")]
    EndWithoutStart,

    #[error("interim selection lies outside the document")]
    InterimOutOfBounds,

    #[error("interim composition has no text before its placeholder")]
    EmptyInterimPrefix,

    #[error("no conversion area is bound")]
    NotBound,

    #[error("failed to access configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

impl Error {
    /// Shorthand for an [`Error::Environment`] failure.
    pub fn environment(message: impl Into<String>) -> Self {
        Self::Environment(message.into())
    }

    /// Shorthand for an [`Error::Render`] failure.
    pub fn render(message: impl Into<String>) -> Self {
        Self::Render(message.into())
    }

    /// True when the runtime or renderer refused something.
    pub fn is_environment(&self) -> bool {
        matches!(
            self,
            Self::Environment(_) | Self::SessionRefused(_) | Self::Render(_)
        )
    }

    /// True when a caller broke the notification or session contract.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::WriteOutsideSession
                | Self::EndWithoutStart
                | Self::InterimOutOfBounds
                | Self::EmptyInterimPrefix
                | Self::NotBound
        )
    }
}
