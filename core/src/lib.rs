//! imebridge-core
//!
//! Keeps a terminal's text buffer in step with an input method composing text
//! through a text-services framework. The framework edits a hidden document;
//! this crate watches its notifications, splits the document into finalized
//! text and in-progress composition, and hands both to a conversion area that
//! commits or draws them.
//!
//! Public API:
//! - `CompositionController` - Lifecycle state machine implementing every sink
//! - `TextServices` / `TextContext` / `TextRange` - Runtime abstractions
//! - `CompositionSegmenter` - Document walk producing result and composition
//! - `DisplayAttributeResolver` - Attribute lookup for one update pass
//! - `EditSessionScheduler` - Deduplicates edit-session requests
//! - `ConversionArea` - Terminal-side sink for committed and composed text
//! - `memory` - In-memory host for tests and tooling
//! - `Config` - Behavior switches
use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{Error, Result};

pub mod range;
pub use range::{Anchor, Halt, TextRange};

pub mod context;
pub use context::{
    AccessMode, EditCookie, EditRecord, PropertyId, PropertySpan, Selection, TextContext,
};

pub mod attributes;
pub use attributes::{
    AttributeClass, AttributeId, AttributeRegistry, Color, DisplayAttribute,
    DisplayAttributeResolver, UnderlineStyle,
};

pub mod composition;
pub use composition::CompositionOutput;

pub mod width;

pub mod reconcile;

pub mod segment;
pub use segment::{CompositionSegmenter, Segmentation};

pub mod session;
pub use session::{
    EditSessionScheduler, PendingSessions, RequestOutcome, SessionGrant, SessionKind,
    TextServices, Urgency,
};

pub mod conversion;
pub use conversion::ConversionArea;

pub mod sink;
pub use sink::{
    ActivationSink, CleanupContextSink, ClientId, CompositionSink, EventReply, EventSink,
    FocusSink, OwnerId, ProfileKind, TextEditSink, TextServicesEvent, UiElementSink,
};

pub mod controller;
pub use controller::{CompositionController, CompositionState};

pub mod memory;

/// What to do with a composition start while another is open and the
/// document is not being modified on our behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NestedStartPolicy {
    /// Refuse the start.
    Reject,
    /// Accept it without counting it.
    Ignore,
}

impl Default for NestedStartPolicy {
    fn default() -> Self {
        Self::Reject
    }
}

/// Controller configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Handling of overlapping composition starts.
    pub nested_start_policy: NestedStartPolicy,

    /// Commit leftover text from a previous composition when a new one
    /// starts. Default: true.
    pub finalize_on_start: bool,

    /// Characters read per call while walking the document. Default: 256.
    /// Values below 1 are treated as 1.
    pub read_chunk_len: usize,

    /// Also draw the composition in a pass that committed text. When false,
    /// such a pass stops after the commit. Default: true.
    pub draw_composition_after_result: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nested_start_policy: NestedStartPolicy::Reject,
            finalize_on_start: true,
            read_chunk_len: 256,
            draw_composition_after_result: true,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load_toml<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&content)?)
    }

    /// Save configuration to a TOML file.
    pub fn save_toml<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = self.to_toml_string()?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        let mut config: Config = toml::from_str(content)?;
        config.read_chunk_len = config.read_chunk_len.max(1);
        Ok(config)
    }

    /// Serialize configuration to TOML string.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.nested_start_policy, NestedStartPolicy::Reject);
        assert!(config.finalize_on_start);
        assert_eq!(config.read_chunk_len, 256);
        assert!(config.draw_composition_after_result);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            nested_start_policy = "ignore"
            read_chunk_len = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.nested_start_policy, NestedStartPolicy::Ignore);
        assert_eq!(config.read_chunk_len, 1);
        assert!(config.finalize_on_start);
    }

    #[test]
    fn test_toml_string_roundtrip() {
        let config = Config {
            finalize_on_start: false,
            ..Config::default()
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(Config::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err: Error = Config::from_toml_str("read_chunk_len = \"many\"")
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::ConfigParse(_)));
        assert!(!err.is_environment());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Config::load_toml("/nonexistent/imebridge.toml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
