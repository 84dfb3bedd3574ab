//! Replay scripts.
//!
//! A script is a TOML document with an optional `[config]` table, a list of
//! `[[attribute]]` display attributes, optional extra attribute properties,
//! and a list of `[[step]]` host events. Each step is applied to a controller
//! running on the in-memory host; the conversion-area calls it caused are
//! collected into a report.

use anyhow::{Context, Result};
use imebridge_core::memory::{
    AreaCall, MemoryDocument, MemoryTextServices, RecordingArea, StaticRegistry,
};
use imebridge_core::{
    AccessMode, ActivationSink, AttributeId, CleanupContextSink, ClientId, CompositionController,
    CompositionSink, Config, DisplayAttribute, FocusSink, OwnerId, ProfileKind, PropertyId,
    RequestOutcome, TextEditSink,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub config: Config,
    #[serde(default, rename = "attribute")]
    pub attributes: Vec<AttributeEntry>,
    /// Extra display-attribute property ids the registry reports.
    #[serde(default)]
    pub properties: Vec<u32>,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
pub struct AttributeEntry {
    pub id: u32,
    #[serde(flatten)]
    pub display: DisplayAttribute,
}

fn yes() -> bool {
    true
}

/// One host event.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Activate {
        #[serde(default = "yes")]
        keyboard: bool,
    },
    Start {
        owner: u32,
    },
    Update {
        owner: u32,
    },
    End {
        owner: u32,
    },
    /// Inserts determined text, at the end unless `at` is given.
    Insert {
        text: String,
        at: Option<usize>,
    },
    /// Appends composing text tagged with an attribute id.
    Compose {
        text: String,
        #[serde(default)]
        attribute: u32,
    },
    /// Clears the composing flag over a span.
    Determine {
        start: usize,
        end: usize,
    },
    Mark {
        start: usize,
        end: usize,
        property: u32,
        value: u32,
    },
    Select {
        start: usize,
        end: usize,
        #[serde(default)]
        interim: bool,
    },
    /// Delivers the edits made since the previous `edit` step.
    Edit,
    /// Runs every queued edit session.
    Pump,
    FocusLost,
    CleanupContext,
    /// Makes the runtime grant only read-only sessions.
    ReadOnly {
        enabled: bool,
    },
    Shutdown,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Activate { .. } => "activate",
            Self::Start { .. } => "start",
            Self::Update { .. } => "update",
            Self::End { .. } => "end",
            Self::Insert { .. } => "insert",
            Self::Compose { .. } => "compose",
            Self::Determine { .. } => "determine",
            Self::Mark { .. } => "mark",
            Self::Select { .. } => "select",
            Self::Edit => "edit",
            Self::Pump => "pump",
            Self::FocusLost => "focus_lost",
            Self::CleanupContext => "cleanup_context",
            Self::ReadOnly { .. } => "read_only",
            Self::Shutdown => "shutdown",
        }
    }
}

impl Script {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("invalid replay script")
    }
}

/// What one step did.
#[derive(Debug, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub op: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RequestOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub calls: Vec<AreaCall>,
    pub document: String,
}

/// Reply of a successfully applied step.
#[derive(Debug, Default)]
struct Applied {
    outcome: Option<RequestOutcome>,
    accepted: Option<bool>,
}

type Controller = CompositionController<MemoryTextServices, RecordingArea, StaticRegistry>;

pub struct Replayer {
    controller: Controller,
    doc: MemoryDocument,
    area: RecordingArea,
}

impl Replayer {
    pub fn new(script: &Script) -> Self {
        let mut registry = StaticRegistry::new();
        for property in &script.properties {
            registry.add_property(PropertyId(*property));
        }
        for entry in &script.attributes {
            registry.insert(AttributeId(entry.id), entry.display);
        }

        let doc = MemoryDocument::new();
        let area = RecordingArea::new();
        let handle = area.clone();
        let controller = CompositionController::new(
            ClientId(1),
            MemoryTextServices::new(doc.clone()),
            registry,
            script.config.clone(),
            move || handle.clone(),
        );
        Self {
            controller,
            doc,
            area,
        }
    }

    /// Applies every step. In strict mode the first failing step aborts the
    /// replay; otherwise the failure is reported and replay continues.
    pub fn run(&mut self, steps: &[Step], strict: bool) -> Result<Vec<StepReport>> {
        let mut reports = Vec::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            debug!(index, op = step.name(), "applying step");
            let (applied, error) = match self.apply(step) {
                Ok(applied) => (applied, None),
                Err(e) if strict => {
                    return Err(anyhow::Error::new(e)
                        .context(format!("step {} ({}) failed", index + 1, step.name())));
                }
                Err(e) => {
                    warn!(index, op = step.name(), error = %e, "step failed");
                    (Applied::default(), Some(e.to_string()))
                }
            };
            reports.push(StepReport {
                index: index + 1,
                op: step.name(),
                outcome: applied.outcome,
                accepted: applied.accepted,
                error,
                calls: self.area.take_calls(),
                document: self.doc.text(),
            });
        }
        Ok(reports)
    }

    fn apply(&mut self, step: &Step) -> imebridge_core::Result<Applied> {
        let mut applied = Applied::default();
        match step {
            Step::Activate { keyboard } => {
                let profile = if *keyboard {
                    ProfileKind::Keyboard
                } else {
                    ProfileKind::Other
                };
                self.controller.on_activated(profile, true)?;
            }
            Step::Start { owner } => {
                applied.accepted = Some(self.controller.on_start_composition(OwnerId(*owner))?);
            }
            Step::Update { owner } => self.controller.on_update_composition(OwnerId(*owner))?,
            Step::End { owner } => self.controller.on_end_composition(OwnerId(*owner))?,
            Step::Insert { text, at } => {
                let at = at.unwrap_or_else(|| self.doc.len());
                self.doc.insert(at, text);
            }
            Step::Compose { text, attribute } => self.doc.compose(text, AttributeId(*attribute)),
            Step::Determine { start, end } => self.doc.determine(*start, *end),
            Step::Mark {
                start,
                end,
                property,
                value,
            } => self.doc.mark(*start, *end, PropertyId(*property), *value),
            Step::Select {
                start,
                end,
                interim,
            } => {
                if *interim {
                    self.doc.select_interim(*start, *end);
                } else {
                    self.doc.select(*start, *end);
                }
            }
            Step::Edit => {
                let record = self.doc.take_edit_record();
                let ec = self
                    .controller
                    .services_mut()
                    .mint_cookie(AccessMode::ReadOnly);
                applied.outcome = Some(self.controller.on_end_edit(ec, &record)?);
            }
            Step::Pump => {
                while let Some(session) = self.controller.services_mut().next_deferred() {
                    self.controller
                        .run_edit_session(session.kind, session.cookie)?;
                }
            }
            Step::FocusLost => self.controller.on_focus_changed(false)?,
            Step::CleanupContext => {
                let ec = self
                    .controller
                    .services_mut()
                    .mint_cookie(AccessMode::ReadWrite);
                self.controller.on_cleanup_context(ec)?;
            }
            Step::ReadOnly { enabled } => {
                self.controller
                    .services_mut()
                    .set_read_only_grants(*enabled);
            }
            Step::Shutdown => self.controller.shutdown(),
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"
        [config]
        finalize_on_start = true

        [[attribute]]
        id = 7
        underline = "squiggle"
        class = "target_converted"

        [[step]]
        op = "activate"

        [[step]]
        op = "start"
        owner = 42

        [[step]]
        op = "insert"
        text = "ABC"

        [[step]]
        op = "compose"
        text = "漢字"
        attribute = 7

        [[step]]
        op = "edit"

        [[step]]
        op = "pump"

        [[step]]
        op = "end"
        owner = 42

        [[step]]
        op = "pump"
    "#;

    #[test]
    fn test_script_parses() {
        let script = Script::from_toml_str(SCRIPT).unwrap();
        assert_eq!(script.steps.len(), 8);
        assert_eq!(script.attributes[0].id, 7);
        assert_eq!(
            script.attributes[0].display.underline,
            imebridge_core::UnderlineStyle::Squiggle
        );
        assert_eq!(script.steps[3].name(), "compose");
    }

    #[test]
    fn test_replay_reports_calls() {
        let script = Script::from_toml_str(SCRIPT).unwrap();
        let reports = Replayer::new(&script).run(&script.steps, true).unwrap();

        assert_eq!(reports[1].accepted, Some(true));
        assert_eq!(reports[4].outcome, Some(RequestOutcome::Queued));
        assert_eq!(
            reports[5].calls[0],
            AreaCall::Result {
                text: "ABC".to_string()
            }
        );
        assert_eq!(reports[5].document, "漢字");
        assert_eq!(reports[7].document, "");
    }

    #[test]
    fn test_failures_are_reported_unless_strict() {
        let script = Script::from_toml_str(
            r#"
            [[step]]
            op = "activate"

            [[step]]
            op = "end"
            owner = 42
            "#,
        )
        .unwrap();

        let reports = Replayer::new(&script).run(&script.steps, false).unwrap();
        assert!(reports[1].error.is_some());

        let err = Replayer::new(&script)
            .run(&script.steps, true)
            .unwrap_err();
        assert!(err.to_string().contains("step 2 (end) failed"));
    }
}
