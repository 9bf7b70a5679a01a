use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The operation an intent asks the engine to perform.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Click,
    Type,
    Navigate,
    Wait,
    Done,
    /// Anything the oracle invents outside the five known kinds.
    Unknown(String),
}

impl ActionKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "click" => ActionKind::Click,
            "type" => ActionKind::Type,
            "navigate" => ActionKind::Navigate,
            "wait" => ActionKind::Wait,
            "done" => ActionKind::Done,
            other => ActionKind::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ActionKind::Click => "click",
            ActionKind::Type => "type",
            ActionKind::Navigate => "navigate",
            ActionKind::Wait => "wait",
            ActionKind::Done => "done",
            ActionKind::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ActionKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ActionKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ActionKind::parse(&raw))
    }
}

/// Free-text hint about where on screen the target lives, e.g. "top right toolbar".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationHint {
    pub position: String,
}

/// A fully defaulted description of the next UI operation.
///
/// Built only by the decision adapter; every field is present so downstream
/// code never has to handle a missing value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionIntent {
    pub kind: ActionKind,
    pub target: String,
    pub text: String,
    pub location_hint: Option<LocationHint>,
    pub rationale: String,
}

impl ActionIntent {
    pub fn new(kind: ActionKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            text: String::new(),
            location_hint: None,
            rationale: String::new(),
        }
    }

    pub fn done(rationale: impl Into<String>) -> Self {
        Self {
            rationale: rationale.into(),
            ..Self::new(ActionKind::Done, "")
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    pub fn with_position(mut self, position: impl Into<String>) -> Self {
        self.location_hint = Some(LocationHint {
            position: position.into(),
        });
        self
    }

    /// Target as compared by the loop guard.
    pub fn normalized_target(&self) -> String {
        normalize_target(&self.target)
    }
}

/// Lowercase + trim. Idempotent.
pub fn normalize_target(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Pending,
    Success,
    Failed,
    Rejected,
}

/// An intent after the engine has dealt with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub step: usize,
    #[serde(flatten)]
    pub intent: ActionIntent,
    pub status: ActionStatus,
    /// Whether the verifier saw the page change after a click. Informational.
    #[serde(default)]
    pub state_changed: Option<bool>,
}

impl ActionRecord {
    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Success
    }
}

/// Append-only log of what happened during a single run, most recent last.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ActionHistory {
    records: Vec<ActionRecord>,
}

impl ActionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ActionRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ActionRecord] {
        &self.records
    }

    /// Up to `n` most recent records, oldest first.
    pub fn recent(&self, n: usize) -> &[ActionRecord] {
        let start = self.records.len().saturating_sub(n);
        &self.records[start..]
    }

    pub fn successful_actions(&self) -> usize {
        self.records.iter().filter(|r| r.is_success()).count()
    }
}

/// Where the run ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Completed,
    LoopDetected,
    Stalled,
    MaxStepsReached,
    NoActions,
    DoneRejectedLoop,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// The same action was proposed again after three identical attempts that did not all succeed.
    LoopDetected,
    /// Three identical successful actions and the oracle still proposes the same one.
    Stalled,
    MaxStepsReached,
    NoActions,
    /// The oracle kept declaring completion before enough progress was made.
    DoneRejectedLoop,
    DriverFailure(String),
    OracleFailure(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::LoopDetected => f.write_str("loop detected"),
            FailureReason::Stalled => f.write_str("repeated action produced no progress"),
            FailureReason::MaxStepsReached => f.write_str("maximum steps reached"),
            FailureReason::NoActions => f.write_str("no successful actions"),
            FailureReason::DoneRejectedLoop => {
                f.write_str("completion repeatedly declared before enough progress")
            }
            FailureReason::DriverFailure(msg) => write!(f, "browser failure: {msg}"),
            FailureReason::OracleFailure(msg) => write!(f, "decision oracle failure: {msg}"),
        }
    }
}

impl FailureReason {
    pub fn state(&self) -> RunState {
        match self {
            FailureReason::LoopDetected => RunState::LoopDetected,
            FailureReason::Stalled => RunState::Stalled,
            FailureReason::MaxStepsReached => RunState::MaxStepsReached,
            FailureReason::NoActions => RunState::NoActions,
            FailureReason::DoneRejectedLoop => RunState::DoneRejectedLoop,
            FailureReason::DriverFailure(_) | FailureReason::OracleFailure(_) => RunState::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub completed: bool,
    pub steps: usize,
    pub successful_actions: usize,
    pub failure_reason: Option<FailureReason>,
}

impl RunOutcome {
    pub fn state(&self) -> RunState {
        match &self.failure_reason {
            None if self.completed => RunState::Completed,
            None => RunState::Running,
            Some(reason) => reason.state(),
        }
    }
}

/// One captured frame of the trace, taken at the start of a step.
#[derive(Debug, Clone, Serialize)]
pub struct TraceFrame {
    pub step: usize,
    #[serde(skip)]
    pub screenshot: Vec<u8>,
    pub url: String,
    pub title: String,
    pub timestamp: DateTime<Utc>,
}

/// Everything a run produces, handed to the reporting layer.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub task: String,
    pub app: String,
    pub start_url: String,
    pub frames: Vec<TraceFrame>,
    pub history: ActionHistory,
    pub outcome: RunOutcome,
}
