//! Decision adapter: prompt out, validated intent back.
//!
//! The oracle answers in free text. [`parse_decision`] never fails; it tags
//! its result so callers can tell a clean parse from a guess.

use std::collections::VecDeque;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::OracleError;
use crate::types::{ActionIntent, ActionKind, ActionRecord, LocationHint};
use crate::util::truncate_chars;

/// History entries shown to the oracle.
pub const PROMPT_HISTORY: usize = 3;
const HISTORY_TARGET_CHARS: usize = 50;
const HISTORY_TEXT_CHARS: usize = 30;
const DEFAULT_RATIONALE: &str = "Next step";
const RAW_LOG_CHARS: usize = 200;

static FLAT_ACTION_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\{[^{}]*"action"[^{}]*\}"#).expect("valid regex"));

/// What the oracle sees for one step.
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    pub screenshot: &'a [u8],
    pub task: &'a str,
    pub url: &'a str,
    pub step: usize,
    /// Most recent records, oldest first.
    pub recent: &'a [ActionRecord],
}

#[derive(Debug, Clone)]
pub struct OracleRequest<'a> {
    /// PNG bytes.
    pub screenshot: &'a [u8],
    pub prompt: String,
}

/// One synchronous round trip to whatever picks the next action.
pub trait DecisionOracle {
    fn complete(&mut self, request: &OracleRequest<'_>) -> Result<String, OracleError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Parsed(ActionIntent),
    /// No usable JSON, but the text made the intent clear enough.
    Recovered(ActionIntent, String),
    /// Nothing usable; carries the raw response.
    Unparseable(String),
}

impl Decision {
    /// Unparseable responses stop the run rather than guess.
    pub fn into_intent(self) -> ActionIntent {
        match self {
            Decision::Parsed(intent) | Decision::Recovered(intent, _) => intent,
            Decision::Unparseable(_) => ActionIntent::done("Parse error - stopping workflow"),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Decision::Parsed(_) => "parsed",
            Decision::Recovered(..) => "recovered",
            Decision::Unparseable(_) => "unparseable",
        }
    }
}

pub fn build_prompt(observation: &Observation<'_>) -> String {
    let mut history = String::new();
    if !observation.recent.is_empty() {
        history.push_str("\nACTIONS ALREADY TAKEN (do not repeat them unless necessary):\n");
        for (idx, record) in observation.recent.iter().enumerate() {
            let mut line = record.intent.kind.to_string();
            if !record.intent.target.is_empty() {
                line.push_str(" -> ");
                line.push_str(truncate_chars(&record.intent.target, HISTORY_TARGET_CHARS));
            }
            if !record.intent.text.is_empty() {
                line.push_str(&format!(
                    " (text: {})",
                    truncate_chars(&record.intent.text, HISTORY_TEXT_CHARS)
                ));
            }
            history.push_str(&format!("  {}. {line} [{:?}]\n", idx + 1, record.status));
        }
        history.push_str(
            "\nIf you just typed into a field, the next action should click the submit or next button.\n\
             Do not type the same text into the same field again.\n",
        );
    }

    format!(
        r#"TASK: {task}

CURRENT STATE:
- URL: {url}
- Step: {step}
{history}
Look at the screenshot and choose the SINGLE next action that moves the task forward.

Rules:
1. Reply with one JSON object only. No prose, no markdown.
2. If the page asks you to log in, reply "done"; the run cannot authenticate.
3. After typing, click the submit/next button instead of typing again.
4. Only reply "done" once the page shows the task succeeded.
5. Click targets are visible text such as "Create Project", "Next" or "Submit".
6. When typing, always give a sensible value (e.g. "Test Project").

Actions:
- click: a button, link or other element, by visible text
- type: enter text into a field; give both target and text
- navigate: go to a URL given as target
- wait: pause; target is milliseconds
- done: the task is complete

Response format:
{{
    "action": "click|type|navigate|wait|done",
    "target": "visible text or CSS selector",
    "text": "text to type (type only)",
    "description": "what this step accomplishes",
    "location_hint": {{"position": "optional, e.g. top right toolbar"}}
}}"#,
        task = observation.task,
        url = observation.url,
        step = observation.step,
    )
}

/// Prompts the oracle and parses its answer. Only transport and API
/// failures are errors.
pub fn decide(
    oracle: &mut dyn DecisionOracle,
    observation: &Observation<'_>,
) -> Result<Decision, OracleError> {
    let request = OracleRequest {
        screenshot: observation.screenshot,
        prompt: build_prompt(observation),
    };
    let raw = oracle.complete(&request)?;
    debug!(step = observation.step, response = %truncate_chars(&raw, RAW_LOG_CHARS), "oracle replied");
    Ok(parse_decision(&raw))
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(serde_json::Number),
    Flag(bool),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Text(text) => text,
            Scalar::Number(number) => number.to_string(),
            Scalar::Flag(flag) => flag.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawHint {
    Structured { position: String },
    Plain(String),
}

#[derive(Debug, Deserialize)]
struct RawDecision {
    #[serde(default)]
    action: Option<Scalar>,
    #[serde(default)]
    target: Option<Scalar>,
    #[serde(default)]
    text: Option<Scalar>,
    #[serde(default, alias = "rationale", alias = "reasoning")]
    description: Option<Scalar>,
    #[serde(default)]
    location_hint: Option<RawHint>,
}

impl RawDecision {
    fn into_intent(self) -> ActionIntent {
        let kind = self
            .action
            .map(Scalar::into_string)
            .map(|raw| ActionKind::parse(&raw))
            .unwrap_or(ActionKind::Done);
        let rationale = self
            .description
            .map(Scalar::into_string)
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_RATIONALE.to_string());
        let location_hint = self
            .location_hint
            .map(|hint| match hint {
                RawHint::Structured { position } | RawHint::Plain(position) => position,
            })
            .filter(|position| !position.trim().is_empty())
            .map(|position| LocationHint { position });

        ActionIntent {
            kind,
            target: self.target.map(Scalar::into_string).unwrap_or_default(),
            text: self.text.map(Scalar::into_string).unwrap_or_default(),
            location_hint,
            rationale,
        }
    }
}

fn fenced_block(text: &str) -> Option<&str> {
    let (_, after) = text.split_once("```json").or_else(|| text.split_once("```"))?;
    let body = after.split_once("```").map_or(after, |(body, _)| body);
    Some(body.trim())
}

fn outer_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Turn an oracle response into an intent. Tries, in order: a flat JSON
/// object mentioning `"action"`, a fenced block, the outermost braces and the
/// whole text. Falls back to keyword inference, then to `Unparseable`.
pub fn parse_decision(raw: &str) -> Decision {
    let text = raw.trim();
    let candidates = [
        FLAT_ACTION_OBJECT.find(text).map(|m| m.as_str()),
        fenced_block(text),
        outer_braces(text),
        Some(text),
    ];

    let mut last_error = None;
    for candidate in candidates.into_iter().flatten() {
        match serde_json::from_str::<RawDecision>(candidate) {
            Ok(decision) => return Decision::Parsed(decision.into_intent()),
            Err(err) => last_error = Some(err),
        }
    }

    if let Some(err) = last_error {
        warn!(%err, raw = %truncate_chars(text, RAW_LOG_CHARS), "oracle response is not valid JSON");
    }
    infer_from_prose(text)
}

fn infer_from_prose(text: &str) -> Decision {
    let lower = text.to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    let (intent, reason) = if mentions(&["done", "complete", "success"]) {
        (
            ActionIntent::done("Inferred completion from response"),
            "completion wording",
        )
    } else if mentions(&["login", "sign in", "authenticate"]) {
        (ActionIntent::done("Login required - stopping"), "login wall")
    } else if lower.contains("click") && lower.contains("next") {
        (
            ActionIntent::new(ActionKind::Click, "Next").with_rationale("Inferred from response"),
            "click next",
        )
    } else if lower.contains("click") && lower.contains("submit") {
        (
            ActionIntent::new(ActionKind::Click, "Submit").with_rationale("Inferred from response"),
            "click submit",
        )
    } else {
        return Decision::Unparseable(text.to_string());
    };
    Decision::Recovered(intent, reason.to_string())
}

/// Replays canned responses, then keeps answering `done`.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    responses: VecDeque<Result<String, OracleError>>,
    prompts: Vec<String>,
}

impl ScriptedOracle {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: responses.into_iter().map(|r| Ok(r.into())).collect(),
            prompts: Vec::new(),
        }
    }

    pub fn then_fail(mut self, err: OracleError) -> Self {
        self.responses.push_back(Err(err));
        self
    }

    /// Every prompt received so far.
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }
}

impl DecisionOracle for ScriptedOracle {
    fn complete(&mut self, request: &OracleRequest<'_>) -> Result<String, OracleError> {
        self.prompts.push(request.prompt.clone());
        self.responses
            .pop_front()
            .unwrap_or_else(|| Ok(r#"{"action": "done", "description": "script exhausted"}"#.to_string()))
    }
}
