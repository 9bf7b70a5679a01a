//! Target resolution for `type` intents.

use crate::driver::Query;
use crate::matcher::strategies::{Attempt, dedup_attempts};
use crate::types::normalize_target;
use crate::util::slugify;

/// Targets that name "some field" rather than a particular one.
pub const GENERIC_FIELD_TERMS: &[&str] = &[
    "input",
    "field",
    "input field",
    "text field",
    "text input",
    "textbox",
    "text box",
    "textarea",
    "text area",
    "description",
    "editor",
];

/// Prefixes that mark a target as a selector to use verbatim.
pub const SELECTOR_PREFIXES: &[&str] =
    &["#", ".", "[", "input", "textarea", "select", "//", "(//"];

pub const TEXT_INPUT_SELECTOR: &str = "input[type='text'], input:not([type])";
pub const TEXTAREA_SELECTOR: &str = "textarea";
pub const EDITABLE_SELECTOR: &str = "[contenteditable='true']";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldTarget {
    Generic,
    Selector(String),
    FreeText(String),
}

pub fn classify(target: &str) -> FieldTarget {
    let trimmed = target.trim();
    let normalized = normalize_target(trimmed);
    if normalized.is_empty() || GENERIC_FIELD_TERMS.contains(&normalized.as_str()) {
        FieldTarget::Generic
    } else if SELECTOR_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
        FieldTarget::Selector(trimmed.to_string())
    } else {
        FieldTarget::FreeText(trimmed.to_string())
    }
}

fn generic_attempts() -> Vec<Attempt> {
    vec![
        Attempt::new("first text input", Query::Css(TEXT_INPUT_SELECTOR.to_string())),
        Attempt::new("first textarea", Query::Css(TEXTAREA_SELECTOR.to_string())),
        Attempt::new("first editable", Query::Css(EDITABLE_SELECTOR.to_string())),
    ]
}

fn css_quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Ordered, de-duplicated lookups for the field a `type` intent names.
pub fn fill_attempts(target: &str) -> Vec<Attempt> {
    let mut attempts = match classify(target) {
        FieldTarget::Generic => Vec::new(),
        FieldTarget::Selector(selector) => {
            let query = Query::selector(&selector);
            let strategy = if matches!(query, Query::XPath(_)) { "xpath" } else { "css" };
            vec![Attempt::new(strategy, query)]
        }
        FieldTarget::FreeText(text) => free_text_attempts(&text),
    };
    attempts.extend(generic_attempts());
    dedup_attempts(attempts)
}

fn free_text_attempts(text: &str) -> Vec<Attempt> {
    let quoted = css_quote(text);
    let slug = slugify(text).replace('_', "-");
    let compact = slug.replace('-', "");
    let css = |selector: String| Attempt::new("css", Query::Css(selector));

    let mut attempts = vec![
        css(format!("[placeholder=\"{quoted}\"]")),
        css(format!("[data-placeholder=\"{quoted}\"]")),
        css(format!("[aria-label=\"{quoted}\"]")),
        css(format!("[aria-label*=\"{quoted}\" i]")),
    ];
    if !slug.trim_matches('-').is_empty() {
        attempts.push(css(format!("[data-testid*=\"{slug}\"]")));
        attempts.push(css(format!("[name*=\"{compact}\"]")));
        attempts.push(css(format!("[id*=\"{slug}\"]")));
    }
    attempts.push(Attempt::new("placeholder", Query::Placeholder(text.to_string())));
    attempts.push(Attempt::new(
        "role textbox",
        Query::Role {
            role: "textbox".to_string(),
            name: text.to_string(),
        },
    ));
    attempts.push(Attempt::new("label", Query::Label(text.to_string())));
    attempts
}
