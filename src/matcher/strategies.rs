//! Declarative attempt tables for the query-driven tiers.
//!
//! Each function here is pure: it turns a target into an ordered list of
//! `(strategy, query)` pairs. The matcher decides when to run them.

use std::collections::HashSet;
use std::fmt;

use crate::driver::{ElementHandle, Query};
use crate::matcher::keywords::Keyword;

/// How many keywords the keyword-selector tier probes.
pub const KEYWORD_SELECTOR_LIMIT: usize = 3;

/// Resolution tiers in the order they are tried for clicks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Exact,
    Semantic,
    Spatial,
    KeywordSelector,
    Fallback,
}

impl Tier {
    pub fn name(&self) -> &'static str {
        match self {
            Tier::Exact => "exact",
            Tier::Semantic => "semantic",
            Tier::Spatial => "spatial",
            Tier::KeywordSelector => "keyword-selector",
            Tier::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One lookup to try, labelled with the strategy that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub strategy: &'static str,
    pub query: Query,
}

impl Attempt {
    pub fn new(strategy: &'static str, query: Query) -> Self {
        Self { strategy, query }
    }

    fn is_blank(&self) -> bool {
        let value = match &self.query {
            Query::Text { text, .. } | Query::Button { text, .. } => text,
            Query::AriaLabel { value, .. } => value,
            Query::LinkOrButton(text)
            | Query::Css(text)
            | Query::XPath(text)
            | Query::Placeholder(text)
            | Query::Label(text) => text,
            Query::Role { name, .. } => name,
        };
        value.trim().is_empty()
    }
}

/// A live element a tier is willing to act on.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub handle: ElementHandle,
    pub score: i32,
    pub matched_text: String,
    pub strategy: String,
}

/// Drop blank attempts and repeats of the same `(strategy, query)`, keeping
/// first-seen order.
pub fn dedup_attempts(attempts: Vec<Attempt>) -> Vec<Attempt> {
    let mut seen = HashSet::new();
    attempts
        .into_iter()
        .filter(|attempt| !attempt.is_blank())
        .filter(|attempt| seen.insert((attempt.strategy, attempt.query.to_string())))
        .collect()
}

pub fn exact_attempts(target: &str) -> Vec<Attempt> {
    let target = target.trim();
    dedup_attempts(vec![
        Attempt::new(
            "exact text",
            Query::Text {
                text: target.to_string(),
                exact: true,
            },
        ),
        Attempt::new(
            "exact aria-label",
            Query::AriaLabel {
                value: target.to_string(),
                exact: true,
            },
        ),
        Attempt::new(
            "exact button text",
            Query::Button {
                text: target.to_string(),
                exact: true,
            },
        ),
    ])
}

pub fn keyword_attempts(keywords: &[Keyword]) -> Vec<Attempt> {
    let mut attempts = Vec::new();
    for keyword in keywords.iter().take(KEYWORD_SELECTOR_LIMIT) {
        attempts.push(Attempt::new(
            "keyword aria-label",
            Query::AriaLabel {
                value: keyword.phrase.clone(),
                exact: false,
            },
        ));
        attempts.push(Attempt::new(
            "keyword text",
            Query::Text {
                text: keyword.phrase.clone(),
                exact: false,
            },
        ));
    }
    dedup_attempts(attempts)
}

pub fn fallback_attempts(target: &str) -> Vec<Attempt> {
    let target = target.trim();
    dedup_attempts(vec![
        Attempt::new(
            "partial text",
            Query::Text {
                text: target.to_string(),
                exact: false,
            },
        ),
        Attempt::new("link or button", Query::LinkOrButton(target.to_string())),
        Attempt::new("css selector", Query::selector(target)),
        Attempt::new(
            "aria-label contains",
            Query::AriaLabel {
                value: target.to_string(),
                exact: false,
            },
        ),
        Attempt::new(
            "role button",
            Query::Role {
                role: "button".to_string(),
                name: target.to_string(),
            },
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::keywords::extract_keywords;

    fn labels(attempts: &[Attempt]) -> Vec<&'static str> {
        attempts.iter().map(|a| a.strategy).collect()
    }

    #[test]
    fn exact_tier_order() {
        assert_eq!(
            labels(&exact_attempts(" Next ")),
            vec!["exact text", "exact aria-label", "exact button text"]
        );
        assert_eq!(
            exact_attempts("Next")[0].query,
            Query::Text {
                text: "Next".into(),
                exact: true
            }
        );
        assert!(exact_attempts("   ").is_empty());
    }

    #[test]
    fn fallback_tier_order() {
        assert_eq!(
            labels(&fallback_attempts("Submit")),
            vec![
                "partial text",
                "link or button",
                "css selector",
                "aria-label contains",
                "role button"
            ]
        );
    }

    #[test]
    fn xpath_target_falls_back_to_xpath_lookup() {
        let attempts = fallback_attempts("//button[@data-action='save']");
        assert_eq!(
            attempts[2].query,
            Query::XPath("//button[@data-action='save']".into())
        );
    }

    #[test]
    fn keyword_tier_uses_top_three() {
        let keywords = extract_keywords("new issue form", "");
        let attempts = keyword_attempts(&keywords);
        assert_eq!(attempts.len(), 6);
        assert_eq!(
            attempts[0].query,
            Query::AriaLabel {
                value: "new issue form".into(),
                exact: false
            }
        );
        assert_eq!(labels(&attempts[..2]), vec!["keyword aria-label", "keyword text"]);
    }

    #[test]
    fn dedup_keeps_first_seen() {
        let attempts = dedup_attempts(vec![
            Attempt::new("css", Query::Css("#a".into())),
            Attempt::new("css", Query::Css("#b".into())),
            Attempt::new("css", Query::Css("#a".into())),
            Attempt::new("other", Query::Css("#a".into())),
            Attempt::new("css", Query::Css(" ".into())),
        ]);
        let rendered: Vec<(String, String)> = attempts
            .iter()
            .map(|a| (a.strategy.to_string(), a.query.to_string()))
            .collect();
        assert_eq!(
            rendered,
            vec![
                ("css".to_string(), "#a".to_string()),
                ("css".to_string(), "#b".to_string()),
                ("other".to_string(), "#a".to_string()),
            ]
        );
    }
}
