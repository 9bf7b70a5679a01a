//! Keyword derivation for the semantic and keyword-selector tiers.

use std::collections::HashSet;

/// Words that carry no signal about which element is meant.
pub const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "to", "of", "in", "on", "at", "for", "and", "or", "with", "by", "from",
    "into", "onto", "this", "that", "these", "those", "it", "its", "is", "are", "be", "will",
    "should", "can", "we", "i", "you", "me", "my", "our", "your", "then", "now", "so", "click",
    "clicking", "press", "tap", "button", "link", "icon", "element", "please",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    pub phrase: String,
    pub words: usize,
}

impl Keyword {
    fn new(tokens: &[String]) -> Self {
        Self {
            phrase: tokens.join(" "),
            words: tokens.len(),
        }
    }

    /// Score contributed when this keyword occurs in an element's text.
    pub fn weight(&self) -> i32 {
        match self.words {
            0 | 1 => 10,
            2 => 50,
            _ => 100,
        }
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty() && !STOP_WORDS.contains(token))
        .map(str::to_string)
        .collect()
}

/// Ranked keywords for `target` + `rationale`: 3-grams, 2-grams, then single
/// tokens longer than two characters; longest phrase first, duplicates dropped,
/// generation order kept among equal lengths.
pub fn extract_keywords(target: &str, rationale: &str) -> Vec<Keyword> {
    let tokens = tokenize(&format!("{target} {rationale}"));

    let mut keywords: Vec<Keyword> = Vec::new();
    for size in [3, 2] {
        keywords.extend(tokens.windows(size).map(Keyword::new));
    }
    keywords.extend(
        tokens
            .iter()
            .filter(|token| token.chars().count() > 2)
            .map(|token| Keyword::new(std::slice::from_ref(token))),
    );

    keywords.sort_by_key(|kw| std::cmp::Reverse(kw.phrase.chars().count()));

    let mut seen = HashSet::new();
    keywords.retain(|kw| seen.insert(kw.phrase.clone()));
    keywords
}
