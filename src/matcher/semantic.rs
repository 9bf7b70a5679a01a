//! Keyword scoring over enumerated interactive elements.

use crate::driver::ElementInfo;
use crate::matcher::keywords::Keyword;

/// Minimum score before a semantic match is trusted.
pub const CONFIDENCE_FLOOR: i32 = 50;

/// Added when a keyword is the element's entire text.
pub const EXACT_MATCH_BONUS: i32 = 200;

pub fn score_text(combined_text: &str, keywords: &[Keyword]) -> i32 {
    let combined_text = combined_text.trim();
    if combined_text.is_empty() {
        return 0;
    }
    keywords
        .iter()
        .filter(|kw| combined_text.contains(kw.phrase.as_str()))
        .map(|kw| {
            let bonus = if kw.phrase == combined_text {
                EXACT_MATCH_BONUS
            } else {
                0
            };
            kw.weight() + bonus
        })
        .sum()
}

#[derive(Debug, Clone, PartialEq)]
pub struct SemanticMatch {
    pub index: usize,
    pub score: i32,
    pub matched_text: String,
}

/// Highest-scoring element, if it clears [`CONFIDENCE_FLOOR`]. Ties go to the
/// element that comes first in document order.
pub fn best_match(elements: &[ElementInfo], keywords: &[Keyword]) -> Option<SemanticMatch> {
    let mut best: Option<SemanticMatch> = None;
    for (index, element) in elements.iter().enumerate() {
        let combined = element.combined_text();
        let score = score_text(&combined, keywords);
        if best.as_ref().is_none_or(|b| score > b.score) {
            best = Some(SemanticMatch {
                index,
                score,
                matched_text: combined,
            });
        }
    }
    best.filter(|b| b.score >= CONFIDENCE_FLOOR)
}
