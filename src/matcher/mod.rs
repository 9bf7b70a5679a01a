//! Element matcher: turns a loose target description into a live element.
//!
//! Click resolution walks [`CLICK_TIERS`] in order. Each tier is a plain
//! function over the page and the intent; it offers candidates to the
//! caller's `accept` callback and the first accepted candidate ends the walk.
//! The matcher itself never mutates the page; acting on a candidate is the
//! caller's business.

pub mod fill;
pub mod keywords;
pub mod semantic;
pub mod spatial;
pub mod strategies;

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::driver::{ElementInfo, PageDriver};
use crate::types::ActionIntent;
use keywords::{Keyword, extract_keywords};
pub use strategies::{Attempt, Candidate, Tier};

/// Decides whether a candidate worked out (typically: clicks it).
pub type Accept<'a> = dyn FnMut(&mut dyn PageDriver, &Candidate) -> bool + 'a;

type TierFn = fn(&mut Probe<'_, '_>) -> Option<Candidate>;

/// Click tiers, strictly ordered.
const CLICK_TIERS: [(Tier, TierFn); 5] = [
    (Tier::Exact, exact_tier),
    (Tier::Semantic, semantic_tier),
    (Tier::Spatial, spatial_tier),
    (Tier::KeywordSelector, keyword_selector_tier),
    (Tier::Fallback, fallback_tier),
];

#[derive(Debug, Clone, PartialEq)]
pub struct ClickResolution {
    pub resolved: Option<(Tier, Candidate)>,
    pub tiers_tried: Vec<Tier>,
}

impl ClickResolution {
    pub fn succeeded(&self) -> bool {
        self.resolved.is_some()
    }
}

struct Probe<'p, 'a> {
    driver: &'p mut dyn PageDriver,
    intent: &'p ActionIntent,
    keywords: &'p [Keyword],
    timeout: Duration,
    accept: &'p mut Accept<'a>,
}

impl Probe<'_, '_> {
    fn offer(&mut self, candidate: Candidate) -> Option<Candidate> {
        if (self.accept)(&mut *self.driver, &candidate) {
            Some(candidate)
        } else {
            debug!(
                strategy = %candidate.strategy,
                element = candidate.handle.id(),
                "candidate rejected"
            );
            None
        }
    }

    /// Runs each attempt with its own time box; the first element found and
    /// accepted wins. A failing attempt never stops the ones after it.
    fn run_attempts(&mut self, attempts: Vec<Attempt>) -> Option<Candidate> {
        for attempt in attempts {
            match self.driver.find(&attempt.query, self.timeout) {
                Ok(handle) => {
                    let candidate = Candidate {
                        handle,
                        score: 0,
                        matched_text: attempt.query.to_string(),
                        strategy: attempt.strategy.to_string(),
                    };
                    if let Some(accepted) = self.offer(candidate) {
                        return Some(accepted);
                    }
                }
                Err(err) => {
                    debug!(strategy = attempt.strategy, query = %attempt.query, %err, "attempt missed");
                }
            }
        }
        None
    }

    fn enumerate(&mut self) -> Vec<ElementInfo> {
        match self.driver.interactive_elements() {
            Ok(elements) => elements,
            Err(err) => {
                warn!(%err, "could not enumerate interactive elements");
                Vec::new()
            }
        }
    }
}

fn exact_tier(probe: &mut Probe<'_, '_>) -> Option<Candidate> {
    let attempts = strategies::exact_attempts(&probe.intent.target);
    probe.run_attempts(attempts)
}

fn semantic_tier(probe: &mut Probe<'_, '_>) -> Option<Candidate> {
    if probe.keywords.is_empty() {
        return None;
    }
    let elements = probe.enumerate();
    let best = semantic::best_match(&elements, probe.keywords)?;
    let element = elements.into_iter().nth(best.index)?;
    debug!(score = best.score, text = %best.matched_text, "semantic best match");
    probe.offer(Candidate {
        handle: element.handle,
        score: best.score,
        matched_text: best.matched_text,
        strategy: "semantic".to_string(),
    })
}

fn spatial_tier(probe: &mut Probe<'_, '_>) -> Option<Candidate> {
    let hint = probe
        .intent
        .location_hint
        .as_ref()
        .map(|h| h.position.trim().to_string())
        .filter(|p| !p.is_empty())?;
    let viewport = match probe.driver.viewport() {
        Ok(viewport) => viewport,
        Err(err) => {
            warn!(%err, "could not read viewport");
            return None;
        }
    };
    let elements = probe.enumerate();
    let (index, score) = spatial::best_in_region(&elements, &hint, &viewport)?;
    let element = elements.into_iter().nth(index)?;
    let matched_text = element.combined_text();
    probe.offer(Candidate {
        handle: element.handle,
        score,
        matched_text,
        strategy: "spatial".to_string(),
    })
}

fn keyword_selector_tier(probe: &mut Probe<'_, '_>) -> Option<Candidate> {
    let attempts = strategies::keyword_attempts(probe.keywords);
    probe.run_attempts(attempts)
}

fn fallback_tier(probe: &mut Probe<'_, '_>) -> Option<Candidate> {
    let attempts = strategies::fallback_attempts(&probe.intent.target);
    probe.run_attempts(attempts)
}

#[derive(Debug, Clone)]
pub struct ElementMatcher {
    tier_timeout: Duration,
}

impl ElementMatcher {
    pub fn new(tier_timeout: Duration) -> Self {
        Self { tier_timeout }
    }

    /// Walk the click tiers until `accept` takes a candidate.
    pub fn resolve_click(
        &self,
        driver: &mut dyn PageDriver,
        intent: &ActionIntent,
        accept: &mut Accept<'_>,
    ) -> ClickResolution {
        let keywords = extract_keywords(&intent.target, &intent.rationale);
        let mut probe = Probe {
            driver,
            intent,
            keywords: &keywords,
            timeout: self.tier_timeout,
            accept,
        };

        let mut tiers_tried = Vec::new();
        for (tier, run) in CLICK_TIERS {
            tiers_tried.push(tier);
            if let Some(candidate) = run(&mut probe) {
                info!(
                    tier = tier.name(),
                    strategy = %candidate.strategy,
                    wanted = %intent.target,
                    "resolved click target"
                );
                return ClickResolution {
                    resolved: Some((tier, candidate)),
                    tiers_tried,
                };
            }
            debug!(tier = tier.name(), wanted = %intent.target, "tier produced nothing");
        }

        warn!(wanted = %intent.target, "all click tiers exhausted");
        ClickResolution {
            resolved: None,
            tiers_tried,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::scripted::{ScriptedElement, ScriptedPage};

    fn matcher() -> ElementMatcher {
        ElementMatcher::new(Duration::from_millis(10))
    }

    fn click_it(driver: &mut dyn PageDriver, candidate: &Candidate) -> bool {
        driver.click(&candidate.handle, Duration::from_millis(10)).is_ok()
    }

    fn page() -> ScriptedPage {
        ScriptedPage::new("https://app.test/")
            .with_element(ScriptedElement::link("login", "Login").at(20.0, 10.0, 60.0, 20.0))
            .with_element(
                ScriptedElement::button("create", "Create Project").at(500.0, 300.0, 120.0, 30.0),
            )
            .with_element(
                ScriptedElement::new("settings", "div")
                    .attr("role", "button")
                    .attr("aria-label", "Workspace settings")
                    .at(1200.0, 10.0, 30.0, 30.0),
            )
            .with_element(ScriptedElement::button("submit", "Submit").at(600.0, 650.0, 80.0, 30.0))
    }

    #[test]
    fn exact_match_short_circuits_everything_else() {
        let mut page = page();
        let intent = ActionIntent::new(crate::types::ActionKind::Click, "Create Project");
        let resolution = matcher().resolve_click(&mut page, &intent, &mut click_it);

        let (tier, candidate) = resolution.resolved.clone().unwrap();
        assert_eq!(tier, Tier::Exact);
        assert_eq!(candidate.strategy, "exact text");
        assert_eq!(resolution.tiers_tried, vec![Tier::Exact]);
        assert_eq!(page.calls().find, 1);
        assert_eq!(page.calls().enumerate, 0);
        assert_eq!(page.clicked(), ["create"]);
    }

    #[test]
    fn semantic_tier_uses_rationale() {
        let mut page = page();
        let intent = ActionIntent::new(crate::types::ActionKind::Click, "the create project btn")
            .with_rationale("start a new project");
        let resolution = matcher().resolve_click(&mut page, &intent, &mut click_it);
        let (tier, candidate) = resolution.resolved.unwrap();
        assert_eq!(tier, Tier::Semantic);
        assert_eq!(candidate.handle.id(), "create");
        assert!(candidate.score >= semantic::CONFIDENCE_FLOOR);
    }

    #[test]
    fn spatial_tier_follows_location_hint() {
        let mut page = page();
        let intent = ActionIntent::new(crate::types::ActionKind::Click, "gear")
            .with_position("top right toolbar");
        let resolution = matcher().resolve_click(&mut page, &intent, &mut click_it);
        let (tier, candidate) = resolution.resolved.unwrap();
        assert_eq!(tier, Tier::Spatial);
        assert_eq!(candidate.handle.id(), "settings");
        assert_eq!(
            resolution.tiers_tried,
            vec![Tier::Exact, Tier::Semantic, Tier::Spatial]
        );
    }

    #[test]
    fn spatial_regions_scale_with_the_viewport() {
        let toolbar = || {
            ScriptedPage::new("https://app.test/")
                .with_element(
                    ScriptedElement::new("prefs", "div")
                        .attr("role", "button")
                        .attr("aria-label", "Preferences")
                        .at(700.0, 10.0, 30.0, 30.0),
                )
                .with_element(
                    ScriptedElement::new("inbox", "div")
                        .attr("role", "button")
                        .attr("aria-label", "Inbox")
                        .at(380.0, 10.0, 30.0, 30.0),
                )
        };
        let intent = ActionIntent::new(crate::types::ActionKind::Click, "cog").with_position("right");

        let mut narrow = toolbar().with_viewport(800.0, 600.0);
        let resolution = matcher().resolve_click(&mut narrow, &intent, &mut click_it);
        let (tier, candidate) = resolution.resolved.unwrap();
        assert_eq!(tier, Tier::Spatial);
        assert_eq!(candidate.handle.id(), "prefs");

        // 715px is left of the right third on a 1280px screen
        let mut wide = toolbar();
        let resolution = matcher().resolve_click(&mut wide, &intent, &mut click_it);
        assert!(resolution.resolved.is_none());
        assert!(wide.clicked().is_empty());
    }

    #[test]
    fn keyword_selector_tier_matches_aria_substring() {
        let mut page = page();
        let intent = ActionIntent::new(crate::types::ActionKind::Click, "workspace");
        let resolution = matcher().resolve_click(&mut page, &intent, &mut click_it);
        let (tier, candidate) = resolution.resolved.unwrap();
        // single word scores 10 in the semantic tier, under the floor
        assert_eq!(tier, Tier::KeywordSelector);
        assert_eq!(candidate.strategy, "keyword aria-label");
        assert_eq!(candidate.handle.id(), "settings");
    }

    #[test]
    fn fallback_tier_catches_short_targets() {
        let mut page = page();
        // "Su" has no usable keywords and no exact match
        let intent = ActionIntent::new(crate::types::ActionKind::Click, "Su");
        let resolution = matcher().resolve_click(&mut page, &intent, &mut click_it);
        let (tier, candidate) = resolution.resolved.unwrap();
        assert_eq!(tier, Tier::Fallback);
        assert_eq!(candidate.strategy, "partial text");
        assert_eq!(candidate.handle.id(), "submit");
    }

    #[test]
    fn rejected_candidates_fall_through_to_later_attempts() {
        let mut page = ScriptedPage::new("https://app.test/")
            .with_element(ScriptedElement::button("broken", "Next").rejects_click())
            .with_element(ScriptedElement::link("ok", "→").attr("aria-label", "Next"));
        let intent = ActionIntent::new(crate::types::ActionKind::Click, "Next");
        let resolution = matcher().resolve_click(&mut page, &intent, &mut click_it);
        let (tier, candidate) = resolution.resolved.unwrap();
        assert_eq!(tier, Tier::Exact);
        assert_eq!(candidate.strategy, "exact aria-label");
        assert_eq!(candidate.handle.id(), "ok");
        assert_eq!(page.clicked(), ["ok"]);
    }

    #[test]
    fn nothing_matches() {
        let mut page = page();
        let intent = ActionIntent::new(crate::types::ActionKind::Click, "Archive everything");
        let resolution = matcher().resolve_click(&mut page, &intent, &mut click_it);
        assert!(!resolution.succeeded());
        assert_eq!(resolution.tiers_tried.len(), CLICK_TIERS.len());
        assert!(page.clicked().is_empty());
    }
}
