//! Executes a validated intent against the page.
//!
//! Nothing in here returns an error: primitive failures are logged and turn
//! into `success: false`.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::CaptureConfig;
use crate::driver::{ElementHandle, PageDriver};
use crate::error::DriverError;
use crate::matcher::fill::fill_attempts;
use crate::matcher::{Candidate, ElementMatcher};
use crate::types::{ActionIntent, ActionKind};
use crate::verifier::StateChangeVerifier;

pub const DEFAULT_WAIT_MS: u64 = 1000;

/// Select-all chords, platform-native first.
pub const SELECT_ALL_CHORDS: [&str; 2] = if cfg!(target_os = "macos") {
    ["Meta+A", "Control+A"]
} else {
    ["Control+A", "Meta+A"]
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Execution {
    pub success: bool,
    /// Only set for clicks.
    pub state_changed: Option<bool>,
}

impl Execution {
    fn failed() -> Self {
        Self {
            success: false,
            state_changed: None,
        }
    }

    fn succeeded() -> Self {
        Self {
            success: true,
            state_changed: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActionExecutor {
    matcher: ElementMatcher,
    verifier: StateChangeVerifier,
    default_type_text: String,
    tier_timeout: Duration,
    fill_timeout: Duration,
    navigation_timeout: Duration,
    change_timeout: Duration,
    max_wait: Duration,
}

fn log_failure(action: &str, target: &str, err: &DriverError) {
    if err.is_fatal() {
        error!(action, wanted = target, %err, "page is gone");
    } else {
        warn!(action, wanted = target, %err, "action failed");
    }
}

impl ActionExecutor {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            matcher: ElementMatcher::new(config.tier_timeout),
            verifier: StateChangeVerifier::new(config.poll_interval, config.settle_pause),
            default_type_text: config.default_type_text.clone(),
            tier_timeout: config.tier_timeout,
            fill_timeout: config.fill_timeout,
            navigation_timeout: config.navigation_timeout,
            change_timeout: config.change_timeout,
            max_wait: config.max_wait,
        }
    }

    pub fn execute(&self, driver: &mut dyn PageDriver, intent: &ActionIntent) -> bool {
        self.execute_detailed(driver, intent).success
    }

    pub fn execute_detailed(&self, driver: &mut dyn PageDriver, intent: &ActionIntent) -> Execution {
        match &intent.kind {
            ActionKind::Click => self.click(driver, intent),
            ActionKind::Type => self.type_into(driver, intent),
            ActionKind::Navigate => self.navigate(driver, &intent.target),
            ActionKind::Wait => self.wait(driver, &intent.target),
            ActionKind::Done => {
                warn!("done is a terminal decision, not an executable action");
                Execution::failed()
            }
            ActionKind::Unknown(kind) => {
                warn!(action = %kind, "unknown action");
                Execution::failed()
            }
        }
    }

    fn click(&self, driver: &mut dyn PageDriver, intent: &ActionIntent) -> Execution {
        let previous_url = driver.current_url();
        let timeout = self.tier_timeout;
        let mut click_candidate = |page: &mut dyn PageDriver, candidate: &Candidate| {
            match page.click(&candidate.handle, timeout) {
                Ok(()) => true,
                Err(err) => {
                    debug!(strategy = %candidate.strategy, %err, "click attempt failed");
                    false
                }
            }
        };

        let resolution = self
            .matcher
            .resolve_click(driver, intent, &mut click_candidate);
        let Some((tier, candidate)) = resolution.resolved else {
            warn!(
                wanted = %intent.target,
                tiers = resolution.tiers_tried.len(),
                "could not click"
            );
            return Execution::failed();
        };

        // A click that changes nothing visible (e.g. a dialog button) still counts.
        let state_changed = match previous_url {
            Ok(previous_url) => Some(
                self.verifier
                    .wait_for_change(driver, &previous_url, self.change_timeout)
                    .changed(),
            ),
            Err(err) => {
                debug!(%err, "url unreadable before click; not verifying");
                None
            }
        };
        info!(
            tier = tier.name(),
            strategy = %candidate.strategy,
            wanted = %intent.target,
            changed = ?state_changed,
            "clicked"
        );
        Execution {
            success: true,
            state_changed,
        }
    }

    fn type_into(&self, driver: &mut dyn PageDriver, intent: &ActionIntent) -> Execution {
        let (target, text) = split_type_target(&intent.target, &intent.text);
        let text = if text.is_empty() {
            warn!(wanted = %target, default = %self.default_type_text, "type action missing text; defaulting");
            self.default_type_text.clone()
        } else {
            text
        };

        let mut last_error: Option<DriverError> = None;
        for attempt in fill_attempts(&target) {
            let handle = match driver.find(&attempt.query, self.fill_timeout) {
                Ok(handle) => handle,
                // the named field cannot be looked up; any other field would be a guess
                Err(err @ DriverError::InvalidQuery(_)) => {
                    warn!(wanted = %target, query = %attempt.query, %err, "field selector rejected by page");
                    return Execution::failed();
                }
                Err(err) => {
                    debug!(strategy = attempt.strategy, query = %attempt.query, %err, "no field");
                    last_error = Some(err);
                    continue;
                }
            };
            match self.fill_or_type(driver, &handle, &text) {
                Ok(()) => {
                    info!(
                        strategy = attempt.strategy,
                        query = %attempt.query,
                        value = %text,
                        "typed"
                    );
                    return Execution::succeeded();
                }
                Err(err) => {
                    debug!(strategy = attempt.strategy, %err, "could not enter text");
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(err) => log_failure("type", &target, &err),
            None => warn!(wanted = %target, "no field candidates to type into"),
        }
        Execution::failed()
    }

    /// Atomic fill first; otherwise focus, select all and type keystrokes.
    fn fill_or_type(
        &self,
        driver: &mut dyn PageDriver,
        handle: &ElementHandle,
        text: &str,
    ) -> Result<(), DriverError> {
        match driver.fill(handle, text, self.fill_timeout) {
            Ok(()) => return Ok(()),
            Err(err) => debug!(%err, "fill failed, falling back to keystrokes"),
        }
        if let Err(err) = driver.click(handle, self.tier_timeout) {
            debug!(%err, "focus click failed");
        }
        for chord in SELECT_ALL_CHORDS {
            if driver.press_keys(chord).is_ok() {
                break;
            }
        }
        driver.type_text(text)
    }

    fn navigate(&self, driver: &mut dyn PageDriver, url: &str) -> Execution {
        let url = url.trim();
        if url.is_empty() {
            warn!("navigate without a url");
            return Execution::failed();
        }
        match driver.navigate(url, self.navigation_timeout) {
            Ok(()) => {
                info!(url, "navigated");
                Execution::succeeded()
            }
            Err(err) => {
                log_failure("navigate", url, &err);
                Execution::failed()
            }
        }
    }

    fn wait(&self, driver: &mut dyn PageDriver, target: &str) -> Execution {
        let requested = parse_wait_ms(target);
        let millis = requested.min(self.max_wait.as_millis() as u64);
        if millis < requested {
            warn!(requested, capped = millis, "wait capped");
        }
        driver.pause(Duration::from_millis(millis));
        info!(millis, "waited");
        Execution::succeeded()
    }
}

pub fn parse_wait_ms(target: &str) -> u64 {
    target.trim().parse().unwrap_or(DEFAULT_WAIT_MS)
}

/// `selector|value` targets carry their own text when none was given.
fn split_type_target(target: &str, text: &str) -> (String, String) {
    if text.is_empty() {
        if let Some((selector, value)) = target.split_once('|') {
            return (selector.trim().to_string(), value.to_string());
        }
    }
    (target.to_string(), text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::scripted::{ScriptedElement, ScriptedPage};

    fn executor() -> ActionExecutor {
        let mut config = CaptureConfig::default();
        config.poll_interval = Duration::from_millis(50);
        ActionExecutor::new(&config)
    }

    fn form() -> ScriptedPage {
        ScriptedPage::new("https://app.test/new")
            .with_element(ScriptedElement::button("save", "Save").navigates_to("https://app.test/p/1"))
            .with_element(ScriptedElement::button("cancel", "Cancel"))
            .with_element(ScriptedElement::input("name").attr("placeholder", "Project name"))
            .with_element(ScriptedElement::textarea("desc").attr("id", "desc"))
    }

    #[test]
    fn click_reports_url_change() {
        let mut page = form();
        let result = executor().execute_detailed(&mut page, &ActionIntent::new(ActionKind::Click, "Save"));
        assert_eq!(
            result,
            Execution {
                success: true,
                state_changed: Some(true)
            }
        );
        assert_eq!(page.url(), "https://app.test/p/1");
    }

    #[test]
    fn click_without_visible_effect_still_succeeds() {
        let mut page = form().with_busy_network();
        let result = executor().execute_detailed(&mut page, &ActionIntent::new(ActionKind::Click, "Cancel"));
        assert!(result.success);
        assert_eq!(result.state_changed, Some(false));
    }

    #[test]
    fn unresolvable_click_fails() {
        let mut page = form();
        assert!(!executor().execute(&mut page, &ActionIntent::new(ActionKind::Click, "Delete workspace")));
    }

    #[test]
    fn empty_text_gets_placeholder_value() {
        let mut page = form();
        let intent = ActionIntent::new(ActionKind::Type, "description");
        assert!(executor().execute(&mut page, &intent));
        assert_eq!(page.value_of("name"), Some("Test Project"));
    }

    #[test]
    fn free_text_target_prefers_attribute_match() {
        let mut page = form();
        let intent = ActionIntent::new(ActionKind::Type, "Project name").with_text("Apollo");
        assert!(executor().execute(&mut page, &intent));
        assert_eq!(page.value_of("name"), Some("Apollo"));
        assert_eq!(page.calls().find, 1);
    }

    #[test]
    fn pipe_target_carries_text() {
        let mut page = form();
        let intent = ActionIntent::new(ActionKind::Type, "#desc|Some notes");
        assert!(executor().execute(&mut page, &intent));
        assert_eq!(page.value_of("desc"), Some("Some notes"));
    }

    #[test]
    fn fill_failure_falls_back_to_keystrokes() {
        let mut page = ScriptedPage::new("https://app.test/")
            .with_element(ScriptedElement::editable("notes").attr("aria-label", "Notes").rejects_fill());
        let intent = ActionIntent::new(ActionKind::Type, "Notes").with_text("hello");
        assert!(executor().execute(&mut page, &intent));
        assert_eq!(page.value_of("notes"), Some("hello"));
        assert_eq!(page.chords().len(), 1);
        assert!(page.chords()[0].ends_with("+A"));
        assert_eq!(page.calls().type_text, 1);
    }

    #[test]
    fn type_fails_when_no_field_exists() {
        let mut page = ScriptedPage::new("https://app.test/").with_element(ScriptedElement::button("b", "Go"));
        let intent = ActionIntent::new(ActionKind::Type, "Title").with_text("x");
        assert!(!executor().execute(&mut page, &intent));
    }

    #[test]
    fn navigate_and_wait() {
        let mut page = form().with_unreachable("https://down.test/");
        let exec = executor();
        assert!(exec.execute(&mut page, &ActionIntent::new(ActionKind::Navigate, "https://app.test/other")));
        assert_eq!(page.url(), "https://app.test/other");
        assert!(!exec.execute(&mut page, &ActionIntent::new(ActionKind::Navigate, "https://down.test/")));
        assert!(!exec.execute(&mut page, &ActionIntent::new(ActionKind::Navigate, " ")));

        assert!(exec.execute(&mut page, &ActionIntent::new(ActionKind::Wait, "2500")));
        assert!(exec.execute(&mut page, &ActionIntent::new(ActionKind::Wait, "soon")));
        assert_eq!(page.paused(), Duration::from_millis(3500));
    }

    #[test]
    fn unknown_and_done_kinds_fail_without_touching_the_page() {
        let mut page = form();
        let exec = executor();
        assert!(!exec.execute(&mut page, &ActionIntent::new(ActionKind::parse("scroll"), "down")));
        assert!(!exec.execute(&mut page, &ActionIntent::done("finished")));
        assert_eq!(page.calls(), &Default::default());
    }

    #[test]
    fn long_waits_are_capped() {
        let mut page = form();
        assert!(executor().execute(&mut page, &ActionIntent::new(ActionKind::Wait, "86400000")));
        assert_eq!(page.paused(), CaptureConfig::default().max_wait);
    }

    #[test]
    fn click_skips_verification_when_url_is_unreadable() {
        let mut page = form().with_unreadable_url();
        let result = executor().execute_detailed(&mut page, &ActionIntent::new(ActionKind::Click, "Save"));
        assert_eq!(
            result,
            Execution {
                success: true,
                state_changed: None
            }
        );
        assert_eq!(page.calls().wait_for_idle, 0);
        assert_eq!(page.paused(), Duration::ZERO);
    }

    #[test]
    fn xpath_field_target_never_lands_in_another_field() {
        let mut page = ScriptedPage::new("https://app.test/")
            .with_element(ScriptedElement::input("search"))
            .with_element(ScriptedElement::textarea("notes"));
        let intent = ActionIntent::new(ActionKind::Type, "//textarea").with_text("hello");
        assert!(!executor().execute(&mut page, &intent));
        assert_eq!(page.value_of("search"), None);
        assert_eq!(page.value_of("notes"), None);
        assert_eq!(page.calls().find, 1);
    }

    #[test]
    fn malformed_css_field_target_fails_without_fallback() {
        let mut page = form();
        let intent = ActionIntent::new(ActionKind::Type, "[name=").with_text("x");
        assert!(!executor().execute(&mut page, &intent));
        assert_eq!(page.value_of("name"), None);
    }

    #[test]
    fn wait_parsing() {
        assert_eq!(parse_wait_ms("250"), 250);
        assert_eq!(parse_wait_ms(" 40 "), 40);
        assert_eq!(parse_wait_ms("a while"), DEFAULT_WAIT_MS);
        assert_eq!(parse_wait_ms("-5"), DEFAULT_WAIT_MS);
    }
}
