//! Repetition check run before an intent is executed.

use crate::types::{ActionHistory, ActionIntent, ActionKind, ActionRecord};

/// How many identical trailing records it takes to call a repeat.
pub const LOOP_WINDOW: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopVerdict {
    /// Same action again after attempts that did not all succeed.
    Repeating,
    /// Same action again after it already succeeded every time.
    Stalled,
    /// `done` declared again after being turned away each time.
    DoneRejected,
}

pub struct LoopGuard;

impl LoopGuard {
    /// `Some` when the last [`LOOP_WINDOW`] records share the proposed
    /// intent's kind and normalized target.
    pub fn check(history: &ActionHistory, proposed: &ActionIntent) -> Option<LoopVerdict> {
        let window = history.recent(LOOP_WINDOW);
        if window.len() < LOOP_WINDOW {
            return None;
        }
        let key = proposed.normalized_target();
        let same = |record: &ActionRecord| {
            record.intent.kind == proposed.kind && record.intent.normalized_target() == key
        };
        if !window.iter().all(same) {
            return None;
        }

        if proposed.kind == ActionKind::Done {
            Some(LoopVerdict::DoneRejected)
        } else if window.iter().all(ActionRecord::is_success) {
            Some(LoopVerdict::Stalled)
        } else {
            Some(LoopVerdict::Repeating)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionStatus;

    fn history(entries: &[(&str, ActionStatus)]) -> ActionHistory {
        let mut history = ActionHistory::new();
        for (step, (target, status)) in entries.iter().enumerate() {
            history.push(ActionRecord {
                step: step + 1,
                intent: ActionIntent::new(ActionKind::Click, *target),
                status: *status,
                state_changed: None,
            });
        }
        history
    }

    fn click(target: &str) -> ActionIntent {
        ActionIntent::new(ActionKind::Click, target)
    }

    #[test]
    fn three_identical_clicks_then_same_again_is_a_loop() {
        let h = history(&[
            ("Next", ActionStatus::Failed),
            ("Next", ActionStatus::Success),
            ("Next", ActionStatus::Failed),
        ]);
        assert_eq!(LoopGuard::check(&h, &click(" next ")), Some(LoopVerdict::Repeating));
    }

    #[test]
    fn repeated_success_is_reported_as_stalled() {
        let h = history(&[
            ("Next", ActionStatus::Success),
            ("Next", ActionStatus::Success),
            ("Next", ActionStatus::Success),
        ]);
        assert_eq!(LoopGuard::check(&h, &click("next")), Some(LoopVerdict::Stalled));
    }

    #[test]
    fn alternating_targets_are_not_a_loop() {
        let h = history(&[
            ("A", ActionStatus::Failed),
            ("B", ActionStatus::Failed),
            ("A", ActionStatus::Failed),
        ]);
        assert_eq!(LoopGuard::check(&h, &click("A")), None);
    }

    #[test]
    fn needs_a_full_window_and_a_matching_proposal() {
        let short = history(&[("Next", ActionStatus::Failed), ("Next", ActionStatus::Failed)]);
        assert_eq!(LoopGuard::check(&short, &click("Next")), None);

        let full = history(&[
            ("Next", ActionStatus::Failed),
            ("Next", ActionStatus::Failed),
            ("Next", ActionStatus::Failed),
        ]);
        assert_eq!(LoopGuard::check(&full, &click("Back")), None);
        let typed = ActionIntent::new(ActionKind::Type, "Next");
        assert_eq!(LoopGuard::check(&full, &typed), None);
    }

    #[test]
    fn repeated_rejected_done() {
        let mut h = ActionHistory::new();
        for step in 1..=3 {
            h.push(ActionRecord {
                step,
                intent: ActionIntent::done("looks finished"),
                status: ActionStatus::Rejected,
                state_changed: None,
            });
        }
        let verdict = LoopGuard::check(&h, &ActionIntent::done("really finished"));
        assert_eq!(verdict, Some(LoopVerdict::DoneRejected));
    }
}
