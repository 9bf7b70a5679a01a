//! Post-action check for an observable page change.

use std::time::Duration;

use tracing::debug;

use crate::driver::PageDriver;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    UrlChanged(String),
    /// URL stayed put but network/DOM activity settled within the budget.
    Settled,
    Unchanged,
}

impl StateChange {
    pub fn changed(&self) -> bool {
        !matches!(self, StateChange::Unchanged)
    }
}

#[derive(Debug, Clone)]
pub struct StateChangeVerifier {
    poll_interval: Duration,
    settle_pause: Duration,
}

impl StateChangeVerifier {
    pub fn new(poll_interval: Duration, settle_pause: Duration) -> Self {
        Self {
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            settle_pause,
        }
    }

    /// Polls the URL until it differs from `previous_url` or `timeout` is
    /// spent, then waits for quiescence with whatever budget is left (at
    /// least one poll interval), then gives up after one short pause.
    /// Budget is counted in requested pause time, not wall-clock time.
    pub fn wait_for_change(
        &self,
        driver: &mut dyn PageDriver,
        previous_url: &str,
        timeout: Duration,
    ) -> StateChange {
        let mut spent = Duration::ZERO;
        loop {
            match driver.current_url() {
                Ok(url) if url != previous_url => {
                    debug!(from = previous_url, to = %url, "url changed");
                    return StateChange::UrlChanged(url);
                }
                Ok(_) => {}
                Err(err) => debug!(%err, "could not read url while polling"),
            }
            if spent >= timeout {
                break;
            }
            let step = self.poll_interval.min(timeout - spent);
            driver.pause(step);
            spent += step;
        }

        let remaining = timeout.saturating_sub(spent).max(self.poll_interval);
        match driver.wait_for_idle(remaining) {
            Ok(()) => StateChange::Settled,
            Err(err) => {
                debug!(%err, "page did not settle");
                driver.pause(self.settle_pause);
                StateChange::Unchanged
            }
        }
    }
}
