//! Run controller: the step loop, the done gate and outcome classification.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::CaptureConfig;
use crate::decision::{self, Decision, DecisionOracle, Observation, PROMPT_HISTORY};
use crate::driver::PageDriver;
use crate::error::DriverError;
use crate::executor::ActionExecutor;
use crate::guard::{LoopGuard, LoopVerdict};
use crate::types::{
    ActionHistory, ActionIntent, ActionKind, ActionRecord, ActionStatus, FailureReason, RunOutcome,
    RunReport, TraceFrame,
};

/// What a run accumulates while it goes.
#[derive(Debug, Default)]
struct Trace {
    frames: Vec<TraceFrame>,
    history: ActionHistory,
    steps: usize,
}

impl Trace {
    fn record(
        &mut self,
        step: usize,
        intent: ActionIntent,
        status: ActionStatus,
        state_changed: Option<bool>,
    ) {
        self.history.push(ActionRecord {
            step,
            intent,
            status,
            state_changed,
        });
    }
}

/// Input of one capture run.
#[derive(Debug, Clone, Copy)]
pub struct RunRequest<'a> {
    pub task: &'a str,
    pub app: &'a str,
    pub start_url: &'a str,
}

pub struct RunController {
    config: CaptureConfig,
    executor: ActionExecutor,
}

fn driver_failure(context: &str, err: DriverError) -> FailureReason {
    FailureReason::DriverFailure(format!("{context}: {err}"))
}

impl RunController {
    pub fn new(config: CaptureConfig) -> Self {
        let executor = ActionExecutor::new(&config);
        Self { config, executor }
    }

    /// Drive one run to a terminal state. Never fails: every way a run can
    /// end is reported through [`RunOutcome`], together with whatever trace
    /// was captured up to that point.
    pub fn run(
        &self,
        driver: &mut dyn PageDriver,
        oracle: &mut dyn DecisionOracle,
        request: RunRequest<'_>,
    ) -> RunReport {
        let mut trace = Trace::default();
        let result = self.drive(driver, oracle, request, &mut trace);

        let successful_actions = trace.history.successful_actions();
        let outcome = RunOutcome {
            completed: result.is_ok(),
            steps: trace.steps,
            successful_actions,
            failure_reason: result.err(),
        };
        match &outcome.failure_reason {
            None => info!(steps = outcome.steps, successful_actions, "run completed"),
            Some(reason) => warn!(
                steps = outcome.steps,
                successful_actions,
                %reason,
                "run ended without completing"
            ),
        }

        RunReport {
            task: request.task.to_string(),
            app: request.app.to_string(),
            start_url: request.start_url.to_string(),
            frames: trace.frames,
            history: trace.history,
            outcome,
        }
    }

    fn drive(
        &self,
        driver: &mut dyn PageDriver,
        oracle: &mut dyn DecisionOracle,
        request: RunRequest<'_>,
        trace: &mut Trace,
    ) -> Result<(), FailureReason> {
        info!(task = request.task, url = request.start_url, "starting capture run");
        driver
            .navigate(request.start_url, self.config.navigation_timeout)
            .map_err(|err| driver_failure("initial navigation", err))?;
        if let Err(err) = driver.wait_for_idle(self.config.navigation_timeout) {
            debug!(%err, "start page never went idle");
        }
        driver.pause(self.config.settle_pause);

        for step in 1..=self.config.max_steps {
            trace.steps = step;
            let frame = capture(driver, step).map_err(|err| driver_failure("capture", err))?;
            trace.frames.push(frame);

            let intent = self.ask(oracle, request.task, step, trace)?;
            info!(step, action = %intent.kind, wanted = %intent.target, "oracle proposed");

            let successes = trace.history.successful_actions();
            if intent.kind == ActionKind::Done && successes >= self.config.min_successful_actions {
                info!(step, successes, rationale = %intent.rationale, "done accepted");
                return Ok(());
            }

            // Before executing, so a doomed repeat costs no step.
            if let Some(verdict) = LoopGuard::check(&trace.history, &intent) {
                warn!(step, ?verdict, action = %intent.kind, wanted = %intent.target, "repeating action");
                return Err(match verdict {
                    LoopVerdict::Repeating => FailureReason::LoopDetected,
                    LoopVerdict::Stalled => FailureReason::Stalled,
                    LoopVerdict::DoneRejected => FailureReason::DoneRejectedLoop,
                });
            }

            if intent.kind == ActionKind::Done {
                warn!(
                    step,
                    successes,
                    required = self.config.min_successful_actions,
                    "done rejected: not enough progress yet"
                );
                trace.record(step, intent, ActionStatus::Rejected, None);
                continue;
            }

            let execution = self.executor.execute_detailed(driver, &intent);
            let status = if execution.success {
                ActionStatus::Success
            } else {
                ActionStatus::Failed
            };
            info!(step, ?status, "step finished");
            trace.record(step, intent, status, execution.state_changed);
            self.settle(driver);
        }

        if trace.history.successful_actions() == 0 {
            Err(FailureReason::NoActions)
        } else {
            Err(FailureReason::MaxStepsReached)
        }
    }

    fn ask(
        &self,
        oracle: &mut dyn DecisionOracle,
        task: &str,
        step: usize,
        trace: &Trace,
    ) -> Result<ActionIntent, FailureReason> {
        let (screenshot, url) = trace
            .frames
            .last()
            .map(|frame| (frame.screenshot.as_slice(), frame.url.as_str()))
            .unwrap_or_default();
        let observation = Observation {
            screenshot,
            task,
            url,
            step,
            recent: trace.history.recent(PROMPT_HISTORY),
        };
        let decision = decision::decide(oracle, &observation)
            .map_err(|err| FailureReason::OracleFailure(err.to_string()))?;
        debug!(step, decision = decision.label(), "oracle reply parsed");
        match &decision {
            Decision::Parsed(_) => {}
            Decision::Recovered(_, reason) => {
                warn!(step, reason = %reason, "oracle reply was not JSON; intent inferred")
            }
            Decision::Unparseable(_) => warn!(step, "oracle reply unusable; stopping"),
        }
        Ok(decision.into_intent())
    }

    fn settle(&self, driver: &mut dyn PageDriver) {
        if let Err(err) = driver.wait_for_idle(self.config.idle_timeout) {
            debug!(%err, "page still busy after action");
        }
        driver.pause(self.config.step_pause);
    }
}

fn capture(driver: &mut dyn PageDriver, step: usize) -> Result<TraceFrame, DriverError> {
    let screenshot = driver.screenshot()?;
    let url = driver.current_url()?;
    let title = driver.title().unwrap_or_default();
    Ok(TraceFrame {
        step,
        screenshot,
        url,
        title,
        timestamp: Utc::now(),
    })
}
