//! Action resolution and execution engine for workflow capture runs.
//!
//! A run asks a [`DecisionOracle`] for the next step, resolves the loosely
//! described target against a live page through a [`PageDriver`], executes
//! it, and stops on completion, repetition or an exhausted step budget.

pub mod config;
pub mod controller;
pub mod decision;
pub mod driver;
pub mod error;
pub mod executor;
pub mod guard;
pub mod matcher;
pub mod types;
pub mod util;
pub mod verifier;

pub use config::CaptureConfig;
pub use controller::{RunController, RunRequest};
pub use decision::{Decision, DecisionOracle, OracleRequest};
pub use driver::{ElementHandle, ElementInfo, PageDriver, Query, Rect, Viewport};
pub use error::{ConfigError, DriverError, OracleError};
pub use executor::ActionExecutor;
pub use types::{
    ActionHistory, ActionIntent, ActionKind, ActionRecord, ActionStatus, FailureReason, RunOutcome,
    RunReport, RunState, TraceFrame,
};
