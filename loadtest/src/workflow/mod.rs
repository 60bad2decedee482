//! Scripted session workflows
//!
//! This module provides:
//! - `Workflow` capability trait (`name` + `run`)
//! - `SessionWorkflow` state machine with per-step timing and checks
//! - `SessionContext`, the per-iteration state owned by one worker
//! - `basic_session`, the stock login/stats/leaderboard/logout script

pub mod basic;
mod check;
mod context;
mod session;
mod step;

pub use basic::basic_session;
pub use check::{Check, CheckOutcome, Expectation, Severity};
pub use context::{IterationReport, SessionContext, SessionState, StepError, StepTiming};
pub use session::{LOGIN_STATUS_CHECK, RESPONDED_CHECK, SessionWorkflow, TOKEN_CHECK, Workflow};
pub use step::WorkflowStep;
