//! Per-iteration session state
//!
//! A `SessionContext` is created fresh for every iteration, owned by the one
//! worker running it, and consumed by [`SessionContext::finish`], which always
//! drops the auth token.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

use super::check::{CheckOutcome, Severity};
use crate::transport::TransportError;
use crate::users::Credential;

/// Position of an iteration in the session state machine
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "read", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Authenticating,
    Authenticated,
    /// Index of the read step in flight
    Reading(usize),
    LoggingOut,
    Completed,
    Failed,
    /// Cut off by the shutdown grace period
    Abandoned,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Abandoned
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => f.write_str("idle"),
            SessionState::Authenticating => f.write_str("authenticating"),
            SessionState::Authenticated => f.write_str("authenticated"),
            SessionState::Reading(i) => write!(f, "reading[{}]", i),
            SessionState::LoggingOut => f.write_str("logging_out"),
            SessionState::Completed => f.write_str("completed"),
            SessionState::Failed => f.write_str("failed"),
            SessionState::Abandoned => f.write_str("abandoned"),
        }
    }
}

/// Run-time step errors. Recorded against the iteration, never propagated.
#[derive(Debug, Clone, Error)]
pub enum StepError {
    #[error("{step}: HTTP {status}")]
    Http { step: String, status: u16 },

    #[error("{step}: {source}")]
    Transport {
        step: String,
        source: TransportError,
    },

    #[error("{step}: assertion '{check}' failed")]
    Assertion { step: String, check: String },

    #[error("iteration still running when the shutdown grace period expired")]
    ShutdownTimeout,
}

/// Wall-clock bounds and duration of one step
#[derive(Debug, Clone, Serialize)]
pub struct StepTiming {
    pub step: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed: Duration,
    /// `None` when the request never got a response
    pub status: Option<u16>,
}

#[derive(Debug, Default)]
pub struct SessionContext {
    auth_token: Option<String>,
    pub credential: Option<Credential>,
    state: SessionState,
    pub timings: Vec<StepTiming>,
    pub checks: Vec<CheckOutcome>,
    pub errors: Vec<StepError>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transition(&mut self, next: SessionState) {
        trace!("session {} -> {}", self.state, next);
        self.state = next;
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    pub fn set_auth_token(&mut self, token: String) {
        self.auth_token = Some(token);
    }

    pub fn clear_auth_token(&mut self) {
        self.auth_token = None;
    }

    /// Move to `Failed`, dropping any held token
    pub fn fail(&mut self) {
        self.clear_auth_token();
        self.transition(SessionState::Failed);
    }

    pub fn record_check(&mut self, step: &str, name: &str, passed: bool, severity: Severity) {
        if !passed && severity == Severity::Check {
            self.errors.push(StepError::Assertion {
                step: step.to_string(),
                check: name.to_string(),
            });
        }
        self.checks.push(CheckOutcome {
            step: step.to_string(),
            name: name.to_string(),
            passed,
            severity,
        });
    }

    pub fn record_timing(&mut self, timing: StepTiming) {
        self.timings.push(timing);
    }

    pub fn record_error(&mut self, error: StepError) {
        self.errors.push(error);
    }

    /// End the iteration. The token is cleared whatever the outcome; a context
    /// that never reached a terminal state is reported as failed.
    pub fn finish(mut self) -> IterationReport {
        self.clear_auth_token();
        if !self.state.is_terminal() {
            self.transition(SessionState::Failed);
        }
        IterationReport {
            state: self.state,
            timings: self.timings,
            checks: self.checks,
            errors: self.errors,
        }
    }
}

/// What one iteration hands to the run aggregator
#[derive(Debug, Clone)]
pub struct IterationReport {
    pub state: SessionState,
    pub timings: Vec<StepTiming>,
    pub checks: Vec<CheckOutcome>,
    pub errors: Vec<StepError>,
}

impl IterationReport {
    /// Report for an iteration cut off during shutdown
    pub fn abandoned() -> Self {
        Self {
            state: SessionState::Abandoned,
            timings: Vec::new(),
            checks: Vec::new(),
            errors: vec![StepError::ShutdownTimeout],
        }
    }

    pub fn completed(&self) -> bool {
        self.state == SessionState::Completed
    }
}
