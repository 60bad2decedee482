//! Named boolean assertions evaluated against step responses

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::transport::StepResponse;
use crate::users::Credential;

/// Whether a failed check counts toward the run's check ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Counted in pass/fail totals
    Check,
    /// Logged on failure; counted only when the run opts in
    Diagnostic,
}

/// What a check asserts about a response
#[derive(Debug, Clone, PartialEq)]
pub enum Expectation {
    Status(u16),
    /// JSON pointer resolves to exactly this value
    FieldEquals { pointer: String, expected: Value },
    /// JSON pointer resolves to the username the iteration logged in with
    FieldEqualsUsername { pointer: String },
    FieldPresent { pointer: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    pub name: String,
    pub expectation: Expectation,
    pub severity: Severity,
}

impl Check {
    fn new(name: impl Into<String>, expectation: Expectation) -> Self {
        Self {
            name: name.into(),
            expectation,
            severity: Severity::Check,
        }
    }

    pub fn status(name: impl Into<String>, code: u16) -> Self {
        Self::new(name, Expectation::Status(code))
    }

    pub fn field_equals(name: impl Into<String>, pointer: &str, expected: Value) -> Self {
        Self::new(
            name,
            Expectation::FieldEquals {
                pointer: pointer.to_string(),
                expected,
            },
        )
    }

    pub fn username_echo(name: impl Into<String>, pointer: &str) -> Self {
        Self::new(
            name,
            Expectation::FieldEqualsUsername {
                pointer: pointer.to_string(),
            },
        )
    }

    pub fn field_present(name: impl Into<String>, pointer: &str) -> Self {
        Self::new(
            name,
            Expectation::FieldPresent {
                pointer: pointer.to_string(),
            },
        )
    }

    /// Downgrade to a logged diagnostic
    pub fn diagnostic(mut self) -> Self {
        self.severity = Severity::Diagnostic;
        self
    }

    pub fn is_status_check(&self) -> bool {
        matches!(self.expectation, Expectation::Status(_))
    }

    pub fn evaluate(&self, response: &StepResponse, credential: Option<&Credential>) -> bool {
        let field = |pointer: &str| response.body.as_ref().and_then(|b| b.pointer(pointer));

        match &self.expectation {
            Expectation::Status(code) => response.status == *code,
            Expectation::FieldEquals { pointer, expected } => field(pointer) == Some(expected),
            Expectation::FieldEqualsUsername { pointer } => match credential {
                Some(c) => field(pointer).and_then(Value::as_str) == Some(c.username.as_str()),
                None => false,
            },
            Expectation::FieldPresent { pointer } => {
                field(pointer).is_some_and(|v| !v.is_null())
            }
        }
    }
}

/// Result of one check in one iteration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub step: String,
    pub name: String,
    pub passed: bool,
    pub severity: Severity,
}
