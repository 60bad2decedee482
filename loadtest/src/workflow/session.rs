//! Login → reads → logout session workflow
//!
//! ```text
//! Idle → Authenticating → Authenticated → Reading* → LoggingOut → Completed
//!            │
//!            └──────────────→ Failed
//! ```
//!
//! Only the login status check can end an iteration early. Read failures are
//! recorded and the remaining reads still run.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::check::{Check, Severity};
use super::context::{SessionContext, SessionState, StepError, StepTiming};
use super::step::WorkflowStep;
use crate::transport::{StepRequest, StepResponse, Transport};
use crate::users::UserSource;

/// Check recorded when a step never got a response
pub const RESPONDED_CHECK: &str = "request completed";
/// Check recorded when login declares no status check and the status is not 2xx
pub const LOGIN_STATUS_CHECK: &str = "login status is success";
/// Check recorded when a successful login carries no token
pub const TOKEN_CHECK: &str = "token issued";

const LOG_BODY_LIMIT: usize = 512;

/// A named unit of simulated user behaviour
#[async_trait]
pub trait Workflow: Send + Sync {
    fn name(&self) -> &str;

    /// Run one iteration against `ctx`. Never fails: outcomes land in the context.
    async fn run(&self, ctx: &mut SessionContext);
}

pub struct SessionWorkflow {
    name: String,
    login: WorkflowStep,
    reads: Vec<WorkflowStep>,
    logout: Option<WorkflowStep>,
    /// JSON pointer of the token in the login response
    token_pointer: String,
    auth_scheme: String,
    users: Arc<UserSource>,
    transport: Arc<dyn Transport>,
}

impl SessionWorkflow {
    pub fn new(
        name: impl Into<String>,
        login: WorkflowStep,
        users: Arc<UserSource>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            name: name.into(),
            login,
            reads: Vec::new(),
            logout: None,
            token_pointer: "/token".to_string(),
            auth_scheme: "Token".to_string(),
            users,
            transport,
        }
    }

    pub fn with_read(mut self, step: WorkflowStep) -> Self {
        self.reads.push(step);
        self
    }

    pub fn with_logout(mut self, step: WorkflowStep) -> Self {
        self.logout = Some(step);
        self
    }

    pub fn with_token_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.token_pointer = pointer.into();
        self
    }

    pub fn with_auth_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.auth_scheme = scheme.into();
        self
    }

    /// Names of every step in execution order
    pub fn step_names(&self) -> Vec<&str> {
        std::iter::once(&self.login)
            .chain(self.reads.iter())
            .chain(self.logout.iter())
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Send one request, recording its timing and any HTTP/transport error
    async fn execute(
        &self,
        step: &WorkflowStep,
        request: &StepRequest,
        ctx: &mut SessionContext,
    ) -> Option<StepResponse> {
        let started_at = Utc::now();
        let start = Instant::now();
        let result = self.transport.send(request).await;
        let elapsed = start.elapsed();

        ctx.record_timing(StepTiming {
            step: step.name.clone(),
            started_at,
            finished_at: Utc::now(),
            elapsed,
            status: result.as_ref().ok().map(|r| r.status),
        });

        match result {
            Ok(response) => {
                if !response.is_success() {
                    ctx.record_error(StepError::Http {
                        step: step.name.clone(),
                        status: response.status,
                    });
                }
                Some(response)
            }
            Err(e) => {
                warn!(
                    "{}: {} {} got no response: {}",
                    step.name, request.method, request.path, e
                );
                ctx.record_error(StepError::Transport {
                    step: step.name.clone(),
                    source: e,
                });
                ctx.record_check(&step.name, RESPONDED_CHECK, false, Severity::Check);
                None
            }
        }
    }

    fn apply_checks<'a>(
        &self,
        step: &WorkflowStep,
        checks: impl Iterator<Item = &'a Check>,
        response: &StepResponse,
        ctx: &mut SessionContext,
    ) {
        for check in checks {
            let passed = check.evaluate(response, ctx.credential.as_ref());
            if !passed {
                match check.severity {
                    Severity::Diagnostic => warn!(
                        "{}: diagnostic '{}' failed (status {}): {}",
                        step.name,
                        check.name,
                        response.status,
                        truncated(&response.text)
                    ),
                    Severity::Check => debug!("{}: check '{}' failed", step.name, check.name),
                }
            }
            ctx.record_check(&step.name, &check.name, passed, check.severity);
        }
    }

    /// Authenticating state. Returns true once a token is held.
    async fn authenticate(&self, ctx: &mut SessionContext) -> bool {
        ctx.transition(SessionState::Authenticating);

        let credential = self.users.next_credential();
        let mut request = self.login.to_request(None, &self.auth_scheme);
        request.body = Some(json!({
            "username": credential.username,
            "password": credential.password,
        }));
        let username = credential.username.clone();
        ctx.credential = Some(credential);

        let Some(response) = self.execute(&self.login, &request, ctx).await else {
            ctx.fail();
            return false;
        };

        let status_checks: Vec<&Check> = self
            .login
            .checks
            .iter()
            .filter(|c| c.is_status_check())
            .collect();
        let status_ok = if status_checks.is_empty() {
            response.is_success()
        } else {
            status_checks
                .iter()
                .all(|c| c.evaluate(&response, ctx.credential.as_ref()))
        };

        if !status_ok {
            if status_checks.is_empty() {
                ctx.record_check(&self.login.name, LOGIN_STATUS_CHECK, false, Severity::Check);
            } else {
                self.apply_checks(&self.login, status_checks.into_iter(), &response, ctx);
            }
            warn!(
                "{}: login as {} failed: {} {} -> {} {}",
                self.name,
                username,
                request.method,
                request.path,
                response.status,
                truncated(&response.text)
            );
            ctx.fail();
            return false;
        }

        self.apply_checks(&self.login, self.login.checks.iter(), &response, ctx);

        let token = response
            .body
            .as_ref()
            .and_then(|b| b.pointer(&self.token_pointer))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        match token {
            Some(token) => {
                ctx.set_auth_token(token);
                ctx.transition(SessionState::Authenticated);
                true
            }
            None => {
                ctx.record_check(&self.login.name, TOKEN_CHECK, false, Severity::Check);
                warn!(
                    "{}: login as {} returned no token at {}: {}",
                    self.name,
                    username,
                    self.token_pointer,
                    truncated(&response.text)
                );
                ctx.fail();
                false
            }
        }
    }

    async fn run_step(&self, step: &WorkflowStep, ctx: &mut SessionContext) {
        let request = step.to_request(ctx.auth_token(), &self.auth_scheme);
        if let Some(response) = self.execute(step, &request, ctx).await {
            self.apply_checks(step, step.checks.iter(), &response, ctx);
        }
    }
}

#[async_trait]
impl Workflow for SessionWorkflow {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &mut SessionContext) {
        if !self.authenticate(ctx).await {
            return;
        }

        for (index, step) in self.reads.iter().enumerate() {
            ctx.transition(SessionState::Reading(index));
            self.run_step(step, ctx).await;
        }

        ctx.transition(SessionState::LoggingOut);
        if let Some(step) = &self.logout {
            self.run_step(step, ctx).await;
        }
        ctx.clear_auth_token();
        ctx.transition(SessionState::Completed);
    }
}

fn truncated(text: &str) -> String {
    if text.len() <= LOG_BODY_LIMIT {
        text.to_string()
    } else {
        let cut: String = text.chars().take(LOG_BODY_LIMIT).collect();
        format!("{}…", cut)
    }
}
