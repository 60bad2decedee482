//! Immutable step definitions shared by every iteration of a workflow

use serde_json::Value;

use super::check::Check;
use crate::transport::{Method, StepRequest};

#[derive(Debug, Clone)]
pub struct WorkflowStep {
    pub name: String,
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Attach the session token when one is held
    pub requires_auth: bool,
    pub checks: Vec<Check>,
}

impl WorkflowStep {
    pub fn new(name: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method,
            path: path.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: None,
            requires_auth: false,
            checks: Vec::new(),
        }
    }

    pub fn get(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, Method::Get, path)
    }

    pub fn post(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, Method::Post, path)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn authenticated(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    /// Resolve into a request, adding `Authorization: {scheme} {token}` when
    /// the step requires auth and a token is held
    pub fn to_request(&self, token: Option<&str>, auth_scheme: &str) -> StepRequest {
        let mut headers = self.headers.clone();
        if self.requires_auth
            && let Some(token) = token
        {
            headers.push((
                "Authorization".to_string(),
                format!("{} {}", auth_scheme, token),
            ));
        }

        StepRequest {
            method: self.method,
            path: self.path.clone(),
            headers,
            body: self.body.clone(),
        }
    }
}
