//! Test Utilities Module
//!
//! In-process stand-in for the venue API plus small fixtures shared by the
//! unit tests. This module is only compiled when running tests.

#![cfg(test)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::transport::{StepRequest, StepResponse, Transport, TransportError};
use crate::users::Credential;
use crate::workflow::basic::{LEADERBOARD_PATH, LOGIN_PATH, LOGOUT_PATH, STATS_PATH};

type Route = Box<dyn Fn(&StepRequest) -> Result<StepResponse, TransportError> + Send + Sync>;

// ============================================================================
// Fixtures
// ============================================================================

pub fn credential_pool(size: usize) -> Vec<Credential> {
    (1..=size)
        .map(|i| Credential {
            username: format!("perf{}", i),
            password: "default2018".to_string(),
        })
        .collect()
}

// ============================================================================
// Mock Transport
// ============================================================================

/// Scripted transport keyed by request path. Unknown paths answer 404.
pub struct MockTransport {
    routes: HashMap<String, Route>,
    requests: Mutex<Vec<StepRequest>>,
    latency: Duration,
}

impl MockTransport {
    pub fn empty() -> Self {
        Self {
            routes: HashMap::new(),
            requests: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
        }
    }

    /// Every venue endpoint succeeds; authorized endpoints reject missing tokens
    pub fn healthy() -> Self {
        let issued = AtomicU64::new(0);

        Self::empty()
            .with_route(LOGIN_PATH, move |request| {
                let username = request
                    .body
                    .as_ref()
                    .and_then(|b| b.get("username"))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let n = issued.fetch_add(1, Ordering::SeqCst);
                Ok(StepResponse::json(
                    200,
                    json!({
                        "success": true,
                        "token": format!("tok-{}-{}", username, n),
                        "username": username,
                        "email": format!("{}@nomail.com", username),
                        "email_confirmed": true,
                        "language": "en",
                    }),
                ))
            })
            .with_route(STATS_PATH, |request| {
                Ok(authorized(request, || {
                    json!({
                        "success": true,
                        "stats": {"profile_level": [{"forumUserId": "1", "forumUserRank": "Legendary"}]}
                    })
                }))
            })
            .with_route(LEADERBOARD_PATH, |_| {
                Ok(StepResponse::json(200, json!({"success": true, "leaderboard": []})))
            })
            .with_route(LOGOUT_PATH, |request| {
                Ok(authorized(request, || json!({"success": true})))
            })
    }

    pub fn with_route<F>(mut self, path: &str, route: F) -> Self
    where
        F: Fn(&StepRequest) -> Result<StepResponse, TransportError> + Send + Sync + 'static,
    {
        self.routes.insert(path.to_string(), Box::new(route));
        self
    }

    pub fn with_login_status(self, status: u16) -> Self {
        self.with_route(LOGIN_PATH, move |_| {
            Ok(StepResponse::json(status, json!({"success": false})))
        })
    }

    pub fn with_unreachable(self, path: &str) -> Self {
        self.with_route(path, |_| {
            Err(TransportError::Request("connection refused".to_string()))
        })
    }

    /// Simulated server time per request
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn requests(&self) -> Vec<StepRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .count()
    }
}

fn authorized(request: &StepRequest, body: impl FnOnce() -> serde_json::Value) -> StepResponse {
    match request.header("authorization") {
        Some(value) if value.starts_with("Token ") => StepResponse::json(200, body()),
        _ => StepResponse::json(401, json!({"detail": "Authentication credentials were not provided."})),
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &StepRequest) -> Result<StepResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match self.routes.get(&request.path) {
            Some(route) => route(request),
            None => Ok(StepResponse::json(404, json!({"detail": "Not found."}))),
        }
    }
}
