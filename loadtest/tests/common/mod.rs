//! Common Test Utilities for Integration Tests
//!
//! An axum stand-in for the Venue API, served on an ephemeral port.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Password every seeded fixture user logs in with
pub const SEED_PASSWORD: &str = "default2018";

/// Shared request counters and failure switches of the mock venue
#[derive(Clone, Default)]
pub struct MockVenue {
    pub logins: Arc<AtomicU64>,
    pub stats_reads: Arc<AtomicU64>,
    pub leaderboard_reads: Arc<AtomicU64>,
    pub logouts: Arc<AtomicU64>,
    pub reject_logins: Arc<AtomicBool>,
}

impl MockVenue {
    pub fn rejecting_logins() -> Self {
        let venue = Self::default();
        venue.reject_logins.store(true, Ordering::SeqCst);
        venue
    }

    pub fn count(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Token tok-"))
}

fn unauthorized() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "Authentication credentials were not provided."})),
    )
}

async fn authenticate(
    State(venue): State<MockVenue>,
    Json(body): Json<LoginRequest>,
) -> (StatusCode, Json<Value>) {
    let n = venue.logins.fetch_add(1, Ordering::SeqCst);
    if venue.reject_logins.load(Ordering::SeqCst) || body.password != SEED_PASSWORD {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"success": false, "error": "invalid credentials"})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "token": format!("tok-{}-{}", body.username, n),
            "username": body.username,
            "email": format!("{}@nomail.com", body.username),
            "email_confirmed": true,
            "language": "en",
        })),
    )
}

async fn stats(State(venue): State<MockVenue>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    venue.stats_reads.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return unauthorized();
    }
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "stats": {"profile_level": [{"forumUserId": "1", "forumUserRank": "Legendary"}]},
        })),
    )
}

async fn leaderboard(State(venue): State<MockVenue>) -> Json<Value> {
    venue.leaderboard_reads.fetch_add(1, Ordering::SeqCst);
    Json(json!({"success": true, "leaderboard": []}))
}

async fn logout(State(venue): State<MockVenue>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    venue.logouts.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return unauthorized();
    }
    (StatusCode::OK, Json(json!({"success": true})))
}

/// Create the mock venue router
pub fn create_mock_venue(venue: MockVenue) -> Router {
    Router::new()
        .route("/api/authenticate/", post(authenticate))
        .route("/api/retrieve/stats/", get(stats))
        .route("/api/leaderboard/", get(leaderboard))
        .route("/api/logout/", get(logout))
        .with_state(venue)
}

/// Serve the mock venue on an ephemeral port, returning its base URL
pub async fn spawn_mock_venue(venue: MockVenue) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_mock_venue(venue);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

/// Initialize test logging for detailed output
#[allow(dead_code)]
pub fn init_test_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "venue_loadtest=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
