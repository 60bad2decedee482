//! Stock venue session: authenticate, read stats and leaderboard, log out

use serde_json::json;
use std::sync::Arc;

use super::check::Check;
use super::session::SessionWorkflow;
use super::step::WorkflowStep;
use crate::transport::Transport;
use crate::users::UserSource;

pub const LOGIN_PATH: &str = "/api/authenticate/";
pub const STATS_PATH: &str = "/api/retrieve/stats/";
pub const LEADERBOARD_PATH: &str = "/api/leaderboard/";
pub const LOGOUT_PATH: &str = "/api/logout/";

pub const BASIC_WORKFLOW_NAME: &str = "basic";

/// Build the basic session workflow against the venue API
pub fn basic_session(users: Arc<UserSource>, transport: Arc<dyn Transport>) -> SessionWorkflow {
    let login = WorkflowStep::post("login", LOGIN_PATH)
        .check(Check::status("is status 200", 200))
        .check(Check::field_equals("is success true", "/success", json!(true)))
        .check(Check::username_echo("username echoed", "/username"))
        .check(Check::field_equals("email is confirmed", "/email_confirmed", json!(true)).diagnostic())
        .check(Check::field_equals("lang is en", "/language", json!("en")).diagnostic());

    let stats = WorkflowStep::get("stats", STATS_PATH)
        .authenticated()
        .check(Check::status("is stats status 200", 200))
        .check(Check::field_equals("is stats success true", "/success", json!(true)))
        .check(
            Check::field_present("stats user rank present", "/stats/profile_level/0/forumUserRank")
                .diagnostic(),
        );

    let leaderboard = WorkflowStep::get("leaderboard", LEADERBOARD_PATH)
        .check(Check::status("is leaderboard status 200", 200));

    let logout = WorkflowStep::get("logout", LOGOUT_PATH)
        .authenticated()
        .check(Check::status("is logout status 200", 200))
        .check(Check::field_equals("is logout success true", "/success", json!(true)));

    SessionWorkflow::new(BASIC_WORKFLOW_NAME, login, users, transport)
        .with_read(stats)
        .with_read(leaderboard)
        .with_logout(logout)
}
