//! Fixture data types and error definitions
//!
//! Field names on the wire follow the column names of the loader the artifact
//! is rendered for, which is why several fields carry a serde rename.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::users::Credential;

/// Errors raised while generating or rendering a fixture batch
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Invalid fixture input: {0}")]
    InvalidInput(String),

    #[error("Template asset not readable at {path:?}: {source}")]
    TemplateMissing {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Template has no {{{{{0}}}}} slot")]
    MissingSlot(&'static str),

    #[error("Cannot write artifact to {path:?}: {source}")]
    Destination {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Login account seeded into the service under test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticUser {
    pub username: String,
    pub password: String,
    pub email: String,
    pub is_active: bool,
}

/// Forum profile attached to one synthetic user (same ordinal)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticProfile {
    #[serde(rename = "id")]
    pub profile_id: Uuid,
    #[serde(rename = "forum_id")]
    pub external_group_id: Uuid,
    #[serde(rename = "forum_rank_id")]
    pub rank_id: String,
    #[serde(rename = "forum_username")]
    pub display_name: String,
    #[serde(rename = "forum_user_id")]
    pub external_user_id: String,
    pub signature_id: Uuid,
    pub verification_code: String,
    pub active: bool,
    pub verified: bool,
    #[serde(with = "loader_timestamp")]
    pub date_verified: DateTime<Utc>,
    #[serde(with = "loader_timestamp")]
    pub date_added: DateTime<Utc>,
    #[serde(with = "loader_timestamp")]
    pub date_updated: DateTime<Utc>,
    pub dummy: bool,
}

/// Credited forum post belonging to a synthetic profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticPost {
    pub message_id: String,
    pub topic_id: String,
    /// Decimal amounts are kept as two-place strings, the loader parses them
    pub base_points: String,
    pub total_points: String,
    #[serde(rename = "influence_bonus_pct")]
    pub bonus_pct: String,
    #[serde(rename = "influence_bonus_pts")]
    pub bonus_pts: String,
    #[serde(rename = "unique_content_length")]
    pub content_length: u64,
    pub valid_sig_minutes: u32,
    pub invalid_sig_minutes: u32,
    pub credited: bool,
    pub matured: bool,
    #[serde(with = "loader_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(with = "loader_timestamp")]
    pub date_credited: DateTime<Utc>,
    #[serde(with = "loader_timestamp")]
    pub date_matured: DateTime<Utc>,
    #[serde(rename = "forum_profile_id")]
    pub profile_id: Uuid,
    #[serde(rename = "forum_rank_id")]
    pub rank_id: String,
}

/// One generated dataset: users, their profiles, and the profiles' posts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureBatch {
    pub users: Vec<SyntheticUser>,
    pub profiles: Vec<SyntheticProfile>,
    pub posts: Vec<SyntheticPost>,
}

impl FixtureBatch {
    /// Posts referencing the given profile
    pub fn posts_for(&self, profile_id: Uuid) -> impl Iterator<Item = &SyntheticPost> {
        self.posts.iter().filter(move |p| p.profile_id == profile_id)
    }

    /// Login payloads for every user in the batch, in ordinal order
    pub fn credentials(&self) -> Vec<Credential> {
        self.users
            .iter()
            .map(|u| Credential {
                username: u.username.clone(),
                password: u.password.clone(),
            })
            .collect()
    }
}

/// `2018-06-10 03:27:46+00:00` style timestamps
mod loader_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_str(&raw, FORMAT)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
