//! Seeded fixture generation
//!
//! Every random draw comes from a `ChaCha8Rng` built from the caller's seed,
//! so the same `(user_count, post_floor, rank_ids, seed)` always yields the
//! same batch, profile UUIDs included.

use chrono::{DateTime, NaiveDate, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};
use uuid::{Builder, Uuid, uuid};

use super::types::{FixtureBatch, GenerationError, SyntheticPost, SyntheticProfile, SyntheticUser};

/// Password shared by every generated account
pub const DEFAULT_PASSWORD: &str = "default2018";

/// Post counts are drawn from `0..=floor + POST_COUNT_SPREAD`, then clamped up to the floor
pub const POST_COUNT_SPREAD: usize = 15;

const VERIFICATION_PREFIX: &str = "18pTZWD";
const FORUM_ID: Uuid = uuid!("4b8b11d1-14bb-46a7-ac8b-397587235b28");
const SIGNATURE_ID: Uuid = uuid!("5a506e4d-f5b6-408e-9e00-39f5b7521351");
const BASE_POINTS: &str = "100.00";
const VALID_SIG_MINUTES: u32 = 1440;
const CONTENT_LENGTH_BASE: u64 = 400;

/// Rank identifiers of the stock venue deployment
pub const DEFAULT_RANK_IDS: [&str; 5] = [
    "09a7ad5e-1da4-4e7b-8799-93cf70ceb6f0",
    "99c3f7d6-8adf-4594-a7d3-b64d47488c5a",
    "dd1bbfa7-a3c3-4163-8c0d-b04eb84db9ad",
    "065d2e38-295e-4b31-9da8-2946aaee5be1",
    "14d22df0-3462-492b-81c5-b5812d3ef777",
];

fn at(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, min, sec))
        .map(|n| n.and_utc())
        .unwrap_or_default()
}

/// Generate a reproducible fixture batch
///
/// Users are named `perf1..=perf{user_count}`. Each gets one profile with a
/// uniformly drawn rank and between `post_floor` and `post_floor + 15` posts.
pub fn generate(
    user_count: usize,
    post_floor: usize,
    rank_ids: &[String],
    seed: u64,
) -> Result<FixtureBatch, GenerationError> {
    if user_count == 0 {
        return Err(GenerationError::InvalidInput(
            "user count must be at least 1".to_string(),
        ));
    }
    if rank_ids.is_empty() {
        return Err(GenerationError::InvalidInput(
            "rank id set must not be empty".to_string(),
        ));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let max_posts = post_floor + POST_COUNT_SPREAD;
    // Fixed-width post index keeps "30{ordinal}{index}" unambiguous across the batch
    let index_width = max_posts.to_string().len();

    let date_verified = at(2018, 6, 10, 3, 27, 46);
    let date_added = at(2018, 6, 10, 3, 27, 56);
    let date_updated = at(2018, 6, 16, 3, 53, 8);
    let posted_at = at(2018, 6, 13, 14, 18, 40);
    let credited_at = at(2018, 6, 14, 14, 32, 28);
    let matured_at = at(2018, 6, 14, 14, 32, 30);

    let mut batch = FixtureBatch {
        users: Vec::with_capacity(user_count),
        profiles: Vec::with_capacity(user_count),
        posts: Vec::new(),
    };

    for ordinal in 1..=user_count {
        let username = format!("perf{}", ordinal);

        batch.users.push(SyntheticUser {
            username: username.clone(),
            password: DEFAULT_PASSWORD.to_string(),
            email: format!("{}@nomail.com", username),
            is_active: true,
        });

        let profile_id = Builder::from_random_bytes(rng.random()).into_uuid();
        let rank_index = rng.random_range(0..rank_ids.len());
        let rank_id = rank_ids[rank_index].clone();

        batch.profiles.push(SyntheticProfile {
            profile_id,
            external_group_id: FORUM_ID,
            rank_id: rank_id.clone(),
            display_name: username,
            external_user_id: ordinal.to_string(),
            signature_id: SIGNATURE_ID,
            verification_code: format!("{}{}", VERIFICATION_PREFIX, ordinal),
            active: true,
            verified: true,
            date_verified,
            date_added,
            date_updated,
            dummy: true,
        });

        let post_count = rng.random_range(0..=max_posts).max(post_floor);
        debug!(
            "Profile {} (perf{}): rank {} with {} posts",
            profile_id, ordinal, rank_index, post_count
        );

        let bonus = format!("{}.00", rank_index);
        for index in 1..=post_count {
            batch.posts.push(SyntheticPost {
                message_id: format!("30{}{:0width$}", ordinal, index, width = index_width),
                topic_id: format!(
                    "4{}{}{:0width$}",
                    ordinal,
                    rank_index,
                    index,
                    width = index_width
                ),
                base_points: BASE_POINTS.to_string(),
                total_points: BASE_POINTS.to_string(),
                bonus_pct: bonus.clone(),
                bonus_pts: bonus.clone(),
                content_length: CONTENT_LENGTH_BASE + (ordinal * index) as u64,
                valid_sig_minutes: VALID_SIG_MINUTES,
                invalid_sig_minutes: 0,
                credited: true,
                matured: true,
                timestamp: posted_at,
                date_credited: credited_at,
                date_matured: matured_at,
                profile_id,
                rank_id: rank_id.clone(),
            });
        }
    }

    info!(
        "Generated fixture batch: {} users, {} profiles, {} posts (seed {})",
        batch.users.len(),
        batch.profiles.len(),
        batch.posts.len(),
        seed
    );

    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn ranks() -> Vec<String> {
        DEFAULT_RANK_IDS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_rejects_empty_inputs() {
        assert!(matches!(
            generate(0, 5, &ranks(), 1),
            Err(GenerationError::InvalidInput(_))
        ));
        assert!(matches!(
            generate(3, 5, &[], 1),
            Err(GenerationError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_every_profile_meets_post_floor() {
        let batch = generate(100, 5, &ranks(), 7).unwrap();
        assert_eq!(batch.profiles.len(), 100);
        for profile in &batch.profiles {
            let count = batch.posts_for(profile.profile_id).count();
            assert!(count >= 5, "profile {} has {} posts", profile.display_name, count);
            assert!(count <= 5 + POST_COUNT_SPREAD);
        }
    }

    #[test]
    fn test_zero_floor_allows_profiles_without_posts() {
        let batch = generate(50, 0, &ranks(), 3).unwrap();
        for profile in &batch.profiles {
            assert!(batch.posts_for(profile.profile_id).count() <= POST_COUNT_SPREAD);
        }
    }

    #[test]
    fn test_rank_ids_come_from_configured_set() {
        let rank_set = vec!["gold".to_string(), "silver".to_string()];
        let batch = generate(40, 2, &rank_set, 11).unwrap();
        for profile in &batch.profiles {
            assert!(rank_set.contains(&profile.rank_id));
        }
        for post in &batch.posts {
            assert!(rank_set.contains(&post.rank_id));
        }
    }

    #[test]
    fn test_posts_reference_profiles_in_batch() {
        let batch = generate(20, 5, &ranks(), 5).unwrap();
        let ids: HashSet<Uuid> = batch.profiles.iter().map(|p| p.profile_id).collect();
        assert_eq!(ids.len(), 20, "profile ids must be unique");
        for post in &batch.posts {
            assert!(ids.contains(&post.profile_id));
        }
    }

    #[test]
    fn test_message_ids_unique_with_large_floor() {
        // Floor past two digits would collide without fixed-width indices
        let batch = generate(120, 90, &ranks(), 9).unwrap();
        let ids: HashSet<&str> = batch.posts.iter().map(|p| p.message_id.as_str()).collect();
        assert_eq!(ids.len(), batch.posts.len());
    }

    #[test]
    fn test_same_seed_reproduces_batch() {
        let a = generate(10, 5, &ranks(), 2018).unwrap();
        let b = generate(10, 5, &ranks(), 2018).unwrap();
        let c = generate(10, 5, &ranks(), 2019).unwrap();

        let summary = |batch: &FixtureBatch| -> Vec<(Uuid, String, usize)> {
            batch
                .profiles
                .iter()
                .map(|p| {
                    (
                        p.profile_id,
                        p.rank_id.clone(),
                        batch.posts_for(p.profile_id).count(),
                    )
                })
                .collect()
        };

        assert_eq!(summary(&a), summary(&b));
        assert_ne!(summary(&a), summary(&c));
    }

    #[test]
    fn test_user_naming_is_deterministic() {
        let batch = generate(3, 1, &ranks(), 0).unwrap();
        let names: Vec<&str> = batch.users.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["perf1", "perf2", "perf3"]);
        assert_eq!(batch.users[1].email, "perf2@nomail.com");
        assert_eq!(batch.profiles[2].verification_code, "18pTZWD3");
        assert_eq!(batch.profiles[2].external_user_id, "3");
    }
}
