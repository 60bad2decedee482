//! Load profiles: the concurrency/duration shape of a run
//!
//! A profile is either a fixed iteration budget shared by a fixed set of
//! virtual users, or a staged ramp. Both carry the threshold table that the
//! run summary is judged against.

mod threshold;

pub use threshold::{Percentile, Threshold, ThresholdKind, default_thresholds};

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ProfileError {
    #[error("Load profile needs a fixed or staged shape")]
    MissingShape,

    #[error("Fixed profile needs at least one iteration")]
    ZeroIterations,

    #[error("Load profile needs at least one virtual user")]
    ZeroVirtualUsers,

    #[error("Staged profile needs at least one stage")]
    EmptyStages,

    #[error("Staged profile has zero total duration")]
    ZeroDuration,

    #[error("Invalid stage: {0}")]
    InvalidStage(String),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),
}

/// One leg of a ramp: reach `target` virtual users over `duration`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadStage {
    pub duration: Duration,
    pub target: usize,
}

impl LoadStage {
    pub fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }

    /// Parse `30s:10,30s:3` into stages
    pub fn parse_list(input: &str) -> Result<Vec<LoadStage>, ProfileError> {
        input
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|entry| {
                let (duration, target) = entry
                    .split_once(':')
                    .ok_or_else(|| ProfileError::InvalidStage(entry.to_string()))?;
                let target = target
                    .trim()
                    .parse()
                    .map_err(|_| ProfileError::InvalidStage(entry.to_string()))?;
                Ok(LoadStage::new(parse_duration(duration.trim())?, target))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoadShape {
    /// `iterations` shared across `virtual_users` workers
    Fixed {
        iterations: u64,
        virtual_users: usize,
    },
    Staged { stages: Vec<LoadStage> },
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadProfile {
    pub shape: LoadShape,
    pub thresholds: Vec<Threshold>,
}

impl LoadProfile {
    pub fn builder() -> LoadProfileBuilder {
        LoadProfileBuilder::default()
    }

    pub fn fixed(iterations: u64, virtual_users: usize) -> Result<Self, ProfileError> {
        Self::builder().fixed(iterations, virtual_users).build()
    }

    pub fn staged(stages: Vec<LoadStage>) -> Result<Self, ProfileError> {
        Self::builder().staged(stages).build()
    }

    pub fn with_thresholds(mut self, thresholds: Vec<Threshold>) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Sum of stage durations; `None` for fixed profiles
    pub fn total_duration(&self) -> Option<Duration> {
        match &self.shape {
            LoadShape::Fixed { .. } => None,
            LoadShape::Staged { stages } => Some(
                stages
                    .iter()
                    .fold(Duration::ZERO, |total, s| total.saturating_add(s.duration)),
            ),
        }
    }

    pub fn peak_virtual_users(&self) -> usize {
        match &self.shape {
            LoadShape::Fixed { virtual_users, .. } => *virtual_users,
            LoadShape::Staged { stages } => stages.iter().map(|s| s.target).max().unwrap_or(0),
        }
    }

    /// Virtual users wanted `elapsed` into a staged run.
    ///
    /// The ramp starts from zero and moves linearly toward each stage's target
    /// over that stage's duration. Past the last stage the final target holds.
    pub fn target_at(&self, elapsed: Duration) -> usize {
        let stages = match &self.shape {
            LoadShape::Fixed { virtual_users, .. } => return *virtual_users,
            LoadShape::Staged { stages } => stages,
        };

        let mut from = 0usize;
        let mut remaining = elapsed;
        for stage in stages {
            if remaining < stage.duration {
                let progress = remaining.as_secs_f64() / stage.duration.as_secs_f64();
                let level = from as f64 + (stage.target as f64 - from as f64) * progress;
                return level.round().max(0.0) as usize;
            }
            remaining -= stage.duration;
            from = stage.target;
        }
        from
    }
}

#[derive(Debug, Default)]
pub struct LoadProfileBuilder {
    shape: Option<LoadShape>,
    thresholds: Option<Vec<Threshold>>,
}

impl LoadProfileBuilder {
    pub fn fixed(mut self, iterations: u64, virtual_users: usize) -> Self {
        self.shape = Some(LoadShape::Fixed {
            iterations,
            virtual_users,
        });
        self
    }

    pub fn staged(mut self, stages: Vec<LoadStage>) -> Self {
        self.shape = Some(LoadShape::Staged { stages });
        self
    }

    pub fn thresholds(mut self, thresholds: Vec<Threshold>) -> Self {
        self.thresholds = Some(thresholds);
        self
    }

    pub fn build(self) -> Result<LoadProfile, ProfileError> {
        let shape = self.shape.ok_or(ProfileError::MissingShape)?;

        match &shape {
            LoadShape::Fixed {
                iterations,
                virtual_users,
            } => {
                if *iterations == 0 {
                    return Err(ProfileError::ZeroIterations);
                }
                if *virtual_users == 0 {
                    return Err(ProfileError::ZeroVirtualUsers);
                }
            }
            LoadShape::Staged { stages } => {
                if stages.is_empty() {
                    return Err(ProfileError::EmptyStages);
                }
                if stages.iter().all(|s| s.duration.is_zero()) {
                    return Err(ProfileError::ZeroDuration);
                }
                if stages.iter().all(|s| s.target == 0) {
                    return Err(ProfileError::ZeroVirtualUsers);
                }
                stages
                    .iter()
                    .try_fold(Duration::ZERO, |total, s| total.checked_add(s.duration))
                    .ok_or_else(|| {
                        ProfileError::InvalidDuration("total stage duration overflows".to_string())
                    })?;
            }
        }

        Ok(LoadProfile {
            shape,
            thresholds: self.thresholds.unwrap_or_else(default_thresholds),
        })
    }
}

/// Parse `250ms`, `30s`, `2m` or `1h`
pub fn parse_duration(input: &str) -> Result<Duration, ProfileError> {
    let input = input.trim();
    let invalid = || ProfileError::InvalidDuration(input.to_string());

    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (value, unit) = input.split_at(split);
    let value: u64 = value.parse().map_err(|_| invalid())?;

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => value.checked_mul(60).map(Duration::from_secs).ok_or_else(invalid),
        "h" => value.checked_mul(60 * 60).map(Duration::from_secs).ok_or_else(invalid),
        _ => Err(invalid()),
    }
}
