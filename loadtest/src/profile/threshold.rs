//! Run-level pass/fail criteria
//!
//! Expressions are written `[step:]p95<600ms` for latency percentiles and
//! `[step:]checks>0.99` for check pass ratios. Without a step prefix a
//! threshold applies to the whole run.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::{ProfileError, parse_duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Percentile {
    P50,
    P90,
    P95,
}

impl Percentile {
    pub fn value(&self) -> f64 {
        match self {
            Percentile::P50 => 50.0,
            Percentile::P90 => 90.0,
            Percentile::P95 => 95.0,
        }
    }
}

impl fmt::Display for Percentile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Percentile::P50 => f.write_str("p50"),
            Percentile::P90 => f.write_str("p90"),
            Percentile::P95 => f.write_str("p95"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThresholdKind {
    /// Percentile of step latency must stay strictly below `max`
    Latency { percentile: Percentile, max: Duration },
    /// Fraction of passed checks must be strictly above `min`
    CheckRatio { min: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Threshold {
    /// Expression the threshold was parsed from, used as its display name
    pub name: String,
    /// Restrict to one step; `None` aggregates every step
    pub step: Option<String>,
    pub kind: ThresholdKind,
}

impl Threshold {
    pub fn latency(percentile: Percentile, max: Duration) -> Self {
        Self {
            name: format!("{}<{}ms", percentile, max.as_millis()),
            step: None,
            kind: ThresholdKind::Latency { percentile, max },
        }
    }

    pub fn check_ratio(min: f64) -> Self {
        Self {
            name: format!("checks>{}", min),
            step: None,
            kind: ThresholdKind::CheckRatio { min },
        }
    }

    pub fn for_step(mut self, step: impl Into<String>) -> Self {
        let step = step.into();
        self.name = format!("{}:{}", step, self.name);
        self.step = Some(step);
        self
    }

    /// Parse a comma separated list of threshold expressions
    pub fn parse_list(input: &str) -> Result<Vec<Threshold>, ProfileError> {
        input
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }
}

/// Table applied when a run declares none: p95 under 600ms, 99% of checks passing
pub fn default_thresholds() -> Vec<Threshold> {
    vec![
        Threshold::latency(Percentile::P95, Duration::from_millis(600)),
        Threshold::check_ratio(0.99),
    ]
}

impl FromStr for Threshold {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProfileError::InvalidThreshold(s.to_string());
        let expr = s.trim();

        let (step, body) = match expr.rsplit_once(':') {
            Some((step, body)) if !step.trim().is_empty() => (Some(step.trim().to_string()), body.trim()),
            Some(_) => return Err(invalid()),
            None => (None, expr),
        };

        let kind = if let Some(ratio) = body.strip_prefix("checks>") {
            let min: f64 = ratio.trim().parse().map_err(|_| invalid())?;
            // Comparison is strict, so a minimum of 1.0 could never pass
            if !(0.0..1.0).contains(&min) {
                return Err(invalid());
            }
            ThresholdKind::CheckRatio { min }
        } else {
            let (metric, limit) = body.split_once('<').ok_or_else(invalid)?;
            let percentile = match metric.trim() {
                "p50" | "p(50)" | "med" => Percentile::P50,
                "p90" | "p(90)" => Percentile::P90,
                "p95" | "p(95)" => Percentile::P95,
                _ => return Err(invalid()),
            };
            let limit = limit.trim();
            // Bare numbers are milliseconds
            let max = match limit.parse::<u64>() {
                Ok(ms) => Duration::from_millis(ms),
                Err(_) => parse_duration(limit).map_err(|_| invalid())?,
            };
            ThresholdKind::Latency { percentile, max }
        };

        Ok(Threshold {
            name: expr.to_string(),
            step,
            kind,
        })
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
