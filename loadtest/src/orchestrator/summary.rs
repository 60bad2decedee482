//! Threshold evaluation and run reporting

use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use super::aggregate::{CheckTotals, LatencyStats, RunResult};
use crate::profile::{Threshold, ThresholdKind};

/// One or more thresholds failed, or the run produced nothing to judge
#[derive(Debug, Clone, Error)]
#[error("run failed: {}", .failed.join(", "))]
pub struct ThresholdViolation {
    pub failed: Vec<String>,
}

/// How a single threshold fared
#[derive(Debug, Clone)]
pub struct ThresholdOutcome {
    pub threshold: Threshold,
    /// Milliseconds for latency thresholds, a ratio for check thresholds.
    /// `None` when the run produced no data for it.
    pub observed: Option<f64>,
    pub passed: bool,
}

impl ThresholdOutcome {
    fn format_observed(&self) -> String {
        match (self.observed, &self.threshold.kind) {
            (None, _) => "no data".to_string(),
            (Some(v), ThresholdKind::Latency { .. }) => format!("{:.1}ms", v),
            (Some(v), ThresholdKind::CheckRatio { .. }) => format!("{:.2}%", v * 100.0),
        }
    }
}

/// Judge `result` against `thresholds`. Thresholds with no data pass.
pub fn evaluate(
    thresholds: &[Threshold],
    result: &RunResult,
    count_diagnostics: bool,
) -> Vec<ThresholdOutcome> {
    thresholds
        .iter()
        .map(|threshold| {
            let (latencies, checks) = match &threshold.step {
                Some(step) => match result.steps.get(step) {
                    Some(s) => (s.latencies.clone(), s.counted_checks(count_diagnostics)),
                    None => (LatencyStats::new(), CheckTotals::default()),
                },
                None => (result.all_latencies(), result.counted_checks(count_diagnostics)),
            };

            let (observed, passed) = match &threshold.kind {
                ThresholdKind::Latency { percentile, max } => {
                    let observed = latencies.percentile(percentile.value());
                    (
                        observed.map(|d| d.as_secs_f64() * 1000.0),
                        observed.map(|d| d < *max).unwrap_or(true),
                    )
                }
                ThresholdKind::CheckRatio { min } => {
                    let observed = checks.ratio();
                    (observed, observed.map(|r| r > *min).unwrap_or(true))
                }
            };

            ThresholdOutcome {
                threshold: threshold.clone(),
                observed,
                passed,
            }
        })
        .collect()
}

/// Everything a finished run reports
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub workflow: String,
    pub result: RunResult,
    pub outcomes: Vec<ThresholdOutcome>,
    /// Stopped by signal or the max-duration guard
    pub interrupted: bool,
}

impl RunSummary {
    pub fn passed(&self) -> bool {
        self.verdict().is_ok()
    }

    /// `Err` listing every violated threshold. A run with no iterations, or
    /// with every iteration failed, never passes.
    pub fn verdict(&self) -> Result<(), ThresholdViolation> {
        let r = &self.result;
        let mut failed: Vec<String> = Vec::new();
        if r.iterations == 0 {
            failed.push("no iterations ran".to_string());
        } else if r.iterations_failed == r.iterations {
            failed.push("all iterations failed".to_string());
        }
        failed.extend(
            self.outcomes
                .iter()
                .filter(|o| !o.passed)
                .map(|o| o.threshold.name.clone()),
        );
        if failed.is_empty() {
            Ok(())
        } else {
            Err(ThresholdViolation { failed })
        }
    }

    /// 0 when every threshold held, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.passed() { 0 } else { 1 }
    }

    #[allow(clippy::print_literal)]
    pub fn print_summary(&self) {
        let r = &self.result;
        let fmt_ms = |d: Option<Duration>| {
            d.map(|d| format!("{:.1}ms", d.as_secs_f64() * 1000.0))
                .unwrap_or_else(|| "-".to_string())
        };

        println!();
        println!("═══════════════════════════════════════════════════════════════");
        println!(
            " RUN: {} ({} iterations in {:.1}s{})",
            self.workflow,
            r.iterations,
            r.duration.as_secs_f64(),
            if self.interrupted { ", interrupted" } else { "" }
        );
        println!("═══════════════════════════════════════════════════════════════");
        println!();
        println!("   Completed:    {}", r.iterations_completed);
        println!(
            "   Failed:       {} ({} abandoned)",
            r.iterations_failed, r.iterations_abandoned
        );
        println!(
            "   Checks:       {} passed, {} failed",
            r.checks.passed, r.checks.failed
        );
        if r.diagnostics.total() > 0 {
            println!(
                "   Diagnostics:  {} passed, {} failed",
                r.diagnostics.passed, r.diagnostics.failed
            );
        }
        println!(
            "   Errors:       {} http, {} transport",
            r.http_errors, r.transport_errors
        );
        println!("   Throughput:   {:.1} iterations/s", r.iterations_per_second());
        println!();
        println!(" ─── Step latency ────────────────────────────────────────────");
        println!();
        println!(
            "   {:14} {:>8} {:>10} {:>10} {:>10}",
            "Step", "Count", "P50", "P90", "P95"
        );
        for (name, step) in &r.steps {
            println!(
                "   {:14} {:>8} {:>10} {:>10} {:>10}",
                name,
                step.latencies.len(),
                fmt_ms(step.latencies.p50()),
                fmt_ms(step.latencies.p90()),
                fmt_ms(step.latencies.p95())
            );
        }
        println!();
        println!(" ─── Thresholds ──────────────────────────────────────────────");
        println!();
        for outcome in &self.outcomes {
            println!(
                "   {:24} {:>12}   {}",
                outcome.threshold.name,
                outcome.format_observed(),
                if outcome.passed { "✓" } else { "✗" }
            );
        }
        println!();
        println!("═══════════════════════════════════════════════════════════════");
        println!(
            " OVERALL: {}",
            match self.verdict() {
                Ok(()) => "PASS".to_string(),
                Err(violation) => format!("FAIL ({})", violation.failed.join(", ")),
            }
        );
        println!("═══════════════════════════════════════════════════════════════");
        println!();
    }

    /// Generate JSON output for CI
    pub fn to_json(&self) -> String {
        let r = &self.result;
        let ms = |d: Option<Duration>| d.map(|d| d.as_secs_f64() * 1000.0);

        let steps: serde_json::Map<String, serde_json::Value> = r
            .steps
            .iter()
            .map(|(name, step)| {
                (
                    name.clone(),
                    json!({
                        "count": step.latencies.len(),
                        "p50_ms": ms(step.latencies.p50()),
                        "p90_ms": ms(step.latencies.p90()),
                        "p95_ms": ms(step.latencies.p95()),
                        "checks_passed": step.checks.passed,
                        "checks_failed": step.checks.failed,
                    }),
                )
            })
            .collect();

        let thresholds: Vec<serde_json::Value> = self
            .outcomes
            .iter()
            .map(|o| {
                json!({
                    "name": o.threshold.name,
                    "observed": o.observed,
                    "passed": o.passed,
                })
            })
            .collect();

        json!({
            "passed": self.passed(),
            "workflow": self.workflow,
            "interrupted": self.interrupted,
            "duration_secs": r.duration.as_secs_f64(),
            "iterations": r.iterations,
            "iterations_completed": r.iterations_completed,
            "iterations_failed": r.iterations_failed,
            "iterations_abandoned": r.iterations_abandoned,
            "checks_passed": r.checks.passed,
            "checks_failed": r.checks.failed,
            "diagnostics_failed": r.diagnostics.failed,
            "http_errors": r.http_errors,
            "transport_errors": r.transport_errors,
            "steps": steps,
            "thresholds": thresholds,
        })
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::aggregate::StepResult;
    use crate::profile::{Percentile, default_thresholds};

    fn result_with(latencies_ms: &[u64], checks: CheckTotals) -> RunResult {
        let mut step = StepResult::default();
        for ms in latencies_ms {
            step.latencies.record(Duration::from_millis(*ms));
        }
        step.checks = checks;

        let mut result = RunResult {
            iterations: latencies_ms.len() as u64,
            checks,
            duration: Duration::from_secs(1),
            ..Default::default()
        };
        result.steps.insert("login".to_string(), step);
        result
    }

    #[test]
    fn test_default_thresholds_pass_healthy_run() {
        let result = result_with(&[100, 120, 140], CheckTotals { passed: 300, failed: 0 });
        let outcomes = evaluate(&default_thresholds(), &result, false);
        assert!(outcomes.iter().all(|o| o.passed));
    }

    #[test]
    fn test_slow_latency_violates() {
        let result = result_with(&[100, 700, 900], CheckTotals { passed: 3, failed: 0 });
        let outcomes = evaluate(&default_thresholds(), &result, false);
        assert!(!outcomes[0].passed);
        assert_eq!(outcomes[0].observed, Some(900.0));
        assert!(outcomes[1].passed);
    }

    #[test]
    fn test_check_ratio_is_strict() {
        let result = result_with(&[10], CheckTotals { passed: 99, failed: 1 });
        let outcomes = evaluate(&[Threshold::check_ratio(0.99)], &result, false);
        assert!(!outcomes[0].passed);
    }

    #[test]
    fn test_unknown_step_has_no_data_and_passes() {
        let result = result_with(&[10], CheckTotals::default());
        let threshold =
            Threshold::latency(Percentile::P95, Duration::from_millis(1)).for_step("missing");
        let outcomes = evaluate(&[threshold], &result, false);
        assert!(outcomes[0].passed);
        assert_eq!(outcomes[0].observed, None);
    }

    #[test]
    fn test_verdict_and_exit_code() {
        let result = result_with(&[10], CheckTotals { passed: 0, failed: 10 });
        let summary = RunSummary {
            workflow: "basic".to_string(),
            outcomes: evaluate(&default_thresholds(), &result, false),
            result,
            interrupted: false,
        };

        assert!(!summary.passed());
        assert_eq!(summary.exit_code(), 1);
        let violation = summary.verdict().unwrap_err();
        assert_eq!(violation.failed, vec!["checks>0.99".to_string()]);

        let json: serde_json::Value = serde_json::from_str(&summary.to_json()).unwrap();
        assert_eq!(json["passed"], false);
        assert_eq!(json["checks_failed"], 10);
        assert_eq!(json["steps"]["login"]["count"], 1);
    }

    #[test]
    fn test_run_without_successful_iterations_fails() {
        let empty = RunSummary {
            workflow: "basic".to_string(),
            result: RunResult::default(),
            outcomes: evaluate(&default_thresholds(), &RunResult::default(), false),
            interrupted: true,
        };
        assert!(empty.outcomes.iter().all(|o| o.passed));
        assert_eq!(
            empty.verdict().unwrap_err().failed,
            vec!["no iterations ran".to_string()]
        );
        assert_eq!(empty.exit_code(), 1);

        let result = RunResult {
            iterations: 4,
            iterations_failed: 4,
            iterations_abandoned: 4,
            ..Default::default()
        };
        let abandoned = RunSummary {
            workflow: "basic".to_string(),
            outcomes: evaluate(&[], &result, false),
            result,
            interrupted: true,
        };
        assert!(!abandoned.passed());
        assert_eq!(
            abandoned.verdict().unwrap_err().failed,
            vec!["all iterations failed".to_string()]
        );
    }
}
