//! Run-wide result aggregation
//!
//! Workers fold their iteration reports into one shared [`RunAggregator`].
//! Counters are atomics and latency samples live in a `DashMap` keyed by step,
//! so updates from different workers commute and never need ordering.

use dashmap::DashMap;
use indexmap::IndexMap;
use metrics::{counter, histogram};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::workflow::{IterationReport, SessionState, Severity, StepError};

/// Latency samples collected for one step (or the whole run)
#[derive(Debug, Clone, Default)]
pub struct LatencyStats {
    pub samples: Vec<Duration>,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self {
            samples: Vec::new(),
        }
    }

    pub fn record(&mut self, latency: Duration) {
        self.samples.push(latency);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Calculate percentile (0-100), nearest rank
    pub fn percentile(&self, p: f64) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted = self.samples.clone();
        sorted.sort();

        let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
        Some(sorted[idx.min(sorted.len() - 1)])
    }

    pub fn p50(&self) -> Option<Duration> {
        self.percentile(50.0)
    }

    pub fn p90(&self) -> Option<Duration> {
        self.percentile(90.0)
    }

    pub fn p95(&self) -> Option<Duration> {
        self.percentile(95.0)
    }

    pub fn max(&self) -> Option<Duration> {
        self.samples.iter().max().copied()
    }

    pub fn mean(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let total: Duration = self.samples.iter().sum();
        Some(total / self.samples.len() as u32)
    }

    pub fn merge(&mut self, other: &LatencyStats) {
        self.samples.extend_from_slice(&other.samples);
    }
}

/// Passed/failed tally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckTotals {
    pub passed: u64,
    pub failed: u64,
}

impl CheckTotals {
    pub fn total(&self) -> u64 {
        self.passed + self.failed
    }

    /// Fraction passed, `None` with no checks
    pub fn ratio(&self) -> Option<f64> {
        if self.total() == 0 {
            None
        } else {
            Some(self.passed as f64 / self.total() as f64)
        }
    }

    fn add(&mut self, other: CheckTotals) {
        self.passed += other.passed;
        self.failed += other.failed;
    }
}

/// Per-step slice of a run result
#[derive(Debug, Clone, Default)]
pub struct StepResult {
    pub latencies: LatencyStats,
    pub checks: CheckTotals,
    pub diagnostics: CheckTotals,
}

impl StepResult {
    /// Checks feeding thresholds, diagnostics included on request
    pub fn counted_checks(&self, count_diagnostics: bool) -> CheckTotals {
        let mut totals = self.checks;
        if count_diagnostics {
            totals.add(self.diagnostics);
        }
        totals
    }
}

/// Snapshot of everything a run recorded
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    pub iterations: u64,
    pub iterations_completed: u64,
    /// Includes abandoned iterations
    pub iterations_failed: u64,
    pub iterations_abandoned: u64,
    pub checks: CheckTotals,
    pub diagnostics: CheckTotals,
    pub http_errors: u64,
    pub transport_errors: u64,
    /// In first-seen order
    pub steps: IndexMap<String, StepResult>,
    pub duration: Duration,
}

impl RunResult {
    /// Latency samples across every step
    pub fn all_latencies(&self) -> LatencyStats {
        let mut all = LatencyStats::new();
        for step in self.steps.values() {
            all.merge(&step.latencies);
        }
        all
    }

    pub fn counted_checks(&self, count_diagnostics: bool) -> CheckTotals {
        let mut totals = self.checks;
        if count_diagnostics {
            totals.add(self.diagnostics);
        }
        totals
    }

    pub fn iterations_per_second(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.iterations as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }
}

#[derive(Debug, Default)]
struct StepSamples {
    order: usize,
    latencies: Vec<Duration>,
    checks: CheckTotals,
    diagnostics: CheckTotals,
}

/// Shared, append-only accumulator for one run
#[derive(Debug, Default)]
pub struct RunAggregator {
    iterations: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    abandoned: AtomicU64,
    in_flight: AtomicU64,
    checks_passed: AtomicU64,
    checks_failed: AtomicU64,
    diagnostics_passed: AtomicU64,
    diagnostics_failed: AtomicU64,
    http_errors: AtomicU64,
    transport_errors: AtomicU64,
    steps: DashMap<String, StepSamples>,
    next_step_order: AtomicUsize,
}

impl RunAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an iteration as started; pairs with [`RunAggregator::end_iteration`]
    pub fn begin_iteration(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    pub fn end_iteration(&self, report: &IterationReport) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.record(report);
    }

    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Count every iteration still in flight as abandoned. Returns how many.
    pub fn abandon_in_flight(&self) -> u64 {
        let stragglers = self.in_flight.swap(0, Ordering::SeqCst);
        let report = IterationReport::abandoned();
        for _ in 0..stragglers {
            self.record(&report);
        }
        stragglers
    }

    /// A worker died mid-iteration; the iteration counts as failed
    pub fn record_crashed_iteration(&self) {
        // Never underflow if the crash happened between iterations
        let _ = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        self.iterations.fetch_add(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.record_unfinished_check();
        counter!("loadtest_iterations_total", "outcome" => "crashed").increment(1);
    }

    /// An iteration that never reached its own checks still fails one
    fn record_unfinished_check(&self) {
        self.checks_failed.fetch_add(1, Ordering::Relaxed);
        counter!("loadtest_checks_total", "result" => "fail").increment(1);
    }

    fn record(&self, report: &IterationReport) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
        let outcome = match report.state {
            SessionState::Completed => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                "completed"
            }
            SessionState::Abandoned => {
                self.abandoned.fetch_add(1, Ordering::Relaxed);
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.record_unfinished_check();
                "abandoned"
            }
            _ => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                "failed"
            }
        };
        counter!("loadtest_iterations_total", "outcome" => outcome).increment(1);

        for timing in &report.timings {
            histogram!("loadtest_step_duration_seconds", "step" => timing.step.clone())
                .record(timing.elapsed);
            self.step_entry(&timing.step).latencies.push(timing.elapsed);
        }

        for check in &report.checks {
            let result = if check.passed { "pass" } else { "fail" };
            let mut step = self.step_entry(&check.step);
            match (check.severity, check.passed) {
                (Severity::Check, true) => {
                    self.checks_passed.fetch_add(1, Ordering::Relaxed);
                    step.checks.passed += 1;
                }
                (Severity::Check, false) => {
                    self.checks_failed.fetch_add(1, Ordering::Relaxed);
                    step.checks.failed += 1;
                }
                (Severity::Diagnostic, true) => {
                    self.diagnostics_passed.fetch_add(1, Ordering::Relaxed);
                    step.diagnostics.passed += 1;
                }
                (Severity::Diagnostic, false) => {
                    self.diagnostics_failed.fetch_add(1, Ordering::Relaxed);
                    step.diagnostics.failed += 1;
                }
            }
            counter!("loadtest_checks_total", "result" => result).increment(1);
        }

        for error in &report.errors {
            match error {
                StepError::Http { .. } => {
                    self.http_errors.fetch_add(1, Ordering::Relaxed);
                }
                StepError::Transport { .. } => {
                    self.transport_errors.fetch_add(1, Ordering::Relaxed);
                }
                StepError::Assertion { .. } | StepError::ShutdownTimeout => {}
            }
        }
    }

    fn step_entry(&self, step: &str) -> dashmap::mapref::one::RefMut<'_, String, StepSamples> {
        self.steps.entry(step.to_string()).or_insert_with(|| StepSamples {
            order: self.next_step_order.fetch_add(1, Ordering::Relaxed),
            ..Default::default()
        })
    }

    /// Copy out the current totals
    pub fn snapshot(&self, duration: Duration) -> RunResult {
        let mut steps: Vec<(usize, String, StepResult)> = self
            .steps
            .iter()
            .map(|entry| {
                let samples = entry.value();
                (
                    samples.order,
                    entry.key().clone(),
                    StepResult {
                        latencies: LatencyStats {
                            samples: samples.latencies.clone(),
                        },
                        checks: samples.checks,
                        diagnostics: samples.diagnostics,
                    },
                )
            })
            .collect();
        steps.sort_by_key(|(order, _, _)| *order);

        RunResult {
            iterations: self.iterations.load(Ordering::SeqCst),
            iterations_completed: self.completed.load(Ordering::SeqCst),
            iterations_failed: self.failed.load(Ordering::SeqCst),
            iterations_abandoned: self.abandoned.load(Ordering::SeqCst),
            checks: CheckTotals {
                passed: self.checks_passed.load(Ordering::SeqCst),
                failed: self.checks_failed.load(Ordering::SeqCst),
            },
            diagnostics: CheckTotals {
                passed: self.diagnostics_passed.load(Ordering::SeqCst),
                failed: self.diagnostics_failed.load(Ordering::SeqCst),
            },
            http_errors: self.http_errors.load(Ordering::SeqCst),
            transport_errors: self.transport_errors.load(Ordering::SeqCst),
            steps: steps
                .into_iter()
                .map(|(_, name, result)| (name, result))
                .collect(),
            duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{CheckOutcome, StepTiming};
    use chrono::Utc;
    use std::sync::Arc;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn report(state: SessionState, steps: &[(&str, u64, bool)]) -> IterationReport {
        IterationReport {
            state,
            timings: steps
                .iter()
                .map(|(step, latency, _)| StepTiming {
                    step: step.to_string(),
                    started_at: Utc::now(),
                    finished_at: Utc::now(),
                    elapsed: ms(*latency),
                    status: Some(200),
                })
                .collect(),
            checks: steps
                .iter()
                .map(|(step, _, passed)| CheckOutcome {
                    step: step.to_string(),
                    name: format!("{} ok", step),
                    passed: *passed,
                    severity: Severity::Check,
                })
                .collect(),
            errors: Vec::new(),
        }
    }

    #[test]
    fn test_percentiles() {
        let mut stats = LatencyStats::new();
        for i in 1..=100 {
            stats.record(ms(i));
        }
        assert_eq!(stats.p50(), Some(ms(51)));
        assert_eq!(stats.p90(), Some(ms(90)));
        assert_eq!(stats.p95(), Some(ms(95)));
        assert_eq!(stats.max(), Some(ms(100)));
        assert_eq!(LatencyStats::new().p95(), None);
    }

    #[test]
    fn test_steps_keep_first_seen_order() {
        let agg = RunAggregator::new();
        agg.begin_iteration();
        agg.end_iteration(&report(
            SessionState::Completed,
            &[("login", 10, true), ("stats", 20, false), ("logout", 5, true)],
        ));

        let result = agg.snapshot(Duration::from_secs(1));
        let names: Vec<&str> = result.steps.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["login", "stats", "logout"]);
        assert_eq!(result.checks, CheckTotals { passed: 2, failed: 1 });
        assert_eq!(result.steps["stats"].checks.failed, 1);
        assert_eq!(result.all_latencies().len(), 3);
    }

    #[test]
    fn test_abandon_in_flight_counts_failures() {
        let agg = RunAggregator::new();
        agg.begin_iteration();
        agg.begin_iteration();
        agg.begin_iteration();
        agg.end_iteration(&report(SessionState::Completed, &[("login", 1, true)]));

        assert_eq!(agg.abandon_in_flight(), 2);
        assert_eq!(agg.in_flight(), 0);

        let result = agg.snapshot(Duration::ZERO);
        assert_eq!(result.iterations, 3);
        assert_eq!(result.iterations_completed, 1);
        assert_eq!(result.iterations_failed, 2);
        assert_eq!(result.iterations_abandoned, 2);
        assert_eq!(result.checks, CheckTotals { passed: 1, failed: 2 });
        assert!(result.steps.keys().all(|step| step == "login"));
    }

    #[test]
    fn test_crashed_iteration_fails_a_check() {
        let agg = RunAggregator::new();
        agg.begin_iteration();
        agg.record_crashed_iteration();
        // Crash between iterations must not underflow the in-flight count
        agg.record_crashed_iteration();

        let result = agg.snapshot(Duration::ZERO);
        assert_eq!(agg.in_flight(), 0);
        assert_eq!(result.iterations, 2);
        assert_eq!(result.iterations_failed, 2);
        assert_eq!(result.checks, CheckTotals { passed: 0, failed: 2 });
        assert_eq!(result.counted_checks(false).ratio(), Some(0.0));
    }

    #[test]
    fn test_diagnostics_counted_on_request() {
        let agg = RunAggregator::new();
        let mut r = report(SessionState::Completed, &[("login", 1, true)]);
        r.checks.push(CheckOutcome {
            step: "login".to_string(),
            name: "lang is en".to_string(),
            passed: false,
            severity: Severity::Diagnostic,
        });
        agg.begin_iteration();
        agg.end_iteration(&r);

        let result = agg.snapshot(Duration::ZERO);
        assert_eq!(result.counted_checks(false).ratio(), Some(1.0));
        assert_eq!(result.counted_checks(true).ratio(), Some(0.5));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_are_not_lost() {
        let agg = Arc::new(RunAggregator::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let agg = Arc::clone(&agg);
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    agg.begin_iteration();
                    agg.end_iteration(&report(
                        SessionState::Completed,
                        &[("login", 3, true), ("stats", 4, true)],
                    ));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let result = agg.snapshot(Duration::from_secs(1));
        assert_eq!(result.iterations, 800);
        assert_eq!(result.checks.passed, 1600);
        assert_eq!(result.steps["login"].latencies.len(), 800);
        assert_eq!(result.steps["stats"].latencies.len(), 800);
        assert_eq!(agg.in_flight(), 0);
    }
}
