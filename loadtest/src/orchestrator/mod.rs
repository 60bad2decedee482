//! Load orchestration
//!
//! This module provides:
//! - `Orchestrator`, which runs a workflow under a `LoadProfile`
//! - `RunAggregator`/`RunResult`, the shared result accumulator and its snapshot
//! - `RunSummary`, threshold outcomes plus console and JSON reporting

mod aggregate;
mod runner;
mod summary;

pub use aggregate::{CheckTotals, LatencyStats, RunAggregator, RunResult, StepResult};
pub use runner::{Orchestrator, OrchestratorConfig, StopSignal};
pub use summary::{RunSummary, ThresholdOutcome, ThresholdViolation, evaluate};
