//! Virtual-user scheduling
//!
//! Each virtual user is a tokio task looping over fresh iterations of the
//! workflow. A fixed profile shares one iteration budget between its workers.
//! A staged profile is driven by a ramp controller that spawns workers or
//! retires them (after their current iteration) to track the target count.
//! On completion or stop, in-flight iterations get a grace period to drain;
//! whatever is still running after that is aborted and counted as abandoned.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, MissedTickBehavior, interval, sleep, sleep_until, timeout};
use tracing::{debug, error, info, warn};

use super::aggregate::RunAggregator;
use super::summary::{RunSummary, evaluate};
use crate::profile::{LoadProfile, LoadShape};
use crate::workflow::{SessionContext, Workflow};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Time in-flight iterations get to finish after the run ends
    pub grace_period: Duration,
    /// Pause between iterations of one virtual user
    pub pacing: Duration,
    /// Hard stop for the whole run; unbounded when unset
    pub max_duration: Option<Duration>,
    /// How often the staged ramp re-evaluates its target
    pub ramp_tick: Duration,
    /// Let diagnostic checks count toward check-ratio thresholds
    pub count_diagnostics: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(30),
            pacing: Duration::ZERO,
            max_duration: None,
            ramp_tick: Duration::from_millis(500),
            count_diagnostics: false,
        }
    }
}

/// Cloneable handle that ends a run early
#[derive(Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Iterations left in a fixed run
struct IterationBudget {
    remaining: AtomicU64,
}

impl IterationBudget {
    fn new(iterations: u64) -> Self {
        Self {
            remaining: AtomicU64::new(iterations),
        }
    }

    fn claim(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn remaining(&self) -> u64 {
        self.remaining.load(Ordering::SeqCst)
    }
}

struct Worker {
    id: usize,
    workflow: Arc<dyn Workflow>,
    aggregator: Arc<RunAggregator>,
    stop: watch::Receiver<bool>,
    retire: Arc<AtomicBool>,
    budget: Option<Arc<IterationBudget>>,
    pacing: Duration,
}

impl Worker {
    async fn run(mut self) {
        debug!("virtual user {} started", self.id);
        let mut iterations = 0u64;

        loop {
            if *self.stop.borrow() || self.retire.load(Ordering::SeqCst) {
                break;
            }
            if let Some(budget) = &self.budget
                && !budget.claim()
            {
                break;
            }

            self.aggregator.begin_iteration();
            let mut ctx = SessionContext::new();
            self.workflow.run(&mut ctx).await;
            let report = ctx.finish();
            self.aggregator.end_iteration(&report);
            iterations += 1;

            if self.pacing.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::select! {
                    _ = sleep(self.pacing) => {}
                    _ = self.stop.changed() => {}
                }
            }
        }

        debug!(
            "virtual user {} finished after {} iterations",
            self.id, iterations
        );
    }
}

/// Live workers plus what is needed to spawn more
struct WorkerPool {
    set: JoinSet<()>,
    /// Retire flags of workers counted toward the target
    active: Vec<Arc<AtomicBool>>,
    next_id: usize,
    workflow: Arc<dyn Workflow>,
    aggregator: Arc<RunAggregator>,
    stop_tx: Arc<watch::Sender<bool>>,
    budget: Option<Arc<IterationBudget>>,
    pacing: Duration,
}

impl WorkerPool {
    fn spawn(&mut self) {
        let retire = Arc::new(AtomicBool::new(false));
        let worker = Worker {
            id: self.next_id,
            workflow: Arc::clone(&self.workflow),
            aggregator: Arc::clone(&self.aggregator),
            stop: self.stop_tx.subscribe(),
            retire: Arc::clone(&retire),
            budget: self.budget.clone(),
            pacing: self.pacing,
        };
        self.next_id += 1;
        self.active.push(retire);
        self.set.spawn(worker.run());
    }

    /// Grow or shrink toward `target` live workers
    fn scale_to(&mut self, target: usize) {
        // A worker that exited (or panicked) has dropped its clone of the flag
        self.active.retain(|flag| Arc::strong_count(flag) > 1);

        if self.active.len() != target {
            debug!("scaling virtual users {} -> {}", self.active.len(), target);
        }
        while self.active.len() < target {
            self.spawn();
        }
        while self.active.len() > target {
            if let Some(flag) = self.active.pop() {
                flag.store(true, Ordering::SeqCst);
            }
        }
        metrics::gauge!("loadtest_virtual_users").set(self.active.len() as f64);
    }

    /// Account for a finished worker. Returns true if it panicked.
    fn reap(&self, joined: Result<(), JoinError>) -> bool {
        match joined {
            Err(e) if e.is_panic() => {
                error!("virtual user crashed: {}", e);
                self.aggregator.record_crashed_iteration();
                true
            }
            _ => false,
        }
    }

    fn has_budget(&self) -> bool {
        self.budget.as_ref().is_some_and(|b| b.remaining() > 0)
    }
}

/// Drives one workflow under one load profile
pub struct Orchestrator {
    workflow: Arc<dyn Workflow>,
    profile: LoadProfile,
    config: OrchestratorConfig,
    stop_tx: Arc<watch::Sender<bool>>,
}

impl Orchestrator {
    pub fn new(workflow: Arc<dyn Workflow>, profile: LoadProfile, config: OrchestratorConfig) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            workflow,
            profile,
            config,
            stop_tx: Arc::new(stop_tx),
        }
    }

    pub fn profile(&self) -> &LoadProfile {
        &self.profile
    }

    pub fn stop_signal(&self) -> StopSignal {
        StopSignal {
            tx: Arc::clone(&self.stop_tx),
        }
    }

    /// Run the profile to completion (or until stopped) and judge the result
    pub async fn run(&self) -> RunSummary {
        let started = Instant::now();
        let aggregator = Arc::new(RunAggregator::new());
        let deadline = self
            .config
            .max_duration
            .and_then(|d| started.checked_add(d));
        let mut stop = self.stop_tx.subscribe();
        let already_stopped = *stop.borrow_and_update();

        let budget = match &self.profile.shape {
            LoadShape::Fixed { iterations, .. } => Some(Arc::new(IterationBudget::new(*iterations))),
            LoadShape::Staged { .. } => None,
        };

        let mut pool = WorkerPool {
            set: JoinSet::new(),
            active: Vec::new(),
            next_id: 0,
            workflow: Arc::clone(&self.workflow),
            aggregator: Arc::clone(&aggregator),
            stop_tx: Arc::clone(&self.stop_tx),
            budget,
            pacing: self.config.pacing,
        };

        info!(
            "Starting run of '{}' ({:?}, peak {} virtual users)",
            self.workflow.name(),
            self.profile.shape,
            self.profile.peak_virtual_users()
        );

        let interrupted = if already_stopped {
            true
        } else {
            match &self.profile.shape {
                LoadShape::Fixed { virtual_users, .. } => {
                    pool.scale_to(*virtual_users);
                    self.wait_fixed(&mut pool, *virtual_users, &mut stop, deadline)
                        .await
                }
                LoadShape::Staged { .. } => {
                    self.drive_ramp(&mut pool, &mut stop, started, deadline)
                        .await
                }
            }
        };

        self.stop_tx.send_replace(true);
        self.drain(&mut pool).await;

        let result = aggregator.snapshot(started.elapsed());
        let outcomes = evaluate(&self.profile.thresholds, &result, self.config.count_diagnostics);
        info!(
            "Run of '{}' finished: {} iterations, {} failed, {} abandoned",
            self.workflow.name(),
            result.iterations,
            result.iterations_failed,
            result.iterations_abandoned
        );

        RunSummary {
            workflow: self.workflow.name().to_string(),
            result,
            outcomes,
            interrupted,
        }
    }

    /// Wait for a fixed run's workers to exhaust the budget. Returns true if cut short.
    async fn wait_fixed(
        &self,
        pool: &mut WorkerPool,
        virtual_users: usize,
        stop: &mut watch::Receiver<bool>,
        deadline: Option<Instant>,
    ) -> bool {
        loop {
            tokio::select! {
                joined = pool.set.join_next() => match joined {
                    Some(joined) => {
                        // Replace a crashed worker while iterations are left
                        if pool.reap(joined) && pool.has_budget() {
                            pool.scale_to(virtual_users);
                        }
                    }
                    None => return false,
                },
                _ = stop.changed() => {
                    info!("Stop requested, ending run");
                    return true;
                }
                _ = sleep_until_opt(deadline) => {
                    warn!("Max run duration reached, ending run");
                    return true;
                }
            }
        }
    }

    /// Follow the staged ramp until its last stage ends. Returns true if cut short.
    async fn drive_ramp(
        &self,
        pool: &mut WorkerPool,
        stop: &mut watch::Receiver<bool>,
        started: Instant,
        deadline: Option<Instant>,
    ) -> bool {
        let total = self.profile.total_duration().unwrap_or_default();
        let ramp_end = started.checked_add(total);
        let mut tick = interval(self.config.ramp_tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let elapsed = started.elapsed();
            if elapsed >= total {
                return false;
            }
            pool.scale_to(self.profile.target_at(elapsed));

            tokio::select! {
                _ = tick.tick() => {}
                _ = sleep_until_opt(ramp_end) => {}
                Some(joined) = pool.set.join_next(), if !pool.set.is_empty() => {
                    pool.reap(joined);
                }
                _ = stop.changed() => {
                    info!("Stop requested, ending run");
                    return true;
                }
                _ = sleep_until_opt(deadline) => {
                    warn!("Max run duration reached, ending run");
                    return true;
                }
            }
        }
    }

    /// Give in-flight iterations the grace period, then abort the rest
    async fn drain(&self, pool: &mut WorkerPool) {
        if pool.set.is_empty() {
            return;
        }
        debug!(
            "Draining {} virtual users (grace {:?})",
            pool.set.len(),
            self.config.grace_period
        );

        let drained = timeout(self.config.grace_period, async {
            while let Some(joined) = pool.set.join_next().await {
                pool.reap(joined);
            }
        })
        .await;

        if drained.is_err() {
            pool.set.abort_all();
            while let Some(joined) = pool.set.join_next().await {
                pool.reap(joined);
            }
            let abandoned = pool.aggregator.abandon_in_flight();
            warn!(
                "{} iterations abandoned after {:?} grace period",
                abandoned, self.config.grace_period
            );
        }
        metrics::gauge!("loadtest_virtual_users").set(0.0);
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
