//! Cooperative periodic driver for the pipeline stages.
//!
//! One tokio task ticks on a fixed cadence. Each tick sweeps expired
//! leases and then runs every enabled stage up to its per-tick budget.
//! Stage handlers never throw; they report an outcome and the scheduler
//! records runs and last errors in its metrics while it keeps ticking.

use crate::types::QueueSet;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Result of one stage run. Errors are carried as data, never thrown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// Nothing to do.
    Idle,

    /// One record processed.
    Done,

    /// One record processed and an error was handled internally (acked
    /// with feedback or nacked for redelivery).
    Failed(String),
}

/// A pipeline stage the scheduler can drive.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Process at most one record.
    async fn once(&self) -> StageOutcome;
}

/// Per-stage run budgets for one tick.
#[derive(Debug, Clone, Copy)]
pub struct MaxPerTick {
    pub planner: usize,
    pub executor: usize,
    pub auditor: usize,
    pub committer: usize,
}

impl Default for MaxPerTick {
    fn default() -> Self {
        Self {
            planner: 1,
            executor: 2,
            auditor: 4,
            committer: 4,
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub cadence: Duration,
    pub planner: bool,
    pub executor: bool,
    pub auditor: bool,
    pub committer: bool,
    pub max_per_tick: MaxPerTick,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cadence: Duration::from_millis(250),
            planner: true,
            executor: true,
            auditor: true,
            committer: true,
            max_per_tick: MaxPerTick::default(),
        }
    }
}

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// Counters and last errors, exposed over the server surface.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerMetrics {
    pub started_at: Option<DateTime<Utc>>,
    pub ticks: u64,
    pub runs: HashMap<String, u64>,
    pub last_error: HashMap<String, String>,
    pub expired_leases: u64,
}

/// The periodic driver. Shared behind `Arc`; `start` is idempotent.
pub struct Scheduler {
    queues: QueueSet,
    planner: Arc<dyn Stage>,
    executor: Arc<dyn Stage>,
    auditor: Arc<dyn Stage>,
    committer: Arc<dyn Stage>,
    running: AtomicBool,
    metrics: Mutex<SchedulerMetrics>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        queues: QueueSet,
        planner: Arc<dyn Stage>,
        executor: Arc<dyn Stage>,
        auditor: Arc<dyn Stage>,
        committer: Arc<dyn Stage>,
    ) -> Self {
        Self {
            queues,
            planner,
            executor,
            auditor,
            committer,
            running: AtomicBool::new(false),
            metrics: Mutex::new(SchedulerMetrics::default()),
            handle: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::SeqCst) {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    pub fn metrics(&self) -> SchedulerMetrics {
        self.metrics.lock().clone()
    }

    /// Run one tick: sweep leases, then drive each enabled stage up to
    /// its budget. Public so tests and the coordinator can drain the
    /// pipeline deterministically.
    pub async fn tick(&self, config: &SchedulerConfig) {
        let expired = self.queues.expire_leases();
        if expired > 0 {
            warn!(expired, "Swept expired leases");
        }

        let budgets: [(bool, &Arc<dyn Stage>, usize); 4] = [
            (config.planner, &self.planner, config.max_per_tick.planner),
            (config.executor, &self.executor, config.max_per_tick.executor),
            (config.auditor, &self.auditor, config.max_per_tick.auditor),
            (config.committer, &self.committer, config.max_per_tick.committer),
        ];

        for (enabled, stage, budget) in budgets {
            if !enabled {
                continue;
            }
            for _ in 0..budget {
                match stage.once().await {
                    StageOutcome::Idle => break,
                    StageOutcome::Done => {
                        let mut metrics = self.metrics.lock();
                        *metrics.runs.entry(stage.name().to_string()).or_insert(0) += 1;
                    }
                    StageOutcome::Failed(error) => {
                        debug!(stage = stage.name(), error = %error, "Stage run failed");
                        let mut metrics = self.metrics.lock();
                        *metrics.runs.entry(stage.name().to_string()).or_insert(0) += 1;
                        metrics.last_error.insert(stage.name().to_string(), error);
                    }
                }
            }
        }

        let mut metrics = self.metrics.lock();
        metrics.ticks += 1;
        metrics.expired_leases += expired as u64;
    }

    /// Start ticking. A second start while running is a no-op.
    pub fn start(self: &Arc<Self>, config: SchedulerConfig) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(cadence_ms = config.cadence.as_millis() as u64, "Scheduler starting");
        {
            let mut metrics = self.metrics.lock();
            if metrics.started_at.is_none() {
                metrics.started_at = Some(Utc::now());
            }
        }

        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.cadence);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if !scheduler.running.load(Ordering::SeqCst) {
                    break;
                }
                scheduler.tick(&config).await;
            }
            info!("Scheduler stopped");
        });
        *self.handle.lock() = Some(handle);
    }

    /// Stop after the in-flight tick completes. Leased records time out
    /// naturally.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            if let Some(handle) = self.handle.lock().take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Stage that always has work and counts its runs.
    struct BusyStage {
        name: &'static str,
        runs: AtomicUsize,
    }

    impl BusyStage {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                runs: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Stage for BusyStage {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn once(&self) -> StageOutcome {
            self.runs.fetch_add(1, Ordering::SeqCst);
            StageOutcome::Done
        }
    }

    struct FailingStage;

    #[async_trait]
    impl Stage for FailingStage {
        fn name(&self) -> &'static str {
            "executor"
        }

        async fn once(&self) -> StageOutcome {
            StageOutcome::Failed("Graph not found: nope".to_string())
        }
    }

    fn scheduler_with(
        executor: Arc<dyn Stage>,
    ) -> (Scheduler, Arc<BusyStage>, Arc<BusyStage>, Arc<BusyStage>) {
        let planner = BusyStage::new("planner");
        let auditor = BusyStage::new("auditor");
        let committer = BusyStage::new("committer");
        let scheduler = Scheduler::new(
            QueueSet::new(),
            planner.clone(),
            executor,
            auditor.clone(),
            committer.clone(),
        );
        (scheduler, planner, auditor, committer)
    }

    #[tokio::test]
    async fn test_budget_caps_runs_per_tick() {
        let executor = BusyStage::new("executor");
        let (scheduler, planner, ..) = scheduler_with(executor.clone());

        let config = SchedulerConfig {
            max_per_tick: MaxPerTick {
                planner: 1,
                executor: 3,
                auditor: 2,
                committer: 2,
            },
            ..Default::default()
        };
        scheduler.tick(&config).await;

        assert_eq!(executor.runs.load(Ordering::SeqCst), 3);
        assert_eq!(planner.runs.load(Ordering::SeqCst), 1);
        let metrics = scheduler.metrics();
        assert_eq!(metrics.runs["executor"], 3);
        assert_eq!(metrics.ticks, 1);
    }

    #[tokio::test]
    async fn test_disabled_stage_does_not_run() {
        let executor = BusyStage::new("executor");
        let (scheduler, planner, ..) = scheduler_with(executor.clone());

        let config = SchedulerConfig {
            executor: false,
            ..Default::default()
        };
        scheduler.tick(&config).await;

        assert_eq!(executor.runs.load(Ordering::SeqCst), 0);
        assert!(planner.runs.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn test_failed_runs_update_last_error_and_keep_ticking() {
        let (scheduler, ..) = scheduler_with(Arc::new(FailingStage));

        let config = SchedulerConfig::default();
        scheduler.tick(&config).await;
        scheduler.tick(&config).await;

        let metrics = scheduler.metrics();
        assert_eq!(metrics.ticks, 2);
        assert!(metrics.last_error["executor"].contains("not found"));
    }

    #[tokio::test]
    async fn test_start_stop_transitions() {
        let executor = BusyStage::new("executor");
        let (scheduler, ..) = scheduler_with(executor.clone());
        let scheduler = Arc::new(scheduler);

        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        scheduler.start(SchedulerConfig {
            cadence: Duration::from_millis(5),
            ..Default::default()
        });
        assert_eq!(scheduler.state(), SchedulerState::Running);

        // Second start is a no-op.
        scheduler.start(SchedulerConfig::default());

        tokio::time::sleep(Duration::from_millis(40)).await;
        scheduler.stop();
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert!(executor.runs.load(Ordering::SeqCst) > 0);
        assert!(scheduler.metrics().started_at.is_some());
    }
}
