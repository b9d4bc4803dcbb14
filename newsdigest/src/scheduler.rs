use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use common::MAX_INTERVAL_HOURS;

use crate::pipeline::{Pipeline, RunReport};

/// Point-in-time view of the scheduler, served by `GET /status`.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub busy: bool,
    pub interval_hours: f64,
    pub next_run_at: Option<DateTime<Utc>>,
    pub runs_completed: u64,
    pub last_report: Option<RunReport>,
}

#[derive(Default)]
struct ScheduleState {
    running: bool,
    next_run_at: Option<DateTime<Utc>>,
    runs_completed: u64,
    last_report: Option<RunReport>,
}

/// Runs the pipeline on a fixed interval. At most one run is in progress at a
/// time; a trigger arriving while busy is skipped, not queued.
#[derive(Clone)]
pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    interval: Duration,
    guard: Arc<Mutex<()>>,
    state: Arc<RwLock<ScheduleState>>,
}

impl Scheduler {
    /// `interval_hours` is clamped to `1..=MAX_INTERVAL_HOURS`.
    pub fn new(pipeline: Arc<Pipeline>, interval_hours: u64) -> Self {
        let hours = interval_hours.clamp(1, MAX_INTERVAL_HOURS);
        let secs = hours.checked_mul(3600).unwrap_or(MAX_INTERVAL_HOURS * 3600);
        Self::with_interval(pipeline, Duration::from_secs(secs))
    }

    pub fn with_interval(pipeline: Arc<Pipeline>, interval: Duration) -> Self {
        Self {
            pipeline,
            interval,
            guard: Arc::new(Mutex::new(())),
            state: Arc::new(RwLock::new(ScheduleState::default())),
        }
    }

    /// Run the pipeline now unless a run is already in progress.
    pub async fn trigger(&self) -> Option<RunReport> {
        let _busy = match self.guard.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("previous run still in progress, skipping");
                return None;
            }
        };

        let report = self.pipeline.run().await;

        let mut state = self.state.write().await;
        state.runs_completed += 1;
        state.last_report = Some(report.clone());
        Some(report)
    }

    /// Resolves once no run is in progress.
    pub async fn wait_idle(&self) {
        let _idle = self.guard.lock().await;
    }

    pub fn is_busy(&self) -> bool {
        self.guard.try_lock().is_err()
    }

    pub async fn status(&self) -> SchedulerStatus {
        let state = self.state.read().await;
        SchedulerStatus {
            running: state.running,
            busy: self.is_busy(),
            interval_hours: self.interval.as_secs_f64() / 3600.0,
            next_run_at: state.next_run_at,
            runs_completed: state.runs_completed,
            last_report: state.last_report.clone(),
        }
    }

    /// Tick until `shutdown` is notified. A run in progress always completes;
    /// the shutdown is observed before the next tick.
    pub async fn run_forever(&self, run_immediately: bool, shutdown: Arc<Notify>) {
        let start = if run_immediately {
            Instant::now()
        } else {
            Instant::now() + self.interval
        };
        let mut ticker = interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        {
            let mut state = self.state.write().await;
            state.running = true;
            state.next_run_at = Some(wall_clock_after(start.saturating_duration_since(Instant::now())));
        }
        info!(
            "scheduler: started, every {:.2}h, first run at {:?}",
            self.interval.as_secs_f64() / 3600.0,
            self.state.read().await.next_run_at
        );

        loop {
            select! {
                biased;
                _ = shutdown.notified() => {
                    info!("scheduler: shutdown requested, exiting loop");
                    break;
                }
                _ = ticker.tick() => {
                    self.state.write().await.next_run_at = Some(wall_clock_after(self.interval));
                    if let Some(report) = self.trigger().await {
                        info!(run_id = %report.run_id, "scheduler: run finished ({:?})", report.state);
                    }
                }
            }
        }

        let mut state = self.state.write().await;
        state.running = false;
        state.next_run_at = None;
    }
}

fn wall_clock_after(delay: Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero())
}
