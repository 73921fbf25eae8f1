//! Pipeline scheduling
//!
//! A single coordinator runs pool sync, status sync and merge in that
//! order once per tick. Each finished stage is published on a watch
//! channel so observers see explicit progress events.

use super::Blocker;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// PR listing and simple conditions
    PoolSync,
    /// Full conditions and status publication
    StatusSync,
    /// Merge or retest
    Merge,
}

/// Last completed stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleProgress {
    /// Cycle number, starting at 1
    pub cycle: u64,
    /// Stage that just finished
    pub stage: Option<Stage>,
    /// When it finished
    pub finished_at: Option<DateTime<Utc>>,
}

/// `period` plus a uniform random delay of at most `jitter`
pub fn jittered(period: Duration, jitter: Duration) -> Duration {
    let max_ms = u64::try_from(jitter.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return period;
    }
    let jitter_ms = rand::thread_rng().gen_range(0..=max_ms);
    period.saturating_add(Duration::from_millis(jitter_ms))
}

/// Coordinator driving the three passes
pub struct Scheduler {
    blocker: Arc<Blocker>,
    progress: watch::Sender<CycleProgress>,
    cycle: u64,
}

impl Scheduler {
    /// Create a scheduler for `blocker`
    pub fn new(blocker: Arc<Blocker>) -> Self {
        let (progress, _) = watch::channel(CycleProgress::default());
        Self {
            blocker,
            progress,
            cycle: 0,
        }
    }

    /// Receive stage completion events
    pub fn subscribe(&self) -> watch::Receiver<CycleProgress> {
        self.progress.subscribe()
    }

    fn finish(&self, stage: Stage) {
        self.progress.send_replace(CycleProgress {
            cycle: self.cycle,
            stage: Some(stage),
            finished_at: Some(Utc::now()),
        });
    }

    /// Run one full pipeline cycle; returns its number
    pub async fn run_cycle(&mut self) -> u64 {
        self.cycle += 1;
        info!(cycle = self.cycle, "starting pipeline cycle");

        if let Err(e) = self.blocker.sync_pools().await {
            warn!(error = %e, "pool sync failed");
        }
        self.finish(Stage::PoolSync);

        self.blocker.sync_statuses().await;
        self.finish(Stage::StatusSync);

        self.blocker.merge_all().await;
        self.finish(Stage::Merge);

        self.cycle
    }

    /// Run cycles forever, the first one immediately
    pub async fn run(mut self) {
        let settings = self.blocker.settings().clone();
        loop {
            self.run_cycle().await;
            let delay = jittered(settings.sync_period(), settings.jitter());
            info!(next_in_ms = delay.as_millis(), "pipeline cycle done");
            tokio::time::sleep(delay).await;
        }
    }
}
