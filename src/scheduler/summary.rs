//! Periodic aggregated status output
//!
//! Builds a compact summary of the whole engine (phase counts plus the
//! currently failing targets) and logs it at a fixed interval, so an
//! operator tailing the logs sees scheduler health without polling the
//! control surface.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use super::engine::Engine;
use super::status::{AggregateStatus, Phase};
use super::target::TargetId;

/// A target whose most recent attempt failed
#[derive(Debug, Clone, Serialize)]
pub struct FailingTarget {
    pub target: TargetId,
    pub site_name: String,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

/// Point-in-time health summary of the engine
#[derive(Debug, Clone, Serialize)]
pub struct StatusSummary {
    pub generated_at: DateTime<Utc>,
    pub users: usize,
    pub targets: usize,
    pub counts: AggregateStatus,
    pub failing: Vec<FailingTarget>,
}

impl Engine {
    /// Build a summary from the current status snapshot
    pub async fn status_summary(&self) -> StatusSummary {
        let counts = self.aggregate().await;
        let snapshot = self.status_snapshot(None).await;

        let failing = snapshot
            .into_iter()
            .filter(|r| r.status.phase == Phase::Failed)
            .map(|r| FailingTarget {
                target: r.target,
                site_name: r.status.site_name,
                consecutive_failures: r.status.consecutive_failures,
                last_error: r.status.last_error,
            })
            .collect();

        StatusSummary {
            generated_at: Utc::now(),
            users: self.user_ids().await.len(),
            targets: counts.overall.total(),
            counts,
            failing,
        }
    }
}

fn log_summary(summary: &StatusSummary) {
    let c = &summary.counts.overall;
    info!(
        users = summary.users,
        targets = summary.targets,
        idle = c.idle,
        running = c.running,
        succeeded = c.succeeded,
        failed = c.failed,
        "Scheduler status summary"
    );

    for failing in &summary.failing {
        warn!(
            target = %failing.target,
            site = %failing.site_name,
            consecutive_failures = failing.consecutive_failures,
            error = failing.last_error.as_deref().unwrap_or("-"),
            "Target is failing"
        );
    }
}

/// Spawn the periodic summary task. Returns `None` when the summary is
/// disabled by configuration.
pub fn spawn_summary(engine: Arc<Engine>) -> Option<JoinHandle<()>> {
    let period = engine.settings().summary_interval?;

    Some(tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let summary = engine.status_summary().await;
            log_summary(&summary);
        }
    }))
}
