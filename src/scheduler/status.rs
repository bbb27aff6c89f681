//! Status registry: per-target crawl state tracking
//!
//! Keeps the live phase, timestamps, and counters for every registered
//! target. The `begin_attempt` check-and-set is the single mechanism that
//! prevents two concurrent attempts for the same target: both the phase
//! check and the transition to `Running` happen under one write lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::target::TargetId;
use crate::client::Outcome;

// ============================================================================
// Phase
// ============================================================================

/// Lifecycle phase of a target's crawl attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// No attempt has run yet
    Idle,

    /// An attempt is in flight right now
    Running,

    /// The most recent attempt succeeded
    Succeeded,

    /// The most recent attempt failed
    Failed,
}

impl Phase {
    /// A new attempt may start from any phase except `Running`
    pub fn can_start_attempt(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

// ============================================================================
// Target Status
// ============================================================================

/// Mutable per-target status record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetStatus {
    /// Website (or space) display name
    pub site_name: String,

    /// Current phase
    pub phase: Phase,

    /// Remote run ID from the most recent successful trigger
    pub run_id: Option<String>,

    /// When the most recent attempt started
    pub last_attempt: Option<DateTime<Utc>>,

    /// When the most recent successful attempt completed
    pub last_success: Option<DateTime<Utc>>,

    /// Error summary from the most recent failed attempt
    pub last_error: Option<String>,

    /// Failures since the last success
    pub consecutive_failures: u32,

    /// Attempts started over the target's lifetime
    pub total_attempts: u64,
}

impl TargetStatus {
    fn new(site_name: &str) -> Self {
        Self {
            site_name: site_name.to_string(),
            phase: Phase::Idle,
            run_id: None,
            last_attempt: None,
            last_success: None,
            last_error: None,
            consecutive_failures: 0,
            total_attempts: 0,
        }
    }
}

/// One row of a status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    pub target: TargetId,
    pub status: TargetStatus,
}

// ============================================================================
// Aggregates
// ============================================================================

/// Target counts by phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseCounts {
    pub idle: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl PhaseCounts {
    fn add(&mut self, phase: Phase) {
        match phase {
            Phase::Idle => self.idle += 1,
            Phase::Running => self.running += 1,
            Phase::Succeeded => self.succeeded += 1,
            Phase::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.idle + self.running + self.succeeded + self.failed
    }
}

/// Phase counts globally and per user
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateStatus {
    pub overall: PhaseCounts,
    pub per_user: HashMap<String, PhaseCounts>,
}

// ============================================================================
// Status Registry
// ============================================================================

struct StatusEntry {
    /// Generation tag assigned at registration; a completion carrying a
    /// different generation belongs to a destroyed target and is dropped
    generation: u64,
    status: TargetStatus,
}

/// Process-wide store of per-target status records
#[derive(Default)]
pub struct StatusRegistry {
    entries: RwLock<HashMap<TargetId, StatusEntry>>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh Idle record for a newly registered target
    pub async fn insert(&self, id: &TargetId, generation: u64, site_name: &str) {
        let mut entries = self.entries.write().await;
        entries.insert(
            id.clone(),
            StatusEntry {
                generation,
                status: TargetStatus::new(site_name),
            },
        );
    }

    /// Drop the record for an unregistered target
    pub async fn remove(&self, id: &TargetId) {
        self.entries.write().await.remove(id);
    }

    /// Atomic check-and-set: transition to `Running` if and only if the
    /// target exists under this generation and is not already running.
    /// Returns false when the cycle must be skipped.
    pub async fn begin_attempt(&self, id: &TargetId, generation: u64) -> bool {
        let mut entries = self.entries.write().await;

        let Some(entry) = entries.get_mut(id) else {
            return false;
        };
        if entry.generation != generation || !entry.status.phase.can_start_attempt() {
            return false;
        }

        entry.status.phase = Phase::Running;
        entry.status.last_attempt = Some(Utc::now());
        entry.status.total_attempts += 1;
        true
    }

    /// Record the terminal outcome of an attempt started via
    /// `begin_attempt`. Silently dropped when the target has been
    /// unregistered (or recreated) in the meantime.
    pub async fn complete_attempt(&self, id: &TargetId, generation: u64, outcome: &Outcome) {
        let mut entries = self.entries.write().await;

        let Some(entry) = entries.get_mut(id) else {
            return;
        };
        if entry.generation != generation {
            return;
        }

        match outcome {
            Outcome::Success { run_id, .. } => {
                entry.status.phase = Phase::Succeeded;
                entry.status.last_success = Some(Utc::now());
                entry.status.last_error = None;
                entry.status.consecutive_failures = 0;
                if run_id.is_some() {
                    entry.status.run_id = run_id.clone();
                }
            }
            Outcome::Failed { error, .. } => {
                entry.status.phase = Phase::Failed;
                entry.status.last_error = Some(error.clone());
                entry.status.consecutive_failures += 1;
            }
        }
    }

    /// Immutable copy of the current records, optionally limited to one user
    pub async fn snapshot(&self, user_id: Option<&str>) -> Vec<StatusRecord> {
        let entries = self.entries.read().await;

        let mut records: Vec<StatusRecord> = entries
            .iter()
            .filter(|(id, _)| user_id.map_or(true, |u| id.user_id == u))
            .map(|(id, entry)| StatusRecord {
                target: id.clone(),
                status: entry.status.clone(),
            })
            .collect();

        records.sort_by(|a, b| a.target.to_string().cmp(&b.target.to_string()));
        records
    }

    /// Phase counts, globally and per user
    pub async fn aggregate(&self) -> AggregateStatus {
        let entries = self.entries.read().await;

        let mut agg = AggregateStatus::default();
        for (id, entry) in entries.iter() {
            agg.overall.add(entry.status.phase);
            agg.per_user
                .entry(id.user_id.clone())
                .or_default()
                .add(entry.status.phase);
        }
        agg
    }
}

// ============================================================================
// Tests
// ============================================================================
