//! Target registry: the catalog of all schedulable targets
//!
//! Owns each target's timer task handle and its generation tag.
//! Registration is idempotent; unregistering a target cancels its timer
//! immediately. Mutation is serialized per user by the engine, so a stop
//! in progress can never race a discovery-registered target for the same
//! user.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::target::{Target, TargetId, WebsiteSelector};

struct TargetEntry {
    target: Target,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl Drop for TargetEntry {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// In-memory catalog of registered targets
#[derive(Default)]
pub struct TargetRegistry {
    entries: RwLock<HashMap<TargetId, TargetEntry>>,
    next_generation: AtomicU64,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target. Idempotent: if the target is already present,
    /// nothing changes (no status reset, no timer restart) and `None` is
    /// returned. Otherwise the new entry's generation tag is returned.
    pub async fn register(&self, target: Target) -> Option<u64> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&target.id) {
            return None;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        entries.insert(
            target.id.clone(),
            TargetEntry {
                target,
                generation,
                timer: None,
            },
        );
        Some(generation)
    }

    /// Attach the spawned timer task to a freshly registered target
    pub async fn attach_timer(&self, id: &TargetId, handle: JoinHandle<()>) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(id) {
            entry.timer = Some(handle);
        } else {
            // target was unregistered between register and attach
            handle.abort();
        }
    }

    /// Remove a target, cancelling its timer. Returns whether it existed.
    pub async fn unregister(&self, id: &TargetId) -> bool {
        self.entries.write().await.remove(id).is_some()
    }

    /// Remove every target of one user, cancelling all their timers.
    /// Returns the removed target IDs.
    pub async fn unregister_user(&self, user_id: &str) -> Vec<TargetId> {
        let mut entries = self.entries.write().await;
        let ids: Vec<TargetId> = entries
            .keys()
            .filter(|id| id.user_id == user_id)
            .cloned()
            .collect();
        for id in &ids {
            entries.remove(id);
        }
        ids
    }

    pub async fn exists(&self, id: &TargetId) -> bool {
        self.entries.read().await.contains_key(id)
    }

    /// Current generation of a target, or `None` when it is not registered.
    /// Attempt completions compare against this before writing status.
    pub async fn generation(&self, id: &TargetId) -> Option<u64> {
        self.entries.read().await.get(id).map(|e| e.generation)
    }

    /// List registered targets with their generations, optionally limited
    /// to one user
    pub async fn list(&self, user_id: Option<&str>) -> Vec<(Target, u64)> {
        self.entries
            .read()
            .await
            .values()
            .filter(|e| user_id.map_or(true, |u| e.target.id.user_id == u))
            .map(|e| (e.target.clone(), e.generation))
            .collect()
    }

    /// Website IDs already registered for one user's space; used by the
    /// Discovery Loop to diff against the remote listing
    pub async fn website_ids(&self, user_id: &str, space_id: &str) -> HashSet<String> {
        self.entries
            .read()
            .await
            .keys()
            .filter(|id| id.user_id == user_id && id.space_id == space_id)
            .filter_map(|id| match &id.selector {
                WebsiteSelector::Website(website_id) => Some(website_id.clone()),
                WebsiteSelector::Space => None,
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
