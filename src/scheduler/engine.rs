//! Scheduler engine: control surface and per-target timers
//!
//! The engine owns all mutable scheduling state. Control operations
//! (set_config, start, stop, run_once) and the Discovery Loop are
//! serialized per user through one async mutex per user slot, so a stop
//! in progress can never race discovery or a concurrent reconfiguration
//! for the same user. Status reads never take a user lock.
//!
//! Each registered target runs one fixed-rate tokio timer task. A tick
//! never blocks on the network: the trigger call runs in a detached task,
//! and the skip-if-running check-and-set in the status registry is the
//! sole overlap guard.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::client::{
    trigger_with_retry, ApiClient, ClientError, CrawlApi, Outcome, RetryPolicy, Website,
    website_matches_filter,
};
use crate::config::{EngineSettings, SpaceConfig, UserConfig};

use super::error::{SchedulerError, SchedulerResult};
use super::registry::TargetRegistry;
use super::status::{AggregateStatus, StatusRecord, StatusRegistry};
use super::target::{Target, TargetId};

// ============================================================================
// Reports
// ============================================================================

/// Result of a `start` operation
#[derive(Debug, Clone, serde::Serialize)]
pub struct StartReport {
    pub user_id: String,
    /// Targets scheduled by this call
    pub scheduled: usize,
    /// The user was already running; nothing changed
    pub already_started: bool,
    /// Per-space problems that did not abort the start
    pub warnings: Vec<String>,
}

/// Result of a `stop` operation
#[derive(Debug, Clone, serde::Serialize)]
pub struct StopReport {
    pub user_id: String,
    /// Targets destroyed by this call
    pub stopped: usize,
}

/// Result of a `run_once` operation
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunOnceReport {
    pub user_id: String,
    /// Targets whose trigger was fired
    pub fired: usize,
    /// Targets skipped because an attempt was already in flight
    pub skipped: usize,
}

/// Configuration view of one user for status responses
#[derive(Debug, Clone, serde::Serialize)]
pub struct UserView {
    pub user_id: String,
    pub base_url: String,
    /// Masked; the full key is never echoed back
    pub api_key: String,
    pub started: bool,
    pub spaces: Vec<SpaceConfig>,
    pub target_count: usize,
}

// ============================================================================
// Engine
// ============================================================================

/// Builds a [`CrawlApi`] for one user's credential. Swapped out in tests.
pub type ClientFactory =
    Box<dyn Fn(&UserConfig) -> Result<Arc<dyn CrawlApi>, ClientError> + Send + Sync>;

/// A space whose ID is known, either directly from configuration or
/// resolved from its name at start time
#[derive(Clone)]
pub(crate) struct ResolvedSpace {
    pub space_id: String,
    pub config: SpaceConfig,
}

/// Everything the engine holds for one configured user. Guarded by the
/// per-user mutex in [`Engine::users`].
pub(crate) struct UserState {
    pub config: UserConfig,
    pub client: Arc<dyn CrawlApi>,
    pub started: bool,
    /// Spaces resolved at the most recent start; consumed by discovery
    pub spaces: Vec<ResolvedSpace>,
}

/// The scheduling core behind the control surface
pub struct Engine {
    /// One slot per configured user. The outer lock is held only to look
    /// up or insert a slot; all real work runs under the inner per-user
    /// mutex.
    users: Mutex<HashMap<String, Arc<Mutex<UserState>>>>,
    registry: Arc<TargetRegistry>,
    status: Arc<StatusRegistry>,
    settings: EngineSettings,
    retry: RetryPolicy,
    client_factory: ClientFactory,
}

impl Engine {
    pub fn new(settings: EngineSettings) -> Self {
        let timeout = settings.request_timeout;
        let factory: ClientFactory = Box::new(move |config: &UserConfig| {
            let client = ApiClient::new(&config.base_url, &config.api_key, timeout)?;
            Ok(Arc::new(client) as Arc<dyn CrawlApi>)
        });
        Self::with_client_factory(settings, RetryPolicy::default(), factory)
    }

    /// Construct with an injected client factory and retry policy
    pub fn with_client_factory(
        settings: EngineSettings,
        retry: RetryPolicy,
        client_factory: ClientFactory,
    ) -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            registry: Arc::new(TargetRegistry::new()),
            status: Arc::new(StatusRegistry::new()),
            settings,
            retry,
            client_factory,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub(crate) fn target_registry(&self) -> &Arc<TargetRegistry> {
        &self.registry
    }

    // ------------------------------------------------------------------------
    // Control surface
    // ------------------------------------------------------------------------

    /// Store (or replace) a user's configuration. A replaced configuration
    /// first stops every target of the previous one; running timers are
    /// never mutated in place.
    pub async fn set_config(&self, user_id: &str, config: UserConfig) -> SchedulerResult<()> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;
        let client = (self.client_factory)(&config)?;

        let slot = {
            let mut users = self.users.lock().await;
            let Some(slot) = users.get(user_id) else {
                users.insert(
                    user_id.to_string(),
                    Arc::new(Mutex::new(UserState {
                        config,
                        client,
                        started: false,
                        spaces: Vec::new(),
                    })),
                );
                info!(user = %user_id, "Stored configuration for new user");
                return Ok(());
            };
            Arc::clone(slot)
        };

        // replace: stop the old targets under the user lock, then swap
        let mut state = slot.lock().await;
        let stopped = self.destroy_user_targets(user_id).await;
        if stopped > 0 {
            info!(user = %user_id, stopped, "Stopped targets of replaced configuration");
        }
        state.config = config;
        state.client = client;
        state.started = false;
        state.spaces.clear();
        info!(user = %user_id, "Replaced configuration");
        Ok(())
    }

    /// Resolve the user's spaces, list their websites, and schedule one
    /// target per selected website. Already-started users are left alone.
    pub async fn start(&self, user_id: &str) -> SchedulerResult<StartReport> {
        let slot = self.user_slot(user_id).await?;
        let mut state = slot.lock().await;

        if state.started {
            debug!(user = %user_id, "Start requested but user is already running");
            return Ok(StartReport {
                user_id: user_id.to_string(),
                scheduled: 0,
                already_started: true,
                warnings: Vec::new(),
            });
        }

        let mut warnings = Vec::new();
        let mut resolved = Vec::new();
        let mut scheduled = 0;

        for space_config in state.config.spaces.clone() {
            let space_id = match self.resolve_space_id(&state.client, &space_config).await {
                Ok(id) => id,
                Err(e) => {
                    warn!(user = %user_id, space = %space_config.label(), error = %e,
                          "Space resolution failed, skipping space");
                    warnings.push(format!("space '{}': {e}", space_config.label()));
                    continue;
                }
            };

            let websites = match state.client.list_space_websites(&space_id).await {
                Ok(websites) => websites,
                Err(e) => {
                    warn!(user = %user_id, space = %space_id, error = %e,
                          "Website listing failed, space starts empty");
                    warnings.push(format!("space '{}': {e}", space_config.label()));
                    // still eligible for discovery later
                    resolved.push(ResolvedSpace {
                        space_id,
                        config: space_config,
                    });
                    continue;
                }
            };

            for website in select_websites(&space_config, websites) {
                let target = Target {
                    id: TargetId::website(user_id, &space_id, &website.id),
                    site_name: website.display_name().to_string(),
                    interval: space_config.interval(),
                };
                if self.schedule_target(Arc::clone(&state.client), target).await {
                    scheduled += 1;
                }
            }

            resolved.push(ResolvedSpace {
                space_id,
                config: space_config,
            });
        }

        state.spaces = resolved;
        state.started = true;
        info!(user = %user_id, scheduled, warnings = warnings.len(), "User started");

        Ok(StartReport {
            user_id: user_id.to_string(),
            scheduled,
            already_started: false,
            warnings,
        })
    }

    /// Destroy every target of a user, cancelling all timers. The stored
    /// configuration is kept, so a later `start` recreates the schedule.
    pub async fn stop(&self, user_id: &str) -> SchedulerResult<StopReport> {
        let slot = self.user_slot(user_id).await?;
        let mut state = slot.lock().await;

        let stopped = self.destroy_user_targets(user_id).await;
        state.started = false;
        state.spaces.clear();
        info!(user = %user_id, stopped, "User stopped");

        Ok(StopReport {
            user_id: user_id.to_string(),
            stopped,
        })
    }

    /// Fire every current target of a user exactly once, outside the
    /// schedule. Timers are not touched; targets with an attempt already
    /// in flight are skipped, same as a regular tick.
    pub async fn run_once(&self, user_id: &str) -> SchedulerResult<RunOnceReport> {
        let slot = self.user_slot(user_id).await?;
        let state = slot.lock().await;

        let targets = self.registry.list(Some(user_id)).await;
        let mut fired = 0;
        let mut skipped = 0;

        for (target, generation) in targets {
            if fire_target(
                &self.registry,
                &self.status,
                &state.client,
                &self.retry,
                &target,
                generation,
            )
            .await
            {
                fired += 1;
            } else {
                skipped += 1;
            }
        }

        info!(user = %user_id, fired, skipped, "Manual run complete");
        Ok(RunOnceReport {
            user_id: user_id.to_string(),
            fired,
            skipped,
        })
    }

    /// Immutable copy of current status records, optionally for one user
    pub async fn status_snapshot(&self, user_id: Option<&str>) -> Vec<StatusRecord> {
        self.status.snapshot(user_id).await
    }

    /// Phase counts, globally and per user
    pub async fn aggregate(&self) -> AggregateStatus {
        self.status.aggregate().await
    }

    /// Configuration view of one user, or `None` when unconfigured
    pub async fn user_view(&self, user_id: &str) -> Option<UserView> {
        let slot = {
            let users = self.users.lock().await;
            users.get(user_id).map(Arc::clone)
        }?;
        let state = slot.lock().await;

        Some(UserView {
            user_id: user_id.to_string(),
            base_url: state.config.base_url.clone(),
            api_key: state.config.masked_api_key(),
            started: state.started,
            spaces: state.config.spaces.clone(),
            target_count: self.registry.list(Some(user_id)).await.len(),
        })
    }

    /// IDs of all configured users
    pub async fn user_ids(&self) -> Vec<String> {
        let users = self.users.lock().await;
        let mut ids: Vec<String> = users.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Total registered targets across all users
    pub async fn target_count(&self) -> usize {
        self.registry.len().await
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Look up a user slot, or fail with `UnknownUser`
    pub(crate) async fn user_slot(
        &self,
        user_id: &str,
    ) -> SchedulerResult<Arc<Mutex<UserState>>> {
        let users = self.users.lock().await;
        users
            .get(user_id)
            .map(Arc::clone)
            .ok_or_else(|| SchedulerError::UnknownUser(user_id.to_string()))
    }

    /// Snapshot of all user slots, for the discovery pass
    pub(crate) async fn user_slots(&self) -> Vec<(String, Arc<Mutex<UserState>>)> {
        let users = self.users.lock().await;
        users
            .iter()
            .map(|(id, slot)| (id.clone(), Arc::clone(slot)))
            .collect()
    }

    async fn resolve_space_id(
        &self,
        client: &Arc<dyn CrawlApi>,
        config: &SpaceConfig,
    ) -> Result<String, ClientError> {
        if let Some(id) = &config.space_id {
            return Ok(id.clone());
        }
        // validated configs always carry an ID or a name
        let name = config.space_name.as_deref().unwrap_or_default();
        let space = client.find_space_by_name(name).await?;
        debug!(space = %space.id, name = %name, "Resolved space name");
        Ok(space.id)
    }

    /// Register a target, create its status record, and start its timer.
    /// Returns false when the target already existed (nothing changes).
    pub(crate) async fn schedule_target(
        &self,
        client: Arc<dyn CrawlApi>,
        target: Target,
    ) -> bool {
        let Some(generation) = self.registry.register(target.clone()).await else {
            return false;
        };
        self.status
            .insert(&target.id, generation, &target.site_name)
            .await;

        debug!(
            target = %target.id,
            site = %target.site_name,
            interval_secs = target.interval.as_secs(),
            "Scheduled target"
        );

        let handle = self.spawn_timer(client, target.clone(), generation);
        self.registry.attach_timer(&target.id, handle).await;
        true
    }

    /// The per-target timer task: fixed-rate ticks, first fire after one
    /// full interval. A missed tick (process stall) is skipped rather than
    /// bursted, preserving the cadence.
    fn spawn_timer(
        &self,
        client: Arc<dyn CrawlApi>,
        target: Target,
        generation: u64,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        let status = Arc::clone(&self.status);
        let retry = self.retry.clone();

        tokio::spawn(async move {
            let period = target.interval;
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                fire_target(&registry, &status, &client, &retry, &target, generation).await;
            }
        })
    }

    /// Unregister all of a user's targets and drop their status records
    async fn destroy_user_targets(&self, user_id: &str) -> usize {
        let removed = self.registry.unregister_user(user_id).await;
        for id in &removed {
            self.status.remove(id).await;
        }
        removed.len()
    }
}

/// Fire one target: claim the Running phase, then run the trigger in a
/// detached task so neither the timer tick nor a control call blocks on
/// the network. Returns false when the cycle was skipped because an
/// attempt is still in flight (or the target is gone).
async fn fire_target(
    registry: &Arc<TargetRegistry>,
    status: &Arc<StatusRegistry>,
    client: &Arc<dyn CrawlApi>,
    retry: &RetryPolicy,
    target: &Target,
    generation: u64,
) -> bool {
    if !status.begin_attempt(&target.id, generation).await {
        debug!(target = %target.id, "Previous attempt still in flight, skipping this cycle");
        return false;
    }

    let registry = Arc::clone(registry);
    let status = Arc::clone(status);
    let client = Arc::clone(client);
    let retry = retry.clone();
    let target = target.clone();

    tokio::spawn(async move {
        let outcome =
            trigger_with_retry(client.as_ref(), &retry, &target.id.space_id, &target.id.selector)
                .await;

        // the target may have been stopped (or recreated) while the call
        // was in flight; its result is then discarded
        if registry.generation(&target.id).await != Some(generation) {
            debug!(target = %target.id, "Target destroyed mid-attempt, discarding result");
            return;
        }

        match &outcome {
            Outcome::Success {
                already_queued: true,
                ..
            } => {
                info!(target = %target.id, site = %target.site_name,
                      "Crawl already queued remotely");
            }
            Outcome::Success { run_id, retries, .. } => {
                info!(target = %target.id, site = %target.site_name,
                      run_id = run_id.as_deref().unwrap_or("-"), retries,
                      "Crawl triggered");
            }
            Outcome::Failed { error, retries } => {
                warn!(target = %target.id, site = %target.site_name, retries,
                      error = %error, "Crawl trigger failed");
            }
        }

        status.complete_attempt(&target.id, generation, &outcome).await;
    });

    true
}

/// Pick the websites a space configuration selects. Crawl-all and
/// empty-filter spaces take everything; otherwise the filter is matched
/// against IDs, names, and URLs.
fn select_websites(config: &SpaceConfig, websites: Vec<Website>) -> Vec<Website> {
    if config.crawl_all_space_websites || config.website_filter.is_empty() {
        return websites;
    }

    websites
        .into_iter()
        .filter(|site| {
            config
                .website_filter
                .iter()
                .any(|entry| website_matches_filter(site, entry))
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
