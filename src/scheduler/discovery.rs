//! Discovery loop: picks up websites added to a space after start
//!
//! Runs at a coarse global interval, far slower than any crawl schedule.
//! For every started user it re-lists the websites of each space that
//! tracks new websites (crawl-all spaces and spaces with no explicit
//! filter) and registers targets for website IDs not seen before.
//! Strictly add-only: websites that vanish from a listing keep their
//! targets, so a transient listing gap never drops schedule state.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::engine::Engine;
use super::target::{Target, TargetId};

impl Engine {
    /// One full discovery pass over every started user. Each user is
    /// processed under their control-surface lock, so a concurrent stop
    /// or reconfiguration waits for (or is waited on by) this pass.
    pub async fn run_discovery_pass(&self) {
        for (user_id, slot) in self.user_slots().await {
            let state = slot.lock().await;
            if !state.started {
                continue;
            }

            for space in state.spaces.clone() {
                if !space.config.tracks_new_websites() {
                    continue;
                }

                let websites = match state.client.list_space_websites(&space.space_id).await {
                    Ok(websites) => websites,
                    Err(e) => {
                        warn!(user = %user_id, space = %space.space_id, error = %e,
                              "Website discovery listing failed");
                        continue;
                    }
                };

                let known = self
                    .target_registry()
                    .website_ids(&user_id, &space.space_id)
                    .await;

                let mut added = 0;
                for website in websites {
                    if known.contains(&website.id) {
                        continue;
                    }
                    let target = Target {
                        id: TargetId::website(&user_id, &space.space_id, &website.id),
                        site_name: website.display_name().to_string(),
                        interval: space.config.interval(),
                    };
                    if self.schedule_target(Arc::clone(&state.client), target).await {
                        added += 1;
                    }
                }

                if added > 0 {
                    info!(user = %user_id, space = %space.space_id, added,
                          "Discovered new websites");
                } else {
                    debug!(user = %user_id, space = %space.space_id,
                           "Discovery pass found no new websites");
                }
            }
        }
    }
}

/// Spawn the periodic discovery task. Returns `None` when discovery is
/// disabled by configuration.
pub fn spawn_discovery(engine: Arc<Engine>) -> Option<JoinHandle<()>> {
    let period = engine.settings().discovery_interval?;
    info!(interval_secs = period.as_secs(), "Website discovery enabled");

    Some(tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            engine.run_discovery_pass().await;
        }
    }))
}

// ============================================================================
// Tests
// ============================================================================
