//! Retry wrapper for trigger-crawl calls
//!
//! One logical trigger is a bounded sequence of calls with exponential
//! backoff and jitter between them. Only transient failures are retried;
//! terminal remote failures end the attempt immediately. The whole
//! sequence also runs under a wall-clock budget so a flapping remote
//! cannot stall a target for longer than one budget span.

use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{ClientError, CrawlApi, TriggerResponse};
use crate::scheduler::target::WebsiteSelector;

/// Retry configuration for one logical trigger
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of calls made in total (first call + retries)
    pub max_attempts: u32,

    /// Delay before the first retry; doubles on each further retry
    pub base_delay: Duration,

    /// Cap on the backoff delay
    pub max_delay: Duration,

    /// Wall-clock budget for the whole sequence; exceeding it fails the
    /// attempt even when retries remain
    pub total_budget: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            total_budget: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before the `retry`-th retry (1-based), without jitter:
    /// base * 2^(retry-1), capped at `max_delay`.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let exponent = (retry - 1).min(31);
        let delay_ms = (self.base_delay.as_millis() as u64).saturating_mul(1u64 << exponent);
        Duration::from_millis(delay_ms).min(self.max_delay)
    }

    /// Apply jitter: uniform in [delay/2, delay], so simultaneous retries
    /// across many targets spread out after a shared outage.
    fn jittered(&self, delay: Duration) -> Duration {
        let ms = delay.as_millis() as u64;
        if ms == 0 {
            return Duration::ZERO;
        }
        let jittered = rand::thread_rng().gen_range(ms / 2..=ms);
        Duration::from_millis(jittered)
    }
}

/// Terminal result of one logical trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The remote accepted the trigger (or already had one queued)
    Success {
        run_id: Option<String>,
        already_queued: bool,
        retries: u32,
    },

    /// The trigger did not go through
    Failed { error: String, retries: u32 },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Run one logical trigger against the remote API with retry.
///
/// Every retry is logged at debug level; the caller is expected to log
/// the terminal outcome at its own level.
pub async fn trigger_with_retry(
    api: &dyn CrawlApi,
    policy: &RetryPolicy,
    space_id: &str,
    selector: &WebsiteSelector,
) -> Outcome {
    let started = Instant::now();
    let mut calls_made: u32 = 0;

    loop {
        calls_made += 1;
        let retries = calls_made - 1;

        match api.trigger_crawl(space_id, selector).await {
            Ok(TriggerResponse::Started { run_id }) => {
                if retries > 0 {
                    debug!(retries, "Trigger succeeded after retry");
                }
                return Outcome::Success {
                    run_id,
                    already_queued: false,
                    retries,
                };
            }
            Ok(TriggerResponse::AlreadyQueued) => {
                return Outcome::Success {
                    run_id: None,
                    already_queued: true,
                    retries,
                };
            }
            Err(e) if !e.is_transient() => {
                warn!(error = %e, "Terminal trigger failure, not retrying");
                return Outcome::Failed {
                    error: e.to_string(),
                    retries,
                };
            }
            Err(e) => {
                if calls_made >= policy.max_attempts {
                    return Outcome::Failed {
                        error: format!("retries exhausted: {e}"),
                        retries,
                    };
                }

                let delay = policy.jittered(policy.backoff_delay(calls_made));
                if started.elapsed() + delay >= policy.total_budget {
                    return Outcome::Failed {
                        error: format!("trigger budget exceeded: {e}"),
                        retries,
                    };
                }

                debug!(
                    attempt = calls_made,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient trigger failure, retrying after delay"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
