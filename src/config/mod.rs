//! Configuration management for the crawl scheduler
//!
//! This module handles the users file (who to crawl for, against which
//! remote API, and on what cadence) plus the environment-level tunables
//! for the discovery and summary loops.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Expected prefix of a remote API key. Only a superficial check; the
/// remote service is the authority on key validity.
pub const API_KEY_PREFIX: &str = "inp_";

/// Default crawl interval per space, in minutes
pub const DEFAULT_SCHEDULE_MINUTES: u64 = 5;

/// Top-level structure of the users file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsersFile {
    /// All configured users
    #[serde(default)]
    pub users: Vec<ConfiguredUser>,
}

/// One user entry in the users file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfiguredUser {
    /// User identifier (also the path parameter on the control surface)
    pub user_id: String,

    #[serde(flatten)]
    pub config: UserConfig,
}

/// Per-user configuration: credentials, endpoint, and spaces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    /// Remote API key (expected to start with [`API_KEY_PREFIX`])
    pub api_key: String,

    /// Base URL of the remote crawl API
    pub base_url: String,

    /// Spaces this user schedules crawls for
    #[serde(default)]
    pub spaces: Vec<SpaceConfig>,
}

/// Per-space scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceConfig {
    /// Space identifier, if known up front
    #[serde(default)]
    pub space_id: Option<String>,

    /// Space name, resolved to an ID at start time when no ID is given
    #[serde(default)]
    pub space_name: Option<String>,

    /// How often to trigger a crawl for each website in the space
    #[serde(default = "default_schedule_minutes")]
    pub schedule_minutes: u64,

    /// Optional explicit website filter (IDs, names, or URLs)
    #[serde(default)]
    pub website_filter: Vec<String>,

    /// Crawl every website currently in the space
    #[serde(default)]
    pub crawl_all_space_websites: bool,
}

fn default_schedule_minutes() -> u64 {
    DEFAULT_SCHEDULE_MINUTES
}

impl UserConfig {
    /// Validate credentials and space definitions
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.api_key.starts_with(API_KEY_PREFIX) {
            return Err(format!("API key must start with '{API_KEY_PREFIX}'"));
        }
        if self.base_url.trim().is_empty() {
            return Err("base_url must not be empty".to_string());
        }
        for (i, space) in self.spaces.iter().enumerate() {
            space
                .validate()
                .map_err(|e| format!("space #{}: {e}", i + 1))?;
        }
        Ok(())
    }

    /// API key partially masked for logs and status responses. Always
    /// masks: short keys collapse to a placeholder rather than leaking.
    pub fn masked_api_key(&self) -> String {
        // char-based, keys are not guaranteed to be ASCII
        let chars: Vec<char> = self.api_key.chars().collect();
        if chars.len() <= 8 {
            return "***".to_string();
        }
        let head: String = chars[..5].iter().collect();
        let tail: String = chars[chars.len() - 3..].iter().collect();
        format!("{head}...{tail}")
    }
}

impl SpaceConfig {
    /// Validate that the space is addressable and the interval sane
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.space_id.is_none() && self.space_name.is_none() {
            return Err("either space_id or space_name must be provided".to_string());
        }
        if self.schedule_minutes == 0 {
            return Err("schedule_minutes must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Crawl interval as a Duration
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.schedule_minutes.saturating_mul(60))
    }

    /// Whether the Discovery Loop should watch this space for new websites.
    /// True for crawl-all spaces and for spaces with no explicit filter
    /// (an empty filter means "everything, including future websites").
    #[must_use]
    pub fn tracks_new_websites(&self) -> bool {
        self.crawl_all_space_websites || self.website_filter.is_empty()
    }

    /// Label used in logs when the space ID is not resolved yet
    pub fn label(&self) -> &str {
        self.space_name
            .as_deref()
            .or(self.space_id.as_deref())
            .unwrap_or("<unnamed space>")
    }
}

impl UsersFile {
    /// Load the users file from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read users file: {}", path.display()))?;

        let file: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse users file: {}", path.display()))?;

        Ok(file)
    }
}

/// Normalize a website identifier (ID, name, or URL) for filter matching:
/// lowercase, trimmed, no trailing slash, no query or fragment.
pub fn normalize_identifier(raw: &str) -> String {
    let mut s = raw.trim().to_lowercase();
    if let Some(pos) = s.find('#') {
        s.truncate(pos);
    }
    if let Some(pos) = s.find('?') {
        s.truncate(pos);
    }
    s.trim_end_matches('/').to_string()
}

// ============================================================================
// Engine Settings
// ============================================================================

/// Environment-level tunables for the background loops
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// How often the Discovery Loop re-lists space memberships.
    /// `None` disables discovery entirely.
    pub discovery_interval: Option<Duration>,

    /// How often the aggregated status summary is logged.
    /// `None` disables the summary task.
    pub summary_interval: Option<Duration>,

    /// Timeout applied to each individual remote API request
    pub request_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            discovery_interval: Some(Duration::from_secs(60 * 60)),
            summary_interval: Some(Duration::from_secs(5 * 60)),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineSettings {
    /// Read tunables from environment variables, falling back to defaults.
    /// An interval of `0` minutes disables the corresponding loop.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let discovery_interval = match read_minutes("WEBSITE_REFRESH_INTERVAL") {
            Some(0) => None,
            Some(mins) => Some(Duration::from_secs(mins * 60)),
            None => defaults.discovery_interval,
        };

        let summary_interval = match read_minutes("STATUS_SUMMARY_INTERVAL") {
            Some(0) => None,
            Some(mins) => Some(Duration::from_secs(mins * 60)),
            None => defaults.summary_interval,
        };

        Self {
            discovery_interval,
            summary_interval,
            request_timeout: defaults.request_timeout,
        }
    }
}

fn read_minutes(var: &str) -> Option<u64> {
    std::env::var(var).ok().and_then(|v| v.parse::<u64>().ok())
}
