//! Remote crawl API client
//!
//! This module talks to the remote knowledge-base service: space lookup,
//! website listing per space, and the trigger-crawl call itself. The
//! [`CrawlApi`] trait is the seam the scheduler engine and the tests use;
//! [`ApiClient`] is the reqwest-backed implementation.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::normalize_identifier;
use crate::scheduler::target::WebsiteSelector;

pub mod retry;

pub use retry::{trigger_with_retry, Outcome, RetryPolicy};

/// Remote error code meaning "this website already has a crawl queued"
const ERROR_CODE_ALREADY_QUEUED: u32 = 9021;

// ============================================================================
// Remote Resource Types
// ============================================================================

/// A space on the remote service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Space {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// A website registered in a space
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Website {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl Website {
    /// Human-readable label, falling back to the ID
    pub fn display_name(&self) -> &str {
        self.name.as_deref().or(self.url.as_deref()).unwrap_or(&self.id)
    }
}

/// Result of one trigger-crawl call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerResponse {
    /// The remote service accepted the trigger and started a run
    Started { run_id: Option<String> },

    /// A crawl for this target is already queued or running remotely
    AlreadyQueued,
}

// ============================================================================
// Client Errors
// ============================================================================

/// Errors from the remote crawl API
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Client could not be constructed
    #[error("client initialization failed: {0}")]
    Init(String),

    /// Connection-level failure
    #[error("network error: {0}")]
    Network(String),

    /// The request exceeded its timeout
    #[error("request timed out")]
    Timeout,

    /// Remote returned a non-success status
    #[error("remote API error {status}: {message}")]
    Http { status: u16, message: String },

    /// Response body could not be decoded
    #[error("failed to decode remote response: {0}")]
    Decode(String),

    /// No space with the configured name exists
    #[error("no space found named '{0}'")]
    SpaceNotFound(String),
}

impl ClientError {
    /// Whether the failure is worth retrying. Network faults, timeouts,
    /// 5xx and 429 responses are transient; other 4xx responses (bad
    /// credentials, missing resources) are terminal.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::Init(_) | Self::Decode(_) | Self::SpaceNotFound(_) => false,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

// ============================================================================
// CrawlApi Trait
// ============================================================================

/// Operations the scheduler needs from the remote service.
///
/// Implemented by [`ApiClient`] for production and by in-memory fakes in
/// the scheduler tests.
#[async_trait]
pub trait CrawlApi: Send + Sync {
    /// List all spaces the credential can access
    async fn list_spaces(&self) -> Result<Vec<Space>, ClientError>;

    /// Fetch one space by ID
    async fn get_space(&self, space_id: &str) -> Result<Space, ClientError>;

    /// List the websites currently registered in a space
    async fn list_space_websites(&self, space_id: &str) -> Result<Vec<Website>, ClientError>;

    /// Ask the remote service to start indexing the selected website
    /// (or the whole space)
    async fn trigger_crawl(
        &self,
        space_id: &str,
        selector: &WebsiteSelector,
    ) -> Result<TriggerResponse, ClientError>;

    /// Resolve a space by name: exact match first, then a forgiving match
    /// that treats underscores and hyphens as equivalent.
    async fn find_space_by_name(&self, space_name: &str) -> Result<Space, ClientError> {
        let wanted = space_name.trim().to_lowercase();
        let spaces = self.list_spaces().await?;

        for space in &spaces {
            let name = space.name.as_deref().unwrap_or("").trim().to_lowercase();
            if name == wanted {
                return Ok(space.clone());
            }
        }

        let wanted_fuzzy = wanted.replace('_', "-");
        for space in &spaces {
            let name = space.name.as_deref().unwrap_or("").trim().to_lowercase();
            if name.replace('_', "-") == wanted_fuzzy {
                tracing::debug!(space = %space.id, name = %space_name, "Matched space by fuzzy name");
                return Ok(space.clone());
            }
        }

        Err(ClientError::SpaceNotFound(space_name.to_string()))
    }
}

/// Check a website against one normalized filter entry. The filter matches
/// if it contains, or is contained in, the website's ID, name, or URL.
pub fn website_matches_filter(website: &Website, filter: &str) -> bool {
    let filter = normalize_identifier(filter);
    if filter.is_empty() {
        return false;
    }

    let identifiers = [
        normalize_identifier(&website.id),
        normalize_identifier(website.name.as_deref().unwrap_or("")),
        normalize_identifier(website.url.as_deref().unwrap_or("")),
    ];

    identifiers
        .iter()
        .any(|id| !id.is_empty() && (id.contains(&filter) || filter.contains(id.as_str())))
}

// ============================================================================
// ApiClient
// ============================================================================

/// reqwest-backed [`CrawlApi`] implementation
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

/// Paginated list wrapper used by the remote API
#[derive(Debug, Deserialize)]
struct ItemList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

/// Knowledge view of a space: websites grouped under their own list
#[derive(Debug, Deserialize)]
struct KnowledgeResponse {
    websites: ItemList<Website>,
}

/// Body of a started crawl run
#[derive(Debug, Deserialize)]
struct RunResponse {
    #[serde(default)]
    id: Option<String>,
}

/// Error body shape the remote service uses
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    intric_error_code: Option<u32>,
    #[serde(default)]
    detail: Option<String>,
}

impl ApiClient {
    /// Create a client for one user's credential and endpoint
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "api-key",
            HeaderValue::from_str(api_key).map_err(|e| ClientError::Init(e.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Init(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, ClientError> {
        let url = format!("{}{path}", self.base_url);
        let response = self.http.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(http_error(status, response.text().await.unwrap_or_default()));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }
}

fn http_error(status: StatusCode, body: String) -> ClientError {
    let detail = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.detail)
        .unwrap_or_else(|| {
            if body.is_empty() {
                "Unknown error".to_string()
            } else {
                body.chars().take(200).collect()
            }
        });

    ClientError::Http {
        status: status.as_u16(),
        message: detail,
    }
}

#[async_trait]
impl CrawlApi for ApiClient {
    async fn list_spaces(&self) -> Result<Vec<Space>, ClientError> {
        let list: ItemList<Space> = self.get_json("/spaces/").await?;
        Ok(list.items)
    }

    async fn get_space(&self, space_id: &str) -> Result<Space, ClientError> {
        self.get_json(&format!("/spaces/{space_id}/")).await
    }

    async fn list_space_websites(&self, space_id: &str) -> Result<Vec<Website>, ClientError> {
        let knowledge: KnowledgeResponse = self
            .get_json(&format!("/spaces/{space_id}/knowledge/"))
            .await?;
        Ok(knowledge.websites.items)
    }

    async fn trigger_crawl(
        &self,
        space_id: &str,
        selector: &WebsiteSelector,
    ) -> Result<TriggerResponse, ClientError> {
        let url = match selector {
            WebsiteSelector::Website(website_id) => {
                format!("{}/websites/{website_id}/run/", self.base_url)
            }
            WebsiteSelector::Space => format!("{}/spaces/{space_id}/run/", self.base_url),
        };

        let response = self.http.post(&url).send().await?;
        let status = response.status();

        if status.is_success() {
            let run = response
                .json::<RunResponse>()
                .await
                .map_err(|e| ClientError::Decode(e.to_string()))?;
            return Ok(TriggerResponse::Started { run_id: run.id });
        }

        let body = response.text().await.unwrap_or_default();

        // 429 with the dedicated error code means a crawl is already
        // queued remotely; that is not a failure of this trigger.
        if status == StatusCode::TOO_MANY_REQUESTS {
            let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or_default();
            if parsed.intric_error_code == Some(ERROR_CODE_ALREADY_QUEUED) {
                return Ok(TriggerResponse::AlreadyQueued);
            }
        }

        Err(http_error(status, body))
    }
}

// ============================================================================
// Tests
// ============================================================================
