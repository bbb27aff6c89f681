//! Schedulable target definitions
//!
//! A target is the unit the scheduler owns a timer for: one (user, space,
//! website-or-whole-space) triple.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// What a target's trigger call asks the remote service to index
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebsiteSelector {
    /// One specific website in the space
    Website(String),

    /// The whole space in a single trigger
    Space,
}

impl fmt::Display for WebsiteSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Website(id) => write!(f, "{id}"),
            Self::Space => write!(f, "*"),
        }
    }
}

/// Unique key of a schedulable target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetId {
    pub user_id: String,
    pub space_id: String,
    pub selector: WebsiteSelector,
}

impl TargetId {
    pub fn website(user_id: &str, space_id: &str, website_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            space_id: space_id.to_string(),
            selector: WebsiteSelector::Website(website_id.to_string()),
        }
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.user_id, self.space_id, self.selector)
    }
}

/// A registered target: key, display name, and crawl cadence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,

    /// Human-readable website (or space) name for logs and status output
    pub site_name: String,

    /// Fixed-rate crawl interval, inherited from the space configuration
    pub interval: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_id_display() {
        let id = TargetId::website("alice", "s-1", "w-42");
        assert_eq!(id.to_string(), "alice/s-1/w-42");

        let whole_space = TargetId {
            user_id: "alice".to_string(),
            space_id: "s-1".to_string(),
            selector: WebsiteSelector::Space,
        };
        assert_eq!(whole_space.to_string(), "alice/s-1/*");
    }

    #[test]
    fn test_target_id_equality() {
        let a = TargetId::website("alice", "s-1", "w-1");
        let b = TargetId::website("alice", "s-1", "w-1");
        let c = TargetId::website("alice", "s-1", "w-2");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
