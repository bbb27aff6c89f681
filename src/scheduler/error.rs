//! Error types for the scheduler module

use thiserror::Error;

use crate::client::ClientError;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Errors surfaced by the control-surface operations
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Operation addressed a user with no stored configuration
    #[error("user '{0}' is not configured")]
    UnknownUser(String),

    /// Supplied configuration failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The remote API refused or failed a setup call
    #[error(transparent)]
    Client(#[from] ClientError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_user_message() {
        let err = SchedulerError::UnknownUser("alice".to_string());
        assert!(err.to_string().contains("alice"));
    }

    #[test]
    fn test_client_error_passthrough() {
        let err: SchedulerError = ClientError::SpaceNotFound("docs".to_string()).into();
        assert!(err.to_string().contains("docs"));
    }
}
