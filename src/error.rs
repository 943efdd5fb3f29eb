//! Error types for the voxrelay bot

use std::time::Duration;

use thiserror::Error;

/// Result type alias for voxrelay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while relaying messages
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Chat platform error (Telegram API rejected a request, bad payload)
    #[error("channel error: {0}")]
    Channel(String),

    /// A single remote call to the AI provider failed
    #[error("remote error: {0}")]
    Remote(String),

    /// The provider reported a terminal failure for a submitted job
    #[error("remote job failed: {0}")]
    JobFailed(String),

    /// A single attempt exceeded its time budget
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation that timed out
        operation: &'static str,
        /// Budget that elapsed
        after: Duration,
    },

    /// All attempts of a remote operation failed
    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    RemoteOperationFailed {
        /// Operation name (`transcribe`, `complete_turn`, ...)
        operation: &'static str,
        /// Number of attempts performed
        attempts: u32,
        /// Error of the last attempt
        #[source]
        source: Box<Error>,
    },

    /// Input rejected before any remote call was made
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The pipeline no longer accepts tasks
    #[error("pipeline is shut down")]
    PipelineClosed,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error ends in a job the provider reported as failed
    ///
    /// Looks through `RemoteOperationFailed` at the last attempt's error, so
    /// callers can tell a failed job apart from transient errors that simply
    /// exhausted the retry budget.
    #[must_use]
    pub fn is_job_failure(&self) -> bool {
        match self {
            Self::JobFailed(_) => true,
            Self::RemoteOperationFailed { source, .. } => source.is_job_failure(),
            _ => false,
        }
    }

    /// Whether the retry budget of a remote operation was used up
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::RemoteOperationFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_failure_seen_through_exhausted_retries() {
        let err = Error::RemoteOperationFailed {
            operation: "complete_turn",
            attempts: 3,
            source: Box::new(Error::JobFailed("server_error".to_string())),
        };
        assert!(err.is_job_failure());
        assert!(err.is_exhausted());
    }

    #[test]
    fn transient_failure_is_not_job_failure() {
        let err = Error::RemoteOperationFailed {
            operation: "synthesize",
            attempts: 3,
            source: Box::new(Error::Remote("502 Bad Gateway".to_string())),
        };
        assert!(!err.is_job_failure());
        assert!(!Error::Remote("x".to_string()).is_exhausted());
    }

    #[test]
    fn timeout_message_names_operation() {
        let err = Error::Timeout {
            operation: "download",
            after: Duration::from_secs(120),
        };
        assert_eq!(err.to_string(), "download timed out after 120s");
    }
}
