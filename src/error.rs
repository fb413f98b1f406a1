//! Error types for stemsep
//!
//! This module provides error handling for the library, including:
//! - The main [`Error`] enum covering every failure mode of the pipeline
//! - The [`ErrorKind`] taxonomy used by the retry policy and batch reports
//! - [`ErrorReport`] snapshots recorded into terminal job states

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for stemsep operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for stemsep
///
/// Every failure in the pipeline is expressed as one of these variants. The
/// job state machine captures them into its own state rather than letting
/// them propagate past the scheduler.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "api.api_key")
        key: Option<String>,
    },

    /// Credential rejected by the remote service (401/403)
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Request rejected as malformed or unsupported (400/404/422)
    #[error("validation error: {0}")]
    Validation(String),

    /// Service-side rate or quota limit reached (429)
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Remote service returned a 5xx response
    #[error("service unavailable (HTTP {status}): {message}")]
    ServiceUnavailable {
        /// HTTP status code returned by the service
        status: u16,
        /// Response body (truncated)
        message: String,
    },

    /// Network-level failure (connection, timeout, protocol)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The remote service reported the separation task itself as failed
    #[error("remote task failed: {0}")]
    RemoteTaskFailed(String),

    /// Polling exceeded the per-job overall timeout
    #[error("polling timed out after {}s", .elapsed.as_secs())]
    PollTimeout {
        /// Total time spent polling before giving up
        elapsed: Duration,
    },

    /// Local filesystem failure while reading input or writing output
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote response was well-formed HTTP but missing expected fields
    #[error("unexpected response from service: {0}")]
    UnexpectedResponse(String),

    /// Job observed a cancellation request at a checkpoint
    #[error("cancelled")]
    Cancelled,
}

impl Error {
    /// Classify this error into its machine-readable kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config { .. } => ErrorKind::Config,
            Error::Auth(_) => ErrorKind::Auth,
            Error::Validation(_) => ErrorKind::Validation,
            Error::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
            Error::ServiceUnavailable { .. } | Error::Network(_) => ErrorKind::TransientNetwork,
            Error::RemoteTaskFailed(_) => ErrorKind::RemoteTaskFailed,
            Error::PollTimeout { .. } => ErrorKind::PollTimeout,
            Error::Io(_) => ErrorKind::Io,
            Error::Serialization(_) | Error::UnexpectedResponse(_) => ErrorKind::UnexpectedResponse,
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Machine-readable error classification
///
/// Stable vocabulary used in job states, batch reports, and events. Unlike
/// [`Error`] this type is cheap to copy and serializable, so it survives into
/// report snapshots after the originating error has been consumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Invalid library configuration
    Config,
    /// Invalid or expired credential
    Auth,
    /// Malformed or unsupported request
    Validation,
    /// Service-side quota or rate limit
    QuotaExceeded,
    /// Transient network or 5xx failure
    TransientNetwork,
    /// The remote service gave up on the task
    RemoteTaskFailed,
    /// Per-job polling budget exhausted
    PollTimeout,
    /// Local filesystem failure
    Io,
    /// Response did not match the documented service contract
    UnexpectedResponse,
    /// Job was cancelled
    Cancelled,
}

/// Error snapshot recorded into a terminal job state
///
/// Carries the kind and rendered message of the error that terminated a job,
/// without holding the (non-cloneable) source error itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Machine-readable error classification
    pub kind: ErrorKind,
    /// Human-readable error message
    pub message: String,
}

impl From<&Error> for ErrorReport {
    fn from(error: &Error) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}
