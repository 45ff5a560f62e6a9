//! Error types for the core library.

use std::time::Duration;

use msgcenter_api::ErrorKind;
use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Mailbox API call failed.
    #[error("API error: {0}")]
    Api(#[from] msgcenter_api::Error),

    /// Credential storage error.
    #[error("Credential error: {0}")]
    Credential(#[from] crate::identity::credentials::CredentialError),

    /// A stored record could not be decoded.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// No identity was bound in time.
    #[error("No identity available after {0:?}")]
    IdentityUnavailable(Duration),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a sync attempt failed.
///
/// Cloneable so one outcome can be delivered to every coalesced caller and
/// to every observer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Credentials are stale; an identity refresh has been requested.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Network or server failure; retry with backoff.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// The service refused the request permanently.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Local storage failed; nothing was partially applied.
    #[error("Storage failure: {0}")]
    Storage(String),

    /// The bound identity changed while the attempt was in flight.
    #[error("Identity changed during sync")]
    IdentityChanged,
}

impl SyncError {
    /// Returns true if a fresh attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unauthorized(_) | Self::Transient(_))
    }

    /// Classifies an API error.
    #[must_use]
    pub fn from_api(error: &msgcenter_api::Error) -> Self {
        match error.kind() {
            ErrorKind::Unauthorized => Self::Unauthorized(error.to_string()),
            ErrorKind::Transient => Self::Transient(error.to_string()),
            ErrorKind::Rejected => Self::Rejected(error.to_string()),
        }
    }
}

impl From<Error> for SyncError {
    fn from(error: Error) -> Self {
        match error {
            Error::Api(e) => Self::from_api(&e),
            Error::IdentityUnavailable(_) => Self::Transient(error.to_string()),
            other => Self::Storage(other.to_string()),
        }
    }
}
