//! Error types for mailbox API operations.

use std::time::Duration;

use reqwest::StatusCode;

/// Result type alias for mailbox API operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Mailbox API error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Credentials were refused by the service.
    #[error("Unauthorized (HTTP {status})")]
    Unauthorized {
        /// HTTP status code (401 or 403).
        status: u16,
    },

    /// The service refused the request permanently.
    #[error("Request rejected (HTTP {status}): {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, if any.
        body: String,
    },

    /// Server-side or network failure worth retrying later.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// The request did not complete in time.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Invalid client configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Coarse classification of an [`Error`], used to decide what to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Credentials are stale or invalid; refresh the identity before retrying.
    Unauthorized,
    /// Retryable with backoff.
    Transient,
    /// Permanent; drop the request from further retry.
    Rejected,
}

impl Error {
    /// Maps a non-success HTTP status to an error.
    #[must_use]
    pub fn from_status(status: StatusCode, body: impl Into<String>) -> Self {
        let code = status.as_u16();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Unauthorized { status: code },
            StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
                Self::Transient(format!("HTTP {code}"))
            }
            s if s.is_server_error() => Self::Transient(format!("HTTP {code}")),
            _ => Self::Rejected {
                status: code,
                body: body.into(),
            },
        }
    }

    /// Returns how the caller should treat this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::Rejected { .. } | Self::Url(_) | Self::InvalidConfig(_) => ErrorKind::Rejected,
            Self::Transient(_) | Self::Timeout(_) | Self::Http(_) | Self::Json(_) => {
                ErrorKind::Transient
            }
        }
    }
}
