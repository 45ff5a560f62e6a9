//! Inbox configuration.

use std::path::Path;
use std::time::Duration;

use msgcenter_api::{ApiConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::sync::RetryPolicy;
use crate::{Error, Result};

/// Default upper bound for any single remote call made by the coordinator.
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(60);

/// Default time to wait for an identity to be bound.
pub const DEFAULT_IDENTITY_TIMEOUT: Duration = Duration::from_secs(10);

/// Inbox configuration, loadable from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxConfig {
    /// Mailbox service base URL.
    pub base_url: Url,
    /// HTTP request timeout.
    #[serde(default = "default_request_timeout", with = "duration_millis")]
    pub request_timeout: Duration,
    /// HTTP connect timeout.
    #[serde(default = "default_connect_timeout", with = "duration_millis")]
    pub connect_timeout: Duration,
    /// Upper bound for each remote call the coordinator makes.
    #[serde(default = "default_sync_timeout", with = "duration_millis")]
    pub sync_timeout: Duration,
    /// How long a sync waits for an identity to be bound.
    #[serde(default = "default_identity_timeout", with = "duration_millis")]
    pub identity_timeout: Duration,
    /// Backoff policy for [`refresh_with_retry`](crate::Inbox::refresh_with_retry).
    #[serde(default)]
    pub retry: RetryPolicy,
}

const fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

const fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

const fn default_sync_timeout() -> Duration {
    DEFAULT_SYNC_TIMEOUT
}

const fn default_identity_timeout() -> Duration {
    DEFAULT_IDENTITY_TIMEOUT
}

impl InboxConfig {
    /// Creates a configuration with default timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not a valid URL.
    pub fn new(base_url: &str) -> Result<Self> {
        let url = Url::parse(base_url).map_err(|e| Error::Config(format!("{base_url}: {e}")))?;
        Ok(Self::builder(url).build())
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(base_url: Url) -> InboxConfigBuilder {
        InboxConfigBuilder::new(base_url)
    }

    /// Derives the HTTP client configuration.
    #[must_use]
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig::builder(self.base_url.clone())
            .request_timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .build()
    }

    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Saves the configuration as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, contents).await?;
        tracing::info!("Config saved to {:?}", path);
        Ok(())
    }
}

/// Builder for [`InboxConfig`].
#[derive(Debug, Clone)]
pub struct InboxConfigBuilder {
    config: InboxConfig,
}

impl InboxConfigBuilder {
    /// Creates a builder with default timeouts.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            config: InboxConfig {
                base_url,
                request_timeout: DEFAULT_REQUEST_TIMEOUT,
                connect_timeout: DEFAULT_CONNECT_TIMEOUT,
                sync_timeout: DEFAULT_SYNC_TIMEOUT,
                identity_timeout: DEFAULT_IDENTITY_TIMEOUT,
                retry: RetryPolicy::default(),
            },
        }
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Sets the HTTP connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Sets the per-call sync timeout.
    #[must_use]
    pub const fn sync_timeout(mut self, timeout: Duration) -> Self {
        self.config.sync_timeout = timeout;
        self
    }

    /// Sets how long a sync waits for an identity.
    #[must_use]
    pub const fn identity_timeout(mut self, timeout: Duration) -> Self {
        self.config.identity_timeout = timeout;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> InboxConfig {
        self.config
    }
}

/// Serde helpers storing a `Duration` as whole milliseconds.
pub(crate) mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::trivially_copy_pass_by_ref)] // Required by serde with= signature
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
