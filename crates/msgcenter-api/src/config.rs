//! HTTP client configuration.

use std::time::Duration;

use url::Url;

use crate::error::Result;

/// Default timeout for a whole request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for establishing a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Mailbox API client configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Service base URL; endpoints are resolved below it.
    pub base_url: Url,
    /// Timeout for a whole request, including reading the body.
    pub request_timeout: Duration,
    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,
    /// `User-Agent` header value.
    pub user_agent: String,
}

impl ApiConfig {
    /// Creates a configuration with default timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not a valid URL.
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self::builder(Url::parse(base_url)?).build())
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(base_url: Url) -> ApiConfigBuilder {
        ApiConfigBuilder::new(base_url)
    }
}

/// Builder for [`ApiConfig`].
#[derive(Debug, Clone)]
pub struct ApiConfigBuilder {
    base_url: Url,
    request_timeout: Duration,
    connect_timeout: Duration,
    user_agent: Option<String>,
}

impl ApiConfigBuilder {
    /// Creates a new builder for the given base URL.
    #[must_use]
    pub const fn new(base_url: Url) -> Self {
        Self {
            base_url,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            user_agent: None,
        }
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the `User-Agent` header.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ApiConfig {
        ApiConfig {
            base_url: self.base_url,
            request_timeout: self.request_timeout,
            connect_timeout: self.connect_timeout,
            user_agent: self.user_agent.unwrap_or_else(|| {
                concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string()
            }),
        }
    }
}
