//! Settings of the built-in transport.

use std::time::Duration;

/// Redirects followed before [`Error::TooManyRedirects`](crate::Error::TooManyRedirects).
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Settings of the built-in hyper transport.
///
/// A zero `timeout` or `connect_timeout` means unbounded. Per-call deadlines
/// are set with [`opt::timeout`](crate::opt::timeout) instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Bound on one call through the transport, redirect hops included.
    pub timeout: Duration,
    /// Bound on dialing a single connection.
    pub connect_timeout: Duration,
    /// Idle pooled connections kept per host.
    pub pool_idle_per_host: usize,
    /// How long a pooled connection may stay idle.
    pub pool_idle_timeout: Duration,
    /// Resend requests canceled because a pooled connection closed under them.
    pub retry_canceled_requests: bool,
    /// Limit of the default [`RedirectPolicy`](crate::transport::RedirectPolicy).
    pub max_redirects: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::ZERO,
            connect_timeout: Duration::from_secs(10),
            pool_idle_per_host: 32,
            pool_idle_timeout: Duration::from_secs(90),
            retry_canceled_requests: true,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

impl ClientConfig {
    /// Starts from the defaults.
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the per-call transport timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the maximum idle connections per host.
    #[must_use]
    pub const fn pool_idle_per_host(mut self, count: usize) -> Self {
        self.config.pool_idle_per_host = count;
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub const fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Set whether canceled pooled requests are resent.
    #[must_use]
    pub const fn retry_canceled_requests(mut self, retry: bool) -> Self {
        self.config.retry_canceled_requests = retry;
        self
    }

    /// Set the redirect limit of the default redirect policy.
    #[must_use]
    pub const fn max_redirects(mut self, max: usize) -> Self {
        self.config.max_redirects = max;
        self
    }

    /// Finishes the configuration.
    #[must_use]
    pub fn build(self) -> ClientConfig {
        self.config
    }
}
