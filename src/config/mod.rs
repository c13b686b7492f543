//! Configuration types for the marketplace HTTP client.
//!
//! # Overview
//!
//! The main types in this module are:
//!
//! - [`ClientConfig`]: Everything a pipeline needs to be assembled
//! - [`ClientConfigBuilder`]: A builder for constructing [`ClientConfig`] instances
//! - [`BaseUrl`]: A validated marketplace base URL
//! - [`MarketplaceTag`]: The marketplace a pipeline talks to
//! - [`OperationKey`]: The rate-limit bucket a request path belongs to
//!
//! # Example
//!
//! ```rust
//! use marketplace_http::{BaseUrl, ClientConfig, MarketplaceTag};
//!
//! let config = ClientConfig::builder()
//!     .base_url(BaseUrl::new("https://api.discogs.com").unwrap())
//!     .middleware(["logging", "rate_limiting", "retry"])
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.marketplace(), MarketplaceTag::Discogs);
//! ```

mod marketplace;
mod newtypes;

pub use marketplace::{MarketplaceTag, OperationKey};
pub use newtypes::BaseUrl;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::auth::AuthConfig;
use crate::error::ConfigError;
use crate::rate_limit::{RateLimitPolicy, RateLimiter};
use crate::retry::RetryPolicy;

/// Library version reported in the `User-Agent` header.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: f64 = 30.0;

/// Default redirect limit.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Configuration for one client pipeline.
///
/// # Thread Safety
///
/// `ClientConfig` is `Clone`, `Send`, and `Sync`. Cloning shares the
/// optional [`RateLimiter`] handle, nothing else.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    base_url: BaseUrl,
    marketplace: Option<MarketplaceTag>,
    middleware: Vec<String>,
    auth: Option<AuthConfig>,
    rate_limits: HashMap<OperationKey, RateLimitPolicy>,
    default_rate_limit: Option<RateLimitPolicy>,
    rate_limiter: Option<Arc<RateLimiter>>,
    retry: Option<RetryPolicy>,
    timeout: Duration,
    max_redirects: usize,
    user_agent_prefix: Option<String>,
    default_headers: HeaderMap,
}

impl ClientConfig {
    /// Creates a new builder for constructing a `ClientConfig`.
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Returns the base URL.
    #[must_use]
    pub const fn base_url(&self) -> &BaseUrl {
        &self.base_url
    }

    /// Returns the configured marketplace, or the one inferred from the
    /// base URL host.
    #[must_use]
    pub fn marketplace(&self) -> MarketplaceTag {
        self.marketplace
            .unwrap_or_else(|| MarketplaceTag::from_host(self.base_url.host()))
    }

    /// Returns the enabled middleware names in configured order.
    #[must_use]
    pub fn middleware(&self) -> &[String] {
        &self.middleware
    }

    /// Returns the credentials, if configured.
    #[must_use]
    pub const fn auth(&self) -> Option<&AuthConfig> {
        self.auth.as_ref()
    }

    /// Returns the retry policy: the explicit one or the marketplace preset.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
            .clone()
            .unwrap_or_else(|| RetryPolicy::for_marketplace(self.marketplace()))
    }

    /// Returns the rate limiter for a new pipeline.
    ///
    /// A shared limiter is returned as-is. Otherwise every call creates a
    /// fresh limiter from the configured policies.
    #[must_use]
    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        if let Some(shared) = &self.rate_limiter {
            return Arc::clone(shared);
        }

        let mut limiter = RateLimiter::new();
        for (operation, policy) in &self.rate_limits {
            limiter = limiter.with_policy(operation.clone(), *policy);
        }
        if let Some(policy) = self.default_rate_limit {
            limiter = limiter.with_default_policy(policy);
        }
        Arc::new(limiter)
    }

    /// Returns the per-attempt transport timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the redirect limit.
    #[must_use]
    pub const fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    /// Returns the user agent prefix, if configured.
    #[must_use]
    pub fn user_agent_prefix(&self) -> Option<&str> {
        self.user_agent_prefix.as_deref()
    }

    /// Returns the full `User-Agent` value sent with every request.
    #[must_use]
    pub fn user_agent(&self) -> String {
        let prefix = self
            .user_agent_prefix
            .as_deref()
            .map(|p| format!("{p} | "))
            .unwrap_or_default();
        let rust_version = env!("CARGO_PKG_RUST_VERSION");
        format!("{prefix}Marketplace HTTP Library v{SDK_VERSION} | Rust {rust_version}")
    }

    /// Returns the caller-supplied default headers.
    #[must_use]
    pub const fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }
}

// Verify ClientConfig is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<ClientConfig>();
};

/// Builder for constructing [`ClientConfig`] instances.
///
/// `base_url` is the only required field.
///
/// # Defaults
///
/// - `marketplace`: inferred from the base URL host
/// - `middleware`: none (requests go straight to the transport)
/// - `auth`: `None`
/// - rate limits: the marketplace defaults
/// - `retry`: the marketplace preset
/// - `timeout`: 30 seconds
/// - `max_redirects`: 10
///
/// # Example
///
/// ```rust
/// use marketplace_http::{BaseUrl, ClientConfig, OperationKey};
/// use marketplace_http::auth::{AuthConfig, OAuth1aCredentials};
/// use marketplace_http::rate_limit::RateLimitPolicy;
/// use std::time::Duration;
///
/// let config = ClientConfig::builder()
///     .base_url(BaseUrl::new("https://api.discogs.com").unwrap())
///     .middleware(["logging", "oauth_1a", "rate_limiting", "retry"])
///     .auth(AuthConfig::OAuth1a(OAuth1aCredentials::new("ck", "cs", "tk", "ts")))
///     .rate_limit(
///         OperationKey::new("search"),
///         RateLimitPolicy::sliding_window(25, Duration::from_secs(60)),
///     )
///     .timeout(10.0)
///     .user_agent_prefix("RecordShop/2.1")
///     .build()
///     .unwrap();
///
/// assert_eq!(config.timeout(), Duration::from_secs(10));
/// assert!(config.user_agent().starts_with("RecordShop/2.1 | "));
/// ```
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    base_url: Option<BaseUrl>,
    marketplace: Option<MarketplaceTag>,
    middleware: Vec<String>,
    auth: Option<AuthConfig>,
    rate_limits: HashMap<OperationKey, RateLimitPolicy>,
    default_rate_limit: Option<RateLimitPolicy>,
    rate_limiter: Option<Arc<RateLimiter>>,
    retry: Option<RetryPolicy>,
    timeout_secs: Option<f64>,
    max_redirects: Option<i32>,
    user_agent_prefix: Option<String>,
    headers: Vec<(String, String)>,
}

impl ClientConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL (required).
    #[must_use]
    pub fn base_url(mut self, base_url: BaseUrl) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Sets the marketplace instead of inferring it from the host.
    #[must_use]
    pub const fn marketplace(mut self, marketplace: MarketplaceTag) -> Self {
        self.marketplace = Some(marketplace);
        self
    }

    /// Sets the enabled middleware names. Order does not matter; layers are
    /// arranged by priority.
    #[must_use]
    pub fn middleware<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.middleware = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the credentials used by the auth middleware.
    #[must_use]
    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Overrides the rate limit policy of one operation.
    #[must_use]
    pub fn rate_limit(mut self, operation: OperationKey, policy: RateLimitPolicy) -> Self {
        self.rate_limits.insert(operation, policy);
        self
    }

    /// Overrides the rate limit policy of every operation without its own
    /// override.
    #[must_use]
    pub const fn default_rate_limit(mut self, policy: RateLimitPolicy) -> Self {
        self.default_rate_limit = Some(policy);
        self
    }

    /// Shares an existing limiter instead of creating one per pipeline.
    ///
    /// Policies configured on the builder are ignored when a shared limiter
    /// is supplied. The limiter's own policies are validated by
    /// [`build`](Self::build).
    #[must_use]
    pub fn rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Replaces the marketplace retry preset.
    #[must_use]
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Sets the per-attempt timeout in seconds.
    #[must_use]
    pub fn timeout(mut self, seconds: f64) -> Self {
        self.timeout_secs = Some(seconds);
        self
    }

    /// Sets the redirect limit. Zero disables redirects.
    #[must_use]
    pub const fn max_redirects(mut self, max_redirects: i32) -> Self {
        self.max_redirects = Some(max_redirects);
        self
    }

    /// Sets the user agent prefix for HTTP requests.
    #[must_use]
    pub fn user_agent_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.user_agent_prefix = Some(prefix.into());
        self
    }

    /// Adds a header sent with every request.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Builds the [`ClientConfig`], validating every field.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MissingRequiredField`] if `base_url` is not set
    /// - [`ConfigError::InvalidTimeout`] for a timeout that is not a positive
    ///   finite number
    /// - [`ConfigError::InvalidMaxRedirects`] for a negative redirect limit
    /// - [`ConfigError::InvalidRateLimitPolicy`] or
    ///   [`ConfigError::InvalidRetryPolicy`] for unusable policies
    /// - [`ConfigError::InvalidHeader`] for a header that is not valid HTTP
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let base_url = self
            .base_url
            .ok_or(ConfigError::MissingRequiredField { field: "base_url" })?;

        let timeout = validate_timeout(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))?;

        let max_redirects = match self.max_redirects {
            None => DEFAULT_MAX_REDIRECTS,
            Some(value) => {
                usize::try_from(value).map_err(|_| ConfigError::InvalidMaxRedirects { value })?
            }
        };

        for (operation, policy) in &self.rate_limits {
            policy.validate(operation)?;
        }
        if let Some(policy) = &self.default_rate_limit {
            policy.validate(&OperationKey::general())?;
        }
        if let Some(limiter) = &self.rate_limiter {
            limiter.validate()?;
        }
        if let Some(policy) = &self.retry {
            policy.validate()?;
        }

        let mut default_headers = HeaderMap::new();
        for (name, value) in self.headers {
            let invalid = || ConfigError::InvalidHeader { name: name.clone() };
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
            let header_value = HeaderValue::from_str(&value).map_err(|_| invalid())?;
            default_headers.append(header_name, header_value);
        }

        Ok(ClientConfig {
            base_url,
            marketplace: self.marketplace,
            middleware: self.middleware,
            auth: self.auth,
            rate_limits: self.rate_limits,
            default_rate_limit: self.default_rate_limit,
            rate_limiter: self.rate_limiter,
            retry: self.retry,
            timeout,
            max_redirects,
            user_agent_prefix: self.user_agent_prefix,
            default_headers,
        })
    }
}

fn validate_timeout(seconds: f64) -> Result<Duration, ConfigError> {
    if seconds.is_finite() && seconds > 0.0 {
        Duration::try_from_secs_f64(seconds).map_err(|_| ConfigError::InvalidTimeout {
            seconds: seconds.to_string(),
        })
    } else {
        Err(ConfigError::InvalidTimeout {
            seconds: seconds.to_string(),
        })
    }
}
