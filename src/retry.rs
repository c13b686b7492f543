//! Retry classification and exponential backoff.
//!
//! [`RetryPolicy`] decides whether an outcome is worth another attempt and
//! how long to wait before it. The retry middleware owns the loop; this
//! module only does the arithmetic.
//!
//! # Backoff
//!
//! The wait before the n-th retry is
//! `min(initial_delay * multiplier^(n-1), max_delay)`. A 429 response with
//! `Retry-After` waits at least as long as the server asked, still capped at
//! `max_delay`.
//!
//! # Example
//!
//! ```rust
//! use marketplace_http::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::default();
//! assert_eq!(policy.delay(1), Duration::from_secs(1));
//! assert_eq!(policy.delay(2), Duration::from_secs(2));
//! assert_eq!(policy.delay(3), Duration::from_secs(4));
//! assert!(policy.is_retryable_status(503));
//! assert!(!policy.is_retryable_status(404));
//! ```

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clients::{ClientError, RateLimitExceededError, ResponseOutcome};
use crate::config::MarketplaceTag;
use crate::error::ConfigError;

/// Statuses retried unless configured otherwise.
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Attempt budget and backoff parameters for one pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Wait before the first retry.
    #[serde(with = "secs_f64")]
    pub initial_delay: Duration,
    /// Growth factor between consecutive waits.
    pub multiplier: f64,
    /// Upper bound for any single wait.
    #[serde(with = "secs_f64")]
    pub max_delay: Duration,
    /// HTTP statuses that trigger a retry.
    pub retryable_statuses: BTreeSet<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.into_iter().collect(),
        }
    }
}

impl RetryPolicy {
    /// Returns the preset for a marketplace.
    ///
    /// | Marketplace | Attempts | Initial delay |
    /// |-------------|----------|---------------|
    /// | amazon      | 5        | 2s            |
    /// | ebay        | 3        | 1s            |
    /// | discogs     | 3        | 1s            |
    /// | bandcamp    | 1        | 3s            |
    /// | general     | 3        | 1s            |
    #[must_use]
    pub fn for_marketplace(marketplace: MarketplaceTag) -> Self {
        let defaults = Self::default();
        match marketplace {
            MarketplaceTag::Amazon => defaults
                .with_max_attempts(5)
                .with_initial_delay(Duration::from_secs(2)),
            MarketplaceTag::Bandcamp => defaults
                .with_max_attempts(1)
                .with_initial_delay(Duration::from_secs(3)),
            MarketplaceTag::Ebay | MarketplaceTag::Discogs | MarketplaceTag::General => defaults,
        }
    }

    /// Sets the attempt budget.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the wait before the first retry.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the cap for any single wait.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Replaces the set of retryable statuses.
    #[must_use]
    pub fn with_retryable_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_statuses = statuses.into_iter().collect();
        self
    }

    /// Checks that the policy allows at least one attempt and that the
    /// multiplier is a finite number not below 1.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRetryPolicy`] describing the problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidRetryPolicy {
                reason: "max_attempts must be at least 1".to_string(),
            });
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::InvalidRetryPolicy {
                reason: format!("multiplier must be a finite number >= 1, got {}", self.multiplier),
            });
        }
        Ok(())
    }

    /// Returns the wait before the `retry`-th retry (1-based).
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let max = self.max_delay.as_secs_f64();
        if secs.is_finite() && secs < max {
            Duration::from_secs_f64(secs)
        } else {
            self.max_delay
        }
    }

    /// Returns the wait before retrying after `response`.
    ///
    /// A 429 carrying `Retry-After` waits for the longer of the backoff and
    /// the server's request, capped at `max_delay`.
    #[must_use]
    pub fn delay_after_response(&self, retry: u32, response: &ResponseOutcome) -> Duration {
        let backoff = self.delay(retry);
        if response.status != 429 {
            return backoff;
        }
        response
            .retry_after()
            .map_or(backoff, |server| backoff.max(server).min(self.max_delay))
    }

    /// Returns the wait before retrying after `error`.
    ///
    /// A local rate limit denial waits for the longer of the backoff and
    /// its `retry_after`, capped at `max_delay`, like a 429 does.
    #[must_use]
    pub fn delay_after_error(&self, retry: u32, error: &ClientError) -> Duration {
        let backoff = self.delay(retry);
        match error {
            ClientError::RateLimitExceeded(RateLimitExceededError {
                retry_after: Some(wait),
                ..
            }) => backoff.max(*wait).min(self.max_delay),
            _ => backoff,
        }
    }

    /// Returns `true` if `status` is in the retryable set.
    #[must_use]
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Returns `true` if an error raised by an inner layer should be retried.
    ///
    /// Transport timeouts and connection failures always are. Local rate
    /// limit denials follow 429 and authentication failures follow 401.
    #[must_use]
    pub fn is_retryable_error(&self, error: &ClientError) -> bool {
        match error {
            ClientError::Transport(e) => e.is_retryable(),
            ClientError::RateLimitExceeded(_) => self.is_retryable_status(429),
            ClientError::Authentication(_) => self.is_retryable_status(401),
            ClientError::Configuration(_) | ClientError::RetryExhausted(_) => false,
        }
    }
}

/// Serializes a [`Duration`] as fractional seconds.
mod secs_f64 {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(de::Error::custom)
    }
}
