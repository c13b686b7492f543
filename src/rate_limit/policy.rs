//! Rate limit policies and their admission state machines.

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::{MarketplaceTag, OperationKey};
use crate::error::ConfigError;

/// Tolerance for floating point token accounting.
const TOKEN_EPSILON: f64 = 1e-9;

/// How requests for one operation key are admitted.
///
/// # Example
///
/// ```rust
/// use marketplace_http::rate_limit::RateLimitPolicy;
/// use marketplace_http::{MarketplaceTag, OperationKey};
/// use std::time::Duration;
///
/// let policy = RateLimitPolicy::default_for(MarketplaceTag::Amazon, &OperationKey::new("orders"));
/// assert_eq!(policy, RateLimitPolicy::token_bucket(20, 1, Duration::from_secs(60)));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateLimitPolicy {
    /// Bursts up to `capacity`, refilled by `refill_amount` every `refill_interval`.
    TokenBucket {
        /// Maximum stored tokens.
        capacity: u32,
        /// Tokens added per interval.
        refill_amount: u32,
        /// The refill interval.
        refill_interval: Duration,
    },
    /// At most `limit` requests per non-overlapping window.
    FixedWindow {
        /// Requests per window.
        limit: u32,
        /// Window length.
        window: Duration,
    },
    /// At most `limit` requests in any trailing `window`.
    SlidingWindow {
        /// Requests per trailing window.
        limit: u32,
        /// Window length.
        window: Duration,
    },
}

impl RateLimitPolicy {
    /// Creates a token bucket policy.
    #[must_use]
    pub const fn token_bucket(
        capacity: u32,
        refill_amount: u32,
        refill_interval: Duration,
    ) -> Self {
        Self::TokenBucket {
            capacity,
            refill_amount,
            refill_interval,
        }
    }

    /// Creates a fixed window policy.
    #[must_use]
    pub const fn fixed_window(limit: u32, window: Duration) -> Self {
        Self::FixedWindow { limit, window }
    }

    /// Creates a sliding window policy.
    #[must_use]
    pub const fn sliding_window(limit: u32, window: Duration) -> Self {
        Self::SlidingWindow { limit, window }
    }

    /// Returns the built-in policy for a marketplace operation.
    #[must_use]
    pub fn default_for(marketplace: MarketplaceTag, operation: &OperationKey) -> Self {
        const SECOND: Duration = Duration::from_secs(1);
        const MINUTE: Duration = Duration::from_secs(60);
        const DAY: Duration = Duration::from_secs(24 * 60 * 60);

        match marketplace {
            MarketplaceTag::Amazon => match operation.as_ref() {
                "orders" => Self::token_bucket(20, 1, MINUTE),
                "feeds" => Self::token_bucket(15, 1, Duration::from_secs(120)),
                "listings" => Self::token_bucket(10, 5, SECOND),
                "reports" => Self::token_bucket(15, 1, MINUTE),
                _ => Self::token_bucket(10, 1, SECOND),
            },
            MarketplaceTag::Ebay => Self::fixed_window(5000, DAY),
            MarketplaceTag::Discogs => Self::sliding_window(60, MINUTE),
            MarketplaceTag::Bandcamp => Self::token_bucket(10, 1, SECOND),
            MarketplaceTag::General => Self::token_bucket(10, 10, SECOND),
        }
    }

    /// Rejects policies that could never admit a request.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRateLimitPolicy`] for zero capacities,
    /// limits, refill amounts or intervals.
    pub fn validate(&self, operation: &OperationKey) -> Result<(), ConfigError> {
        let reason = match *self {
            Self::TokenBucket { capacity: 0, .. } => Some("capacity must be at least 1"),
            Self::TokenBucket { refill_amount: 0, .. } => Some("refill amount must be at least 1"),
            Self::TokenBucket { refill_interval, .. } if refill_interval.is_zero() => {
                Some("refill interval must be positive")
            }
            Self::FixedWindow { limit: 0, .. } | Self::SlidingWindow { limit: 0, .. } => {
                Some("limit must be at least 1")
            }
            Self::FixedWindow { window, .. } | Self::SlidingWindow { window, .. }
                if window.is_zero() =>
            {
                Some("window must be positive")
            }
            _ => None,
        };

        reason.map_or(Ok(()), |reason| {
            Err(ConfigError::InvalidRateLimitPolicy {
                operation: operation.to_string(),
                reason: reason.to_string(),
            })
        })
    }

    /// Returns the policy kind name used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TokenBucket { .. } => "token_bucket",
            Self::FixedWindow { .. } => "fixed_window",
            Self::SlidingWindow { .. } => "sliding_window",
        }
    }
}

/// The result of one admission attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Admission {
    /// Whether the request may proceed now.
    pub admitted: bool,
    /// How long until capacity is expected; zero when admitted.
    pub wait: Duration,
}

impl Admission {
    const fn granted() -> Self {
        Self {
            admitted: true,
            wait: Duration::ZERO,
        }
    }

    fn denied(wait: Duration) -> Self {
        Self {
            admitted: false,
            wait: round_up_to_millis(wait),
        }
    }
}

/// Mutable accounting for one operation key.
#[derive(Debug)]
pub(crate) enum LimiterState {
    TokenBucket { tokens: f64, last_refill: Instant },
    FixedWindow { count: u32, window_start: Instant },
    SlidingWindow { admitted: VecDeque<Instant> },
}

impl LimiterState {
    /// Creates full-capacity state for `policy` starting at `now`.
    pub(crate) fn new(policy: &RateLimitPolicy, now: Instant) -> Self {
        match *policy {
            RateLimitPolicy::TokenBucket { capacity, .. } => Self::TokenBucket {
                tokens: f64::from(capacity),
                last_refill: now,
            },
            RateLimitPolicy::FixedWindow { .. } => Self::FixedWindow {
                count: 0,
                window_start: now,
            },
            RateLimitPolicy::SlidingWindow { limit, .. } => Self::SlidingWindow {
                admitted: VecDeque::with_capacity(limit as usize),
            },
        }
    }

    /// Tries to take one unit of capacity at `now`.
    pub(crate) fn try_acquire(&mut self, policy: &RateLimitPolicy, now: Instant) -> Admission {
        match (self, *policy) {
            (
                Self::TokenBucket {
                    tokens,
                    last_refill,
                },
                RateLimitPolicy::TokenBucket {
                    capacity,
                    refill_amount,
                    refill_interval,
                },
            ) => {
                let interval = refill_interval.as_secs_f64();
                let elapsed = now.saturating_duration_since(*last_refill).as_secs_f64();
                *tokens = (elapsed * f64::from(refill_amount))
                    .mul_add(1.0 / interval, *tokens)
                    .min(f64::from(capacity));
                *last_refill = now.max(*last_refill);

                if *tokens >= 1.0 - TOKEN_EPSILON {
                    *tokens = (*tokens - 1.0).max(0.0);
                    return Admission::granted();
                }

                // A zero refill never restores capacity.
                let missing = 1.0 - *tokens;
                let wait =
                    Duration::try_from_secs_f64(missing * interval / f64::from(refill_amount))
                        .unwrap_or(Duration::MAX);
                Admission::denied(wait)
            }
            (
                Self::FixedWindow {
                    count,
                    window_start,
                },
                RateLimitPolicy::FixedWindow { limit, window },
            ) => {
                if now.saturating_duration_since(*window_start) >= window {
                    *window_start = now;
                    *count = 0;
                }

                if *count < limit {
                    *count += 1;
                    return Admission::granted();
                }

                Admission::denied((*window_start + window).saturating_duration_since(now))
            }
            (
                Self::SlidingWindow { admitted },
                RateLimitPolicy::SlidingWindow { limit, window },
            ) => {
                while admitted
                    .front()
                    .is_some_and(|oldest| now.saturating_duration_since(*oldest) >= window)
                {
                    admitted.pop_front();
                }

                if admitted.len() < limit as usize {
                    admitted.push_back(now);
                    return Admission::granted();
                }

                let oldest = admitted.front().copied().unwrap_or(now);
                Admission::denied((oldest + window).saturating_duration_since(now))
            }
            (state, policy) => {
                // Policy replaced under a live key: restart its accounting.
                *state = Self::new(&policy, now);
                state.try_acquire(&policy, now)
            }
        }
    }
}

/// Rounds up so a caller sleeping for the wait never wakes just short of capacity.
fn round_up_to_millis(wait: Duration) -> Duration {
    let millis = wait.as_nanos().div_ceil(1_000_000);
    Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
}
