//! Per-operation client-side rate limiting.
//!
//! A [`RateLimiter`] keeps one accounting slot per
//! ([`MarketplaceTag`], [`OperationKey`]) pair. Slots are created lazily on
//! first use and live as long as the limiter. The table lock is only held to
//! look up or insert a slot; admission runs under the slot's own mutex, so
//! different operations never contend with each other.
//!
//! # Example
//!
//! ```rust
//! use marketplace_http::rate_limit::{RateLimitPolicy, RateLimiter};
//! use marketplace_http::{MarketplaceTag, OperationKey};
//! use std::time::Duration;
//!
//! let limiter = RateLimiter::new()
//!     .with_policy(
//!         OperationKey::new("search"),
//!         RateLimitPolicy::sliding_window(2, Duration::from_secs(60)),
//!     );
//!
//! let search = OperationKey::new("search");
//! assert!(limiter.acquire(MarketplaceTag::Discogs, &search).admitted);
//! assert!(limiter.acquire(MarketplaceTag::Discogs, &search).admitted);
//! assert!(!limiter.acquire(MarketplaceTag::Discogs, &search).admitted);
//! ```

mod policy;

pub use policy::{Admission, RateLimitPolicy};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::time::Instant;

use crate::clients::{RateLimitExceededError, RateLimitTelemetry};
use crate::config::{MarketplaceTag, OperationKey};
use crate::error::ConfigError;
use policy::LimiterState;

type SlotKey = (MarketplaceTag, OperationKey);

#[derive(Debug)]
struct Slot {
    policy: RateLimitPolicy,
    state: Option<LimiterState>,
    telemetry: Option<RateLimitTelemetry>,
    server_retry_at: Option<Instant>,
}

impl Slot {
    const fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            state: None,
            telemetry: None,
            server_retry_at: None,
        }
    }

    fn acquire(&mut self, now: Instant) -> Admission {
        let policy = self.policy;
        self.state
            .get_or_insert_with(|| LimiterState::new(&policy, now))
            .try_acquire(&policy, now)
    }
}

/// Client-side admission control shared by every request of a pipeline.
///
/// Policies resolve in order: a per-operation override, then the
/// marketplace-wide default override, then
/// [`RateLimitPolicy::default_for`].
///
/// # Thread Safety
///
/// `RateLimiter` is `Send + Sync`. Share it between pipelines with an
/// [`Arc`] to make them draw from the same budget.
#[derive(Debug, Default)]
pub struct RateLimiter {
    overrides: HashMap<OperationKey, RateLimitPolicy>,
    default_policy: Option<RateLimitPolicy>,
    slots: RwLock<HashMap<SlotKey, Arc<Mutex<Slot>>>>,
}

// Verify RateLimiter is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<RateLimiter>();
};

impl RateLimiter {
    /// Creates a limiter using the built-in marketplace defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the policy of one operation.
    #[must_use]
    pub fn with_policy(mut self, operation: OperationKey, policy: RateLimitPolicy) -> Self {
        self.overrides.insert(operation, policy);
        self
    }

    /// Overrides the policy of every operation without its own override.
    #[must_use]
    pub const fn with_default_policy(mut self, policy: RateLimitPolicy) -> Self {
        self.default_policy = Some(policy);
        self
    }

    /// Checks every configured override.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRateLimitPolicy`] for the first policy
    /// that could never admit a request.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(policy) = &self.default_policy {
            policy.validate(&OperationKey::general())?;
        }
        self.overrides
            .iter()
            .try_for_each(|(operation, policy)| policy.validate(operation))
    }

    /// Returns the policy applied to `operation`.
    #[must_use]
    pub fn policy_for(
        &self,
        marketplace: MarketplaceTag,
        operation: &OperationKey,
    ) -> RateLimitPolicy {
        self.overrides
            .get(operation)
            .copied()
            .or(self.default_policy)
            .unwrap_or_else(|| RateLimitPolicy::default_for(marketplace, operation))
    }

    /// Tries to admit one request now. Never blocks.
    #[must_use]
    pub fn acquire(&self, marketplace: MarketplaceTag, operation: &OperationKey) -> Admission {
        self.acquire_at(marketplace, operation, Instant::now())
    }

    /// Tries to admit one request at `now`.
    #[must_use]
    pub fn acquire_at(
        &self,
        marketplace: MarketplaceTag,
        operation: &OperationKey,
        now: Instant,
    ) -> Admission {
        let slot = self.slot(marketplace, operation);
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.acquire(now)
    }

    /// Waits for admission, sleeping at most once.
    ///
    /// On denial the future sleeps for the reported wait and acquires once
    /// more. Dropping the future during the sleep abandons the request
    /// without touching the limiter again.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitExceededError`] if the second acquisition is also
    /// denied. Its `retry_after` is the longer of the local wait and any
    /// `Retry-After` the marketplace advertised that has not yet elapsed.
    pub async fn until_ready(
        &self,
        marketplace: MarketplaceTag,
        operation: &OperationKey,
    ) -> Result<(), RateLimitExceededError> {
        let first = self.acquire(marketplace, operation);
        if first.admitted {
            return Ok(());
        }

        tracing::debug!(
            marketplace = %marketplace,
            operation = %operation,
            wait_ms = u64::try_from(first.wait.as_millis()).unwrap_or(u64::MAX),
            "Rate limit reached, waiting for capacity"
        );
        tokio::time::sleep(first.wait).await;

        let now = Instant::now();
        let second = self.acquire_at(marketplace, operation, now);
        if second.admitted {
            return Ok(());
        }

        let retry_after = self
            .server_wait(marketplace, operation, now)
            .map_or(second.wait, |server| server.max(second.wait));

        tracing::warn!(
            marketplace = %marketplace,
            operation = %operation,
            retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
            "Rate limit still exceeded after waiting"
        );
        Err(RateLimitExceededError {
            marketplace,
            operation: operation.clone(),
            retry_after: Some(retry_after),
        })
    }

    /// Stores the latest telemetry a marketplace reported for `operation`.
    ///
    /// Telemetry is informational; the scheduled state is left untouched.
    pub fn record_telemetry(
        &self,
        marketplace: MarketplaceTag,
        operation: &OperationKey,
        telemetry: RateLimitTelemetry,
    ) {
        let slot = self.slot(marketplace, operation);
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.server_retry_at = telemetry
            .retry_after
            .and_then(|wait| Instant::now().checked_add(wait));
        slot.telemetry = Some(telemetry);
    }

    /// Returns the last telemetry recorded for `operation`.
    #[must_use]
    pub fn telemetry(
        &self,
        marketplace: MarketplaceTag,
        operation: &OperationKey,
    ) -> Option<RateLimitTelemetry> {
        let key = (marketplace, operation.clone());
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let slot = slots.get(&key)?;
        let slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.telemetry
    }

    /// Returns how much of the last advertised `Retry-After` is left at `now`.
    fn server_wait(
        &self,
        marketplace: MarketplaceTag,
        operation: &OperationKey,
        now: Instant,
    ) -> Option<Duration> {
        let slot = self.slot(marketplace, operation);
        let slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.server_retry_at
            .map(|at| at.saturating_duration_since(now))
            .filter(|wait| !wait.is_zero())
    }

    fn slot(&self, marketplace: MarketplaceTag, operation: &OperationKey) -> Arc<Mutex<Slot>> {
        let key = (marketplace, operation.clone());

        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Arc::clone(slot);
        }

        let policy = self.policy_for(marketplace, operation);
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            slots
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(Slot::new(policy)))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_bucket_capacity_then_denied() {
        let limiter = RateLimiter::new().with_policy(
            OperationKey::new("orders"),
            RateLimitPolicy::token_bucket(5, 1, Duration::from_secs(1)),
        );
        let orders = OperationKey::new("orders");
        let now = Instant::now();

        for _ in 0..5 {
            assert!(limiter.acquire_at(MarketplaceTag::Amazon, &orders, now).admitted);
        }
        let denied = limiter.acquire_at(MarketplaceTag::Amazon, &orders, now);
        assert!(!denied.admitted);
        assert_eq!(denied.wait, Duration::from_secs(1));
    }

    #[test]
    fn test_keys_are_isolated() {
        let limiter = RateLimiter::new()
            .with_default_policy(RateLimitPolicy::token_bucket(1, 1, Duration::from_secs(60)));
        let now = Instant::now();
        let orders = OperationKey::new("orders");
        let feeds = OperationKey::new("feeds");

        assert!(limiter.acquire_at(MarketplaceTag::Amazon, &orders, now).admitted);
        assert!(!limiter.acquire_at(MarketplaceTag::Amazon, &orders, now).admitted);
        assert!(limiter.acquire_at(MarketplaceTag::Amazon, &feeds, now).admitted);
        assert!(limiter.acquire_at(MarketplaceTag::Ebay, &orders, now).admitted);
    }

    #[test]
    fn test_policy_resolution_order() {
        let override_policy = RateLimitPolicy::fixed_window(3, Duration::from_secs(1));
        let default_policy = RateLimitPolicy::sliding_window(7, Duration::from_secs(10));
        let limiter = RateLimiter::new()
            .with_policy(OperationKey::new("feeds"), override_policy)
            .with_default_policy(default_policy);

        assert_eq!(
            limiter.policy_for(MarketplaceTag::Amazon, &OperationKey::new("feeds")),
            override_policy
        );
        assert_eq!(
            limiter.policy_for(MarketplaceTag::Amazon, &OperationKey::new("orders")),
            default_policy
        );
        assert_eq!(
            RateLimiter::new().policy_for(MarketplaceTag::Amazon, &OperationKey::new("listings")),
            RateLimitPolicy::token_bucket(10, 5, Duration::from_secs(1))
        );
    }

    #[test]
    fn test_validate_reports_bad_override() {
        let limiter = RateLimiter::new().with_policy(
            OperationKey::new("search"),
            RateLimitPolicy::sliding_window(0, Duration::from_secs(60)),
        );
        assert!(matches!(
            limiter.validate(),
            Err(ConfigError::InvalidRateLimitPolicy { operation, .. }) if operation == "search"
        ));
        assert!(RateLimiter::new().validate().is_ok());
    }

    #[test]
    fn test_telemetry_is_recorded_without_changing_admission() {
        let limiter = RateLimiter::new()
            .with_default_policy(RateLimitPolicy::token_bucket(1, 1, Duration::from_secs(60)));
        let search = OperationKey::new("search");
        assert!(limiter.telemetry(MarketplaceTag::Discogs, &search).is_none());

        limiter.record_telemetry(
            MarketplaceTag::Discogs,
            &search,
            RateLimitTelemetry {
                limit: Some(60.0),
                remaining: Some(0.0),
                retry_after: None,
            },
        );

        let telemetry = limiter.telemetry(MarketplaceTag::Discogs, &search).unwrap();
        assert_eq!(telemetry.remaining, Some(0.0));
        assert!(limiter.acquire(MarketplaceTag::Discogs, &search).admitted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_until_ready_waits_once_then_admits() {
        let limiter = RateLimiter::new()
            .with_default_policy(RateLimitPolicy::token_bucket(1, 1, Duration::from_secs(5)));
        let sales = OperationKey::new("sales");

        let started = Instant::now();
        limiter.until_ready(MarketplaceTag::Bandcamp, &sales).await.unwrap();
        limiter.until_ready(MarketplaceTag::Bandcamp, &sales).await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_until_ready_fails_when_capacity_is_taken_during_wait() {
        let limiter = Arc::new(
            RateLimiter::new()
                .with_default_policy(RateLimitPolicy::fixed_window(1, Duration::from_secs(10))),
        );
        let inventory = OperationKey::new("inventory");
        assert!(limiter.acquire(MarketplaceTag::Ebay, &inventory).admitted);

        let waiting = {
            let limiter = Arc::clone(&limiter);
            let inventory = inventory.clone();
            tokio::spawn(async move { limiter.until_ready(MarketplaceTag::Ebay, &inventory).await })
        };
        let competing = {
            let limiter = Arc::clone(&limiter);
            let inventory = inventory.clone();
            tokio::spawn(async move { limiter.until_ready(MarketplaceTag::Ebay, &inventory).await })
        };

        let results = [waiting.await.unwrap(), competing.await.unwrap()];
        let failures: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].operation, inventory);
        assert_eq!(failures[0].retry_after, Some(Duration::from_secs(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_denial_reports_outstanding_server_retry_after() {
        let limiter = Arc::new(
            RateLimiter::new()
                .with_default_policy(RateLimitPolicy::fixed_window(1, Duration::from_secs(10))),
        );
        let inventory = OperationKey::new("inventory");
        assert!(limiter.acquire(MarketplaceTag::Ebay, &inventory).admitted);
        limiter.record_telemetry(
            MarketplaceTag::Ebay,
            &inventory,
            RateLimitTelemetry {
                limit: None,
                remaining: Some(0.0),
                retry_after: Some(Duration::from_secs(30)),
            },
        );

        let calls: Vec<_> = (0..2)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let inventory = inventory.clone();
                tokio::spawn(
                    async move { limiter.until_ready(MarketplaceTag::Ebay, &inventory).await },
                )
            })
            .collect();
        let mut failures = Vec::new();
        for call in calls {
            if let Err(error) = call.await.unwrap() {
                failures.push(error);
            }
        }

        // Denied at t=10s; the server asked for 30s from t=0.
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].retry_after, Some(Duration::from_secs(20)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_wait_does_not_consume_capacity() {
        let limiter = RateLimiter::new()
            .with_default_policy(RateLimitPolicy::token_bucket(1, 1, Duration::from_secs(10)));
        let orders = OperationKey::new("orders");
        assert!(limiter.acquire(MarketplaceTag::Amazon, &orders).admitted);

        let cancelled = tokio::time::timeout(
            Duration::from_secs(1),
            limiter.until_ready(MarketplaceTag::Amazon, &orders),
        )
        .await;
        assert!(cancelled.is_err());

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(limiter.acquire(MarketplaceTag::Amazon, &orders).admitted);
    }
}
