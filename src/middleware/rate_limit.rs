//! Client-side admission control before each attempt.

use std::sync::Arc;

use async_trait::async_trait;

use crate::clients::{ClientError, RateLimitTelemetry, RequestContext, ResponseOutcome};
use crate::config::MarketplaceTag;
use crate::middleware::Handler;
use crate::rate_limit::RateLimiter;

pub(crate) struct RateLimitHandler {
    inner: Arc<dyn Handler>,
    marketplace: MarketplaceTag,
    limiter: Arc<RateLimiter>,
}

impl RateLimitHandler {
    pub(crate) fn new(
        inner: Arc<dyn Handler>,
        marketplace: MarketplaceTag,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            inner,
            marketplace,
            limiter,
        }
    }
}

#[async_trait]
impl Handler for RateLimitHandler {
    async fn handle(&self, request: RequestContext) -> Result<ResponseOutcome, ClientError> {
        let operation = request.operation().clone();
        self.limiter.until_ready(self.marketplace, &operation).await?;

        let response = self.inner.handle(request).await?;

        let telemetry = RateLimitTelemetry::from_headers(self.marketplace, &response.headers);
        if !telemetry.is_empty() {
            tracing::debug!(
                marketplace = %self.marketplace,
                operation = %operation,
                limit = ?telemetry.limit,
                remaining = ?telemetry.remaining,
                retry_after = ?telemetry.retry_after,
                "Marketplace rate limit telemetry"
            );
            self.limiter
                .record_telemetry(self.marketplace, &operation, telemetry);
        }

        // 429s are returned as-is; the retry layer decides what to do.
        Ok(response)
    }
}
