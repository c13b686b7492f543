//! Re-runs the inner chain on transient failures.

use std::sync::Arc;

use async_trait::async_trait;

use crate::clients::{
    ClientError, RequestContext, ResponseOutcome, RetryExhaustedError, RetryFailure,
};
use crate::config::MarketplaceTag;
use crate::middleware::Handler;
use crate::retry::RetryPolicy;

pub(crate) struct RetryHandler {
    inner: Arc<dyn Handler>,
    marketplace: MarketplaceTag,
    policy: RetryPolicy,
}

impl RetryHandler {
    pub(crate) fn new(
        inner: Arc<dyn Handler>,
        marketplace: MarketplaceTag,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            inner,
            marketplace,
            policy,
        }
    }

    fn exhausted(
        &self,
        request: &RequestContext,
        attempts: u32,
        last: RetryFailure,
    ) -> ClientError {
        tracing::warn!(
            marketplace = %self.marketplace,
            operation = %request.operation(),
            attempts,
            last = %last,
            "Retry attempts exhausted"
        );
        ClientError::RetryExhausted(RetryExhaustedError {
            marketplace: self.marketplace,
            operation: request.operation().clone(),
            attempts,
            max_attempts: self.policy.max_attempts,
            last,
        })
    }
}

#[async_trait]
impl Handler for RetryHandler {
    async fn handle(&self, request: RequestContext) -> Result<ResponseOutcome, ClientError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            let delay = match self.inner.handle(request.clone()).await {
                Ok(response) if self.policy.is_retryable_status(response.status) => {
                    if attempt >= self.policy.max_attempts {
                        return Err(self.exhausted(
                            &request,
                            attempt,
                            RetryFailure::Response(Box::new(response)),
                        ));
                    }
                    let delay = self.policy.delay_after_response(attempt, &response);
                    tracing::info!(
                        marketplace = %self.marketplace,
                        operation = %request.operation(),
                        attempt,
                        status = response.status,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Retrying after retryable status"
                    );
                    delay
                }
                Ok(response) => return Ok(response),
                Err(error) if self.policy.is_retryable_error(&error) => {
                    if attempt >= self.policy.max_attempts {
                        return Err(self.exhausted(
                            &request,
                            attempt,
                            RetryFailure::Error(Box::new(error)),
                        ));
                    }
                    let delay = self.policy.delay_after_error(attempt, &error);
                    tracing::info!(
                        marketplace = %self.marketplace,
                        operation = %request.operation(),
                        attempt,
                        error = %error,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Retrying after transient error"
                    );
                    delay
                }
                Err(error) => return Err(error),
            };

            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthenticationError;
    use crate::clients::{
        HttpMethod, RateLimitExceededError, TransportError, TransportErrorKind,
    };
    use crate::config::OperationKey;
    use bytes::Bytes;
    use reqwest::header::{HeaderMap, HeaderValue};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Replays scripted outcomes, recording when each attempt arrived.
    struct Script {
        outcomes: Mutex<VecDeque<Result<ResponseOutcome, ClientError>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl Script {
        fn new(outcomes: Vec<Result<ResponseOutcome, ClientError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn gaps(&self) -> Vec<Duration> {
            let calls = self.calls.lock().unwrap();
            calls.windows(2).map(|w| w[1] - w[0]).collect()
        }

        fn attempts(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Handler for Script {
        async fn handle(&self, _request: RequestContext) -> Result<ResponseOutcome, ClientError> {
            self.calls.lock().unwrap().push(Instant::now());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .expect("script ran out of outcomes")
        }
    }

    fn status(code: u16) -> Result<ResponseOutcome, ClientError> {
        Ok(ResponseOutcome::new(code, HeaderMap::new(), Bytes::new(), Duration::ZERO))
    }

    fn request() -> RequestContext {
        RequestContext::new(
            HttpMethod::Get,
            url::Url::parse("https://api.ebay.com/sell/inventory/v1/inventory_item").unwrap(),
            OperationKey::new("inventory"),
        )
    }

    fn secs(value: u64) -> Duration {
        Duration::from_secs(value)
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success_with_backoff() {
        let script = Script::new(vec![status(503), status(502), status(200)]);
        let handler =
            RetryHandler::new(script.clone(), MarketplaceTag::Ebay, RetryPolicy::default());

        let response = handler.handle(request()).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(script.gaps(), vec![secs(1), secs(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_last_status() {
        let script = Script::new(vec![status(503), status(503), status(503)]);
        let handler =
            RetryHandler::new(script.clone(), MarketplaceTag::Ebay, RetryPolicy::default());

        let error = handler.handle(request()).await.unwrap_err();
        let ClientError::RetryExhausted(exhausted) = error else {
            panic!("expected RetryExhausted");
        };
        assert_eq!(exhausted.attempts, 3);
        assert_eq!(exhausted.max_attempts, 3);
        assert_eq!(exhausted.last_status(), Some(503));
        assert_eq!(exhausted.operation, OperationKey::new("inventory"));
        assert_eq!(script.gaps(), vec![secs(1), secs(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_budget_still_reports_exhaustion() {
        let script = Script::new(vec![status(500)]);
        let handler = RetryHandler::new(
            script.clone(),
            MarketplaceTag::Bandcamp,
            RetryPolicy::for_marketplace(MarketplaceTag::Bandcamp),
        );

        let error = handler.handle(request()).await.unwrap_err();
        assert!(matches!(
            error,
            ClientError::RetryExhausted(RetryExhaustedError { attempts: 1, max_attempts: 1, .. })
        ));
        assert_eq!(script.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_status_is_returned() {
        let script = Script::new(vec![status(404)]);
        let handler =
            RetryHandler::new(script.clone(), MarketplaceTag::Ebay, RetryPolicy::default());

        assert_eq!(handler.handle(request()).await.unwrap().status, 404);
        assert_eq!(script.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_on_429_extends_wait() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("10"));
        let throttled = Ok(ResponseOutcome::new(429, headers, Bytes::new(), Duration::ZERO));

        let script = Script::new(vec![throttled, status(200)]);
        let handler =
            RetryHandler::new(script.clone(), MarketplaceTag::Discogs, RetryPolicy::default());

        handler.handle(request()).await.unwrap();
        assert_eq!(script.gaps(), vec![secs(10)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_four_attempts_double_the_wait() {
        let script = Script::new(vec![status(503), status(503), status(503), status(200)]);
        let policy = RetryPolicy::default().with_max_attempts(4);
        let handler = RetryHandler::new(script.clone(), MarketplaceTag::Ebay, policy);

        assert_eq!(handler.handle(request()).await.unwrap().status, 200);
        assert_eq!(script.attempts(), 4);
        assert_eq!(script.gaps(), vec![secs(1), secs(2), secs(4)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_rate_limit_waits_for_retry_after() {
        let denied = ClientError::RateLimitExceeded(RateLimitExceededError {
            marketplace: MarketplaceTag::Discogs,
            operation: OperationKey::new("search"),
            retry_after: Some(secs(10)),
        });

        let script = Script::new(vec![Err(denied), status(200)]);
        let handler =
            RetryHandler::new(script.clone(), MarketplaceTag::Discogs, RetryPolicy::default());

        assert_eq!(handler.handle(request()).await.unwrap().status, 200);
        assert_eq!(script.gaps(), vec![secs(10)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors() {
        let script = Script::new(vec![
            Err(TransportError::new(TransportErrorKind::Connection, "reset").into()),
            status(200),
        ]);
        let handler =
            RetryHandler::new(script.clone(), MarketplaceTag::Ebay, RetryPolicy::default());
        assert_eq!(handler.handle(request()).await.unwrap().status, 200);

        let script = Script::new(vec![Err(
            TransportError::new(TransportErrorKind::Ssl, "bad certificate").into(),
        )]);
        let handler =
            RetryHandler::new(script.clone(), MarketplaceTag::Ebay, RetryPolicy::default());
        assert!(matches!(
            handler.handle(request()).await,
            Err(ClientError::Transport(TransportError { kind: TransportErrorKind::Ssl, .. }))
        ));
        assert_eq!(script.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_authentication_errors_are_terminal_by_default() {
        let script = Script::new(vec![Err(AuthenticationError::TokenExpired.into())]);
        let handler =
            RetryHandler::new(script.clone(), MarketplaceTag::Ebay, RetryPolicy::default());

        assert!(matches!(
            handler.handle(request()).await,
            Err(ClientError::Authentication(AuthenticationError::TokenExpired))
        ));
        assert_eq!(script.attempts(), 1);
    }
}
