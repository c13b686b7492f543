//! Request and response logging through `tracing`.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use crate::clients::{ClientError, RequestContext, ResponseOutcome};
use crate::config::MarketplaceTag;
use crate::middleware::Handler;

const REDACTED: &str = "[REDACTED]";

pub(crate) struct LoggingHandler {
    inner: Arc<dyn Handler>,
    marketplace: MarketplaceTag,
    sensitive_headers: Vec<String>,
}

impl LoggingHandler {
    pub(crate) fn new(
        inner: Arc<dyn Handler>,
        marketplace: MarketplaceTag,
        sensitive_headers: Vec<String>,
    ) -> Self {
        Self {
            inner,
            marketplace,
            sensitive_headers,
        }
    }

    /// Renders headers for logs with credential values replaced.
    fn redacted_headers(&self, headers: &HeaderMap) -> String {
        headers
            .iter()
            .map(|(name, value)| {
                let shown = if value.is_sensitive()
                    || self.sensitive_headers.iter().any(|h| h == name.as_str())
                {
                    REDACTED
                } else {
                    value.to_str().unwrap_or("<binary>")
                };
                format!("{name}: {shown}")
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[async_trait]
impl Handler for LoggingHandler {
    async fn handle(&self, request: RequestContext) -> Result<ResponseOutcome, ClientError> {
        tracing::debug!(
            marketplace = %self.marketplace,
            operation = %request.operation(),
            method = %request.method(),
            url = %request.full_url(),
            headers = %self.redacted_headers(request.header_map()),
            body_bytes = request.body_bytes().map_or(0, bytes::Bytes::len),
            "Sending request"
        );

        let method = request.method();
        let operation = request.operation().clone();
        let path = request.url().path().to_string();

        match self.inner.handle(request).await {
            Ok(response) => {
                let elapsed_ms = u64::try_from(response.elapsed.as_millis()).unwrap_or(u64::MAX);
                if response.is_success() {
                    tracing::info!(
                        marketplace = %self.marketplace,
                        operation = %operation,
                        %method,
                        path = %path,
                        status = response.status,
                        elapsed_ms,
                        request_id = response.request_id().unwrap_or_default(),
                        "Received response"
                    );
                } else {
                    tracing::warn!(
                        marketplace = %self.marketplace,
                        operation = %operation,
                        %method,
                        path = %path,
                        status = response.status,
                        elapsed_ms,
                        request_id = response.request_id().unwrap_or_default(),
                        "Received error response"
                    );
                }
                Ok(response)
            }
            Err(error) => {
                tracing::warn!(
                    marketplace = %self.marketplace,
                    operation = %operation,
                    %method,
                    path = %path,
                    error = %error,
                    "Request failed"
                );
                Err(error)
            }
        }
    }
}
