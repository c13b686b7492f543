//! HTTP transport for the client pipeline.
//!
//! The pipeline depends on the [`Transport`] trait only; [`ReqwestTransport`]
//! is the default implementation. The transport owns timeouts and redirects
//! and reports every HTTP status as a [`ResponseOutcome`].

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::clients::errors::{TransportError, TransportErrorKind};
use crate::clients::request::RequestContext;
use crate::clients::response::ResponseOutcome;

/// Sends one request attempt and returns whatever the server answered.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Executes `request`, giving up after `timeout`.
    async fn execute(
        &self,
        request: &RequestContext,
        timeout: Duration,
    ) -> Result<ResponseOutcome, TransportError>;

    /// Returns `false` if the transport cannot be used in this environment.
    fn is_available(&self) -> bool {
        true
    }
}

/// `reqwest`-based transport using rustls.
///
/// # Thread Safety
///
/// `ReqwestTransport` is `Send + Sync`; the inner connection pool is shared
/// across clones.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

// Verify ReqwestTransport is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<ReqwestTransport>();
};

impl ReqwestTransport {
    /// Creates a transport that follows at most `max_redirects` redirects.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the TLS backend cannot be initialized.
    pub fn new(max_redirects: usize) -> Result<Self, TransportError> {
        let redirect = if max_redirects == 0 {
            reqwest::redirect::Policy::none()
        } else {
            reqwest::redirect::Policy::limited(max_redirects)
        };

        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .redirect(redirect)
            .build()
            .map_err(|e| TransportError::new(TransportErrorKind::Ssl, e.to_string()))?;

        Ok(Self { client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(
        &self,
        request: &RequestContext,
        timeout: Duration,
    ) -> Result<ResponseOutcome, TransportError> {
        let started = Instant::now();

        let mut builder = self
            .client
            .request(request.method().into(), request.full_url())
            .headers(request.header_map().clone())
            .timeout(timeout);
        if let Some(body) = request.body_bytes() {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(ResponseOutcome::new(status, headers, body, started.elapsed()))
    }
}
