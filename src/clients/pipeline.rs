//! Pipeline assembly and the request executor.
//!
//! [`Pipeline::build`] turns a [`ClientConfig`] into an [`Executor`]: it
//! resolves the configured middleware names, orders them by priority and
//! wraps the transport with them. The executor only builds the
//! [`RequestContext`] and hands it to the outermost layer.
//!
//! # Example
//!
//! ```rust,ignore
//! use marketplace_http::clients::{ApiRequest, HttpMethod, Pipeline};
//! use marketplace_http::{BaseUrl, ClientConfig};
//!
//! let config = ClientConfig::builder()
//!     .base_url(BaseUrl::new("https://api.discogs.com")?)
//!     .middleware(["logging", "rate_limiting", "retry"])
//!     .build()?;
//! let executor = Pipeline::build(&config)?;
//!
//! let request = ApiRequest::builder(HttpMethod::Get, "/database/search")
//!     .query_param("q", "Nirvana")
//!     .build()?;
//! let response = executor.send(request).await?;
//! println!("HTTP {}", response.status);
//! ```

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, USER_AGENT};

use crate::clients::errors::{ClientError, TransportError, TransportErrorKind};
use crate::clients::request::{ApiRequest, HttpMethod, RequestContext};
use crate::clients::response::ResponseOutcome;
use crate::clients::transport::{ReqwestTransport, Transport};
use crate::config::{BaseUrl, ClientConfig, MarketplaceTag, OperationKey};
use crate::error::ConfigError;
use crate::middleware::{self, ChainContext, Handler, MiddlewareRegistry, TransportHandler};
use crate::rate_limit::RateLimiter;

/// Marketplace eBay requests are scoped to unless overridden.
const EBAY_DEFAULT_MARKETPLACE_ID: &str = "EBAY_US";

/// Assembles executors from configuration.
#[derive(Debug)]
pub struct Pipeline;

impl Pipeline {
    /// Builds an executor with the default registry and a `reqwest`
    /// transport.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for unknown middleware names, credentials
    /// that do not match an auth middleware, or a transport that cannot be
    /// initialized.
    pub fn build(config: &ClientConfig) -> Result<Executor, ConfigError> {
        let transport = ReqwestTransport::new(config.max_redirects())
            .map_err(|e| ConfigError::TransportInit { reason: e.message })?;
        Self::build_with(config, &MiddlewareRegistry::default(), Arc::new(transport))
    }

    /// Builds an executor with an explicit registry and transport.
    ///
    /// Building twice from the same configuration yields independent
    /// executors. They share rate limiter state only if the configuration
    /// carries a shared [`RateLimiter`].
    ///
    /// # Errors
    ///
    /// See [`Pipeline::build`]. Also returns
    /// [`ConfigError::TransportUnavailable`] if `transport` reports that it
    /// cannot run.
    pub fn build_with(
        config: &ClientConfig,
        registry: &MiddlewareRegistry,
        transport: Arc<dyn Transport>,
    ) -> Result<Executor, ConfigError> {
        if !transport.is_available() {
            return Err(ConfigError::TransportUnavailable);
        }

        let marketplace = config.marketplace();
        let resolved = config
            .middleware()
            .iter()
            .map(|name| registry.resolve(name))
            .collect::<Result<Vec<_>, _>>()?;
        let arranged = middleware::arrange(resolved);

        let rate_limiter = config.rate_limiter();
        let context = ChainContext {
            marketplace,
            auth: config.auth().cloned(),
            rate_limiter: Arc::clone(&rate_limiter),
            retry: config.retry_policy(),
        };
        let innermost = Arc::new(TransportHandler::new(transport, config.timeout()));
        let chain = middleware::assemble(&arranged, &context, innermost)?;

        let layers: Vec<String> = arranged.iter().map(|m| m.name().to_string()).collect();
        tracing::debug!(
            marketplace = %marketplace,
            base_url = %config.base_url(),
            layers = ?layers,
            "Built client pipeline"
        );

        Ok(Executor {
            base_url: config.base_url().clone(),
            marketplace,
            default_headers: default_headers(config, marketplace)?,
            layers,
            rate_limiter,
            chain,
        })
    }
}

fn default_headers(
    config: &ClientConfig,
    marketplace: MarketplaceTag,
) -> Result<HeaderMap, ConfigError> {
    let mut headers = HeaderMap::new();

    let user_agent =
        HeaderValue::from_str(&config.user_agent()).map_err(|_| ConfigError::InvalidHeader {
            name: USER_AGENT.to_string(),
        })?;
    headers.insert(USER_AGENT, user_agent);
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    if marketplace == MarketplaceTag::Ebay {
        headers.insert(
            HeaderName::from_static("x-ebay-c-marketplace-id"),
            HeaderValue::from_static(EBAY_DEFAULT_MARKETPLACE_ID),
        );
    }

    merge_headers(&mut headers, config.default_headers());
    Ok(headers)
}

/// Replaces every header named in `overrides`, keeping all of its values.
fn merge_headers(target: &mut HeaderMap, overrides: &HeaderMap) {
    for name in overrides.keys() {
        target.remove(name);
    }
    for (name, value) in overrides {
        target.append(name.clone(), value.clone());
    }
}

/// Sends requests through an assembled middleware chain.
///
/// # Thread Safety
///
/// `Executor` is `Clone`, `Send`, and `Sync`. Clones share the chain and
/// the rate limiter.
#[derive(Clone)]
pub struct Executor {
    base_url: BaseUrl,
    marketplace: MarketplaceTag,
    default_headers: HeaderMap,
    layers: Vec<String>,
    rate_limiter: Arc<RateLimiter>,
    chain: Arc<dyn Handler>,
}

// Verify Executor is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Executor>();
};

impl Executor {
    /// Sends one logical request.
    ///
    /// `path` is joined onto the base URL; an absolute URL must share the
    /// base URL's origin. Per-request `headers` replace
    /// default headers of the same name. Any HTTP status is returned as
    /// `Ok`; see [`ClientError`] for the failures.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if authentication fails, the rate limiter
    /// denies the request, retries run out, or the transport fails.
    pub async fn execute(
        &self,
        method: HttpMethod,
        path: &str,
        query: Vec<(String, String)>,
        headers: HeaderMap,
        body: Option<Bytes>,
    ) -> Result<ResponseOutcome, ClientError> {
        let url = self.base_url.join(path).map_err(|e| {
            TransportError::new(
                TransportErrorKind::Other,
                format!("invalid URL for path '{path}': {e}"),
            )
        })?;
        if !self.base_url.is_same_origin(&url) {
            tracing::warn!(
                marketplace = %self.marketplace,
                base_url = %self.base_url,
                url = %url,
                "Refusing request outside the base URL origin"
            );
            return Err(TransportError::new(
                TransportErrorKind::Other,
                format!("URL '{url}' is outside the base URL origin '{}'", self.base_url),
            )
            .into());
        }
        let operation = OperationKey::resolve(self.marketplace, url.path());

        let mut merged = self.default_headers.clone();
        merge_headers(&mut merged, &headers);

        let request = RequestContext::new(method, url, operation)
            .headers(merged)
            .query(query)
            .body(body);
        self.chain.handle(request).await
    }

    /// Sends a request built with [`ApiRequest::builder`].
    ///
    /// # Errors
    ///
    /// See [`Executor::execute`].
    pub async fn send(&self, request: ApiRequest) -> Result<ResponseOutcome, ClientError> {
        let ApiRequest {
            method,
            path,
            query,
            headers,
            body,
        } = request;
        self.execute(method, &path, query, headers, body).await
    }

    /// Returns the marketplace this executor talks to.
    #[must_use]
    pub const fn marketplace(&self) -> MarketplaceTag {
        self.marketplace
    }

    /// Returns the base URL.
    #[must_use]
    pub const fn base_url(&self) -> &BaseUrl {
        &self.base_url
    }

    /// Returns the middleware names from outermost to innermost.
    #[must_use]
    pub fn layers(&self) -> &[String] {
        &self.layers
    }

    /// Returns the headers added to every request.
    #[must_use]
    pub const fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }

    /// Returns the rate limiter used by this executor.
    #[must_use]
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("base_url", &self.base_url.as_ref())
            .field("marketplace", &self.marketplace)
            .field("layers", &self.layers)
            .finish_non_exhaustive()
    }
}
