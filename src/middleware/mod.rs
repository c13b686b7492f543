//! The middleware chain wrapped around the transport.
//!
//! Every enabled [`Middleware`] becomes one [`Handler`] that does its
//! pre-call work, awaits the handler it wraps, then does its post-call work.
//! Layers are ordered by descending priority: the highest priority is the
//! outermost wrapper and sees the request first and the response last.
//!
//! | Middleware      | Names                        | Priority |
//! |-----------------|------------------------------|----------|
//! | Retry           | `retry`                      | 400      |
//! | Auth            | `auth`, `oauth_1a`, `oauth_2` | 300      |
//! | Rate limiting   | `rate_limiting`              | 200      |
//! | Logging         | `logging`                    | 100      |
//!
//! Retry is outermost, so each attempt is re-signed, re-admitted by the rate
//! limiter and logged on its own.
//!
//! Middleware names are resolved through a [`MiddlewareRegistry`]. The
//! default registry knows the built-in names; applications add their own
//! layers with [`MiddlewareRegistry::register`].

mod auth;
mod logging;
mod rate_limit;
mod retry;

pub use auth::AuthScheme;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::auth::AuthConfig;
use crate::clients::{ClientError, RequestContext, ResponseOutcome, Transport};
use crate::config::MarketplaceTag;
use crate::error::ConfigError;
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;

/// Priority of the retry middleware.
pub const RETRY_PRIORITY: i32 = 400;
/// Priority of the auth middleware.
pub const AUTH_PRIORITY: i32 = 300;
/// Priority of the rate limiting middleware.
pub const RATE_LIMIT_PRIORITY: i32 = 200;
/// Priority of the logging middleware.
pub const LOGGING_PRIORITY: i32 = 100;

/// One stage of the chain: either a middleware layer or the transport.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handles one request and returns the outcome.
    async fn handle(&self, request: RequestContext) -> Result<ResponseOutcome, ClientError>;
}

/// Wraps a handler with application-defined behaviour.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use marketplace_http::clients::{ClientError, RequestContext, ResponseOutcome};
/// use marketplace_http::middleware::{Handler, Layer, Middleware, MiddlewareRegistry};
/// use reqwest::header::{HeaderName, HeaderValue};
/// use std::sync::Arc;
///
/// struct CorrelationId;
///
/// struct CorrelationIdHandler(Arc<dyn Handler>);
///
/// #[async_trait]
/// impl Handler for CorrelationIdHandler {
///     async fn handle(&self, request: RequestContext) -> Result<ResponseOutcome, ClientError> {
///         let request = request.with_header(
///             HeaderName::from_static("x-correlation-id"),
///             HeaderValue::from_static("batch-42"),
///         );
///         self.0.handle(request).await
///     }
/// }
///
/// impl Layer for CorrelationId {
///     fn wrap(&self, inner: Arc<dyn Handler>) -> Arc<dyn Handler> {
///         Arc::new(CorrelationIdHandler(inner))
///     }
/// }
///
/// let mut registry = MiddlewareRegistry::default();
/// registry.register("correlation_id", || {
///     Middleware::custom("correlation_id", 350, Arc::new(CorrelationId))
/// });
/// assert!(registry.contains("correlation_id"));
/// ```
pub trait Layer: Send + Sync {
    /// Returns a handler that wraps `inner`.
    fn wrap(&self, inner: Arc<dyn Handler>) -> Arc<dyn Handler>;
}

/// A middleware entry in the chain.
#[derive(Clone)]
pub enum Middleware {
    /// Request/response logging through `tracing`.
    Logging,
    /// Client-side admission control.
    RateLimit,
    /// Retries with exponential backoff.
    Retry,
    /// Attaches credentials to each attempt.
    Auth(AuthScheme),
    /// An application-defined layer.
    Custom {
        /// The registered name.
        name: String,
        /// Position in the chain; higher is further out.
        priority: i32,
        /// Builds the handler.
        layer: Arc<dyn Layer>,
    },
}

impl Middleware {
    /// Creates a custom middleware entry.
    #[must_use]
    pub fn custom(name: impl Into<String>, priority: i32, layer: Arc<dyn Layer>) -> Self {
        Self::Custom {
            name: name.into(),
            priority,
            layer,
        }
    }

    /// Returns the configuration name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Logging => "logging",
            Self::RateLimit => "rate_limiting",
            Self::Retry => "retry",
            Self::Auth(scheme) => scheme.name(),
            Self::Custom { name, .. } => name,
        }
    }

    /// Returns the chain priority.
    #[must_use]
    pub const fn priority(&self) -> i32 {
        match self {
            Self::Logging => LOGGING_PRIORITY,
            Self::RateLimit => RATE_LIMIT_PRIORITY,
            Self::Retry => RETRY_PRIORITY,
            Self::Auth(_) => AUTH_PRIORITY,
            Self::Custom { priority, .. } => *priority,
        }
    }

    fn wrap(
        &self,
        context: &ChainContext,
        inner: Arc<dyn Handler>,
    ) -> Result<Arc<dyn Handler>, ConfigError> {
        Ok(match self {
            Self::Logging => Arc::new(logging::LoggingHandler::new(
                inner,
                context.marketplace,
                context.sensitive_headers(),
            )),
            Self::RateLimit => Arc::new(rate_limit::RateLimitHandler::new(
                inner,
                context.marketplace,
                Arc::clone(&context.rate_limiter),
            )),
            Self::Retry => Arc::new(retry::RetryHandler::new(
                inner,
                context.marketplace,
                context.retry.clone(),
            )),
            Self::Auth(scheme) => {
                let auth = scheme.accept(context.auth.as_ref())?;
                Arc::new(auth::AuthHandler::new(inner, context.marketplace, auth))
            }
            Self::Custom { layer, .. } => layer.wrap(inner),
        })
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware")
            .field("name", &self.name())
            .field("priority", &self.priority())
            .finish()
    }
}

type Factory = Arc<dyn Fn() -> Middleware + Send + Sync>;

/// Maps middleware names to the entries they create.
///
/// Passed explicitly to
/// [`Pipeline::build_with`](crate::clients::Pipeline::build_with); there is
/// no process-wide registry.
#[derive(Clone)]
pub struct MiddlewareRegistry {
    factories: HashMap<String, Factory>,
}

impl Default for MiddlewareRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("logging", || Middleware::Logging);
        registry.register("rate_limiting", || Middleware::RateLimit);
        registry.register("retry", || Middleware::Retry);
        registry.register("auth", || Middleware::Auth(AuthScheme::Any));
        registry.register("oauth_1a", || Middleware::Auth(AuthScheme::OAuth1a));
        registry.register("oauth_2", || Middleware::Auth(AuthScheme::OAuth2));
        registry
    }
}

impl MiddlewareRegistry {
    /// Creates a registry without any names.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registers `name`, replacing any previous factory for it.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Middleware + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Returns `true` if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Creates the middleware registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownMiddleware`] if nothing is registered
    /// under `name`.
    pub fn resolve(&self, name: &str) -> Result<Middleware, ConfigError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| ConfigError::UnknownMiddleware {
                name: name.to_string(),
            })
    }
}

impl fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("MiddlewareRegistry")
            .field("names", &names)
            .finish()
    }
}

/// Everything the built-in layers need from the pipeline configuration.
pub(crate) struct ChainContext {
    pub(crate) marketplace: MarketplaceTag,
    pub(crate) auth: Option<AuthConfig>,
    pub(crate) rate_limiter: Arc<RateLimiter>,
    pub(crate) retry: RetryPolicy,
}

impl ChainContext {
    fn sensitive_headers(&self) -> Vec<String> {
        let mut headers = vec![
            "authorization".to_string(),
            "x-amz-access-token".to_string(),
        ];
        if let Some(AuthConfig::ApiKey { header, .. }) = &self.auth {
            headers.push(header.to_ascii_lowercase());
        }
        headers
    }
}

/// Sorts `middleware` outermost-first.
///
/// The sort is stable, so equal priorities keep their configured order.
pub(crate) fn arrange(mut middleware: Vec<Middleware>) -> Vec<Middleware> {
    middleware.sort_by_key(|m| std::cmp::Reverse(m.priority()));
    middleware
}

/// Wraps `innermost` with every entry of `arranged`, last entry first.
pub(crate) fn assemble(
    arranged: &[Middleware],
    context: &ChainContext,
    innermost: Arc<dyn Handler>,
) -> Result<Arc<dyn Handler>, ConfigError> {
    arranged
        .iter()
        .rev()
        .try_fold(innermost, |inner, middleware| middleware.wrap(context, inner))
}

/// Adapts a [`Transport`] to the innermost [`Handler`].
pub(crate) struct TransportHandler {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl TransportHandler {
    pub(crate) fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }
}

#[async_trait]
impl Handler for TransportHandler {
    async fn handle(&self, request: RequestContext) -> Result<ResponseOutcome, ClientError> {
        Ok(self.transport.execute(&request, self.timeout).await?)
    }
}
