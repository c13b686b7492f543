//! HTTP client pipeline for marketplace API communication.
//!
//! This module provides the request and response types seen by the
//! middleware chain, the transport abstraction and the [`Pipeline`] that
//! assembles everything into an [`Executor`].
//!
//! # Overview
//!
//! The main types in this module are:
//!
//! - [`Pipeline`]: Builds an [`Executor`] from a [`ClientConfig`](crate::ClientConfig)
//! - [`Executor`]: Sends requests through the middleware chain
//! - [`ApiRequest`]: A request to be sent, built with [`ApiRequest::builder`]
//! - [`RequestContext`]: One attempt as seen by middleware
//! - [`ResponseOutcome`]: The HTTP outcome of a request
//! - [`RateLimitTelemetry`]: Rate limit headers reported by a marketplace
//! - [`Transport`]: The seam to the HTTP stack, implemented by [`ReqwestTransport`]
//! - [`ClientError`]: Errors that prevented an HTTP outcome
//!
//! # Example
//!
//! ```rust,ignore
//! use marketplace_http::clients::{ApiRequest, HttpMethod, Pipeline};
//! use marketplace_http::auth::{AuthConfig, OAuth1aCredentials};
//! use marketplace_http::{BaseUrl, ClientConfig};
//!
//! let config = ClientConfig::builder()
//!     .base_url(BaseUrl::new("https://api.discogs.com")?)
//!     .middleware(["logging", "oauth_1a", "rate_limiting", "retry"])
//!     .auth(AuthConfig::OAuth1a(OAuth1aCredentials::new("ck", "cs", "tk", "ts")))
//!     .build()?;
//!
//! let executor = Pipeline::build(&config)?;
//! let request = ApiRequest::builder(HttpMethod::Get, "/database/search")
//!     .query_param("q", "Nirvana")
//!     .build()?;
//! let response = executor.send(request).await?;
//! ```
//!
//! # Retry Behavior
//!
//! With the `retry` middleware enabled:
//!
//! - **429, 500, 502, 503, 504**: Retried with exponential backoff; a 429's
//!   `Retry-After` is honoured up to the maximum delay
//! - **Timeouts and connection failures**: Retried with exponential backoff
//! - **Other statuses**: Returned immediately as `Ok`
//!
//! When the attempt budget runs out the call fails with
//! [`ClientError::RetryExhausted`].

mod errors;
mod pipeline;
mod request;
mod response;
mod transport;

pub use errors::{
    ClientError, InvalidRequestError, RateLimitExceededError, RetryExhaustedError, RetryFailure,
    TransportError, TransportErrorKind,
};
pub use pipeline::{Executor, Pipeline};
pub use request::{ApiRequest, ApiRequestBuilder, HttpMethod, RequestContext};
pub use response::{RateLimitTelemetry, ResponseOutcome};
pub use transport::{ReqwestTransport, Transport};
