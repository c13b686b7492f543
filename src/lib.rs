//! # Marketplace HTTP
//!
//! A middleware-chained HTTP client pipeline for marketplace APIs (Amazon
//! SP-API, eBay, Discogs, Bandcamp) with per-marketplace authentication,
//! rate limiting, retry and logging.
//!
//! ## Overview
//!
//! This crate provides:
//! - Type-safe configuration via [`ClientConfig`] and [`ClientConfigBuilder`]
//! - A [`Pipeline`](clients::Pipeline) that wraps a transport with the
//!   configured middleware and returns an [`Executor`](clients::Executor)
//! - OAuth 1.0a request signing via [`auth::oauth1`]
//! - OAuth 2.0 token providers via [`auth::oauth2`]
//! - Per-operation client-side rate limiting via [`rate_limit`]
//! - Exponential backoff retry via [`RetryPolicy`]
//!
//! ## Quick Start
//!
//! ```rust
//! use marketplace_http::{BaseUrl, ClientConfig, MarketplaceTag};
//!
//! let config = ClientConfig::builder()
//!     .base_url(BaseUrl::new("https://api.ebay.com").unwrap())
//!     .middleware(["logging", "rate_limiting", "retry"])
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.marketplace(), MarketplaceTag::Ebay);
//! ```
//!
//! ## Making API Requests
//!
//! ```rust,ignore
//! use marketplace_http::auth::{AuthConfig, RefreshingTokenProvider};
//! use marketplace_http::clients::{ApiRequest, HttpMethod, Pipeline};
//! use marketplace_http::{BaseUrl, ClientConfig};
//! use std::sync::Arc;
//!
//! let provider = RefreshingTokenProvider::new(
//!     "https://api.amazon.com/auth/o2/token".parse()?,
//!     "amzn1.application-oa2-client.xxx",
//!     "client-secret",
//!     "Atzr|refresh-token",
//! );
//!
//! let config = ClientConfig::builder()
//!     .base_url(BaseUrl::new("https://sellingpartnerapi-na.amazon.com")?)
//!     .middleware(["retry", "oauth_2", "rate_limiting", "logging"])
//!     .auth(AuthConfig::OAuth2(Arc::new(provider)))
//!     .build()?;
//!
//! let executor = Pipeline::build(&config)?;
//! let request = ApiRequest::builder(HttpMethod::Get, "/orders/v0/orders")
//!     .query_param("MarketplaceIds", "ATVPDKIKX0DER")
//!     .build()?;
//! let response = executor.send(request).await?;
//! ```
//!
//! ## Logging
//!
//! The crate emits `tracing` events and never installs a subscriber.
//! Credential headers are redacted by the logging middleware.
//!
//! ## Design Principles
//!
//! - **No global state**: Configuration and the middleware registry are
//!   passed explicitly
//! - **Fail-fast validation**: Configuration errors surface when the
//!   pipeline is built, never at request time
//! - **Thread-safe**: All public types are `Send + Sync`
//! - **Async-first**: Designed for use with Tokio async runtime

pub mod auth;
pub mod clients;
pub mod config;
pub mod error;
pub mod middleware;
pub mod rate_limit;
pub mod retry;

// Re-export public types at crate root for convenience
pub use config::{BaseUrl, ClientConfig, ClientConfigBuilder, MarketplaceTag, OperationKey};
pub use error::ConfigError;
pub use retry::RetryPolicy;

// Re-export pipeline types
pub use clients::{
    ApiRequest, ClientError, Executor, HttpMethod, Pipeline, RateLimitExceededError,
    ResponseOutcome, RetryExhaustedError,
};

pub use auth::{AuthConfig, AuthenticationError};
pub use rate_limit::{RateLimitPolicy, RateLimiter};
