//! Authentication types for marketplace APIs.
//!
//! This module provides the credential configurations supported by the auth
//! middleware and the signing/token machinery behind them.
//!
//! # Overview
//!
//! - [`AuthConfig`]: The credential set a pipeline authenticates with
//! - [`oauth1`]: OAuth 1.0a request signing (Discogs, Bandcamp)
//! - [`oauth2`]: OAuth 2.0 token providers (Amazon SP-API via Login with Amazon, eBay)
//! - [`AuthenticationError`]: Errors raised while authenticating a request
//!
//! # Example
//!
//! ```rust
//! use marketplace_http::auth::{AuthConfig, oauth1::OAuth1aCredentials};
//!
//! let auth = AuthConfig::OAuth1a(OAuth1aCredentials::new("ck", "cs", "tk", "ts"));
//! assert_eq!(auth.kind(), "OAuth 1.0a");
//! ```

mod error;
pub mod oauth1;
pub mod oauth2;

pub use error::AuthenticationError;
pub use oauth1::OAuth1aCredentials;
pub use oauth2::{RefreshingTokenProvider, StaticTokenProvider, TokenProvider};

use std::fmt;
use std::sync::Arc;

/// Credentials attached to outgoing requests by the auth middleware.
#[derive(Clone)]
pub enum AuthConfig {
    /// A static bearer token.
    ///
    /// Amazon SP-API receives it as `x-amz-access-token`; every other
    /// marketplace as `Authorization: Bearer <token>`.
    Bearer(String),

    /// An API key sent in a named header.
    ApiKey {
        /// The header carrying the key (e.g. `X-Api-Key`).
        header: String,
        /// The key itself.
        value: String,
    },

    /// HTTP basic authentication.
    Basic {
        /// The user name.
        username: String,
        /// The password.
        password: String,
    },

    /// OAuth 1.0a request signing.
    OAuth1a(OAuth1aCredentials),

    /// OAuth 2.0 bearer tokens from a provider.
    OAuth2(Arc<dyn TokenProvider>),
}

impl AuthConfig {
    /// Returns a human readable name for the credential kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Bearer(_) => "bearer",
            Self::ApiKey { .. } => "API key",
            Self::Basic { .. } => "basic",
            Self::OAuth1a(_) => "OAuth 1.0a",
            Self::OAuth2(_) => "OAuth 2.0",
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("Bearer(*****)"),
            Self::ApiKey { header, .. } => f
                .debug_struct("ApiKey")
                .field("header", header)
                .field("value", &"*****")
                .finish(),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"*****")
                .finish(),
            Self::OAuth1a(credentials) => f.debug_tuple("OAuth1a").field(credentials).finish(),
            Self::OAuth2(_) => f.write_str("OAuth2(<token provider>)"),
        }
    }
}
