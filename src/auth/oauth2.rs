//! OAuth 2.0 access token providers.
//!
//! The auth middleware asks a [`TokenProvider`] for a bearer token on every
//! request. Two providers ship with the crate:
//!
//! - [`StaticTokenProvider`]: a fixed token (useful for tests and short-lived scripts)
//! - [`RefreshingTokenProvider`]: stores an expiring token and exchanges the
//!   refresh token at the token endpoint once it expires
//!
//! # Token Refresh Flow
//!
//! 1. The provider is seeded with an access token, its expiry and a refresh token
//! 2. While the access token is valid (with a 60 second safety margin) it is returned as-is
//! 3. Once expired, a `grant_type=refresh_token` form POST is sent to the token URL
//! 4. The new access token (and refresh token, if rotated) replaces the stored one
//!
//! Concurrent callers share one refresh: the state lock is held across the
//! token request, which is bounded by [`RefreshingTokenProvider::with_timeout`]
//! (30 seconds by default).
//!
//! # Example
//!
//! ```rust,ignore
//! use marketplace_http::auth::oauth2::RefreshingTokenProvider;
//!
//! // Login with Amazon token endpoint for SP-API
//! let provider = RefreshingTokenProvider::new(
//!     "https://api.amazon.com/auth/o2/token".parse()?,
//!     "amzn1.application-oa2-client.xxx",
//!     "client-secret",
//!     "Atzr|refresh-token",
//! );
//! let token = provider.access_token().await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration as StdDuration;
use tokio::sync::Mutex;
use url::Url;

use crate::auth::AuthenticationError;

/// Grant type for refresh token requests.
const REFRESH_TOKEN_GRANT_TYPE: &str = "refresh_token";

/// Tokens expiring within this many seconds are refreshed early.
const EXPIRY_SKEW_SECONDS: i64 = 60;

/// Deadline for one token endpoint request.
pub const DEFAULT_REFRESH_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// Supplies bearer tokens to the auth middleware.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a currently valid access token.
    async fn access_token(&self) -> Result<String, AuthenticationError>;
}

/// A provider that always returns the same token.
#[derive(Clone)]
pub struct StaticTokenProvider(String);

impl StaticTokenProvider {
    /// Creates a provider for a fixed token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticTokenProvider(*****)")
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String, AuthenticationError> {
        if self.0.is_empty() {
            return Err(AuthenticationError::InvalidCredentials {
                reason: "access token cannot be empty".to_string(),
            });
        }
        Ok(self.0.clone())
    }
}

/// Request body for token refresh.
#[derive(Debug, Serialize)]
struct TokenRefreshRequest<'a> {
    grant_type: &'a str,
    refresh_token: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
}

/// Successful token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug)]
struct TokenState {
    access_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    refresh_token: Option<String>,
}

impl TokenState {
    fn valid_token(&self, now: DateTime<Utc>) -> Option<&str> {
        let token = self.access_token.as_deref()?;
        match self.expires_at {
            Some(expires_at) if expires_at - Duration::seconds(EXPIRY_SKEW_SECONDS) <= now => None,
            _ => Some(token),
        }
    }
}

/// An OAuth 2.0 provider that refreshes its access token when it expires.
pub struct RefreshingTokenProvider {
    client: reqwest::Client,
    token_url: Url,
    client_id: String,
    client_secret: String,
    timeout: StdDuration,
    state: Mutex<TokenState>,
}

impl RefreshingTokenProvider {
    /// Creates a provider holding only a refresh token.
    ///
    /// The first call to [`TokenProvider::access_token`] performs a refresh.
    #[must_use]
    pub fn new(
        token_url: Url,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_url,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            timeout: DEFAULT_REFRESH_TIMEOUT,
            state: Mutex::new(TokenState {
                access_token: None,
                expires_at: None,
                refresh_token: Some(refresh_token.into()),
            }),
        }
    }

    /// Seeds the provider with an access token that is still in use.
    #[must_use]
    pub fn with_access_token(
        self,
        access_token: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        let Self {
            client,
            token_url,
            client_id,
            client_secret,
            timeout,
            state,
        } = self;

        let mut state = state.into_inner();
        state.access_token = Some(access_token.into());
        state.expires_at = expires_at;

        Self {
            client,
            token_url,
            client_id,
            client_secret,
            timeout,
            state: Mutex::new(state),
        }
    }

    /// Sets the deadline for each token endpoint request.
    ///
    /// Callers waiting on a refresh are released with
    /// [`AuthenticationError::TokenRefreshFailed`] once it passes.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: StdDuration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the current expiry, if known.
    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.expires_at
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthenticationError> {
        let request_body = TokenRefreshRequest {
            grant_type: REFRESH_TOKEN_GRANT_TYPE,
            refresh_token,
            client_id: &self.client_id,
            client_secret: &self.client_secret,
        };

        let response = self
            .client
            .post(self.token_url.clone())
            .timeout(self.timeout)
            .form(&request_body)
            .send()
            .await
            .map_err(|e| self.network_failure(&e))?;

        let status = response.status().as_u16();

        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(AuthenticationError::TokenRefreshFailed {
                status,
                message: error_body,
            });
        }

        let body = response.bytes().await.map_err(|e| self.network_failure(&e))?;
        serde_json::from_slice(&body).map_err(|e| AuthenticationError::TokenRefreshFailed {
            status,
            message: format!("Failed to parse token response: {e}"),
        })
    }

    fn network_failure(&self, error: &reqwest::Error) -> AuthenticationError {
        let message = if error.is_timeout() {
            format!("Token request timed out after {}ms", self.timeout.as_millis())
        } else {
            format!("Network error: {error}")
        };
        AuthenticationError::TokenRefreshFailed { status: 0, message }
    }
}

impl fmt::Debug for RefreshingTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshingTokenProvider")
            .field("token_url", &self.token_url.as_str())
            .field("client_id", &self.client_id)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenProvider for RefreshingTokenProvider {
    async fn access_token(&self) -> Result<String, AuthenticationError> {
        let mut state = self.state.lock().await;

        if let Some(token) = state.valid_token(Utc::now()) {
            return Ok(token.to_string());
        }

        let refresh_token = state
            .refresh_token
            .clone()
            .ok_or(AuthenticationError::TokenExpired)?;

        tracing::debug!(token_url = %self.token_url, "Refreshing OAuth 2.0 access token");
        let response = self.refresh(&refresh_token).await?;

        state.expires_at = response
            .expires_in
            .map(|seconds| Utc::now() + Duration::seconds(seconds));
        if let Some(rotated) = response.refresh_token {
            state.refresh_token = Some(rotated);
        }
        state.access_token = Some(response.access_token.clone());

        Ok(response.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_state_valid_without_expiry() {
        let state = TokenState {
            access_token: Some("token".to_string()),
            expires_at: None,
            refresh_token: None,
        };
        assert_eq!(state.valid_token(Utc::now()), Some("token"));
    }

    #[test]
    fn test_token_state_expires_with_skew() {
        let now = Utc::now();
        let state = TokenState {
            access_token: Some("token".to_string()),
            expires_at: Some(now + Duration::seconds(30)),
            refresh_token: None,
        };
        assert_eq!(state.valid_token(now), None);

        let fresh = TokenState {
            expires_at: Some(now + Duration::seconds(3600)),
            ..state
        };
        assert_eq!(fresh.valid_token(now), Some("token"));
    }

    #[test]
    fn test_static_provider_returns_token() {
        let provider = StaticTokenProvider::new("abc");
        assert_eq!(tokio_test::block_on(provider.access_token()).unwrap(), "abc");
    }

    #[test]
    fn test_static_provider_rejects_empty_token() {
        let provider = StaticTokenProvider::new("");
        assert!(matches!(
            tokio_test::block_on(provider.access_token()),
            Err(AuthenticationError::InvalidCredentials { .. })
        ));
    }

    #[tokio::test]
    async fn test_seeded_token_is_used_without_refresh() {
        let provider = RefreshingTokenProvider::new(
            Url::parse("http://127.0.0.1:9/token").unwrap(),
            "client",
            "secret",
            "refresh",
        )
        .with_access_token("seeded", Some(Utc::now() + Duration::hours(1)));

        assert_eq!(provider.access_token().await.unwrap(), "seeded");
    }

    #[test]
    fn test_refresh_timeout_defaults_and_overrides() {
        let url = Url::parse("https://api.amazon.com/auth/o2/token").unwrap();
        let provider = RefreshingTokenProvider::new(url.clone(), "client", "secret", "refresh");
        assert_eq!(provider.timeout, DEFAULT_REFRESH_TIMEOUT);

        let provider = RefreshingTokenProvider::new(url, "client", "secret", "refresh")
            .with_timeout(StdDuration::from_secs(5))
            .with_access_token("seeded", None);
        assert_eq!(provider.timeout, StdDuration::from_secs(5));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let provider = RefreshingTokenProvider::new(
            Url::parse("https://api.amazon.com/auth/o2/token").unwrap(),
            "client",
            "very-secret",
            "refresh",
        );
        let debug = format!("{provider:?}");
        assert!(debug.contains("client"));
        assert!(!debug.contains("very-secret"));
    }
}
