//! Attaches credentials to every attempt.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION};

use crate::auth::{oauth1, AuthConfig, AuthenticationError};
use crate::clients::{ClientError, RequestContext, ResponseOutcome};
use crate::config::MarketplaceTag;
use crate::error::ConfigError;
use crate::middleware::Handler;

/// Header Amazon SP-API expects the LWA access token in.
const AMAZON_ACCESS_TOKEN: &str = "x-amz-access-token";

/// Which credentials an auth middleware name accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthScheme {
    /// `auth`: whatever credentials are configured.
    Any,
    /// `oauth_1a`: OAuth 1.0a signing only.
    OAuth1a,
    /// `oauth_2`: OAuth 2.0 token providers only.
    OAuth2,
}

impl AuthScheme {
    /// Returns the configuration name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Any => "auth",
            Self::OAuth1a => "oauth_1a",
            Self::OAuth2 => "oauth_2",
        }
    }

    const fn expected(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::OAuth1a => "OAuth 1.0a",
            Self::OAuth2 => "OAuth 2.0",
        }
    }

    /// Checks the configured credentials against this scheme.
    pub(crate) fn accept(self, auth: Option<&AuthConfig>) -> Result<AuthConfig, ConfigError> {
        let mismatch = |configured| ConfigError::UnsupportedAuthType {
            middleware: self.name().to_string(),
            expected: self.expected(),
            configured,
        };

        match (self, auth) {
            (_, None) => Err(mismatch("none")),
            (Self::Any, Some(auth))
            | (Self::OAuth1a, Some(auth @ AuthConfig::OAuth1a(_)))
            | (Self::OAuth2, Some(auth @ AuthConfig::OAuth2(_))) => Ok(auth.clone()),
            (_, Some(other)) => Err(mismatch(other.kind())),
        }
    }
}

pub(crate) struct AuthHandler {
    inner: Arc<dyn Handler>,
    marketplace: MarketplaceTag,
    auth: AuthConfig,
}

impl AuthHandler {
    pub(crate) fn new(
        inner: Arc<dyn Handler>,
        marketplace: MarketplaceTag,
        auth: AuthConfig,
    ) -> Self {
        Self {
            inner,
            marketplace,
            auth,
        }
    }

    async fn authenticate(
        &self,
        request: &RequestContext,
    ) -> Result<RequestContext, AuthenticationError> {
        match &self.auth {
            AuthConfig::Bearer(token) => self.bearer(request, token),
            AuthConfig::OAuth2(provider) => {
                let token = provider.access_token().await?;
                self.bearer(request, &token)
            }
            AuthConfig::ApiKey { header, value } => {
                let name = HeaderName::from_bytes(header.as_bytes()).map_err(|_| {
                    AuthenticationError::InvalidHeaderValue {
                        header: header.clone(),
                    }
                })?;
                Ok(request.with_header(name, header_value(header, value)?))
            }
            AuthConfig::Basic { username, password } => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{username}:{password}"));
                let value = header_value(AUTHORIZATION.as_str(), &format!("Basic {encoded}"))?;
                Ok(request.with_header(AUTHORIZATION, value))
            }
            AuthConfig::OAuth1a(credentials) => {
                let signed = oauth1::sign(
                    request.method().as_str(),
                    request.url(),
                    request.query_params(),
                    credentials,
                )?;
                let value = header_value(AUTHORIZATION.as_str(), &signed)?;
                Ok(request.with_header(AUTHORIZATION, value))
            }
        }
    }

    fn bearer(
        &self,
        request: &RequestContext,
        token: &str,
    ) -> Result<RequestContext, AuthenticationError> {
        if self.marketplace == MarketplaceTag::Amazon {
            let value = header_value(AMAZON_ACCESS_TOKEN, token)?;
            return Ok(request.with_header(HeaderName::from_static(AMAZON_ACCESS_TOKEN), value));
        }
        let value = header_value(AUTHORIZATION.as_str(), &format!("Bearer {token}"))?;
        Ok(request.with_header(AUTHORIZATION, value))
    }
}

fn header_value(header: &str, value: &str) -> Result<HeaderValue, AuthenticationError> {
    let mut value =
        HeaderValue::from_str(value).map_err(|_| AuthenticationError::InvalidHeaderValue {
            header: header.to_string(),
        })?;
    value.set_sensitive(true);
    Ok(value)
}

#[async_trait]
impl Handler for AuthHandler {
    async fn handle(&self, request: RequestContext) -> Result<ResponseOutcome, ClientError> {
        let request = self.authenticate(&request).await.map_err(|error| {
            tracing::warn!(
                marketplace = %self.marketplace,
                operation = %request.operation(),
                auth = self.auth.kind(),
                error = %error,
                "Failed to authenticate request"
            );
            error
        })?;
        self.inner.handle(request).await
    }
}
