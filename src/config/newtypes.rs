//! Validated newtype wrappers for configuration values.
//!
//! This module provides type-safe wrappers around string values that validate
//! their contents on construction. Invalid values are rejected with clear error messages.

use crate::error::ConfigError;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use url::Url;

/// A validated base URL for a marketplace API.
///
/// The URL must be absolute, use the `http` or `https` scheme and carry a
/// host. A trailing slash on the path is ignored when request paths are
/// joined onto it.
///
/// # Example
///
/// ```rust
/// use marketplace_http::BaseUrl;
///
/// let base = BaseUrl::new("https://api.discogs.com").unwrap();
/// assert_eq!(base.host(), "api.discogs.com");
///
/// let url = base.join("/database/search?q=nirvana").unwrap();
/// assert_eq!(url.as_str(), "https://api.discogs.com/database/search?q=nirvana");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BaseUrl(Url);

impl BaseUrl {
    /// Creates a new validated base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] if the URL cannot be parsed,
    /// is not http(s), or has no host.
    pub fn new(url: impl Into<String>) -> Result<Self, ConfigError> {
        let raw = url.into();
        let invalid = || ConfigError::InvalidBaseUrl { url: raw.clone() };

        let parsed = Url::parse(&raw).map_err(|_| invalid())?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid());
        }
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(invalid());
        }

        Ok(Self(parsed))
    }

    /// Returns the host name of the base URL.
    #[must_use]
    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or_default()
    }

    /// Returns the underlying URL.
    #[must_use]
    pub const fn as_url(&self) -> &Url {
        &self.0
    }

    /// Joins a request path (optionally carrying a query string) onto the base URL.
    ///
    /// Unlike [`Url::join`], the base path is always preserved, so a base of
    /// `https://sellingpartnerapi-na.amazon.com/v1` joined with `orders`
    /// yields `https://sellingpartnerapi-na.amazon.com/v1/orders`. An
    /// absolute `http(s)://` path is parsed as-is; check it with
    /// [`BaseUrl::is_same_origin`] before sending credentials to it.
    ///
    /// # Errors
    ///
    /// Returns [`url::ParseError`] if the joined URL is malformed.
    pub fn join(&self, path: &str) -> Result<Url, url::ParseError> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Url::parse(path);
        }

        let mut base = self.0.clone();
        base.set_query(None);
        base.set_fragment(None);

        let prefix = base.as_str().trim_end_matches('/');
        let suffix = path.trim_start_matches('/');
        if suffix.is_empty() {
            return Url::parse(prefix);
        }
        Url::parse(&format!("{prefix}/{suffix}"))
    }
}

impl BaseUrl {
    /// Returns `true` if `url` has the same scheme, host and port as the base URL.
    #[must_use]
    pub fn is_same_origin(&self, url: &Url) -> bool {
        self.0.origin() == url.origin()
    }
}

impl AsRef<str> for BaseUrl {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for BaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl Serialize for BaseUrl {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.as_str())
    }
}

impl<'de> Deserialize<'de> for BaseUrl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(de::Error::custom)
    }
}
