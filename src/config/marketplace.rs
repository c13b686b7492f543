//! Marketplace identification and operation key resolution.
//!
//! A pipeline targets exactly one [`MarketplaceTag`], fixed when the pipeline
//! is built. Every request is then classified into an [`OperationKey`] that
//! partitions rate limit accounting.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies which external marketplace API a pipeline targets.
///
/// The tag selects rate limit defaults, retry defaults and header presets.
///
/// # Example
///
/// ```rust
/// use marketplace_http::MarketplaceTag;
///
/// assert_eq!(MarketplaceTag::from_host("api.discogs.com"), MarketplaceTag::Discogs);
/// assert_eq!(MarketplaceTag::from_host("example.org"), MarketplaceTag::General);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketplaceTag {
    /// Amazon Selling Partner API.
    Amazon,
    /// eBay REST APIs.
    Ebay,
    /// Discogs API.
    Discogs,
    /// Bandcamp API.
    Bandcamp,
    /// Any other host.
    General,
}

impl MarketplaceTag {
    /// Host substrings checked in order when inferring a tag.
    const HOST_PATTERNS: [(&'static str, Self); 4] = [
        ("amazon.com", Self::Amazon),
        ("ebay.com", Self::Ebay),
        ("discogs.com", Self::Discogs),
        ("bandcamp.com", Self::Bandcamp),
    ];

    /// Infers the marketplace from a host name by substring match.
    #[must_use]
    pub fn from_host(host: &str) -> Self {
        let host = host.to_ascii_lowercase();
        Self::HOST_PATTERNS
            .iter()
            .find(|(pattern, _)| host.contains(pattern))
            .map_or(Self::General, |(_, tag)| *tag)
    }

    /// Returns the lowercase tag name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Amazon => "amazon",
            Self::Ebay => "ebay",
            Self::Discogs => "discogs",
            Self::Bandcamp => "bandcamp",
            Self::General => "general",
        }
    }

    /// Path fragments mapped to operation keys; the first match wins.
    const fn operation_table(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Amazon => &[
                ("/orders/v0/orders", "orders"),
                ("/feeds/", "feeds"),
                ("/listings/", "listings"),
                ("/catalog/", "catalog"),
                ("/fba/inventory/", "inventory"),
                ("/reports/", "reports"),
                ("/notifications/", "notifications"),
                ("/tokens/", "tokens"),
            ],
            Self::Ebay => &[
                ("/sell/inventory/", "inventory"),
                ("/sell/fulfillment/", "fulfillment"),
                ("/sell/account/", "account"),
                ("/sell/feed/", "feed"),
                ("/buy/browse/", "browse"),
                ("/commerce/taxonomy/", "taxonomy"),
            ],
            Self::Discogs => &[
                ("/database/search", "search"),
                ("/marketplace/listings", "listings"),
                ("/marketplace/orders", "orders"),
                ("/releases/", "releases"),
                ("/users/", "users"),
            ],
            Self::Bandcamp => &[
                ("/api/sales/", "sales"),
                ("/api/merchorders/", "merch"),
                ("/api/account/", "account"),
                ("/oauth_token", "token"),
            ],
            Self::General => &[],
        }
    }
}

impl fmt::Display for MarketplaceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketplaceTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "amazon" => Ok(Self::Amazon),
            "ebay" => Ok(Self::Ebay),
            "discogs" => Ok(Self::Discogs),
            "bandcamp" => Ok(Self::Bandcamp),
            "general" => Ok(Self::General),
            other => Err(format!("unknown marketplace '{other}'")),
        }
    }
}

/// A short tag derived from a request path that partitions rate limit state.
///
/// # Example
///
/// ```rust
/// use marketplace_http::{MarketplaceTag, OperationKey};
///
/// let key = OperationKey::resolve(MarketplaceTag::Amazon, "/orders/v0/orders/123-456");
/// assert_eq!(key.as_ref(), "orders");
///
/// let key =
///     OperationKey::resolve(MarketplaceTag::Amazon, "/sellers/v1/marketplaceParticipations");
/// assert_eq!(key, OperationKey::general());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationKey(String);

impl OperationKey {
    const GENERAL: &'static str = "general";

    /// Creates an operation key from an arbitrary name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The fallback key used when no table entry matches.
    #[must_use]
    pub fn general() -> Self {
        Self(Self::GENERAL.to_string())
    }

    /// Resolves the operation key for a path under the given marketplace.
    #[must_use]
    pub fn resolve(marketplace: MarketplaceTag, path: &str) -> Self {
        marketplace
            .operation_table()
            .iter()
            .find(|(fragment, _)| path.contains(fragment))
            .map_or_else(Self::general, |(_, key)| Self::new(*key))
    }

    /// Returns `true` for the fallback key.
    #[must_use]
    pub fn is_general(&self) -> bool {
        self.0 == Self::GENERAL
    }
}

impl AsRef<str> for OperationKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}
