//! HTTP response types for the marketplace client.
//!
//! This module provides the [`ResponseOutcome`] returned by the transport and
//! [`RateLimitTelemetry`], the marketplace rate limit headers parsed from it.

use std::borrow::Cow;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;

use crate::config::MarketplaceTag;

/// Request ID headers, checked in order.
const REQUEST_ID_HEADERS: [&str; 3] = ["x-amzn-requestid", "x-ebay-c-request-id", "x-request-id"];

/// The result of one HTTP exchange.
///
/// Every status the server returns, including 4xx and 5xx, is a normal
/// outcome. Only failures to obtain any response are errors.
#[derive(Clone, Debug)]
pub struct ResponseOutcome {
    /// The HTTP status code.
    pub status: u16,
    /// Response headers (headers may have multiple values).
    pub headers: HeaderMap,
    /// The raw response body.
    pub body: Bytes,
    /// Time from sending the request to receiving the full body.
    pub elapsed: Duration,
}

impl ResponseOutcome {
    /// Creates a new outcome.
    #[must_use]
    pub const fn new(status: u16, headers: HeaderMap, body: Bytes, elapsed: Duration) -> Self {
        Self {
            status,
            headers,
            body,
            elapsed,
        }
    }

    /// Returns `true` for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status <= 299
    }

    /// Returns the first value of a header, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns every value of a header.
    #[must_use]
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    /// Returns the request ID assigned by the marketplace, if any.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        REQUEST_ID_HEADERS.iter().find_map(|name| self.header(name))
    }

    /// Parses the `Retry-After` header (delta-seconds or HTTP-date).
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        parse_retry_after(&self.headers)
    }

    /// Returns the body as text, replacing invalid UTF-8.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Deserializes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Rate limit telemetry advertised by a marketplace in response headers.
///
/// This is observability data: the limiter logs and records it but keeps
/// its own scheduled state.
///
/// # Example
///
/// ```rust
/// use marketplace_http::clients::RateLimitTelemetry;
/// use marketplace_http::MarketplaceTag;
/// use reqwest::header::{HeaderMap, HeaderValue};
///
/// let mut headers = HeaderMap::new();
/// headers.insert("x-discogs-ratelimit", HeaderValue::from_static("60"));
/// headers.insert("x-discogs-ratelimit-remaining", HeaderValue::from_static("42"));
///
/// let telemetry = RateLimitTelemetry::from_headers(MarketplaceTag::Discogs, &headers);
/// assert_eq!(telemetry.limit, Some(60.0));
/// assert_eq!(telemetry.remaining, Some(42.0));
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RateLimitTelemetry {
    /// Advertised limit (requests per second for Amazon, per window elsewhere).
    pub limit: Option<f64>,
    /// Requests remaining in the current window.
    pub remaining: Option<f64>,
    /// Server-requested wait before the next request.
    pub retry_after: Option<Duration>,
}

impl RateLimitTelemetry {
    /// Parses marketplace-specific headers, falling back to the generic
    /// `x-ratelimit-*` pair.
    #[must_use]
    pub fn from_headers(marketplace: MarketplaceTag, headers: &HeaderMap) -> Self {
        let (limit_header, remaining_header) = match marketplace {
            MarketplaceTag::Amazon => (
                Some("x-amzn-ratelimit-limit"),
                Some("x-amzn-ratelimit-remaining"),
            ),
            MarketplaceTag::Ebay => (None, Some("x-ebay-api-analytics-daily-remaining")),
            MarketplaceTag::Discogs => (
                Some("x-discogs-ratelimit"),
                Some("x-discogs-ratelimit-remaining"),
            ),
            MarketplaceTag::Bandcamp | MarketplaceTag::General => (None, None),
        };

        let limit = limit_header
            .and_then(|name| header_number(headers, name))
            .or_else(|| header_number(headers, "x-ratelimit-limit"));
        let remaining = remaining_header
            .and_then(|name| header_number(headers, name))
            .or_else(|| header_number(headers, "x-ratelimit-remaining"));

        Self {
            limit,
            remaining,
            retry_after: parse_retry_after(headers),
        }
    }

    /// Returns `true` if no telemetry header was present.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.limit.is_none() && self.remaining.is_none() && self.retry_after.is_none()
    }
}

fn header_number(headers: &HeaderMap, name: &str) -> Option<f64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?.trim();

    if let Ok(seconds) = value.parse::<f64>() {
        return (seconds.is_finite() && seconds >= 0.0).then(|| Duration::from_secs_f64(seconds));
    }

    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}
