//! HTTP request types for the marketplace client.
//!
//! This module provides [`HttpMethod`], the immutable per-attempt
//! [`RequestContext`] that flows through the middleware chain, and the
//! [`ApiRequest`] builder callers use to describe a call.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::clients::errors::InvalidRequestError;
use crate::config::OperationKey;

/// HTTP methods supported by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// HTTP GET.
    Get,
    /// HTTP POST.
    Post,
    /// HTTP PUT.
    Put,
    /// HTTP PATCH.
    Patch,
    /// HTTP DELETE.
    Delete,
    /// HTTP HEAD.
    Head,
    /// HTTP OPTIONS.
    Options,
    /// HTTP TRACE.
    Trace,
}

impl HttpMethod {
    /// Returns the upper-case method token.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
        }
    }

    /// Returns `true` for methods that must not carry a request body.
    #[must_use]
    pub const fn forbids_body(&self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Trace)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = InvalidRequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "TRACE" => Ok(Self::Trace),
            _ => Err(InvalidRequestError::InvalidMethod {
                method: s.to_string(),
            }),
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Self::GET,
            HttpMethod::Post => Self::POST,
            HttpMethod::Put => Self::PUT,
            HttpMethod::Patch => Self::PATCH,
            HttpMethod::Delete => Self::DELETE,
            HttpMethod::Head => Self::HEAD,
            HttpMethod::Options => Self::OPTIONS,
            HttpMethod::Trace => Self::TRACE,
        }
    }
}

/// One outbound call attempt as seen by the middleware chain.
///
/// A context is never mutated in place. Middleware that adds headers derives
/// a new context with [`RequestContext::with_header`].
#[derive(Clone, Debug)]
pub struct RequestContext {
    method: HttpMethod,
    url: Url,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    body: Option<Bytes>,
    operation: OperationKey,
}

impl RequestContext {
    /// Creates a context for `method` on the absolute `url`.
    #[must_use]
    pub fn new(method: HttpMethod, url: Url, operation: OperationKey) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
            operation,
        }
    }

    /// Replaces the headers.
    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Replaces the query parameters.
    #[must_use]
    pub fn query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    /// Replaces the body.
    #[must_use]
    pub fn body(mut self, body: Option<Bytes>) -> Self {
        self.body = body;
        self
    }

    /// Derives a new context with `name` set to `value`, replacing any
    /// previous values for that header.
    #[must_use]
    pub fn with_header(&self, name: HeaderName, value: HeaderValue) -> Self {
        let mut derived = self.clone();
        derived.headers.insert(name, value);
        derived
    }

    /// Returns the HTTP method.
    #[must_use]
    pub const fn method(&self) -> HttpMethod {
        self.method
    }

    /// Returns the URL without the separately supplied query parameters.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the request headers.
    #[must_use]
    pub const fn header_map(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the value of a header if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the separately supplied query parameters.
    #[must_use]
    pub fn query_params(&self) -> &[(String, String)] {
        &self.query
    }

    /// Returns the body, if any.
    #[must_use]
    pub const fn body_bytes(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Returns the operation key this request is accounted under.
    #[must_use]
    pub const fn operation(&self) -> &OperationKey {
        &self.operation
    }

    /// Returns the URL with the query parameters appended after any query
    /// already embedded in it.
    #[must_use]
    pub fn full_url(&self) -> Url {
        let mut url = self.url.clone();
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        url
    }
}

/// A request to send through an [`Executor`](crate::clients::Executor).
///
/// Use [`ApiRequest::builder`] to construct requests with the builder pattern.
///
/// # Example
///
/// ```rust
/// use marketplace_http::clients::{ApiRequest, HttpMethod};
///
/// let request = ApiRequest::builder(HttpMethod::Get, "/database/search")
///     .query_param("type", "release")
///     .query_param("artist", "Pink Floyd")
///     .header("If-None-Match", "\"abc\"")
///     .build()
///     .unwrap();
///
/// assert_eq!(request.query.len(), 2);
/// ```
#[derive(Clone, Debug)]
pub struct ApiRequest {
    /// The HTTP method.
    pub method: HttpMethod,
    /// Path relative to the base URL, optionally with a query string.
    pub path: String,
    /// Query parameters (keys may repeat).
    pub query: Vec<(String, String)>,
    /// Extra headers for this request.
    pub headers: HeaderMap,
    /// The request body.
    pub body: Option<Bytes>,
}

impl ApiRequest {
    /// Creates a new builder for constructing an `ApiRequest`.
    #[must_use]
    pub fn builder(method: HttpMethod, path: impl Into<String>) -> ApiRequestBuilder {
        ApiRequestBuilder::new(method, path)
    }
}

/// Builder for constructing [`ApiRequest`] instances.
#[derive(Debug)]
pub struct ApiRequestBuilder {
    method: HttpMethod,
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
}

impl ApiRequestBuilder {
    fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Adds a query parameter. Repeated keys are kept in order.
    #[must_use]
    pub fn query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Sets a raw body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `value` as the JSON body and sets `Content-Type: application/json`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRequestError::InvalidBody`] if serialization fails.
    pub fn json<T: serde::Serialize>(self, value: &T) -> Result<Self, InvalidRequestError> {
        let body = serde_json::to_vec(value).map_err(|e| InvalidRequestError::InvalidBody {
            reason: e.to_string(),
        })?;
        Ok(self.header("Content-Type", "application/json").body(body))
    }

    /// Builds the [`ApiRequest`], validating it in the process.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRequestError`] if a header is not valid HTTP or a
    /// body is attached to a GET, HEAD or TRACE request.
    pub fn build(self) -> Result<ApiRequest, InvalidRequestError> {
        if self.body.is_some() && self.method.forbids_body() {
            return Err(InvalidRequestError::BodyNotAllowed {
                method: self.method.to_string(),
            });
        }

        let mut headers = HeaderMap::new();
        for (key, value) in self.headers {
            let invalid = || InvalidRequestError::InvalidHeader { name: key.clone() };
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| invalid())?;
            let value = HeaderValue::from_str(&value).map_err(|_| invalid())?;
            headers.append(name, value);
        }

        Ok(ApiRequest {
            method: self.method,
            path: self.path,
            query: self.query,
            headers,
            body: self.body,
        })
    }
}
