//! Error types for client pipeline execution.
//!
//! This module contains the error returned by
//! [`Executor::execute`](crate::clients::Executor::execute) and its parts.
//!
//! # Error Handling
//!
//! A call either yields a [`ResponseOutcome`] (any HTTP status, including
//! 404 or 500) or one of the [`ClientError`] kinds for failures that
//! prevented getting an HTTP outcome:
//!
//! - [`ClientError::Configuration`]: invalid configuration (construction time only)
//! - [`ClientError::Authentication`]: missing, expired or unsignable credentials
//! - [`ClientError::RateLimitExceeded`]: local admission denied after one bounded wait
//! - [`ClientError::RetryExhausted`]: the retry budget ran out on a transient failure
//! - [`ClientError::Transport`]: the transport could not complete the exchange
//!
//! # Example
//!
//! ```rust,ignore
//! use marketplace_http::clients::ClientError;
//!
//! match executor.send(request).await {
//!     Ok(response) => println!("HTTP {}", response.status),
//!     Err(ClientError::RateLimitExceeded(e)) => {
//!         println!("Throttled on {}: retry after {:?}", e.operation, e.retry_after);
//!     }
//!     Err(ClientError::RetryExhausted(e)) => {
//!         println!("Gave up after {}/{} attempts", e.attempts, e.max_attempts);
//!     }
//!     Err(e) => println!("Request failed: {e}"),
//! }
//! ```

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::auth::AuthenticationError;
use crate::clients::response::ResponseOutcome;
use crate::config::{MarketplaceTag, OperationKey};
use crate::error::ConfigError;

/// The class of a transport failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The request or response timed out.
    Timeout,
    /// The connection could not be established or was reset.
    Connection,
    /// TLS negotiation or certificate validation failed.
    Ssl,
    /// Anything else, including malformed URLs.
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::Ssl => "ssl",
            Self::Other => "other",
        })
    }
}

/// Error returned when the transport could not obtain an HTTP response.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("Transport error ({kind}): {message}")]
pub struct TransportError {
    /// The failure class.
    pub kind: TransportErrorKind,
    /// Details from the underlying HTTP stack.
    pub message: String,
}

impl TransportError {
    /// Creates a transport error.
    #[must_use]
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Returns `true` for timeouts and connection failures.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            TransportErrorKind::Timeout | TransportErrorKind::Connection
        )
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        let message = error.to_string();
        let kind = if error.is_timeout() {
            TransportErrorKind::Timeout
        } else if mentions_tls(&error) {
            TransportErrorKind::Ssl
        } else if error.is_connect() {
            TransportErrorKind::Connection
        } else {
            TransportErrorKind::Other
        };
        Self { kind, message }
    }
}

/// Walks the source chain looking for a TLS/certificate failure.
fn mentions_tls(error: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(error);
    while let Some(cause) = source {
        let text = cause.to_string().to_ascii_lowercase();
        if text.contains("certificate") || text.contains("tls") || text.contains("handshake") {
            return true;
        }
        source = cause.source();
    }
    false
}

/// Error returned when the local rate limiter still denies admission after
/// one bounded wait.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("Rate limit exceeded for {marketplace} operation '{operation}'")]
pub struct RateLimitExceededError {
    /// The marketplace the pipeline targets.
    pub marketplace: MarketplaceTag,
    /// The operation key whose limiter denied the request.
    pub operation: OperationKey,
    /// How long until capacity is expected, if known.
    pub retry_after: Option<Duration>,
}

/// The last failure seen before the retry budget ran out.
#[derive(Debug)]
pub enum RetryFailure {
    /// The server kept answering with a retryable status.
    Response(Box<ResponseOutcome>),
    /// A retryable error was raised by an inner layer.
    Error(Box<ClientError>),
}

impl fmt::Display for RetryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Response(response) => write!(f, "HTTP {}", response.status),
            Self::Error(error) => write!(f, "{error}"),
        }
    }
}

/// Error returned when maximum retry attempts have been exhausted.
///
/// # Example
///
/// ```rust
/// use marketplace_http::clients::{RetryExhaustedError, RetryFailure, ResponseOutcome};
/// use marketplace_http::{MarketplaceTag, OperationKey};
/// use std::time::Duration;
///
/// let error = RetryExhaustedError {
///     marketplace: MarketplaceTag::Ebay,
///     operation: OperationKey::new("inventory"),
///     attempts: 3,
///     max_attempts: 3,
///     last: RetryFailure::Response(Box::new(ResponseOutcome::new(
///         503,
///         Default::default(),
///         Default::default(),
///         Duration::ZERO,
///     ))),
/// };
///
/// assert!(error.to_string().contains("3/3"));
/// assert_eq!(error.last_status(), Some(503));
/// ```
#[derive(Debug, Error)]
#[error("Exceeded maximum retry count of {max_attempts} for {marketplace} operation '{operation}' ({attempts}/{max_attempts} attempts). Last failure: {last}")]
pub struct RetryExhaustedError {
    /// The marketplace the pipeline targets.
    pub marketplace: MarketplaceTag,
    /// The operation key of the request.
    pub operation: OperationKey,
    /// How many attempts were made.
    pub attempts: u32,
    /// The configured attempt budget.
    pub max_attempts: u32,
    /// The final failure.
    pub last: RetryFailure,
}

impl RetryExhaustedError {
    /// Returns the last HTTP status if the final failure was a response.
    #[must_use]
    pub fn last_status(&self) -> Option<u16> {
        match &self.last {
            RetryFailure::Response(response) => Some(response.status),
            RetryFailure::Error(_) => None,
        }
    }
}

/// Error returned when an [`ApiRequest`](crate::clients::ApiRequest) fails validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidRequestError {
    /// The HTTP method is not one of the supported methods.
    #[error("Invalid Http method {method}.")]
    InvalidMethod {
        /// The invalid method that was provided.
        method: String,
    },

    /// A header name or value is not valid HTTP.
    #[error("Invalid header '{name}'.")]
    InvalidHeader {
        /// The offending header name.
        name: String,
    },

    /// A body was attached to a method that does not allow one.
    #[error("Cannot send a body with {method}.")]
    BodyNotAllowed {
        /// The HTTP method.
        method: String,
    },

    /// The body could not be serialized.
    #[error("Invalid request body: {reason}")]
    InvalidBody {
        /// Serializer error text.
        reason: String,
    },
}

/// Unified error type for pipeline execution.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Invalid configuration.
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// Authentication failed.
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),

    /// Local rate limit admission denied.
    #[error(transparent)]
    RateLimitExceeded(#[from] RateLimitExceededError),

    /// Retry attempts exhausted.
    #[error(transparent)]
    RetryExhausted(#[from] RetryExhaustedError),

    /// The transport failed to obtain a response.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

// Verify ClientError is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<ClientError>();
};
