//! Configuration error types for the marketplace HTTP client.
//!
//! This module contains the error raised while validating client
//! configuration and assembling a pipeline. These errors always surface
//! at construction time and never at request time.
//!
//! # Example
//!
//! ```rust
//! use marketplace_http::{BaseUrl, ConfigError};
//!
//! let result = BaseUrl::new("not a url");
//! assert!(matches!(result, Err(ConfigError::InvalidBaseUrl { .. })));
//! ```

use thiserror::Error;

/// Errors that can occur while configuring a client pipeline.
///
/// Each variant provides a clear, actionable error message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Base URL is invalid.
    #[error("Invalid base URL '{url}'. Please provide an absolute http(s) URL (e.g., 'https://api.discogs.com').")]
    InvalidBaseUrl {
        /// The invalid URL that was provided.
        url: String,
    },

    /// A required field is missing.
    #[error("Missing required field: '{field}'. This field must be set before building the configuration.")]
    MissingRequiredField {
        /// The name of the missing field.
        field: &'static str,
    },

    /// The request timeout is zero, negative or not a finite number.
    #[error("Invalid timeout {seconds}s. Timeout must be a positive number of seconds.")]
    InvalidTimeout {
        /// The rejected timeout, rendered as text.
        seconds: String,
    },

    /// The redirect limit is negative.
    #[error("Invalid max_redirects {value}. The redirect limit cannot be negative.")]
    InvalidMaxRedirects {
        /// The rejected value.
        value: i32,
    },

    /// A middleware name has no registered factory.
    #[error("Unknown middleware '{name}'. Register it with MiddlewareRegistry::register before building the pipeline.")]
    UnknownMiddleware {
        /// The unregistered middleware name.
        name: String,
    },

    /// An auth middleware was enabled without matching credentials.
    #[error("Middleware '{middleware}' requires {expected} credentials, but {configured} were configured.")]
    UnsupportedAuthType {
        /// The middleware that requested the credentials.
        middleware: String,
        /// The credential kind the middleware needs.
        expected: &'static str,
        /// The credential kind that was configured, or "none".
        configured: &'static str,
    },

    /// A rate limit policy has a zero capacity or zero-length interval.
    #[error("Invalid rate limit policy for operation '{operation}': {reason}")]
    InvalidRateLimitPolicy {
        /// The operation key the policy applies to.
        operation: String,
        /// Why the policy was rejected.
        reason: String,
    },

    /// A retry policy is out of range.
    #[error("Invalid retry policy: {reason}")]
    InvalidRetryPolicy {
        /// Why the policy was rejected.
        reason: String,
    },

    /// A default header name or value cannot be sent over HTTP.
    #[error("Invalid header '{name}'. Header names and values must be visible ASCII.")]
    InvalidHeader {
        /// The offending header name.
        name: String,
    },

    /// The default transport could not be constructed.
    #[error("Failed to initialize HTTP transport: {reason}")]
    TransportInit {
        /// The underlying failure.
        reason: String,
    },

    /// The supplied transport reports it cannot run in this environment.
    #[error("HTTP transport is unavailable. Supply a transport through Pipeline::build_with.")]
    TransportUnavailable,
}
