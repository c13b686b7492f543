//! Authentication error types.
//!
//! This module contains the errors raised while attaching credentials to a
//! request: invalid or missing credentials, unsupported OAuth 1.0a signature
//! methods and OAuth 2.0 token refresh failures.
//!
//! # Example
//!
//! ```rust
//! use marketplace_http::auth::AuthenticationError;
//!
//! let error = AuthenticationError::UnsupportedSignatureMethod {
//!     method: "RSA-SHA256".to_string(),
//! };
//! assert!(error.to_string().contains("RSA-SHA256"));
//! ```

use thiserror::Error;

/// Errors that can occur while authenticating a request.
///
/// These errors are not retried automatically: signing is deterministic for
/// its inputs, so retrying without new credentials fails the same way.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    /// One or more credential fields are empty.
    #[error("Invalid credentials: {reason}")]
    InvalidCredentials {
        /// Which field was rejected.
        reason: String,
    },

    /// The OAuth 1.0a signature method is not supported.
    #[error("Unsupported OAuth signature method '{method}'. Supported methods are HMAC-SHA1 and PLAINTEXT.")]
    UnsupportedSignatureMethod {
        /// The rejected method name.
        method: String,
    },

    /// The access token expired and no refresh token is available.
    #[error("Access token expired and no refresh token is available")]
    TokenExpired,

    /// The OAuth 2.0 refresh request failed.
    #[error("Token refresh failed with status {status}: {message}")]
    TokenRefreshFailed {
        /// The HTTP status returned by the token endpoint (0 for network errors).
        status: u16,
        /// The error body or description.
        message: String,
    },

    /// A credential cannot be encoded as an HTTP header value.
    #[error("Credential for header '{header}' contains characters that are not valid in HTTP headers")]
    InvalidHeaderValue {
        /// The header that could not be built.
        header: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_refresh_failed_message() {
        let error = AuthenticationError::TokenRefreshFailed {
            status: 400,
            message: "invalid_grant".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("400"));
        assert!(message.contains("invalid_grant"));
    }

    #[test]
    fn test_auth_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AuthenticationError>();
    }
}
