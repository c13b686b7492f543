//! OAuth 1.0a request signing (RFC 5849 §3).
//!
//! This module produces `Authorization: OAuth ...` header values for
//! marketplaces that still use OAuth 1.0a (Discogs, legacy Bandcamp apps).
//!
//! # Signing
//!
//! The signature base string is the upper-case method, the normalized base
//! URL and the sorted parameter string, each percent-encoded and joined with
//! `&`. The parameter string covers the `oauth_*` protocol parameters, the
//! caller's query parameters and any query already embedded in the URL.
//! Only the protocol parameters appear in the header; query parameters stay
//! on the request.
//!
//! # Example
//!
//! ```rust
//! use marketplace_http::auth::oauth1::{sign_with, OAuth1aCredentials};
//! use url::Url;
//!
//! let credentials = OAuth1aCredentials::new("ck", "cs", "tk", "ts");
//! let url = Url::parse("https://api.discogs.com/database/search?q=nirvana").unwrap();
//!
//! let header = sign_with("get", &url, &[], &credentials, "nonce", "1700000000").unwrap();
//! assert!(header.starts_with("OAuth oauth_consumer_key=\"ck\", oauth_nonce=\"nonce\""));
//! ```

use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::fmt;
use url::Url;

use crate::auth::AuthenticationError;

type HmacSha1 = Hmac<Sha1>;

/// The HMAC-SHA1 signature method (default).
pub const HMAC_SHA1: &str = "HMAC-SHA1";

/// The PLAINTEXT signature method.
pub const PLAINTEXT: &str = "PLAINTEXT";

/// The only protocol version defined by RFC 5849.
pub const OAUTH_VERSION: &str = "1.0";

/// OAuth 1.0a consumer and token credentials.
///
/// Any signature method string is accepted at construction time; an
/// unsupported method is only rejected when a request is signed.
///
/// # Security
///
/// The `Debug` implementation masks both secrets.
///
/// # Example
///
/// ```rust
/// use marketplace_http::auth::oauth1::OAuth1aCredentials;
///
/// let credentials = OAuth1aCredentials::new("key", "secret", "token", "token-secret")
///     .with_signature_method("INVALID");
/// assert!(credentials.is_valid());
/// assert_eq!(credentials.signature_method(), "INVALID");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct OAuth1aCredentials {
    consumer_key: String,
    consumer_secret: String,
    token: String,
    token_secret: String,
    signature_method: String,
    version: String,
}

impl OAuth1aCredentials {
    /// Creates HMAC-SHA1 credentials.
    #[must_use]
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        token: impl Into<String>,
        token_secret: impl Into<String>,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            token: token.into(),
            token_secret: token_secret.into(),
            signature_method: HMAC_SHA1.to_string(),
            version: OAUTH_VERSION.to_string(),
        }
    }

    /// Replaces the signature method.
    #[must_use]
    pub fn with_signature_method(mut self, method: impl Into<String>) -> Self {
        self.signature_method = method.into();
        self
    }

    /// Returns `true` when all four credential strings are non-empty.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.consumer_key.is_empty()
            && !self.consumer_secret.is_empty()
            && !self.token.is_empty()
            && !self.token_secret.is_empty()
    }

    /// Returns the consumer key.
    #[must_use]
    pub fn consumer_key(&self) -> &str {
        &self.consumer_key
    }

    /// Returns the access token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns the signature method.
    #[must_use]
    pub fn signature_method(&self) -> &str {
        &self.signature_method
    }

    /// Returns the protocol version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    fn validate(&self) -> Result<(), AuthenticationError> {
        let empty = [
            ("consumer_key", &self.consumer_key),
            ("consumer_secret", &self.consumer_secret),
            ("token", &self.token),
            ("token_secret", &self.token_secret),
        ]
        .into_iter()
        .find(|(_, value)| value.is_empty());

        match empty {
            Some((field, _)) => Err(AuthenticationError::InvalidCredentials {
                reason: format!("OAuth 1.0a {field} cannot be empty"),
            }),
            None => Ok(()),
        }
    }

    fn signing_key(&self) -> String {
        format!(
            "{}&{}",
            percent_encode(&self.consumer_secret),
            percent_encode(&self.token_secret)
        )
    }
}

impl fmt::Debug for OAuth1aCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth1aCredentials")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"*****")
            .field("token", &self.token)
            .field("token_secret", &"*****")
            .field("signature_method", &self.signature_method)
            .field("version", &self.version)
            .finish()
    }
}

/// Percent-encodes a value per RFC 3986, leaving only `A-Za-z0-9-_.~` unescaped.
#[must_use]
pub fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Signs a request with a fresh nonce and the current timestamp.
///
/// # Errors
///
/// Returns [`AuthenticationError::InvalidCredentials`] if a credential field
/// is empty, or [`AuthenticationError::UnsupportedSignatureMethod`] if the
/// signature method is neither `HMAC-SHA1` nor `PLAINTEXT`.
pub fn sign(
    method: &str,
    url: &Url,
    query_params: &[(String, String)],
    credentials: &OAuth1aCredentials,
) -> Result<String, AuthenticationError> {
    let nonce = generate_nonce();
    let timestamp = chrono::Utc::now().timestamp().to_string();
    sign_with(method, url, query_params, credentials, &nonce, &timestamp)
}

/// Signs a request with an explicit nonce and timestamp.
///
/// Identical inputs always produce a byte-identical header.
///
/// # Errors
///
/// See [`sign`].
pub fn sign_with(
    method: &str,
    url: &Url,
    query_params: &[(String, String)],
    credentials: &OAuth1aCredentials,
    nonce: &str,
    timestamp: &str,
) -> Result<String, AuthenticationError> {
    credentials.validate()?;

    let protocol_params = protocol_params(credentials, nonce, timestamp);
    let base_string = signature_base_string(method, url, query_params, &protocol_params);
    let signature = compute_signature(&base_string, credentials)?;

    let header_fields = protocol_params
        .iter()
        .map(|(key, value)| (*key, value.as_str()))
        .chain(std::iter::once(("oauth_signature", signature.as_str())))
        .map(|(key, value)| format!("{key}=\"{}\"", percent_encode(value)))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!("OAuth {header_fields}"))
}

/// Builds the signature base string for a request.
///
/// `protocol_params` are the `oauth_*` parameters excluding `oauth_signature`.
#[must_use]
pub fn signature_base_string(
    method: &str,
    url: &Url,
    query_params: &[(String, String)],
    protocol_params: &[(&str, String)],
) -> String {
    let mut params: Vec<(String, String)> = protocol_params
        .iter()
        .map(|(key, value)| (percent_encode(key), percent_encode(value)))
        .chain(
            query_params
                .iter()
                .map(|(key, value)| (percent_encode(key), percent_encode(value))),
        )
        .chain(
            url.query_pairs()
                .map(|(key, value)| (percent_encode(&key), percent_encode(&value))),
        )
        .collect();
    params.sort();

    let param_string = params
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent_encode(&base_string_uri(url)),
        percent_encode(&param_string)
    )
}

/// Normalizes a URL to `scheme://host[:port]/path` for the base string.
///
/// Default ports are omitted; query and fragment are dropped.
#[must_use]
pub fn base_string_uri(url: &Url) -> String {
    let scheme = url.scheme().to_ascii_lowercase();
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
    format!("{scheme}://{host}{port}{}", url.path())
}

fn protocol_params(
    credentials: &OAuth1aCredentials,
    nonce: &str,
    timestamp: &str,
) -> [(&'static str, String); 6] {
    [
        ("oauth_consumer_key", credentials.consumer_key.clone()),
        ("oauth_nonce", nonce.to_string()),
        ("oauth_signature_method", credentials.signature_method.clone()),
        ("oauth_timestamp", timestamp.to_string()),
        ("oauth_token", credentials.token.clone()),
        ("oauth_version", credentials.version.clone()),
    ]
}

fn compute_signature(
    base_string: &str,
    credentials: &OAuth1aCredentials,
) -> Result<String, AuthenticationError> {
    let key = credentials.signing_key();
    match credentials.signature_method.as_str() {
        HMAC_SHA1 => {
            let mut mac = HmacSha1::new_from_slice(key.as_bytes()).map_err(|_| {
                AuthenticationError::InvalidCredentials {
                    reason: "signing key rejected by HMAC-SHA1".to_string(),
                }
            })?;
            mac.update(base_string.as_bytes());
            Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
        }
        PLAINTEXT => Ok(key),
        other => Err(AuthenticationError::UnsupportedSignatureMethod {
            method: other.to_string(),
        }),
    }
}

/// 128 random bits, hex-encoded.
fn generate_nonce() -> String {
    format!("{:032x}", rand::random::<u128>())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Worked example from the Twitter "Creating a signature" guide.
    fn twitter_credentials() -> OAuth1aCredentials {
        OAuth1aCredentials::new(
            "xvz1evFS4wEEPTGEFPHBog",
            "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw",
            "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb",
            "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE",
        )
    }

    fn twitter_params() -> Vec<(String, String)> {
        vec![
            ("include_entities".to_string(), "true".to_string()),
            (
                "status".to_string(),
                "Hello Ladies + Gentlemen, a signed OAuth request!".to_string(),
            ),
        ]
    }

    const TWITTER_NONCE: &str = "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg";
    const TWITTER_TIMESTAMP: &str = "1318622958";

    #[test]
    fn test_percent_encode_unreserved_set() {
        assert_eq!(percent_encode("AZaz09-_.~"), "AZaz09-_.~");
        assert_eq!(percent_encode("a b+c"), "a%20b%2Bc");
        assert_eq!(percent_encode("!*'()"), "%21%2A%27%28%29");
        assert_eq!(percent_encode("é"), "%C3%A9");
    }

    #[test]
    fn test_base_string_uri_normalization() {
        let url = Url::parse("HTTPS://API.Discogs.com:443/database/search?q=1#frag").unwrap();
        assert_eq!(base_string_uri(&url), "https://api.discogs.com/database/search");

        let url = Url::parse("http://localhost:8080/r%20v").unwrap();
        assert_eq!(base_string_uri(&url), "http://localhost:8080/r%20v");
    }

    #[test]
    fn test_signature_base_string_matches_reference() {
        let url = Url::parse("https://api.twitter.com/1/statuses/update.json").unwrap();
        let credentials = twitter_credentials();
        let params = protocol_params(&credentials, TWITTER_NONCE, TWITTER_TIMESTAMP);

        let base = signature_base_string("post", &url, &twitter_params(), &params);

        let expected = [
            "POST",
            "https%3A%2F%2Fapi.twitter.com%2F1%2Fstatuses%2Fupdate.json",
            "include_entities%3Dtrue\
             %26oauth_consumer_key%3Dxvz1evFS4wEEPTGEFPHBog\
             %26oauth_nonce%3DkYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg\
             %26oauth_signature_method%3DHMAC-SHA1\
             %26oauth_timestamp%3D1318622958\
             %26oauth_token%3D370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb\
             %26oauth_version%3D1.0\
             %26status%3DHello%2520Ladies%2520%252B%2520Gentlemen%252C%2520a%2520signed%2520OAuth%2520request%2521",
        ]
        .join("&");
        assert_eq!(base, expected);
    }

    #[test]
    fn test_hmac_sha1_signature_matches_reference() {
        let url = Url::parse("https://api.twitter.com/1/statuses/update.json").unwrap();
        let header = sign_with(
            "POST",
            &url,
            &twitter_params(),
            &twitter_credentials(),
            TWITTER_NONCE,
            TWITTER_TIMESTAMP,
        )
        .unwrap();

        assert!(header.ends_with(r#"oauth_signature="tnnArxj06cWHq44gCs1OSKk%2FjLY%3D""#));
    }

    #[test]
    fn test_url_embedded_query_is_signed() {
        let credentials = twitter_credentials();
        let params = protocol_params(&credentials, TWITTER_NONCE, TWITTER_TIMESTAMP);
        let embedded = Url::parse(
            "https://api.twitter.com/1/statuses/update.json?include_entities=true&status=Hello%20Ladies%20%2B%20Gentlemen%2C%20a%20signed%20OAuth%20request%21",
        )
        .unwrap();
        let bare = Url::parse("https://api.twitter.com/1/statuses/update.json").unwrap();

        assert_eq!(
            signature_base_string("POST", &embedded, &[], &params),
            signature_base_string("POST", &bare, &twitter_params(), &params)
        );
    }

    #[test]
    fn test_header_field_order_and_exclusion_of_query_params() {
        let url = Url::parse("https://api.discogs.com/database/search?type=release").unwrap();
        let header = sign_with(
            "GET",
            &url,
            &[("artist".to_string(), "Pink Floyd".to_string())],
            &OAuth1aCredentials::new("ck", "cs", "tk", "ts"),
            "abc",
            "1700000000",
        )
        .unwrap();

        let keys: Vec<&str> = header
            .trim_start_matches("OAuth ")
            .split(", ")
            .map(|field| field.split('=').next().unwrap())
            .collect();
        assert_eq!(
            keys,
            [
                "oauth_consumer_key",
                "oauth_nonce",
                "oauth_signature_method",
                "oauth_timestamp",
                "oauth_token",
                "oauth_version",
                "oauth_signature"
            ]
        );
        assert!(!header.contains("artist"));
        assert!(!header.contains("type="));
    }

    #[test]
    fn test_plaintext_signature_is_signing_key() {
        let url = Url::parse("https://bandcamp.com/api/account/1/my_bands").unwrap();
        let credentials =
            OAuth1aCredentials::new("ck", "c&s", "tk", "t s").with_signature_method(PLAINTEXT);

        let header = sign_with("POST", &url, &[], &credentials, "n", "1").unwrap();

        // key = "c%26s&t%20s", then encoded again for the header
        assert!(header.ends_with(r#"oauth_signature="c%2526s%26t%2520s""#));
        assert!(header.contains(r#"oauth_signature_method="PLAINTEXT""#));
    }

    #[test]
    fn test_sign_is_deterministic_for_fixed_nonce_and_timestamp() {
        let url = Url::parse("https://api.discogs.com/users/me").unwrap();
        let credentials = OAuth1aCredentials::new("ck", "cs", "tk", "ts");
        let first = sign_with("GET", &url, &[], &credentials, "n1", "42").unwrap();
        let second = sign_with("GET", &url, &[], &credentials, "n1", "42").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_sign_uses_fresh_nonce_each_call() {
        let url = Url::parse("https://api.discogs.com/users/me").unwrap();
        let credentials = OAuth1aCredentials::new("ck", "cs", "tk", "ts");
        let first = sign("GET", &url, &[], &credentials).unwrap();
        let second = sign("GET", &url, &[], &credentials).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_unsupported_method_fails_only_at_sign_time() {
        let credentials =
            OAuth1aCredentials::new("ck", "cs", "tk", "ts").with_signature_method("INVALID");
        let url = Url::parse("https://api.discogs.com/users/me").unwrap();

        let result = sign("GET", &url, &[], &credentials);
        assert_eq!(
            result,
            Err(AuthenticationError::UnsupportedSignatureMethod {
                method: "INVALID".to_string()
            })
        );
    }

    #[test]
    fn test_empty_credentials_rejected() {
        let credentials = OAuth1aCredentials::new("ck", "", "tk", "ts");
        assert!(!credentials.is_valid());

        let url = Url::parse("https://api.discogs.com/users/me").unwrap();
        assert!(matches!(
            sign("GET", &url, &[], &credentials),
            Err(AuthenticationError::InvalidCredentials { reason })
                if reason.contains("consumer_secret")
        ));
    }

    #[test]
    fn test_debug_masks_secrets() {
        let credentials = OAuth1aCredentials::new("ck", "super-secret", "tk", "token-secret");
        let debug = format!("{credentials:?}");
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("token-secret"));
        assert!(debug.contains("ck"));
    }
}
