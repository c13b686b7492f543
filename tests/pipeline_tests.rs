//! End-to-end tests for the client pipeline against a mock marketplace.
//!
//! These tests run the full chain (auth, rate limiting, retry, logging)
//! over the `reqwest` transport.

use std::time::Duration;

use marketplace_http::auth::{AuthConfig, OAuth1aCredentials};
use marketplace_http::clients::{
    ApiRequest, ClientError, HttpMethod, Pipeline, RetryFailure, TransportErrorKind,
};
use marketplace_http::{BaseUrl, ClientConfig, MarketplaceTag, OperationKey, RetryPolicy};
use reqwest::header::HeaderMap;
use serde_json::json;
use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Retry policy with millisecond delays so tests stay fast on real time.
fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::default()
        .with_max_attempts(max_attempts)
        .with_initial_delay(Duration::from_millis(10))
        .with_max_delay(Duration::from_millis(50))
}

fn discogs_config(server: &MockServer) -> marketplace_http::ClientConfigBuilder {
    ClientConfig::builder()
        .base_url(BaseUrl::new(server.uri()).unwrap())
        .marketplace(MarketplaceTag::Discogs)
        .middleware(["logging", "oauth_1a", "rate_limiting", "retry"])
        .auth(AuthConfig::OAuth1a(OAuth1aCredentials::new(
            "consumer-key",
            "consumer-secret",
            "token",
            "token-secret",
        )))
        .retry(fast_retry(3))
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_discogs_search_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/database/search"))
        .and(query_param("q", "nirvana"))
        .and(query_param("type", "release"))
        .and(header_exists("authorization"))
        .and(header("accept", "application/json"))
        .and(header_exists("user-agent"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-discogs-ratelimit", "60")
                .insert_header("x-discogs-ratelimit-remaining", "59")
                .set_body_json(json!({"results": [{"title": "Nevermind"}]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = discogs_config(&server).build().unwrap();
    let executor = Pipeline::build(&config).unwrap();

    let request = ApiRequest::builder(HttpMethod::Get, "/database/search")
        .query_param("q", "nirvana")
        .query_param("type", "release")
        .build()
        .unwrap();
    let response = executor.send(request).await.unwrap();

    assert_eq!(response.status, 200);
    let body: serde_json::Value = response.json().unwrap();
    assert_eq!(body["results"][0]["title"], "Nevermind");

    let telemetry = executor
        .rate_limiter()
        .telemetry(MarketplaceTag::Discogs, &OperationKey::new("search"))
        .unwrap();
    assert_eq!(telemetry.limit, Some(60.0));
    assert_eq!(telemetry.remaining, Some(59.0));
}

#[tokio::test]
async fn test_discogs_query_in_path_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/database/search"))
        .and(query_param("type", "release"))
        .and(query_param("artist", "Pink Floyd"))
        .and(header_exists("authorization"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"results": [{"title": "The Dark Side Of The Moon"}]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = discogs_config(&server).build().unwrap();
    let executor = Pipeline::build(&config).unwrap();

    let response = executor
        .execute(
            HttpMethod::Get,
            "/database/search?type=release&artist=Pink+Floyd",
            Vec::new(),
            HeaderMap::new(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    let body: serde_json::Value = response.json().unwrap();
    assert_eq!(body["results"][0]["title"], "The Dark Side Of The Moon");
}

#[tokio::test]
async fn test_error_statuses_are_outcomes_not_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/releases/1"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"message": "Release not found."})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let executor = Pipeline::build(&discogs_config(&server).build().unwrap()).unwrap();
    let response = executor
        .execute(HttpMethod::Get, "/releases/1", Vec::new(), HeaderMap::new(), None)
        .await
        .unwrap();

    assert_eq!(response.status, 404);
    assert!(!response.is_success());
    assert!(response.text().contains("Release not found."));
}

#[tokio::test]
async fn test_json_body_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/marketplace/listings"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"listing_id": 41578242})))
        .expect(1)
        .mount(&server)
        .await;

    let executor = Pipeline::build(&discogs_config(&server).build().unwrap()).unwrap();
    let request = ApiRequest::builder(HttpMethod::Post, "/marketplace/listings")
        .json(&json!({"release_id": 249504, "condition": "Mint (M)", "price": 10.0}))
        .unwrap()
        .build()
        .unwrap();

    let response = executor.send(request).await.unwrap();
    assert_eq!(response.status, 201);
}

// ============================================================================
// Retry behaviour
// ============================================================================

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/rodneyfool"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/rodneyfool"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"username": "rodneyfool"})))
        .expect(1)
        .mount(&server)
        .await;

    let executor = Pipeline::build(&discogs_config(&server).build().unwrap()).unwrap();
    let response = executor
        .execute(HttpMethod::Get, "/users/rodneyfool", Vec::new(), HeaderMap::new(), None)
        .await
        .unwrap();

    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn test_retry_exhaustion_reports_attempts_and_last_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/marketplace/orders"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let executor = Pipeline::build(&discogs_config(&server).build().unwrap()).unwrap();
    let result = executor
        .execute(HttpMethod::Get, "/marketplace/orders", Vec::new(), HeaderMap::new(), None)
        .await;

    let Err(ClientError::RetryExhausted(error)) = result else {
        panic!("expected RetryExhausted");
    };
    assert_eq!(error.attempts, 3);
    assert_eq!(error.max_attempts, 3);
    assert_eq!(error.last_status(), Some(502));
    assert_eq!(error.operation, OperationKey::new("orders"));
    assert!(error.to_string().contains("3/3"));
}

#[tokio::test]
async fn test_timeouts_are_retried_then_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/database/search"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let config = discogs_config(&server)
        .timeout(0.1)
        .retry(fast_retry(2))
        .build()
        .unwrap();
    let executor = Pipeline::build(&config).unwrap();
    let result = executor
        .execute(HttpMethod::Get, "/database/search", Vec::new(), HeaderMap::new(), None)
        .await;

    let Err(ClientError::RetryExhausted(error)) = result else {
        panic!("expected RetryExhausted");
    };
    assert_eq!(error.attempts, 2);
    assert!(matches!(
        &error.last,
        RetryFailure::Error(inner)
            if matches!(
                inner.as_ref(),
                ClientError::Transport(t) if t.kind == TransportErrorKind::Timeout
            )
    ));
}

#[tokio::test]
async fn test_connection_refused_without_retry_is_transport_error() {
    // Bind then drop a server so its port refuses connections.
    let uri = {
        let server = MockServer::start().await;
        server.uri()
    };

    let config = ClientConfig::builder()
        .base_url(BaseUrl::new(uri).unwrap())
        .marketplace(MarketplaceTag::General)
        .middleware(["logging"])
        .build()
        .unwrap();
    let executor = Pipeline::build(&config).unwrap();
    let result = executor
        .execute(HttpMethod::Get, "/health", Vec::new(), HeaderMap::new(), None)
        .await;

    assert!(matches!(
        result,
        Err(ClientError::Transport(error)) if error.kind == TransportErrorKind::Connection
    ));
}

// ============================================================================
// Marketplace presets
// ============================================================================

#[tokio::test]
async fn test_ebay_marketplace_header_and_bearer_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sell/inventory/v1/inventory_item"))
        .and(header("x-ebay-c-marketplace-id", "EBAY_US"))
        .and(header("authorization", "Bearer v^1.1#i^1#token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total": 0})))
        .expect(1)
        .mount(&server)
        .await;

    let config = ClientConfig::builder()
        .base_url(BaseUrl::new(server.uri()).unwrap())
        .marketplace(MarketplaceTag::Ebay)
        .middleware(["auth", "rate_limiting"])
        .auth(AuthConfig::Bearer("v^1.1#i^1#token".to_string()))
        .build()
        .unwrap();
    let executor = Pipeline::build(&config).unwrap();
    let response = executor
        .execute(
            HttpMethod::Get,
            "/sell/inventory/v1/inventory_item",
            Vec::new(),
            HeaderMap::new(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn test_amazon_bearer_uses_access_token_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders/v0/orders"))
        .and(header("x-amz-access-token", "Atza|token"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-amzn-ratelimit-limit", "0.0167")
                .insert_header("x-amzn-requestid", "a1b2c3"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = ClientConfig::builder()
        .base_url(BaseUrl::new(server.uri()).unwrap())
        .marketplace(MarketplaceTag::Amazon)
        .middleware(["auth", "rate_limiting", "logging"])
        .auth(AuthConfig::Bearer("Atza|token".to_string()))
        .build()
        .unwrap();
    let executor = Pipeline::build(&config).unwrap();
    let response = executor
        .execute(
            HttpMethod::Get,
            "/orders/v0/orders",
            vec![("MarketplaceIds".to_string(), "ATVPDKIKX0DER".to_string())],
            HeaderMap::new(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(response.request_id(), Some("a1b2c3"));
    let telemetry = executor
        .rate_limiter()
        .telemetry(MarketplaceTag::Amazon, &OperationKey::new("orders"))
        .unwrap();
    assert_eq!(telemetry.limit, Some(0.0167));
}
