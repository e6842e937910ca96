use hyper::header::AUTHORIZATION;
use hyper::Request;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;
use crate::cache::memory;

fn cache() -> Arc<dyn Cache> {
    Arc::new(memory::Backend::new())
}

fn request(authorization: Option<&str>) -> Parts {
    let mut builder = Request::builder().uri("/api/items");
    if let Some(authorization) = authorization {
        builder = builder.header(AUTHORIZATION, authorization);
    }
    let (parts, ()) = builder.body(()).unwrap().into_parts();
    parts
}

async fn token_endpoint(response: ResponseTemplate, expected_calls: u64) -> MockServer {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(header("authorization", "Bearer client-token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(response)
        .expect(expected_calls)
        .mount(&mock_server)
        .await;
    mock_server
}

#[tokio::test]
async fn test_successful_exchange_is_cached() {
    let response = ResponseTemplate::new(200).set_body_json(json!({"access_token": "abc"}));
    let mock_server = token_endpoint(response, 1).await;

    let config = format!("url={}/token,refresh_token=r3fr3sh", mock_server.uri());
    let backend = Refresh::new(&config, cache()).unwrap();

    for _ in 0..3 {
        let result = backend
            .authenticate(&request(Some("Bearer client-token")))
            .await;
        assert!(result.unwrap());
    }
}

#[tokio::test]
async fn test_configured_refresh_token_is_sent() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("refresh_token=r3fr3sh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = format!("url={}/token,refresh_token=r3fr3sh", mock_server.uri());
    let backend = Refresh::new(&config, cache()).unwrap();

    let result = backend
        .authenticate(&request(Some("Bearer client-token")))
        .await;
    assert!(result.unwrap());
}

#[tokio::test]
async fn test_missing_or_malformed_bearer_denies() {
    let mock_server = token_endpoint(ResponseTemplate::new(200), 0).await;

    let config = format!("url={}/token", mock_server.uri());
    let backend = Refresh::new(&config, cache()).unwrap();

    assert!(!backend.authenticate(&request(None)).await.unwrap());
    assert!(!backend
        .authenticate(&request(Some("Basic Ym9iOnNlY3JldA==")))
        .await
        .unwrap());
    assert!(!backend
        .authenticate(&request(Some("Bearer")))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_exchanges_are_not_shared_between_endpoints() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/accept"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/reject"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&mock_server)
        .await;

    let shared = cache();
    let accepting =
        Refresh::new(&format!("url={}/accept", mock_server.uri()), Arc::clone(&shared)).unwrap();
    let rejecting =
        Refresh::new(&format!("url={}/reject", mock_server.uri()), Arc::clone(&shared)).unwrap();

    let parts = request(Some("Bearer client-token"));
    assert!(!rejecting.authenticate(&parts).await.unwrap());
    assert!(accepting.authenticate(&parts).await.unwrap());
    assert!(!rejecting.authenticate(&parts).await.unwrap());
}

#[tokio::test]
async fn test_client_error_denies_without_caching() {
    let mock_server = token_endpoint(ResponseTemplate::new(401), 2).await;

    let config = format!("url={}/token", mock_server.uri());
    let backend = Refresh::new(&config, cache()).unwrap();

    for _ in 0..2 {
        let result = backend
            .authenticate(&request(Some("Bearer client-token")))
            .await;
        assert!(!result.unwrap());
    }
}

#[tokio::test]
async fn test_failure_key_denies() {
    let response = ResponseTemplate::new(200).set_body_json(json!({"error": "invalid_grant"}));
    let mock_server = token_endpoint(response, 1).await;

    let config = format!("url={}/token", mock_server.uri());
    let backend = Refresh::new(&config, cache()).unwrap();

    let result = backend
        .authenticate(&request(Some("Bearer client-token")))
        .await;
    assert!(!result.unwrap());
}

#[tokio::test]
async fn test_custom_failure_key() {
    let response = ResponseTemplate::new(200).set_body_json(json!({"error": "ignored"}));
    let mock_server = token_endpoint(response, 1).await;

    let config = format!("url={}/token,failure_key=denied", mock_server.uri());
    let backend = Refresh::new(&config, cache()).unwrap();

    let result = backend
        .authenticate(&request(Some("Bearer client-token")))
        .await;
    assert!(result.unwrap());
}

#[tokio::test]
async fn test_server_error_is_an_error() {
    let mock_server = token_endpoint(ResponseTemplate::new(503), 1).await;

    let config = format!("url={}/token", mock_server.uri());
    let backend = Refresh::new(&config, cache()).unwrap();

    let result = backend
        .authenticate(&request(Some("Bearer client-token")))
        .await;
    assert!(matches!(result, Err(Error::InvalidResponse(_))));
}

#[tokio::test]
async fn test_non_json_body_is_an_error() {
    let response = ResponseTemplate::new(200).set_body_string("<html>login</html>");
    let mock_server = token_endpoint(response, 1).await;

    let config = format!("url={}/token", mock_server.uri());
    let backend = Refresh::new(&config, cache()).unwrap();

    let result = backend
        .authenticate(&request(Some("Bearer client-token")))
        .await;
    assert!(matches!(result, Err(Error::InvalidResponse(_))));
}

#[tokio::test]
async fn test_oversize_body_is_an_error() {
    let response =
        ResponseTemplate::new(200).set_body_json(json!({"access_token": "x".repeat(64)}));
    let mock_server = token_endpoint(response, 1).await;

    let config = format!("url={}/token,limit=32", mock_server.uri());
    let backend = Refresh::new(&config, cache()).unwrap();

    let result = backend
        .authenticate(&request(Some("Bearer client-token")))
        .await;
    assert!(matches!(result, Err(Error::InvalidResponse(_))));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_an_error() {
    let backend = Refresh::new("url=http://127.0.0.1:1/token,timeout=2s", cache()).unwrap();

    let result = backend
        .authenticate(&request(Some("Bearer client-token")))
        .await;
    assert!(matches!(result, Err(Error::Upstream(_))));
}

#[test]
fn test_invalid_configuration() {
    assert!(matches!(
        Refresh::new("lifetime=1h", cache()),
        Err(Error::Options(options::Error::MissingOption(_)))
    ));
    assert!(matches!(
        Refresh::new("url=http://example.com,limit=lots", cache()),
        Err(Error::Options(options::Error::InvalidValue { .. }))
    ));
    assert!(matches!(
        Refresh::new("url=http://example.com,skipverify=sure", cache()),
        Err(Error::Options(options::Error::InvalidValue { .. }))
    ));
}

#[test]
fn test_refresh_token_is_redacted() {
    let backend = Refresh::new("url=http://example.com,refresh_token=r3fr3sh", cache()).unwrap();
    assert!(!format!("{backend:?}").contains("r3fr3sh"));
}
