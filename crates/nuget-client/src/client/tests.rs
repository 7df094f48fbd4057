//! Unit tests for the NuGet client

use super::*;

use serde::Deserialize;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nuget_core::error::ErrorKind;
use crate::auth::API_KEY_HEADER;
use crate::retry::ZeroBackoff;

const FIXTURE: &str = include_str!("../../tests/fixtures/index.json");

/// Service index whose resources live on the mock server
fn local_index(server: &MockServer) -> serde_json::Value {
    let base = server.uri();
    serde_json::json!({
        "version": "3.0.0",
        "resources": [
            { "@id": format!("{}/query", base), "@type": "SearchQueryService/3.5.0" },
            { "@id": format!("{}/flat", base), "@type": "PackageBaseAddress/3.0.0" },
            { "@id": format!("{}/api/v2/package", base), "@type": "PackagePublish/2.0.0" },
            { "@id": format!("{}/packages/{{id}}/{{version}}", base), "@type": "PackageDetailsUriTemplate/5.1.0" }
        ]
    })
}

async fn mount_index(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/v3/index.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn local_client(server: &MockServer) -> NuGetClient {
    mount_index(server, local_index(server)).await;
    NuGetClient::builder(format!("{}/v3/", server.uri()))
        .backoff(Arc::new(ZeroBackoff))
        .build()
        .await
        .unwrap()
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(rename = "totalHits")]
    total_hits: u64,
    data: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: String,
}

#[test]
fn test_normalize_base_url_adds_trailing_slash() {
    let (base, index) = normalize_base_url("https://api.nuget.org/v3").unwrap();
    assert_eq!(base.as_str(), "https://api.nuget.org/v3/");
    assert!(index.is_none());
}

#[test]
fn test_normalize_base_url_accepts_index_url() {
    let (base, index) = normalize_base_url("https://api.nuget.org/v3/index.json").unwrap();
    assert_eq!(base.as_str(), "https://api.nuget.org/v3/");
    assert_eq!(index.unwrap().as_str(), "https://api.nuget.org/v3/index.json");
}

#[test]
fn test_normalize_base_url_rejects_bad_input() {
    for raw in ["", "not a url", "ftp://example.org/v3/", "file:///tmp/index.json"] {
        let err = normalize_base_url(raw).unwrap_err();
        assert!(matches!(err, NuGetError::Build { .. }), "{raw}: {err:?}");
    }
}

#[test]
fn test_default_user_agent() {
    assert!(default_user_agent().starts_with("nuget-rs/"));
}

#[tokio::test]
async fn test_build_rejects_bad_url_without_network() {
    let err = NuGetClient::new("not a url").await.unwrap_err();
    assert!(matches!(err, NuGetError::Build { .. }));
}

#[tokio::test]
async fn test_build_resolves_fixture() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/index.json"))
        .and(header("Accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FIXTURE))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = NuGetClient::new(&format!("{}/v3", mock_server.uri())).await.unwrap();

    assert_eq!(client.index_url().as_str(), format!("{}/v3/index.json", mock_server.uri()));
    assert_eq!(
        client.endpoint_for(ServiceType::SearchQueryService).unwrap().as_str(),
        "https://azuresearch-ussc.nuget.org/query"
    );
    assert_eq!(
        client.endpoint_for(ServiceType::RegistrationsBaseUrl).unwrap().as_str(),
        "https://api.nuget.org/v3/registration5-gz-semver2"
    );
    assert_eq!(
        client.endpoint_for(ServiceType::PackageBaseAddress).unwrap().as_str(),
        "https://api.nuget.org/v3-flatcontainer/"
    );
    assert!(client.endpoint_for(ServiceType::ReadmeUriTemplate).is_none());
    assert_eq!(client.endpoints().len(), 10);
}

#[tokio::test]
async fn test_build_from_index_url() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/custom/feed.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FIXTURE))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = NuGetClient::new(&format!("{}/custom/feed.json", mock_server.uri()))
        .await
        .unwrap();
    assert_eq!(client.base_url().as_str(), format!("{}/custom/", mock_server.uri()));
    assert!(client.endpoint_for(ServiceType::Catalog).is_some());
}

#[tokio::test]
async fn test_index_url_source_ignores_index_path() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/custom/feed.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FIXTURE))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = NuGetClient::builder(format!("{}/custom/feed.json", mock_server.uri()))
        .index_path("other.json")
        .build()
        .await
        .unwrap();
    assert_eq!(
        client.index_url().as_str(),
        format!("{}/custom/feed.json", mock_server.uri())
    );
}

#[tokio::test]
async fn test_build_with_custom_index_path() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed/v3/service-index.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FIXTURE))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = NuGetClient::builder(format!("{}/feed/v3/", mock_server.uri()))
        .index_path("service-index.json")
        .build()
        .await
        .unwrap();
    assert!(!client.endpoints().is_empty());
}

#[tokio::test]
async fn test_build_fails_with_discovery_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/index.json"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&mock_server)
        .await;

    let err = NuGetClient::builder(format!("{}/v3/", mock_server.uri()))
        .retry_config(RetryConfig {
            max_attempts: 2,
            ..RetryConfig::default()
        })
        .backoff(Arc::new(ZeroBackoff))
        .build()
        .await
        .unwrap_err();

    match err {
        NuGetError::Discovery { url, message, .. } => {
            assert!(url.ends_with("/v3/index.json"));
            assert_eq!(message, "500 Internal Server Error");
        }
        other => panic!("expected discovery error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_build_cancelled() {
    let mock_server = MockServer::start().await;
    let token = CancellationToken::new();
    token.cancel();

    let err = NuGetClient::builder(format!("{}/v3/", mock_server.uri()))
        .cancellation(token)
        .build()
        .await
        .unwrap_err();
    assert!(matches!(err, NuGetError::Cancelled));
}

#[tokio::test]
async fn test_request_json_decodes_success() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/query"))
        .and(query_param("q", "json"))
        .and(header("Accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "totalHits": 2,
            "data": [{ "id": "Newtonsoft.Json" }, { "id": "System.Text.Json" }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = local_client(&mock_server).await;
    let search = client.endpoint_for(ServiceType::SearchQueryService).unwrap().clone();

    let page: SearchPage = client
        .request_json(Method::GET, search, (), RequestOptions::new().query("q", "json"))
        .await
        .unwrap();
    assert_eq!(page.total_hits, 2);
    assert_eq!(page.data[0].id, "Newtonsoft.Json");
}

#[tokio::test]
async fn test_request_json_not_found_uses_status_line() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flat/missing/index.json"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = local_client(&mock_server).await;
    let url = client.endpoint_url(ServiceType::PackageBaseAddress, "missing/index.json").unwrap();

    let err = client
        .request_json::<serde_json::Value>(Method::GET, url, (), RequestOptions::new())
        .await
        .unwrap_err();
    match err {
        NuGetError::Api(api) => {
            assert_eq!(api.status, 404);
            assert_eq!(api.message, "404 Not Found");
            assert!(api.code.is_none());
        }
        other => panic!("expected api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_request_json_error_envelope() {
    let mock_server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/v2/package"))
        .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
            "error": { "code": "PackageExists", "message": "Package already exists" }
        })))
        .mount(&mock_server)
        .await;

    let client = local_client(&mock_server).await;
    let url = client.endpoint_for(ServiceType::PackagePublish).unwrap().clone();

    let err = client
        .request_json::<serde_json::Value>(Method::PUT, url, (), RequestOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(409));
    assert_eq!(err.to_string(), "Package already exists");
}

#[tokio::test]
async fn test_request_json_decode_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&mock_server)
        .await;

    let client = local_client(&mock_server).await;
    let search = client.endpoint_for(ServiceType::SearchQueryService).unwrap().clone();

    let err = client
        .request_json::<SearchPage>(Method::GET, search, (), RequestOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, NuGetError::Decode { .. }));
}

#[tokio::test]
async fn test_request_bytes_and_relative_target() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/readme.md"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"# Readme".to_vec()))
        .mount(&mock_server)
        .await;

    let client = local_client(&mock_server).await;
    let bytes = client
        .request_bytes(Method::GET, "readme.md", (), RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(bytes, b"# Readme");
}

#[tokio::test]
async fn test_send_with_api_key() {
    let mock_server = MockServer::start().await;
    mount_index(&mock_server, local_index(&mock_server)).await;
    Mock::given(method("DELETE"))
        .and(path("/api/v2/package/Foo/1.0.0"))
        .and(header(API_KEY_HEADER, "oy2-secret"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = NuGetClient::builder(format!("{}/v3/", mock_server.uri()))
        .api_key("oy2-secret")
        .build()
        .await
        .unwrap();
    let url = client.endpoint_url(ServiceType::PackagePublish, "Foo/1.0.0").unwrap();

    let response = client.send(Method::DELETE, url, (), RequestOptions::new()).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_send_with_bearer_token_and_custom_user_agent() {
    let mock_server = MockServer::start().await;
    mount_index(&mock_server, local_index(&mock_server)).await;
    Mock::given(method("GET"))
        .and(path("/query"))
        .and(header("Authorization", "Bearer abc"))
        .and(header("User-Agent", "my-tool/2.0"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = NuGetClient::builder(format!("{}/v3/", mock_server.uri()))
        .bearer_token("abc")
        .user_agent("my-tool/2.0")
        .build()
        .await
        .unwrap();
    let search = client.endpoint_for(ServiceType::SearchQueryService).unwrap().clone();
    client.send(Method::GET, search, (), RequestOptions::new()).await.unwrap();
}

#[tokio::test]
async fn test_endpoint_url_and_template() {
    let mock_server = MockServer::start().await;
    let client = local_client(&mock_server).await;

    let url = client
        .endpoint_url(ServiceType::PackageBaseAddress, "/newtonsoft.json/index.json")
        .unwrap();
    assert_eq!(url.as_str(), format!("{}/flat/newtonsoft.json/index.json", mock_server.uri()));

    let details = client
        .endpoints()
        .expand(ServiceType::PackageDetailsUriTemplate, &[("id", "Serilog"), ("version", "3.1.1")])
        .unwrap();
    assert_eq!(details.as_str(), format!("{}/packages/Serilog/3.1.1", mock_server.uri()));

    let err = client.endpoint_url(ServiceType::Catalog, "page0.json").unwrap_err();
    assert!(matches!(err, NuGetError::Build { .. }));
}

#[tokio::test]
async fn test_shared_client_across_tasks() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "totalHits": 1,
            "data": [{ "id": "Serilog" }]
        })))
        .expect(16)
        .mount(&mock_server)
        .await;

    let client = local_client(&mock_server).await;
    let expected = client.endpoint_for(ServiceType::SearchQueryService).unwrap().clone();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let client = client.clone();
        let expected = expected.clone();
        handles.push(tokio::spawn(async move {
            let search = client.endpoint_for(ServiceType::SearchQueryService).unwrap().clone();
            assert_eq!(search, expected);
            let page: SearchPage = client
                .request_json(Method::GET, search, (), RequestOptions::new())
                .await
                .unwrap();
            page.total_hits
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), 1);
    }
}

struct FailingRefresher;

#[async_trait::async_trait]
impl TokenRefresher for FailingRefresher {
    async fn refresh(&self) -> ClientResult<AccessToken> {
        Err(NuGetError::Transport {
            message: "token endpoint unreachable".to_string(),
            source: None,
        })
    }
}

#[tokio::test]
async fn test_build_surfaces_refresh_failure_as_authentication() {
    let mock_server = MockServer::start().await;
    mount_index(&mock_server, local_index(&mock_server)).await;

    let stale = AccessToken::expiring("stale", chrono::Utc::now() - chrono::Duration::hours(1));
    let err = NuGetClient::builder(format!("{}/v3/", mock_server.uri()))
        .refreshing_token(stale, Arc::new(FailingRefresher))
        .build()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert!(matches!(err, NuGetError::Authentication { .. }));
}
