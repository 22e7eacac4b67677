//! Fetch backends against a mock server

use page_harvest::config::ClientConfig;
use page_harvest::fetch::{build_http_client, ExtractApiFetcher, HttpFetcher};
use page_harvest::{FetchRequest, Fetcher};
use serde_json::json;
use wiremock::matchers::{body_json, body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> reqwest::Client {
    build_http_client(&ClientConfig {
        timeout_secs: 5,
        ..ClientConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_http_get_returns_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/company-list/p-1-company.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<table id=\"table\"></table>"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(client(), None);
    let url = format!("{}/company-list/p-1-company.html", server.uri());
    let payload = fetcher.fetch(&FetchRequest::get(url)).await.unwrap();

    assert_eq!(payload.status, 200);
    assert_eq!(payload.text(), "<table id=\"table\"></table>");
}

#[tokio::test]
async fn test_http_status_classification() {
    let server = MockServer::start().await;
    for (route, status) in [("/missing", 404), ("/busy", 429), ("/down", 503), ("/denied", 403)] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
    }

    let fetcher = HttpFetcher::new(client(), None);
    let fetch = |route: &str| {
        let request = FetchRequest::get(format!("{}{}", server.uri(), route));
        let fetcher = &fetcher;
        async move { fetcher.fetch(&request).await }
    };

    assert!(!fetch("/missing").await.unwrap_err().retryable);
    assert!(!fetch("/denied").await.unwrap_err().retryable);
    assert!(fetch("/busy").await.unwrap_err().retryable);
    assert!(fetch("/down").await.unwrap_err().retryable);
}

#[tokio::test]
async fn test_http_post_sends_body_headers_and_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(header("Content-Type", "application/json"))
        .and(header("Authorization", "Bearer secret-token"))
        .and(body_string(r#"{"pageNumber": 2}"#))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data": []}"#))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(client(), Some("secret-token".to_string()));
    let request = FetchRequest::post(format!("{}/search", server.uri()), r#"{"pageNumber": 2}"#)
        .with_header("Content-Type", "application/json");

    let payload = fetcher.fetch(&request).await.unwrap();
    assert_eq!(payload.text(), r#"{"data": []}"#);
}

#[tokio::test]
async fn test_extract_api_decodes_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/extract"))
        .and(header("Authorization", "Basic dGVzdC1rZXk6"))
        .and(body_json(json!({
            "url": "https://records.example.com/document?id=7",
            "httpRequestMethod": "GET",
            "httpResponseBody": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": "https://records.example.com/document?id=7",
            "statusCode": 200,
            "httpResponseBody": "aGVsbG8="
        })))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = ExtractApiFetcher::new(
        client(),
        format!("{}/v1/extract", server.uri()),
        "test-key".to_string(),
    );
    let payload = fetcher
        .fetch(&FetchRequest::get("https://records.example.com/document?id=7"))
        .await
        .unwrap();

    assert_eq!(payload.status, 200);
    assert_eq!(payload.body, b"hello");
}

#[tokio::test]
async fn test_extract_api_forwards_post_jobs() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/extract"))
        .and(body_json(json!({
            "url": "https://records.example.com/search",
            "httpRequestMethod": "POST",
            "httpResponseBody": true,
            "customHttpRequestHeaders": [
                {"name": "Content-Type", "value": "application/json; charset=UTF-8"}
            ],
            "httpRequestText": "{\"data\": {\"pageNumber\": 1}}"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "statusCode": 200,
            "httpResponseBody": "e30="
        })))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = ExtractApiFetcher::new(
        client(),
        format!("{}/v1/extract", server.uri()),
        "test-key".to_string(),
    );
    let request = FetchRequest::post(
        "https://records.example.com/search",
        r#"{"data": {"pageNumber": 1}}"#,
    )
    .with_header("Content-Type", "application/json; charset=UTF-8");

    let payload = fetcher.fetch(&request).await.unwrap();
    assert_eq!(payload.text(), "{}");
}

#[tokio::test]
async fn test_extract_api_error_classification() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/unauthorized"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/overloaded"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/target-missing"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"statusCode": 404})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/no-body"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"statusCode": 200})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/garbled"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"statusCode": 200, "httpResponseBody": "%%%"})),
        )
        .mount(&server)
        .await;

    let request = FetchRequest::get("https://records.example.com/document?id=1");
    let fetch = |endpoint: &str| {
        let fetcher = ExtractApiFetcher::new(
            client(),
            format!("{}{}", server.uri(), endpoint),
            "test-key".to_string(),
        );
        let request = request.clone();
        async move { fetcher.fetch(&request).await }
    };

    assert!(!fetch("/unauthorized").await.unwrap_err().retryable);
    assert!(fetch("/overloaded").await.unwrap_err().retryable);
    assert!(!fetch("/target-missing").await.unwrap_err().retryable);
    assert!(!fetch("/no-body").await.unwrap_err().retryable);
    assert!(!fetch("/garbled").await.unwrap_err().retryable);
}

#[tokio::test]
async fn test_extract_api_returns_browser_html() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/extract"))
        .and(body_json(json!({
            "url": "https://www.zaubacorp.com/company-list/p-1-company.html",
            "browserHtml": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": "https://www.zaubacorp.com/company-list/p-1-company.html",
            "statusCode": 200,
            "browserHtml": "<html><body><table id=\"table\"></table></body></html>"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = ExtractApiFetcher::new(
        client(),
        format!("{}/v1/extract", server.uri()),
        "test-key".to_string(),
    );
    let request =
        FetchRequest::get("https://www.zaubacorp.com/company-list/p-1-company.html").rendered();
    let payload = fetcher.fetch(&request).await.unwrap();

    assert_eq!(
        payload.text(),
        "<html><body><table id=\"table\"></table></body></html>"
    );

    // A rendered request whose reply lacks browserHtml is not retried
    server.reset().await;
    Mock::given(method("POST"))
        .and(path("/v1/extract"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "statusCode": 200,
            "httpResponseBody": "e30="
        })))
        .mount(&server)
        .await;
    assert!(!fetcher.fetch(&request).await.unwrap_err().retryable);
}
