use assert_json_diff::assert_json_include;
use axum::body::{to_bytes, Body};
use designlens::app;
use designlens::config::ServiceConfig;
use designlens::handlers::AppState;
use http::{Request, StatusCode};
use secrecy::Secret;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Just enough bytes to sniff as a PNG
const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR fake pixel data";

fn state_with_upstream(base_url: &str) -> AppState {
    let mut config = ServiceConfig::default();
    config.gemini.base_url = base_url.to_string();
    AppState::new(config, Secret::new("test-key".to_string())).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Mount a generateContent mock that answers with a fenced analysis JSON
async fn mount_gemini_success(server: &MockServer) {
    let analysis = serde_json::json!({
        "changes": [{
            "category": "colors",
            "description_en": "Restore the brand blue on the primary button",
            "description_ar": "أعد اللون الأزرق للزر الأساسي",
            "severity": "moderate",
            "location": "primary button",
            "action_required": "Update the fill color"
        }],
        "similarity_score": 88.0,
        "summary_en": "Button color changed",
        "summary_ar": "تغير لون الزر",
        "designer_notes_en": ["Check hover states too"],
        "designer_notes_ar": ["تحقق من حالات التمرير أيضا"],
        "next_steps_en": ["Ship the fix"],
        "next_steps_ar": ["انشر الإصلاح"]
    });

    Mock::given(method("POST"))
        .and(path_regex("^/v1beta/models/.*:generateContent$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": format!("```json\n{}\n```", analysis) }] }
            }]
        })))
        .mount(server)
        .await;
}

async fn mount_image(server: &MockServer, url_path: &str) {
    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG))
        .mount(server)
        .await;
}

fn analyze_urls_request(server_uri: &str, v1: &str, v2: &str) -> Request<Body> {
    let body = serde_json::json!({
        "version1_url": format!("{}{}", server_uri, v1),
        "version2_url": format!("{}{}", server_uri, v2),
        "context": "Landing page refresh"
    });

    Request::builder()
        .method("POST")
        .uri("/analyze-urls")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Build a multipart body with the given (name, filename, bytes) parts
fn multipart_body(boundary: &str, parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, bytes) in parts {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        match filename {
            Some(filename) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n",
                    name, filename
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
            ),
        }
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}

#[tokio::test]
async fn test_root_lists_endpoints() {
    let state = state_with_upstream("http://localhost:1");
    let app = app(state);

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "active");
    assert_eq!(json["service"], "Design Version AI");
    assert_eq!(json["endpoints"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_rate_limit_endpoint_starts_fresh() {
    let state = state_with_upstream("http://localhost:1");
    let app = app(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/rate-limit")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_json_include!(
        actual: body_json(response).await,
        expected: serde_json::json!({
            "requests_per_minute_used": 0,
            "requests_per_minute_limit": 15,
            "daily_requests_used": 0,
            "daily_requests_limit": 1500,
            "can_make_request": true
        })
    );
}

#[tokio::test]
async fn test_analyze_urls_requires_both_urls() {
    let state = state_with_upstream("http://localhost:1");
    let app = app(state);

    let body = serde_json::json!({ "version1_url": "http://example.com/v1.png" });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/analyze-urls")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Both version URLs are required");
}

#[tokio::test]
async fn test_analyze_urls_happy_path_counts_one_admission() {
    let server = MockServer::start().await;
    mount_gemini_success(&server).await;
    mount_image(&server, "/designs/v1.png").await;
    mount_image(&server, "/designs/v2.png").await;

    let state = state_with_upstream(&server.uri());
    let app = app(state);

    let response = app
        .clone()
        .oneshot(analyze_urls_request(
            &server.uri(),
            "/designs/v1.png",
            "/designs/v2.png",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["error"], serde_json::Value::Null);
    assert_eq!(json["data"]["similarity_score"], 88.0);
    assert_eq!(json["data"]["summary_en"], "Button color changed");
    assert_eq!(json["data"]["changes_detected"][0]["category"], "colors");
    assert_eq!(json["data"]["analysis_id"], serde_json::Value::Null);

    // The admitted call is visible in the status endpoint.
    let response = app
        .oneshot(
            Request::builder()
                .uri("/rate-limit")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["requests_per_minute_used"], 1);
    assert_eq!(json["daily_requests_used"], 1);
}

#[tokio::test]
async fn test_analyze_urls_download_failure_is_bad_request() {
    let server = MockServer::start().await;
    mount_gemini_success(&server).await;
    mount_image(&server, "/designs/v2.png").await;
    // No mock for v1: wiremock answers 404.

    let state = state_with_upstream(&server.uri());
    let app = app(state);

    let response = app
        .oneshot(analyze_urls_request(
            &server.uri(),
            "/designs/missing.png",
            "/designs/v2.png",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Failed to download version 1");
}

#[tokio::test]
async fn test_analyze_multipart_happy_path() {
    let server = MockServer::start().await;
    mount_gemini_success(&server).await;

    let state = state_with_upstream(&server.uri());
    let app = app(state);

    let boundary = "designlens-test-boundary";
    let body = multipart_body(
        boundary,
        &[
            ("version1", Some("v1.png"), PNG),
            ("version2", Some("v2.png"), PNG),
            ("context", None, b"Checkout flow redesign"),
        ],
    );

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/analyze")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["similarity_score"], 88.0);
}

#[tokio::test]
async fn test_analyze_rejects_unrecognized_image() {
    let state = state_with_upstream("http://localhost:1");
    let app = app(state);

    let boundary = "designlens-test-boundary";
    let body = multipart_body(
        boundary,
        &[
            ("version1", Some("v1.txt"), b"this is not an image"),
            ("version2", Some("v2.png"), PNG),
        ],
    );

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/analyze")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(
        json["error"],
        "Version 1 validation failed: Invalid image: unrecognized format"
    );
}

#[tokio::test]
async fn test_analyze_missing_file_is_bad_request() {
    let state = state_with_upstream("http://localhost:1");
    let app = app(state);

    let boundary = "designlens-test-boundary";
    let body = multipart_body(boundary, &[("version1", Some("v1.png"), PNG)]);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/analyze")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Invalid request: version2 file is required");
}

#[tokio::test]
async fn test_slow_request_hits_server_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/designs/v1.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(PNG)
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;
    mount_image(&server, "/designs/v2.png").await;

    let mut config = ServiceConfig::default();
    config.gemini.base_url = server.uri();
    config.server.timeout_secs = 1;
    let state = AppState::new(config, Secret::new("test-key".to_string())).unwrap();

    let app = app(state);
    let response = app
        .oneshot(analyze_urls_request(
            &server.uri(),
            "/designs/v1.png",
            "/designs/v2.png",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
}

#[tokio::test]
async fn test_denied_request_never_reaches_upstream() {
    let server = MockServer::start().await;
    mount_image(&server, "/designs/v1.png").await;
    mount_image(&server, "/designs/v2.png").await;

    // The upstream mock asserts on drop that it was never called.
    Mock::given(method("POST"))
        .and(path_regex("^/v1beta/models/.*:generateContent$"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let state = state_with_upstream(&server.uri());

    // Exhaust the per-minute budget before the request arrives.
    for _ in 0..15 {
        assert!(state.gate.check_and_reserve().is_admitted());
    }

    let app = app(state);
    let response = app
        .oneshot(analyze_urls_request(
            &server.uri(),
            "/designs/v1.png",
            "/designs/v2.png",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Rate limit exceeded. Please wait a minute.");
}
