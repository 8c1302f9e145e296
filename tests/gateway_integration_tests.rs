//! # Gateway Integration Tests
//!
//! End-to-end tests of the `/api/{service}/{path...}` surface against fake backends:
//! - public/protected gating and credential propagation
//! - verbatim pass-through of backend status, body and content type
//! - gateway-origin failures (unknown service, unreachable or slow backend)
//! - concurrent, independent request handling

use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, Request, StatusCode},
    Router,
};
use axum_test::TestServer;
use bytes::Bytes;
use intake_gateway::gateway::build_router;
use intake_gateway::{Dispatcher, GatewayConfig};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tower::ServiceExt;
use wiremock::matchers::{body_string, header as header_eq, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Address nothing listens on
const UNREACHABLE: &str = "http://127.0.0.1:1";

fn test_config(auth: &str, core: &str) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.services.insert("auth".to_string(), auth.to_string());
    config.services.insert("core".to_string(), core.to_string());
    config.server.timeouts.upstream_timeout = Duration::from_millis(500);
    config.server.timeouts.connect_timeout = Duration::from_millis(500);
    config.validate().unwrap();
    config
}

fn app_for(config: &GatewayConfig) -> Router {
    let dispatcher = Dispatcher::from_config(config).unwrap();
    build_router(dispatcher, config, None)
}

fn bearer(token: &str) -> (HeaderName, HeaderValue) {
    (
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    )
}

/// Login through the public token route
#[tokio::test]
async fn test_public_login_passes_through() {
    let auth = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(header_eq("content-type", "application/x-www-form-urlencoded"))
        .and(body_string("username=alice&password=secret"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "abc", "token_type": "bearer"})),
        )
        .expect(1)
        .mount(&auth)
        .await;

    let server = TestServer::new(app_for(&test_config(&auth.uri(), UNREACHABLE))).unwrap();

    let response = server
        .post("/api/auth/token")
        .content_type("application/x-www-form-urlencoded")
        .bytes(Bytes::from_static(b"username=alice&password=secret"))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body, json!({"access_token": "abc", "token_type": "bearer"}));
}

/// Protected route without a credential never reaches the backend
#[tokio::test]
async fn test_protected_route_without_token_is_rejected() {
    let core = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/forms/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&core)
        .await;

    let server = TestServer::new(app_for(&test_config(UNREACHABLE, &core.uri()))).unwrap();

    let response = server.get("/api/core/forms/").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        "Bearer"
    );
    let body: Value = response.json();
    assert_eq!(body["detail"], "Not authenticated");
    assert_eq!(body["error"]["type"], "unauthenticated");

    let response = server
        .get("/api/core/forms/")
        .add_header(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcjpwYXNz"),
        )
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

/// Public submission with the backend down resolves to 502 instead of hanging
#[tokio::test]
async fn test_public_route_with_unreachable_backend() {
    let server = TestServer::new(app_for(&test_config(UNREACHABLE, UNREACHABLE))).unwrap();

    let response = server
        .post("/api/core/apply/")
        .json(&json!({"form_id": 1, "form_data": {"name": "Ada"}}))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_GATEWAY);
    let body: Value = response.json();
    assert_eq!(body["error"]["type"], "upstream_unavailable");
    assert!(!response.text().contains("127.0.0.1"));
}

/// A backend slower than the upstream timeout yields 504
#[tokio::test]
async fn test_slow_backend_times_out() {
    let core = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/apply/"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({"id": 1}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&core)
        .await;

    let server = TestServer::new(app_for(&test_config(UNREACHABLE, &core.uri()))).unwrap();

    let response = server
        .post("/api/core/apply/")
        .json(&json!({"form_id": 1}))
        .await;

    assert_eq!(response.status_code(), StatusCode::GATEWAY_TIMEOUT);
    let body: Value = response.json();
    assert_eq!(body["error"]["type"], "upstream_timeout");
}

/// Backend error statuses are passed through with their original detail
#[tokio::test]
async fn test_backend_not_found_passes_through() {
    let core = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/admin/applications/5/mark/"))
        .and(header_eq("authorization", "Bearer abc"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"detail": "Application not found"})),
        )
        .expect(1)
        .mount(&core)
        .await;

    let server = TestServer::new(app_for(&test_config(UNREACHABLE, &core.uri()))).unwrap();

    let (name, value) = bearer("abc");
    let response = server
        .put("/api/core/admin/applications/5/mark/")
        .add_header(name, value)
        .json(&json!({"status": "reviewed"}))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body, json!({"detail": "Application not found"}));
}

/// Unknown services are rejected without affecting later requests
#[tokio::test]
async fn test_unknown_service_returns_404() {
    let auth = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/register/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 3})))
        .expect(1)
        .mount(&auth)
        .await;

    let server = TestServer::new(app_for(&test_config(&auth.uri(), UNREACHABLE))).unwrap();

    let response = server.get("/api/unknown_service/x").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["detail"], "Service not found");
    assert_eq!(body["error"]["type"], "service_not_found");

    let response = server
        .post("/api/auth/register/")
        .json(&json!({"email": "a@b.c", "username": "a", "password": "p"}))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

/// Status 201 and the JSON body come back unmodified
#[tokio::test]
async fn test_created_response_round_trip() {
    let core = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/forms/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 7})))
        .mount(&core)
        .await;

    let server = TestServer::new(app_for(&test_config(UNREACHABLE, &core.uri()))).unwrap();

    let (name, value) = bearer("abc");
    let response = server
        .post("/api/core/forms/")
        .add_header(name, value)
        .json(&json!({"title": "Intern", "description": "", "field_config": []}))
        .await;

    assert_eq!(response.status_code(), StatusCode::CREATED);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    let body: Value = response.json();
    assert_eq!(body, json!({"id": 7}));
}

/// Non-JSON bodies are opaque payloads, not errors
#[tokio::test]
async fn test_plain_text_body_passes_through() {
    let core = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/field-types/"))
        .respond_with(
            ResponseTemplate::new(500)
                .insert_header("content-type", "text/plain; charset=utf-8")
                .set_body_string("Internal Server Error"),
        )
        .mount(&core)
        .await;

    let server = TestServer::new(app_for(&test_config(UNREACHABLE, &core.uri()))).unwrap();

    let (name, value) = bearer("abc");
    let response = server.get("/api/core/field-types/").add_header(name, value).await;

    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/plain; charset=utf-8"
    );
    assert_eq!(response.text(), "Internal Server Error");
}

/// Query strings are forwarded and the bearer token reaches protected backends
#[tokio::test]
async fn test_query_and_credential_forwarded() {
    let core = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/applications/"))
        .and(query_param("form_id", "3"))
        .and(header_eq("authorization", "Bearer abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .expect(1)
        .mount(&core)
        .await;

    let server = TestServer::new(app_for(&test_config(UNREACHABLE, &core.uri()))).unwrap();

    let (name, value) = bearer("abc");
    let response = server
        .get("/api/core/applications/?form_id=3")
        .add_header(name, value)
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body, json!([{"id": 1}]));
}

/// Public routes are forwarded without any Authorization header
#[tokio::test]
async fn test_public_route_strips_inbound_authorization() {
    let core = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/apply/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 9})))
        .expect(1)
        .mount(&core)
        .await;

    let server = TestServer::new(app_for(&test_config(UNREACHABLE, &core.uri()))).unwrap();

    let (name, value) = bearer("stale");
    let response = server
        .post("/api/core/apply/")
        .add_header(name, value)
        .json(&json!({"form_id": 1}))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);

    let received = core.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert!(received[0].headers.get("authorization").is_none());
    assert!(received[0].headers.get("x-request-id").is_some());
}

/// Trailing slashes are significant: `apply` is not the public `apply/`
#[tokio::test]
async fn test_public_matching_is_exact() {
    let core = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&core)
        .await;

    let app = app_for(&test_config(UNREACHABLE, &core.uri()));
    let server = TestServer::new(app).unwrap();

    for uri in ["/api/core/apply", "/api/core/apply/extra", "/api/core/applyx/"] {
        let response = server.post(uri).json(&json!({})).await;
        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED, "{}", uri);
    }
}

/// Methods outside GET/POST/PUT/DELETE/PATCH are not routed
#[tokio::test]
async fn test_unsupported_method_rejected() {
    let mut config = test_config(UNREACHABLE, UNREACHABLE);
    config.cors.enabled = false;
    let app = app_for(&config);

    let request = Request::builder()
        .method("TRACE")
        .uri("/api/core/forms/")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

/// Oversized bodies are refused before any forwarding
#[tokio::test]
async fn test_request_body_limit() {
    let core = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&core)
        .await;

    let mut config = test_config(UNREACHABLE, &core.uri());
    config.server.max_request_size = 16;
    let server = TestServer::new(app_for(&config)).unwrap();

    let response = server
        .post("/api/core/apply/")
        .bytes(Bytes::from(vec![b'a'; 64]))
        .await;
    assert_eq!(response.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
}

/// Many simultaneous requests are handled independently
#[tokio::test]
async fn test_concurrent_requests_are_independent() {
    let core = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/forms/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"id": 1}]))
                .set_delay(Duration::from_millis(50)),
        )
        .expect(20)
        .mount(&core)
        .await;

    let app = app_for(&test_config(UNREACHABLE, &core.uri()));

    let requests = (0..40).map(|i| {
        let app = app.clone();
        async move {
            let mut builder = Request::builder().method("GET");
            builder = match i % 4 {
                0 | 1 => builder
                    .uri("/api/core/forms/")
                    .header("authorization", format!("Bearer token-{}", i)),
                2 => builder.uri("/api/core/forms/"),
                _ => builder.uri("/api/missing/forms/"),
            };
            let response = app
                .oneshot(builder.body(Body::empty()).unwrap())
                .await
                .unwrap();
            (i, response.status())
        }
    });

    for (i, status) in futures::future::join_all(requests).await {
        let expected = match i % 4 {
            0 | 1 => StatusCode::OK,
            2 => StatusCode::UNAUTHORIZED,
            _ => StatusCode::NOT_FOUND,
        };
        assert_eq!(status, expected, "request {}", i);
    }
}

/// Every response carries a request id, echoing a caller-supplied one
#[tokio::test]
async fn test_request_id_echoed() {
    let server = TestServer::new(app_for(&test_config(UNREACHABLE, UNREACHABLE))).unwrap();

    let response = server
        .get("/api/unknown/x")
        .add_header(
            HeaderName::from_static("x-request-id"),
            HeaderValue::from_static("trace-42"),
        )
        .await;
    assert_eq!(response.headers().get("x-request-id").unwrap(), "trace-42");

    let response = server.get("/api/core/forms/").await;
    assert!(response.headers().get("x-request-id").is_some());
}

/// Health, readiness and non-API paths
#[tokio::test]
async fn test_health_ready_and_fallback() {
    let server = TestServer::new(app_for(&test_config(UNREACHABLE, UNREACHABLE))).unwrap();

    let response = server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");

    let response = server.get("/ready").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["checks"]["services"], json!(["auth", "core"]));
    assert_eq!(body["checks"]["public_routes"], 3);

    let response = server.get("/not-api").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"]["type"], "route_not_found");
}

/// JSON bodies are returned byte for byte, including key order and large integers
#[tokio::test]
async fn test_json_body_bytes_are_preserved() {
    let raw = r#"{"token_type":"bearer","access_token":"abc","id":123456789012345678901234567890}"#;
    let auth = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(raw, "application/json"))
        .mount(&auth)
        .await;

    let server = TestServer::new(app_for(&test_config(&auth.uri(), UNREACHABLE))).unwrap();

    let response = server
        .post("/api/auth/token")
        .content_type("application/x-www-form-urlencoded")
        .bytes(Bytes::from_static(b"username=alice&password=secret"))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.text(), raw);
}

/// Dropping the in-flight handler closes the upstream connection
#[tokio::test]
async fn test_client_disconnect_cancels_upstream_call() {
    // Backend that accepts the request and never answers
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = format!("http://{}", listener.local_addr().unwrap());

    let mut config = test_config(UNREACHABLE, &backend);
    config.server.timeouts.upstream_timeout = Duration::from_secs(30);
    let app = app_for(&config);

    let (name, value) = bearer("abc");
    let request = Request::builder()
        .method("GET")
        .uri("/api/core/forms/")
        .header(name, value)
        .body(Body::empty())
        .unwrap();
    let in_flight = tokio::spawn(app.oneshot(request));

    let (mut socket, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
        .await
        .unwrap()
        .unwrap();
    let mut buf = vec![0u8; 8192];
    let n = socket.read(&mut buf).await.unwrap();
    assert!(String::from_utf8_lossy(&buf[..n]).starts_with("GET /forms/ HTTP/1.1"));

    in_flight.abort();
    assert!(in_flight.await.unwrap_err().is_cancelled());

    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "upstream connection still open after cancellation");
}

/// `/api/` with no service segment falls through, an empty segment is an unknown service
#[tokio::test]
async fn test_empty_service_segment() {
    let app = app_for(&test_config(UNREACHABLE, UNREACHABLE));

    for (uri, expected_type) in [
        ("/api/", "route_not_found"),
        ("/api//forms/", "service_not_found"),
    ] {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["type"], expected_type, "{}", uri);
    }
}
