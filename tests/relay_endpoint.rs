//! End-to-end checks of the relay route against a local upstream.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Redirect};
use axum::routing::get;
use imgrelay::application::services::encode_component;
use imgrelay::domain::entities::AllowList;
use imgrelay::infrastructure::relay::{self, RELAY_CACHE_CONTROL, RelayState};
use serde_json::Value;
use tokio::net::TcpListener;

const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 1, 2, 3];

async fn spawn(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn spawn_upstream() -> SocketAddr {
    let app = Router::new()
        .route(
            "/img.png",
            get(|| async { ([(header::CONTENT_TYPE, "image/png")], PNG_BYTES) }),
        )
        .route("/untyped", get(|| async { Body::from(PNG_BYTES) }))
        .route("/moved", get(|| async { Redirect::temporary("/img.png") }))
        .route(
            "/missing",
            get(|| async { StatusCode::NOT_FOUND.into_response() }),
        )
        .route(
            "/slow.png",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                ([(header::CONTENT_TYPE, "image/png")], PNG_BYTES)
            }),
        );
    spawn(app).await
}

/// Upstream whose `/hop` redirects to `location`.
async fn spawn_redirector(location: String) -> SocketAddr {
    let app = Router::new().route(
        "/hop",
        get(move || {
            let location = location.clone();
            async move { Redirect::temporary(&location) }
        }),
    );
    spawn(app).await
}

async fn spawn_relay(timeout: Duration) -> SocketAddr {
    let state = RelayState::new(
        AllowList::new(["127.0.0.1"]),
        timeout,
        "imgrelay-tests",
        "/api/relay",
    )
    .unwrap();
    spawn(relay::router(state)).await
}

fn relay_url(relay: SocketAddr, target: &str) -> String {
    format!("http://{relay}/api/relay?url={}", encode_component(target))
}

async fn error_message(response: reqwest::Response) -> String {
    let body: Value = response.json().await.unwrap();
    body["error"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn relays_allowed_image_unchanged() {
    let upstream = spawn_upstream().await;
    let relay = spawn_relay(Duration::from_secs(5)).await;

    let response = reqwest::get(relay_url(relay, &format!("http://{upstream}/img.png")))
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE.as_str()], "image/png");
    assert_eq!(
        response.headers()[header::CACHE_CONTROL.as_str()],
        RELAY_CACHE_CONTROL
    );
    assert_eq!(response.bytes().await.unwrap().as_ref(), PNG_BYTES);
}

#[tokio::test]
async fn missing_content_type_defaults_to_jpeg() {
    let upstream = spawn_upstream().await;
    let relay = spawn_relay(Duration::from_secs(5)).await;

    let response = reqwest::get(relay_url(relay, &format!("http://{upstream}/untyped")))
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE.as_str()], "image/jpeg");
}

#[tokio::test]
async fn rejects_unlisted_domain() {
    let relay = spawn_relay(Duration::from_secs(5)).await;

    let response = reqwest::get(relay_url(relay, "https://evil.example/x.png"))
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);
    assert_eq!(error_message(response).await, "Domain not allowed");
}

#[tokio::test]
async fn rejects_missing_and_invalid_targets() {
    let relay = spawn_relay(Duration::from_secs(5)).await;

    let missing = reqwest::get(format!("http://{relay}/api/relay")).await.unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(error_message(missing).await, "URL parameter is required");

    let invalid = reqwest::get(relay_url(relay, "not a url")).await.unwrap();
    assert_eq!(invalid.status(), reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(error_message(invalid).await, "Invalid URL");

    let bad_encoding = reqwest::get(format!("http://{relay}/api/relay?url=%FF%FE"))
        .await
        .unwrap();
    assert_eq!(bad_encoding.status(), reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(error_message(bad_encoding).await, "Invalid URL encoding");
}

#[tokio::test]
async fn rejects_other_methods() {
    let relay = spawn_relay(Duration::from_secs(5)).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{relay}/api/relay"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(error_message(response).await, "Method not allowed");
}

#[tokio::test]
async fn answers_preflight() {
    let relay = spawn_relay(Duration::from_secs(5)).await;
    let client = reqwest::Client::new();

    let response = client
        .request(reqwest::Method::OPTIONS, format!("http://{relay}/api/relay"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
}

#[tokio::test]
async fn propagates_upstream_status() {
    let upstream = spawn_upstream().await;
    let relay = spawn_relay(Duration::from_secs(5)).await;

    let response = reqwest::get(relay_url(relay, &format!("http://{upstream}/missing")))
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    assert_eq!(
        error_message(response).await,
        "Failed to fetch image: Not Found"
    );
}

#[tokio::test]
async fn times_out_slow_upstream() {
    let upstream = spawn_upstream().await;
    let relay = spawn_relay(Duration::from_millis(200)).await;

    let response = reqwest::get(relay_url(relay, &format!("http://{upstream}/slow.png")))
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::REQUEST_TIMEOUT);
    assert_eq!(error_message(response).await, "Request timeout");
}

#[tokio::test]
async fn unreachable_upstream_is_bad_gateway() {
    let closed = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let relay = spawn_relay(Duration::from_secs(5)).await;

    let response = reqwest::get(relay_url(relay, &format!("http://{closed}/img.png")))
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn health_reports_ok() {
    let relay = spawn_relay(Duration::from_secs(5)).await;

    let body: Value = reqwest::get(format!("http://{relay}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn follows_redirect_within_allowed_host() {
    let upstream = spawn_upstream().await;
    let relay = spawn_relay(Duration::from_secs(5)).await;

    let response = reqwest::get(relay_url(relay, &format!("http://{upstream}/moved")))
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.bytes().await.unwrap().as_ref(), PNG_BYTES);
}

#[tokio::test]
async fn refuses_redirect_to_unlisted_host() {
    let internal = spawn(Router::new().route("/secret", get(|| async { "internal data" })))
        .await;
    let redirector = spawn_redirector(format!("http://localhost:{}/secret", internal.port())).await;
    let relay = spawn_relay(Duration::from_secs(5)).await;

    let response = reqwest::get(relay_url(relay, &format!("http://{redirector}/hop")))
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);
    let body = response.text().await.unwrap();
    assert!(!body.contains("internal data"));
    assert!(body.contains("Domain not allowed"));
}
