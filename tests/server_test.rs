//! End-to-end tests of the HTTP control surface
//!
//! The router drives a real engine whose API client points at a wiremock
//! server, so these cover the whole path from HTTP request to remote call.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crawl_scheduler::config::EngineSettings;
use crawl_scheduler::scheduler::Engine;
use crawl_scheduler::server::{create_router, AppState};

async fn remote() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/spaces/s-1/knowledge/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "websites": { "items": [
                { "id": "w-1", "name": "Docs", "url": "https://docs.example.com" }
            ] }
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/websites/w-1/run/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "run-1" })))
        .mount(&server)
        .await;

    server
}

fn router() -> Router {
    let state = AppState {
        engine: Arc::new(Engine::new(EngineSettings::default())),
        start_time: Instant::now(),
    };
    create_router(state)
}

fn config_body(base_url: &str) -> String {
    json!({
        "api_key": "inp_0123456789abcdef",
        "base_url": base_url,
        "spaces": [
            { "space_id": "s-1", "schedule_minutes": 5, "crawl_all_space_websites": true }
        ]
    })
    .to_string()
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post(uri: &str, body: String) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn configure_start_and_read_status() {
    let remote = remote().await;
    let app = router();

    let (status, body) = send(&app, post("/config/alice", config_body(&remote.uri()))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));

    let (status, body) = send(&app, post("/start/alice", String::new())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["scheduled"], json!(1));

    let (status, body) = send(&app, get("/status/alice")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["started"], json!(true));
    assert_eq!(body["data"]["user"]["target_count"], json!(1));
    // the stored key is echoed back masked only
    let masked = body["data"]["user"]["api_key"].as_str().unwrap();
    assert!(masked.contains("..."));
    assert_ne!(masked, "inp_0123456789abcdef");

    let targets = body["data"]["targets"].as_array().unwrap();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0]["status"]["site_name"], json!("Docs"));
    assert_eq!(targets[0]["status"]["phase"], json!("idle"));
}

#[tokio::test]
async fn manual_run_triggers_remote_crawl() {
    let remote = remote().await;
    let app = router();

    send(&app, post("/config/alice", config_body(&remote.uri()))).await;
    send(&app, post("/start/alice", String::new())).await;

    let (status, body) = send(&app, post("/test/alice", String::new())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["fired"], json!(1));

    // the detached attempt settles against the mock quickly
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let (_, body) = send(&app, get("/status/alice")).await;
    let phase = &body["data"]["targets"][0]["status"]["phase"];
    assert_eq!(phase, &json!("succeeded"));
}

#[tokio::test]
async fn stop_clears_targets() {
    let remote = remote().await;
    let app = router();

    send(&app, post("/config/alice", config_body(&remote.uri()))).await;
    send(&app, post("/start/alice", String::new())).await;

    let (status, body) = send(&app, post("/stop/alice", String::new())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["stopped"], json!(1));

    let (_, body) = send(&app, get("/status/alice")).await;
    assert_eq!(body["data"]["user"]["started"], json!(false));
    assert_eq!(body["data"]["targets"], json!([]));
}

#[tokio::test]
async fn unknown_user_is_404() {
    let app = router();

    let (status, body) = send(&app, post("/start/ghost", String::new())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], json!(false));

    let (status, _) = send(&app, get("/status/ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_config_is_400() {
    let app = router();

    let bad = json!({
        "api_key": "wrong_prefix",
        "base_url": "https://backend.example.com",
        "spaces": []
    })
    .to_string();

    let (status, body) = send(&app, post("/config/alice", bad)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("inp_"));
}

#[tokio::test]
async fn users_and_health_endpoints() {
    let remote = remote().await;
    let app = router();

    let (_, body) = send(&app, get("/users")).await;
    assert_eq!(body["data"]["users"], json!([]));

    send(&app, post("/config/alice", config_body(&remote.uri()))).await;
    send(&app, post("/config/bob", config_body(&remote.uri()))).await;

    let (_, body) = send(&app, get("/users")).await;
    assert_eq!(body["data"]["users"], json!(["alice", "bob"]));

    let (status, body) = send(&app, get("/system/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], json!("healthy"));
    assert_eq!(body["data"]["users"], json!(2));

    let (status, body) = send(&app, get("/system/status-summary")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["users"], json!(2));
    assert_eq!(body["data"]["targets"], json!(0));
}
