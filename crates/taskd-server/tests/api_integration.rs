//! Full-stack REST API integration tests.
//!
//! Each test spins up a real TodoEngine backed by a tempdir, constructs the
//! axum Router, and sends actual HTTP requests via `tower::ServiceExt`.
//! This validates routing, serialisation, handler logic, and storage in one
//! pass.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt; // for `.oneshot()`

use taskd_engine::{EngineConfig, TodoEngine};
use taskd_server::rest::{create_router, create_router_with_cors};
use taskd_server::state::AppState;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn setup() -> (Router, TempDir) {
    let tmp = TempDir::new().expect("tempdir");
    let config = EngineConfig {
        data_dir: tmp.path().to_string_lossy().into_owned(),
    };
    let engine = TodoEngine::init(config).expect("engine init");
    let state = Arc::new(AppState::new(Arc::new(engine)));
    (create_router(state), tmp)
}

fn json_request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    match body {
        Some(val) => builder.body(Body::from(val.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(router: &Router, request: Request<Body>) -> axum::response::Response {
    router.clone().oneshot(request).await.unwrap()
}

async fn body_bytes(resp: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = body_bytes(resp).await;
    serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
}

async fn create(router: &Router, body: Value) -> Value {
    let resp = send(router, json_request(Method::POST, "/api/todos", Some(body))).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    body_json(resp).await
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_endpoint_reports_count() {
    let (router, _tmp) = setup();

    let resp = send(&router, json_request(Method::GET, "/api/health", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["todo_count"], 0);

    create(&router, json!({"title": "one"})).await;
    let resp = send(&router, json_request(Method::GET, "/api/health", None)).await;
    assert_eq!(body_json(resp).await["todo_count"], 1);
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_applies_defaults() {
    let (router, _tmp) = setup();

    let body = create(&router, json!({"title": "Buy milk", "priority": null})).await;
    assert_eq!(body["title"], "Buy milk");
    assert_eq!(body["priority"], "MEDIUM");
    assert_eq!(body["completed"], false);
    assert_eq!(body["starred"], false);
    assert!(body["id"].as_i64().unwrap() > 0);
    assert_eq!(body["createdAt"], body["updatedAt"]);
    assert_eq!(body["tags"], json!([]));
}

#[tokio::test]
async fn create_without_title_is_rejected() {
    let (router, _tmp) = setup();

    let resp = send(
        &router,
        json_request(Method::POST, "/api/todos", Some(json!({"description": "x"}))),
    )
    .await;
    assert!(resp.status().is_client_error());
}

// ---------------------------------------------------------------------------
// Get / list
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_by_id_roundtrip_and_404() {
    let (router, _tmp) = setup();

    let created = create(
        &router,
        json!({
            "title": "Plan trip",
            "description": "book flights",
            "priority": "HIGH",
            "tags": ["travel", "summer"],
            "color": "#ff8800"
        }),
    )
    .await;
    let id = created["id"].as_i64().unwrap();

    let resp = send(
        &router,
        json_request(Method::GET, &format!("/api/todos/{id}"), None),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["description"], "book flights");
    assert_eq!(body["priority"], "HIGH");
    assert_eq!(body["tags"], json!(["summer", "travel"])); // sorted set
    assert_eq!(body["color"], "#ff8800");

    let resp = send(&router, json_request(Method::GET, "/api/todos/9999", None)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(body_bytes(resp).await.is_empty());
}

#[tokio::test]
async fn list_returns_all() {
    let (router, _tmp) = setup();
    create(&router, json!({"title": "a"})).await;
    create(&router, json!({"title": "b"})).await;

    let resp = send(&router, json_request(Method::GET, "/api/todos", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn priority_sort_ranks_high_then_newest() {
    let (router, _tmp) = setup();
    for (title, priority) in [
        ("low", "LOW"),
        ("high-old", "HIGH"),
        ("medium", "MEDIUM"),
        ("high-new", "HIGH"),
    ] {
        create(&router, json!({"title": title, "priority": priority})).await;
    }

    let resp = send(
        &router,
        json_request(Method::GET, "/api/todos?sort=priority", None),
    )
    .await;
    let body = body_json(resp).await;
    let titles: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["high-new", "high-old", "medium", "low"]);
}

// ---------------------------------------------------------------------------
// Filters & search
// ---------------------------------------------------------------------------

#[tokio::test]
async fn filter_endpoints() {
    let (router, _tmp) = setup();
    create(
        &router,
        json!({"title": "done", "completed": true, "starred": true, "tags": ["home"]}),
    )
    .await;
    create(&router, json!({"title": "open", "priority": "HIGH"})).await;

    for (uri, expected) in [
        ("/api/todos/status/true", 1),
        ("/api/todos/status/false", 1),
        ("/api/todos/priority/HIGH", 1),
        ("/api/todos/priority/URGENT", 0), // unknown value, empty list
        ("/api/todos/starred", 1),
        ("/api/todos/tag/home", 1),
        ("/api/todos/tag/work", 0),
    ] {
        let resp = send(&router, json_request(Method::GET, uri, None)).await;
        assert_eq!(resp.status(), StatusCode::OK, "uri: {uri}");
        let body = body_json(resp).await;
        assert_eq!(body.as_array().unwrap().len(), expected, "uri: {uri}");
    }
}

#[tokio::test]
async fn search_matches_title_and_description_case_sensitively() {
    let (router, _tmp) = setup();
    create(&router, json!({"title": "Buy Milk"})).await;
    create(&router, json!({"title": "groceries", "description": "buy milk and eggs"})).await;

    let resp = send(
        &router,
        json_request(Method::GET, "/api/todos/search?q=Milk", None),
    )
    .await;
    let body = body_json(resp).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["title"], "Buy Milk");

    // Blank keyword behaves as an unfiltered listing.
    let resp = send(
        &router,
        json_request(Method::GET, "/api/todos/search?q=", None),
    )
    .await;
    assert_eq!(body_json(resp).await.as_array().unwrap().len(), 2);

    // The q parameter itself is required.
    let resp = send(
        &router,
        json_request(Method::GET, "/api/todos/search", None),
    )
    .await;
    assert!(resp.status().is_client_error());
}

#[tokio::test]
async fn tags_endpoint_unions_and_forgets_deleted() {
    let (router, _tmp) = setup();
    let first = create(&router, json!({"title": "a", "tags": ["work", "urgent"]})).await;
    create(&router, json!({"title": "b", "tags": ["work", "home"]})).await;

    let resp = send(&router, json_request(Method::GET, "/api/todos/tags", None)).await;
    assert_eq!(body_json(resp).await, json!(["home", "urgent", "work"]));

    let id = first["id"].as_i64().unwrap();
    let resp = send(
        &router,
        json_request(Method::DELETE, &format!("/api/todos/{id}"), None),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = send(&router, json_request(Method::GET, "/api/todos/tags", None)).await;
    assert_eq!(body_json(resp).await, json!(["home", "work"]));
}

// ---------------------------------------------------------------------------
// Date windows
// ---------------------------------------------------------------------------

#[tokio::test]
async fn overdue_and_today_windows() {
    let (router, _tmp) = setup();
    let yesterday = create(
        &router,
        json!({
            "title": "yesterday",
            "completed": false,
            "dueDate": (Utc::now() - Duration::days(1)).to_rfc3339()
        }),
    )
    .await;
    create(
        &router,
        json!({
            "title": "tomorrow",
            "completed": false,
            "dueDate": (Utc::now() + Duration::days(1)).to_rfc3339()
        }),
    )
    .await;

    let resp = send(&router, json_request(Method::GET, "/api/todos/overdue", None)).await;
    let body = body_json(resp).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["id"], yesterday["id"]);

    let resp = send(&router, json_request(Method::GET, "/api/todos/today", None)).await;
    assert_eq!(body_json(resp).await.as_array().unwrap().len(), 0);
}

// ---------------------------------------------------------------------------
// Update / toggle / delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn put_is_full_replace() {
    let (router, _tmp) = setup();
    let created = create(
        &router,
        json!({"title": "Original", "priority": "HIGH", "starred": true, "tags": ["keep?"]}),
    )
    .await;
    let id = created["id"].as_i64().unwrap();

    let resp = send(
        &router,
        json_request(
            Method::PUT,
            &format!("/api/todos/{id}"),
            Some(json!({"title": "Replaced"})),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["title"], "Replaced");
    // Absent fields overwrite with defaults.
    assert_eq!(body["priority"], "MEDIUM");
    assert_eq!(body["starred"], false);
    assert_eq!(body["tags"], json!([]));
    assert_eq!(body["createdAt"], created["createdAt"]);

    let resp = send(
        &router,
        json_request(
            Method::PUT,
            "/api/todos/9999",
            Some(json!({"title": "ghost"})),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(body_bytes(resp).await.is_empty());
}

#[tokio::test]
async fn star_toggle_flips_and_404s() {
    let (router, _tmp) = setup();
    let created = create(&router, json!({"title": "Star me"})).await;
    let id = created["id"].as_i64().unwrap();
    let uri = format!("/api/todos/{id}/star");

    let resp = send(&router, json_request(Method::PATCH, &uri, None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let once = body_json(resp).await;
    assert_eq!(once["starred"], true);
    assert_eq!(once["createdAt"], created["createdAt"]);

    let resp = send(&router, json_request(Method::PATCH, &uri, None)).await;
    assert_eq!(body_json(resp).await["starred"], false);

    let resp = send(
        &router,
        json_request(Method::PATCH, "/api/todos/9999/star", None),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_then_404() {
    let (router, _tmp) = setup();
    let created = create(&router, json!({"title": "Remove me"})).await;
    let id = created["id"].as_i64().unwrap();
    let uri = format!("/api/todos/{id}");

    let resp = send(&router, json_request(Method::DELETE, &uri, None)).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(body_bytes(resp).await.is_empty());

    let resp = send(&router, json_request(Method::GET, &uri, None)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = send(&router, json_request(Method::DELETE, &uri, None)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn statistics_counters_add_up() {
    let (router, _tmp) = setup();
    create(&router, json!({"title": "done", "completed": true})).await;
    create(
        &router,
        json!({
            "title": "late",
            "priority": "HIGH",
            "starred": true,
            "dueDate": (Utc::now() - Duration::hours(2)).to_rfc3339()
        }),
    )
    .await;
    create(&router, json!({"title": "plain"})).await;

    let resp = send(
        &router,
        json_request(Method::GET, "/api/todos/statistics", None),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let stats = body_json(resp).await;
    assert_eq!(stats["total"], 3);
    assert_eq!(stats["completed"], 1);
    assert_eq!(stats["active"], 2);
    assert_eq!(stats["high_priority"], 1);
    assert_eq!(stats["overdue"], 1);
    assert_eq!(stats["starred"], 1);
}

// ---------------------------------------------------------------------------
// CORS
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cors_preflight_allows_configured_origin() {
    let tmp = TempDir::new().expect("tempdir");
    let config = EngineConfig {
        data_dir: tmp.path().to_string_lossy().into_owned(),
    };
    let engine = TodoEngine::init(config).expect("engine init");
    let state = Arc::new(AppState::new(Arc::new(engine)));
    let router = create_router_with_cors(state, &["http://localhost:3010".to_string()]);

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/todos")
        .header("origin", "http://localhost:3010")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();
    let resp = send(&router, request).await;

    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("http://localhost:3010")
    );
}
