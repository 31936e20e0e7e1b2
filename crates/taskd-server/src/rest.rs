use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header::CONTENT_TYPE, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use taskd_core::{TdError, TdResult, Todo, TodoDraft, TodoId};

use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    create_router_with_cors(state, &[])
}

pub fn create_router_with_cors(state: Arc<AppState>, cors_allowed_origins: &[String]) -> Router {
    let router = Router::new()
        .route("/api/health", get(health))
        .route("/api/todos", get(list_todos).post(create_todo))
        .route("/api/todos/starred", get(starred_todos))
        .route("/api/todos/search", get(search_todos))
        .route("/api/todos/tags", get(all_tags))
        .route("/api/todos/overdue", get(overdue_todos))
        .route("/api/todos/today", get(todos_due_today))
        .route("/api/todos/statistics", get(statistics))
        .route("/api/todos/status/:completed", get(todos_by_status))
        .route("/api/todos/priority/:priority", get(todos_by_priority))
        .route("/api/todos/tag/:tag", get(todos_by_tag))
        .route(
            "/api/todos/:id",
            get(get_todo).put(update_todo).delete(delete_todo),
        )
        .route("/api/todos/:id/star", patch(toggle_starred))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if cors_allowed_origins.is_empty() {
        router
    } else {
        router.layer(build_cors_layer(cors_allowed_origins))
    }
}

fn build_cors_layer(cors_allowed_origins: &[String]) -> CorsLayer {
    let mut parsed = Vec::new();
    for origin in cors_allowed_origins {
        match HeaderValue::from_str(origin) {
            Ok(value) => parsed.push(value),
            Err(err) => tracing::warn!("ignoring invalid CORS origin '{origin}': {err}"),
        }
    }

    CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([CONTENT_TYPE])
        .allow_origin(parsed)
}

// --- DTOs ---

#[derive(Deserialize)]
struct ListParams {
    sort: Option<String>,
}

#[derive(Deserialize)]
struct SearchParams {
    q: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    todo_count: usize,
    version: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn err_json(msg: impl ToString) -> Json<ErrorBody> {
    Json(ErrorBody {
        error: msg.to_string(),
    })
}

fn internal_error(err: TdError) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, err_json(err)).into_response()
}

fn list_response(result: TdResult<Vec<Todo>>) -> Response {
    match result {
        Ok(todos) => Json(todos).into_response(),
        Err(err) => internal_error(err),
    }
}

// --- Handlers ---

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let count = state.engine.todo_count().await.unwrap_or(0);
    Json(HealthResponse {
        status: "ok".into(),
        todo_count: count,
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

/// GET /api/todos?sort=priority
async fn list_todos(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    list_response(state.engine.list_todos(params.sort.as_deref()).await)
}

/// GET /api/todos/:id
async fn get_todo(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TodoId>,
) -> impl IntoResponse {
    match state.engine.todo_by_id(id).await {
        Ok(Some(todo)) => Json(todo).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => internal_error(err),
    }
}

/// GET /api/todos/status/:completed
async fn todos_by_status(
    State(state): State<Arc<AppState>>,
    Path(completed): Path<bool>,
) -> impl IntoResponse {
    list_response(state.engine.todos_by_status(completed).await)
}

/// GET /api/todos/priority/:priority
///
/// The priority segment is matched as raw text, so an unknown value yields
/// an empty list rather than a client error.
async fn todos_by_priority(
    State(state): State<Arc<AppState>>,
    Path(priority): Path<String>,
) -> impl IntoResponse {
    list_response(state.engine.todos_by_priority(&priority).await)
}

/// GET /api/todos/starred
async fn starred_todos(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    list_response(state.engine.starred_todos().await)
}

/// GET /api/todos/search?q=keyword
async fn search_todos(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> impl IntoResponse {
    list_response(state.engine.search_todos(Some(&params.q)).await)
}

/// GET /api/todos/tag/:tag
async fn todos_by_tag(
    State(state): State<Arc<AppState>>,
    Path(tag): Path<String>,
) -> impl IntoResponse {
    list_response(state.engine.todos_by_tag(&tag).await)
}

/// GET /api/todos/tags
async fn all_tags(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.engine.all_tags().await {
        Ok(tags) => Json(tags).into_response(),
        Err(err) => internal_error(err),
    }
}

/// GET /api/todos/overdue
async fn overdue_todos(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    list_response(state.engine.overdue_todos().await)
}

/// GET /api/todos/today
async fn todos_due_today(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    list_response(state.engine.todos_due_today().await)
}

/// GET /api/todos/statistics
async fn statistics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.engine.statistics().await {
        Ok(stats) => Json(stats).into_response(),
        Err(err) => internal_error(err),
    }
}

/// POST /api/todos
async fn create_todo(
    State(state): State<Arc<AppState>>,
    Json(draft): Json<TodoDraft>,
) -> impl IntoResponse {
    match state.engine.create_todo(draft).await {
        Ok(todo) => (StatusCode::CREATED, Json(todo)).into_response(),
        Err(err) => internal_error(err),
    }
}

/// PUT /api/todos/:id
async fn update_todo(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TodoId>,
    Json(draft): Json<TodoDraft>,
) -> impl IntoResponse {
    match state.engine.update_todo(id, draft).await {
        Ok(todo) => Json(todo).into_response(),
        Err(TdError::TodoNotFound(_)) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => internal_error(err),
    }
}

/// PATCH /api/todos/:id/star
async fn toggle_starred(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TodoId>,
) -> impl IntoResponse {
    match state.engine.toggle_starred(id).await {
        Ok(todo) => Json(todo).into_response(),
        Err(TdError::TodoNotFound(_)) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => internal_error(err),
    }
}

/// DELETE /api/todos/:id
async fn delete_todo(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TodoId>,
) -> impl IntoResponse {
    match state.engine.delete_todo(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(TdError::TodoNotFound(_)) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => internal_error(err),
    }
}
