//! REST endpoints and the NDJSON execution stream.

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderName, HeaderValue, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tokio_stream::StreamExt;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::info;

use super::dto::{
    ApiError, CreateTaskRequest, CreateTaskResponse, TaskListResponse, TaskStatusResponse,
};
use crate::error::TaskError;
use crate::orchestrator::TaskOrchestrator;
use crate::task::{TaskInput, TaskStatus};

pub const NDJSON: &str = "application/x-ndjson";
pub const TASK_ID_HEADER: HeaderName = HeaderName::from_static("x-task-id");

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: TaskOrchestrator,
}

/// Build the router with every task endpoint, CORS open to any origin.
pub fn task_routes(orchestrator: TaskOrchestrator) -> Router {
    let state = AppState { orchestrator };

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/{id}/status", get(task_status))
        .route("/tasks/{id}/execute", post(execute_task))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(state)
}

// ── Service info ────────────────────────────────────────────────────────

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "taskflow",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "GET /health",
            "create_task": "POST /tasks",
            "get_task_status": "GET /tasks/{task_id}/status",
            "execute_task": "POST /tasks/{task_id}/execute",
            "list_tasks": "GET /tasks"
        }
    }))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "taskflow"
    }))
}

// ── Tasks ───────────────────────────────────────────────────────────────

async fn create_task(
    State(state): State<AppState>,
    Json(body): Json<CreateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let input = TaskInput::parse(body.task_description)?;
    let task_id = state.orchestrator.create_task(input).await;
    Ok((
        StatusCode::OK,
        Json(CreateTaskResponse {
            task_id,
            status: TaskStatus::Pending,
        }),
    ))
}

async fn task_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    let task = state
        .orchestrator
        .get_task_state(&id)
        .await
        .ok_or(TaskError::NotFound { id })?;
    Ok(Json(task.into()))
}

async fn list_tasks(State(state): State<AppState>) -> Json<TaskListResponse> {
    let tasks = state.orchestrator.list_tasks().await;
    Json(TaskListResponse {
        total: tasks.len(),
        tasks,
    })
}

/// Stream the execution as newline-delimited JSON, one event per line.
async fn execute_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let task = state
        .orchestrator
        .get_task_state(&id)
        .await
        .ok_or_else(|| TaskError::NotFound { id: id.clone() })?;
    if task.status.is_active() {
        return Err(TaskError::AlreadyRunning { id }.into());
    }
    let task_id = HeaderValue::from_str(&id)
        .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, "Invalid task ID"))?;

    info!(task_id = %id, "Streaming task execution");
    let lines = state
        .orchestrator
        .execute_task(&id)
        .map(|event| event.to_ndjson());

    let mut res = Response::new(Body::from_stream(lines));
    res.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(NDJSON));
    res.headers_mut().insert(TASK_ID_HEADER, task_id);
    Ok(res)
}
