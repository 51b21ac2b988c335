//! Request and response bodies of the HTTP API.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::error::TaskError;
use crate::task::{Task, TaskStatus, TaskSummary};

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub task_description: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTaskResponse {
    pub task_id: String,
    pub status: TaskStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    pub task_id: String,
    pub status: TaskStatus,
    pub user_input: String,
    pub final_output: Option<String>,
    pub error_message: Option<String>,
}

impl From<Task> for TaskStatusResponse {
    fn from(task: Task) -> Self {
        Self {
            task_id: task.task_id,
            status: task.status,
            user_input: task.user_input,
            final_output: task.final_output,
            error_message: task.error_message,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskSummary>,
    pub total: usize,
}

/// Error reply, rendered as `{"detail": ...}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        match err {
            err @ TaskError::NotFound { .. } => Self::new(StatusCode::NOT_FOUND, err.to_string()),
            TaskError::InvalidInput { reason } => Self::new(StatusCode::BAD_REQUEST, reason),
            err @ TaskError::AlreadyRunning { .. } => {
                Self::new(StatusCode::CONFLICT, err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "detail": self.detail })),
        )
            .into_response()
    }
}
