// src/server/routes.rs

use super::{
    ServerState,
    tasks::{DeleteResult, Task, TaskOptionsRequest, TaskOptionsSummary, TaskState, resolve_task_options},
};
use crate::{downloader::resolve_inputs, error::AppError};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// 统一的错误响应: `{"error":{"code":..,"message":..}}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn unprocessable(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, code, message)
    }

    fn not_found(id: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", format!("task {} not found", id))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "code": self.code,
                "message": self.message,
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<AppError> for ApiError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::InvalidRequest(msg) => Self::unprocessable("invalid_options", msg),
            other => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub options: TaskOptionsRequest,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub vid: String,
    pub status: TaskState,
    pub progress: f32,
    pub created_at: DateTime<Utc>,
    pub options: TaskOptionsSummary,
}

impl From<&Task> for TaskResponse {
    fn from(task: &Task) -> Self {
        Self {
            vid: task.id.clone(),
            status: task.state,
            progress: task.progress,
            created_at: task.created_at,
            options: task.summary(),
        }
    }
}

/// POST /api/tasks
pub async fn create_task(
    State(state): State<ServerState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Vec<TaskResponse>>), ApiError> {
    let req: CreateTaskRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, "invalid_json", e.to_string()))?;
    let urls: Vec<String> = req
        .urls
        .iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect();
    if urls.is_empty() {
        return Err(ApiError::unprocessable("urls_empty", "urls empty"));
    }

    let options = resolve_task_options(&req.options, &state.context.config)?;
    let ids = resolve_inputs(
        &urls,
        state.context.catalog.as_ref(),
        &state.context.config.site_hosts,
    )
    .await;
    let created = state.store.insert_new(&ids, &options);
    if created.is_empty() {
        warn!("请求中没有可新增的任务: {:?}", urls);
        return Err(ApiError::unprocessable("no_new_tasks", "no new valid tasks"));
    }

    info!("POST /api/tasks 新增 {} 个任务", created.len());
    Ok((
        StatusCode::CREATED,
        Json(created.iter().map(TaskResponse::from).collect()),
    ))
}

/// GET /api/tasks
pub async fn list_tasks(State(state): State<ServerState>) -> Json<Vec<TaskResponse>> {
    Json(state.store.list().iter().map(TaskResponse::from).collect())
}

/// GET /api/tasks/{id}
pub async fn get_task(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<Json<TaskResponse>, ApiError> {
    state
        .store
        .get(&id)
        .map(|task| Json(TaskResponse::from(&task)))
        .ok_or_else(|| ApiError::not_found(&id))
}

/// DELETE /api/tasks/{id}
pub async fn delete_task(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    match state.store.delete(&id) {
        DeleteResult::Deleted => Ok(StatusCode::NO_CONTENT),
        DeleteResult::NotFound => Err(ApiError::not_found(&id)),
        DeleteResult::NotQueued => Err(ApiError::new(
            StatusCode::CONFLICT,
            "not_queued",
            "only queued task can be deleted",
        )),
    }
}
