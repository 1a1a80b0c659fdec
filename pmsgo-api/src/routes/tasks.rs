/// Task endpoints
///
/// Every query is scoped to the authenticated account. A task that belongs
/// to someone else is reported as not found.
///
/// Mutations are pushed to the owner's sockets as real-time events.
///
/// # Endpoints
///
/// - `POST /api/v1/tasks`
/// - `GET /api/v1/tasks?status=Completed`
/// - `GET /api/v1/tasks/summary`
/// - `GET /api/v1/tasks/:id`
/// - `PATCH /api/v1/tasks/:id`
/// - `DELETE /api/v1/tasks/:id`

use crate::{
    app::AppState,
    error::{ApiError, ApiJson, ApiResult},
    routes::DataResponse,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use pmsgo_shared::auth::middleware::AuthContext;
use pmsgo_shared::models::{NewTask, StatusCount, Task, TaskChanges};
use pmsgo_shared::realtime::RealtimeEvent;
use pmsgo_shared::validation::field_errors;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    pub status: Option<String>,
}

fn task_not_found() -> ApiError {
    ApiError::NotFound("Task not found".to_string())
}

pub async fn create_task(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<NewTask>,
) -> ApiResult<(StatusCode, Json<DataResponse<Task>>)> {
    let req = req.normalize();
    req.validate()
        .map_err(|e| ApiError::ValidationError(field_errors(&e)))?;

    let task = state.store.create_task(auth.account_id, req).await?;

    tracing::info!(task_id = %task.id, account_id = %auth.account_id, "Task created");
    state
        .realtime
        .emit(auth.account_id, RealtimeEvent::TaskCreated(task.clone()))
        .await;

    Ok((StatusCode::CREATED, Json(DataResponse::new(task))))
}

/// Newest first; `status` filters by exact match
pub async fn list_tasks(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<ListTasksQuery>,
) -> ApiResult<Json<DataResponse<Vec<Task>>>> {
    let status = query
        .status
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let tasks = state.store.list_tasks(auth.account_id, status).await?;
    Ok(Json(DataResponse::new(tasks)))
}

pub async fn task_summary(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<DataResponse<Vec<StatusCount>>>> {
    let summary = state.store.count_tasks_by_status(auth.account_id).await?;
    Ok(Json(DataResponse::new(summary)))
}

pub async fn get_task(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DataResponse<Task>>> {
    let task = state
        .store
        .find_task(id, auth.account_id)
        .await?
        .ok_or_else(task_not_found)?;

    Ok(Json(DataResponse::new(task)))
}

/// # Errors
///
/// - 400 Bad Request: no fields supplied
/// - 404 Not Found: unknown task or not the caller's
/// - 422 Unprocessable Entity: invalid title or status
pub async fn update_task(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    ApiJson(changes): ApiJson<TaskChanges>,
) -> ApiResult<Json<DataResponse<Task>>> {
    let changes = changes.normalize();
    if changes.is_empty() {
        return Err(ApiError::BadRequest("No changes supplied".to_string()));
    }
    changes
        .validate()
        .map_err(|e| ApiError::ValidationError(field_errors(&e)))?;

    let task = state
        .store
        .update_task(id, auth.account_id, changes)
        .await?
        .ok_or_else(task_not_found)?;

    tracing::info!(task_id = %task.id, status = %task.status, "Task updated");
    state
        .realtime
        .emit(auth.account_id, RealtimeEvent::TaskUpdated(task.clone()))
        .await;

    Ok(Json(DataResponse::new(task)))
}

pub async fn delete_task(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !state.store.delete_task(id, auth.account_id).await? {
        return Err(task_not_found());
    }

    tracing::info!(task_id = %id, "Task deleted");
    state
        .realtime
        .emit(auth.account_id, RealtimeEvent::TaskDeleted { id })
        .await;

    Ok(StatusCode::NO_CONTENT)
}
