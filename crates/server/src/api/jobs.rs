//! Job API handlers.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use dlsync_core::{JobRecord, JobStatus, ManagerError, NewJob, RetryError, RetryStats};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing jobs
#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    /// Only return jobs in this status
    pub status: Option<JobStatus>,
}

/// Response for listing jobs
#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobRecord>,
    pub total: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Map a manager error to an HTTP response.
fn manager_error_response(err: ManagerError) -> Response {
    match &err {
        ManagerError::JobNotFound(_) => error_response(StatusCode::NOT_FOUND, err.to_string()),
        ManagerError::InvalidState { .. } => error_response(StatusCode::CONFLICT, err.to_string()),
        ManagerError::InvalidRequest(_) => {
            error_response(StatusCode::BAD_REQUEST, err.to_string())
        }
        ManagerError::Retry(RetryError::CircuitOpen { remaining, .. }) => {
            let retry_after = remaining.as_secs_f64().ceil() as u64;
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::RETRY_AFTER, retry_after.to_string())],
                Json(ErrorResponse {
                    error: err.to_string(),
                }),
            )
                .into_response()
        }
        ManagerError::Retry(RetryError::Exhausted { .. }) | ManagerError::Engine(_) => {
            error_response(StatusCode::BAD_GATEWAY, err.to_string())
        }
        ManagerError::Persistence(_) => {
            error!("Persistence error while handling request: {}", err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// List jobs, oldest first
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListJobsParams>,
) -> Json<ListJobsResponse> {
    let jobs: Vec<JobRecord> = state
        .manager()
        .list()
        .into_iter()
        .filter(|job| params.status.is_none_or(|status| job.status == status))
        .collect();

    Json(ListJobsResponse {
        total: jobs.len(),
        jobs,
    })
}

/// Submit a new job
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewJob>,
) -> Result<(StatusCode, Json<JobRecord>), Response> {
    state
        .manager()
        .submit(body)
        .await
        .map(|job| (StatusCode::CREATED, Json(job)))
        .map_err(manager_error_response)
}

/// Get a job by ID
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobRecord>, Response> {
    state
        .manager()
        .get(&id)
        .map(Json)
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, format!("job not found: {}", id)))
}

/// Remove a job from the table
pub async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobRecord>, Response> {
    state
        .manager()
        .remove(&id)
        .await
        .map(Json)
        .map_err(manager_error_response)
}

/// Cancel an unfinished job
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobRecord>, Response> {
    state
        .manager()
        .cancel(&id)
        .await
        .map(Json)
        .map_err(manager_error_response)
}

/// Retry a failed, cancelled or paused job
///
/// Returns once the engine accepted the retry or every attempt failed.
pub async fn retry_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobRecord>, Response> {
    state
        .manager()
        .retry(&id)
        .await
        .map(Json)
        .map_err(manager_error_response)
}

/// Retry and circuit breaker state for a job
pub async fn get_retry_stats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RetryStats>, Response> {
    state
        .manager()
        .retry_stats(&id)
        .map(Json)
        .map_err(manager_error_response)
}
