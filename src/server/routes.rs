use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::jobs::parse_job_urls;
use crate::AppState;

fn error_body(code: &str, message: String) -> Json<serde_json::Value> {
    Json(json!({ "code": code, "message": message }))
}

#[derive(Debug, Deserialize)]
pub struct ScheduleParams {
    #[serde(default)]
    force: bool,
}

/// POST {root}/
///
/// Schedules a new crawl job. The body is a newline-separated URL list;
/// `?force=true` bypasses the age-based cache check for the whole
/// submission. Responds with the new job id.
pub async fn schedule_job(
    State(state): State<AppState>,
    Query(params): Query<ScheduleParams>,
    body: String,
) -> impl IntoResponse {
    let urls = match parse_job_urls(&body) {
        Ok(urls) => urls,
        Err(e) => {
            tracing::warn!(error = %e, "rejected job submission");
            return (StatusCode::BAD_REQUEST, error_body("BadRequest", e.to_string()));
        }
    };

    match state.jobs.schedule(&urls, params.force).await {
        Ok(job_id) => (StatusCode::OK, Json(json!({ "jobId": job_id }))),
        Err(e) => {
            tracing::error!(error = %e, "job schedule failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body("DependencyFailure", "failed to schedule job".to_string()),
            )
        }
    }
}

/// GET {root}/status/{jobId}
///
/// Progress of a previously scheduled job.
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
) -> impl IntoResponse {
    match state.jobs.status(job_id).await {
        Ok(Some(status)) => (
            StatusCode::OK,
            Json(json!({
                "completed": status.completed,
                "pending": status.pending,
                "elapsed": humantime::format_duration(status.elapsed).to_string(),
                "urls": status.urls,
            })),
        ),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            error_body("NotFound", format!("no job {job_id}")),
        ),
        Err(e) => {
            tracing::error!(job_id, error = %e, "status query failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body("DependencyFailure", "failed to query job status".to_string()),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ResultParams {
    #[serde(default)]
    mime: String,
}

/// GET {root}/result/{jobId}?mime=<prefix>
///
/// Discovered URLs grouped by the page that referred to them, optionally
/// filtered by mime prefix.
pub async fn job_result(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
    Query(params): Query<ResultParams>,
) -> impl IntoResponse {
    match state.jobs.results(job_id, &params.mime).await {
        Ok(Some(results)) => (StatusCode::OK, Json(json!(results))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            error_body("NotFound", format!("no job {job_id}")),
        ),
        Err(e) => {
            tracing::error!(job_id, error = %e, "result query failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body("DependencyFailure", "failed to query job results".to_string()),
            )
        }
    }
}

/// GET {root}/health
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
