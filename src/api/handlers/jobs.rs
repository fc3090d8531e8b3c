//! Read-only job status endpoints.

use axum::{
    Json, Router,
    extract::{Path, State, rejection::PathRejection},
    response::{IntoResponse, Response},
    routing::get,
};

use crate::api::dto::{JobResponse, StatsResponse};
use crate::api::middleware::handle_path_rejection;
use crate::error::AppResult;
use crate::jobs::JobId;
use crate::state::AppState;

pub fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/stats", get(job_stats))
        .route("/{id}", get(get_job))
}

/// Pending, running and failed counts per task identifier.
pub async fn job_stats(State(state): State<AppState>) -> AppResult<Json<StatsResponse>> {
    let stats = state.services.pipeline.stats().await?;
    Ok(Json(StatsResponse::from(stats)))
}

pub async fn get_job(
    State(state): State<AppState>,
    id: Result<Path<JobId>, PathRejection>,
) -> Response {
    let Path(id) = match id {
        Ok(id) => id,
        Err(rejection) => return handle_path_rejection(rejection),
    };

    match state.services.pipeline.get_job(id).await {
        Ok(job) => Json(JobResponse::from(job)).into_response(),
        Err(e) => e.into_response(),
    }
}
