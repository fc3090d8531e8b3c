//! Maps application errors onto HTTP responses.

use axum::{
    Json,
    extract::rejection::PathRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::api::dto::ErrorResponse;
use crate::error::AppError;
use crate::jobs::JobError;

/// Status code for an application error.
pub fn error_to_status_code(error: &AppError) -> StatusCode {
    match error {
        AppError::NotFound { .. } => StatusCode::NOT_FOUND,
        AppError::Validation { .. } | AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        AppError::Conflict { .. } => StatusCode::CONFLICT,
        AppError::ConnectionPool { .. } => StatusCode::SERVICE_UNAVAILABLE,
        AppError::Job(job) => match job {
            JobError::NotFound { .. } => StatusCode::NOT_FOUND,
            JobError::Locked { .. } | JobError::StaleRevision { .. } => StatusCode::CONFLICT,
            JobError::Validation { .. } | JobError::InvalidPayload { .. } | JobError::UnknownTask(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
        AppError::Database { .. } | AppError::Configuration { .. } | AppError::Internal { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Machine-readable error code for an application error.
pub fn error_to_code(error: &AppError) -> &'static str {
    match error {
        AppError::NotFound { .. } => "NOT_FOUND",
        AppError::Validation { .. } => "VALIDATION_ERROR",
        AppError::BadRequest { .. } => "BAD_REQUEST",
        AppError::Conflict { .. } => "CONFLICT",
        AppError::Database { .. } => "DATABASE_ERROR",
        AppError::Configuration { .. } => "CONFIGURATION_ERROR",
        AppError::ConnectionPool { .. } => "SERVICE_UNAVAILABLE",
        AppError::Job(JobError::NotFound { .. }) => "NOT_FOUND",
        AppError::Job(JobError::Locked { .. }) => "JOB_LOCKED",
        AppError::Job(JobError::StaleRevision { .. }) => "CONFLICT",
        AppError::Job(
            JobError::Validation { .. } | JobError::InvalidPayload { .. } | JobError::UnknownTask(_),
        ) => "VALIDATION_ERROR",
        AppError::Job(_) | AppError::Internal { .. } => "INTERNAL_ERROR",
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = error_to_status_code(&self);
        let code = error_to_code(&self);

        // Server-side failures are logged in full and reported generically
        let response = if status.is_server_error() {
            tracing::error!(error = %self, error_debug = ?self, "Request failed");
            let message = match &self {
                AppError::ConnectionPool { .. } => "Database connection unavailable".to_string(),
                AppError::Database { operation, .. } => format!("Database operation failed: {operation}"),
                _ => "An internal error occurred".to_string(),
            };
            ErrorResponse::new(code, &message)
        } else {
            match &self {
                AppError::NotFound { entity, field, value } => {
                    ErrorResponse::not_found_error(entity, field, value)
                }
                AppError::Validation { field, reason } => ErrorResponse::validation_error(field, reason),
                AppError::Job(JobError::NotFound { job_id }) => {
                    ErrorResponse::not_found_error("Job", "id", &job_id.to_string())
                }
                AppError::Job(JobError::Locked { job_id, locked_by }) => ErrorResponse::new(code, &self.to_string())
                    .with_details(json!({ "job_id": job_id, "locked_by": locked_by })),
                other => ErrorResponse::new(code, &other.to_string()),
            }
        };

        (status, Json(response)).into_response()
    }
}

/// Converts axum path rejection errors to ErrorResponse.
pub fn handle_path_rejection(rejection: PathRejection) -> Response {
    let response = match rejection {
        PathRejection::FailedToDeserializePathParams(err) => {
            ErrorResponse::new("INVALID_PATH_PARAMS", "Invalid path parameters")
                .with_details(json!({ "error": err.to_string() }))
        }
        _ => ErrorResponse::new("PATH_ERROR", "Invalid path parameters"),
    };

    (StatusCode::BAD_REQUEST, Json(response)).into_response()
}
