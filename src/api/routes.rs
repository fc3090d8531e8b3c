//! Router configuration for the status API.

use axum::{Router, middleware};
use tower_http::trace::TraceLayer;

use crate::api::handlers;
use crate::api::middleware::{logging_middleware, request_id_middleware};
use crate::state::AppState;

/// Routes under `/api`:
/// - `/health`, `/health/live`
/// - `/jobs/stats`, `/jobs/{id}`
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .merge(handlers::health::health_routes())
        .nest("/jobs", handlers::jobs::job_routes());

    // Last added runs first: request ids exist before logging reads them
    Router::new()
        .nest("/api", api_routes)
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
