//! Service layer for business logic operations.

mod pipeline_service;

pub use pipeline_service::{PipelineService, ScheduleRequest};

/// Aggregates all services for convenient access.
///
/// Cloning is cheap since every service holds `Arc` handles.
#[derive(Clone)]
pub struct Services {
    pub pipeline: PipelineService,
}

impl Services {
    pub fn new(pipeline: PipelineService) -> Self {
        Self { pipeline }
    }
}
