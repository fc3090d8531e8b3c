//! Data Transfer Objects for API responses.

mod error;
mod job;

pub use error::ErrorResponse;
pub use job::{JobResponse, StatsResponse};
