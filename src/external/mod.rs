//! Access to the upstream parliament website.

pub mod client;
pub mod parliament;
pub mod retry;
pub mod source;
pub mod user_agent;

#[cfg(test)]
pub(crate) mod testing;

pub use client::build_http_client;
pub use retry::{RetryPolicy, fetch_with_retry};
pub use source::{HttpSource, SourceFetcher, SourcePage};
