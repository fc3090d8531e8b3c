//! Access to the external parliamentary source.
//!
//! Handlers never touch `reqwest` directly: they go through [`SourceFetcher`]
//! so tests can substitute a scripted source and every HTTP outcome is
//! classified into the job error taxonomy in one place.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;

use crate::jobs::error::{JobError, JobResult};

/// A fetched page together with the URL it was served from after redirects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePage {
    pub url: String,
    pub body: String,
}

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetch one page. Errors are already classified:
    /// `TransientSource` for retryable failures, `SourceRejected` otherwise.
    async fn fetch(&self, url: &str) -> JobResult<SourcePage>;
}

/// `SourceFetcher` over a shared `reqwest::Client`.
#[derive(Clone)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceFetcher for HttpSource {
    async fn fetch(&self, url: &str) -> JobResult<SourcePage> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_transport_error(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| parse_retry_after(v, Utc::now()));
            return Err(classify_status(url, status, retry_after));
        }

        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport_error(url, &e))?;

        tracing::debug!(url = %final_url, bytes = body.len(), "Fetched source page");

        Ok(SourcePage {
            url: final_url,
            body,
        })
    }
}

/// Map a non-success HTTP status onto the error taxonomy.
///
/// 408, 425, 429 and every 5xx are transient; any other status is a
/// rejection that only a job-level retry (or an operator) can resolve.
pub fn classify_status(url: &str, status: StatusCode, retry_after: Option<Duration>) -> JobError {
    let transient = status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_EARLY | StatusCode::TOO_MANY_REQUESTS
        );

    if transient {
        JobError::TransientSource {
            url: url.to_string(),
            status: Some(status.as_u16()),
            retry_after,
            message: status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string(),
        }
    } else {
        JobError::SourceRejected {
            url: url.to_string(),
            status: status.as_u16(),
        }
    }
}

fn classify_transport_error(url: &str, error: &reqwest::Error) -> JobError {
    if let Some(status) = error.status() {
        return classify_status(url, status, None);
    }

    // Timeouts, refused connections, resets and truncated bodies
    JobError::TransientSource {
        url: url.to_string(),
        status: None,
        retry_after: None,
        message: error.to_string(),
    }
}

/// Parse a `Retry-After` value: delta-seconds or an HTTP date.
///
/// Dates in the past yield a zero wait.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}
