use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::ScraperConfig;
use crate::external::source::{SourceFetcher, SourcePage};
use crate::jobs::error::{JobError, JobResult};

/// Handler-internal retry budget for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retries: u32,
    /// Fixed pause between attempts
    pub delay: Duration,
    /// Longest `Retry-After` honoured; longer hints are clamped
    pub max_retry_after: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, delay: Duration, max_retry_after: Duration) -> Self {
        Self {
            retries,
            delay,
            max_retry_after,
        }
    }

    /// Wait before the next attempt after `error`.
    fn delay_after(&self, error: &JobError) -> Duration {
        match error {
            JobError::TransientSource {
                retry_after: Some(hint),
                ..
            } => (*hint).min(self.max_retry_after),
            _ => self.delay,
        }
    }
}

impl From<&ScraperConfig> for RetryPolicy {
    fn from(config: &ScraperConfig) -> Self {
        Self::new(
            config.retry_count,
            Duration::from_millis(config.retry_delay_ms),
            Duration::from_secs(config.max_retry_after_secs),
        )
    }
}

/// Fetch `url`, retrying transient failures within `policy`.
///
/// Non-transient errors return immediately; when the budget is spent the
/// last transient error is returned for the job-level retry to handle.
pub async fn fetch_with_retry(
    source: &dyn SourceFetcher,
    url: &str,
    policy: &RetryPolicy,
) -> JobResult<SourcePage> {
    let mut attempt = 0;
    loop {
        match source.fetch(url).await {
            Ok(page) => {
                if attempt > 0 {
                    debug!(url, attempt = attempt + 1, "Fetch succeeded after retry");
                }
                return Ok(page);
            }
            Err(error) if error.is_transient() && attempt < policy.retries => {
                let delay = policy.delay_after(&error);
                warn!(
                    url,
                    attempt = attempt + 1,
                    retries = policy.retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Transient source failure, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                if error.is_transient() {
                    warn!(url, attempts = attempt + 1, error = %error, "Retry budget exhausted");
                }
                return Err(error);
            }
        }
    }
}
