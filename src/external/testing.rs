//! Scripted `SourceFetcher` for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::external::source::{SourceFetcher, SourcePage};
use crate::jobs::error::{JobError, JobResult};

/// Replays queued responses per URL. The last queued response for a URL
/// is repeated once the queue drains; unknown URLs are rejected with 404.
#[derive(Default)]
pub struct ScriptedSource {
    responses: Mutex<HashMap<String, VecDeque<Result<String, JobError>>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_ok(self, url: &str, body: impl Into<String>) -> Self {
        self.push(url, Ok(body.into()));
        self
    }

    pub fn respond_err(self, url: &str, error: JobError) -> Self {
        self.push(url, Err(error));
        self
    }

    fn push(&self, url: &str, response: Result<String, JobError>) {
        self.responses
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl SourceFetcher for ScriptedSource {
    async fn fetch(&self, url: &str) -> JobResult<SourcePage> {
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;

        let mut responses = self.responses.lock().unwrap();
        let Some(queue) = responses.get_mut(url) else {
            return Err(JobError::SourceRejected {
                url: url.to_string(),
                status: 404,
            });
        };

        let next = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().map(clone_response)
        };

        match next {
            Some(Ok(body)) => Ok(SourcePage {
                url: url.to_string(),
                body,
            }),
            Some(Err(error)) => Err(error),
            None => Err(JobError::SourceRejected {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

fn clone_response(response: &Result<String, JobError>) -> Result<String, JobError> {
    match response {
        Ok(body) => Ok(body.clone()),
        Err(JobError::TransientSource {
            url,
            status,
            retry_after,
            message,
        }) => Err(JobError::TransientSource {
            url: url.clone(),
            status: *status,
            retry_after: *retry_after,
            message: message.clone(),
        }),
        Err(JobError::SourceRejected { url, status }) => Err(JobError::SourceRejected {
            url: url.clone(),
            status: *status,
        }),
        Err(other) => Err(JobError::parse("scripted", other.to_string())),
    }
}

pub fn transient(url: &str, retry_after: Option<Duration>) -> JobError {
    JobError::TransientSource {
        url: url.to_string(),
        status: Some(503),
        retry_after,
        message: "Service Unavailable".to_string(),
    }
}
