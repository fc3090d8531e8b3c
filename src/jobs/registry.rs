use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use validator::Validate;

use crate::jobs::error::{JobError, JobResult};
use crate::jobs::tasks::{DetailScrapeTask, ListScrapeTask};
use crate::jobs::types::{JobTask, TaskKind};

type TaskFactory = Box<dyn Fn(JsonValue) -> JobResult<Box<dyn JobTask>> + Send + Sync>;

/// Registry for mapping task identifiers to task implementations
pub struct JobRegistry {
    factories: HashMap<TaskKind, TaskFactory>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with a handler for every [`TaskKind`].
    pub fn with_default_tasks() -> Self {
        let mut registry = Self::new();
        registry
            .register::<ListScrapeTask>()
            .register::<DetailScrapeTask>();
        registry
    }

    /// Register a task type with the registry
    pub fn register<T>(&mut self) -> &mut Self
    where
        T: JobTask + DeserializeOwned + Validate + 'static,
    {
        let kind = T::task_kind();
        let factory: TaskFactory = Box::new(move |payload: JsonValue| {
            let task: T = serde_json::from_value(payload).map_err(|e| JobError::InvalidPayload {
                task: kind.to_string(),
                source: e,
            })?;
            task.validate()
                .map_err(|e| JobError::validation(format!("{kind} payload"), e.to_string()))?;
            Ok(Box::new(task) as Box<dyn JobTask>)
        });

        self.factories.insert(kind, factory);
        self
    }

    /// Create a task instance from a stored job's identifier and payload
    pub fn create_task(
        &self,
        task_identifier: &str,
        payload: JsonValue,
    ) -> JobResult<Box<dyn JobTask>> {
        let kind: TaskKind = task_identifier.parse()?;
        let factory = self
            .factories
            .get(&kind)
            .ok_or_else(|| JobError::UnknownTask(task_identifier.to_string()))?;

        factory(payload)
    }

    /// Fails when some [`TaskKind`] has no handler.
    pub fn ensure_complete(&self) -> JobResult<()> {
        let missing: Vec<&str> = TaskKind::ALL
            .iter()
            .filter(|kind| !self.factories.contains_key(*kind))
            .map(TaskKind::as_str)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(JobError::UnknownTask(missing.join(", ")))
        }
    }

    /// Registered identifiers, sorted.
    pub fn task_identifiers(&self) -> Vec<&'static str> {
        let mut identifiers: Vec<_> = self.factories.keys().map(TaskKind::as_str).collect();
        identifiers.sort_unstable();
        identifiers
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::with_default_tasks()
    }
}
