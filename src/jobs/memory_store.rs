//! In-process job store.
//!
//! Mirrors the PostgreSQL store's semantics under a single mutex so the
//! worker runtime and pipeline can run without a database (`memory:` URLs,
//! one-shot runs, tests).

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;

use crate::jobs::backoff::BackoffPolicy;
use crate::jobs::error::{JobError, JobResult};
use crate::jobs::models::{EnqueueOptions, FailOutcome, Job, JobId, KeyMode, TaskStats};
use crate::jobs::store::{JobStore, to_chrono, validate_enqueue};

#[derive(Default)]
struct MemoryState {
    next_id: JobId,
    jobs: BTreeMap<JobId, Job>,
}

impl MemoryState {
    fn stale(&self, job_id: JobId, expected: i32) -> JobError {
        JobError::StaleRevision {
            job_id,
            expected,
            actual: self.jobs.get(&job_id).map(|job| job.revision),
        }
    }
}

pub struct MemoryJobStore {
    state: Mutex<MemoryState>,
    allowed_skew: chrono::Duration,
}

impl MemoryJobStore {
    pub fn new(allowed_skew: Duration) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                next_id: 1,
                jobs: BTreeMap::new(),
            }),
            allowed_skew: to_chrono(allowed_skew),
        }
    }

    /// Snapshot of every stored job, ordered by id.
    pub async fn snapshot(&self) -> Vec<Job> {
        self.state.lock().await.jobs.values().cloned().collect()
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn enqueue(
        &self,
        task_identifier: &str,
        payload: JsonValue,
        options: EnqueueOptions,
    ) -> JobResult<JobId> {
        let now = Utc::now();
        validate_enqueue(task_identifier, &options, now, self.allowed_skew)?;
        let run_at = options.run_at.unwrap_or(now);

        let mut state = self.state.lock().await;

        if let Some(key) = options.key.as_deref() {
            let existing = state
                .jobs
                .values_mut()
                .find(|job| job.key.as_deref() == Some(key));

            if let Some(job) = existing {
                if !job.is_replaceable() {
                    // A running attempt or a failed record keeps its row and
                    // revision; the key moves to a fresh job.
                    job.key = None;
                    job.updated_at = now;
                } else {
                    job.task_identifier = task_identifier.to_string();
                    job.payload = payload;
                    job.queue_id = options.queue_id;
                    job.priority = options.priority;
                    if options.key_mode == KeyMode::Replace {
                        job.run_at = run_at;
                    }
                    job.max_attempts = options.max_attempts;
                    job.attempts = 0;
                    job.last_error = None;
                    job.revision += 1;
                    job.updated_at = now;
                    return Ok(job.id);
                }
            }
        }

        let id = state.next_id;
        state.next_id += 1;
        state.jobs.insert(
            id,
            Job {
                id,
                queue_id: options.queue_id,
                task_identifier: task_identifier.to_string(),
                payload,
                priority: options.priority,
                run_at,
                attempts: 0,
                max_attempts: options.max_attempts,
                last_error: None,
                key: options.key,
                locked_at: None,
                locked_by: None,
                revision: 0,
                created_at: now,
                updated_at: now,
            },
        );

        Ok(id)
    }

    async fn claim_next(
        &self,
        worker_id: &str,
        task_filter: Option<&[String]>,
    ) -> JobResult<Option<Job>> {
        let now = Utc::now();
        let mut state = self.state.lock().await;

        let candidate = state
            .jobs
            .values()
            .filter(|job| job.is_claimable(now))
            .filter(|job| {
                task_filter.is_none_or(|tasks| tasks.iter().any(|t| *t == job.task_identifier))
            })
            .min_by(|a, b| {
                (a.priority, a.run_at, a.id).cmp(&(b.priority, b.run_at, b.id))
            })
            .map(|job| job.id);

        let Some(id) = candidate else {
            return Ok(None);
        };

        let Some(job) = state.jobs.get_mut(&id) else {
            return Ok(None);
        };
        job.locked_at = Some(now);
        job.locked_by = Some(worker_id.to_string());
        job.attempts += 1;
        job.revision += 1;
        job.updated_at = now;

        Ok(Some(job.clone()))
    }

    async fn complete(&self, job_id: JobId, revision: i32) -> JobResult<()> {
        let mut state = self.state.lock().await;

        let owned = state
            .jobs
            .get(&job_id)
            .is_some_and(|job| job.revision == revision && job.is_locked());
        if !owned {
            return Err(state.stale(job_id, revision));
        }

        state.jobs.remove(&job_id);
        Ok(())
    }

    async fn fail(
        &self,
        job_id: JobId,
        revision: i32,
        error: &str,
        backoff: &BackoffPolicy,
    ) -> JobResult<FailOutcome> {
        let now = Utc::now();
        let mut state = self.state.lock().await;

        let stale = state.stale(job_id, revision);
        let Some(job) = state
            .jobs
            .get_mut(&job_id)
            .filter(|job| job.revision == revision && job.is_locked())
        else {
            return Err(stale);
        };

        job.locked_at = None;
        job.locked_by = None;
        job.last_error = Some(error.to_string());
        job.revision += 1;
        job.updated_at = now;

        if job.attempts >= job.max_attempts {
            return Ok(FailOutcome::Terminal {
                attempts: job.attempts,
            });
        }

        job.run_at = now
            .checked_add_signed(to_chrono(backoff.delay_for(job.attempts)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Ok(FailOutcome::Retrying {
            attempts: job.attempts,
            run_at: job.run_at,
        })
    }

    async fn release_expired_locks(&self, max_lock_age: Duration) -> JobResult<u64> {
        let now = Utc::now();
        let Some(cutoff) = now.checked_sub_signed(to_chrono(max_lock_age)) else {
            return Ok(0);
        };
        let mut state = self.state.lock().await;

        let mut released = 0;
        for job in state.jobs.values_mut() {
            let Some(locked_at) = job.locked_at else {
                continue;
            };
            if locked_at >= cutoff {
                continue;
            }

            job.last_error = Some(format!(
                "lock_expired: worker {} held the job since {} without reporting",
                job.locked_by.as_deref().unwrap_or("unknown"),
                locked_at.to_rfc3339()
            ));
            job.locked_at = None;
            job.locked_by = None;
            job.revision += 1;
            job.updated_at = now;
            released += 1;
        }

        Ok(released)
    }

    async fn get(&self, job_id: JobId) -> JobResult<Option<Job>> {
        Ok(self.state.lock().await.jobs.get(&job_id).cloned())
    }

    async fn stats(&self) -> JobResult<Vec<TaskStats>> {
        let state = self.state.lock().await;
        let mut by_task: BTreeMap<&str, TaskStats> = BTreeMap::new();

        for job in state.jobs.values() {
            let entry = by_task
                .entry(job.task_identifier.as_str())
                .or_insert_with(|| TaskStats {
                    task_identifier: job.task_identifier.clone(),
                    pending: 0,
                    running: 0,
                    failed: 0,
                    last_created_at: None,
                });

            match job.state() {
                crate::jobs::models::JobState::Pending => entry.pending += 1,
                crate::jobs::models::JobState::Running => entry.running += 1,
                crate::jobs::models::JobState::Failed => entry.failed += 1,
            }
            entry.last_created_at = entry.last_created_at.max(Some(job.created_at));
        }

        Ok(by_task.into_values().collect())
    }

    async fn cancel(&self, job_id: JobId) -> JobResult<()> {
        let mut state = self.state.lock().await;
        let Some(job) = state.jobs.get(&job_id) else {
            return Err(JobError::NotFound { job_id });
        };
        if let Some(locked_by) = &job.locked_by {
            return Err(JobError::Locked {
                job_id,
                locked_by: locked_by.clone(),
            });
        }
        state.jobs.remove(&job_id);
        Ok(())
    }

    async fn requeue(&self, job_id: JobId) -> JobResult<()> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let Some(job) = state.jobs.get_mut(&job_id) else {
            return Err(JobError::NotFound { job_id });
        };
        if let Some(locked_by) = &job.locked_by {
            return Err(JobError::Locked {
                job_id,
                locked_by: locked_by.clone(),
            });
        }
        job.attempts = 0;
        job.run_at = now;
        job.revision += 1;
        job.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn store() -> MemoryJobStore {
        MemoryJobStore::default()
    }

    #[tokio::test]
    async fn test_claim_on_empty_store_returns_none() {
        let store = store();
        assert!(store.claim_next("w1", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_locks_and_counts_attempt() {
        let store = store();
        let id = store
            .enqueue("list-scrape", json!({}), EnqueueOptions::default())
            .await
            .unwrap();

        let job = store.claim_next("w1", None).await.unwrap().unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.locked_by.as_deref(), Some("w1"));
        assert_eq!(job.revision, 1);

        assert!(store.claim_next("w2", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_queue_id_is_recorded() {
        let store = store();
        let id = store
            .enqueue(
                "detail-scrape",
                json!({}),
                EnqueueOptions::default().with_queue("scrapes"),
            )
            .await
            .unwrap();

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.queue_id.as_deref(), Some("scrapes"));
    }

    #[tokio::test]
    async fn test_claim_respects_priority_then_run_at() {
        let store = store();
        let now = Utc::now();
        let late = store
            .enqueue(
                "detail-scrape",
                json!({}),
                EnqueueOptions::default().with_priority(5),
            )
            .await
            .unwrap();
        let urgent_later = store
            .enqueue(
                "list-scrape",
                json!({}),
                EnqueueOptions::default()
                    .with_priority(0)
                    .with_run_at(now - chrono::Duration::seconds(1)),
            )
            .await
            .unwrap();
        let urgent_earlier = store
            .enqueue(
                "list-scrape",
                json!({}),
                EnqueueOptions::default()
                    .with_priority(0)
                    .with_run_at(now - chrono::Duration::seconds(10)),
            )
            .await
            .unwrap();

        let order: Vec<JobId> = [
            store.claim_next("w", None).await.unwrap().unwrap().id,
            store.claim_next("w", None).await.unwrap().unwrap().id,
            store.claim_next("w", None).await.unwrap().unwrap().id,
        ]
        .to_vec();
        assert_eq!(order, vec![urgent_earlier, urgent_later, late]);
    }

    #[tokio::test]
    async fn test_claim_honours_task_filter() {
        let store = store();
        store
            .enqueue("list-scrape", json!({}), EnqueueOptions::default())
            .await
            .unwrap();
        let detail = store
            .enqueue("detail-scrape", json!({}), EnqueueOptions::default().with_priority(9))
            .await
            .unwrap();

        let filter = vec!["detail-scrape".to_string()];
        let job = store.claim_next("w", Some(&filter)).await.unwrap().unwrap();
        assert_eq!(job.id, detail);
    }

    #[tokio::test]
    async fn test_future_job_is_not_claimed() {
        let store = store();
        store
            .enqueue(
                "list-scrape",
                json!({}),
                EnqueueOptions::default().with_run_at(Utc::now() + chrono::Duration::hours(1)),
            )
            .await
            .unwrap();
        assert!(store.claim_next("w", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_claims_are_mutually_exclusive() {
        let store = Arc::new(store());
        for _ in 0..20 {
            store
                .enqueue("detail-scrape", json!({}), EnqueueOptions::default())
                .await
                .unwrap();
        }

        let mut handles = Vec::new();
        for worker in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let worker_id = format!("worker-{worker}");
                let mut claimed = Vec::new();
                while let Some(job) = store.claim_next(&worker_id, None).await.unwrap() {
                    claimed.push(job.id);
                }
                claimed
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort_unstable();
        let before = all.len();
        all.dedup();
        assert_eq!(before, 20);
        assert_eq!(all.len(), 20);
    }

    #[tokio::test]
    async fn test_complete_deletes_and_rejects_stale_revision() {
        let store = store();
        let id = store
            .enqueue("list-scrape", json!({}), EnqueueOptions::default())
            .await
            .unwrap();
        let job = store.claim_next("w", None).await.unwrap().unwrap();

        let err = store.complete(id, job.revision - 1).await.unwrap_err();
        assert!(matches!(
            err,
            JobError::StaleRevision { expected: 0, actual: Some(1), .. }
        ));

        store.complete(id, job.revision).await.unwrap();
        assert!(store.get(id).await.unwrap().is_none());

        let err = store.complete(id, job.revision).await.unwrap_err();
        assert!(matches!(err, JobError::StaleRevision { actual: None, .. }));
    }

    #[tokio::test]
    async fn test_fail_reschedules_with_backoff() {
        let store = store();
        let id = store
            .enqueue("list-scrape", json!({}), EnqueueOptions::default())
            .await
            .unwrap();
        let job = store.claim_next("w", None).await.unwrap().unwrap();

        let outcome = store
            .fail(id, job.revision, "transient_source: 503", &BackoffPolicy::default())
            .await
            .unwrap();

        let FailOutcome::Retrying { attempts, run_at } = outcome else {
            panic!("expected retry, got {outcome:?}");
        };
        assert_eq!(attempts, 1);
        assert!(run_at >= Utc::now() + chrono::Duration::seconds(25));

        let stored = store.get(id).await.unwrap().unwrap();
        assert!(!stored.is_locked());
        assert_eq!(stored.last_error.as_deref(), Some("transient_source: 503"));
        assert!(store.claim_next("w", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_key_replace_supersedes_unlocked_job() {
        let store = store();
        let first = store
            .enqueue(
                "list-scrape",
                json!({"dry_run": false}),
                EnqueueOptions::default().with_key("list-scrape:recurring"),
            )
            .await
            .unwrap();
        let second = store
            .enqueue(
                "list-scrape",
                json!({"dry_run": true}),
                EnqueueOptions::default().with_key("list-scrape:recurring"),
            )
            .await
            .unwrap();

        assert_eq!(first, second);
        let jobs = store.snapshot().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].payload, json!({"dry_run": true}));
        assert_eq!(jobs[0].attempts, 0);
    }

    #[tokio::test]
    async fn test_key_replace_leaves_running_job_alone() {
        let store = store();
        let first = store
            .enqueue("list-scrape", json!({}), EnqueueOptions::default().with_key("k"))
            .await
            .unwrap();
        let running = store.claim_next("w", None).await.unwrap().unwrap();

        let second = store
            .enqueue("list-scrape", json!({"n": 2}), EnqueueOptions::default().with_key("k"))
            .await
            .unwrap();
        assert_ne!(first, second);

        let old = store.get(first).await.unwrap().unwrap();
        assert!(old.is_locked());
        assert!(old.key.is_none());

        assert_eq!(old.revision, running.revision);
        store.complete(first, running.revision).await.unwrap();

        let new = store.get(second).await.unwrap().unwrap();
        assert_eq!(new.key.as_deref(), Some("k"));
    }

    #[tokio::test]
    async fn test_key_replace_does_not_revive_terminal_job() {
        let store = store();
        let options = || EnqueueOptions::default().with_key("k").with_max_attempts(1);
        let first = store.enqueue("list-scrape", json!({}), options()).await.unwrap();

        let claimed = store.claim_next("w", None).await.unwrap().unwrap();
        let outcome = store
            .fail(first, claimed.revision, "boom", &BackoffPolicy::immediate())
            .await
            .unwrap();
        assert_eq!(outcome, FailOutcome::Terminal { attempts: 1 });
        let failed_revision = store.get(first).await.unwrap().unwrap().revision;

        let second = store.enqueue("list-scrape", json!({"n": 2}), options()).await.unwrap();
        assert_ne!(first, second);

        let old = store.get(first).await.unwrap().unwrap();
        assert!(old.is_terminal());
        assert!(old.key.is_none());
        assert_eq!(old.attempts, 1);
        assert_eq!(old.last_error.as_deref(), Some("boom"));
        assert_eq!(old.revision, failed_revision);

        let new = store.get(second).await.unwrap().unwrap();
        assert_eq!(new.key.as_deref(), Some("k"));
        assert_eq!(new.attempts, 0);

        let next = store.claim_next("w", None).await.unwrap().unwrap();
        assert_eq!(next.id, second);
        assert!(store.claim_next("w", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_preserve_run_at_keeps_schedule() {
        let store = store();
        let later = Utc::now() + chrono::Duration::hours(1);
        let id = store
            .enqueue(
                "list-scrape",
                json!({}),
                EnqueueOptions::default().with_key("k").with_run_at(later),
            )
            .await
            .unwrap();
        store
            .enqueue(
                "list-scrape",
                json!({"v": 2}),
                EnqueueOptions::default()
                    .with_key("k")
                    .with_key_mode(KeyMode::PreserveRunAt),
            )
            .await
            .unwrap();

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.run_at, later);
        assert_eq!(job.payload, json!({"v": 2}));
    }

    #[tokio::test]
    async fn test_release_expired_locks_keeps_attempts() {
        let store = store();
        let id = store
            .enqueue("list-scrape", json!({}), EnqueueOptions::default())
            .await
            .unwrap();
        store.claim_next("crashed-worker", None).await.unwrap().unwrap();

        assert_eq!(
            store.release_expired_locks(Duration::from_secs(3600)).await.unwrap(),
            0
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            store.release_expired_locks(Duration::from_millis(5)).await.unwrap(),
            1
        );

        let job = store.get(id).await.unwrap().unwrap();
        assert!(!job.is_locked());
        assert_eq!(job.attempts, 1);
        assert!(job.last_error.unwrap().contains("crashed-worker"));

        let reclaimed = store.claim_next("w2", None).await.unwrap().unwrap();
        assert_eq!(reclaimed.id, id);
        assert_eq!(reclaimed.attempts, 2);
    }

    #[tokio::test]
    async fn test_stats_groups_by_task() {
        let store = store();
        store
            .enqueue("list-scrape", json!({}), EnqueueOptions::default())
            .await
            .unwrap();
        store
            .enqueue("detail-scrape", json!({}), EnqueueOptions::default().with_priority(1))
            .await
            .unwrap();
        store
            .enqueue("detail-scrape", json!({}), EnqueueOptions::default().with_max_attempts(1).with_priority(2))
            .await
            .unwrap();

        // list-scrape -> running; first detail-scrape -> running then failed terminal
        store.claim_next("w", None).await.unwrap().unwrap();
        store.claim_next("w", None).await.unwrap().unwrap();
        let last = store.claim_next("w", None).await.unwrap().unwrap();
        store
            .fail(last.id, last.revision, "parse: bad", &BackoffPolicy::immediate())
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.len(), 2);
        let detail_stats = &stats[0];
        assert_eq!(detail_stats.task_identifier, "detail-scrape");
        assert_eq!(detail_stats.running, 1);
        assert_eq!(detail_stats.failed, 1);
        assert_eq!(detail_stats.pending, 0);
        assert_eq!(stats[1].task_identifier, "list-scrape");
        assert_eq!(stats[1].running, 1);
    }

    #[tokio::test]
    async fn test_cancel_and_requeue() {
        let store = store();
        let id = store
            .enqueue("list-scrape", json!({}), EnqueueOptions::default().with_max_attempts(1))
            .await
            .unwrap();
        let job = store.claim_next("w", None).await.unwrap().unwrap();

        assert!(matches!(store.cancel(id).await, Err(JobError::Locked { .. })));
        assert!(matches!(store.requeue(id).await, Err(JobError::Locked { .. })));

        let outcome = store
            .fail(id, job.revision, "parse: bad", &BackoffPolicy::immediate())
            .await
            .unwrap();
        assert_eq!(outcome, FailOutcome::Terminal { attempts: 1 });
        assert!(store.claim_next("w", None).await.unwrap().is_none());

        store.requeue(id).await.unwrap();
        let again = store.claim_next("w", None).await.unwrap().unwrap();
        assert_eq!(again.attempts, 1);
        assert_eq!(again.last_error.as_deref(), Some("parse: bad"));

        assert!(matches!(store.cancel(999).await, Err(JobError::NotFound { job_id: 999 })));
    }
}
