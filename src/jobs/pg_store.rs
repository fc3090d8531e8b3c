//! PostgreSQL job store.
//!
//! Claiming is a single `UPDATE ... WHERE id = (SELECT ... FOR UPDATE SKIP
//! LOCKED)` so concurrent workers never lock the same row. All timestamps
//! that gate eligibility come from the database clock.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::{Array, BigInt, Double, Integer, Nullable, Text};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde_json::Value as JsonValue;

use crate::db::AsyncDbPool;
use crate::jobs::backoff::BackoffPolicy;
use crate::jobs::error::{JobError, JobResult};
use crate::jobs::models::{EnqueueOptions, FailOutcome, Job, JobId, KeyMode, NewJob, TaskStats};
use crate::jobs::store::{JobStore, to_chrono, validate_enqueue};
use crate::schema::jobs;

/// Attempts at inserting a keyed job when a concurrent enqueue wins the race.
const KEYED_INSERT_ATTEMPTS: usize = 3;

const CLAIM_SQL: &str = r#"
UPDATE jobs
SET locked_at = now(),
    locked_by = $1,
    attempts = attempts + 1,
    revision = revision + 1,
    updated_at = now()
WHERE id = (
    SELECT id
    FROM jobs
    WHERE locked_at IS NULL
      AND run_at <= now()
      AND attempts < max_attempts
      AND ($2::text[] IS NULL OR task_identifier = ANY($2))
    ORDER BY priority ASC, run_at ASC, id ASC
    LIMIT 1
    FOR UPDATE SKIP LOCKED
)
AND locked_at IS NULL
RETURNING *
"#;

const FAIL_SQL: &str = r#"
UPDATE jobs
SET locked_at = NULL,
    locked_by = NULL,
    last_error = $3,
    run_at = CASE
        WHEN attempts < max_attempts THEN now() + make_interval(secs => $4)
        ELSE run_at
    END,
    revision = revision + 1,
    updated_at = now()
WHERE id = $1
  AND revision = $2
  AND locked_at IS NOT NULL
RETURNING *
"#;

const RELEASE_EXPIRED_SQL: &str = r#"
UPDATE jobs
SET last_error = 'lock_expired: worker ' || COALESCE(locked_by, 'unknown')
        || ' held the job since ' || locked_at::text || ' without reporting',
    locked_at = NULL,
    locked_by = NULL,
    revision = revision + 1,
    updated_at = now()
WHERE locked_at IS NOT NULL
  AND locked_at < now() - make_interval(secs => $1)
"#;

const STATS_SQL: &str = r#"
SELECT task_identifier,
       COUNT(*) FILTER (WHERE locked_at IS NULL AND attempts < max_attempts) AS pending,
       COUNT(*) FILTER (WHERE locked_at IS NOT NULL) AS running,
       COUNT(*) FILTER (WHERE locked_at IS NULL AND attempts >= max_attempts) AS failed,
       MAX(created_at) AS last_created_at
FROM jobs
GROUP BY task_identifier
ORDER BY task_identifier
"#;

#[derive(Clone)]
pub struct PgJobStore {
    pool: AsyncDbPool,
    allowed_skew: chrono::Duration,
}

impl PgJobStore {
    pub fn new(pool: AsyncDbPool, allowed_skew: Duration) -> Self {
        Self {
            pool,
            allowed_skew: to_chrono(allowed_skew),
        }
    }
}

fn pool_error(e: impl std::error::Error + Send + Sync + 'static) -> JobError {
    JobError::persistence("acquire database connection", anyhow::Error::from(e))
}

fn is_unique_violation(error: &JobError) -> bool {
    matches!(
        error,
        JobError::Database(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _))
    )
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn enqueue(
        &self,
        task_identifier: &str,
        payload: JsonValue,
        options: EnqueueOptions,
    ) -> JobResult<JobId> {
        let now = Utc::now();
        validate_enqueue(task_identifier, &options, now, self.allowed_skew)?;

        let mut conn = self.pool.get().await.map_err(pool_error)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let new_job = NewJob {
                queue_id: options.queue_id.clone(),
                task_identifier: task_identifier.to_string(),
                payload: payload.clone(),
                priority: options.priority,
                run_at: options.run_at.unwrap_or(now),
                max_attempts: options.max_attempts,
                key: options.key.clone(),
            };
            let key_mode = options.key_mode;

            let result = conn
                .transaction::<JobId, JobError, _>(|conn| {
                    async move {
                        if let Some(key) = new_job.key.as_deref() {
                            let existing: Option<Job> = jobs::table
                                .filter(jobs::key.eq(key))
                                .select(Job::as_select())
                                .for_update()
                                .first(conn)
                                .await
                                .optional()?;

                            match existing {
                                Some(job) if job.is_replaceable() => {
                                    let run_at = match key_mode {
                                        KeyMode::Replace => new_job.run_at,
                                        KeyMode::PreserveRunAt => job.run_at,
                                    };
                                    diesel::update(jobs::table.find(job.id))
                                        .set((
                                            jobs::task_identifier.eq(&new_job.task_identifier),
                                            jobs::payload.eq(&new_job.payload),
                                            jobs::queue_id.eq(&new_job.queue_id),
                                            jobs::priority.eq(new_job.priority),
                                            jobs::run_at.eq(run_at),
                                            jobs::max_attempts.eq(new_job.max_attempts),
                                            jobs::attempts.eq(0),
                                            jobs::last_error.eq(None::<String>),
                                            jobs::revision.eq(jobs::revision + 1),
                                            jobs::updated_at.eq(Utc::now()),
                                        ))
                                        .execute(conn)
                                        .await?;
                                    return Ok(job.id);
                                }
                                Some(job) => {
                                    // Running or terminal job keeps its revision; only the key moves.
                                    diesel::update(jobs::table.find(job.id))
                                        .set((
                                            jobs::key.eq(None::<String>),
                                            jobs::updated_at.eq(Utc::now()),
                                        ))
                                        .execute(conn)
                                        .await?;
                                }
                                None => {}
                            }
                        }

                        let id = diesel::insert_into(jobs::table)
                            .values(&new_job)
                            .returning(jobs::id)
                            .get_result::<JobId>(conn)
                            .await?;
                        Ok(id)
                    }
                    .scope_boxed()
                })
                .await;

            match result {
                Err(e) if is_unique_violation(&e) && attempt < KEYED_INSERT_ATTEMPTS => {
                    tracing::debug!(
                        task = %task_identifier,
                        key = ?options.key,
                        attempt,
                        "Concurrent enqueue on same key, retrying"
                    );
                }
                other => return other,
            }
        }
    }

    async fn claim_next(
        &self,
        worker_id: &str,
        task_filter: Option<&[String]>,
    ) -> JobResult<Option<Job>> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        let job = diesel::sql_query(CLAIM_SQL)
            .bind::<Text, _>(worker_id)
            .bind::<Nullable<Array<Text>>, _>(task_filter.map(|tasks| tasks.to_vec()))
            .get_result::<Job>(&mut conn)
            .await
            .optional()?;

        Ok(job)
    }

    async fn complete(&self, job_id: JobId, revision: i32) -> JobResult<()> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        let deleted = diesel::delete(
            jobs::table
                .filter(jobs::id.eq(job_id))
                .filter(jobs::revision.eq(revision))
                .filter(jobs::locked_at.is_not_null()),
        )
        .execute(&mut conn)
        .await?;

        if deleted == 1 {
            return Ok(());
        }

        let actual = jobs::table
            .find(job_id)
            .select(jobs::revision)
            .first::<i32>(&mut conn)
            .await
            .optional()?;

        Err(JobError::StaleRevision {
            job_id,
            expected: revision,
            actual,
        })
    }

    async fn fail(
        &self,
        job_id: JobId,
        revision: i32,
        error: &str,
        backoff: &BackoffPolicy,
    ) -> JobResult<FailOutcome> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        let current = jobs::table
            .find(job_id)
            .select(Job::as_select())
            .first(&mut conn)
            .await
            .optional()?;

        let Some(current) = current.filter(|job| job.revision == revision && job.is_locked())
        else {
            let actual = jobs::table
                .find(job_id)
                .select(jobs::revision)
                .first::<i32>(&mut conn)
                .await
                .optional()?;
            return Err(JobError::StaleRevision {
                job_id,
                expected: revision,
                actual,
            });
        };

        let delay = backoff.delay_for(current.attempts).as_secs_f64();

        let updated = diesel::sql_query(FAIL_SQL)
            .bind::<BigInt, _>(job_id)
            .bind::<Integer, _>(revision)
            .bind::<Text, _>(error)
            .bind::<Double, _>(delay)
            .get_result::<Job>(&mut conn)
            .await
            .optional()?;

        let Some(job) = updated else {
            return Err(JobError::StaleRevision {
                job_id,
                expected: revision,
                actual: None,
            });
        };

        if job.attempts >= job.max_attempts {
            Ok(FailOutcome::Terminal {
                attempts: job.attempts,
            })
        } else {
            Ok(FailOutcome::Retrying {
                attempts: job.attempts,
                run_at: job.run_at,
            })
        }
    }

    async fn release_expired_locks(&self, max_lock_age: Duration) -> JobResult<u64> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        let released = diesel::sql_query(RELEASE_EXPIRED_SQL)
            .bind::<Double, _>(max_lock_age.as_secs_f64())
            .execute(&mut conn)
            .await?;

        Ok(released as u64)
    }

    async fn get(&self, job_id: JobId) -> JobResult<Option<Job>> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        let job = jobs::table
            .find(job_id)
            .select(Job::as_select())
            .first(&mut conn)
            .await
            .optional()?;

        Ok(job)
    }

    async fn stats(&self) -> JobResult<Vec<TaskStats>> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        let stats = diesel::sql_query(STATS_SQL)
            .load::<TaskStats>(&mut conn)
            .await?;

        Ok(stats)
    }

    async fn cancel(&self, job_id: JobId) -> JobResult<()> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        let deleted = diesel::delete(
            jobs::table
                .filter(jobs::id.eq(job_id))
                .filter(jobs::locked_at.is_null()),
        )
        .execute(&mut conn)
        .await?;

        if deleted == 1 {
            return Ok(());
        }

        explain_unlocked_miss(&mut conn, job_id).await
    }

    async fn requeue(&self, job_id: JobId) -> JobResult<()> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let now = Utc::now();

        let updated = diesel::update(
            jobs::table
                .filter(jobs::id.eq(job_id))
                .filter(jobs::locked_at.is_null()),
        )
        .set((
            jobs::attempts.eq(0),
            jobs::run_at.eq(now),
            jobs::revision.eq(jobs::revision + 1),
            jobs::updated_at.eq(now),
        ))
        .execute(&mut conn)
        .await?;

        if updated == 1 {
            return Ok(());
        }

        explain_unlocked_miss(&mut conn, job_id).await
    }
}

/// An operator command touched no row: report whether the job is gone or busy.
async fn explain_unlocked_miss(
    conn: &mut diesel_async::AsyncPgConnection,
    job_id: JobId,
) -> JobResult<()> {
    let locked_by = jobs::table
        .find(job_id)
        .select(jobs::locked_by)
        .first::<Option<String>>(conn)
        .await
        .optional()?;

    match locked_by {
        None => Err(JobError::NotFound { job_id }),
        Some(locked_by) => Err(JobError::Locked {
            job_id,
            locked_by: locked_by.unwrap_or_else(|| "unknown".to_string()),
        }),
    }
}
