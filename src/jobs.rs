use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use thiserror::Error;
use tokio::task;
use uuid::Uuid;

use crate::db::PgPool;
use crate::models::{Job, NewJob};
use crate::schema::jobs;

pub const STATUS_QUEUED: &str = "queued";
pub const STATUS_PROCESSING: &str = "processing";
pub const STATUS_SUCCEEDED: &str = "succeeded";
pub const STATUS_FAILED: &str = "failed";

pub const JOB_CREDITOR_CONTACT: &str = "creditor-contact";

#[derive(Debug, Error)]
pub enum JobQueueError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("database pool error: {0}")]
    Pool(String),
    #[error("queue task panicked: {0}")]
    Runtime(String),
}

pub type JobQueueResult<T> = Result<T, JobQueueError>;

/// Outbox queue. Committed state transitions enqueue work here instead of
/// firing external calls inline; the worker drives delivery with retries.
#[async_trait]
pub trait JobQueue: Send + Sync + 'static {
    async fn enqueue(
        &self,
        job_type: &str,
        payload: Value,
        run_after: Option<NaiveDateTime>,
    ) -> JobQueueResult<Job>;

    async fn reserve(&self, job_types: &[&str]) -> JobQueueResult<Option<Job>>;

    async fn mark_succeeded(&self, job_id: Uuid) -> JobQueueResult<()>;

    async fn retry_after(
        &self,
        job_id: Uuid,
        delay: Duration,
        error_message: &str,
    ) -> JobQueueResult<()>;

    async fn mark_failed(&self, job_id: Uuid, error_message: &str) -> JobQueueResult<()>;
}

pub struct PgJobQueue {
    pool: PgPool,
}

impl PgJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn with_conn<F, T>(&self, f: F) -> JobQueueResult<T>
    where
        F: FnOnce(&mut PgConnection) -> JobQueueResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| JobQueueError::Pool(err.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|err| JobQueueError::Runtime(err.to_string()))?
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(
        &self,
        job_type: &str,
        payload: Value,
        run_after: Option<NaiveDateTime>,
    ) -> JobQueueResult<Job> {
        let new_job = NewJob {
            id: Uuid::new_v4(),
            job_type: job_type.to_string(),
            payload,
            status: STATUS_QUEUED.to_string(),
            run_after: run_after.unwrap_or_else(|| Utc::now().naive_utc()),
        };

        self.with_conn(move |conn| {
            diesel::insert_into(jobs::table)
                .values(&new_job)
                .execute(conn)?;
            let job = jobs::table.find(new_job.id).first(conn)?;
            Ok(job)
        })
        .await
    }

    async fn reserve(&self, job_types: &[&str]) -> JobQueueResult<Option<Job>> {
        let job_types: Vec<String> = job_types.iter().map(|ty| ty.to_string()).collect();

        self.with_conn(move |conn| {
            let now = Utc::now().naive_utc();
            let reserved = conn.transaction(|conn| {
                let job_opt = jobs::table
                    .filter(jobs::status.eq(STATUS_QUEUED))
                    .filter(jobs::run_after.le(now))
                    .filter(jobs::job_type.eq_any(&job_types))
                    .order(jobs::run_after.asc())
                    .for_update()
                    .skip_locked()
                    .first::<Job>(conn)
                    .optional()?;

                if let Some(job) = job_opt {
                    diesel::update(jobs::table.find(job.id))
                        .set((
                            jobs::status.eq(STATUS_PROCESSING),
                            jobs::attempts.eq(job.attempts + 1),
                            jobs::updated_at.eq(now),
                        ))
                        .execute(conn)?;

                    let refreshed = jobs::table.find(job.id).first(conn)?;
                    Ok::<Option<Job>, diesel::result::Error>(Some(refreshed))
                } else {
                    Ok::<Option<Job>, diesel::result::Error>(None)
                }
            })?;
            Ok(reserved)
        })
        .await
    }

    async fn mark_succeeded(&self, job_id: Uuid) -> JobQueueResult<()> {
        self.with_conn(move |conn| {
            diesel::update(jobs::table.find(job_id))
                .set((
                    jobs::status.eq(STATUS_SUCCEEDED),
                    jobs::last_error.eq::<Option<String>>(None),
                    jobs::updated_at.eq(Utc::now().naive_utc()),
                ))
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn retry_after(
        &self,
        job_id: Uuid,
        delay: Duration,
        error_message: &str,
    ) -> JobQueueResult<()> {
        let error_message = error_message.to_string();
        self.with_conn(move |conn| {
            let next_run = Utc::now()
                + ChronoDuration::from_std(delay).unwrap_or_else(|_| ChronoDuration::seconds(30));

            diesel::update(jobs::table.find(job_id))
                .set((
                    jobs::status.eq(STATUS_QUEUED),
                    jobs::run_after.eq(next_run.naive_utc()),
                    jobs::last_error.eq(Some(error_message)),
                    jobs::updated_at.eq(Utc::now().naive_utc()),
                ))
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn mark_failed(&self, job_id: Uuid, error_message: &str) -> JobQueueResult<()> {
        let error_message = error_message.to_string();
        self.with_conn(move |conn| {
            diesel::update(jobs::table.find(job_id))
                .set((
                    jobs::status.eq(STATUS_FAILED),
                    jobs::last_error.eq(Some(error_message)),
                    jobs::updated_at.eq(Utc::now().naive_utc()),
                ))
                .execute(conn)?;
            Ok(())
        })
        .await
    }
}
