use crate::{
    db::{
        errors::Result,
        models::jobs::{JobCreateDBRequest, JobDBResponse, JobStatus, JobUpdateDBRequest},
    },
    types::{JobId, UserId},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection};

const JOB_COLUMNS: &str = "id, user_id, source_ref, source_lang, target_lang, duration, status, cost, result_ref, error, \
                           publish_attempts, last_published_at, created_at, updated_at";

// Database entity model for a job row
#[derive(Debug, Clone, FromRow)]
struct Job {
    id: JobId,
    user_id: UserId,
    source_ref: String,
    source_lang: String,
    target_lang: String,
    duration: i64,
    status: JobStatus,
    cost: Decimal,
    result_ref: Option<String>,
    error: Option<String>,
    publish_attempts: i32,
    last_published_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<Job> for JobDBResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            user_id: job.user_id,
            source_ref: job.source_ref,
            source_lang: job.source_lang,
            target_lang: job.target_lang,
            duration: job.duration,
            status: job.status,
            cost: job.cost,
            result_ref: job.result_ref,
            error: job.error,
            publish_attempts: job.publish_attempts,
            last_published_at: job.last_published_at,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

pub struct Jobs<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Jobs<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Insert a pending job. Returns `None` when a job with this id already exists, which is
    /// how a replayed admission finds out it has nothing left to write.
    pub async fn create(&mut self, request: &JobCreateDBRequest) -> Result<Option<JobDBResponse>> {
        let job = sqlx::query_as::<_, Job>(&format!(
            r#"
            INSERT INTO jobs (id, user_id, source_ref, source_lang, target_lang, duration, status, cost)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7)
            ON CONFLICT (id) DO NOTHING
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(request.id)
        .bind(request.user_id)
        .bind(&request.source_ref)
        .bind(&request.source_lang)
        .bind(&request.target_lang)
        .bind(request.duration)
        .bind(request.cost)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(job.map(JobDBResponse::from))
    }

    pub async fn get_by_id(&mut self, id: JobId) -> Result<Option<JobDBResponse>> {
        let job = sqlx::query_as::<_, Job>(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(job.map(JobDBResponse::from))
    }

    pub async fn list_for_user(&mut self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<JobDBResponse>> {
        let jobs = sqlx::query_as::<_, Job>(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            OFFSET $2
            LIMIT $3
            "#
        ))
        .bind(user_id)
        .bind(skip)
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(jobs.into_iter().map(JobDBResponse::from).collect())
    }

    /// Merge-patch a job. Absent fields keep their stored value; there is no transition check.
    pub async fn update(&mut self, id: JobId, request: &JobUpdateDBRequest) -> Result<Option<JobDBResponse>> {
        let job = sqlx::query_as::<_, Job>(&format!(
            r#"
            UPDATE jobs SET
                status = COALESCE($2, status),
                result_ref = COALESCE($3, result_ref),
                error = COALESCE($4, error),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(request.status)
        .bind(&request.result_ref)
        .bind(&request.error)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(job.map(JobDBResponse::from))
    }

    /// Lock up to `limit` pending jobs older than `older_than` that have not been published
    /// since then. Rows locked by a concurrent sweep are skipped. Must run inside a transaction
    /// for the locks to mean anything.
    pub async fn claim_stale_pending(&mut self, older_than: DateTime<Utc>, limit: i64) -> Result<Vec<JobDBResponse>> {
        let jobs = sqlx::query_as::<_, Job>(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE status = 'pending'
              AND created_at < $1
              AND (last_published_at IS NULL OR last_published_at < $1)
            ORDER BY created_at ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
            "#
        ))
        .bind(older_than)
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(jobs.into_iter().map(JobDBResponse::from).collect())
    }

    /// Record that a job's work message went out
    pub async fn mark_published(&mut self, id: JobId) -> Result<()> {
        sqlx::query("UPDATE jobs SET publish_attempts = publish_attempts + 1, last_published_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(())
    }
}
