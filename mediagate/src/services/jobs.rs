//! Job reads for owners and status updates from the worker fleet.

use crate::{
    auth::permissions::can_read_own_resource,
    db::{
        handlers::Jobs,
        models::jobs::{JobDBResponse, JobUpdateDBRequest},
    },
    errors::{Error, Result},
    services::with_timeout,
    types::{JobId, Principal, Resource, UserId},
};
use sqlx::PgPool;
use std::time::Duration;
use tracing::{info, instrument};

fn job_not_found(id: JobId) -> Error {
    Error::NotFound {
        resource: "Job".to_string(),
        id: id.to_string(),
    }
}

/// Apply a worker's merge-patch. Any existing job may be updated to any status; the last
/// report wins.
#[instrument(skip(db, update), fields(job_id = %id), err)]
pub async fn update_job(db: &PgPool, timeout: Duration, id: JobId, update: JobUpdateDBRequest) -> Result<JobDBResponse> {
    let job = with_timeout(timeout, "update job", async {
        let mut conn = db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        Ok(Jobs::new(&mut conn).update(id, &update).await?)
    })
    .await?
    .ok_or_else(|| job_not_found(id))?;

    info!(status = ?job.status, has_result = job.result_ref.is_some(), has_error = job.error.is_some(), "Job updated by worker");
    Ok(job)
}

/// Fetch a job on behalf of `principal`. A job the principal may not read is reported exactly
/// like a job that does not exist.
#[instrument(skip(db), fields(job_id = %id), err)]
pub async fn get_job(db: &PgPool, timeout: Duration, principal: &Principal, id: JobId) -> Result<JobDBResponse> {
    let job = with_timeout(timeout, "get job", async {
        let mut conn = db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        Ok(Jobs::new(&mut conn).get_by_id(id).await?)
    })
    .await?;

    match job {
        Some(job) if can_read_own_resource(principal, Resource::Jobs, job.user_id) => Ok(job),
        _ => Err(job_not_found(id)),
    }
}

pub async fn list_jobs(db: &PgPool, timeout: Duration, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<JobDBResponse>> {
    with_timeout(timeout, "list jobs", async {
        let mut conn = db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        Ok(Jobs::new(&mut conn).list_for_user(user_id, skip, limit).await?)
    })
    .await
}
