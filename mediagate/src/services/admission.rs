//! Job admission: validate the request, reserve credits, persist the job and hand it to the
//! worker queue.
//!
//! The debit and the job row commit in one database transaction, so there is never a job
//! without its debit or a debit without its job. The queue lives outside that transaction: a
//! failed publish leaves an admitted `pending` job that the reconciliation sweep re-publishes.

use crate::{
    api::models::jobs::{DurationInput, JobCreate},
    config::Config,
    db::{
        handlers::{Credits, Jobs},
        models::{
            credits::{LedgerMutationDBRequest, JOB_DEBIT_SOURCE, MONEY_SCALE},
            jobs::{JobCreateDBRequest, JobDBResponse, JobStatus},
        },
    },
    errors::{Error, Result},
    queue::{JobMessage, WorkQueue},
    services::with_timeout,
    types::{JobId, UserId},
};
use rust_decimal::{Decimal, RoundingStrategy};
use sqlx::PgPool;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, instrument, warn};
use url::Url;
use uuid::Uuid;

const MAX_TAG_LENGTH: usize = 35;
const MAX_SOURCE_REF_LENGTH: usize = 2048;
/// Prefix of every admission debit's idempotency key
pub const JOB_DEBIT_KEY_PREFIX: &str = "job-debit:";

/// A job request that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedJob {
    pub source_ref: String,
    pub source_lang: String,
    pub target_lang: String,
    pub duration_seconds: i64,
}

/// What admission did
#[derive(Debug, Clone)]
pub struct Admission {
    pub job: JobDBResponse,
    /// False when the work message could not be published this time
    pub enqueued: bool,
    /// True when the job already existed and this call changed nothing in the database
    pub replayed: bool,
}

fn bad_request(message: impl Into<String>) -> Error {
    Error::BadRequest { message: message.into() }
}

fn validate_tag(field: &str, value: Option<&str>) -> Result<String> {
    let value = value.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(bad_request(format!("{field} is required")));
    }
    if value.len() > MAX_TAG_LENGTH || !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(bad_request(format!(
            "{field} must be 1-{MAX_TAG_LENGTH} characters of letters, digits, '-' or '_'"
        )));
    }
    Ok(value.to_string())
}

fn validate_source(source_file_url: Option<&str>, upload_id: Option<&str>) -> Result<String> {
    let source_file_url = source_file_url.map(str::trim).filter(|s| !s.is_empty());
    let upload_id = upload_id.map(str::trim).filter(|s| !s.is_empty());

    match (source_file_url, upload_id) {
        (Some(_), Some(_)) => Err(bad_request("Provide either source_file_url or upload_id, not both")),
        (None, None) => Err(bad_request("Either source_file_url or upload_id is required")),
        (Some(raw), None) => {
            let url = Url::parse(raw).map_err(|_| bad_request("source_file_url must be an absolute URL"))?;
            if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
                return Err(bad_request("source_file_url must be an http or https URL"));
            }
            if raw.len() > MAX_SOURCE_REF_LENGTH {
                return Err(bad_request("source_file_url is too long"));
            }
            Ok(url.to_string())
        }
        (None, Some(id)) => {
            if id.len() > MAX_SOURCE_REF_LENGTH || id.chars().any(|c| c.is_control() || c.is_whitespace()) {
                return Err(bad_request("upload_id is not a valid upload identifier"));
            }
            Ok(format!("upload:{id}"))
        }
    }
}

/// Parse a duration as a non-negative whole number of seconds
pub fn parse_duration(input: Option<&DurationInput>) -> Result<i64> {
    let invalid = || bad_request("duration must be a non-negative integer number of seconds");

    let seconds = match input.ok_or_else(|| bad_request("duration is required"))? {
        DurationInput::Number(n) => n.as_i64().ok_or_else(invalid)?,
        DurationInput::Text(s) => {
            let s = s.trim();
            if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            s.parse::<i64>().map_err(|_| invalid())?
        }
    };

    if seconds < 0 {
        return Err(invalid());
    }
    Ok(seconds)
}

/// Check every field of a create request and normalise it
pub fn validate(request: &JobCreate) -> Result<ValidatedJob> {
    Ok(ValidatedJob {
        source_lang: validate_tag("source_lang", request.source_lang.as_deref())?,
        target_lang: validate_tag("target_lang", request.target_lang.as_deref())?,
        source_ref: validate_source(request.source_file_url.as_deref(), request.upload_id.as_deref())?,
        duration_seconds: parse_duration(request.duration.as_ref())?,
    })
}

/// `duration_seconds * cost_per_minute / 60`, rounded half away from zero to the storage scale
pub fn compute_cost(duration_seconds: i64, cost_per_minute: Decimal) -> Result<Decimal> {
    Decimal::from(duration_seconds)
        .checked_mul(cost_per_minute)
        .and_then(|total| total.checked_div(Decimal::from(60)))
        .map(|cost| cost.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero))
        .ok_or_else(|| bad_request("duration is too large"))
}

/// Pick the job id before anything is written. A client-supplied idempotency key maps to the
/// same id on every retry; without one each call gets a fresh id.
pub fn job_id_for(user_id: UserId, idempotency_key: Option<&str>) -> JobId {
    match idempotency_key {
        Some(key) => Uuid::new_v5(&user_id, key.as_bytes()),
        None => Uuid::new_v4(),
    }
}

pub fn debit_key(job_id: JobId) -> String {
    format!("{JOB_DEBIT_KEY_PREFIX}{job_id}")
}

/// Admit a job. Runs on its own task: once started it completes even if the caller goes away,
/// so a dropped connection can never leave a commit without its publish attempt.
pub async fn create_job(
    db: PgPool,
    queue: Arc<dyn WorkQueue>,
    config: Config,
    user_id: UserId,
    job_id: JobId,
    job: ValidatedJob,
) -> Result<Admission> {
    tokio::spawn(async move { admit(&db, queue.as_ref(), &config, user_id, job_id, job).await })
        .await
        .map_err(|e| {
            error!("Admission task failed: {}", e);
            Error::Internal {
                operation: "admit job".to_string(),
            }
        })?
}

#[instrument(skip(db, queue, config, job), fields(user_id = %user_id, job_id = %job_id), err)]
async fn admit(db: &PgPool, queue: &dyn WorkQueue, config: &Config, user_id: UserId, job_id: JobId, job: ValidatedJob) -> Result<Admission> {
    let cost = compute_cost(job.duration_seconds, config.pricing.cost_per_minute)?;

    let (stored, replayed) = with_timeout(config.database.operation_timeout, "admit job", async {
        let mut tx = db.begin().await.map_err(|e| Error::Database(e.into()))?;

        if let Some(existing) = Jobs::new(&mut tx).get_by_id(job_id).await? {
            return owned_replay(existing, user_id).map(|job| (job, true));
        }

        // A zero-length job costs nothing and leaves no ledger entry
        if cost > Decimal::ZERO {
            let outcome = Credits::new(&mut tx)
                .debit(&LedgerMutationDBRequest {
                    user_id,
                    amount: cost,
                    idempotency_key: debit_key(job_id),
                    source: JOB_DEBIT_SOURCE.to_string(),
                })
                .await?;
            debug!(new_balance = %outcome.new_balance(), already_applied = outcome.already_applied(), "Reserved credits");
        }

        let created = Jobs::new(&mut tx)
            .create(&JobCreateDBRequest {
                id: job_id,
                user_id,
                source_ref: job.source_ref.clone(),
                source_lang: job.source_lang.clone(),
                target_lang: job.target_lang.clone(),
                duration: job.duration_seconds,
                cost,
            })
            .await?;

        let result = match created {
            Some(created) => (created, false),
            // A concurrent retry committed the same job first; our debit replayed against it
            None => {
                let existing = Jobs::new(&mut tx).get_by_id(job_id).await?.ok_or_else(|| Error::Internal {
                    operation: "load concurrently admitted job".to_string(),
                })?;
                (owned_replay(existing, user_id)?, true)
            }
        };

        tx.commit().await.map_err(|e| Error::Database(e.into()))?;
        Ok(result)
    })
    .await?;

    if replayed {
        warn!(status = ?stored.status, "Admission replayed for existing job");
    } else {
        info!(cost = %stored.cost, duration_seconds = stored.duration, "Job admitted");
    }

    // Only pending jobs still need the workers' attention
    let enqueued = if stored.status == JobStatus::Pending {
        publish(db, queue, config, &stored).await
    } else {
        true
    };

    Ok(Admission {
        job: stored,
        enqueued,
        replayed,
    })
}

fn owned_replay(existing: JobDBResponse, user_id: UserId) -> Result<JobDBResponse> {
    if existing.user_id != user_id {
        return Err(Error::Conflict {
            message: "Job id is already taken".to_string(),
        });
    }
    Ok(existing)
}

/// Send a job's work message, bounded by `timeout`. Failures are logged and reported as `false`.
pub(crate) async fn send(queue: &dyn WorkQueue, timeout: Duration, job: &JobDBResponse) -> bool {
    let message = JobMessage::from(job);

    match tokio::time::timeout(timeout, queue.publish(&message)).await {
        Ok(Ok(message_id)) => {
            debug!(job_id = %job.id, message_id = %message_id, "Work message published");
            true
        }
        Ok(Err(e)) => {
            warn!(job_id = %job.id, "Failed to publish work message, leaving for reconciliation: {}", e);
            false
        }
        Err(_) => {
            warn!(job_id = %job.id, "Timed out publishing work message, leaving for reconciliation");
            false
        }
    }
}

/// Publish the job's work message and record the attempt. A failed publish leaves the job
/// `pending` for the sweep.
async fn publish(db: &PgPool, queue: &dyn WorkQueue, config: &Config, job: &JobDBResponse) -> bool {
    let timeout = config.database.operation_timeout;
    if !send(queue, timeout, job).await {
        return false;
    }

    let marked = with_timeout(timeout, "record publish", async {
        let mut conn = db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        Jobs::new(&mut conn).mark_published(job.id).await?;
        Ok(())
    })
    .await;
    if let Err(e) = marked {
        // The message is out; at worst the sweep publishes it once more
        warn!(job_id = %job.id, "Failed to record publish: {}", e);
    }

    true
}
