use crate::{
    db::models::jobs::{JobDBResponse, JobStatus, JobUpdateDBRequest},
    types::{JobId, UserId},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Requested media duration. Clients send either a JSON number or a base-10 string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DurationInput {
    Number(serde_json::Number),
    Text(String),
}

// Request models
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct JobCreate {
    /// Absolute http(s) URL of the source media. Mutually exclusive with `upload_id`.
    pub source_file_url: Option<String>,
    /// Identifier of a file already uploaded to media storage. Mutually exclusive with `source_file_url`.
    pub upload_id: Option<String>,
    /// Source language or format tag, e.g. `en`
    pub source_lang: Option<String>,
    /// Target language or format tag, e.g. `de`
    pub target_lang: Option<String>,
    /// Media duration in whole seconds
    #[schema(value_type = i64, example = 600)]
    pub duration: Option<DurationInput>,
}

/// Worker status report. Absent fields leave the stored value unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    /// Reference to the produced artefact
    #[serde(alias = "result_url")]
    pub result_ref: Option<String>,
    /// Failure description from the worker
    pub error: Option<String>,
}

impl From<JobUpdate> for JobUpdateDBRequest {
    fn from(update: JobUpdate) -> Self {
        // Empty strings count as "not reported"
        let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());
        Self {
            status: update.status,
            result_ref: non_empty(update.result_ref),
            error: non_empty(update.error),
        }
    }
}

// Response models
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobCreatedResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: JobId,
    pub status: JobStatus,
    /// Credits reserved for this job
    #[schema(value_type = String, example = "1.000000")]
    pub cost: Decimal,
    /// Whether the work message reached the queue. When false the job is still admitted and
    /// will be re-published by the reconciliation sweep.
    pub enqueued: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: JobId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub source_ref: String,
    pub source_lang: String,
    pub target_lang: String,
    /// Duration in seconds
    pub duration: i64,
    pub status: JobStatus,
    #[schema(value_type = String, example = "1.000000")]
    pub cost: Decimal,
    pub result_ref: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Query parameters for listing jobs
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListJobsQuery {
    /// Number of items to skip
    pub skip: Option<i64>,

    /// Maximum number of items to return
    pub limit: Option<i64>,
}

// Conversions
impl From<JobDBResponse> for JobResponse {
    fn from(db: JobDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            source_ref: db.source_ref,
            source_lang: db.source_lang,
            target_lang: db.target_lang,
            duration: db.duration,
            status: db.status,
            cost: db.cost,
            result_ref: db.result_ref,
            error: db.error,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
