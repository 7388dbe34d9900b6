use crate::types::{JobId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Job lifecycle status stored as TEXT in database
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Database request for creating a job. The id is chosen by the caller so that the
/// ledger debit can be keyed on it before the row exists.
#[derive(Debug, Clone)]
pub struct JobCreateDBRequest {
    pub id: JobId,
    pub user_id: UserId,
    pub source_ref: String,
    pub source_lang: String,
    pub target_lang: String,
    pub duration: i64,
    pub cost: Decimal,
}

/// Merge-patch from the worker fleet; `None` leaves the column as it is
#[derive(Debug, Clone, Default)]
pub struct JobUpdateDBRequest {
    pub status: Option<JobStatus>,
    pub result_ref: Option<String>,
    pub error: Option<String>,
}

/// Database response for a job
#[derive(Debug, Clone, PartialEq)]
pub struct JobDBResponse {
    pub id: JobId,
    pub user_id: UserId,
    pub source_ref: String,
    pub source_lang: String,
    pub target_lang: String,
    pub duration: i64,
    pub status: JobStatus,
    pub cost: Decimal,
    pub result_ref: Option<String>,
    pub error: Option<String>,
    pub publish_attempts: i32,
    pub last_published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
