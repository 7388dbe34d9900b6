//! Hand-off of admitted jobs to the worker fleet.

#[cfg(test)]
pub mod memory;
pub mod redis_stream;

use crate::{
    db::models::jobs::JobDBResponse,
    types::{JobId, UserId},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(test)]
pub use memory::InMemoryQueue;
pub use redis_stream::RedisStreamQueue;

pub type QueueResult<T> = std::result::Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Work message consumed by the worker fleet. Workers treat `job_id` as their idempotency key,
/// so the same message may be delivered more than once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMessage {
    pub job_id: JobId,
    pub source_ref: String,
    pub source_lang: String,
    pub target_lang: String,
    pub duration_seconds: i64,
    pub user_id: UserId,
}

impl From<&JobDBResponse> for JobMessage {
    fn from(job: &JobDBResponse) -> Self {
        Self {
            job_id: job.id,
            source_ref: job.source_ref.clone(),
            source_lang: job.source_lang.clone(),
            target_lang: job.target_lang.clone(),
            duration_seconds: job.duration,
            user_id: job.user_id,
        }
    }
}

/// Durable queue the gateway publishes to. Publishing is at-least-once.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Publish a message, returning the broker-assigned message id
    async fn publish(&self, message: &JobMessage) -> QueueResult<String>;
}
