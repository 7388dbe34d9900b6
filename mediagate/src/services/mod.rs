//! Operations that span more than one repository, or the database and the work queue.

pub mod admission;
pub mod jobs;
pub mod reconciliation;

use crate::errors::{Error, Result};
use std::{future::Future, time::Duration};
use tracing::warn;

/// Run a storage operation under a deadline. Lock waits count against it, so a stuck row lock
/// surfaces as a retriable timeout instead of a hung request.
pub async fn with_timeout<T, F>(limit: Duration, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation, timeout_ms = limit.as_millis() as u64, "Operation timed out");
            Err(Error::Timeout {
                operation: operation.to_string(),
            })
        }
    }
}
