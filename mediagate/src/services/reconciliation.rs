//! Background sweep that re-publishes jobs stuck in `pending`.
//!
//! Admission commits the debit and the job before it publishes, so a crash or a broker outage
//! between the two leaves a paid-for job nobody will pick up. The sweep closes that gap. It
//! never refunds and never fails a job.

use crate::{
    config::{Config, ReconciliationConfig},
    db::handlers::Jobs,
    errors::{Error, Result},
    queue::WorkQueue,
    services::{admission::send, with_timeout},
};
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Outcome of a single sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub claimed: usize,
    pub republished: usize,
}

pub struct ReconciliationSweeper {
    db: PgPool,
    queue: Arc<dyn WorkQueue>,
    config: Config,
}

impl ReconciliationSweeper {
    pub fn new(db: PgPool, queue: Arc<dyn WorkQueue>, config: Config) -> Self {
        Self { db, queue, config }
    }

    fn settings(&self) -> &ReconciliationConfig {
        &self.config.reconciliation
    }

    /// Sweep on every tick until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        if !self.settings().enabled {
            info!("Reconciliation sweep is disabled");
            return;
        }

        info!(
            "Starting reconciliation sweep (interval: {:?}, pending threshold: {:?})",
            self.settings().interval,
            self.settings().pending_threshold
        );

        let mut ticker = interval(self.settings().interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Reconciliation sweep stopping");
                    return;
                }
                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(report) if report.claimed > 0 => info!(
                            claimed = report.claimed,
                            republished = report.republished,
                            "Reconciliation sweep complete"
                        ),
                        Ok(_) => debug!("Reconciliation sweep found nothing to do"),
                        Err(e) => error!("Reconciliation sweep failed: {}", e),
                    }
                }
            }
        }
    }

    /// Claim one batch of stale pending jobs and re-publish them. The rows stay locked
    /// (`SKIP LOCKED`) until the pass commits, so concurrent sweepers split the work.
    #[instrument(skip(self), err)]
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let settings = self.settings();
        let threshold = chrono::Duration::from_std(settings.pending_threshold).map_err(|_| Error::Internal {
            operation: "compute pending threshold".to_string(),
        })?;
        let older_than = Utc::now() - threshold;
        let timeout = self.config.database.operation_timeout;

        let mut tx = with_timeout(timeout, "begin sweep", async {
            self.db.begin().await.map_err(|e| Error::Database(e.into()))
        })
        .await?;

        let claimed = with_timeout(timeout, "claim stale jobs", async {
            Ok(Jobs::new(&mut tx).claim_stale_pending(older_than, settings.batch_size).await?)
        })
        .await?;

        let mut report = SweepReport {
            claimed: claimed.len(),
            ..Default::default()
        };

        for job in &claimed {
            warn!(job_id = %job.id, created_at = %job.created_at, attempts = job.publish_attempts, "Re-publishing stale pending job");
            if send(self.queue.as_ref(), timeout, job).await {
                // Recorded on the claiming transaction, which already holds the row lock
                Jobs::new(&mut tx).mark_published(job.id).await?;
                report.republished += 1;
            }
        }

        tx.commit().await.map_err(|e| Error::Database(e.into()))?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::models::jobs::{JobCreateDBRequest, JobDBResponse},
        queue::InMemoryQueue,
        test_utils::{create_test_config, create_test_user},
        types::JobId,
    };
    use rust_decimal::Decimal;
    use std::time::Duration;
    use uuid::Uuid;

    async fn pending_job(pool: &PgPool, age_minutes: i32) -> JobId {
        let user_id = create_test_user(pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let job = Jobs::new(&mut conn)
            .create(&JobCreateDBRequest {
                id: Uuid::new_v4(),
                user_id,
                source_ref: "upload:stale".to_string(),
                source_lang: "en".to_string(),
                target_lang: "it".to_string(),
                duration: 60,
                cost: Decimal::new(10, 2),
            })
            .await
            .unwrap()
            .unwrap();
        sqlx::query("UPDATE jobs SET created_at = NOW() - make_interval(mins => $2) WHERE id = $1")
            .bind(job.id)
            .bind(age_minutes)
            .execute(&mut *conn)
            .await
            .unwrap();
        job.id
    }

    async fn load(pool: &PgPool, id: JobId) -> JobDBResponse {
        let mut conn = pool.acquire().await.unwrap();
        Jobs::new(&mut conn).get_by_id(id).await.unwrap().unwrap()
    }

    fn sweeper(pool: &PgPool, queue: Arc<InMemoryQueue>) -> ReconciliationSweeper {
        let mut config = create_test_config();
        config.reconciliation.pending_threshold = Duration::from_secs(300);
        config.reconciliation.batch_size = 10;
        ReconciliationSweeper::new(pool.clone(), queue, config)
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_sweep_republishes_stale_pending_jobs(pool: PgPool) {
        let queue = Arc::new(InMemoryQueue::new());
        let stale = pending_job(&pool, 10).await;
        let fresh = pending_job(&pool, 0).await;

        let report = sweeper(&pool, queue.clone()).sweep_once().await.unwrap();

        assert_eq!(report, SweepReport { claimed: 1, republished: 1 });
        let messages = queue.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].job_id, stale);

        let stale = load(&pool, stale).await;
        assert_eq!(stale.publish_attempts, 1);
        assert!(stale.last_published_at.is_some());
        assert_eq!(load(&pool, fresh).await.publish_attempts, 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_recently_republished_job_is_left_alone(pool: PgPool) {
        let queue = Arc::new(InMemoryQueue::new());
        pending_job(&pool, 10).await;
        let sweeper = sweeper(&pool, queue.clone());

        assert_eq!(sweeper.sweep_once().await.unwrap().republished, 1);
        assert_eq!(sweeper.sweep_once().await.unwrap(), SweepReport::default());
        assert_eq!(queue.messages().len(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_failed_republish_is_retried_next_pass(pool: PgPool) {
        let queue = Arc::new(InMemoryQueue::new());
        let job_id = pending_job(&pool, 10).await;
        let sweeper = sweeper(&pool, queue.clone());

        queue.set_failing(true);
        assert_eq!(sweeper.sweep_once().await.unwrap(), SweepReport { claimed: 1, republished: 0 });
        assert_eq!(load(&pool, job_id).await.publish_attempts, 0);

        queue.set_failing(false);
        assert_eq!(sweeper.sweep_once().await.unwrap(), SweepReport { claimed: 1, republished: 1 });
        assert_eq!(queue.messages()[0].job_id, job_id);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_sweep_ignores_non_pending_jobs(pool: PgPool) {
        let queue = Arc::new(InMemoryQueue::new());
        let job_id = pending_job(&pool, 10).await;
        sqlx::query("UPDATE jobs SET status = 'processing' WHERE id = $1")
            .bind(job_id)
            .execute(&pool)
            .await
            .unwrap();

        assert_eq!(sweeper(&pool, queue.clone()).sweep_once().await.unwrap().claimed, 0);
        assert!(queue.messages().is_empty());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_run_stops_on_cancellation(pool: PgPool) {
        let queue = Arc::new(InMemoryQueue::new());
        pending_job(&pool, 10).await;
        let mut config = create_test_config();
        config.reconciliation.enabled = true;
        config.reconciliation.interval = Duration::from_millis(20);
        let sweeper = ReconciliationSweeper::new(pool.clone(), queue.clone(), config);

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(sweeper.run(shutdown.clone()));

        // The first tick fires immediately
        for _ in 0..100 {
            if !queue.messages().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(queue.messages().len(), 1);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("Sweeper did not stop")
            .unwrap();
    }
}
