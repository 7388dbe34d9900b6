use super::{JobMessage, QueueResult, WorkQueue};
use crate::config::QueueConfig;
use async_trait::async_trait;
use tracing::debug;

/// Work queue on a Redis Stream. Each message carries the JSON payload under `job` and the job
/// id under `job_id` so consumers can dedupe without parsing.
pub struct RedisStreamQueue {
    client: redis::Client,
    stream: String,
    max_len: usize,
}

impl RedisStreamQueue {
    pub fn new(redis_url: &str, config: &QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            stream: config.stream.clone(),
            max_len: config.max_len,
        })
    }
}

#[async_trait]
impl WorkQueue for RedisStreamQueue {
    async fn publish(&self, message: &JobMessage) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(message)?;

        let message_id: String = redis::cmd("XADD")
            .arg(&self.stream)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_len)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("job_id")
            .arg(message.job_id.to_string())
            .query_async(&mut conn)
            .await?;

        debug!(job_id = %message.job_id, message_id = %message_id, stream = %self.stream, "Published job message");

        Ok(message_id)
    }
}
