use super::{JobMessage, QueueError, QueueResult, WorkQueue};
use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

/// Queue that keeps published messages in memory. Can be switched into a failing mode to
/// exercise the paths where the broker is unreachable.
#[derive(Default)]
pub struct InMemoryQueue {
    messages: Mutex<Vec<JobMessage>>,
    failing: AtomicBool,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Everything published so far, oldest first
    pub fn messages(&self) -> Vec<JobMessage> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl WorkQueue for InMemoryQueue {
    async fn publish(&self, message: &JobMessage) -> QueueResult<String> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(QueueError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "queue unavailable",
            ))));
        }

        let mut messages = self.messages.lock().unwrap_or_else(|e| e.into_inner());
        messages.push(message.clone());
        Ok(format!("{}-0", messages.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn message() -> JobMessage {
        JobMessage {
            job_id: Uuid::new_v4(),
            source_ref: "upload:abc".to_string(),
            source_lang: "en".to_string(),
            target_lang: "fr".to_string(),
            duration_seconds: 30,
            user_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_publish_records_and_can_fail() {
        let queue = InMemoryQueue::new();
        let first = message();

        queue.publish(&first).await.unwrap();
        queue.set_failing(true);
        assert!(queue.publish(&message()).await.is_err());
        queue.set_failing(false);
        queue.publish(&first).await.unwrap();

        assert_eq!(queue.messages(), vec![first.clone(), first]);
    }

    #[test]
    fn test_message_wire_format() {
        let msg = message();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["job_id"], msg.job_id.to_string());
        assert_eq!(json["source_ref"], "upload:abc");
        assert_eq!(json["duration_seconds"], 30);
        assert_eq!(json["user_id"], msg.user_id.to_string());
    }
}
