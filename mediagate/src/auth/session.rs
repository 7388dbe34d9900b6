//! Resolution of opaque session tokens issued by the account service.

use crate::{config::SessionConfig, types::UserId};
use async_trait::async_trait;
use redis::AsyncCommands;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session backend error: {0}")]
    Backend(#[from] redis::RedisError),
}

/// Looks up which user an opaque session token belongs to. An unknown or expired token is
/// `Ok(None)`; `Err` is reserved for the backend being unreachable.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<Option<UserId>, SessionError>;
}

#[derive(Debug, Deserialize)]
struct SessionRecord {
    user_id: UserId,
}

/// Sessions stored as JSON under `<prefix><token>`, expiring with the key's TTL
pub struct RedisSessionStore {
    client: redis::Client,
    key_prefix: String,
}

impl RedisSessionStore {
    pub fn new(redis_url: &str, config: &SessionConfig) -> Result<Self, SessionError> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
            key_prefix: config.key_prefix.clone(),
        })
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn resolve(&self, token: &str) -> Result<Option<UserId>, SessionError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = conn.get(format!("{}{}", self.key_prefix, token)).await?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        match serde_json::from_str::<SessionRecord>(&raw) {
            Ok(record) => Ok(Some(record.user_id)),
            Err(e) => {
                // A record we cannot read does not authenticate anyone
                warn!("Ignoring malformed session record: {}", e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
pub use memory::InMemorySessionStore;
