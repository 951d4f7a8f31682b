//! Job broker: a thin Redis list wrapper. One `RedisJobBroker` per worker
//! process, backed by `redis::aio::ConnectionManager` so a dropped
//! connection is transparently re-established — the same long-lived
//! connection profile the teacher uses for its other stores, applied here
//! to the queue transport (§5).
//!
//! `attempts: 1` everywhere: the broker never retries a job. Retry only
//! happens inside the LLM client boundary (§7, §9 "Retry discipline").

use async_trait::async_trait;
use mnemosyne_common::config::RedisConfig;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BrokerError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("job payload could not be serialized or deserialized: {0}")]
    Codec(#[from] serde_json::Error),
}

#[async_trait]
pub trait JobBroker: Send + Sync {
    async fn enqueue<T: Serialize + Send + Sync>(&self, queue: &str, job: &T) -> Result<(), BrokerError>;

    /// Blocking pop with a timeout, so a worker loop can poll without a
    /// busy spin. Returns `None` on timeout (no job ready).
    async fn dequeue<T: DeserializeOwned + Send>(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<T>, BrokerError>;
}

#[derive(Clone)]
pub struct RedisJobBroker {
    conn: ConnectionManager,
}

impl RedisJobBroker {
    pub async fn connect(config: &RedisConfig) -> Result<Self, BrokerError> {
        let client = redis::Client::open(config.job_broker_url.as_str())?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl JobBroker for RedisJobBroker {
    async fn enqueue<T: Serialize + Send + Sync>(&self, queue: &str, job: &T) -> Result<(), BrokerError> {
        let payload = serde_json::to_string(job)?;
        let mut conn = self.conn.clone();
        let _: () = conn.lpush(queue, payload).await?;
        Ok(())
    }

    async fn dequeue<T: DeserializeOwned + Send>(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<T>, BrokerError> {
        let mut conn = self.conn.clone();
        let reply: Option<(String, String)> = conn.brpop(queue, timeout.as_secs_f64()).await?;
        match reply {
            Some((_, payload)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_error_wraps_codec_failures() {
        let err: Result<(), BrokerError> =
            Err(serde_json::from_str::<serde_json::Value>("{not json").unwrap_err().into());
        assert!(matches!(err, Err(BrokerError::Codec(_))));
    }
}
