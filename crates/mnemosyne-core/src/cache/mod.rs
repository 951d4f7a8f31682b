//! Prompt-section cache: Redis-backed, per-section TTLs (§5), normative
//! key layout from `mnemosyne_common::cache_keys` (§6.6). Generalizes the
//! teacher's in-process `moka` query cache to a store that's visible
//! across worker processes, since the section computing a prompt and the
//! worker consuming it are not guaranteed to be the same process.
//!
//! Cache writes are best-effort: a Redis hiccup degrades to
//! recomputation, it never fails the caller.

use mnemosyne_common::config::RedisConfig;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

#[derive(Clone)]
pub struct PromptSectionCache {
    conn: ConnectionManager,
}

impl PromptSectionCache {
    pub async fn connect(config: &RedisConfig) -> anyhow::Result<Self> {
        let client = redis::Client::open(config.cache_url.as_str())?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.conn.clone();
        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, key, "prompt cache read failed, falling back to recompute");
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let Ok(raw) = serde_json::to_string(value) else {
            return;
        };
        let mut conn = self.conn.clone();
        if let Err(e) = conn
            .set_ex::<_, _, ()>(key, raw, ttl.as_secs().max(1))
            .await
        {
            tracing::warn!(error = %e, key, "prompt cache write failed, continuing without caching");
        }
    }

    /// Compute-through helper: return the cached value if present,
    /// otherwise run `compute`, cache the result, and return it.
    pub async fn get_or_compute<T, F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> anyhow::Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<T>>,
    {
        if let Some(cached) = self.get::<T>(key).await {
            return Ok(cached);
        }
        let value = compute().await?;
        self.set(key, &value, ttl).await;
        Ok(value)
    }
}
