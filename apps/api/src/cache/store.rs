//! Cache stores: namespaced key/value backends with TTL.
//!
//! `RedisStore` is the production backend. `MemoryStore` serves local and
//! single-instance runs (`CACHE_BACKEND=memory`) and tests; it reads
//! `tokio::time::Instant`, so paused test time drives expiry.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Raw string key/value store. Implementations own network I/O only; the
/// failure policy (miss on read error, swallow on write error) lives in
/// `ContentCache`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    async fn delete(&self, namespace: &str, key: &str) -> Result<(), CacheError>;

    fn backend(&self) -> &'static str;
}

fn namespaced(namespace: &str, key: &str) -> String {
    format!("{namespace}:{key}")
}

// ────────────────────────────────────────────────────────────────────────────
// Redis
// ────────────────────────────────────────────────────────────────────────────

pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(namespaced(namespace, key)).await?;
        Ok(value)
    }

    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        // Redis rejects SETEX with a zero expiry.
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(namespaced(namespace, key), value, seconds)
            .await?;
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(namespaced(namespace, key)).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory
// ────────────────────────────────────────────────────────────────────────────

struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// Process-local store with passive expiry: expired entries are dropped when
/// read, never swept.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, CacheError> {
        let full_key = namespaced(namespace, key);
        let mut entries = self.entries.write().await;
        match entries.get(&full_key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(&full_key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.entries.write().await.insert(
            namespaced(namespace, key),
            MemoryEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<(), CacheError> {
        self.entries.write().await.remove(&namespaced(namespace, key));
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
