//! Typed cache adapter over a `CacheStore`.
//!
//! Failure policy: a store error on read is a miss, a store error on write or
//! delete is logged and dropped. Every store call is bounded by `op_timeout`
//! and a call that runs past it counts as a failure, so a slow or unreachable
//! store can neither fail nor stall generation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::cache::keys::CacheKey;
use crate::cache::store::CacheStore;
use crate::models::StructuredContent;

/// What the cache holds for one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEntry {
    pub payload: StructuredContent,
    pub cached_at: DateTime<Utc>,
    pub ttl_seconds: u64,
    pub is_fallback: bool,
}

impl CachedEntry {
    pub fn new(payload: StructuredContent, ttl: Duration, is_fallback: bool) -> Self {
        Self {
            payload,
            cached_at: Utc::now(),
            ttl_seconds: ttl.as_secs(),
            is_fallback,
        }
    }
}

/// Default bound on one store call.
const DEFAULT_OP_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Clone)]
pub struct ContentCache {
    store: Arc<dyn CacheStore>,
    op_timeout: Duration,
}

impl ContentCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    pub async fn get(&self, namespace: &str, key: &CacheKey) -> Option<CachedEntry> {
        let raw = match timeout(self.op_timeout, self.store.get(namespace, key.as_str())).await {
            Ok(Ok(Some(raw))) => raw,
            Ok(Ok(None)) => return None,
            Ok(Err(e)) => {
                warn!(
                    backend = self.store.backend(),
                    "Cache read failed for {namespace}:{key}, treating as miss: {e}"
                );
                return None;
            }
            Err(_) => {
                warn!(
                    backend = self.store.backend(),
                    "Cache read for {namespace}:{key} timed out after {}ms, treating as miss",
                    self.op_timeout.as_millis()
                );
                return None;
            }
        };

        match serde_json::from_str::<CachedEntry>(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Undecodable cache entry at {namespace}:{key}, treating as miss: {e}");
                None
            }
        }
    }

    pub async fn put(&self, namespace: &str, key: &CacheKey, entry: &CachedEntry) {
        let raw = match serde_json::to_string(entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to encode cache entry for {namespace}:{key}: {e}");
                return;
            }
        };

        let ttl = Duration::from_secs(entry.ttl_seconds);
        let write = self.store.set(namespace, key.as_str(), &raw, ttl);
        match timeout(self.op_timeout, write).await {
            Ok(Ok(())) => debug!(
                "Cached {namespace}:{key} for {}s (fallback={})",
                entry.ttl_seconds, entry.is_fallback
            ),
            Ok(Err(e)) => warn!(
                backend = self.store.backend(),
                "Cache write failed for {namespace}:{key}, continuing without cache: {e}"
            ),
            Err(_) => warn!(
                backend = self.store.backend(),
                "Cache write for {namespace}:{key} timed out after {}ms, skipped",
                self.op_timeout.as_millis()
            ),
        }
    }

    pub async fn delete(&self, namespace: &str, key: &CacheKey) {
        match timeout(self.op_timeout, self.store.delete(namespace, key.as_str())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                backend = self.store.backend(),
                "Cache delete failed for {namespace}:{key}: {e}"
            ),
            Err(_) => warn!(
                backend = self.store.backend(),
                "Cache delete for {namespace}:{key} timed out after {}ms",
                self.op_timeout.as_millis()
            ),
        }
    }
}
