//! TTL cache for context source results
//!
//! Entries are keyed by `(source, cache_key)` and expire after the TTL
//! configured for their source. Only successful fetches are stored.

use crate::Result;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct ContextCacheEntry {
    value: Value,
    expires_at: Instant,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

pub struct ContextCache {
    entries: RwLock<HashMap<(String, String), ContextCacheEntry>>,
    ttls: HashMap<String, Duration>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ContextCache {
    pub fn new(ttls: HashMap<String, Duration>, default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttls,
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl_for(&self, source: &str) -> Duration {
        self.ttls.get(source).copied().unwrap_or(self.default_ttl)
    }

    /// Return the cached value for `(source, key)` or run `fetch` and cache
    /// its result. Errors are returned to the caller and never cached.
    pub async fn get<F, Fut>(&self, source: &str, key: &str, fetch: F) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        let cache_key = (source.to_string(), key.to_string());

        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(&cache_key) {
                if Instant::now() < entry.expires_at {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(source, key, "Context cache hit");
                    return Ok(entry.value.clone());
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(source, key, "Context cache miss");

        let value = fetch().await?;

        let entry = ContextCacheEntry {
            value: value.clone(),
            expires_at: Instant::now() + self.ttl_for(source),
        };
        self.entries.write().await.insert(cache_key, entry);

        Ok(value)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len().await,
        }
    }
}
