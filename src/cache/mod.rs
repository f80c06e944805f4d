//! Response cache for AI results.
//!
//! Wraps a [`CacheStore`] with a fixed TTL and an on/off switch. Failures in
//! the store are logged and treated as misses so a broken cache never blocks
//! a response.

pub mod keys;
mod store;

pub use keys::{chat_key, is_cacheable_chat, search_key, FAQ_TERMS};
pub use store::{CacheEntry, CacheStore, MemoryCacheStore, SqliteCacheStore, CACHE_KEY_PREFIX};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Cache occupancy report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub storage: String,
    pub enabled: bool,
}

/// TTL cache shared by the chat and search paths.
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    enabled: bool,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration, enabled: bool) -> Self {
        Self { store, ttl, enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached value for `key`, or `None` when absent, expired or disabled.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.enabled {
            return None;
        }

        let value = match self.store.get(key).await {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Cache read failed for {}: {}", key, e);
                return None;
            }
        };

        match serde_json::from_value(value) {
            Ok(v) => {
                tracing::debug!("Cache hit: {}", key);
                Some(v)
            }
            Err(e) => {
                tracing::warn!("Discarding unreadable cache entry {}: {}", key, e);
                None
            }
        }
    }

    /// Store `value` under `key` for the configured TTL.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        if !self.enabled {
            return;
        }

        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Failed to serialize cache value for {}: {}", key, e);
                return;
            }
        };

        if let Err(e) = self.store.set(key, value, self.ttl).await {
            tracing::warn!("Cache write failed for {}: {}", key, e);
        }
    }

    pub async fn clear(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            tracing::warn!("Failed to clear cache entry {}: {}", key, e);
        }
    }

    pub async fn clear_all(&self) {
        match self.store.clear().await {
            Ok(()) => tracing::info!("Response cache cleared"),
            Err(e) => tracing::warn!("Failed to clear response cache: {}", e),
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.store.len().await.unwrap_or_else(|e| {
            tracing::warn!("Failed to count cache entries: {}", e);
            0
        });
        CacheStats {
            entries,
            storage: self.store.backend_name().to_string(),
            enabled: self.enabled,
        }
    }
}
