//! Backing stores for cached AI responses.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::clock::SharedClock;
use crate::storage::SqliteDb;

/// Prefix under which cache rows are persisted.
pub const CACHE_KEY_PREFIX: &str = "ai:cache:";

/// A stored value with its absolute expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub expires_at: DateTime<Utc>,
}

/// Key-value store with per-entry TTL.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Live value for `key`. Expired entries are evicted and reported absent.
    async fn get(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>>;

    /// Store `value` until `now + ttl`, replacing any previous entry.
    async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) -> anyhow::Result<()>;

    async fn delete(&self, key: &str) -> anyhow::Result<()>;

    async fn clear(&self) -> anyhow::Result<()>;

    /// Number of stored entries, expired ones included until evicted.
    async fn len(&self) -> anyhow::Result<usize>;

    fn backend_name(&self) -> &'static str;
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Entry count at which a write first sweeps expired entries.
const SWEEP_THRESHOLD: usize = 256;

struct MemoryCache {
    entries: HashMap<String, CacheEntry>,
    /// Next size that triggers a sweep; doubles with the live set.
    sweep_at: usize,
}

/// In-process cache store.
///
/// Expired entries are dropped when read, and swept in bulk by a write that
/// grows the map past its current watermark.
pub struct MemoryCacheStore {
    inner: Mutex<MemoryCache>,
    clock: SharedClock,
}

impl MemoryCacheStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            inner: Mutex::new(MemoryCache {
                entries: HashMap::new(),
                sweep_at: SWEEP_THRESHOLD,
            }),
            clock,
        }
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, MemoryCache>> {
        self.inner
            .lock()
            .map_err(|_| anyhow::anyhow!("cache mutex poisoned"))
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
        let now = self.clock.now();
        let mut inner = self.lock()?;
        match inner.entries.get(key) {
            Some(entry) if now < entry.expires_at => Ok(Some(entry.value.clone())),
            Some(_) => {
                inner.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) -> anyhow::Result<()> {
        let now = self.clock.now();
        let mut inner = self.lock()?;
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                value,
                expires_at: expiry(now, ttl),
            },
        );
        if inner.entries.len() > inner.sweep_at {
            let before = inner.entries.len();
            inner.entries.retain(|_, entry| now < entry.expires_at);
            let live = inner.entries.len();
            inner.sweep_at = (live * 2).max(SWEEP_THRESHOLD);
            tracing::debug!("Swept {} expired cache entries", before - live);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.lock()?.entries.remove(key);
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        let mut inner = self.lock()?;
        inner.entries.clear();
        inner.sweep_at = SWEEP_THRESHOLD;
        Ok(())
    }

    async fn len(&self) -> anyhow::Result<usize> {
        Ok(self.lock()?.entries.len())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// SQLite-backed cache store. Rows are keyed `ai:cache:<key>`.
pub struct SqliteCacheStore {
    db: SqliteDb,
    clock: SharedClock,
}

impl SqliteCacheStore {
    pub fn new(db: SqliteDb, clock: SharedClock) -> Self {
        Self { db, clock }
    }
}

fn row_key(key: &str) -> String {
    format!("{}{}", CACHE_KEY_PREFIX, key)
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
        let key = row_key(key);
        let now = self.clock.now().timestamp_millis();
        let row: Option<(String, i64)> = self
            .db
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT value, expires_at FROM cache_entries WHERE key = ?1",
                        params![key],
                        |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
                    )
                    .optional()?;
                if let Some((_, expires_at)) = &row {
                    if now >= *expires_at {
                        conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
                        return Ok(None);
                    }
                }
                Ok(row)
            })
            .await?;

        match row {
            Some((value, _)) => Ok(Some(serde_json::from_str(&value)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) -> anyhow::Result<()> {
        let key = row_key(key);
        let expires_at = expiry(self.clock.now(), ttl).timestamp_millis();
        let value = serde_json::to_string(&value)?;
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO cache_entries (key, value, expires_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
                    params![key, value, expires_at],
                )
            })
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let key = row_key(key);
        self.db
            .call(move |conn| conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key]))
            .await?;
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        let pattern = format!("{}%", CACHE_KEY_PREFIX);
        self.db
            .call(move |conn| conn.execute("DELETE FROM cache_entries WHERE key LIKE ?1", params![pattern]))
            .await?;
        Ok(())
    }

    async fn len(&self) -> anyhow::Result<usize> {
        let pattern = format!("{}%", CACHE_KEY_PREFIX);
        let count: i64 = self
            .db
            .call(move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM cache_entries WHERE key LIKE ?1",
                    params![pattern],
                    |row| row.get(0),
                )
            })
            .await?;
        Ok(count.max(0) as usize)
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualClock;
    use std::sync::Arc;
    use tempfile::tempdir;

    async fn exercise_store(store: &dyn CacheStore, clock: &ManualClock) {
        let ttl = Duration::from_secs(60);
        store.set("a", serde_json::json!({"n": 1}), ttl).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(serde_json::json!({"n": 1})));
        assert_eq!(store.get("missing").await.unwrap(), None);

        store.set("a", serde_json::json!("v2"), ttl).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(serde_json::json!("v2")));

        clock.advance_secs(59);
        assert!(store.get("a").await.unwrap().is_some());
        clock.advance_secs(1);
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.len().await.unwrap(), 0);

        store.set("b", serde_json::json!(2), ttl).await.unwrap();
        store.set("c", serde_json::json!(3), ttl).await.unwrap();
        store.delete("b").await.unwrap();
        assert_eq!(store.len().await.unwrap(), 1);
        store.clear().await.unwrap();
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_memory_store_ttl_and_clear() {
        let clock = Arc::new(ManualClock::at(2026, 3, 14));
        let store = MemoryCacheStore::new(clock.clone());
        exercise_store(&store, &clock).await;
        assert_eq!(store.backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_memory_store_sweeps_unread_expired_entries() {
        let clock = Arc::new(ManualClock::at(2026, 3, 14));
        let store = MemoryCacheStore::new(clock.clone());
        for i in 0..SWEEP_THRESHOLD {
            store
                .set(&format!("stale-{}", i), serde_json::json!(i), Duration::from_secs(1))
                .await
                .unwrap();
        }
        assert_eq!(store.len().await.unwrap(), SWEEP_THRESHOLD);

        clock.advance_secs(2);
        store.set("fresh", serde_json::json!("v"), Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 1);
        assert_eq!(store.get("fresh").await.unwrap(), Some(serde_json::json!("v")));
    }

    #[tokio::test]
    async fn test_sqlite_store_ttl_and_clear() {
        let temp = tempdir().unwrap();
        let clock = Arc::new(ManualClock::at(2026, 3, 14));
        let db = SqliteDb::open(&temp.path().join("cache.sqlite")).unwrap();
        let store = SqliteCacheStore::new(db.clone(), clock.clone());
        exercise_store(&store, &clock).await;

        store.set("x", serde_json::json!(1), Duration::from_secs(5)).await.unwrap();
        let key: String = db
            .call(|conn| conn.query_row("SELECT key FROM cache_entries", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(key, "ai:cache:x");
    }

    #[test]
    fn test_expiry_saturates() {
        let now = Utc::now();
        assert_eq!(expiry(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
    }
}
