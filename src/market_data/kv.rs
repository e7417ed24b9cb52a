use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::clock::{Clock, SystemClock};

/// Byte-string key-value cache with per-entry expiry (Redis-shaped).
#[async_trait::async_trait]
pub trait KeyValueCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Returns whether an entry was present.
    async fn delete(&self, key: &str) -> Result<bool>;
}

struct CacheEntry {
    value: Vec<u8>,
    expires_at: DateTime<Utc>,
}

/// In-process cache. Entries stay readable up to and including their expiry
/// instant and are dropped lazily on the first read after it.
pub struct MemoryKeyValueCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryKeyValueCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for MemoryKeyValueCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl KeyValueCache for MemoryKeyValueCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if now > entry.expires_at => {
                debug!(key, "cache entry expired");
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let ttl = chrono::Duration::from_std(ttl).context("Cache TTL out of range")?;
        let expires_at = self.clock.now() + ttl;
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), CacheEntry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        Ok(entries.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn cache_at_noon() -> (MemoryKeyValueCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
        ));
        let cache = MemoryKeyValueCache::new().with_clock(clock.clone());
        (cache, clock)
    }

    #[tokio::test]
    async fn serves_until_expiry_and_not_after() -> Result<()> {
        let (cache, clock) = cache_at_noon();
        cache
            .set("k", b"v".to_vec(), Duration::from_secs(60))
            .await?;

        clock.advance(chrono::Duration::seconds(60));
        assert_eq!(cache.get("k").await?, Some(b"v".to_vec()));

        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(cache.get("k").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn set_overwrites_and_restarts_ttl() -> Result<()> {
        let (cache, clock) = cache_at_noon();
        cache.set("k", b"old".to_vec(), Duration::from_secs(10)).await?;
        clock.advance(chrono::Duration::seconds(8));
        cache.set("k", b"new".to_vec(), Duration::from_secs(10)).await?;
        clock.advance(chrono::Duration::seconds(8));

        assert_eq!(cache.get("k").await?, Some(b"new".to_vec()));
        Ok(())
    }

    #[tokio::test]
    async fn delete_reports_presence() -> Result<()> {
        let (cache, _clock) = cache_at_noon();
        assert!(!cache.delete("k").await?);
        cache.set("k", b"v".to_vec(), Duration::from_secs(60)).await?;
        assert!(cache.delete("k").await?);
        assert_eq!(cache.get("k").await?, None);
        Ok(())
    }
}
