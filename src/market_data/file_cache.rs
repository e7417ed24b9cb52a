use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use super::KeyValueCache;
use crate::clock::{Clock, SystemClock};

#[derive(Serialize, Deserialize)]
struct StoredEntry {
    expires_at: DateTime<Utc>,
    value: Vec<u8>,
}

/// Key-value cache kept as one JSON file per key, so cached prices outlive
/// a single CLI invocation.
///
/// Directory structure:
/// ```text
/// cache/
///   {key}.json
/// ```
pub struct FileKeyValueCache {
    base_path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FileKeyValueCache {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn entry_file(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            bail!("Invalid cache key: {key:?}");
        }
        Ok(self.base_path.join(format!("{key}.json")))
    }
}

#[async_trait::async_trait]
impl KeyValueCache for FileKeyValueCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.entry_file(key)?;
        let content = match fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context("Failed to read cache entry"),
        };

        let entry: StoredEntry = match serde_json::from_slice(&content) {
            Ok(entry) => entry,
            Err(err) => {
                debug!(key, error = %err, "discarding corrupt cache file");
                return Ok(None);
            }
        };
        if self.clock.now() > entry.expires_at {
            debug!(key, "cache entry expired");
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let path = self.entry_file(key)?;
        let ttl = chrono::Duration::from_std(ttl).context("Cache TTL out of range")?;
        let entry = StoredEntry {
            expires_at: self.clock.now() + ttl,
            value,
        };

        fs::create_dir_all(&self.base_path)
            .await
            .context("Failed to create cache directory")?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(&entry)?)
            .await
            .context("Failed to write cache entry")?;
        fs::rename(&tmp, &path)
            .await
            .context("Failed to replace cache entry")?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let path = self.entry_file(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).context("Failed to remove cache entry"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[tokio::test]
    async fn entries_survive_reopen_until_expiry() -> Result<()> {
        let dir = TempDir::new()?;
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).unwrap(),
        ));

        FileKeyValueCache::new(dir.path())
            .with_clock(clock.clone())
            .set("crypto_prices", b"{}".to_vec(), Duration::from_secs(60))
            .await?;

        let reopened = FileKeyValueCache::new(dir.path()).with_clock(clock.clone());
        assert_eq!(reopened.get("crypto_prices").await?, Some(b"{}".to_vec()));

        clock.advance(chrono::Duration::seconds(61));
        assert_eq!(reopened.get("crypto_prices").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn delete_and_missing_keys() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = FileKeyValueCache::new(dir.path().join("cache"));

        assert_eq!(cache.get("absent").await?, None);
        assert!(!cache.delete("absent").await?);

        cache.set("k", b"v".to_vec(), Duration::from_secs(60)).await?;
        assert!(cache.delete("k").await?);
        assert_eq!(cache.get("k").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn rejects_path_like_keys() {
        let dir = TempDir::new().unwrap();
        let cache = FileKeyValueCache::new(dir.path());
        assert!(cache.get("../escape").await.is_err());
        assert!(cache
            .set("a/b", Vec::new(), Duration::from_secs(1))
            .await
            .is_err());
    }
}
