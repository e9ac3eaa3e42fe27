//! Payload caches.
//!
//! [`TtlCache`] holds the last fetched payload in memory so callers asking
//! again within the TTL do not refetch. [`DiskCache`] is a small key/value
//! store of JSON files for data worth keeping across runs. Any storage or
//! parse failure discards the entry; the caller refetches.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{LiveMapError, Result};

#[derive(Clone, Debug)]
pub struct TtlCache<T> {
    ttl: Duration,
    entry: Option<(Instant, T)>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entry: None }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn set_ttl(&mut self, ttl: Duration) {
        self.ttl = ttl;
    }

    pub fn put(&mut self, value: T) {
        self.entry = Some((Instant::now(), value));
    }

    /// The cached value if it is still fresh
    pub fn fresh(&self) -> Option<&T> {
        self.entry
            .as_ref()
            .filter(|(stored, _)| stored.elapsed() < self.ttl)
            .map(|(_, value)| value)
    }

    /// The cached value regardless of age. Used as the fallback when a
    /// fetch fails.
    pub fn last_good(&self) -> Option<&T> {
        self.entry.as_ref().map(|(_, value)| value)
    }

    pub fn age(&self) -> Option<Duration> {
        self.entry.as_ref().map(|(stored, _)| stored.elapsed())
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}

#[derive(Serialize, Deserialize)]
struct DiskEntry<T> {
    stored_at: DateTime<Utc>,
    value: T,
}

/// JSON files in one directory, one per key
#[derive(Clone, Debug)]
pub struct DiskCache {
    dir: PathBuf,
    ttl: Duration,
    max_bytes: usize,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration, max_bytes: usize) -> Self {
        Self {
            dir: dir.into(),
            ttl,
            max_bytes,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{name}.json"))
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_at(key, Utc::now())
    }

    pub fn get_at<T: DeserializeOwned>(&self, key: &str, now: DateTime<Utc>) -> Option<T> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("cache read {} failed: {e}", path.display());
                self.discard(&path);
                return None;
            }
        };

        let entry: DiskEntry<T> = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("discarding unreadable cache entry {key}: {e}");
                self.discard(&path);
                return None;
            }
        };

        let age = (now - entry.stored_at).to_std().unwrap_or_default();
        if age >= self.ttl {
            debug!("cache entry {key} expired");
            self.discard(&path);
            return None;
        }

        Some(entry.value)
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.put_at(key, value, Utc::now())
    }

    /// Store `value`. Anything over the size ceiling is refused and any
    /// older entry under the same key is dropped.
    pub fn put_at<T: Serialize>(&self, key: &str, value: &T, now: DateTime<Utc>) -> Result<()> {
        let path = self.path_for(key);
        let bytes = serde_json::to_vec(&DiskEntry {
            stored_at: now,
            value,
        })?;

        if bytes.len() > self.max_bytes {
            self.discard(&path);
            return Err(LiveMapError::Cache(format!(
                "entry {key} is {} bytes, limit is {}",
                bytes.len(),
                self.max_bytes
            )));
        }

        let written = fs::create_dir_all(&self.dir).and_then(|_| fs::write(&path, &bytes));
        if let Err(e) = written {
            self.discard(&path);
            return Err(LiveMapError::Cache(format!("writing {key}: {e}")));
        }
        Ok(())
    }

    pub fn remove(&self, key: &str) {
        self.discard(&self.path_for(key));
    }

    fn discard(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!("could not remove {}: {e}", path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[tokio::test(start_paused = true)]
    async fn test_ttl_cache_expiry() {
        let mut cache = TtlCache::new(Duration::from_secs(5));
        assert!(cache.fresh().is_none());

        cache.put("payload".to_owned());
        assert_eq!(cache.fresh().map(String::as_str), Some("payload"));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(cache.fresh().is_none());
        assert_eq!(cache.last_good().map(String::as_str), Some("payload"));

        cache.invalidate();
        assert!(cache.last_good().is_none());
    }

    #[test]
    fn test_disk_cache_round_trip_and_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), Duration::from_secs(60), 1024);
        let now = Utc::now();

        cache.put_at("stations/v1", &vec![1, 2, 3], now).unwrap();
        assert_eq!(cache.get_at::<Vec<i32>>("stations/v1", now), Some(vec![1, 2, 3]));

        let later = now + TimeDelta::seconds(61);
        assert_eq!(cache.get_at::<Vec<i32>>("stations/v1", later), None);
        // Expired entries are deleted
        assert!(!cache.path_for("stations/v1").exists());
    }

    #[test]
    fn test_disk_cache_size_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), Duration::from_secs(60), 64);

        cache.put("k", &"small").unwrap();
        let big = "x".repeat(200);
        let err = cache.put("k", &big).unwrap_err();
        assert!(matches!(err, LiveMapError::Cache(_)));

        // The old entry is gone too
        assert_eq!(cache.get::<String>("k"), None);
    }

    #[test]
    fn test_disk_cache_discards_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path(), Duration::from_secs(60), 1024);

        fs::write(cache.path_for("k"), b"{truncated").unwrap();
        assert_eq!(cache.get::<String>("k"), None);
        assert!(!cache.path_for("k").exists());

        // Wrong shape is garbage as well
        cache.put("k", &42).unwrap();
        assert_eq!(cache.get::<Vec<String>>("k"), None);
    }
}
