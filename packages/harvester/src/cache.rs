//! Harvest result caching.
//!
//! The cache is an injected capability: callers hand a [`CacheStore`] to the
//! harvester instead of relying on process-wide state. A value is written
//! only after its computation succeeded, so a failed or aborted harvest never
//! leaves a partial result behind.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{HarvesterError, Result};

/// Cache tag for annotation collections.
pub const TAG_ANNOTATIONS: &str = "annotations";

/// Cache tag for task server domain objects.
pub const TAG_PYBOSSA: &str = "pybossa";

/// Identity of a cached computation.
///
/// Rendered as `namespace|part|part...`; the parts always include the
/// endpoint URL so two collections never share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key from a namespace and ordered parts.
    pub fn new<I, S>(namespace: &str, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut key = namespace.to_string();
        for part in parts {
            key.push('|');
            key.push_str(part.as_ref());
        }
        Self(key)
    }

    /// The rendered key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key/value store with expiry and tag-based eviction.
pub trait CacheStore {
    /// Look up an unexpired value.
    fn get(&self, key: &CacheKey) -> Result<Option<Value>>;

    /// Store a value under `key`, tagged for selective eviction.
    fn put(&self, key: &CacheKey, tag: &str, ttl: Duration, value: Value) -> Result<()>;

    /// Remove every entry carrying `tag`; returns how many were removed.
    fn evict_tag(&self, tag: &str) -> Result<usize>;

    /// Remove every entry; returns how many were removed.
    fn clear(&self) -> Result<usize>;
}

impl<T: CacheStore + ?Sized> CacheStore for &T {
    fn get(&self, key: &CacheKey) -> Result<Option<Value>> {
        (**self).get(key)
    }

    fn put(&self, key: &CacheKey, tag: &str, ttl: Duration, value: Value) -> Result<()> {
        (**self).put(key, tag, ttl, value)
    }

    fn evict_tag(&self, tag: &str) -> Result<usize> {
        (**self).evict_tag(tag)
    }

    fn clear(&self) -> Result<usize> {
        (**self).clear()
    }
}

/// Return the cached value for `key`, or compute, store and return it.
///
/// The value is stored only when `compute` succeeds. A cached value that no
/// longer deserializes into `T` is recomputed.
pub fn get_or_compute<T, C, F>(
    store: &C,
    key: &CacheKey,
    tag: &str,
    ttl: Duration,
    compute: F,
) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    C: CacheStore + ?Sized,
    F: FnOnce() -> Result<T>,
{
    if let Some(value) = store.get(key)? {
        match serde_json::from_value::<T>(value) {
            Ok(hit) => {
                debug!(key = %key, "Cache hit");
                return Ok(hit);
            }
            Err(e) => warn!(key = %key, error = %e, "Discarding unreadable cache entry"),
        }
    }

    debug!(key = %key, "Cache miss");
    let computed = compute()?;
    store.put(key, tag, ttl, serde_json::to_value(&computed)?)?;
    Ok(computed)
}

fn expiry(ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Stored entry shared by the backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    key: String,
    tag: String,
    expires_at: DateTime<Utc>,
    value: Value,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Cache that never stores anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl CacheStore for NoCache {
    fn get(&self, _key: &CacheKey) -> Result<Option<Value>> {
        Ok(None)
    }

    fn put(&self, _key: &CacheKey, _tag: &str, _ttl: Duration, _value: Value) -> Result<()> {
        Ok(())
    }

    fn evict_tag(&self, _tag: &str) -> Result<usize> {
        Ok(0)
    }

    fn clear(&self) -> Result<usize> {
        Ok(0)
    }
}

/// Process-lifetime in-memory cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| HarvesterError::Cache("memory cache lock poisoned".to_string()))
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &CacheKey) -> Result<Option<Value>> {
        let mut entries = self.lock()?;
        match entries.get(key.as_str()) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key.as_str());
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    fn put(&self, key: &CacheKey, tag: &str, ttl: Duration, value: Value) -> Result<()> {
        let entry = Entry {
            key: key.as_str().to_string(),
            tag: tag.to_string(),
            expires_at: expiry(ttl),
            value,
        };
        self.lock()?.insert(entry.key.clone(), entry);
        Ok(())
    }

    fn evict_tag(&self, tag: &str) -> Result<usize> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|_, entry| entry.tag != tag);
        Ok(before - entries.len())
    }

    fn clear(&self) -> Result<usize> {
        let mut entries = self.lock()?;
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }
}

/// Cache persisted as one JSON file per entry in a directory.
///
/// File names are the SHA-256 of the key. Expired, unreadable or colliding
/// entries are treated as misses.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Open (creating if needed) a cache directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        let digest = Sha256::digest(key.as_str().as_bytes());
        self.dir.join(format!("{digest:x}.json"))
    }

    fn read_entry(path: &Path) -> Option<Entry> {
        let bytes = fs::read(path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring corrupt cache file");
                None
            }
        }
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for dir_entry in fs::read_dir(&self.dir)? {
            let path = dir_entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        Ok(files)
    }
}

impl CacheStore for FileCache {
    fn get(&self, key: &CacheKey) -> Result<Option<Value>> {
        let path = self.entry_path(key);
        let Some(entry) = Self::read_entry(&path) else {
            return Ok(None);
        };
        if entry.key != key.as_str() {
            warn!(key = %key, "Cache file belongs to another key");
            return Ok(None);
        }
        if entry.is_expired() {
            debug!(key = %key, "Cache entry expired");
            fs::remove_file(&path)?;
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    fn put(&self, key: &CacheKey, tag: &str, ttl: Duration, value: Value) -> Result<()> {
        let entry = Entry {
            key: key.as_str().to_string(),
            tag: tag.to_string(),
            expires_at: expiry(ttl),
            value,
        };
        let path = self.entry_path(key);
        // Write then rename so readers never see a half-written entry.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(&entry)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn evict_tag(&self, tag: &str) -> Result<usize> {
        let mut removed = 0;
        for path in self.entry_files()? {
            if Self::read_entry(&path).is_some_and(|entry| entry.tag == tag) {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn clear(&self) -> Result<usize> {
        let files = self.entry_files()?;
        for path in &files {
            fs::remove_file(path)?;
        }
        Ok(files.len())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use serde_json::json;

    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    fn key(endpoint: &str) -> CacheKey {
        CacheKey::new("collection", [endpoint, "page"])
    }

    #[test]
    fn test_cache_key_includes_parts() {
        let key = CacheKey::new("collection", ["https://a/annotations/x/", "page"]);
        assert_eq!(key.as_str(), "collection|https://a/annotations/x/|page");
        assert_ne!(key, CacheKey::new("collection", ["https://a/annotations/y/", "page"]));
    }

    #[test]
    fn test_get_or_compute_computes_once() {
        let cache = MemoryCache::new();
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            Ok(vec![1, 2, 3])
        };

        let first: Vec<i32> = get_or_compute(&cache, &key("a"), TAG_ANNOTATIONS, HOUR, compute).unwrap();
        let second: Vec<i32> = get_or_compute(&cache, &key("a"), TAG_ANNOTATIONS, HOUR, || {
            calls.set(calls.get() + 1);
            Ok(vec![])
        })
        .unwrap();

        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(second, vec![1, 2, 3]);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_failed_computation_is_not_cached() {
        let cache = MemoryCache::new();
        let failed: Result<Vec<i32>> = get_or_compute(&cache, &key("a"), TAG_ANNOTATIONS, HOUR, || {
            Err(HarvesterError::HttpStatus {
                url: "u".to_string(),
                status: 500,
            })
        });
        assert!(failed.is_err());
        assert_eq!(cache.get(&key("a")).unwrap(), None);
    }

    #[test]
    fn test_memory_cache_expiry() {
        let cache = MemoryCache::new();
        cache.put(&key("a"), TAG_ANNOTATIONS, Duration::ZERO, json!(1)).unwrap();
        assert_eq!(cache.get(&key("a")).unwrap(), None);
    }

    #[test]
    fn test_memory_cache_evict_tag() {
        let cache = MemoryCache::new();
        cache.put(&key("a"), TAG_ANNOTATIONS, HOUR, json!(1)).unwrap();
        cache.put(&key("b"), TAG_PYBOSSA, HOUR, json!(2)).unwrap();

        assert_eq!(cache.evict_tag(TAG_ANNOTATIONS).unwrap(), 1);
        assert_eq!(cache.get(&key("a")).unwrap(), None);
        assert_eq!(cache.get(&key("b")).unwrap(), Some(json!(2)));
        assert_eq!(cache.clear().unwrap(), 1);
    }

    #[test]
    fn test_no_cache_always_computes() {
        let calls = Cell::new(0);
        for _ in 0..2 {
            let _: i32 = get_or_compute(&NoCache, &key("a"), TAG_ANNOTATIONS, HOUR, || {
                calls.set(calls.get() + 1);
                Ok(7)
            })
            .unwrap();
        }
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_file_cache_round_trip_and_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(dir.path().join("cache")).unwrap();

        cache.put(&key("a"), TAG_ANNOTATIONS, HOUR, json!({"items": [1]})).unwrap();
        cache.put(&key("b"), TAG_PYBOSSA, HOUR, json!([2])).unwrap();
        assert_eq!(cache.get(&key("a")).unwrap(), Some(json!({"items": [1]})));

        // A second handle on the same directory sees the entries.
        let reopened = FileCache::open(cache.dir()).unwrap();
        assert_eq!(reopened.get(&key("b")).unwrap(), Some(json!([2])));

        assert_eq!(reopened.evict_tag(TAG_PYBOSSA).unwrap(), 1);
        assert_eq!(cache.get(&key("b")).unwrap(), None);
        assert_eq!(cache.clear().unwrap(), 1);
        assert_eq!(cache.get(&key("a")).unwrap(), None);
    }

    #[test]
    fn test_file_cache_expired_and_corrupt_entries_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(dir.path()).unwrap();

        cache.put(&key("a"), TAG_ANNOTATIONS, Duration::ZERO, json!(1)).unwrap();
        assert_eq!(cache.get(&key("a")).unwrap(), None);

        fs::write(cache.entry_path(&key("b")), b"not json").unwrap();
        assert_eq!(cache.get(&key("b")).unwrap(), None);
    }
}
