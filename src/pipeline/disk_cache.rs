//! Disk-backed, version-keyed memoization for stream stages.
//!
//! A version mismatch is treated as a cache miss rather than an error —
//! the producing stage simply recomputes and overwrites the stale entry.

use super::stream::StreamKey;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedEntry {
    version: String,
    value: serde_json::Value,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    entries: FxHashMap<String, CachedEntry>,
}

pub struct StreamCache {
    path: PathBuf,
    file: parking_lot::RwLock<CacheFile>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

fn cache_key(key: &StreamKey) -> String {
    format!("{}:{}", key.source, key.id)
}

impl StreamCache {
    pub fn new(path: PathBuf) -> Self {
        let file = std::fs::read(&path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default();
        Self {
            path,
            file: parking_lot::RwLock::new(file),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Returns the cached value for `key` iff an entry exists and its
    /// recorded version matches `key.version`.
    pub fn get(&self, key: &StreamKey) -> Option<serde_json::Value> {
        let file = self.file.read();
        match file.entries.get(&cache_key(key)) {
            Some(entry) if entry.version == key.version => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, key: &StreamKey, value: serde_json::Value) {
        self.file.write().entries.insert(
            cache_key(key),
            CachedEntry {
                version: key.version.clone(),
                value,
            },
        );
    }

    pub fn invalidate(&self, key: &StreamKey) {
        self.file.write().entries.remove(&cache_key(key));
    }

    pub fn invalidate_source(&self, source: &str) {
        let prefix = format!("{source}:");
        self.file.write().entries.retain(|k, _| !k.starts_with(&prefix));
    }

    pub fn clear(&self) {
        self.file.write().entries.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn save(&self) -> std::io::Result<()> {
        let bytes = serde_json::to_vec(&*self.file.read())?;
        crate::paths::atomic_write(&self.path, &bytes)
    }

    pub fn get_stats(&self) -> (usize, usize, usize) {
        let entries = self.file.read().entries.len();
        (
            entries,
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(source: &str, id: &str, version: &str) -> StreamKey {
        StreamKey::new(source, id, version)
    }

    #[test]
    fn put_then_get_hits() {
        let cache = StreamCache::new(PathBuf::from("/tmp/does-not-exist.json"));
        let k = key("parse", "a.md", "v1");
        cache.put(&k, serde_json::json!({"title": "A"}));
        assert_eq!(cache.get(&k), Some(serde_json::json!({"title": "A"})));
    }

    #[test]
    fn version_mismatch_is_a_miss() {
        let cache = StreamCache::new(PathBuf::from("/tmp/does-not-exist2.json"));
        let k1 = key("parse", "a.md", "v1");
        cache.put(&k1, serde_json::json!({"title": "A"}));
        let k2 = key("parse", "a.md", "v2");
        assert_eq!(cache.get(&k2), None);
    }

    #[test]
    fn invalidate_source_drops_all_its_entries() {
        let cache = StreamCache::new(PathBuf::from("/tmp/does-not-exist3.json"));
        cache.put(&key("parse", "a.md", "v1"), serde_json::json!(1));
        cache.put(&key("parse", "b.md", "v1"), serde_json::json!(2));
        cache.put(&key("render", "a.md", "v1"), serde_json::json!(3));
        cache.invalidate_source("parse");
        assert_eq!(cache.get(&key("parse", "a.md", "v1")), None);
        assert_eq!(cache.get(&key("render", "a.md", "v1")), Some(serde_json::json!(3)));
    }

    #[test]
    fn save_and_reload_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("streams.json");
        let cache = StreamCache::new(path.clone());
        cache.put(&key("parse", "a.md", "v1"), serde_json::json!({"x": 1}));
        cache.save().unwrap();

        let reloaded = StreamCache::new(path);
        assert_eq!(
            reloaded.get(&key("parse", "a.md", "v1")),
            Some(serde_json::json!({"x": 1}))
        );
    }
}
