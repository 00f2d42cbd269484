//! Build cache: per-source fingerprints, parsed-content and
//! rendered-output memoization, and the dependency graph that drives
//! cascade invalidation. Persisted as a single JSON (optionally
//! Zstandard-compressed) file under `.bengal/`.

pub mod dependency;
pub mod coordinator;

pub use coordinator::{CacheCoordinator, InvalidationEvent, PageInvalidationReason};
pub use dependency::DependencyGraph;

use crate::hash::FileFingerprint;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

const CACHE_VERSION: u32 = 1;

/// What a page's parsed-content cache entry was produced from, so a
/// cache hit can be invalidated by either a content change or a
/// template/parser change without re-parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedContentEntry {
    pub source_hash: String,
    pub template_identity: String,
    pub parser_version: String,
    /// Hash of the page's full frontmatter, used as the conservative
    /// fallback when nav-metadata extraction fails.
    #[serde(default)]
    pub metadata_hash: Option<String>,
    /// Hash of just the nav-affecting metadata subset (title, weight,
    /// icon, menu visibility, child ordering), used to skip a
    /// section-wide rebuild when only unrelated frontmatter changed.
    #[serde(default)]
    pub nav_metadata_hash: Option<String>,
}

/// What a page's rendered-output cache entry depended on at render time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedOutputEntry {
    pub parsed_content_hash: String,
    pub asset_manifest_mtime: u128,
    /// Other page paths this page's rendered output depends on (e.g. a
    /// list page enumerating other pages); any of these changing
    /// invalidates this entry even if the page's own content didn't change.
    pub page_deps: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildCache {
    #[serde(default = "current_version")]
    pub version: u32,
    pub fingerprints: FxHashMap<String, FileFingerprint>,
    pub parsed_content: FxHashMap<String, ParsedContentEntry>,
    pub rendered_output: FxHashMap<String, RenderedOutputEntry>,
    pub dependencies: DependencyGraph,
    /// Taxonomy/section/page tags for metadata-based cascade decisions.
    pub page_tags: FxHashMap<String, Vec<String>>,
    /// autodoc source -> derived page paths, for the dual mtime/hash detector.
    pub autodoc_deps: FxHashMap<String, Vec<String>>,
    /// output path -> source path, used by the output-missing safety net.
    pub output_sources: FxHashMap<String, String>,
    /// source path -> search index entry, so an incremental build's
    /// `search-index.json` reflects the full site rather than just the
    /// pages this pass rendered.
    pub search_index: FxHashMap<String, crate::postprocess::SearchIndexEntry>,
    pub config_hash: String,
}

fn current_version() -> u32 {
    CACHE_VERSION
}

impl BuildCache {
    pub fn new() -> Self {
        Self {
            version: CACHE_VERSION,
            ..Default::default()
        }
    }

    /// Load the cache from `path` (optionally Zstandard-compressed,
    /// selected by examining the first bytes for the zstd magic number).
    /// A version mismatch or corrupt/truncated file produces a fresh
    /// cache rather than an error — the build degrades to a full rebuild.
    pub fn load(path: &Path) -> Self {
        let Ok(bytes) = std::fs::read(path) else {
            return Self::new();
        };
        Self::from_bytes(&bytes).unwrap_or_else(|_| Self::new())
    }

    /// Load the legacy single-file cache format used before the current
    /// on-disk layout, if no new-format cache exists. Avoids discarding
    /// useful fingerprint data across an upgrade.
    pub fn load_or_migrate_legacy(path: &Path, legacy_path: &Path) -> Self {
        if path.exists() {
            return Self::load(path);
        }
        if legacy_path.exists() {
            if let Ok(bytes) = std::fs::read(legacy_path) {
                if let Ok(cache) = Self::from_bytes(&bytes) {
                    return cache;
                }
            }
        }
        Self::new()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, ()> {
        let json_bytes = if bytes.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
            zstd::stream::decode_all(bytes).map_err(|_| ())?
        } else {
            bytes.to_vec()
        };
        let cache: Self = serde_json::from_slice(&json_bytes).map_err(|_| ())?;
        if cache.version != CACHE_VERSION {
            return Err(());
        }
        Ok(cache)
    }

    pub fn save(&self, path: &Path, compress: bool) -> std::io::Result<()> {
        let json = serde_json::to_vec(self)?;
        let bytes = if compress {
            zstd::stream::encode_all(json.as_slice(), 0)?
        } else {
            json
        };
        crate::paths::atomic_write(path, &bytes)
    }

    /// Parsed-content cache hit requires matching source hash, template
    /// identity, and parser version.
    pub fn parsed_content_hit(&self, page: &str, expected: &ParsedContentEntry) -> bool {
        self.parsed_content.get(page) == Some(expected)
    }

    /// Rendered-output cache hit requires a parsed-content hit, a
    /// matching asset-manifest mtime, and that no page dependency changed.
    pub fn rendered_output_hit(
        &self,
        page: &str,
        parsed: &ParsedContentEntry,
        asset_manifest_mtime: u128,
    ) -> bool {
        if !self.parsed_content_hit(page, parsed) {
            return false;
        }
        let Some(entry) = self.rendered_output.get(page) else {
            return false;
        };
        if entry.asset_manifest_mtime != asset_manifest_mtime {
            return false;
        }
        entry
            .page_deps
            .iter()
            .all(|dep| !self.is_dirty(dep))
    }

    fn is_dirty(&self, page: &str) -> bool {
        !self.fingerprints.contains_key(page)
    }

    /// `true` if `path` has no stored fingerprint, or `current` differs
    /// from the stored one. Fast path compares `(mtime,size)` only;
    /// content-hash fallback is delegated to `FileFingerprint::content_matches`.
    ///
    /// On a slow-path hit (hash matches despite `(mtime,size)` differing —
    /// a file touched without its content changing), the stored fingerprint
    /// is refreshed in place with the new `(mtime,size)` while keeping the
    /// existing hash, via [`FileFingerprint::with_refreshed_metadata`], so
    /// the next build takes the fast path for this file instead of
    /// rehashing it forever.
    pub fn is_changed(&mut self, path: &str, current: Option<&FileFingerprint>) -> bool {
        let (Some(current), Some(stored)) = (current, self.fingerprints.get(path)) else {
            return true;
        };
        if current.fast_matches(stored) {
            return false;
        }
        match current.content_matches(stored) {
            Some(true) => {
                let refreshed = stored.with_refreshed_metadata(current.mtime_ns, current.size);
                self.fingerprints.insert(path.to_string(), refreshed);
                false
            }
            Some(false) => true,
            None => true,
        }
    }

    pub fn update_file(&mut self, path: impl Into<String>, fingerprint: FileFingerprint) {
        self.fingerprints.insert(path.into(), fingerprint);
    }

    /// `true` when `path` was explicitly flagged changed by a watcher, or
    /// [`is_changed`](Self::is_changed) says so.
    pub fn should_bypass(
        &mut self,
        path: &str,
        current: Option<&FileFingerprint>,
        explicit_changed: &std::collections::HashSet<String>,
    ) -> bool {
        explicit_changed.contains(path) || self.is_changed(path, current)
    }

    pub fn update_tags(&mut self, path: impl Into<String>, tags: Vec<String>) {
        self.page_tags.insert(path.into(), tags);
    }

    pub fn get_previous_tags(&self, path: &str) -> Vec<String> {
        self.page_tags.get(path).cloned().unwrap_or_default()
    }

    pub fn invalidate_rendered_output(&mut self, path: &str) -> bool {
        self.rendered_output.remove(path).is_some()
    }

    pub fn invalidate_parsed_content(&mut self, path: &str) -> bool {
        self.parsed_content.remove(path).is_some()
    }

    pub fn invalidate_fingerprint(&mut self, path: &str) -> bool {
        self.fingerprints.remove(path).is_some()
    }

    pub fn get_affected_pages(&self, template_path: &str) -> Vec<String> {
        self.dependencies.pages_using_template(template_path)
    }

    pub fn get_autodoc_source_files(&self) -> Vec<String> {
        self.autodoc_deps.keys().cloned().collect()
    }

    pub fn get_affected_autodoc_pages(&self, source: &str) -> Vec<String> {
        self.autodoc_deps.get(source).cloned().unwrap_or_default()
    }

    /// Autodoc sources whose recomputed content hash no longer matches the
    /// hash captured in their fingerprint. `current_hash` is injected so
    /// this stays a pure function over caller-supplied filesystem state.
    pub fn get_stale_autodoc_sources(
        &self,
        current_hash: impl Fn(&str) -> Option<String>,
    ) -> Vec<String> {
        self.autodoc_deps
            .keys()
            .filter(|source| {
                let stored = self.fingerprints.get(source.as_str()).and_then(|f| f.hash.clone());
                current_hash(source) != stored
            })
            .cloned()
            .collect()
    }

    /// If `config_hash` no longer matches, mark this cache as stale
    /// (callers should treat that as "needs a full rebuild") and report
    /// the mismatch; the stored hash is left untouched so a subsequent
    /// successful build can update it explicitly.
    pub fn validate_config(&self, config_hash: &str) -> bool {
        self.config_hash == config_hash
    }
}

/// Fingerprint updates are queued during render and only applied to the
/// cache on build success; on failure they are simply discarded, so a
/// crashed build never records a fingerprint for output that was never
/// written.
#[derive(Default)]
pub struct DeferredFingerprintQueue {
    updates: Mutex<Vec<(String, FileFingerprint)>>,
}

impl DeferredFingerprintQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self, path: impl Into<String>, fingerprint: FileFingerprint) {
        self.updates.lock().unwrap().push((path.into(), fingerprint));
    }

    pub fn flush_into(self, cache: &mut BuildCache) {
        for (path, fingerprint) in self.updates.into_inner().unwrap() {
            cache.fingerprints.insert(path, fingerprint);
        }
    }

    pub fn discard(self) {
        drop(self);
    }

    pub fn len(&self) -> usize {
        self.updates.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(mtime: u128) -> FileFingerprint {
        FileFingerprint {
            mtime_ns: mtime,
            size: 10,
            hash: Some("abc".into()),
        }
    }

    #[test]
    fn roundtrips_through_json() {
        let mut cache = BuildCache::new();
        cache.fingerprints.insert("a.md".into(), fp(1));
        cache.config_hash = "deadbeef".into();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        cache.save(&path, false).unwrap();

        let loaded = BuildCache::load(&path);
        assert_eq!(loaded.fingerprints["a.md"], fp(1));
        assert_eq!(loaded.config_hash, "deadbeef");
    }

    #[test]
    fn roundtrips_through_compressed_json() {
        let mut cache = BuildCache::new();
        cache.fingerprints.insert("a.md".into(), fp(1));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json.zst");
        cache.save(&path, true).unwrap();

        let loaded = BuildCache::load(&path);
        assert_eq!(loaded.fingerprints["a.md"], fp(1));
    }

    #[test]
    fn missing_file_is_a_fresh_cache_not_an_error() {
        let cache = BuildCache::load(Path::new("/nonexistent/cache.json"));
        assert!(cache.fingerprints.is_empty());
    }

    #[test]
    fn version_mismatch_is_a_fresh_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, r#"{"version":999,"fingerprints":{}}"#).unwrap();
        let cache = BuildCache::load(&path);
        assert_eq!(cache.version, CACHE_VERSION);
        assert!(cache.fingerprints.is_empty());
    }

    #[test]
    fn corrupt_file_is_a_fresh_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, b"not json at all").unwrap();
        let cache = BuildCache::load(&path);
        assert!(cache.fingerprints.is_empty());
    }

    #[test]
    fn legacy_cache_is_migrated_when_no_new_cache_exists() {
        let dir = tempfile::tempdir().unwrap();
        let new_path = dir.path().join("cache.json");
        let legacy_path = dir.path().join("public").join(".bengal-cache.json");
        std::fs::create_dir_all(legacy_path.parent().unwrap()).unwrap();

        let mut legacy = BuildCache::new();
        legacy.fingerprints.insert("old.md".into(), fp(1));
        std::fs::write(&legacy_path, serde_json::to_vec(&legacy).unwrap()).unwrap();

        let cache = BuildCache::load_or_migrate_legacy(&new_path, &legacy_path);
        assert!(cache.fingerprints.contains_key("old.md"));
    }

    #[test]
    fn deferred_fingerprints_only_apply_on_flush() {
        let queue = DeferredFingerprintQueue::new();
        queue.queue("a.md", fp(5));
        let mut cache = BuildCache::new();
        assert!(!cache.fingerprints.contains_key("a.md"));
        queue.flush_into(&mut cache);
        assert!(cache.fingerprints.contains_key("a.md"));
    }

    #[test]
    fn rendered_output_hit_requires_parsed_content_and_assets_and_deps() {
        let mut cache = BuildCache::new();
        let parsed = ParsedContentEntry {
            source_hash: "h1".into(),
            template_identity: "post.html".into(),
            parser_version: "1".into(),
            metadata_hash: None,
            nav_metadata_hash: None,
        };
        cache
            .parsed_content
            .insert("a.md".into(), parsed.clone());
        cache.rendered_output.insert(
            "a.md".into(),
            RenderedOutputEntry {
                parsed_content_hash: "h1".into(),
                asset_manifest_mtime: 42,
                page_deps: vec!["b.md".into()],
            },
        );
        cache.fingerprints.insert("b.md".into(), fp(1));

        assert!(cache.rendered_output_hit("a.md", &parsed, 42));
        assert!(!cache.rendered_output_hit("a.md", &parsed, 43));

        cache.fingerprints.remove("b.md");
        assert!(!cache.rendered_output_hit("a.md", &parsed, 42));
    }

    #[test]
    fn is_changed_true_when_no_fingerprint_stored() {
        let mut cache = BuildCache::new();
        assert!(cache.is_changed("a.md", Some(&fp(1))));
    }

    #[test]
    fn is_changed_false_on_fast_path_match() {
        let mut cache = BuildCache::new();
        cache.update_file("a.md", fp(1));
        assert!(!cache.is_changed("a.md", Some(&fp(1))));
    }

    #[test]
    fn is_changed_refreshes_stored_metadata_on_slow_path_hit() {
        let mut cache = BuildCache::new();
        cache.update_file("a.md", fp(1));
        // Touched (mtime differs) but content hash is identical.
        let touched = FileFingerprint {
            mtime_ns: 2,
            size: 10,
            hash: Some("abc".into()),
        };
        assert!(!cache.is_changed("a.md", Some(&touched)));
        let stored = cache.fingerprints.get("a.md").unwrap();
        assert_eq!(stored.mtime_ns, 2);
        assert_eq!(stored.hash.as_deref(), Some("abc"));

        // The next comparison against the same on-disk state is now a
        // fast-path hit: no hash needed even though `current` has none.
        let settled = FileFingerprint {
            mtime_ns: 2,
            size: 10,
            hash: None,
        };
        assert!(!cache.is_changed("a.md", Some(&settled)));
    }

    #[test]
    fn should_bypass_true_for_explicitly_changed_path_even_if_unchanged() {
        let mut cache = BuildCache::new();
        cache.update_file("a.md", fp(1));
        let mut explicit = std::collections::HashSet::new();
        explicit.insert("a.md".to_string());
        assert!(cache.should_bypass("a.md", Some(&fp(1)), &explicit));
    }

    #[test]
    fn stale_autodoc_sources_detected_by_hash_mismatch() {
        let mut cache = BuildCache::new();
        cache.autodoc_deps.insert("api/foo.rs".into(), vec!["content/api/foo.md".into()]);
        cache.fingerprints.insert(
            "api/foo.rs".into(),
            FileFingerprint {
                mtime_ns: 1,
                size: 10,
                hash: Some("old".into()),
            },
        );
        let stale = cache.get_stale_autodoc_sources(|_| Some("new".to_string()));
        assert_eq!(stale, vec!["api/foo.rs".to_string()]);
    }
}
