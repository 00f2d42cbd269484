//! Content fingerprints and the deterministic configuration hash.
//!
//! Two distinct hashing concerns live here:
//!
//! - [`FileFingerprint`]: per-file `(mtime, size, hash)` used by the build
//!   cache to decide whether a source file changed since the last build.
//! - [`config_hash`]: a deterministic hash of the *effective* configuration,
//!   so changing `bengal.toml` (or an overlaid environment variable)
//!   invalidates exactly the cache entries it should.
//!
//! Both use SHA-256 truncated to 16 hex characters — short enough to keep
//! cache files readable, long enough that collisions are not a practical
//! concern for a single project's file set.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use std::time::SystemTime;

const EXCLUDED_KEYS: &[&str] = &[
    "_paths",
    "_config_hash",
    "_theme_obj",
    "_site",
    "_cache",
    "_tracker",
];

/// Hash arbitrary bytes, truncated to 16 hex characters (64 bits).
pub fn hash_bytes(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    hex::encode(&digest[..8])
}

pub fn hash_str(s: &str) -> String {
    hash_bytes(s.as_bytes())
}

/// `(mtime, size, hash)` triple used to decide whether a source file is
/// unchanged since it was last fingerprinted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileFingerprint {
    /// Modification time, nanoseconds since the Unix epoch.
    pub mtime_ns: u128,
    pub size: u64,
    /// Content hash, only computed when the fast path (mtime+size) misses.
    pub hash: Option<String>,
}

impl FileFingerprint {
    /// Compute mtime+size only; no file content is read.
    pub fn from_metadata(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        Ok(Self {
            mtime_ns: mtime_nanos(meta.modified()?),
            size: meta.len(),
            hash: None,
        })
    }

    /// Compute mtime+size+content hash (the slow path).
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        let mut file = std::fs::File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        let hash = hex::encode(&hasher.finalize()[..8]);
        Ok(Self {
            mtime_ns: mtime_nanos(meta.modified()?),
            size: meta.len(),
            hash: Some(hash),
        })
    }

    /// Fast-path comparison: `(mtime, size)` only. A `false` result does
    /// not necessarily mean the content changed — only that the slow path
    /// (content hash) must be consulted.
    pub fn fast_matches(&self, other: &Self) -> bool {
        self.mtime_ns == other.mtime_ns && self.size == other.size
    }

    /// Slow-path comparison: content hash. Requires both sides to have a
    /// hash computed.
    pub fn content_matches(&self, other: &Self) -> Option<bool> {
        match (&self.hash, &other.hash) {
            (Some(a), Some(b)) => Some(a == b),
            _ => None,
        }
    }

    /// Produce a fingerprint that records the new mtime/size but keeps the
    /// existing hash, for the "touch without content change" case: the
    /// slow path confirmed the content is identical, so there is no need
    /// to re-hash on the next run, and the unchanged hash means no
    /// dependent page is invalidated by this update.
    pub fn with_refreshed_metadata(&self, mtime_ns: u128, size: u64) -> Self {
        Self {
            mtime_ns,
            size,
            hash: self.hash.clone(),
        }
    }
}

fn mtime_nanos(time: SystemTime) -> u128 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

/// Recursively strip `_`-prefixed keys and [`EXCLUDED_KEYS`] from a JSON
/// object, recursing only into nested objects (not into array elements —
/// matching the reference implementation's shallow-array behavior).
fn clean(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                if k.starts_with('_') || EXCLUDED_KEYS.contains(&k.as_str()) {
                    continue;
                }
                out.insert(k.clone(), clean(v));
            }
            serde_json::Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Serialize a JSON value with sorted object keys and compact (no
/// whitespace) separators, ASCII-escaping non-ASCII characters — mirrors
/// `json.dumps(sort_keys=True, ensure_ascii=True, separators=(",", ":"))`.
fn canonical_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, k) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_escaped_string(k, out);
                out.push(':');
                write_canonical(&map[*k], out);
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        serde_json::Value::String(s) => write_escaped_string(s, out),
        serde_json::Value::Number(n) => out.push_str(&n.to_string()),
        serde_json::Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        serde_json::Value::Null => out.push_str("null"),
    }
}

fn write_escaped_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || (c as u32) > 0x7e => {
                let mut buf = [0u16; 2];
                for unit in c.encode_utf16(&mut buf) {
                    out.push_str(&format!("\\u{unit:04x}"));
                }
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Frontmatter keys that affect navigation: a section-index page's title,
/// ordering, and menu presentation. A change to any other key does not
/// need to cascade to the section's descendants.
const NAV_METADATA_KEYS: &[&str] = &["title", "weight", "icon", "menu", "sort_by"];

/// Hash of a page's full frontmatter, used as the section-cascade
/// fallback when nav-metadata extraction fails.
pub fn metadata_hash(metadata: &serde_json::Value) -> String {
    hash_str(&canonical_json(metadata))
}

/// Hash of just the nav-affecting metadata subset ([`NAV_METADATA_KEYS`]),
/// so touching an unrelated frontmatter key doesn't trigger a section-wide
/// rebuild.
pub fn nav_metadata_hash(metadata: &serde_json::Value) -> String {
    let mut subset = serde_json::Map::new();
    if let serde_json::Value::Object(map) = metadata {
        for key in NAV_METADATA_KEYS {
            if let Some(v) = map.get(*key) {
                subset.insert((*key).to_string(), v.clone());
            }
        }
    }
    hash_str(&canonical_json(&serde_json::Value::Object(subset)))
}

/// Deterministic hash of the effective configuration: internal
/// (`_`-prefixed or [`EXCLUDED_KEYS`]) fields are stripped, keys are
/// sorted, and the result is serialized compactly before hashing.
pub fn config_hash(config: &crate::config::SiteConfig) -> String {
    let value = serde_json::to_value(config).unwrap_or(serde_json::Value::Null);
    let cleaned = clean(&value);
    hash_str(&canonical_json(&cleaned))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_16_hex_chars() {
        let h = hash_str("hello");
        assert_eq!(h.len(), 16);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash_str("same input"), hash_str("same input"));
    }

    #[test]
    fn different_inputs_hash_differently() {
        assert_ne!(hash_str("a"), hash_str("b"));
    }

    #[test]
    fn fingerprint_fast_path_ignores_hash() {
        let a = FileFingerprint {
            mtime_ns: 1,
            size: 10,
            hash: Some("aaaa".into()),
        };
        let b = FileFingerprint {
            mtime_ns: 1,
            size: 10,
            hash: None,
        };
        assert!(a.fast_matches(&b));
    }

    #[test]
    fn touch_without_change_preserves_hash() {
        let original = FileFingerprint {
            mtime_ns: 1,
            size: 10,
            hash: Some("deadbeef".into()),
        };
        let touched = original.with_refreshed_metadata(2, 10);
        assert_eq!(touched.hash, original.hash);
        assert_ne!(touched.mtime_ns, original.mtime_ns);
    }

    #[test]
    fn config_hash_is_stable_across_field_reordering() {
        let mut a = crate::config::SiteConfig::default();
        a.site.title = "Example".into();
        let h1 = config_hash(&a);
        let h2 = config_hash(&a);
        assert_eq!(h1, h2);
    }

    #[test]
    fn config_hash_changes_with_content() {
        let mut a = crate::config::SiteConfig::default();
        let mut b = crate::config::SiteConfig::default();
        b.site.title = "Different".into();
        assert_ne!(config_hash(&a), config_hash(&b));
        a.site.title = "Different".into();
        assert_eq!(config_hash(&a), config_hash(&b));
    }

    #[test]
    fn clean_strips_excluded_and_underscore_keys() {
        let value = serde_json::json!({
            "_internal": 1,
            "_cache": {"a": 1},
            "kept": "value",
        });
        let cleaned = clean(&value);
        assert_eq!(cleaned, serde_json::json!({"kept": "value"}));
    }

    #[test]
    fn canonical_json_sorts_keys() {
        let value = serde_json::json!({"b": 1, "a": 2});
        assert_eq!(canonical_json(&value), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn nav_metadata_hash_ignores_non_nav_keys() {
        let a = serde_json::json!({"title": "Docs", "weight": 1, "summary": "x"});
        let b = serde_json::json!({"title": "Docs", "weight": 1, "summary": "different"});
        assert_eq!(nav_metadata_hash(&a), nav_metadata_hash(&b));
    }

    #[test]
    fn nav_metadata_hash_changes_with_weight() {
        let a = serde_json::json!({"title": "Docs", "weight": 1});
        let b = serde_json::json!({"title": "Docs", "weight": 2});
        assert_ne!(nav_metadata_hash(&a), nav_metadata_hash(&b));
    }

    #[test]
    fn metadata_hash_changes_with_any_key() {
        let a = serde_json::json!({"summary": "x"});
        let b = serde_json::json!({"summary": "y"});
        assert_ne!(metadata_hash(&a), metadata_hash(&b));
    }
}
