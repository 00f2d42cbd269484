//! POSIX path normalization and the `.bengal/` state directory layout.
//!
//! Cache keys, dependency-graph edges, and virtual source paths are all
//! POSIX strings regardless of host platform, so a cache built on Windows
//! is byte-identical to one built on Linux.

use std::path::{Path, PathBuf};

/// Render a path as a POSIX-style string (`/`-separated), independent of
/// the host platform's path separator.
pub fn to_posix(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Layout of the `.bengal/` state directory under the project root.
#[derive(Debug, Clone)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    pub fn new(state_dir: PathBuf) -> Self {
        Self { root: state_dir }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache_file(&self) -> PathBuf {
        self.root.join("cache.json")
    }

    pub fn cache_file_compressed(&self) -> PathBuf {
        self.root.join("cache.json.zst")
    }

    /// Legacy single-file cache path, checked when no new-format cache exists.
    pub fn legacy_cache_file(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(".bengal-cache.json")
    }

    pub fn stream_cache_file(&self) -> PathBuf {
        self.root.join("pipeline").join("streams.json")
    }

    pub fn build_log(&self) -> PathBuf {
        self.root.join("logs").join("build.log")
    }

    pub fn serve_log(&self) -> PathBuf {
        self.root.join("logs").join("serve.log")
    }

    pub fn generated_root(&self) -> PathBuf {
        self.root.join("generated")
    }

    pub fn templates_cache(&self) -> PathBuf {
        self.root.join("templates")
    }

    pub fn asset_manifest(&self) -> PathBuf {
        self.root.join("asset-manifest.json")
    }

    /// Virtual source path for an unmaterialized taxonomy term page, used
    /// as a dependency-graph key even though no file backs it on disk.
    pub fn taxonomy_virtual_source(&self, taxonomy: &str, slug: &str) -> String {
        format!("{}/generated/{}/{}/index.md", to_posix(&self.root), taxonomy, slug)
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.root.join("pipeline"))?;
        std::fs::create_dir_all(self.root.join("logs"))?;
        std::fs::create_dir_all(self.generated_root())?;
        std::fs::create_dir_all(self.templates_cache())?;
        Ok(())
    }
}

/// Write `contents` to `path` atomically: write to a sibling temp file,
/// flush, then rename into place. Avoids partial/corrupt files if the
/// process is killed mid-write.
pub fn atomic_write(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("tmp")
    ));

    {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }

    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
