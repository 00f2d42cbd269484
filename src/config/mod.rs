//! Site configuration management for `bengal.toml`.
//!
//! # Module structure
//!
//! ```text
//! config/
//! ├── handle     # global ArcSwap-backed config handle (hot reload)
//! ├── types      # ConfigError, ConfigDiagnostics, FieldPath
//! └── mod.rs     # SiteConfig (this file)
//! ```

mod handle;
mod types;

pub use handle::{cfg, init_config, reload_config};
pub use types::{ConfigDiagnostic, ConfigDiagnostics, ConfigError, FieldPath};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

fn default_content_dir() -> String {
    "content".to_string()
}
fn default_output_dir() -> String {
    "public".to_string()
}
fn default_state_dir() -> String {
    ".bengal".to_string()
}
fn default_workers() -> usize {
    4
}
fn default_worker_threshold() -> usize {
    5
}
fn default_max_depth() -> usize {
    10
}
fn default_env_prefix() -> String {
    "BENGAL_".to_string()
}
fn default_changefreq() -> String {
    "weekly".to_string()
}
fn default_priority() -> f64 {
    0.5
}

/// `[build]` — paths, parallelism, and incremental behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BuildSectionConfig {
    #[serde(default = "default_content_dir")]
    pub content_dir: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
    pub parallel: bool,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_worker_threshold")]
    pub worker_threshold: usize,
    pub incremental: bool,
    pub clean: bool,
    /// Directories whose content is shared across all versions of a
    /// versioned site (not duplicated per-version).
    pub shared_dirs: Vec<String>,
    #[serde(default = "default_max_depth")]
    pub max_schema_depth: usize,
    pub cache_compression: bool,
}

impl Default for BuildSectionConfig {
    fn default() -> Self {
        Self {
            content_dir: default_content_dir(),
            output_dir: default_output_dir(),
            state_dir: default_state_dir(),
            parallel: true,
            workers: default_workers(),
            worker_threshold: default_worker_threshold(),
            incremental: true,
            clean: false,
            shared_dirs: Vec::new(),
            max_schema_depth: default_max_depth(),
            cache_compression: false,
        }
    }
}

/// `[versioning]` — aliasing and gating for multi-version sites.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct VersionConfig {
    pub enabled: bool,
    /// Alias name -> concrete version it currently resolves to (e.g. "latest" -> "2.3").
    pub aliases: BTreeMap<String, String>,
}

/// `[i18n]` — translation-key grouping strategy for `hreflang` sitemap alternates.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct I18nConfig {
    pub enabled: bool,
    pub default_language: String,
    pub languages: Vec<String>,
}

/// `[site]` — site-wide metadata consumed by postprocess (feed, sitemap).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SiteSectionConfig {
    pub title: String,
    pub description: String,
    pub author: String,
    /// Absolute base URL, no trailing slash (e.g. `https://example.com`).
    pub base_url: String,
}

impl Default for SiteSectionConfig {
    fn default() -> Self {
        Self {
            title: "My Site".to_string(),
            description: String::new(),
            author: String::new(),
            base_url: String::new(),
        }
    }
}

/// `[sitemap]` — postprocess output toggle and defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SitemapConfig {
    pub enabled: bool,
    #[serde(default = "default_changefreq")]
    pub default_changefreq: String,
    #[serde(default = "default_priority")]
    pub default_priority: f64,
}

impl Default for SitemapConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_changefreq: default_changefreq(),
            default_priority: default_priority(),
        }
    }
}

/// `[feed]` — RSS feed output toggle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeedConfig {
    pub enabled: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// `[assets]` — asset-manifest emission toggle.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AssetsConfig {
    pub manifest_enabled: bool,
}

/// Root configuration structure, loaded from `bengal.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    #[serde(skip)]
    pub config_path: PathBuf,
    #[serde(skip)]
    pub root: PathBuf,

    pub site: SiteSectionConfig,
    pub build: BuildSectionConfig,
    pub versioning: VersionConfig,
    pub i18n: I18nConfig,
    pub sitemap: SitemapConfig,
    pub feed: FeedConfig,
    pub assets: AssetsConfig,

    /// Prefix for environment-variable overlay (default `BENGAL_`).
    #[serde(default = "default_env_prefix")]
    pub env_prefix: String,

    /// `[[collections]]` — declared content collections (§4.2); optional,
    /// a bare content directory with no declarations is a valid site.
    #[serde(default)]
    pub collections: Vec<crate::collections::CollectionDecl>,

    /// Arbitrary extra keys (theme config, user data) passed through untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            root: PathBuf::new(),
            site: SiteSectionConfig::default(),
            build: BuildSectionConfig::default(),
            versioning: VersionConfig::default(),
            i18n: I18nConfig::default(),
            sitemap: SitemapConfig::default(),
            feed: FeedConfig::default(),
            assets: AssetsConfig::default(),
            env_prefix: default_env_prefix(),
            collections: Vec::new(),
            extra: BTreeMap::new(),
        }
    }
}

impl SiteConfig {
    /// Load from `config_path`, overlay matching environment variables,
    /// and validate. Falls back to defaults if no config file exists (a
    /// bare content directory is a valid site).
    pub fn load(root: &Path, config_path: &Path) -> Result<Self> {
        let root = crate::utils::path::normalize_path(root);

        let mut config: Self = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::Io(config_path.to_path_buf(), e))?;
            toml::from_str(&content).map_err(ConfigError::from)?
        } else {
            Self::default()
        };

        config.config_path = config_path.to_path_buf();
        config.root = root;

        config.apply_env_overlay();

        let mut diag = ConfigDiagnostics::new();
        config.validate(&mut diag);
        diag.print_warnings();
        diag.into_result()
            .map_err(ConfigError::Diagnostics)
            .context("invalid configuration")?;

        Ok(config)
    }

    /// Overlay `<env_prefix><SECTION>_<FIELD>` environment variables onto
    /// the loaded config before validation, so an env change is captured
    /// by the config hash like any other config change.
    fn apply_env_overlay(&mut self) {
        let prefix = self.env_prefix.clone();
        for (key, value) in std::env::vars() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            let path = rest.to_ascii_lowercase();
            match path.as_str() {
                "build_workers" => {
                    if let Ok(n) = value.parse() {
                        self.build.workers = n;
                    }
                }
                "build_parallel" => self.build.parallel = parse_bool(&value, self.build.parallel),
                "build_incremental" => {
                    self.build.incremental = parse_bool(&value, self.build.incremental);
                }
                "build_content_dir" => self.build.content_dir = value,
                "build_output_dir" => self.build.output_dir = value,
                "site_base_url" => self.site.base_url = value,
                "site_title" => self.site.title = value,
                _ => {}
            }
        }
    }

    fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.build.workers == 0 {
            diag.error(FieldPath::new("build.workers"), "must be at least 1");
        }
        if self.build.max_schema_depth == 0 {
            diag.error(
                FieldPath::new("build.max_schema_depth"),
                "must be at least 1",
            );
        }
        if self.i18n.enabled && self.i18n.languages.is_empty() {
            diag.error_with_hint(
                FieldPath::new("i18n.languages"),
                "i18n is enabled but no languages are configured",
                "add at least one language code",
            );
        }
        if self.versioning.enabled
            && self
                .versioning
                .aliases
                .values()
                .any(|v| v.trim().is_empty())
        {
            diag.error(
                FieldPath::new("versioning.aliases"),
                "alias targets must not be empty",
            );
        }
    }

    pub fn content_dir(&self) -> PathBuf {
        self.root.join(&self.build.content_dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.build.output_dir)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(&self.build.state_dir)
    }

    pub fn should_parallelize(&self, page_count: usize) -> bool {
        self.build.parallel && page_count >= self.build.worker_threshold
    }
}

fn parse_bool(value: &str, fallback: bool) -> bool {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => true,
        "false" | "no" | "0" | "off" => false,
        _ => fallback,
    }
}
