//! Global config with atomic reload support.
//!
//! Uses `arc-swap` for lock-free reads and atomic config replacement,
//! so a watch-mode reload never blocks a build already in flight.

use super::SiteConfig;
use anyhow::Result;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::{Arc, LazyLock};

static CONFIG: LazyLock<ArcSwap<SiteConfig>> =
    LazyLock::new(|| ArcSwap::from_pointee(SiteConfig::default()));

static CONFIG_HASH: Mutex<String> = Mutex::new(String::new());

#[inline]
pub fn cfg() -> Arc<SiteConfig> {
    CONFIG.load_full()
}

#[inline]
pub fn init_config(config: SiteConfig) -> Arc<SiteConfig> {
    *CONFIG_HASH.lock() = crate::hash::config_hash(&config);
    let arc = Arc::new(config);
    CONFIG.store(Arc::clone(&arc));
    arc
}

/// Reload config from disk if the file on disk changed since the last load.
///
/// Returns `Ok(true)` if config was updated, `Ok(false)` if unchanged.
pub fn reload_config() -> Result<bool> {
    let current = cfg();
    let new_config = SiteConfig::load(&current.root, &current.config_path)?;

    let new_hash = crate::hash::config_hash(&new_config);
    if *CONFIG_HASH.lock() == new_hash {
        return Ok(false);
    }

    *CONFIG_HASH.lock() = new_hash;
    CONFIG.store(Arc::new(new_config));
    Ok(true)
}
