//! `build` subcommand: orchestrates discovery, change detection, the
//! render pipeline, and postprocess into one pass over the site.

use super::args::BuildArgs;
use super::common;
use crate::build::{
    BuildOptions, PassthroughParser, PassthroughTemplateEngine, RenderedPage, output_path_for_url, run_pipeline,
};
use crate::cache::{BuildCache, CacheCoordinator, DeferredFingerprintQueue};
use crate::config::SiteConfig;
use crate::hash::{FileFingerprint, config_hash};
use crate::orchestrate::{DetectionInput, IncrementalOrchestrator};
use crate::paths::StateLayout;
use crate::pipeline::StreamCache;
use crate::{debug, log, postprocess};
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;

pub struct BuildReport {
    pub pages_built: usize,
    pub forced_full_rebuild: bool,
    pub warnings: Vec<String>,
}

/// Runs one build pass: loads the cache, decides the rebuild set (unless
/// `--force` requests a full rebuild), renders, writes output, runs
/// postprocess, and persists the cache. Never returns `Err` for a
/// render/postprocess failure — those are folded into `warnings` per the
/// "completed with errors" policy; only setup failures (unreadable config,
/// unwritable output root) surface as `Err`.
pub fn run(config: &SiteConfig, args: &BuildArgs) -> Result<BuildReport> {
    crate::logger::set_verbose(args.verbose);

    let layout = StateLayout::new(config.state_dir());
    layout.ensure_dirs()?;

    let mut cache = BuildCache::load_or_migrate_legacy(&layout.cache_file(), &layout.legacy_cache_file(&config.output_dir()));
    let hash = config_hash(config);
    let force_full = args.force || !cache.validate_config(&hash);
    if force_full && cache.validate_config(&hash) == false && !cache.fingerprints.is_empty() {
        log!("build"; "configuration changed, forcing full rebuild");
    }
    cache.config_hash = hash;

    let content_dir = config.content_dir();
    let files = common::discover_content_files(&content_dir);
    let (pages, sections) = common::build_site_model(&files);
    let templates = common::discover_template_paths(&config.root);
    let assets = common::discover_asset_paths(&config.root);
    let data_files = common::discover_data_file_paths(&content_dir);

    // Fast path first (§4.3): only fall back to a full content hash when
    // `(mtime,size)` doesn't match what's stored, so an untouched file
    // never gets rehashed.
    let mut current_fingerprints: BTreeMap<String, FileFingerprint> = BTreeMap::new();
    for path in files
        .iter()
        .map(|f| f.source_path.clone())
        .chain(templates.iter().cloned())
        .chain(data_files.iter().cloned())
        .chain(assets.iter().map(|a| a.source_path.clone()))
    {
        let fast = FileFingerprint::from_metadata(Path::new(&path)).ok();
        let fast_hit = fast
            .as_ref()
            .is_some_and(|f| cache.fingerprints.get(&path).is_some_and(|stored| f.fast_matches(stored)));
        let fp = if fast_hit {
            fast
        } else {
            FileFingerprint::from_file(Path::new(&path)).ok()
        };
        if let Some(fp) = fp {
            current_fingerprints.insert(path, fp);
        }
    }

    let mut section_max_mtime_ns: BTreeMap<String, u128> = BTreeMap::new();
    for (section_path, section) in &sections {
        let max = section
            .pages
            .iter()
            .filter_map(|p| current_fingerprints.get(p))
            .map(|fp| fp.mtime_ns)
            .max()
            .unwrap_or(0);
        section_max_mtime_ns.insert(section_path.clone(), max);
    }

    let output_sentinel = config.output_dir().join("index.html");
    let coordinator = CacheCoordinator::new();
    let deferred = DeferredFingerprintQueue::new();
    let forced_changed: HashSet<String> = args.forced_paths.iter().cloned().collect();
    let nav_changed = HashSet::new();
    let template_set: HashSet<&str> = templates.iter().map(String::as_str).collect();
    let asset_set: HashSet<&str> = assets.iter().map(|a| a.source_path.as_str()).collect();
    let nav_metadata_hash_of = |path: &str| pages.get(path).and_then(|p| p.nav_metadata_hash.clone());
    let metadata_hash_of = |path: &str| pages.get(path).and_then(|p| p.metadata_hash.clone());

    let files_to_build: Vec<_> = if force_full {
        files.clone()
    } else {
        let input = DetectionInput {
            pages: &pages,
            sections: &sections,
            assets: &assets,
            forced_changed: &forced_changed,
            nav_changed: &nav_changed,
            template_paths: &templates,
            data_file_paths: &data_files,
            current_fingerprints: &current_fingerprints,
            nav_metadata_hash_of: &nav_metadata_hash_of,
            metadata_hash_of: &metadata_hash_of,
            autodoc_current_hash: &|_| None,
            section_max_mtime_ns: &section_max_mtime_ns,
            last_build_ns: 0,
            shared_dirs: &config.build.shared_dirs,
            versioning_enabled: config.versioning.enabled,
            state_layout: &layout,
            output_sentinel_exists: output_sentinel.exists(),
        };
        let output = IncrementalOrchestrator::detect_changes(&mut cache, &coordinator, &deferred, &input);
        for reason in &output.summary.modified_templates {
            log!("build"; "template changed: {reason}");
        }
        let wanted: BTreeSet<&String> = output.pages_to_build.iter().collect();
        files.iter().filter(|f| wanted.contains(&f.source_path)).cloned().collect()
    };

    let is_full = force_full || files_to_build.len() == files.len();
    log!("build"; "rendering {} of {} page(s){}", files_to_build.len(), files.len(), if is_full { " (full)" } else { "" });

    let mut tags: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (path, page) in &pages {
        if !page.tags.is_empty() {
            tags.insert(path.clone(), page.tags.clone());
        }
    }

    let options = BuildOptions {
        parallel: args.parallel || (!args.sequential && config.build.parallel),
        workers: args.workers.unwrap_or(config.build.workers),
        worker_threshold: config.build.worker_threshold,
        asset_manifest_mtime: 0,
    };

    let stream_cache = Arc::new(StreamCache::new(layout.stream_cache_file()));
    let (rendered, _structure) = run_pipeline(
        files_to_build,
        tags,
        Arc::new(PassthroughParser),
        Arc::new(PassthroughTemplateEngine),
        &mut cache,
        Arc::clone(&stream_cache),
        &options,
    );

    let mut warnings = Vec::new();
    for page in &rendered {
        let rel = output_path_for_url(&page.url);
        if let Err(e) = crate::build::write::write_output(&config.output_dir(), &rel, page.html.as_bytes()) {
            warnings.push(format!("write failed for {}: {e}", page.source_path));
            continue;
        }
        cache
            .output_sources
            .insert(rel, page.source_path.clone());
    }

    for page in &rendered {
        cache
            .search_index
            .insert(page.source_path.clone(), postprocess::SearchIndexEntry::from(page));
    }
    let full_search_index: Vec<postprocess::SearchIndexEntry> = files
        .iter()
        .filter_map(|f| cache.search_index.get(&f.source_path))
        .cloned()
        .collect();

    run_postprocess(config, &rendered, &full_search_index, is_full, &mut warnings);

    for (path, fp) in current_fingerprints {
        let in_scope = template_set.contains(path.as_str())
            || files.iter().any(|f| f.source_path == path)
            || data_files.contains(&path)
            || asset_set.contains(path.as_str());
        if !in_scope {
            continue;
        }
        // A fast-path hit carries no hash; `detect_changes` already
        // refreshed (or left alone) the stored entry for it via
        // `BuildCache::is_changed`, so don't clobber a hash-bearing entry
        // with this hash-less one.
        if fp.hash.is_none() && cache.fingerprints.contains_key(&path) {
            continue;
        }
        cache.update_file(path, fp);
    }
    let existing_sources: HashSet<String> = files.iter().map(|f| f.source_path.clone()).collect();
    IncrementalOrchestrator::cleanup_deleted_files(&mut cache, &existing_sources, |output| {
        let _ = std::fs::remove_file(config.output_dir().join(output.trim_start_matches('/')));
    });

    cache.save(&layout.cache_file(), config.build.cache_compression)?;
    if let Err(e) = stream_cache.save() {
        warnings.push(format!("stream cache save failed: {e}"));
    }

    debug!("build"; "{} warning(s)", warnings.len());
    Ok(BuildReport {
        pages_built: rendered.len(),
        forced_full_rebuild: force_full,
        warnings,
    })
}

fn run_postprocess(
    config: &SiteConfig,
    rendered: &[RenderedPage],
    full_search_index: &[postprocess::SearchIndexEntry],
    is_full: bool,
    warnings: &mut Vec<String>,
) {
    let search_index = postprocess::build_search_index(full_search_index);
    if let Err(e) = crate::build::write::write_output(&config.output_dir(), "search-index.json", search_index.as_bytes()) {
        warnings.push(format!("search index write failed: {e}"));
    }

    if let Some(page) = postprocess::special_pages(rendered) {
        let mirror = postprocess::plain_text_mirror(&page.html);
        let rel = format!("{}.txt", output_path_for_url(&page.url).trim_end_matches(".html"));
        let _ = crate::build::write::write_output(&config.output_dir(), &rel, mirror.as_bytes());
    }

    if !is_full {
        return;
    }

    if config.sitemap.enabled {
        let options = postprocess::SitemapOptions {
            base_url: config.site.base_url.clone(),
            i18n_enabled: config.i18n.enabled,
            default_language: config.i18n.default_language.clone(),
        };
        if let Some(xml) = postprocess::build_sitemap(rendered, &options) {
            if let Err(e) = crate::build::write::write_output(&config.output_dir(), "sitemap.xml", xml.as_bytes()) {
                warnings.push(format!("sitemap write failed: {e}"));
            }
        }
    }

    if config.feed.enabled {
        let options = postprocess::FeedOptions {
            title: config.site.title.clone(),
            base_url: config.site.base_url.clone(),
            description: config.site.description.clone(),
        };
        if let Some(xml) = postprocess::build_feed(rendered, &options) {
            if let Err(e) = crate::build::write::write_output(&config.output_dir(), "rss.xml", xml.as_bytes()) {
                warnings.push(format!("feed write failed: {e}"));
            }
        }
    }
}
