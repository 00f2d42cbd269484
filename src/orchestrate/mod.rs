//! Incremental orchestrator: turns filesystem state, the build cache,
//! and any watcher-supplied "forced changed" paths into the minimal
//! correct rebuild set, by additively expanding a candidate set through
//! a fixed cascade of rules.

pub mod classifier;
pub mod site;

pub use classifier::{
    ChangeEvent, ClassifierPredicates, EventKind, RebuildDecision, RebuildReason, classify,
};
pub use site::{Asset, Page, Section};

use crate::cache::{BuildCache, CacheCoordinator, DeferredFingerprintQueue, PageInvalidationReason};
use crate::hash::FileFingerprint;
use crate::paths::StateLayout;
use std::collections::{BTreeMap, BTreeSet, HashSet};

#[derive(Debug, Clone, Default)]
pub struct ChangeSummary {
    pub modified_content: Vec<String>,
    pub modified_templates: Vec<String>,
    pub modified_assets: Vec<String>,
    pub extra_changes: BTreeMap<String, Vec<String>>,
}

impl ChangeSummary {
    fn add_extra(&mut self, category: &str, path: String) {
        self.extra_changes
            .entry(category.to_string())
            .or_default()
            .push(path);
    }
}

pub struct DetectionInput<'a> {
    pub pages: &'a BTreeMap<String, Page>,
    pub sections: &'a BTreeMap<String, Section>,
    pub assets: &'a [Asset],
    pub forced_changed: &'a HashSet<String>,
    pub nav_changed: &'a HashSet<String>,
    /// Every template path known to exist (theme + site), independent of
    /// whether it changed.
    pub template_paths: &'a [String],
    /// Every data-file path known to exist under the data directory.
    pub data_file_paths: &'a [String],
    /// Current fingerprints for pages, templates, and data files, keyed
    /// by POSIX source path.
    pub current_fingerprints: &'a BTreeMap<String, FileFingerprint>,
    /// `None` means extraction failed for that page (triggers the
    /// conservative fallback chain).
    pub nav_metadata_hash_of: &'a dyn Fn(&str) -> Option<String>,
    pub metadata_hash_of: &'a dyn Fn(&str) -> Option<String>,
    pub autodoc_current_hash: &'a dyn Fn(&str) -> Option<String>,
    /// Section path -> max mtime (ns) across its direct member pages.
    pub section_max_mtime_ns: &'a BTreeMap<String, u128>,
    pub last_build_ns: u128,
    pub shared_dirs: &'a [String],
    pub versioning_enabled: bool,
    pub state_layout: &'a StateLayout,
    pub output_sentinel_exists: bool,
}

pub struct DetectionOutput {
    pub pages_to_build: BTreeSet<String>,
    pub assets_to_process: BTreeSet<String>,
    pub summary: ChangeSummary,
    /// Set by the output-missing safety net: a true incremental decision
    /// could not be trusted because expected output artifacts are absent.
    pub forced_full_rebuild: bool,
}

const NAV_FALLBACK_EXT: &[&str] = &["_index.md", "index.md"];

pub struct IncrementalOrchestrator;

impl IncrementalOrchestrator {
    pub fn detect_changes(
        cache: &mut BuildCache,
        coordinator: &CacheCoordinator,
        deferred: &DeferredFingerprintQueue,
        input: &DetectionInput,
    ) -> DetectionOutput {
        let mut summary = ChangeSummary::default();
        let explicit_changed: HashSet<String> = input
            .forced_changed
            .iter()
            .chain(input.nav_changed.iter())
            .cloned()
            .collect();

        // Step 1: section filter.
        let mut candidates: BTreeSet<String> = BTreeSet::new();
        for (section_path, section) in input.sections {
            let max_mtime = input
                .section_max_mtime_ns
                .get(section_path)
                .copied()
                .unwrap_or(u128::MAX);
            let touches_explicit = section.pages.iter().any(|p| explicit_changed.contains(p));
            if max_mtime > input.last_build_ns || touches_explicit {
                candidates.extend(section.pages.iter().cloned());
            }
        }
        for (path, page) in input.pages {
            if page.section.is_none() {
                candidates.insert(path.clone());
            }
        }

        let mut pages_to_build: BTreeSet<String> = BTreeSet::new();

        // Step 2: per-page primary change.
        for path in &candidates {
            let current = input.current_fingerprints.get(path);
            if cache.should_bypass(path, current, &explicit_changed) {
                pages_to_build.insert(path.clone());
                summary.modified_content.push(path.clone());
                if let Some(page) = input.pages.get(path) {
                    cache.update_tags(path.clone(), page.tags.clone());
                }
            }
        }

        // Step 3: section-index nav-metadata cascade.
        let changed_section_indexes: Vec<String> = pages_to_build
            .iter()
            .filter(|p| NAV_FALLBACK_EXT.iter().any(|suffix| p.ends_with(suffix)))
            .cloned()
            .collect();
        for index_path in changed_section_indexes {
            let Some(page) = input.pages.get(&index_path) else {
                continue;
            };
            let Some(section_path) = &page.section else {
                continue;
            };
            let Some(section) = input.sections.get(section_path) else {
                continue;
            };
            let cached_nav = cache
                .parsed_content
                .get(&index_path)
                .and_then(|e| e.nav_metadata_hash.clone());
            let current_nav = (input.nav_metadata_hash_of)(&index_path);

            let should_cascade = match current_nav {
                Some(current) => cached_nav.as_deref() != Some(current.as_str()),
                None => {
                    // Nav-metadata extraction failed: fall back to the
                    // full metadata hash.
                    let cached_meta = cache
                        .parsed_content
                        .get(&index_path)
                        .and_then(|e| e.metadata_hash.clone());
                    match (input.metadata_hash_of)(&index_path) {
                        Some(current_meta) => cached_meta.as_deref() != Some(current_meta.as_str()),
                        None => true,
                    }
                }
            };

            if should_cascade {
                for descendant in section.regular_pages_recursive(input.sections, input.pages) {
                    if pages_to_build.insert(descendant.clone()) {
                        summary.add_extra("section_cascade", descendant);
                    }
                }
            }
        }

        // Step 4: root-level cascade metadata.
        let root_cascade_present = input
            .pages
            .values()
            .any(|p| p.cascade && pages_to_build.contains(&p.source_path));
        if root_cascade_present {
            for (path, page) in input.pages {
                if !page.generated && pages_to_build.insert(path.clone()) {
                    summary.add_extra("root_cascade", path.clone());
                }
            }
        }

        // Step 5: shared content cascade (versioning-gated).
        if input.versioning_enabled {
            let shared_changed = pages_to_build
                .iter()
                .any(|p| input.shared_dirs.iter().any(|dir| p.starts_with(dir.as_str())))
                || input
                    .forced_changed
                    .iter()
                    .any(|p| input.shared_dirs.iter().any(|dir| p.starts_with(dir.as_str())));
            if shared_changed {
                for (path, page) in input.pages {
                    if page.versioned && pages_to_build.insert(path.clone()) {
                        summary.add_extra("shared_content_cascade", path.clone());
                    }
                }
            }
        }

        // Step 6: adjacent navigation.
        let rebuilt_snapshot: Vec<String> = pages_to_build.iter().cloned().collect();
        for path in rebuilt_snapshot {
            let Some(page) = input.pages.get(&path) else {
                continue;
            };
            for neighbor in [&page.prev, &page.next].into_iter().flatten() {
                let is_generated = input.pages.get(neighbor).is_some_and(|p| p.generated);
                if !is_generated && pages_to_build.insert(neighbor.clone()) {
                    summary.add_extra("adjacent_navigation", neighbor.clone());
                }
            }
        }

        // Step 7: template changes.
        for template in input.template_paths {
            let current = input.current_fingerprints.get(template);
            if cache.is_changed(template, current) {
                summary.modified_templates.push(template.clone());
                for page in cache.get_affected_pages(template) {
                    if pages_to_build.insert(page.clone()) {
                        summary.add_extra("template_cascade", page);
                    }
                }
            } else if let Some(current) = current {
                deferred.queue(template.clone(), current.clone());
            }
        }

        // Step 8: data-file cascade.
        for data_file in input.data_file_paths {
            let current = input.current_fingerprints.get(data_file);
            if cache.is_changed(data_file, current) {
                let tracked = cache.dependencies.pages_using_data_file(data_file);
                let affected: Vec<String> = if tracked.is_empty() && cache.dependencies.data_deps.is_empty() {
                    input.pages.values().filter(|p| !p.generated).map(|p| p.source_path.clone()).collect()
                } else {
                    tracked
                };
                for page in affected {
                    if pages_to_build.insert(page.clone()) {
                        summary.add_extra("data_file_cascade", page.clone());
                    }
                    coordinator.invalidate_page(
                        cache,
                        &page,
                        PageInvalidationReason::DataFileChanged,
                        data_file.clone(),
                    );
                }
            }
        }

        // Step 9: taxonomy metadata cascade.
        let tagged_rebuilds: Vec<String> = pages_to_build
            .iter()
            .filter(|p| input.pages.get(p.as_str()).is_some_and(|page| !page.tags.is_empty()))
            .cloned()
            .collect();
        for path in tagged_rebuilds {
            let Some(page) = input.pages.get(&path) else {
                continue;
            };
            for tag in &page.tags {
                let term_key = format!("tags:{tag}");
                let members = cache.dependencies.taxonomy_term_members(&term_key);
                if members.is_empty() {
                    let virtual_source = input.state_layout.taxonomy_virtual_source("tags", tag);
                    summary.add_extra("taxonomy_cascade", virtual_source);
                } else {
                    for member in members {
                        if pages_to_build.insert(member.clone()) {
                            summary.add_extra("taxonomy_cascade", member);
                        }
                    }
                }
            }
        }

        // Step 10: autodoc.
        let tracked_sources = cache.get_autodoc_source_files();
        if tracked_sources.is_empty() {
            for pages in cache.autodoc_deps.values() {
                for page in pages {
                    if pages_to_build.insert(page.clone()) {
                        summary.add_extra("autodoc", page.clone());
                    }
                }
            }
        } else {
            let mtime_stale: Vec<String> = tracked_sources
                .iter()
                .filter(|source| {
                    let current = input.current_fingerprints.get(source.as_str());
                    cache.is_changed(source, current)
                })
                .cloned()
                .collect();
            let hash_stale = cache.get_stale_autodoc_sources(input.autodoc_current_hash);
            let mut stale_sources: BTreeSet<String> = mtime_stale.into_iter().collect();
            stale_sources.extend(hash_stale);
            for source in stale_sources {
                for page in cache.get_affected_autodoc_pages(&source) {
                    if pages_to_build.insert(page.clone()) {
                        summary.add_extra("autodoc", page);
                    }
                }
            }
        }

        // Step 11: assets.
        let mut assets_to_process: BTreeSet<String> = BTreeSet::new();
        for asset in input.assets {
            let current = input.current_fingerprints.get(&asset.source_path);
            if cache.should_bypass(&asset.source_path, current, &explicit_changed) {
                assets_to_process.insert(asset.source_path.clone());
                summary.modified_assets.push(asset.source_path.clone());
            }
        }

        // Output-missing safety net.
        let forced_full_rebuild = !input.output_sentinel_exists;
        if forced_full_rebuild {
            for (path, page) in input.pages {
                if !page.generated {
                    pages_to_build.insert(path.clone());
                }
            }
            for asset in input.assets {
                assets_to_process.insert(asset.source_path.clone());
            }
        }

        DetectionOutput {
            pages_to_build,
            assets_to_process,
            summary,
            forced_full_rebuild,
        }
    }

    /// Remove cache entries (and, best-effort, empty parent directories
    /// of the corresponding output) whose source no longer exists on disk.
    pub fn cleanup_deleted_files(
        cache: &mut BuildCache,
        existing_sources: &HashSet<String>,
        mut remove_output: impl FnMut(&str),
    ) {
        let stale_outputs: Vec<String> = cache
            .output_sources
            .iter()
            .filter(|(_, source)| !existing_sources.contains(source.as_str()))
            .map(|(output, _)| output.clone())
            .collect();
        for output in stale_outputs {
            if let Some(source) = cache.output_sources.remove(&output) {
                cache.fingerprints.remove(&source);
                cache.parsed_content.remove(&source);
                cache.rendered_output.remove(&source);
                cache.search_index.remove(&source);
                remove_output(&output);
            }
        }
    }

    pub fn cleanup_deleted_autodoc_sources(cache: &mut BuildCache, existing_sources: &HashSet<String>) {
        let stale: Vec<String> = cache
            .autodoc_deps
            .keys()
            .filter(|source| !existing_sources.contains(source.as_str()))
            .cloned()
            .collect();
        for source in stale {
            cache.autodoc_deps.remove(&source);
            cache.fingerprints.remove(&source);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ParsedContentEntry;

    fn fp(mtime: u128, hash: &str) -> FileFingerprint {
        FileFingerprint {
            mtime_ns: mtime,
            size: 10,
            hash: Some(hash.to_string()),
        }
    }

    fn layout() -> StateLayout {
        StateLayout::new(std::path::PathBuf::from(".bengal"))
    }

    fn base_input<'a>(
        pages: &'a BTreeMap<String, Page>,
        sections: &'a BTreeMap<String, Section>,
        assets: &'a [Asset],
        forced_changed: &'a HashSet<String>,
        nav_changed: &'a HashSet<String>,
        current_fingerprints: &'a BTreeMap<String, FileFingerprint>,
        section_max_mtime_ns: &'a BTreeMap<String, u128>,
        state_layout: &'a StateLayout,
    ) -> DetectionInput<'a> {
        DetectionInput {
            pages,
            sections,
            assets,
            forced_changed,
            nav_changed,
            template_paths: &[],
            data_file_paths: &[],
            current_fingerprints,
            nav_metadata_hash_of: &|_| None,
            metadata_hash_of: &|_| None,
            autodoc_current_hash: &|_| None,
            section_max_mtime_ns,
            last_build_ns: 0,
            shared_dirs: &[],
            versioning_enabled: false,
            state_layout,
            output_sentinel_exists: true,
        }
    }

    #[test]
    fn unchanged_page_in_stale_section_is_not_rebuilt() {
        let mut pages = BTreeMap::new();
        pages.insert("content/blog/a.md".to_string(), {
            let mut p = Page::new("content/blog/a.md");
            p.section = Some("content/blog".to_string());
            p
        });
        let mut sections = BTreeMap::new();
        sections.insert(
            "content/blog".to_string(),
            Section {
                path: "content/blog".to_string(),
                pages: vec!["content/blog/a.md".to_string()],
                subsections: vec![],
                index_page: None,
            },
        );
        let assets = [];
        let forced = HashSet::new();
        let nav = HashSet::new();
        let mut fingerprints = BTreeMap::new();
        fingerprints.insert("content/blog/a.md".to_string(), fp(1, "h"));
        let mut section_mtimes = BTreeMap::new();
        section_mtimes.insert("content/blog".to_string(), 0);
        let layout = layout();

        let mut cache = BuildCache::new();
        cache.update_file("content/blog/a.md", fp(1, "h"));

        let coordinator = CacheCoordinator::new();
        let deferred = DeferredFingerprintQueue::new();
        let input = base_input(
            &pages,
            &sections,
            &assets,
            &forced,
            &nav,
            &fingerprints,
            &section_mtimes,
            &layout,
        );
        let output = IncrementalOrchestrator::detect_changes(&mut cache, &coordinator, &deferred, &input);
        assert!(output.pages_to_build.is_empty());
    }

    #[test]
    fn changed_page_rebuilds_and_cascades_to_adjacent_navigation() {
        let mut pages = BTreeMap::new();
        pages.insert("content/blog/b.md".to_string(), {
            let mut p = Page::new("content/blog/b.md");
            p.section = Some("content/blog".to_string());
            p.prev = Some("content/blog/a.md".to_string());
            p
        });
        pages.insert("content/blog/a.md".to_string(), {
            let mut p = Page::new("content/blog/a.md");
            p.section = Some("content/blog".to_string());
            p.next = Some("content/blog/b.md".to_string());
            p
        });
        let mut sections = BTreeMap::new();
        sections.insert(
            "content/blog".to_string(),
            Section {
                path: "content/blog".to_string(),
                pages: vec!["content/blog/a.md".to_string(), "content/blog/b.md".to_string()],
                subsections: vec![],
                index_page: None,
            },
        );
        let assets = [];
        let forced = HashSet::new();
        let nav = HashSet::new();
        let mut fingerprints = BTreeMap::new();
        fingerprints.insert("content/blog/b.md".to_string(), fp(5, "new"));
        let mut section_mtimes = BTreeMap::new();
        section_mtimes.insert("content/blog".to_string(), 5);
        let layout = layout();

        let mut cache = BuildCache::new();
        cache.update_file("content/blog/b.md", fp(1, "old"));

        let coordinator = CacheCoordinator::new();
        let deferred = DeferredFingerprintQueue::new();
        let input = base_input(
            &pages,
            &sections,
            &assets,
            &forced,
            &nav,
            &fingerprints,
            &section_mtimes,
            &layout,
        );
        let output = IncrementalOrchestrator::detect_changes(&mut cache, &coordinator, &deferred, &input);
        assert!(output.pages_to_build.contains("content/blog/b.md"));
        assert!(output.pages_to_build.contains("content/blog/a.md"));
    }

    #[test]
    fn nav_metadata_unchanged_skips_section_wide_cascade() {
        let mut pages = BTreeMap::new();
        pages.insert("content/blog/_index.md".to_string(), {
            let mut p = Page::new("content/blog/_index.md");
            p.section = Some("content/blog".to_string());
            p
        });
        pages.insert("content/blog/a.md".to_string(), {
            let mut p = Page::new("content/blog/a.md");
            p.section = Some("content/blog".to_string());
            p
        });
        let mut sections = BTreeMap::new();
        sections.insert(
            "content/blog".to_string(),
            Section {
                path: "content/blog".to_string(),
                pages: vec![
                    "content/blog/_index.md".to_string(),
                    "content/blog/a.md".to_string(),
                ],
                subsections: vec![],
                index_page: Some("content/blog/_index.md".to_string()),
            },
        );
        let assets = [];
        let forced = HashSet::new();
        let nav = HashSet::new();
        let mut fingerprints = BTreeMap::new();
        fingerprints.insert("content/blog/_index.md".to_string(), fp(5, "new"));
        fingerprints.insert("content/blog/a.md".to_string(), fp(1, "unchanged"));
        let mut section_mtimes = BTreeMap::new();
        section_mtimes.insert("content/blog".to_string(), 5);
        let layout = layout();

        let mut cache = BuildCache::new();
        cache.update_file("content/blog/_index.md", fp(1, "old"));
        cache.update_file("content/blog/a.md", fp(1, "unchanged"));
        cache.parsed_content.insert(
            "content/blog/_index.md".to_string(),
            ParsedContentEntry {
                source_hash: "old".into(),
                template_identity: "section.html".into(),
                parser_version: "1".into(),
                metadata_hash: None,
                nav_metadata_hash: Some("same-nav".into()),
            },
        );

        let coordinator = CacheCoordinator::new();
        let deferred = DeferredFingerprintQueue::new();
        let input = DetectionInput {
            nav_metadata_hash_of: &|_| Some("same-nav".to_string()),
            ..base_input(
                &pages,
                &sections,
                &assets,
                &forced,
                &nav,
                &fingerprints,
                &section_mtimes,
                &layout,
            )
        };
        let output = IncrementalOrchestrator::detect_changes(&mut cache, &coordinator, &deferred, &input);
        assert!(output.pages_to_build.contains("content/blog/_index.md"));
        assert!(!output.pages_to_build.contains("content/blog/a.md"));
    }

    #[test]
    fn template_change_cascades_to_dependent_pages_and_refingerprints_unchanged() {
        let pages = BTreeMap::new();
        let sections = BTreeMap::new();
        let assets = [];
        let forced = HashSet::new();
        let nav = HashSet::new();
        let mut fingerprints = BTreeMap::new();
        fingerprints.insert("templates/post.html".to_string(), fp(9, "new"));
        fingerprints.insert("templates/page.html".to_string(), fp(1, "same"));
        let section_mtimes = BTreeMap::new();
        let layout = layout();

        let mut cache = BuildCache::new();
        cache.update_file("templates/post.html", fp(1, "old"));
        cache.update_file("templates/page.html", fp(1, "same"));
        cache
            .dependencies
            .record_template("content/a.md", "templates/post.html");

        let coordinator = CacheCoordinator::new();
        let deferred = DeferredFingerprintQueue::new();
        let input = DetectionInput {
            template_paths: &["templates/post.html".to_string(), "templates/page.html".to_string()],
            ..base_input(
                &pages,
                &sections,
                &assets,
                &forced,
                &nav,
                &fingerprints,
                &section_mtimes,
                &layout,
            )
        };
        let output = IncrementalOrchestrator::detect_changes(&mut cache, &coordinator, &deferred, &input);
        assert!(output.pages_to_build.contains("content/a.md"));
        assert_eq!(output.summary.modified_templates, vec!["templates/post.html".to_string()]);
        assert_eq!(deferred.len(), 1);
    }

    #[test]
    fn output_missing_safety_net_forces_full_rebuild() {
        let mut pages = BTreeMap::new();
        pages.insert("content/a.md".to_string(), Page::new("content/a.md"));
        let sections = BTreeMap::new();
        let assets = [];
        let forced = HashSet::new();
        let nav = HashSet::new();
        let fingerprints = BTreeMap::new();
        let section_mtimes = BTreeMap::new();
        let layout = layout();
        let mut cache = BuildCache::new();
        let coordinator = CacheCoordinator::new();
        let deferred = DeferredFingerprintQueue::new();
        let input = DetectionInput {
            output_sentinel_exists: false,
            ..base_input(
                &pages,
                &sections,
                &assets,
                &forced,
                &nav,
                &fingerprints,
                &section_mtimes,
                &layout,
            )
        };
        let output = IncrementalOrchestrator::detect_changes(&mut cache, &coordinator, &deferred, &input);
        assert!(output.forced_full_rebuild);
        assert!(output.pages_to_build.contains("content/a.md"));
    }

    #[test]
    fn cleanup_deleted_files_drops_cache_entries_and_removes_output() {
        let mut cache = BuildCache::new();
        cache.output_sources.insert("public/a/index.html".into(), "content/a.md".into());
        cache.update_file("content/a.md", fp(1, "h"));

        let mut existing = HashSet::new();
        existing.insert("content/b.md".to_string());

        let mut removed = Vec::new();
        IncrementalOrchestrator::cleanup_deleted_files(&mut cache, &existing, |output| {
            removed.push(output.to_string());
        });

        assert_eq!(removed, vec!["public/a/index.html".to_string()]);
        assert!(!cache.fingerprints.contains_key("content/a.md"));
        assert!(cache.output_sources.is_empty());
    }
}
