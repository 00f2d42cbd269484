//! Single entry point for page cache invalidation. Clears cache layers
//! in a fixed order and records an event for every invalidation, so the
//! reason a page was rebuilt is always recoverable after the fact.

use super::BuildCache;
use parking_lot::Mutex;
use std::collections::BTreeMap;

const MAX_EVENTS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PageInvalidationReason {
    ContentChanged,
    DataFileChanged,
    TemplateChanged,
    TaxonomyCascade,
    AssetChanged,
    ConfigChanged,
    Manual,
    FullBuild,
    OutputMissing,
}

impl PageInvalidationReason {
    pub const fn label(self) -> &'static str {
        match self {
            Self::ContentChanged => "content_changed",
            Self::DataFileChanged => "data_file_changed",
            Self::TemplateChanged => "template_changed",
            Self::TaxonomyCascade => "taxonomy_cascade",
            Self::AssetChanged => "asset_changed",
            Self::ConfigChanged => "config_changed",
            Self::Manual => "manual",
            Self::FullBuild => "full_build",
            Self::OutputMissing => "output_missing",
        }
    }
}

#[derive(Debug, Clone)]
pub struct InvalidationEvent {
    pub page_path: String,
    pub reason: PageInvalidationReason,
    pub trigger: String,
    pub caches_cleared: Vec<&'static str>,
}

/// Coordinates invalidation across the cache's three page-scoped layers:
/// rendered output, parsed content, and the source fingerprint.
pub struct CacheCoordinator {
    events: Mutex<Vec<InvalidationEvent>>,
}

impl Default for CacheCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheCoordinator {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    /// Clear `page_path`'s cached layers in the order rendered_output ->
    /// parsed_content -> fingerprint, and record the event. The fingerprint
    /// is cleared last so a crash mid-invalidation still sees the page as
    /// stale (missing fingerprint forces the slow path) rather than fresh.
    pub fn invalidate_page(
        &self,
        cache: &mut BuildCache,
        page_path: &str,
        reason: PageInvalidationReason,
        trigger: impl Into<String>,
    ) -> InvalidationEvent {
        let mut cleared = Vec::new();
        if cache.rendered_output.remove(page_path).is_some() {
            cleared.push("rendered_output");
        }
        if cache.parsed_content.remove(page_path).is_some() {
            cleared.push("parsed_content");
        }
        if cache.fingerprints.remove(page_path).is_some() {
            cleared.push("fingerprint");
        }

        let event = InvalidationEvent {
            page_path: page_path.to_string(),
            reason,
            trigger: trigger.into(),
            caches_cleared: cleared,
        };
        self.push_event(event.clone());
        event
    }

    pub fn invalidate_for_data_file(
        &self,
        cache: &mut BuildCache,
        data_file: &str,
    ) -> Vec<InvalidationEvent> {
        let pages = cache.dependencies.pages_using_data_file(data_file);
        pages
            .into_iter()
            .map(|page| {
                self.invalidate_page(
                    cache,
                    &page,
                    PageInvalidationReason::DataFileChanged,
                    data_file.to_string(),
                )
            })
            .collect()
    }

    pub fn invalidate_for_template(
        &self,
        cache: &mut BuildCache,
        template: &str,
    ) -> Vec<InvalidationEvent> {
        let pages = cache.dependencies.pages_using_template(template);
        pages
            .into_iter()
            .map(|page| {
                self.invalidate_page(
                    cache,
                    &page,
                    PageInvalidationReason::TemplateChanged,
                    template.to_string(),
                )
            })
            .collect()
    }

    pub fn invalidate_taxonomy_cascade(
        &self,
        cache: &mut BuildCache,
        member_page: &str,
        term_key: &str,
    ) -> Vec<InvalidationEvent> {
        let mut events = vec![self.invalidate_page(
            cache,
            member_page,
            PageInvalidationReason::TaxonomyCascade,
            term_key.to_string(),
        )];
        let term_pages = cache.dependencies.taxonomy_term_members(term_key);
        for page in term_pages {
            events.push(self.invalidate_page(
                cache,
                &page,
                PageInvalidationReason::TaxonomyCascade,
                term_key.to_string(),
            ));
        }
        events
    }

    pub fn invalidate_all(&self, cache: &mut BuildCache, pages: &[String]) -> Vec<InvalidationEvent> {
        pages
            .iter()
            .map(|page| {
                self.invalidate_page(
                    cache,
                    page,
                    PageInvalidationReason::FullBuild,
                    "full build".to_string(),
                )
            })
            .collect()
    }

    fn push_event(&self, event: InvalidationEvent) {
        if event.caches_cleared.is_empty() {
            return;
        }
        let mut events = self.events.lock();
        events.push(event);
        if events.len() > MAX_EVENTS {
            let overflow = events.len() - MAX_EVENTS;
            events.drain(0..overflow);
        }
    }

    pub fn events(&self) -> Vec<InvalidationEvent> {
        self.events.lock().clone()
    }

    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    pub fn get_invalidation_summary(&self) -> BTreeMap<&'static str, Vec<String>> {
        let mut summary: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
        for event in self.events.lock().iter() {
            summary
                .entry(event.reason.label())
                .or_default()
                .push(event.page_path.clone());
        }
        summary
    }

    pub fn get_stats(&self) -> BTreeMap<&'static str, usize> {
        let mut stats = BTreeMap::new();
        let events = self.events.lock();
        stats.insert("total", events.len());
        for event in events.iter() {
            *stats.entry(event.reason.label()).or_insert(0) += 1;
        }
        stats
    }
}
