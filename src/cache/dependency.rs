//! Reverse-dependency tracking: which pages use which template, which
//! data file, or belong to which taxonomy term — so a change to one of
//! those can be cascaded to exactly the pages that depend on it.
//!
//! Three layers, in increasing order of concurrency-friendliness:
//! - [`DependencyGraph`]: a plain struct, no synchronization.
//! - [`global`]: a process-wide `RwLock<DependencyGraph>` for single-threaded
//!   phases (discovery, section finalization).
//! - [`parallel`]: thread-local buffers flushed into the global graph,
//!   for use from rayon worker threads during parallel rendering without
//!   lock contention on every dependency record.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// Pure, synchronization-free dependency graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyGraph {
    /// template path -> pages that rendered with it
    pub template_deps: FxHashMap<String, FxHashSet<String>>,
    /// data file path -> pages that read it
    pub data_deps: FxHashMap<String, FxHashSet<String>>,
    /// taxonomy term (taxonomy:slug) -> member page paths
    pub taxonomy_members: FxHashMap<String, FxHashSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_template(&mut self, page: &str, template: &str) {
        self.template_deps
            .entry(template.to_string())
            .or_default()
            .insert(page.to_string());
    }

    pub fn record_data_file(&mut self, page: &str, data_file: &str) {
        self.data_deps
            .entry(data_file.to_string())
            .or_default()
            .insert(page.to_string());
    }

    pub fn record_taxonomy_member(&mut self, term_key: &str, page: &str) {
        self.taxonomy_members
            .entry(term_key.to_string())
            .or_default()
            .insert(page.to_string());
    }

    pub fn pages_using_template(&self, template: &str) -> Vec<String> {
        self.template_deps
            .get(template)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn pages_using_data_file(&self, data_file: &str) -> Vec<String> {
        self.data_deps
            .get(data_file)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn taxonomy_term_members(&self, term_key: &str) -> Vec<String> {
        self.taxonomy_members
            .get(term_key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop every record naming `page`, used when a page is removed.
    pub fn remove_page(&mut self, page: &str) {
        for set in self.template_deps.values_mut() {
            set.remove(page);
        }
        for set in self.data_deps.values_mut() {
            set.remove(page);
        }
        for set in self.taxonomy_members.values_mut() {
            set.remove(page);
        }
    }

    pub fn merge(&mut self, other: Self) {
        for (k, v) in other.template_deps {
            self.template_deps.entry(k).or_default().extend(v);
        }
        for (k, v) in other.data_deps {
            self.data_deps.entry(k).or_default().extend(v);
        }
        for (k, v) in other.taxonomy_members {
            self.taxonomy_members.entry(k).or_default().extend(v);
        }
    }
}

/// Process-wide dependency graph for use outside parallel render workers.
pub mod global {
    use super::DependencyGraph;
    use parking_lot::RwLock;
    use std::sync::LazyLock;

    static GRAPH: LazyLock<RwLock<DependencyGraph>> =
        LazyLock::new(|| RwLock::new(DependencyGraph::new()));

    pub fn record_template(page: &str, template: &str) {
        GRAPH.write().record_template(page, template);
    }

    pub fn record_data_file(page: &str, data_file: &str) {
        GRAPH.write().record_data_file(page, data_file);
    }

    pub fn record_taxonomy_member(term_key: &str, page: &str) {
        GRAPH.write().record_taxonomy_member(term_key, page);
    }

    pub fn snapshot() -> DependencyGraph {
        GRAPH.read().clone()
    }

    pub fn replace(graph: DependencyGraph) {
        *GRAPH.write() = graph;
    }

    pub fn merge(graph: DependencyGraph) {
        GRAPH.write().merge(graph);
    }
}

/// Thread-local buffering for use from rayon worker threads: each thread
/// accumulates dependency records locally and only touches the global
/// lock when explicitly flushed, avoiding contention on every
/// `record_*` call during parallel rendering.
pub mod parallel {
    use super::DependencyGraph;
    use std::cell::RefCell;

    thread_local! {
        static LOCAL: RefCell<DependencyGraph> = RefCell::new(DependencyGraph::new());
    }

    pub fn record_template(page: &str, template: &str) {
        LOCAL.with(|g| g.borrow_mut().record_template(page, template));
    }

    pub fn record_data_file(page: &str, data_file: &str) {
        LOCAL.with(|g| g.borrow_mut().record_data_file(page, data_file));
    }

    pub fn record_taxonomy_member(term_key: &str, page: &str) {
        LOCAL.with(|g| g.borrow_mut().record_taxonomy_member(term_key, page));
    }

    /// Merge this thread's buffered records into the global graph and
    /// clear the local buffer. Call once per worker thread after a
    /// parallel render pass (e.g. via `rayon::broadcast`).
    pub fn flush() {
        LOCAL.with(|g| {
            let local = std::mem::take(&mut *g.borrow_mut());
            super::global::merge(local);
        });
    }

    /// Flush every rayon worker thread's local buffer into the global graph.
    pub fn flush_all() {
        rayon::broadcast(|_| flush());
    }
}
