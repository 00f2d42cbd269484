//! Postprocessing: stages that run after every render has flushed.
//!
//! Special pages and output formats run on every build, incremental or
//! full. Sitemap, feed, and redirects are full-build-only — an
//! incremental build deliberately skips them.

pub mod feed;
pub mod sitemap;

pub use feed::{FeedOptions, build_feed};
pub use sitemap::{SitemapOptions, build_sitemap};

use crate::build::RenderedPage;

/// A page's sitemap/feed-facing location: `/index.html` stripped to `/`,
/// and a non-empty path always leading with `/`.
pub(crate) fn page_loc(url: &str) -> String {
    let trimmed = url.trim_end_matches("/index.html");
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Search index entry: title, URL, and summary for every page that has one.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SearchIndexEntry {
    pub title: String,
    pub url: String,
    pub summary: Option<String>,
}

impl From<&RenderedPage> for SearchIndexEntry {
    fn from(p: &RenderedPage) -> Self {
        SearchIndexEntry {
            title: p.title.clone(),
            url: p.url.clone(),
            summary: p.summary.clone(),
        }
    }
}

/// Builds `search-index.json` content from a full set of entries — an
/// incremental build must pass the *whole site's* entries (this pass's
/// plus every unchanged page carried over from the cache), not just the
/// pages this pass rendered, or the index silently drops untouched pages.
pub fn build_search_index(entries: &[SearchIndexEntry]) -> String {
    serde_json::to_string(entries).unwrap_or_else(|_| "[]".to_string())
}

/// Plain-text mirror of a page's rendered HTML, for full-text search.
pub fn plain_text_mirror(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The 404 page is emitted whenever a source/template resolves to one,
/// independent of incremental/full status.
pub fn special_pages<'a>(pages: &'a [RenderedPage]) -> Option<&'a RenderedPage> {
    pages.iter().find(|p| p.source_path.ends_with("404.md") || p.url == "/404.html")
}
