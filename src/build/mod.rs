//! The build pipeline: discover -> parse -> create_page -> collect_pages
//! -> finalize_sections -> taxonomies -> menus -> assets -> render -> write.
//!
//! Stages that need whole-site information sit behind a `collect`
//! barrier; everything before it runs as a lazy [`Stream`]. Markdown
//! parsing and template rendering are delegated to injected trait
//! objects — this crate owns scheduling and caching, not page content.

pub mod page;
pub mod write;

pub use page::{RenderedPage, output_path_for_url};

use crate::cache::{BuildCache, ParsedContentEntry, RenderedOutputEntry};
use crate::hash::hash_str;
use crate::pipeline::{
    CollectStream, FilterStream, FlatMapStream, MapStream, SourceStream, Stream, StreamCache, StreamItem, StreamKey,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub source_path: String,
    pub raw_content: String,
    pub metadata: serde_json::Value,
}

pub trait ContentParser: Send + Sync {
    fn parse(&self, content: &str, metadata: &serde_json::Value) -> String;

    fn parser_version(&self) -> &str {
        "1"
    }
}

pub trait TemplateEngine: Send + Sync {
    fn render_page(&self, source_path: &str, html: &str, metadata: &serde_json::Value) -> String;

    fn template_identity(&self, metadata: &serde_json::Value) -> String {
        metadata
            .get("template")
            .and_then(|v| v.as_str())
            .unwrap_or("default")
            .to_string()
    }
}

/// Trivial pass-through implementations: sufficient to drive the
/// pipeline and its tests without a real Markdown/HTML engine.
pub struct PassthroughParser;

impl ContentParser for PassthroughParser {
    fn parse(&self, content: &str, _metadata: &serde_json::Value) -> String {
        content.to_string()
    }
}

pub struct PassthroughTemplateEngine;

impl TemplateEngine for PassthroughTemplateEngine {
    fn render_page(&self, _source_path: &str, html: &str, _metadata: &serde_json::Value) -> String {
        html.to_string()
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct ParsedPage {
    source_path: String,
    html: String,
    metadata: serde_json::Value,
    source_hash: String,
}

#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    pub parallel: bool,
    pub workers: usize,
    pub worker_threshold: usize,
    pub asset_manifest_mtime: u128,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            workers: 4,
            worker_threshold: 5,
            asset_manifest_mtime: 0,
        }
    }
}

impl BuildOptions {
    fn effective_parallel(&self, page_count: usize) -> bool {
        self.parallel && page_count >= self.worker_threshold
    }
}

fn discover_stream(files: Vec<DiscoveredFile>) -> crate::pipeline::StreamHandle<DiscoveredFile> {
    SourceStream::new("discover", move || {
        files
            .iter()
            .map(|f| {
                let version = hash_str(&f.raw_content);
                StreamItem::new(StreamKey::new("discover", f.source_path.clone(), version), f.clone())
            })
            .collect()
    })
}

fn parse_stage(
    upstream: crate::pipeline::StreamHandle<DiscoveredFile>,
    parser: Arc<dyn ContentParser>,
    stream_cache: Arc<StreamCache>,
) -> crate::pipeline::StreamHandle<ParsedPage> {
    MapStream::new("parse", upstream, move |file| ParsedPage {
        html: parser.parse(&file.raw_content, &file.metadata),
        source_hash: hash_str(&file.raw_content),
        source_path: file.source_path,
        metadata: file.metadata,
    })
    .into_disk_cached(stream_cache)
}

fn create_page(parsed: ParsedPage) -> RenderedPage {
    let title = parsed
        .metadata
        .get("title")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let url = parsed
        .metadata
        .get("url")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let date = parsed
        .metadata
        .get("date")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let summary = parsed
        .metadata
        .get("summary")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let author = parsed
        .metadata
        .get("author")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let translation_key = parsed
        .metadata
        .get("translation_key")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let language = parsed
        .metadata
        .get("language")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let nav_metadata_hash = Some(crate::hash::nav_metadata_hash(&parsed.metadata));
    let metadata_hash = Some(crate::hash::metadata_hash(&parsed.metadata));
    RenderedPage {
        source_path: parsed.source_path,
        url,
        title,
        date,
        summary,
        html: parsed.html,
        author,
        translation_key,
        is_default_language: language.is_none(),
        language,
        nav_metadata_hash,
        metadata_hash,
    }
}

/// Section/taxonomy/menu finalization: derived, whole-site structures
/// computed once the page collection barrier has been crossed.
#[derive(Debug, Default)]
pub struct SiteStructure {
    /// section path -> member page source paths, sorted.
    pub sections: BTreeMap<String, Vec<String>>,
    /// taxonomy term ("tags:rust") -> member page source paths.
    pub taxonomy_terms: BTreeMap<String, Vec<String>>,
    /// menu entries as (title, url), sorted by title.
    pub menu: Vec<(String, String)>,
}

pub fn finalize_sections(pages: &[RenderedPage]) -> BTreeMap<String, Vec<String>> {
    let mut sections: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for page in pages {
        if let Some(parent) = Path::new(&page.source_path).parent() {
            sections
                .entry(crate::paths::to_posix(parent))
                .or_default()
                .push(page.source_path.clone());
        }
    }
    for members in sections.values_mut() {
        members.sort();
    }
    sections
}

/// Expands each page into its (term, page) memberships via a `flat_map`
/// stage, then folds the expansion behind a `collect` barrier — taxonomy
/// generation is single-threaded coordination work, not per-page render
/// work, so there's no parallel stage here.
pub fn build_taxonomies(
    pages: &[RenderedPage],
    tags: &BTreeMap<String, Vec<String>>,
    dependencies: &mut crate::cache::DependencyGraph,
) -> BTreeMap<String, Vec<String>> {
    let owned_pages: Vec<RenderedPage> = pages.to_vec();
    let tags = tags.clone();
    let source = SourceStream::new("finalized_pages", move || {
        owned_pages
            .iter()
            .enumerate()
            .map(|(i, page)| {
                let version = hash_str(&page.html);
                StreamItem::new(StreamKey::new("finalized_pages", i.to_string(), version), page.clone())
            })
            .collect()
    });
    let memberships = FlatMapStream::new("taxonomy_members", source, move |page: RenderedPage| {
        tags.get(&page.source_path)
            .into_iter()
            .flatten()
            .map(|tag| (format!("tags:{tag}"), page.source_path.clone()))
            .collect()
    });
    let collected = CollectStream::new("taxonomy_members", memberships);
    let all_memberships = collected
        .collect_items()
        .into_iter()
        .next()
        .map(|item| item.value)
        .unwrap_or_default();

    let mut terms: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (term_key, source_path) in all_memberships {
        dependencies.record_taxonomy_member(&term_key, &source_path);
        terms.entry(term_key).or_default().push(source_path);
    }
    for members in terms.values_mut() {
        members.sort();
        members.dedup();
    }
    terms
}

fn is_section_index(source_path: &str) -> bool {
    matches!(Path::new(source_path).file_name().and_then(|n| n.to_str()), Some("_index.md") | Some("index.md"))
}

/// Section indices are navigated to via their section, not a menu entry
/// for themselves, so they're filtered out of the menu stream before the
/// `(title, url)` projection.
pub fn build_menu(pages: &[RenderedPage]) -> Vec<(String, String)> {
    let owned_pages: Vec<RenderedPage> = pages.to_vec();
    let source = SourceStream::new("finalized_pages", move || {
        owned_pages
            .iter()
            .enumerate()
            .map(|(i, page)| {
                let version = hash_str(&page.html);
                StreamItem::new(StreamKey::new("finalized_pages", i.to_string(), version), page.clone())
            })
            .collect()
    });
    let titled = FilterStream::new(source, |page: &RenderedPage| {
        !page.title.is_empty() && !is_section_index(&page.source_path)
    });
    let entries = MapStream::new("menu_entry", titled, |page: RenderedPage| (page.title, page.url)).into_handle();
    let mut menu: Vec<(String, String)> = entries.collect_items().into_iter().map(|item| item.value).collect();
    menu.sort();
    menu
}

/// Run the full pipeline from discovered source files through to
/// rendered, write-ready pages. `tags` maps source path to tags (the
/// dependency tracker records taxonomy membership as pages render).
pub fn run_pipeline(
    files: Vec<DiscoveredFile>,
    tags: BTreeMap<String, Vec<String>>,
    parser: Arc<dyn ContentParser>,
    engine: Arc<dyn TemplateEngine>,
    cache: &mut BuildCache,
    stream_cache: Arc<StreamCache>,
    options: &BuildOptions,
) -> (Vec<RenderedPage>, SiteStructure) {
    let discover = discover_stream(files);
    let parsed = parse_stage(discover, Arc::clone(&parser), Arc::clone(&stream_cache));
    let pages_stream = MapStream::new("create_page", parsed, create_page).into_disk_cached(Arc::clone(&stream_cache));

    let collected = CollectStream::new("collect_pages", pages_stream);
    let mut pages = collected
        .collect_items()
        .into_iter()
        .next()
        .map(|item| item.value)
        .unwrap_or_default();

    let sections = finalize_sections(&pages);
    let taxonomy_terms = build_taxonomies(&pages, &tags, &mut cache.dependencies);
    let menu = build_menu(&pages);

    let parser_version = parser.parser_version().to_string();
    let render = move |mut page: RenderedPage| {
        let template_identity = engine.template_identity(&serde_json::json!({"url": page.url}));
        let expected = ParsedContentEntry {
            source_hash: hash_str(&page.html),
            template_identity: template_identity.clone(),
            parser_version: parser_version.clone(),
            metadata_hash: page.metadata_hash.clone(),
            nav_metadata_hash: page.nav_metadata_hash.clone(),
        };
        page.html = engine.render_page(&page.source_path, &page.html, &serde_json::json!({}));
        (page, expected)
    };

    let render_parallel = options.effective_parallel(pages.len());
    let pages_remaining = Mutex::new(Some(pages.drain(..).collect::<Vec<_>>()));
    let page_source = SourceStream::new("collect_pages_output", move || {
        let taken = pages_remaining.lock().unwrap().take().unwrap_or_default();
        taken
            .into_iter()
            .enumerate()
            .map(|(i, page)| {
                let version = hash_str(&page.html);
                StreamItem::new(StreamKey::new("collect_pages_output", i.to_string(), version), page)
            })
            .collect()
    });
    let render_map = MapStream::new("render", page_source, render);
    let render_handle = if render_parallel {
        render_map.into_parallel(options.workers)
    } else {
        render_map.into_handle()
    };
    let rendered: Vec<(RenderedPage, ParsedContentEntry)> =
        render_handle.collect_items().into_iter().map(|item| item.value).collect();

    let mut out = Vec::with_capacity(rendered.len());
    for (page, parsed_entry) in rendered {
        cache.parsed_content.insert(page.source_path.clone(), parsed_entry.clone());
        cache.rendered_output.insert(
            page.source_path.clone(),
            RenderedOutputEntry {
                parsed_content_hash: parsed_entry.source_hash.clone(),
                asset_manifest_mtime: options.asset_manifest_mtime,
                page_deps: Vec::new(),
            },
        );
        out.push(page);
    }

    (
        out,
        SiteStructure {
            sections,
            taxonomy_terms,
            menu,
        },
    )
}
