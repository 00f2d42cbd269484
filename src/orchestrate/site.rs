//! Minimal site model the change detector reasons over: pages, the
//! section tree, and assets. Content parsing and rendering are out of
//! scope here — this is just enough structure to drive invalidation.

use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct Page {
    pub source_path: String,
    pub tags: Vec<String>,
    pub section: Option<String>,
    pub prev: Option<String>,
    pub next: Option<String>,
    /// A page synthesized from an index (e.g. a taxonomy term listing)
    /// rather than backed by an authored source file.
    pub generated: bool,
    /// Root-level cascade metadata present on this page (propagates to
    /// every non-generated page in the site when it changes).
    pub cascade: bool,
    /// Whether this page participates in i18n/versioning (a "versioned" page).
    pub versioned: bool,
    /// Hash of just this page's nav-affecting frontmatter (title, weight,
    /// icon, menu, child ordering), used by the section-index cascade gate.
    pub nav_metadata_hash: Option<String>,
    /// Hash of this page's full frontmatter, the cascade gate's fallback
    /// when nav-metadata extraction fails.
    pub metadata_hash: Option<String>,
}

impl Page {
    pub fn new(source_path: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            tags: Vec::new(),
            section: None,
            prev: None,
            next: None,
            generated: false,
            cascade: false,
            versioned: false,
            nav_metadata_hash: None,
            metadata_hash: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Section {
    pub path: String,
    /// Source paths of pages directly under this section, including its
    /// own `_index.md`/`index.md` if present.
    pub pages: Vec<String>,
    pub subsections: Vec<String>,
    pub index_page: Option<String>,
}

impl Section {
    /// All non-generated page source paths under this section, recursing
    /// into subsections. `sections` maps section path -> Section.
    pub fn regular_pages_recursive(
        &self,
        sections: &BTreeMap<String, Section>,
        pages: &BTreeMap<String, Page>,
    ) -> Vec<String> {
        let mut out = Vec::new();
        for page_path in &self.pages {
            if pages.get(page_path).is_some_and(|p| !p.generated) {
                out.push(page_path.clone());
            }
        }
        for sub_path in &self.subsections {
            if let Some(sub) = sections.get(sub_path) {
                out.extend(sub.regular_pages_recursive(sections, pages));
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct Asset {
    pub source_path: String,
}
