//! Filesystem discovery: turns the on-disk content/templates/assets/data
//! layout into the plain structures the build pipeline and the
//! incremental orchestrator operate over.

use crate::build::DiscoveredFile;
use crate::orchestrate::{Asset, Page, Section};
use std::collections::BTreeMap;
use std::path::Path;

fn read_frontmatter(raw: &str) -> (serde_json::Value, String) {
    let Some(rest) = raw.strip_prefix("+++\n") else {
        return (serde_json::json!({}), raw.to_string());
    };
    let Some(end) = rest.find("\n+++\n") else {
        return (serde_json::json!({}), raw.to_string());
    };
    let (front, body) = rest.split_at(end);
    let body = body.trim_start_matches("\n+++\n");
    let metadata = toml::from_str::<toml::Value>(front)
        .ok()
        .and_then(|v| serde_json::to_value(v).ok())
        .unwrap_or_else(|| serde_json::json!({}));
    (metadata, body.to_string())
}

/// Walk `content_dir` for `.md` files, splitting frontmatter from body.
pub fn discover_content_files(content_dir: &Path) -> Vec<DiscoveredFile> {
    if !content_dir.exists() {
        return Vec::new();
    }
    let mut out = Vec::new();
    for entry in jwalk::WalkDir::new(content_dir).into_iter().flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let Ok(raw) = std::fs::read_to_string(&path) else {
            continue;
        };
        let (metadata, body) = read_frontmatter(&raw);
        out.push(DiscoveredFile {
            source_path: crate::paths::to_posix(&path),
            raw_content: body,
            metadata,
        });
    }
    out.sort_by(|a, b| a.source_path.cmp(&b.source_path));
    out
}

/// Site-level `templates/` plus every `themes/<theme>/templates/` tree.
pub fn discover_template_paths(root: &Path) -> Vec<String> {
    let mut out = Vec::new();
    for dir in [root.join("templates"), root.join("themes")] {
        if !dir.exists() {
            continue;
        }
        for entry in jwalk::WalkDir::new(&dir).into_iter().flatten() {
            let path = entry.path();
            if path.is_file() {
                out.push(crate::paths::to_posix(&path));
            }
        }
    }
    out.sort();
    out
}

pub fn discover_asset_paths(root: &Path) -> Vec<Asset> {
    let assets_dir = root.join("assets");
    if !assets_dir.exists() {
        return Vec::new();
    }
    let mut out: Vec<Asset> = jwalk::WalkDir::new(&assets_dir)
        .into_iter()
        .flatten()
        .filter(|e| e.path().is_file())
        .map(|e| Asset {
            source_path: crate::paths::to_posix(&e.path()),
        })
        .collect();
    out.sort_by(|a, b| a.source_path.cmp(&b.source_path));
    out
}

const DATA_EXTENSIONS: &[&str] = &["yaml", "yml", "json", "toml"];

pub fn discover_data_file_paths(content_dir: &Path) -> Vec<String> {
    let data_dir = content_dir.join("data");
    if !data_dir.exists() {
        return Vec::new();
    }
    let mut out: Vec<String> = jwalk::WalkDir::new(&data_dir)
        .into_iter()
        .flatten()
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| DATA_EXTENSIONS.contains(&ext))
        })
        .map(|e| crate::paths::to_posix(&e.path()))
        .collect();
    out.sort();
    out
}

const INDEX_NAMES: &[&str] = &["_index.md", "index.md"];

/// Groups discovered content files into the minimal page/section model
/// the change detector reasons over: one section per parent directory,
/// prev/next assigned by sorted order within a section, tags lifted from
/// a `tags` frontmatter array.
pub fn build_site_model(files: &[DiscoveredFile]) -> (BTreeMap<String, Page>, BTreeMap<String, Section>) {
    let mut pages: BTreeMap<String, Page> = BTreeMap::new();
    let mut sections: BTreeMap<String, Section> = BTreeMap::new();

    for file in files {
        let section_path = Path::new(&file.source_path)
            .parent()
            .map(|p| crate::paths::to_posix(p))
            .unwrap_or_default();

        let mut page = Page::new(file.source_path.clone());
        page.section = Some(section_path.clone());
        if let Some(tags) = file.metadata.get("tags").and_then(|v| v.as_array()) {
            page.tags = tags.iter().filter_map(|t| t.as_str().map(str::to_string)).collect();
        }
        page.cascade = file.metadata.get("cascade").and_then(|v| v.as_bool()).unwrap_or(false);
        page.nav_metadata_hash = Some(crate::hash::nav_metadata_hash(&file.metadata));
        page.metadata_hash = Some(crate::hash::metadata_hash(&file.metadata));

        let section = sections.entry(section_path).or_insert_with(|| Section {
            path: page.section.clone().unwrap_or_default(),
            pages: Vec::new(),
            subsections: Vec::new(),
            index_page: None,
        });
        section.pages.push(file.source_path.clone());
        let file_name = Path::new(&file.source_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if INDEX_NAMES.contains(&file_name) {
            section.index_page = Some(file.source_path.clone());
        }

        pages.insert(file.source_path.clone(), page);
    }

    for section in sections.values_mut() {
        section.pages.sort();
    }

    // prev/next within each section, excluding the section index itself.
    for section in sections.values() {
        let siblings: Vec<&String> = section
            .pages
            .iter()
            .filter(|p| Some(*p) != section.index_page.as_ref())
            .collect();
        for (i, path) in siblings.iter().enumerate() {
            if let Some(page) = pages.get_mut(path.as_str()) {
                page.prev = siblings.get(i.wrapping_sub(1)).filter(|_| i > 0).map(|p| (*p).clone());
                page.next = siblings.get(i + 1).map(|p| (*p).clone());
            }
        }
    }

    // register parent -> child subsection edges
    let section_paths: Vec<String> = sections.keys().cloned().collect();
    for path in &section_paths {
        if let Some(parent) = Path::new(path).parent().map(crate::paths::to_posix) {
            if sections.contains_key(&parent) && &parent != path {
                sections.get_mut(&parent).unwrap().subsections.push(path.clone());
            }
        }
    }

    (pages, sections)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str) -> DiscoveredFile {
        DiscoveredFile {
            source_path: path.to_string(),
            raw_content: String::new(),
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn frontmatter_is_split_from_body() {
        let raw = "+++\ntitle = \"A\"\n+++\nbody text";
        let (meta, body) = read_frontmatter(raw);
        assert_eq!(meta["title"], "A");
        assert_eq!(body, "body text");
    }

    #[test]
    fn missing_frontmatter_keeps_whole_file_as_body() {
        let (meta, body) = read_frontmatter("just content");
        assert_eq!(meta, serde_json::json!({}));
        assert_eq!(body, "just content");
    }

    #[test]
    fn pages_in_same_section_get_sorted_prev_next() {
        let files = vec![file("content/blog/a.md"), file("content/blog/b.md"), file("content/blog/c.md")];
        let (pages, sections) = build_site_model(&files);
        assert_eq!(pages["content/blog/b.md"].prev.as_deref(), Some("content/blog/a.md"));
        assert_eq!(pages["content/blog/b.md"].next.as_deref(), Some("content/blog/c.md"));
        assert_eq!(sections["content/blog"].pages.len(), 3);
    }

    #[test]
    fn section_index_is_detected_and_excluded_from_prev_next() {
        let files = vec![file("content/blog/_index.md"), file("content/blog/a.md")];
        let (pages, sections) = build_site_model(&files);
        assert_eq!(sections["content/blog"].index_page.as_deref(), Some("content/blog/_index.md"));
        assert!(pages["content/blog/a.md"].prev.is_none());
    }
}
