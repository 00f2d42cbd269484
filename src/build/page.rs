//! The page record the render stage produces and postprocess consumes.
//! Distinct from [`crate::orchestrate::site::Page`], which is the
//! lightweight view the change detector reasons over.

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct RenderedPage {
    pub source_path: String,
    pub url: String,
    pub title: String,
    pub date: Option<String>,
    pub summary: Option<String>,
    pub html: String,
    pub author: Option<String>,
    /// Shared key across language variants of the same logical page, for
    /// i18n `hreflang` alternates.
    pub translation_key: Option<String>,
    pub language: Option<String>,
    pub is_default_language: bool,
    /// Hash of this page's nav-affecting frontmatter subset, recorded on
    /// the cache entry so the next build's section-index cascade gate
    /// (step 3) can compare against it without re-reading the source.
    #[serde(skip)]
    pub nav_metadata_hash: Option<String>,
    /// Hash of this page's full frontmatter, the cascade gate's fallback.
    #[serde(skip)]
    pub metadata_hash: Option<String>,
}

/// Output path for a rendered page's URL: the empty URL becomes
/// `index.html`; a URL not already ending in `.html` becomes
/// `<url>/index.html` with any leading slash stripped first.
pub fn output_path_for_url(url: &str) -> String {
    let trimmed = url.trim_start_matches('/');
    if trimmed.is_empty() {
        return "index.html".to_string();
    }
    if trimmed.ends_with(".html") {
        return trimmed.to_string();
    }
    format!("{}/index.html", trimmed.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_url_becomes_index_html() {
        assert_eq!(output_path_for_url(""), "index.html");
        assert_eq!(output_path_for_url("/"), "index.html");
    }

    #[test]
    fn non_html_url_gets_index_html_appended() {
        assert_eq!(output_path_for_url("/blog/post"), "blog/post/index.html");
    }

    #[test]
    fn html_url_is_left_alone() {
        assert_eq!(output_path_for_url("/404.html"), "404.html");
    }
}
