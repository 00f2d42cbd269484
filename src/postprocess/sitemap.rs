//! Sitemap generation: `sitemap.xml` listing every page, with optional
//! i18n `hreflang` alternates.

use crate::build::RenderedPage;
use std::borrow::Cow;
use std::collections::BTreeMap;

const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";
const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";
const DEFAULT_CHANGEFREQ: &str = "weekly";
const DEFAULT_PRIORITY: &str = "0.5";

pub struct SitemapOptions {
    pub base_url: String,
    pub i18n_enabled: bool,
    pub default_language: String,
}

struct UrlEntry {
    loc: String,
    lastmod: Option<String>,
    alternates: Vec<(String, String)>,
}

/// Returns `None` when there are zero pages — sitemap emission is skipped entirely.
pub fn build_sitemap(pages: &[RenderedPage], options: &SitemapOptions) -> Option<String> {
    if pages.is_empty() {
        return None;
    }

    let translations: BTreeMap<&str, Vec<&RenderedPage>> = pages
        .iter()
        .filter_map(|p| p.translation_key.as_deref().map(|k| (k, p)))
        .fold(BTreeMap::new(), |mut acc, (key, page)| {
            acc.entry(key).or_default().push(page);
            acc
        });

    let base = options.base_url.trim_end_matches('/');
    let urls: Vec<UrlEntry> = pages
        .iter()
        .map(|page| {
            let loc = format!("{base}{}", sitemap_loc(&page.url));
            let alternates = if options.i18n_enabled {
                page.translation_key
                    .as_deref()
                    .and_then(|key| translations.get(key))
                    .map(|variants| {
                        variants
                            .iter()
                            .filter_map(|variant| {
                                let lang = variant.language.clone()?;
                                Some((lang, format!("{base}{}", sitemap_loc(&variant.url))))
                            })
                            .chain(
                                variants
                                    .iter()
                                    .find(|v| v.is_default_language)
                                    .map(|default| {
                                        ("x-default".to_string(), format!("{base}{}", sitemap_loc(&default.url)))
                                    }),
                            )
                            .collect()
                    })
                    .unwrap_or_default()
            } else {
                Vec::new()
            };
            UrlEntry {
                loc,
                lastmod: page.date.as_ref().and_then(|d| to_date_only(d)),
                alternates,
            }
        })
        .collect();

    Some(render_xml(urls, options.i18n_enabled))
}

fn sitemap_loc(url: &str) -> String {
    super::page_loc(url)
}

fn to_date_only(date: &str) -> Option<String> {
    crate::utils::date::DateTimeUtc::parse(date).map(|d| format!("{:04}-{:02}-{:02}", d.year, d.month, d.day))
}

fn render_xml(urls: Vec<UrlEntry>, i18n: bool) -> String {
    let mut xml = String::with_capacity(4096);
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    if i18n {
        xml.push_str(&format!("<urlset xmlns=\"{SITEMAP_NS}\" xmlns:xhtml=\"{XHTML_NS}\">\n"));
    } else {
        xml.push_str(&format!("<urlset xmlns=\"{SITEMAP_NS}\">\n"));
    }

    for entry in urls {
        xml.push_str("  <url>\n    <loc>");
        xml.push_str(&escape_xml(&entry.loc));
        xml.push_str("</loc>\n");
        if let Some(lastmod) = &entry.lastmod {
            xml.push_str("    <lastmod>");
            xml.push_str(lastmod);
            xml.push_str("</lastmod>\n");
        }
        xml.push_str("    <changefreq>");
        xml.push_str(DEFAULT_CHANGEFREQ);
        xml.push_str("</changefreq>\n    <priority>");
        xml.push_str(DEFAULT_PRIORITY);
        xml.push_str("</priority>\n");
        for (lang, href) in &entry.alternates {
            xml.push_str(&format!(
                "    <xhtml:link rel=\"alternate\" hreflang=\"{}\" href=\"{}\"/>\n",
                escape_xml(lang),
                escape_xml(href)
            ));
        }
        xml.push_str("  </url>\n");
    }

    xml.push_str("</urlset>\n");
    xml
}

fn escape_xml(s: &str) -> Cow<'_, str> {
    if !s.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(
        s.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
            .replace('\'', "&apos;"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str, date: Option<&str>) -> RenderedPage {
        RenderedPage {
            source_path: format!("content{url}.md"),
            url: url.to_string(),
            date: date.map(str::to_string),
            ..Default::default()
        }
    }

    fn options() -> SitemapOptions {
        SitemapOptions {
            base_url: "https://example.com".to_string(),
            i18n_enabled: false,
            default_language: "en".to_string(),
        }
    }

    #[test]
    fn zero_pages_skips_emission() {
        assert!(build_sitemap(&[], &options()).is_none());
    }

    #[test]
    fn emits_loc_lastmod_and_defaults() {
        let pages = vec![page("/blog/post/index.html", Some("2026-01-05"))];
        let xml = build_sitemap(&pages, &options()).unwrap();
        assert!(xml.contains("<loc>https://example.com/blog/post</loc>"));
        assert!(xml.contains("<lastmod>2026-01-05</lastmod>"));
        assert!(xml.contains("<changefreq>weekly</changefreq>"));
        assert!(xml.contains("<priority>0.5</priority>"));
    }

    #[test]
    fn root_index_strips_to_slash() {
        let pages = vec![page("/index.html", None)];
        let xml = build_sitemap(&pages, &options()).unwrap();
        assert!(xml.contains("<loc>https://example.com/</loc>"));
        assert!(!xml.contains("<lastmod>"));
    }

    #[test]
    fn i18n_alternates_include_x_default() {
        let mut en = page("/en/post/index.html", None);
        en.translation_key = Some("post-1".into());
        en.language = Some("en".into());
        en.is_default_language = true;
        let mut fr = page("/fr/post/index.html", None);
        fr.translation_key = Some("post-1".into());
        fr.language = Some("fr".into());

        let mut opts = options();
        opts.i18n_enabled = true;
        let xml = build_sitemap(&[en, fr], &opts).unwrap();
        assert!(xml.contains(r#"hreflang="fr""#));
        assert!(xml.contains(r#"hreflang="x-default""#));
    }

    #[test]
    fn escapes_special_characters_in_loc() {
        assert_eq!(escape_xml("a & b"), "a &amp; b");
    }
}
