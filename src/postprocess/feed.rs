//! RSS 2.0 feed generation: newest 20 dated pages, RFC-822 dates.

use crate::build::RenderedPage;
use crate::utils::date::DateTimeUtc;
use rss::{ChannelBuilder, GuidBuilder, ItemBuilder, validation::Validate};

const MAX_ITEMS: usize = 20;
const SUMMARY_CHARS: usize = 200;

pub struct FeedOptions {
    pub title: String,
    pub base_url: String,
    pub description: String,
}

/// Returns `None` when there are zero pages with a date — feed emission
/// is skipped entirely rather than publishing an empty channel.
pub fn build_feed(pages: &[RenderedPage], options: &FeedOptions) -> Option<String> {
    let mut dated: Vec<&RenderedPage> = pages.iter().filter(|p| p.date.is_some()).collect();
    if dated.is_empty() {
        return None;
    }
    dated.sort_by(|a, b| b.date.cmp(&a.date));
    dated.truncate(MAX_ITEMS);

    let base = options.base_url.trim_end_matches('/');
    let items: Vec<rss::Item> = dated
        .iter()
        .filter_map(|page| page_to_item(page, base))
        .collect();

    let channel = ChannelBuilder::default()
        .title(options.title.clone())
        .link(options.base_url.clone())
        .description(options.description.clone())
        .items(items)
        .build();

    channel.validate().ok()?;
    Some(channel.to_string())
}

fn page_to_item(page: &RenderedPage, base_url: &str) -> Option<rss::Item> {
    let pub_date = DateTimeUtc::parse(page.date.as_deref()?).map(|d| d.to_rfc2822())?;
    let link = format!("{base_url}{}", super::page_loc(&page.url));
    let description = page
        .summary
        .clone()
        .unwrap_or_else(|| truncate_summary(&strip_tags(&page.html)));

    Some(
        ItemBuilder::default()
            .title(page.title.clone())
            .link(Some(link.clone()))
            .guid(GuidBuilder::default().permalink(true).value(link).build())
            .description(description)
            .pub_date(pub_date)
            .author(page.author.clone())
            .build(),
    )
}

fn strip_tags(html: &str) -> String {
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
    out
}

fn truncate_summary(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= SUMMARY_CHARS {
        return trimmed.to_string();
    }
    let truncated: String = trimmed.chars().take(SUMMARY_CHARS).collect();
    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(date: Option<&str>, summary: Option<&str>, html: &str) -> RenderedPage {
        RenderedPage {
            source_path: "content/a.md".into(),
            url: "/a/index.html".into(),
            title: "A".into(),
            date: date.map(str::to_string),
            summary: summary.map(str::to_string),
            html: html.to_string(),
            ..Default::default()
        }
    }

    fn options() -> FeedOptions {
        FeedOptions {
            title: "Blog".to_string(),
            base_url: "https://example.com".to_string(),
            description: "A blog".to_string(),
        }
    }

    #[test]
    fn zero_dated_pages_skips_emission() {
        let pages = vec![page(None, None, "<p>hi</p>")];
        assert!(build_feed(&pages, &options()).is_none());
    }

    #[test]
    fn sorts_descending_and_caps_at_twenty() {
        let pages: Vec<_> = (0..25)
            .map(|i| page(Some(&format!("2026-01-{:02}", (i % 28) + 1)), None, "<p>x</p>"))
            .collect();
        let xml = build_feed(&pages, &options()).unwrap();
        assert_eq!(xml.matches("<item>").count(), MAX_ITEMS);
    }

    #[test]
    fn falls_back_to_first_200_chars_with_ellipsis_when_no_summary() {
        let long_text = "x".repeat(250);
        let pages = vec![page(Some("2026-01-01"), None, &format!("<p>{long_text}</p>"))];
        let xml = build_feed(&pages, &options()).unwrap();
        assert!(xml.contains(&"x".repeat(SUMMARY_CHARS)));
        assert!(xml.contains("..."));
    }

    #[test]
    fn uses_declared_summary_when_present() {
        let pages = vec![page(Some("2026-01-01"), Some("custom summary"), "<p>ignored</p>")];
        let xml = build_feed(&pages, &options()).unwrap();
        assert!(xml.contains("custom summary"));
    }

    #[test]
    fn dates_are_formatted_rfc_822_with_gmt_offset() {
        let pages = vec![page(Some("2026-01-05"), None, "<p>x</p>")];
        let xml = build_feed(&pages, &options()).unwrap();
        assert!(xml.contains("GMT"));
    }
}
