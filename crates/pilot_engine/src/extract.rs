use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContent {
    pub title: Option<String>,
    pub content_html: String,
    /// Absolute image URLs inside the content, in document order.
    pub images: Vec<String>,
}

pub trait Extractor: Send + Sync {
    fn extract(&self, html: &str, base_url: Option<&str>) -> ExtractedContent;
}

/// Lightweight "readability-like" extractor:
/// - title from `<h1>` inside the article, then `og:title`, then `<title>`
/// - content from `<article>`, then `<main>`, then `<body>`, then the whole document
/// - images (`src`, falling back to lazy-load `data-src`) inside that content
#[derive(Debug, Default)]
pub struct ReadabilityLikeExtractor;

impl Extractor for ReadabilityLikeExtractor {
    fn extract(&self, html: &str, base_url: Option<&str>) -> ExtractedContent {
        let doc = Html::parse_document(html);
        let base = base_url.and_then(|u| Url::parse(u).ok());

        let scope = ["article", "main", "body"]
            .iter()
            .find_map(|tag| first(&doc, tag));

        let title = scope
            .filter(|node| node.value().name() == "article")
            .and_then(|node| first_in(node, "h1"))
            .map(|h1| collapse(&h1.text().collect::<String>()))
            .filter(|t| !t.is_empty())
            .or_else(|| meta_content(&doc, r#"meta[property="og:title"]"#))
            .or_else(|| {
                first(&doc, "title")
                    .map(|t| collapse(&t.text().collect::<String>()))
                    .filter(|t| !t.is_empty())
            });

        let (content_html, images) = match scope {
            Some(node) => (node.inner_html(), collect_images(node, base.as_ref())),
            None => (
                doc.root_element().html(),
                collect_images(doc.root_element(), base.as_ref()),
            ),
        };

        ExtractedContent {
            title,
            content_html,
            images,
        }
    }
}

fn first<'a>(doc: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel).next()
}

fn first_in<'a>(node: ElementRef<'a>, selector: &str) -> Option<ElementRef<'a>> {
    let sel = Selector::parse(selector).ok()?;
    node.select(&sel).next()
}

fn meta_content(doc: &Html, selector: &str) -> Option<String> {
    first(doc, selector)
        .and_then(|meta| meta.value().attr("content"))
        .map(collapse)
        .filter(|t| !t.is_empty())
}

fn collect_images(scope: ElementRef<'_>, base: Option<&Url>) -> Vec<String> {
    let Ok(sel) = Selector::parse("img") else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    scope
        .select(&sel)
        .filter_map(|img| {
            let raw = img
                .value()
                .attr("src")
                .filter(|src| !src.trim().is_empty() && !src.starts_with("data:"))
                .or_else(|| img.value().attr("data-src"))?;
            absolutize(raw.trim(), base)
        })
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

fn absolutize(raw: &str, base: Option<&Url>) -> Option<String> {
    let url = match Url::parse(raw) {
        Ok(url) => url,
        Err(_) => base?.join(raw).ok()?,
    };
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
