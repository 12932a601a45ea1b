//! Link extraction
//!
//! **Include:**
//! - `<a href="...">` anywhere in the document
//! - `<iframe src="...">`, classified as iframes
//!
//! **Exclude:**
//! - `<a href="..." download>`
//! - `javascript:`, `mailto:`, `tel:` links and data URIs
//! - fragment-only links (same page anchors)
//!
//! `rel="nofollow"` links are kept.

use crate::extract::{collapse_whitespace, document_extension};
use crate::model::{Link, LinkClassification};
use scraper::{Html, Selector};
use url::Url;

pub fn extract_links(document: &Html, base_url: &Url) -> Vec<Link> {
    let mut links = Vec::new();
    let base_host = base_url.host_str().map(str::to_lowercase);

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }

            let Some(url) = element
                .value()
                .attr("href")
                .and_then(|href| resolve_link(href, base_url))
            else {
                continue;
            };

            let classification = if document_extension(&url).is_some() {
                LinkClassification::Document
            } else if url.host_str().map(str::to_lowercase) == base_host {
                LinkClassification::Internal
            } else {
                LinkClassification::External
            };

            let text = collapse_whitespace(&element.text().collect::<String>());
            let title = element
                .value()
                .attr("title")
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty());

            links.push(Link::new(url, text, title, classification));
        }
    }

    if let Ok(iframe_selector) = Selector::parse("iframe[src]") {
        for element in document.select(&iframe_selector) {
            if let Some(url) = element
                .value()
                .attr("src")
                .and_then(|src| resolve_link(src, base_url))
            {
                let title = element
                    .value()
                    .attr("title")
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty());
                links.push(Link::new(url, "", title, LinkClassification::Iframe));
            }
        }
    }

    links
}

/// Resolves a link href to an absolute URL
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let mut absolute_url = base_url.join(href).ok()?;
    if absolute_url.scheme() != "http" && absolute_url.scheme() != "https" {
        return None;
    }
    absolute_url.set_fragment(None);
    Some(absolute_url)
}
