//! Content extraction from fetched HTML
//!
//! Extraction is pure: no I/O, no shared state. The crawler calls a
//! [`ContentExtractor`] once per fetched page; [`HtmlExtractor`] is the
//! default built on `scraper`.

mod content;
mod links;
mod media;
mod redact;

pub use links::resolve_link;
pub use redact::Redactor;

use crate::model::{Link, MediaPayload, PageContent};
use scraper::Html;
use url::Url;

/// File extensions of links classified as documents
pub const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx"];

/// Turns raw HTML into links, media and text content
pub trait ContentExtractor: Send + Sync {
    fn extract_links(&self, html: &str, base_url: &Url) -> Vec<Link>;

    fn extract_media(&self, html: &str, base_url: &Url) -> MediaPayload;

    fn extract_content(&self, html: &str) -> PageContent;

    /// Runs all three extractions; override to parse the document only once
    fn extract_all(&self, html: &str, base_url: &Url) -> (Vec<Link>, MediaPayload, PageContent) {
        (
            self.extract_links(html, base_url),
            self.extract_media(html, base_url),
            self.extract_content(html),
        )
    }
}

/// Default extractor built on `scraper`
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlExtractor;

impl ContentExtractor for HtmlExtractor {
    fn extract_links(&self, html: &str, base_url: &Url) -> Vec<Link> {
        links::extract_links(&Html::parse_document(html), base_url)
    }

    fn extract_media(&self, html: &str, base_url: &Url) -> MediaPayload {
        media::extract_media(&Html::parse_document(html), base_url)
    }

    fn extract_content(&self, html: &str) -> PageContent {
        content::extract_content(&Html::parse_document(html))
    }

    fn extract_all(&self, html: &str, base_url: &Url) -> (Vec<Link>, MediaPayload, PageContent) {
        let document = Html::parse_document(html);
        (
            links::extract_links(&document, base_url),
            media::extract_media(&document, base_url),
            content::extract_content(&document),
        )
    }
}

/// Returns the lowercased document extension of `url`'s path, if it has one
pub fn document_extension(url: &Url) -> Option<&'static str> {
    let path = url.path().to_ascii_lowercase();
    let (_, extension) = path.rsplit_once('.')?;
    DOCUMENT_EXTENSIONS
        .iter()
        .find(|candidate| **candidate == extension)
        .copied()
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
