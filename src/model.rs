//! Crawl result types shared by the crawler, extractors and writers

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::sync::{Arc, OnceLock};
use url::Url;

/// How a link relates to the page it was found on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkClassification {
    /// Same host as the page
    Internal,
    /// Different host
    External,
    /// Source of an `<iframe>`
    Iframe,
    /// Downloadable document (pdf, docx, ...); never crawled
    Document,
}

impl LinkClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::External => "external",
            Self::Iframe => "iframe",
            Self::Document => "document",
        }
    }

    /// Returns true if links of this kind may be followed by the crawler
    pub fn is_crawlable(&self) -> bool {
        !matches!(self, Self::Document)
    }
}

/// A hyperlink extracted from a page
///
/// The child slot is filled at most once, when the linked page is crawled
/// as part of the same recursion.
#[derive(Debug, Clone, Serialize)]
pub struct Link {
    pub url: Url,
    pub text: String,
    pub title: Option<String>,
    pub classification: LinkClassification,
    #[serde(
        serialize_with = "serialize_child",
        skip_serializing_if = "child_is_empty"
    )]
    child: OnceLock<Arc<PageResult>>,
}

impl Link {
    pub fn new(
        url: Url,
        text: impl Into<String>,
        title: Option<String>,
        classification: LinkClassification,
    ) -> Self {
        Self {
            url,
            text: text.into(),
            title,
            classification,
            child: OnceLock::new(),
        }
    }

    /// The crawled page this link points to, if it was crawled
    pub fn child(&self) -> Option<&Arc<PageResult>> {
        self.child.get()
    }

    /// Attaches the crawled child page; returns false if one was already attached
    pub fn attach_child(&self, page: Arc<PageResult>) -> bool {
        self.child.set(page).is_ok()
    }
}

fn serialize_child<S: Serializer>(
    child: &OnceLock<Arc<PageResult>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match child.get() {
        Some(page) => serializer.serialize_some(page.as_ref()),
        None => serializer.serialize_none(),
    }
}

fn child_is_empty(child: &OnceLock<Arc<PageResult>>) -> bool {
    child.get().is_none()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

/// Textual content of a page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageContent {
    pub title: Option<String>,
    pub description: Option<String>,
    pub headings: Vec<Heading>,
    pub text: String,
    pub word_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Image {
    pub url: Url,
    pub alt: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Video {
    pub url: Url,
    /// `video` for `<video>`/`<source>` elements, `embed` for known video iframes
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Audio {
    pub url: Url,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub url: Url,
    pub text: String,
    pub extension: String,
}

/// Media referenced by a page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MediaPayload {
    pub images: Vec<Image>,
    pub videos: Vec<Video>,
    pub audio: Vec<Audio>,
    pub documents: Vec<Document>,
}

impl MediaPayload {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
            && self.videos.is_empty()
            && self.audio.is_empty()
            && self.documents.is_empty()
    }
}

/// The outcome of crawling one URL
#[derive(Debug, Serialize)]
pub struct PageResult {
    /// Normalized URL the page was requested as
    pub url: Url,
    /// URL after redirects
    pub final_url: Url,
    pub status: u16,
    pub fetched_at: DateTime<Utc>,
    pub load_time_ms: u64,
    pub content: PageContent,
    pub links: Vec<Link>,
    pub media: MediaPayload,
}

impl PageResult {
    /// Collects this page and every attached descendant, breadth first
    pub fn walk(&self) -> Vec<&PageResult> {
        let mut pages = vec![self];
        let mut index = 0;
        while index < pages.len() {
            let page = pages[index];
            for link in &page.links {
                if let Some(child) = link.child() {
                    pages.push(child.as_ref());
                }
            }
            index += 1;
        }
        pages
    }

    /// Number of links with an attached child page
    pub fn attached_children(&self) -> usize {
        self.links.iter().filter(|l| l.child().is_some()).count()
    }
}
