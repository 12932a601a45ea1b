//! Output writer trait and summary types
//!
//! This module defines the trait interface for export writers and the
//! aggregate statistics shared by the writers and the CLI.

use crate::model::PageResult;
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Writes crawl results to a file in one export format
pub trait OutputWriter {
    /// File extension of the format, without the dot
    fn extension(&self) -> &'static str;

    /// Writes `pages` and their attached descendants to `path`
    fn write(&self, pages: &[Arc<PageResult>], path: &Path) -> Result<()>;
}

/// Aggregate statistics over every page of a crawl
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub generated_at: DateTime<Utc>,

    /// URLs the crawl started from
    pub roots: Vec<String>,

    // Overall statistics
    pub total_pages: u64,
    pub unique_domains: u64,
    pub total_links: u64,
    pub total_words: u64,
    pub total_load_ms: u64,

    // Link breakdown (classification -> count)
    pub links_by_classification: BTreeMap<String, u64>,

    // Media totals
    pub total_images: u64,
    pub total_videos: u64,
    pub total_audio: u64,
    pub total_documents: u64,

    // Status breakdown (HTTP status -> count)
    pub status_breakdown: BTreeMap<u16, u64>,

    /// Sorted list of crawled domains
    pub domains: Vec<String>,
}

impl Default for CrawlSummary {
    fn default() -> Self {
        Self {
            generated_at: Utc::now(),
            roots: Vec::new(),
            total_pages: 0,
            unique_domains: 0,
            total_links: 0,
            total_words: 0,
            total_load_ms: 0,
            links_by_classification: BTreeMap::new(),
            total_images: 0,
            total_videos: 0,
            total_audio: 0,
            total_documents: 0,
            status_breakdown: BTreeMap::new(),
            domains: Vec::new(),
        }
    }
}

impl CrawlSummary {
    /// Creates a new empty crawl summary
    pub fn new() -> Self {
        Self::default()
    }

    /// Mean page load time in milliseconds
    pub fn average_load_ms(&self) -> f64 {
        if self.total_pages == 0 {
            return 0.0;
        }
        self.total_load_ms as f64 / self.total_pages as f64
    }

    /// Mean number of words per page
    pub fn average_words(&self) -> f64 {
        if self.total_pages == 0 {
            return 0.0;
        }
        self.total_words as f64 / self.total_pages as f64
    }

    /// Total number of media items of every kind
    pub fn total_media(&self) -> u64 {
        self.total_images + self.total_videos + self.total_audio + self.total_documents
    }
}
