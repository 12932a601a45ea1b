//! End-of-listing detection for paginated crawls

use crate::config::PaginationConfig;
use crate::model::PageResult;

/// Decides whether a paginated crawl should stop after a page
pub trait LastPagePolicy: Send + Sync {
    fn is_last_page(&self, page: &PageResult) -> bool;
}

/// Treats short pages, link-poor pages, and pages without a "next" link as the last page
#[derive(Debug, Clone)]
pub struct HeuristicLastPage {
    pub min_content_length: usize,
    pub min_links: usize,
    /// Matched case-insensitively against anchor texts
    pub next_label: String,
}

impl HeuristicLastPage {
    pub fn from_config(config: &PaginationConfig) -> Self {
        Self {
            min_content_length: config.min_content_length,
            min_links: config.min_links,
            next_label: config.next_label.to_lowercase(),
        }
    }
}

impl Default for HeuristicLastPage {
    fn default() -> Self {
        Self::from_config(&PaginationConfig::default())
    }
}

impl LastPagePolicy for HeuristicLastPage {
    fn is_last_page(&self, page: &PageResult) -> bool {
        if page.content.text.chars().count() < self.min_content_length {
            return true;
        }
        if page.links.len() < self.min_links {
            return true;
        }
        !page
            .links
            .iter()
            .any(|link| link.text.to_lowercase().contains(&self.next_label))
    }
}
