//! Rendering backend interface
//!
//! A rendering backend drives a real browser so pages that build their
//! content with JavaScript can be crawled. No backend ships with this crate;
//! callers attach one with [`crate::crawler::CrawlerBuilder::with_rendering_backend`].

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Failed to read page source: {0}")]
    PageSource(String),

    #[error("Backend is closed")]
    Closed,

    #[error("Backend error: {0}")]
    Other(String),
}

/// A headless browser session
///
/// Calls are serialized by the crawler: `navigate` and `page_source` are
/// never interleaved between two URLs.
#[async_trait]
pub trait RenderingBackend: Send {
    /// Loads `url` and waits until it is rendered
    async fn navigate(&mut self, url: &str) -> Result<(), RenderError>;

    /// Returns the rendered HTML of the current page
    async fn page_source(&mut self) -> Result<String, RenderError>;

    /// Releases the browser; further calls may fail with [`RenderError::Closed`]
    async fn close(&mut self) -> Result<(), RenderError>;
}
