//! Lantern: a polite, depth-bounded web crawler
//!
//! This crate fetches a seed page, extracts its links and media, and recursively
//! crawls linked pages up to a configured depth while respecting robots.txt,
//! adaptive per-domain rate limits, and proxy health.

pub mod config;
pub mod crawler;
pub mod extract;
pub mod model;
pub mod output;
pub mod proxy;
pub mod render;
pub mod robots;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for Lantern operations
#[derive(Debug, Error)]
pub enum LanternError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Rendering backend error: {0}")]
    Render(#[from] render::RenderError),

    #[error("Crawl cancelled")]
    Cancelled,

    #[error("Crawl exceeded its overall timeout of {0:?}")]
    CrawlTimeout(std::time::Duration),

    #[error("Crawler has been closed")]
    Closed,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Lantern operations
pub type Result<T> = std::result::Result<T, LanternError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::{Config, Preset};
pub use crawler::Crawler;
pub use model::{Link, LinkClassification, PageResult};
pub use url::{extract_domain, normalize_url};
