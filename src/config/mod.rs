//! Configuration module for Lantern
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! plus the named presets exposed on the command line.
//!
//! # Example
//!
//! ```no_run
//! use lantern_crawl::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("lantern.toml")).unwrap();
//! println!("Crawler will use max depth: {}", config.crawler.max_depth);
//! ```

mod parser;
mod presets;
mod types;
mod validation;

// Re-export types
pub use types::{
    CacheConfig, Config, CrawlerConfig, OutputConfig, OutputFormat, PaginationConfig,
    ProxyConfig, RateLimitConfig, RetryConfig, RobotsConfig, UserAgentConfig,
};

pub use presets::Preset;

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};

pub use validation::validate;
