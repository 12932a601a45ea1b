//! Robots.txt handling module
//!
//! This module fetches, parses, and caches robots.txt files per domain and
//! answers whether a path may be crawled.

mod cache;
mod parser;

pub use cache::{robots_url, RobotsCache};
pub use parser::RobotsRuleSet;
