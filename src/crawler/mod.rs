//! Crawler module for page fetching and crawl orchestration
//!
//! This module contains the core crawling logic, including:
//! - Adaptive per-domain rate limiting with circuit breaking
//! - HTTP fetching with proxies, user agent rotation, retries and backoff
//! - Recursive crawl orchestration with de-duplication and caching
//! - Pagination with a pluggable last-page policy

mod fetcher;
mod orchestrator;
mod pagination;
mod rate_limiter;
mod user_agents;

pub use fetcher::{
    ClientSettings, FetchError, FetchedPage, Fetcher, RetryPolicy, SharedRenderer,
    MAX_RETRY_AFTER,
};
pub use orchestrator::{Crawler, CrawlerBuilder};
pub use pagination::{HeuristicLastPage, LastPagePolicy};
pub use rate_limiter::{Cancelled, RateLimiter};
pub use user_agents::UserAgentPool;
