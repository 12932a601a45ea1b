//! Shared crawl state: per-domain traffic statistics, the visited set and
//! the page result cache

mod domain_stats;
mod page_cache;
mod visited;

pub use domain_stats::{
    CircuitTransition, DelayPolicy, DomainStats, CIRCUIT_RESET_AFTER, MIN_DELAY,
    RESPONSE_TIME_SAMPLES,
};
pub use page_cache::PageCache;
pub use visited::VisitedSet;
