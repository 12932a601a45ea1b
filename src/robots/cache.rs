//! Per-domain robots.txt cache

use crate::robots::RobotsRuleSet;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

#[derive(Debug, Clone)]
struct CachedRobots {
    rules: Arc<RobotsRuleSet>,
    cached_at: Instant,
    ttl: Duration,
}

impl CachedRobots {
    fn is_stale(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.cached_at) >= self.ttl
    }
}

/// Fetches and caches robots.txt rules per origin
///
/// A successful fetch is cached for `ttl`. A missing file, an error status or
/// a network failure caches a permissive rule set for the shorter `error_ttl`.
/// Concurrent lookups of an uncached origin share a single fetch.
pub struct RobotsCache {
    client: reqwest::Client,
    entries: Mutex<HashMap<String, CachedRobots>>,
    fetch_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    ttl: Duration,
    error_ttl: Duration,
}

impl RobotsCache {
    pub fn new(client: reqwest::Client, ttl: Duration, error_ttl: Duration) -> Self {
        Self {
            client,
            entries: Mutex::new(HashMap::new()),
            fetch_locks: Mutex::new(HashMap::new()),
            ttl,
            error_ttl,
        }
    }

    /// Checks whether `user_agent` may fetch `url`
    ///
    /// Fetches robots.txt on first use of a domain. If `cancel` fires while
    /// fetching, nothing is cached and the URL is reported as allowed.
    ///
    /// # Arguments
    ///
    /// * `url` - URL about to be crawled
    /// * `user_agent` - Agent matched against `User-agent` groups
    /// * `cancel` - Aborts a pending robots.txt fetch
    ///
    /// # Example
    ///
    /// ```no_run
    /// # async fn run() {
    /// use lantern_crawl::robots::RobotsCache;
    /// use std::time::Duration;
    /// use tokio_util::sync::CancellationToken;
    /// use url::Url;
    ///
    /// let cache = RobotsCache::new(
    ///     reqwest::Client::new(),
    ///     Duration::from_secs(3600),
    ///     Duration::from_secs(300),
    /// );
    /// let url = Url::parse("https://example.com/private/page").unwrap();
    /// let allowed = cache
    ///     .is_allowed(&url, "LanternCrawl", &CancellationToken::new())
    ///     .await;
    /// # }
    /// ```
    pub async fn is_allowed(&self, url: &Url, user_agent: &str, cancel: &CancellationToken) -> bool {
        match self.rules_for(url, cancel).await {
            Some(rules) => rules.is_allowed(&path_and_query(url), user_agent),
            None => true,
        }
    }

    /// Crawl-delay from the cached rules of `url`'s domain, without fetching
    pub fn crawl_delay(&self, url: &Url, user_agent: &str) -> Option<Duration> {
        let key = origin_key(url)?;
        let entries = self.lock();
        entries.get(&key).and_then(|c| c.rules.crawl_delay(user_agent))
    }

    /// Returns the rule set for `url`'s domain, fetching it when missing or stale
    ///
    /// Returns `None` only when cancelled or when `url` has no host.
    pub async fn rules_for(
        &self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Option<Arc<RobotsRuleSet>> {
        let key = origin_key(url)?;

        if let Some(cached) = self.cached(&key) {
            return Some(cached);
        }

        let robots_url = robots_url(url)?;
        let fetch_lock = self.fetch_lock(&key);
        let _fetching = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            guard = fetch_lock.lock() => guard,
        };

        // Filled in by whichever task held the lock before us
        if let Some(cached) = self.cached(&key) {
            return Some(cached);
        }

        let (rules, ttl) = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Robots fetch for {} cancelled", robots_url);
                return None;
            }
            fetched = self.fetch(&robots_url) => fetched,
        };

        let rules = Arc::new(rules);
        self.lock().insert(
            key,
            CachedRobots {
                rules: rules.clone(),
                cached_at: Instant::now(),
                ttl,
            },
        );
        Some(rules)
    }

    /// Number of cached domains, stale ones included
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cached(&self, key: &str) -> Option<Arc<RobotsRuleSet>> {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(cached) if !cached.is_stale(now) => Some(cached.rules.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn fetch_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.fetch_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    async fn fetch(&self, robots_url: &Url) -> (RobotsRuleSet, Duration) {
        tracing::debug!("Fetching {}", robots_url);

        let response = match self.client.get(robots_url.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("Failed to fetch {}: {}", robots_url, e);
                return (RobotsRuleSet::allow_all(), self.error_ttl);
            }
        };

        let status = response.status();
        if status.as_u16() != 200 {
            tracing::debug!("{} returned HTTP {}, allowing all", robots_url, status);
            return (RobotsRuleSet::allow_all(), self.error_ttl);
        }

        match response.text().await {
            Ok(body) => (RobotsRuleSet::from_content(&body), self.ttl),
            Err(e) => {
                tracing::debug!("Failed to read {}: {}", robots_url, e);
                (RobotsRuleSet::allow_all(), self.error_ttl)
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CachedRobots>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The robots.txt location for `url`'s origin
pub fn robots_url(url: &Url) -> Option<Url> {
    url.host_str()?;
    let mut robots = url.clone();
    robots.set_path("/robots.txt");
    robots.set_query(None);
    robots.set_fragment(None);
    Some(robots)
}

fn origin_key(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    Some(match url.port_or_known_default() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}

fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}
