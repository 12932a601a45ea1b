//! Crawl orchestration
//!
//! This module contains the recursive crawl step that ties every component
//! together, including:
//! - Result caching and visited-URL de-duplication
//! - URL policy filtering and robots.txt compliance
//! - Fetching through the rate-limited, proxy-aware fetcher
//! - Content extraction and concurrent fan-out into child links
//! - Paginated crawls, cancellation and shutdown

use crate::config::{validate, Config};
use crate::crawler::fetcher::{ClientSettings, FetchError, Fetcher, RetryPolicy, SharedRenderer};
use crate::crawler::pagination::{HeuristicLastPage, LastPagePolicy};
use crate::crawler::{RateLimiter, UserAgentPool};
use crate::extract::{ContentExtractor, HtmlExtractor, Redactor};
use crate::model::PageResult;
use crate::proxy::ProxyManager;
use crate::render::RenderingBackend;
use crate::robots::RobotsCache;
use crate::state::{PageCache, VisitedSet};
use crate::url::{
    extract_domain, normalize_parsed, normalize_url, with_query_param, UrlFilter,
};
use crate::{ConfigError, LanternError, Result, UrlError};
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

struct CrawlerInner {
    config: Config,
    user_agent: String,
    filter: UrlFilter,
    fetcher: Fetcher,
    rate_limiter: Arc<RateLimiter>,
    proxies: Option<ProxyManager>,
    robots: Option<RobotsCache>,
    cache: PageCache,
    visited: VisitedSet,
    extractor: Arc<dyn ContentExtractor>,
    redactor: Option<Redactor>,
    last_page: Box<dyn LastPagePolicy>,
    renderer: Option<SharedRenderer>,
    /// Cancelled only by `close`
    session: CancellationToken,
    /// Child of `session`, replaced after every `cancel`
    crawl_token: Mutex<CancellationToken>,
    pages_fetched: AtomicUsize,
    closed: AtomicBool,
}

/// Configures optional collaborators before building a [`Crawler`]
pub struct CrawlerBuilder {
    config: Config,
    extractor: Option<Arc<dyn ContentExtractor>>,
    renderer: Option<Box<dyn RenderingBackend>>,
    last_page: Option<Box<dyn LastPagePolicy>>,
}

impl CrawlerBuilder {
    /// Replaces the default [`HtmlExtractor`]
    pub fn with_extractor(mut self, extractor: impl ContentExtractor + 'static) -> Self {
        self.extractor = Some(Arc::new(extractor));
        self
    }

    /// Attaches the backend used when `use-rendering-backend` is enabled
    pub fn with_rendering_backend(mut self, backend: impl RenderingBackend + 'static) -> Self {
        self.renderer = Some(Box::new(backend));
        self
    }

    /// Replaces the default [`HeuristicLastPage`] policy of paginated crawls
    pub fn with_last_page_policy(mut self, policy: impl LastPagePolicy + 'static) -> Self {
        self.last_page = Some(Box::new(policy));
        self
    }

    /// Validates the configuration and assembles the crawler
    ///
    /// # Errors
    ///
    /// * `LanternError::Config` - invalid configuration, or rendering enabled
    ///   without a backend
    /// * `LanternError::Reqwest` - the HTTP client could not be built
    /// * `LanternError::Io` / `LanternError::Json` - unreadable proxy list, state
    ///   file or user agents file
    pub fn build(self) -> Result<Crawler> {
        let config = self.config;
        validate(&config)?;

        let renderer = match (config.crawler.use_rendering_backend, self.renderer) {
            (true, Some(backend)) => Some(Arc::new(tokio::sync::Mutex::new(backend))),
            (true, None) => {
                return Err(ConfigError::Validation(
                    "use-rendering-backend is enabled but no rendering backend was provided"
                        .to_string(),
                )
                .into())
            }
            (false, Some(_)) => {
                tracing::warn!("Rendering backend ignored: use-rendering-backend is disabled");
                None
            }
            (false, None) => None,
        };

        let settings = ClientSettings::from_config(&config);
        let client = settings.build(None)?;
        let session = CancellationToken::new();
        let rate_limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));

        let proxies = if config.proxy.use_proxies {
            let manager = ProxyManager::from_config(&config.proxy, settings.clone(), session.clone())?;
            tracing::info!("Proxy pool loaded with {} proxies", manager.len());
            Some(manager)
        } else {
            None
        };

        let mut fetcher = Fetcher::new(
            client.clone(),
            rate_limiter.clone(),
            RetryPolicy::from_config(&config),
            config.crawler.max_concurrent_fetches as usize,
        );
        match (&renderer, &proxies) {
            (Some(renderer), _) => {
                if proxies.is_some() {
                    tracing::warn!("Proxies are not used while rendering through a backend");
                }
                fetcher = fetcher.with_renderer(renderer.clone());
            }
            (None, Some(manager)) => fetcher = fetcher.with_proxy_manager(manager.clone()),
            (None, None) => {}
        }

        let user_agents = UserAgentPool::from_config(&config.user_agent)?;
        if !user_agents.is_empty() {
            tracing::info!("Rotating {} user agents", user_agents.len());
            fetcher = fetcher.with_user_agents(user_agents);
        }

        let robots = config
            .crawler
            .respect_robots
            .then(|| RobotsCache::new(client, config.robots.ttl(), config.robots.error_ttl()));

        let inner = CrawlerInner {
            user_agent: config.user_agent.header_value(),
            filter: UrlFilter::from_config(&config.crawler)?,
            fetcher,
            rate_limiter,
            proxies,
            robots,
            cache: PageCache::new(config.cache.ttl(), config.cache.max_entries),
            visited: VisitedSet::new(config.crawler.visited_ttl()),
            extractor: self.extractor.unwrap_or_else(|| Arc::new(HtmlExtractor)),
            redactor: config
                .output
                .redact_sensitive
                .then(Redactor::new)
                .transpose()?,
            last_page: self
                .last_page
                .unwrap_or_else(|| Box::new(HeuristicLastPage::from_config(&config.pagination))),
            renderer,
            crawl_token: Mutex::new(session.child_token()),
            session,
            pages_fetched: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            config,
        };

        tracing::debug!(
            "Crawler ready (user agent {}, robots {}, max depth {})",
            inner.user_agent,
            if inner.robots.is_some() { "respected" } else { "ignored" },
            inner.config.crawler.max_depth
        );

        Ok(Crawler {
            inner: Arc::new(inner),
        })
    }
}

/// A crawl session
///
/// Owns the shared caches, the rate limiter, the proxy pool and the HTTP
/// client. Cloning is cheap; clones share the session.
#[derive(Clone)]
pub struct Crawler {
    inner: Arc<CrawlerInner>,
}

impl Crawler {
    /// Creates a crawler with the default collaborators
    pub fn setup(config: Config) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: Config) -> CrawlerBuilder {
        CrawlerBuilder {
            config,
            extractor: None,
            renderer: None,
            last_page: None,
        }
    }

    /// Crawls `url` and, recursively, its links down to `depth` levels
    ///
    /// Depth 1 fetches only `url`, and `depth` is capped at the configured
    /// `max-depth`. Returns `Ok(None)` when nothing was
    /// crawled: depth 0, an already visited URL, a policy rejection, or a
    /// failed fetch. Repeating a crawl of the same URL while its result is
    /// cached returns the cached page without fetching it again.
    ///
    /// # Errors
    ///
    /// * `LanternError::UrlError` / `LanternError::UrlParse` - invalid seed URL
    /// * `LanternError::Cancelled` - `cancel` or `close` was called meanwhile
    /// * `LanternError::CrawlTimeout` - the overall crawl timeout elapsed
    /// * `LanternError::Closed` - the crawler was closed before the call
    pub async fn crawl(&self, url: &str, depth: u32) -> Result<Option<Arc<PageResult>>> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(LanternError::Closed);
        }

        let url = normalize_url(url)?;
        let root_domain: Arc<str> = extract_domain(&url)
            .ok_or(UrlError::MissingDomain)?
            .into();
        let cancel = self.crawl_token();

        let max_depth = self.inner.config.crawler.max_depth;
        if depth > max_depth {
            tracing::info!("Limiting crawl depth {} to max-depth {}", depth, max_depth);
        }
        let depth = depth.min(max_depth);

        tracing::info!("Crawling {} (depth {})", url, depth);
        let step = crawl_step(self.inner.clone(), url, depth, root_domain, true, cancel);

        match self.inner.config.crawler.crawl_timeout() {
            Some(limit) => match tokio::time::timeout(limit, step).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!("Crawl exceeded its timeout of {:?}", limit);
                    Err(LanternError::CrawlTimeout(limit))
                }
            },
            None => step.await,
        }
    }

    /// Crawls `base_url` page by page through the `page_param` query parameter
    ///
    /// Pages are numbered from 1 to `max_pages`. The crawl stops early when a
    /// page yields nothing or the last-page policy judges it the last one.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Listing URL; an existing `page_param` value is replaced
    /// * `depth_per_page` - Crawl depth applied to every listing page
    /// * `page_param` - Query parameter carrying the page number
    /// * `max_pages` - Upper bound on listing pages fetched
    ///
    /// # Example
    ///
    /// ```no_run
    /// # async fn run() -> lantern_crawl::Result<()> {
    /// use lantern_crawl::{Config, Crawler};
    ///
    /// let crawler = Crawler::setup(Config::default())?;
    /// let pages = crawler
    ///     .crawl_paginated("https://example.com/articles", 1, "page", 10)
    ///     .await?;
    /// println!("Crawled {} listing pages", pages.len());
    /// crawler.close().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn crawl_paginated(
        &self,
        base_url: &str,
        depth_per_page: u32,
        page_param: &str,
        max_pages: u32,
    ) -> Result<Vec<Arc<PageResult>>> {
        let base = normalize_url(base_url)?;
        let mut pages = Vec::new();

        for number in 1..=max_pages {
            let url = with_query_param(&base, page_param, &number.to_string());
            tracing::info!("Crawling page {}/{}: {}", number, max_pages, url);

            let Some(page) = self.crawl(url.as_str(), depth_per_page).await? else {
                tracing::info!("Page {} yielded nothing, stopping pagination", number);
                break;
            };

            let last = self.inner.last_page.is_last_page(&page);
            pages.push(page);
            if last {
                tracing::info!("Page {} looks like the last page", number);
                break;
            }
        }

        Ok(pages)
    }

    /// Cancels in-flight crawls; the crawler stays usable
    pub fn cancel(&self) {
        let mut token = self
            .inner
            .crawl_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        token.cancel();
        *token = self.inner.session.child_token();
        tracing::info!("Crawl cancelled");
    }

    /// Shuts the session down
    ///
    /// Cancels in-flight crawls and the proxy verification sweep, saves
    /// proxy state when a state file is configured, and closes the
    /// rendering backend. Every step runs even when an earlier one fails;
    /// the first error is returned. Calling it again does nothing.
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        tracing::info!("Closing crawler");
        self.inner.session.cancel();
        let mut first_error = None;

        if let (Some(proxies), Some(state_file)) =
            (&self.inner.proxies, &self.inner.config.proxy.state_file)
        {
            if let Err(e) = proxies.save_state(Path::new(state_file)) {
                tracing::error!("Failed to save proxy state to {}: {}", state_file, e);
                first_error.get_or_insert(e);
            }
        }

        if let Some(renderer) = &self.inner.renderer {
            if let Err(e) = renderer.lock().await.close().await {
                tracing::error!("Failed to close rendering backend: {}", e);
                first_error.get_or_insert(e.into());
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.inner.rate_limiter
    }

    pub fn proxy_manager(&self) -> Option<&ProxyManager> {
        self.inner.proxies.as_ref()
    }

    pub fn page_cache(&self) -> &PageCache {
        &self.inner.cache
    }

    pub fn visited(&self) -> &VisitedSet {
        &self.inner.visited
    }

    pub fn robots(&self) -> Option<&RobotsCache> {
        self.inner.robots.as_ref()
    }

    /// Number of URLs handed to the fetcher in this session
    pub fn pages_fetched(&self) -> usize {
        self.inner.pages_fetched.load(Ordering::SeqCst)
    }

    fn crawl_token(&self) -> CancellationToken {
        self.inner
            .crawl_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// One recursion step: crawls `url`, then its links with `depth - 1`
///
/// `url` must already be normalized. Only the top-level step returns a
/// cached page; nested steps treat a cache hit as already visited so the
/// result graph never contains cycles.
fn crawl_step(
    inner: Arc<CrawlerInner>,
    url: Url,
    depth: u32,
    root_domain: Arc<str>,
    is_root: bool,
    cancel: CancellationToken,
) -> BoxFuture<'static, Result<Option<Arc<PageResult>>>> {
    async move {
        if depth == 0 {
            return Ok(None);
        }
        if cancel.is_cancelled() {
            return Err(LanternError::Cancelled);
        }

        if let Some(page) = inner.cache.get(&url) {
            tracing::debug!("Cache hit for {}", url);
            return Ok(is_root.then_some(page));
        }

        if inner.visited.contains(&url) {
            tracing::debug!("Already visited {}", url);
            return Ok(None);
        }

        if let Err(reason) = inner.filter.check(&url, &root_domain) {
            tracing::info!("Skipping {}: {}", url, reason);
            return Ok(None);
        }

        let max_pages = inner.config.crawler.max_pages;
        if max_pages.is_some_and(|max| inner.pages_fetched.load(Ordering::SeqCst) >= max) {
            tracing::debug!("Page budget exhausted, skipping {}", url);
            return Ok(None);
        }

        if let Some(robots) = &inner.robots {
            if !robots.is_allowed(&url, &inner.user_agent, &cancel).await {
                tracing::info!("Disallowed by robots.txt: {}", url);
                return Ok(None);
            }
            if cancel.is_cancelled() {
                return Err(LanternError::Cancelled);
            }
            if let (Some(delay), Some(domain)) = (
                robots.crawl_delay(&url, &inner.user_agent),
                extract_domain(&url),
            ) {
                inner.rate_limiter.set_crawl_delay(&domain, delay);
            }
        }

        if !inner.visited.mark(&url) {
            tracing::debug!("Lost the race for {}", url);
            return Ok(None);
        }

        let fetched_before = inner.pages_fetched.fetch_add(1, Ordering::SeqCst);
        if max_pages.is_some_and(|max| fetched_before >= max) {
            tracing::debug!("Page budget exhausted, skipping {}", url);
            return Ok(None);
        }

        let fetched = match inner.fetcher.fetch(&url, &cancel).await {
            Ok(fetched) => fetched,
            Err(FetchError::Cancelled) => return Err(LanternError::Cancelled),
            Err(e) => {
                tracing::warn!(
                    "Failed to fetch {} after {} attempt(s): {}",
                    url,
                    e.attempts(),
                    e
                );
                return Ok(None);
            }
        };

        if fetched.final_url != url {
            if let Ok(final_url) = normalize_parsed(fetched.final_url.clone()) {
                inner.visited.mark(&final_url);
            }
        }

        let (links, media, mut content) = inner
            .extractor
            .extract_all(&fetched.body, &fetched.final_url);
        if let Some(redactor) = &inner.redactor {
            redactor.redact_content(&mut content);
        }
        tracing::debug!(
            "Fetched {} ({} links, {} ms, {} attempt(s))",
            url,
            links.len(),
            fetched.elapsed_ms,
            fetched.attempts
        );

        let page = Arc::new(PageResult {
            url: url.clone(),
            final_url: fetched.final_url,
            status: fetched.status,
            fetched_at: Utc::now(),
            load_time_ms: fetched.elapsed_ms,
            content,
            links,
            media,
        });
        inner.cache.put(&url, page.clone());

        if depth > 1 {
            crawl_children(&inner, &page, depth - 1, &root_domain, &cancel).await;
            if cancel.is_cancelled() {
                return Err(LanternError::Cancelled);
            }
        }

        Ok(Some(page))
    }
    .boxed()
}

/// Crawls the links of `page` concurrently and attaches the results
///
/// A failed child is left unattached; it never aborts its siblings.
async fn crawl_children(
    inner: &Arc<CrawlerInner>,
    page: &PageResult,
    depth: u32,
    root_domain: &Arc<str>,
    cancel: &CancellationToken,
) {
    let mut seen = HashSet::new();
    let mut children = JoinSet::new();

    for (index, link) in page.links.iter().enumerate() {
        if !link.classification.is_crawlable() {
            continue;
        }
        let Ok(child_url) = normalize_parsed(link.url.clone()) else {
            continue;
        };
        if !seen.insert(child_url.to_string()) || inner.visited.contains(&child_url) {
            continue;
        }

        let step = crawl_step(
            inner.clone(),
            child_url,
            depth,
            root_domain.clone(),
            false,
            cancel.clone(),
        );
        children.spawn(async move { (index, step.await) });
    }

    while let Some(joined) = children.join_next().await {
        match joined {
            Ok((index, Ok(Some(child)))) => {
                page.links[index].attach_child(child);
            }
            Ok((_, Ok(None))) => {}
            Ok((index, Err(e))) => {
                tracing::debug!("Child crawl of {} ended: {}", page.links[index].url, e)
            }
            Err(e) => tracing::warn!("Child crawl task failed: {}", e),
        }
    }
}
