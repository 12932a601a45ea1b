//! HTTP fetcher implementation
//!
//! This module handles all page retrievals for the crawler, including:
//! - Building HTTP clients with the crawler's user agent string
//! - Per-domain rate limiting before every attempt
//! - Proxy rotation and proxy health reporting
//! - Retry logic with exponential backoff and Retry-After support
//! - Error classification into transient and permanent failures
//! - Routing through a rendering backend when one is attached

use crate::config::Config;
use crate::crawler::{RateLimiter, UserAgentPool};
use crate::proxy::ProxyManager;
use crate::render::{RenderError, RenderingBackend};
use crate::url::extract_domain;
use rand::Rng;
use reqwest::{header, redirect::Policy, Client, Proxy, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Upper bound on a server-requested Retry-After delay
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_REDIRECTS: usize = 10;

/// Shared handle to a rendering backend; one navigation at a time
pub type SharedRenderer = Arc<Mutex<Box<dyn RenderingBackend>>>;

/// Failure of a single fetch attempt, or of the whole retry loop
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP status {code}")]
    Status {
        code: u16,
        retry_after: Option<Duration>,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Proxy {proxy} failed: {message}")]
    Proxy { proxy: String, message: String },

    #[error("Not an HTML page (content type {content_type})")]
    NotHtml { content_type: String },

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("Fetch cancelled")]
    Cancelled,

    #[error("Giving up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Returns true for failures worth retrying
    ///
    /// | Condition | Retried |
    /// |-----------|---------|
    /// | HTTP 5xx, 429, 408 | yes |
    /// | Network error, timeout | yes |
    /// | Proxy fault | yes |
    /// | Rendering navigation failure | yes |
    /// | Other HTTP 4xx | no |
    /// | Non-HTML content | no |
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Status { code, .. } => {
                *code >= 500 || *code == 429 || *code == 408
            }
            FetchError::Network(_) | FetchError::Timeout(_) | FetchError::Proxy { .. } => true,
            FetchError::Render(e) => !matches!(e, RenderError::Closed),
            FetchError::NotHtml { .. } | FetchError::Cancelled | FetchError::Exhausted { .. } => {
                false
            }
        }
    }

    /// Number of attempts this error stands for
    pub fn attempts(&self) -> u32 {
        match self {
            FetchError::Exhausted { attempts, .. } => *attempts,
            _ => 1,
        }
    }

    /// Server-requested delay, honoured only on 429 and 503
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::Status {
                code: 429 | 503,
                retry_after,
            } => retry_after.map(|d| d.min(MAX_RETRY_AFTER)),
            _ => None,
        }
    }
}

/// A successfully retrieved HTML page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects
    pub final_url: Url,
    pub status: u16,
    pub body: String,
    /// Duration of the successful attempt
    pub elapsed_ms: u64,
    pub attempts: u32,
}

/// Settings shared by every HTTP client of a crawl session
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub user_agent: String,
    pub timeout: Duration,
    pub pool_max_idle_per_host: usize,
}

impl ClientSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            user_agent: config.user_agent.header_value(),
            timeout: config.retry.request_timeout(),
            pool_max_idle_per_host: config.retry.pool_max_idle_per_host,
        }
    }

    /// Builds a client, routed through `proxy` when given
    ///
    /// # Example
    ///
    /// ```no_run
    /// use lantern_crawl::config::Config;
    /// use lantern_crawl::crawler::ClientSettings;
    ///
    /// let settings = ClientSettings::from_config(&Config::default());
    /// let direct = settings.build(None).unwrap();
    /// let proxied = settings.build(Some("socks5://10.0.0.1:1080")).unwrap();
    /// ```
    pub fn build(&self, proxy: Option<&str>) -> Result<Client, reqwest::Error> {
        let mut builder = Client::builder()
            .user_agent(self.user_agent.as_str())
            .timeout(self.timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .gzip(true)
            .brotli(true);

        if let Some(proxy) = proxy {
            builder = builder.proxy(Proxy::all(proxy)?);
        }

        builder.build()
    }
}

/// Retry schedule of the fetcher
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry_count: config.retry.retry_count,
            retry_delay: config.retry.retry_delay(),
            request_timeout: config.retry.request_timeout(),
        }
    }

    /// Delay after failed attempt number `attempt` (1-based)
    ///
    /// `retry_delay × 2^(attempt−1) × jitter`, with jitter expected in [0.5, 1.5].
    pub fn backoff(&self, attempt: u32, jitter: f64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let secs = self.retry_delay.as_secs_f64() * 2f64.powi(exponent) * jitter;
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

/// Retrieves pages with rate limiting, proxies and retries
pub struct Fetcher {
    client: Client,
    rate_limiter: Arc<RateLimiter>,
    proxies: Option<ProxyManager>,
    renderer: Option<SharedRenderer>,
    user_agents: UserAgentPool,
    permits: Arc<Semaphore>,
    retry: RetryPolicy,
}

impl Fetcher {
    /// Creates a fetcher allowing at most `max_concurrent` requests in flight
    pub fn new(
        client: Client,
        rate_limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        max_concurrent: usize,
    ) -> Self {
        Self {
            client,
            rate_limiter,
            proxies: None,
            renderer: None,
            user_agents: UserAgentPool::default(),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            retry,
        }
    }

    pub fn with_proxy_manager(mut self, proxies: ProxyManager) -> Self {
        self.proxies = Some(proxies);
        self
    }

    /// Routes every fetch through `renderer`; proxies are not used then
    pub fn with_renderer(mut self, renderer: SharedRenderer) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Sends each request with an agent drawn from `user_agents`
    pub fn with_user_agents(mut self, user_agents: UserAgentPool) -> Self {
        self.user_agents = user_agents;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Fetches `url`, retrying transient failures
    ///
    /// # Arguments
    ///
    /// * `url` - Page to retrieve
    /// * `cancel` - Aborts rate-limiter waits, backoff sleeps and the request
    ///
    /// # Returns
    ///
    /// * `Ok(FetchedPage)` - An HTML page, with the attempt count that got it
    /// * `Err(FetchError::Cancelled)` - `cancel` fired
    /// * `Err(FetchError::Exhausted)` - Every attempt failed transiently; wraps the last error
    /// * `Err(_)` - A permanent failure, returned without retrying
    pub async fn fetch(&self, url: &Url, cancel: &CancellationToken) -> Result<FetchedPage, FetchError> {
        let domain = extract_domain(url).unwrap_or_default();
        let attempts = self.retry.retry_count.max(1);
        let mut last = None;

        for attempt in 1..=attempts {
            match self.attempt(url, &domain, cancel).await {
                Ok(mut page) => {
                    page.attempts = attempt;
                    return Ok(page);
                }
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    if attempt < attempts {
                        let delay = e.retry_after().unwrap_or_else(|| {
                            self.retry
                                .backoff(attempt, rand::thread_rng().gen_range(0.5..=1.5))
                        });
                        tracing::debug!(
                            "Attempt {}/{} for {} failed ({}), retrying in {:?}",
                            attempt,
                            attempts,
                            url,
                            e,
                            delay
                        );
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    last = Some(e);
                }
            }
        }

        match last {
            Some(last) => Err(FetchError::Exhausted {
                attempts,
                last: Box::new(last),
            }),
            None => Err(FetchError::Network("no attempt was made".to_string())),
        }
    }

    async fn attempt(
        &self,
        url: &Url,
        domain: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchedPage, FetchError> {
        // The start slot is reserved only once a permit is held, so requests
        // queued on the semaphore cannot start together when permits free up
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            permit = self.permits.acquire() => permit.map_err(|_| FetchError::Cancelled)?,
        };

        if let Some(renderer) = &self.renderer {
            return self.render(renderer, url, domain, cancel).await;
        }

        let (client, proxy) = match &self.proxies {
            Some(manager) => {
                let Some(address) = manager.next() else {
                    tracing::warn!("No proxy available for {}, not sending it directly", url);
                    return Err(FetchError::Proxy {
                        proxy: "none".to_string(),
                        message: "no proxy available".to_string(),
                    });
                };
                match manager.client_for(&address) {
                    Ok(client) => (client, Some(address)),
                    Err(e) => {
                        manager.report_failure(&address);
                        return Err(FetchError::Proxy {
                            proxy: address,
                            message: e.to_string(),
                        });
                    }
                }
            }
            None => (self.client.clone(), None),
        };

        self.rate_limiter
            .wait(domain, cancel)
            .await
            .map_err(|_| FetchError::Cancelled)?;

        let start = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            outcome = tokio::time::timeout(
                self.retry.request_timeout,
                get_page(&client, url, proxy.as_deref(), self.user_agents.pick()),
            ) => outcome,
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(result) => result.map(|mut page| {
                page.elapsed_ms = elapsed_ms;
                page
            }),
            Err(_) => Err(FetchError::Timeout(self.retry.request_timeout)),
        };

        self.report(domain, proxy.as_deref(), &result, elapsed_ms);
        result
    }

    async fn render(
        &self,
        renderer: &SharedRenderer,
        url: &Url,
        domain: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchedPage, FetchError> {
        let mut backend = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            backend = renderer.lock() => backend,
        };

        self.rate_limiter
            .wait(domain, cancel)
            .await
            .map_err(|_| FetchError::Cancelled)?;

        let start = Instant::now();
        let rendering = async {
            backend.navigate(url.as_str()).await?;
            backend.page_source().await
        };
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            outcome = tokio::time::timeout(self.retry.request_timeout, rendering) => outcome,
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(Ok(body)) => Ok(FetchedPage {
                final_url: url.clone(),
                status: StatusCode::OK.as_u16(),
                body,
                elapsed_ms,
                attempts: 1,
            }),
            Ok(Err(e)) => Err(FetchError::Render(e)),
            Err(_) => Err(FetchError::Timeout(self.retry.request_timeout)),
        };

        self.report(domain, None, &result, elapsed_ms);
        result
    }

    /// Reports the outcome of one attempt to the rate limiter and proxy pool
    ///
    /// Every failed attempt counts against the domain, permanent ones
    /// included. Any response from the origin counts as a success for the
    /// proxy that carried it.
    fn report(
        &self,
        domain: &str,
        proxy: Option<&str>,
        result: &Result<FetchedPage, FetchError>,
        elapsed_ms: u64,
    ) {
        self.rate_limiter
            .report_result(domain, result.is_ok(), elapsed_ms);

        if let (Some(manager), Some(proxy)) = (&self.proxies, proxy) {
            match result {
                Ok(_) | Err(FetchError::Status { .. }) | Err(FetchError::NotHtml { .. }) => {
                    manager.report_success(proxy, elapsed_ms)
                }
                Err(_) => manager.report_failure(proxy),
            }
        }
    }
}

async fn get_page(
    client: &Client,
    url: &Url,
    proxy: Option<&str>,
    user_agent: Option<&str>,
) -> Result<FetchedPage, FetchError> {
    let mut request = client.get(url.clone());
    if let Some(agent) = user_agent {
        request = request.header(header::USER_AGENT, agent);
    }
    let response = request
        .send()
        .await
        .map_err(|e| classify(e, proxy))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            code: status.as_u16(),
            retry_after: parse_retry_after(response.headers()),
        });
    }

    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if !is_html_content_type(content_type.as_deref()) {
        return Err(FetchError::NotHtml {
            content_type: content_type.unwrap_or_default(),
        });
    }

    let final_url = response.url().clone();
    let body = response.text().await.map_err(|e| classify(e, proxy))?;

    Ok(FetchedPage {
        final_url,
        status: status.as_u16(),
        body,
        elapsed_ms: 0,
        attempts: 1,
    })
}

fn classify(error: reqwest::Error, proxy: Option<&str>) -> FetchError {
    match proxy {
        Some(proxy) if error.is_connect() => FetchError::Proxy {
            proxy: proxy.to_string(),
            message: error.to_string(),
        },
        _ if error.is_timeout() => FetchError::Network(format!("timed out: {}", error)),
        _ => FetchError::Network(error.to_string()),
    }
}

/// Retry-After in its delay-seconds form
fn parse_retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Accepts a missing content type, any HTML or XML type, and other text types
fn is_html_content_type(content_type: Option<&str>) -> bool {
    match content_type {
        None => true,
        Some(value) => {
            let value = value.to_ascii_lowercase();
            value.contains("html") || value.contains("xml") || value.starts_with("text/")
        }
    }
}
