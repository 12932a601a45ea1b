use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure for Lantern
///
/// Every section and field has a default, so an empty file is a valid
/// configuration. Unknown keys are rejected at load time.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default, rename = "rate-limit")]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub robots: RobotsConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default, rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Crawl traversal behavior
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CrawlerConfig {
    /// Maximum depth used when the caller does not pass one
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// Fetch pages through the attached rendering backend instead of plain HTTP
    #[serde(rename = "use-rendering-backend", default)]
    pub use_rendering_backend: bool,

    /// Consult robots.txt before every fetch
    #[serde(rename = "respect-robots", default = "default_true")]
    pub respect_robots: bool,

    /// Follow links into subdomains of the seed's domain
    #[serde(rename = "allow-subdomains", default)]
    pub allow_subdomains: bool,

    /// Follow links to unrelated domains
    #[serde(rename = "follow-external", default)]
    pub follow_external: bool,

    /// Refuse localhost and private network addresses
    #[serde(rename = "block-private-hosts", default)]
    pub block_private_hosts: bool,

    /// Only URLs matching this regex are crawled
    #[serde(rename = "include-pattern", default)]
    pub include_pattern: Option<String>,

    /// URLs matching this regex are never crawled
    #[serde(rename = "exclude-pattern", default)]
    pub exclude_pattern: Option<String>,

    /// Global ceiling on in-flight fetches across the whole session
    #[serde(
        rename = "max-concurrent-fetches",
        default = "default_max_concurrent_fetches"
    )]
    pub max_concurrent_fetches: u32,

    /// Optional total page budget for the session
    #[serde(rename = "max-pages", default)]
    pub max_pages: Option<usize>,

    /// How long a visited URL is skipped before it may be fetched again (seconds)
    #[serde(rename = "visited-ttl-secs", default = "default_visited_ttl_secs")]
    pub visited_ttl_secs: u64,

    /// Optional deadline for a whole top-level crawl (seconds)
    #[serde(rename = "crawl-timeout-secs", default)]
    pub crawl_timeout_secs: Option<u64>,
}

/// Adaptive rate limiting configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Target steady-state request rate per domain
    #[serde(
        rename = "requests-per-second",
        default = "default_requests_per_second"
    )]
    pub requests_per_second: f64,

    /// Requests per window that receive half the computed delay
    #[serde(rename = "burst-allowance", default = "default_burst_allowance")]
    pub burst_allowance: u32,

    /// Length of the rolling burst window (seconds)
    #[serde(rename = "window-secs", default = "default_window_secs")]
    pub window_secs: u64,
}

/// Retry and timeout configuration for individual fetches
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts per URL
    #[serde(rename = "retry-count", default = "default_retry_count")]
    pub retry_count: u32,

    /// Base delay between attempts (milliseconds), doubled each attempt
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Overall timeout of a single request (seconds)
    #[serde(
        rename = "request-timeout-secs",
        default = "default_request_timeout_secs"
    )]
    pub request_timeout_secs: u64,

    /// Idle pooled connections kept per host
    #[serde(
        rename = "pool-max-idle-per-host",
        default = "default_pool_max_idle_per_host"
    )]
    pub pool_max_idle_per_host: usize,
}

/// Proxy rotation configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    /// Route fetches through the proxy pool
    #[serde(rename = "use-proxies", default)]
    pub use_proxies: bool,

    /// Inline proxy addresses (e.g. "http://10.0.0.1:8080")
    #[serde(default)]
    pub proxies: Vec<String>,

    /// File with one proxy address per line
    #[serde(rename = "proxy-file", default)]
    pub proxy_file: Option<String>,

    /// JSON file used to persist proxy health between runs
    #[serde(rename = "state-file", default)]
    pub state_file: Option<String>,

    /// Minimum health score for a proxy to stay in rotation
    #[serde(rename = "min-score", default = "default_min_score")]
    pub min_score: f64,

    /// URL requested when verifying a proxy
    #[serde(rename = "verify-url", default = "default_verify_url")]
    pub verify_url: String,

    /// Timeout of a verification request (seconds)
    #[serde(
        rename = "verify-timeout-secs",
        default = "default_verify_timeout_secs"
    )]
    pub verify_timeout_secs: u64,
}

/// Page result cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    #[serde(rename = "max-entries", default = "default_cache_max_entries")]
    pub max_entries: usize,

    #[serde(rename = "ttl-secs", default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

/// robots.txt cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RobotsConfig {
    #[serde(rename = "ttl-secs", default = "default_robots_ttl_secs")]
    pub ttl_secs: u64,

    /// TTL of the permissive rule set cached after a failed fetch
    #[serde(rename = "error-ttl-secs", default = "default_robots_error_ttl_secs")]
    pub error_ttl_secs: u64,
}

/// Thresholds of the default last-page heuristic
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PaginationConfig {
    #[serde(
        rename = "min-content-length",
        default = "default_min_content_length"
    )]
    pub min_content_length: usize,

    #[serde(rename = "min-links", default = "default_min_links")]
    pub min_links: usize,

    #[serde(rename = "next-label", default = "default_next_label")]
    pub next_label: String,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UserAgentConfig {
    /// Name of the crawler, also the robots.txt agent token
    #[serde(rename = "crawler-name", default = "default_crawler_name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version", default = "default_crawler_version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url", default)]
    pub contact_url: Option<String>,

    /// User-Agent strings rotated across requests instead of the crawler's own
    #[serde(default)]
    pub agents: Vec<String>,

    /// File with one User-Agent per line, added to `agents`
    #[serde(rename = "agents-file", default)]
    pub agents_file: Option<String>,
}

/// Export formats understood by the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Csv,
    Markdown,
    All,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default = "default_output_format")]
    pub format: OutputFormat,

    /// Path stem; the extension is chosen per format
    #[serde(default = "default_output_path")]
    pub path: String,

    /// Replace emails, phone numbers, SSNs and card numbers in page content
    #[serde(rename = "redact-sensitive", default)]
    pub redact_sensitive: bool,
}

impl CrawlerConfig {
    pub fn visited_ttl(&self) -> Duration {
        Duration::from_secs(self.visited_ttl_secs)
    }

    pub fn crawl_timeout(&self) -> Option<Duration> {
        self.crawl_timeout_secs.map(Duration::from_secs)
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl RetryConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl ProxyConfig {
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl RobotsConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn error_ttl(&self) -> Duration {
        Duration::from_secs(self.error_ttl_secs)
    }
}

impl UserAgentConfig {
    /// Formats the full User-Agent header value
    ///
    /// Format: `Name/Version (+ContactURL)`, or `Name/Version` without a contact URL.
    pub fn header_value(&self) -> String {
        match &self.contact_url {
            Some(contact) => format!(
                "{}/{} (+{})",
                self.crawler_name, self.crawler_version, contact
            ),
            None => format!("{}/{}", self.crawler_name, self.crawler_version),
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            use_rendering_backend: false,
            respect_robots: true,
            allow_subdomains: false,
            follow_external: false,
            block_private_hosts: false,
            include_pattern: None,
            exclude_pattern: None,
            max_concurrent_fetches: default_max_concurrent_fetches(),
            max_pages: None,
            visited_ttl_secs: default_visited_ttl_secs(),
            crawl_timeout_secs: None,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            burst_allowance: default_burst_allowance(),
            window_secs: default_window_secs(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            use_proxies: false,
            proxies: Vec::new(),
            proxy_file: None,
            state_file: None,
            min_score: default_min_score(),
            verify_url: default_verify_url(),
            verify_timeout_secs: default_verify_timeout_secs(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_cache_max_entries(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_robots_ttl_secs(),
            error_ttl_secs: default_robots_error_ttl_secs(),
        }
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            min_content_length: default_min_content_length(),
            min_links: default_min_links(),
            next_label: default_next_label(),
        }
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: default_crawler_name(),
            crawler_version: default_crawler_version(),
            contact_url: None,
            agents: Vec::new(),
            agents_file: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_output_format(),
            path: default_output_path(),
            redact_sensitive: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_depth() -> u32 {
    2
}

fn default_max_concurrent_fetches() -> u32 {
    16
}

fn default_visited_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_requests_per_second() -> f64 {
    1.0
}

fn default_burst_allowance() -> u32 {
    2
}

fn default_window_secs() -> u64 {
    60
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_pool_max_idle_per_host() -> usize {
    8
}

fn default_min_score() -> f64 {
    0.25
}

fn default_verify_url() -> String {
    "https://httpbin.org/ip".to_string()
}

fn default_verify_timeout_secs() -> u64 {
    10
}

fn default_cache_max_entries() -> usize {
    1000
}

fn default_cache_ttl_secs() -> u64 {
    60 * 60
}

fn default_robots_ttl_secs() -> u64 {
    60 * 60
}

fn default_robots_error_ttl_secs() -> u64 {
    5 * 60
}

fn default_min_content_length() -> usize {
    1000
}

fn default_min_links() -> usize {
    5
}

fn default_next_label() -> String {
    "next".to_string()
}

fn default_crawler_name() -> String {
    "LanternCrawl".to_string()
}

fn default_crawler_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_output_format() -> OutputFormat {
    OutputFormat::Json
}

fn default_output_path() -> String {
    "crawl-output".to_string()
}
