use crate::config::types::{
    CacheConfig, Config, CrawlerConfig, OutputConfig, PaginationConfig, ProxyConfig,
    RateLimitConfig, RetryConfig, UserAgentConfig,
};
use crate::ConfigError;
use regex::Regex;
use reqwest::header::HeaderValue;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_rate_limit_config(&config.rate_limit)?;
    validate_retry_config(&config.retry)?;
    validate_proxy_config(&config.proxy)?;
    validate_cache_config(&config.cache)?;
    validate_pagination_config(&config.pagination)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_fetches < 1 || config.max_concurrent_fetches > 256 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent-fetches must be between 1 and 256, got {}",
            config.max_concurrent_fetches
        )));
    }

    if config.max_pages == Some(0) {
        return Err(ConfigError::Validation(
            "max-pages must be >= 1 when set".to_string(),
        ));
    }

    if config.crawl_timeout_secs == Some(0) {
        return Err(ConfigError::Validation(
            "crawl-timeout-secs must be >= 1 when set".to_string(),
        ));
    }

    if let Some(pattern) = &config.include_pattern {
        validate_pattern("include-pattern", pattern)?;
    }

    if let Some(pattern) = &config.exclude_pattern {
        validate_pattern("exclude-pattern", pattern)?;
    }

    Ok(())
}

fn validate_pattern(name: &str, pattern: &str) -> Result<(), ConfigError> {
    Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidPattern(format!("{} '{}': {}", name, pattern, e)))
}

/// Validates rate limit configuration
fn validate_rate_limit_config(config: &RateLimitConfig) -> Result<(), ConfigError> {
    let rps = config.requests_per_second;
    if !rps.is_finite() || rps <= 0.0 || rps > 100.0 {
        return Err(ConfigError::Validation(format!(
            "requests-per-second must be > 0 and <= 100, got {}",
            rps
        )));
    }

    if config.window_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "window-secs must be >= 1, got {}",
            config.window_secs
        )));
    }

    Ok(())
}

/// Validates retry configuration
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.retry_count < 1 || config.retry_count > 10 {
        return Err(ConfigError::Validation(format!(
            "retry-count must be between 1 and 10, got {}",
            config.retry_count
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "request-timeout-secs must be >= 1, got {}",
            config.request_timeout_secs
        )));
    }

    Ok(())
}

/// Validates proxy configuration
fn validate_proxy_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&config.min_score) {
        return Err(ConfigError::Validation(format!(
            "min-score must be within [0, 1], got {}",
            config.min_score
        )));
    }

    if config.use_proxies && config.proxies.is_empty() && config.proxy_file.is_none() {
        return Err(ConfigError::Validation(
            "use-proxies requires 'proxies' or 'proxy-file'".to_string(),
        ));
    }

    Url::parse(&config.verify_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid verify-url: {}", e)))?;

    Ok(())
}

fn validate_cache_config(config: &CacheConfig) -> Result<(), ConfigError> {
    if config.max_entries < 1 {
        return Err(ConfigError::Validation(
            "cache max-entries must be >= 1".to_string(),
        ));
    }
    Ok(())
}

fn validate_pagination_config(config: &PaginationConfig) -> Result<(), ConfigError> {
    if config.next_label.trim().is_empty() {
        return Err(ConfigError::Validation(
            "pagination next-label cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler-name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler-name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    if let Some(contact) = &config.contact_url {
        Url::parse(contact)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact-url: {}", e)))?;
    }

    for agent in &config.agents {
        if agent.trim().is_empty() || HeaderValue::from_str(agent).is_err() {
            return Err(ConfigError::Validation(format!(
                "user agent '{}' is not a valid header value",
                agent
            )));
        }
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.path.is_empty() {
        return Err(ConfigError::Validation(
            "output path cannot be empty".to_string(),
        ));
    }
    Ok(())
}
