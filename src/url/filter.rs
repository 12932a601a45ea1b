use crate::config::CrawlerConfig;
use crate::url::domain::{extract_domain, is_private_host, is_same_or_subdomain};
use crate::ConfigError;
use regex::Regex;
use std::fmt;
use url::Url;

/// Why a URL was refused by the [`UrlFilter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Scheme(String),
    MissingHost,
    PrivateHost,
    NotIncluded,
    Excluded,
    Subdomain,
    External,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Scheme(scheme) => write!(f, "unsupported scheme '{}'", scheme),
            Rejection::MissingHost => f.write_str("missing host"),
            Rejection::PrivateHost => f.write_str("private network host"),
            Rejection::NotIncluded => f.write_str("does not match include-pattern"),
            Rejection::Excluded => f.write_str("matches exclude-pattern"),
            Rejection::Subdomain => f.write_str("subdomain not allowed"),
            Rejection::External => f.write_str("external domain not followed"),
        }
    }
}

/// Crawl policy applied to every URL before it is fetched
///
/// Scope checks are relative to the domain of the crawl's seed URL.
#[derive(Debug, Clone)]
pub struct UrlFilter {
    include: Option<Regex>,
    exclude: Option<Regex>,
    allow_subdomains: bool,
    follow_external: bool,
    block_private_hosts: bool,
}

impl UrlFilter {
    pub fn from_config(config: &CrawlerConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            include: compile(config.include_pattern.as_deref())?,
            exclude: compile(config.exclude_pattern.as_deref())?,
            allow_subdomains: config.allow_subdomains,
            follow_external: config.follow_external,
            block_private_hosts: config.block_private_hosts,
        })
    }

    /// Checks `url` against the policy for a crawl rooted at `root_domain`
    pub fn check(&self, url: &Url, root_domain: &str) -> Result<(), Rejection> {
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Rejection::Scheme(url.scheme().to_string()));
        }

        let domain = extract_domain(url).ok_or(Rejection::MissingHost)?;

        if self.block_private_hosts && is_private_host(url) {
            return Err(Rejection::PrivateHost);
        }

        if let Some(include) = &self.include {
            if !include.is_match(url.as_str()) {
                return Err(Rejection::NotIncluded);
            }
        }

        if let Some(exclude) = &self.exclude {
            if exclude.is_match(url.as_str()) {
                return Err(Rejection::Excluded);
            }
        }

        if domain != root_domain && !self.follow_external {
            if is_same_or_subdomain(&domain, root_domain) {
                if !self.allow_subdomains {
                    return Err(Rejection::Subdomain);
                }
            } else {
                return Err(Rejection::External);
            }
        }

        Ok(())
    }
}

fn compile(pattern: Option<&str>) -> Result<Option<Regex>, ConfigError> {
    pattern
        .map(|p| {
            Regex::new(p).map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", p, e)))
        })
        .transpose()
}
