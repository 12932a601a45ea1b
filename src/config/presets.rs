use crate::config::types::Config;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named bundles of crawl settings for common scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// Shallow, one request per second
    Basic,
    /// Deeper and faster, larger bursts, proxies when configured
    Aggressive,
    /// Slow and steady, proxies when configured, personal data redacted
    Stealth,
    /// Single-level API-style fetches that ignore robots.txt
    Api,
    /// Deep archival crawl with long timeouts
    Archive,
}

impl Preset {
    pub const ALL: [Preset; 5] = [
        Preset::Basic,
        Preset::Aggressive,
        Preset::Stealth,
        Preset::Api,
        Preset::Archive,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Preset::Basic => "basic",
            Preset::Aggressive => "aggressive",
            Preset::Stealth => "stealth",
            Preset::Api => "api",
            Preset::Archive => "archive",
        }
    }

    /// Builds a default configuration with this preset applied
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        self.apply(&mut config);
        config
    }

    /// Overlays the preset's settings on an existing configuration
    ///
    /// Presets never invent a proxy list; `use-proxies` is only switched on
    /// when the configuration already names a proxy source.
    pub fn apply(&self, config: &mut Config) {
        let has_proxy_source =
            !config.proxy.proxies.is_empty() || config.proxy.proxy_file.is_some();

        match self {
            Preset::Basic => {
                config.crawler.max_depth = 1;
                config.rate_limit.requests_per_second = 1.0;
                config.retry.request_timeout_secs = 30;
                config.crawler.respect_robots = true;
                config.proxy.use_proxies = false;
            }
            Preset::Aggressive => {
                config.crawler.max_depth = 3;
                config.rate_limit.requests_per_second = 2.0;
                config.rate_limit.burst_allowance = 5;
                config.retry.request_timeout_secs = 60;
                config.retry.retry_count = 3;
                config.crawler.respect_robots = true;
                config.proxy.use_proxies = has_proxy_source;
            }
            Preset::Stealth => {
                config.crawler.max_depth = 2;
                config.rate_limit.requests_per_second = 0.5;
                config.retry.request_timeout_secs = 45;
                config.retry.retry_delay_ms = 2000;
                config.crawler.respect_robots = true;
                config.proxy.use_proxies = has_proxy_source;
                config.output.redact_sensitive = true;
            }
            Preset::Api => {
                config.crawler.max_depth = 1;
                config.rate_limit.requests_per_second = 1.0;
                config.retry.request_timeout_secs = 30;
                config.retry.retry_delay_ms = 2000;
                config.retry.retry_count = 3;
                config.crawler.respect_robots = false;
                config.proxy.use_proxies = false;
            }
            Preset::Archive => {
                config.crawler.max_depth = 5;
                config.rate_limit.requests_per_second = 1.0 / 1.5;
                config.retry.request_timeout_secs = 60;
                config.crawler.respect_robots = true;
                config.proxy.use_proxies = false;
            }
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        Preset::ALL
            .iter()
            .copied()
            .find(|preset| preset.name() == lowered)
            .ok_or_else(|| {
                format!(
                    "unknown preset '{}', expected one of: basic, aggressive, stealth, api, archive",
                    s
                )
            })
    }
}
