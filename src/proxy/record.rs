use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use url::Url;

/// Proxy URL schemes the HTTP client can route through
pub const SUPPORTED_SCHEMES: &[&str] = &["http", "https", "socks5", "socks5h"];

/// Consecutive failures after which a proxy is taken out of rotation
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

const WEIGHT_SUCCESS: f64 = 0.4;
const WEIGHT_RECENCY: f64 = 0.1;
const WEIGHT_RESPONSE: f64 = 0.2;
const WEIGHT_AVAILABILITY: f64 = 0.2;
const WEIGHT_PROTOCOLS: f64 = 0.1;

/// Parses a proxy address, accepting only supported schemes with a host
pub fn parse_proxy_address(address: &str) -> Option<Url> {
    let url = Url::parse(address.trim()).ok()?;
    if !SUPPORTED_SCHEMES.contains(&url.scheme()) || url.host_str().is_none() {
        return None;
    }
    Some(url)
}

/// Health statistics of one proxy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRecord {
    pub address: String,
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u32,
    pub average_response_time_ms: f64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub is_available: bool,
    pub supported_protocols: BTreeSet<String>,
}

impl ProxyRecord {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            success_count: 0,
            failure_count: 0,
            consecutive_failures: 0,
            average_response_time_ms: 0.0,
            last_used_at: None,
            is_available: true,
            supported_protocols: BTreeSet::new(),
        }
    }

    pub fn has_history(&self) -> bool {
        self.success_count + self.failure_count > 0
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.success_count + self.failure_count;
        if total == 0 {
            1.0
        } else {
            self.success_count as f64 / total as f64
        }
    }

    pub fn score(&self) -> f64 {
        self.score_at(Utc::now())
    }

    /// Health score in [0, 1]; a proxy without history scores exactly 1.0
    pub fn score_at(&self, now: DateTime<Utc>) -> f64 {
        if !self.has_history() {
            return 1.0;
        }

        let reliability = self.success_rate() * 0.8f64.powi(self.consecutive_failures as i32);

        let recency = match self.last_used_at {
            Some(used) => {
                let idle = (now - used).num_milliseconds().max(0) as f64 / 1000.0;
                (idle / 3600.0).min(1.0)
            }
            None => 1.0,
        };

        let response = 1.0 / (1.0 + self.average_response_time_ms.max(0.0) / 1000.0);

        let availability = if self.is_available { 1.0 } else { 0.2 };

        let protocols = (self.supported_protocols.len() as f64 / 3.0).min(1.0);

        let score = WEIGHT_SUCCESS * reliability
            + WEIGHT_RECENCY * recency
            + WEIGHT_RESPONSE * response
            + WEIGHT_AVAILABILITY * availability
            + WEIGHT_PROTOCOLS * protocols;

        if score.is_nan() {
            0.0
        } else {
            score.clamp(0.0, 1.0)
        }
    }

    pub fn record_success(&mut self, response_time_ms: u64) {
        self.success_count += 1;
        self.consecutive_failures = 0;
        self.is_available = true;
        let n = self.success_count as f64;
        self.average_response_time_ms += (response_time_ms as f64 - self.average_response_time_ms) / n;
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.consecutive_failures += 1;
        if self.consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
            self.is_available = false;
        }
    }

    pub fn note_protocol(&mut self, scheme: &str) {
        self.supported_protocols.insert(scheme.to_ascii_lowercase());
    }
}
