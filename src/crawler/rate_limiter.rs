//! Adaptive per-domain rate limiting
//!
//! This module handles:
//! - Strict spacing between request starts to the same domain
//! - Delay adaptation from error rates, response times and backoff
//! - A circuit breaker that amplifies delays under sustained failure
//! - Integrating robots.txt crawl delays

use crate::config::RateLimitConfig;
use crate::state::{CircuitTransition, DelayPolicy, DomainStats};
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Returned by [`RateLimiter::wait`] when the wait was cancelled
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("rate limiter wait cancelled")]
pub struct Cancelled;

/// Per-domain rate limiter shared by every fetch of a crawl session
///
/// Domains are independent; callers to different domains never wait on
/// each other.
pub struct RateLimiter {
    domains: Mutex<HashMap<String, DomainStats>>,
    policy: DelayPolicy,
}

impl RateLimiter {
    pub fn new(policy: DelayPolicy) -> Self {
        Self {
            domains: Mutex::new(HashMap::new()),
            policy,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(DelayPolicy {
            requests_per_second: config.requests_per_second,
            burst_allowance: config.burst_allowance,
            window: config.window(),
        })
    }

    pub fn policy(&self) -> &DelayPolicy {
        &self.policy
    }

    /// Waits until a request to `domain` may start
    ///
    /// The start slot is reserved before sleeping, so concurrent callers
    /// for the same domain are spaced out rather than released together.
    /// The first request to a domain is not delayed.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The reserved slot has been reached
    /// * `Err(Cancelled)` - `cancel` fired first; the slot stays consumed
    pub async fn wait(&self, domain: &str, cancel: &CancellationToken) -> Result<(), Cancelled> {
        let jitter = rand::thread_rng().gen_range(0.9..=1.1);
        let slot = self.reserve_slot(domain, Instant::now(), jitter);

        if slot > Instant::now() {
            tracing::trace!(
                "Waiting {:?} before next request to {}",
                slot.saturating_duration_since(Instant::now()),
                domain
            );
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Cancelled),
            _ = tokio::time::sleep_until(slot) => Ok(()),
        }
    }

    /// Reserves the next start slot for `domain` and returns it
    pub fn reserve_slot(&self, domain: &str, now: Instant, jitter: f64) -> Instant {
        let mut domains = self.domains();
        let stats = domains
            .entry(domain.to_string())
            .or_insert_with(|| DomainStats::new(now));

        let transition = stats.evaluate_circuit(now);
        log_transition(domain, stats, transition);
        stats.roll_window(now, self.policy.window);

        let slot = match stats.last_request_time {
            None => now,
            Some(last) => {
                let delay = stats.compute_delay(&self.policy, jitter);
                now.max(last + delay)
            }
        };

        stats.last_request_time = Some(slot);
        stats.requests_in_window += 1;
        slot
    }

    /// Records the outcome of a request to `domain`
    pub fn report_result(&self, domain: &str, success: bool, response_time_ms: u64) {
        let now = Instant::now();
        let mut domains = self.domains();
        let stats = domains
            .entry(domain.to_string())
            .or_insert_with(|| DomainStats::new(now));

        if success {
            stats.record_success(response_time_ms);
        } else {
            stats.record_failure(response_time_ms);
            tracing::debug!(
                "Failure reported for {} (backoff {:.2}, error rate {:.0}%)",
                domain,
                stats.backoff_factor,
                stats.error_rate() * 100.0
            );
        }

        let transition = stats.evaluate_circuit(now);
        log_transition(domain, stats, transition);
    }

    /// Applies a robots.txt crawl delay as a floor for `domain`
    pub fn set_crawl_delay(&self, domain: &str, delay: Duration) {
        let now = Instant::now();
        let mut domains = self.domains();
        let stats = domains
            .entry(domain.to_string())
            .or_insert_with(|| DomainStats::new(now));
        if stats.crawl_delay != Some(delay) {
            tracing::debug!("Using crawl-delay {:?} for {}", delay, domain);
            stats.crawl_delay = Some(delay);
        }
    }

    /// Returns true while the domain's circuit breaker is tripped
    pub fn is_circuit_tripped(&self, domain: &str) -> bool {
        let now = Instant::now();
        let mut domains = self.domains();
        match domains.get_mut(domain) {
            Some(stats) => {
                let transition = stats.evaluate_circuit(now);
                log_transition(domain, stats, transition);
                stats.is_tripped()
            }
            None => false,
        }
    }

    /// Snapshot of the statistics for `domain`
    pub fn stats(&self, domain: &str) -> Option<DomainStats> {
        self.domains().get(domain).cloned()
    }

    fn domains(&self) -> MutexGuard<'_, HashMap<String, DomainStats>> {
        self.domains.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn log_transition(domain: &str, stats: &DomainStats, transition: Option<CircuitTransition>) {
    match transition {
        Some(CircuitTransition::Tripped) => tracing::warn!(
            "Circuit breaker tripped for {} (error rate {:.0}%, trip #{})",
            domain,
            stats.error_rate() * 100.0,
            stats.circuit_trips
        ),
        Some(CircuitTransition::Reset) => {
            tracing::info!("Circuit breaker reset for {}", domain)
        }
        None => {}
    }
}
