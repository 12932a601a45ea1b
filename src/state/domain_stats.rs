use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Number of response times kept for the rolling average
pub const RESPONSE_TIME_SAMPLES: usize = 10;

/// Reports needed before the circuit breaker may trip
pub const CIRCUIT_MIN_REPORTS: u64 = 10;

/// Failure rate above which the circuit breaker trips
pub const CIRCUIT_FAILURE_RATE: f64 = 0.5;

/// Time after which a tripped breaker resets itself
pub const CIRCUIT_RESET_AFTER: Duration = Duration::from_secs(30);

/// Lower bound of every computed delay
pub const MIN_DELAY: Duration = Duration::from_millis(100);

const MAX_BACKOFF: f64 = 4.0;
const SUCCESS_DECAY: f64 = 0.9;
const FAILURE_GROWTH: f64 = 1.5;

/// Inputs of the delay computation shared by every domain
#[derive(Debug, Clone)]
pub struct DelayPolicy {
    pub requests_per_second: f64,
    pub burst_allowance: u32,
    pub window: Duration,
}

/// Circuit breaker state change produced by [`DomainStats::evaluate_circuit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitTransition {
    Tripped,
    Reset,
}

/// Traffic statistics for one domain
///
/// Owned by the rate limiter, which creates one lazily on first contact
/// with a domain.
#[derive(Debug, Clone)]
pub struct DomainStats {
    /// Start slot reserved for the most recent request
    pub last_request_time: Option<Instant>,

    pub requests_in_window: u32,
    pub window_start: Instant,

    /// Multiplier on the base delay, within [1.0, 4.0]
    pub backoff_factor: f64,

    /// Most recent response times in milliseconds
    pub recent_response_times: VecDeque<u64>,

    pub error_count: u32,
    pub success_count: u64,
    pub fail_count: u64,

    pub circuit_tripped_at: Option<Instant>,
    pub circuit_trips: u32,

    /// Crawl-delay announced by the domain's robots.txt
    pub crawl_delay: Option<Duration>,
}

impl DomainStats {
    pub fn new(now: Instant) -> Self {
        Self {
            last_request_time: None,
            requests_in_window: 0,
            window_start: now,
            backoff_factor: 1.0,
            recent_response_times: VecDeque::with_capacity(RESPONSE_TIME_SAMPLES),
            error_count: 0,
            success_count: 0,
            fail_count: 0,
            circuit_tripped_at: None,
            circuit_trips: 0,
            crawl_delay: None,
        }
    }

    pub fn total_reports(&self) -> u64 {
        self.success_count + self.fail_count
    }

    /// Failures divided by all reported outcomes, 0.0 without reports
    pub fn error_rate(&self) -> f64 {
        let total = self.total_reports();
        if total == 0 {
            0.0
        } else {
            self.fail_count as f64 / total as f64
        }
    }

    /// Rolling average response time in seconds
    pub fn average_response_secs(&self) -> Option<f64> {
        if self.recent_response_times.is_empty() {
            return None;
        }
        let sum: u64 = self.recent_response_times.iter().sum();
        Some(sum as f64 / self.recent_response_times.len() as f64 / 1000.0)
    }

    pub fn is_tripped(&self) -> bool {
        self.circuit_tripped_at.is_some()
    }

    /// Starts a new burst window if the current one has elapsed
    pub fn roll_window(&mut self, now: Instant, window: Duration) {
        if now.saturating_duration_since(self.window_start) >= window {
            self.window_start = now;
            self.requests_in_window = 0;
        }
    }

    /// Computes the spacing to keep after the previous request
    ///
    /// `jitter` is the random factor, expected within [0.9, 1.1].
    pub fn compute_delay(&self, policy: &DelayPolicy, jitter: f64) -> Duration {
        let mut delay = (1.0 / policy.requests_per_second) * self.backoff_factor * jitter;

        let error_rate = self.error_rate();
        if error_rate > 0.1 {
            delay *= 1.0 + 2.0 * error_rate;
        }

        if let Some(avg) = self.average_response_secs() {
            if avg > 1.0 {
                delay *= avg.min(2.0);
            }
        }

        if self.is_tripped() {
            delay *= 1.0 + self.circuit_trips as f64;
        }

        if self.requests_in_window < policy.burst_allowance {
            delay *= 0.5;
        }

        let mut delay = Duration::try_from_secs_f64(delay).unwrap_or(Duration::MAX);
        if let Some(crawl_delay) = self.crawl_delay {
            delay = delay.max(crawl_delay);
        }
        delay.max(MIN_DELAY)
    }

    pub fn record_success(&mut self, response_time_ms: u64) {
        self.success_count += 1;
        self.error_count = self.error_count.saturating_sub(1);
        self.backoff_factor = (self.backoff_factor * SUCCESS_DECAY).max(1.0);
        self.push_response_time(response_time_ms);
    }

    pub fn record_failure(&mut self, response_time_ms: u64) {
        self.fail_count += 1;
        self.error_count += 1;
        self.backoff_factor = (self.backoff_factor * FAILURE_GROWTH).min(MAX_BACKOFF);
        self.push_response_time(response_time_ms);
    }

    fn push_response_time(&mut self, response_time_ms: u64) {
        if self.recent_response_times.len() == RESPONSE_TIME_SAMPLES {
            self.recent_response_times.pop_front();
        }
        self.recent_response_times.push_back(response_time_ms);
    }

    /// Resets an expired breaker, then trips it if the failure rate demands
    pub fn evaluate_circuit(&mut self, now: Instant) -> Option<CircuitTransition> {
        if let Some(tripped_at) = self.circuit_tripped_at {
            if now.saturating_duration_since(tripped_at) >= CIRCUIT_RESET_AFTER {
                self.circuit_tripped_at = None;
                self.circuit_trips = self.circuit_trips.saturating_sub(1);
                return Some(CircuitTransition::Reset);
            }
            return None;
        }

        if self.total_reports() >= CIRCUIT_MIN_REPORTS && self.error_rate() > CIRCUIT_FAILURE_RATE
        {
            self.circuit_tripped_at = Some(now);
            self.circuit_trips += 1;
            return Some(CircuitTransition::Tripped);
        }

        None
    }
}
