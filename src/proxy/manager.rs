use crate::config::ProxyConfig;
use crate::crawler::ClientSettings;
use crate::proxy::record::{parse_proxy_address, ProxyRecord};
use crate::proxy::store;
use crate::Result;
use chrono::Utc;
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Weight floor so a weak proxy keeps a small chance of selection
const MIN_WEIGHT: f64 = 0.01;

struct Inner {
    records: Mutex<BTreeMap<String, ProxyRecord>>,
    clients: Mutex<HashMap<String, reqwest::Client>>,
    settings: ClientSettings,
    min_score: f64,
    verify_url: Option<Url>,
    verify_timeout: Duration,
    sweep_running: AtomicBool,
    cancel: CancellationToken,
}

/// Pool of proxies with health scoring and weighted rotation
///
/// Cloning is cheap; clones share the same pool.
#[derive(Clone)]
pub struct ProxyManager {
    inner: Arc<Inner>,
}

impl ProxyManager {
    /// Creates a manager for the inline `proxies` of `config`
    ///
    /// Entries that are not valid proxy URLs are skipped with a warning.
    /// `cancel` stops the background verification sweep.
    pub fn new(config: &ProxyConfig, settings: ClientSettings, cancel: CancellationToken) -> Self {
        let manager = Self {
            inner: Arc::new(Inner {
                records: Mutex::new(BTreeMap::new()),
                clients: Mutex::new(HashMap::new()),
                settings,
                min_score: config.min_score,
                verify_url: Url::parse(&config.verify_url).ok(),
                verify_timeout: config.verify_timeout(),
                sweep_running: AtomicBool::new(false),
                cancel,
            }),
        };
        for address in &config.proxies {
            manager.add_proxy(address);
        }
        manager
    }

    /// Creates a manager from `config`, reading the proxy file and the
    /// persisted state file when they are configured
    pub fn from_config(
        config: &ProxyConfig,
        settings: ClientSettings,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let manager = Self::new(config, settings, cancel);

        if let Some(file) = &config.proxy_file {
            for address in store::load_proxy_list(Path::new(file))? {
                manager.add_proxy(&address);
            }
        }

        if let Some(state_file) = &config.state_file {
            let path = Path::new(state_file);
            if path.exists() {
                let restored = manager.load_state(path)?;
                tracing::info!("Restored health of {} proxies from {}", restored, state_file);
            }
        }

        tracing::info!("Proxy pool has {} proxies", manager.len());
        Ok(manager)
    }

    /// Adds a proxy to the pool; returns false if it is invalid or already present
    pub fn add_proxy(&self, address: &str) -> bool {
        let address = address.trim();
        if parse_proxy_address(address).is_none() {
            tracing::warn!("Ignoring invalid proxy address '{}'", address);
            return false;
        }
        let mut records = self.lock_records();
        if records.contains_key(address) {
            return false;
        }
        records.insert(address.to_string(), ProxyRecord::new(address));
        true
    }

    pub fn len(&self) -> usize {
        self.lock_records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Picks the next proxy by weighted random draw over health scores
    ///
    /// Proxies scoring below the minimum are skipped unless no proxy
    /// qualifies, in which case the whole pool is drawn from.
    pub fn next(&self) -> Option<String> {
        let now = Utc::now();
        let mut records = self.lock_records();
        if records.is_empty() {
            return None;
        }

        let scored: Vec<(String, f64)> = records
            .values()
            .map(|r| (r.address.clone(), r.score_at(now)))
            .collect();

        let mut candidates: Vec<&(String, f64)> = scored
            .iter()
            .filter(|(_, score)| *score >= self.inner.min_score)
            .collect();

        if candidates.is_empty() {
            tracing::warn!(
                "No proxy scores above {:.2}, selecting from all {} proxies",
                self.inner.min_score,
                scored.len()
            );
            candidates = scored.iter().collect();
        }

        let (address, _) = *candidates
            .choose_weighted(&mut rand::thread_rng(), |(_, score)| score.max(MIN_WEIGHT))
            .ok()?;

        if let Some(record) = records.get_mut(address) {
            record.last_used_at = Some(now);
        }
        Some(address.clone())
    }

    pub fn report_success(&self, proxy: &str, response_time_ms: u64) {
        if let Some(record) = self.lock_records().get_mut(proxy) {
            record.record_success(response_time_ms);
        }
    }

    /// Records a failed request through `proxy`
    ///
    /// A proxy that was already unavailable is removed from the pool once its
    /// score drops below the minimum; the failure that first marks it
    /// unavailable never removes it. When more than half the pool is
    /// unavailable a background sweep re-verifies the unavailable proxies.
    pub fn report_failure(&self, proxy: &str) {
        let needs_sweep = {
            let mut records = self.lock_records();
            let Some(record) = records.get_mut(proxy) else {
                return;
            };
            let was_available = record.is_available;
            record.record_failure();

            let score = record.score();
            if !was_available && score < self.inner.min_score {
                tracing::warn!(
                    "Removing proxy {} (score {:.2} below {:.2})",
                    proxy,
                    score,
                    self.inner.min_score
                );
                records.remove(proxy);
                self.clients().remove(proxy);
            } else if !record.is_available {
                tracing::debug!(
                    "Proxy {} unavailable after {} consecutive failures",
                    proxy,
                    record.consecutive_failures
                );
            }

            let unavailable = records.values().filter(|r| !r.is_available).count();
            unavailable * 2 > records.len()
        };

        if needs_sweep {
            self.spawn_sweep();
        }
    }

    pub fn note_protocol(&self, proxy: &str, scheme: &str) {
        if let Some(record) = self.lock_records().get_mut(proxy) {
            record.note_protocol(scheme);
        }
    }

    /// Checks `proxy` with a request to the verification URL
    ///
    /// Outcomes update the proxy's statistics but never remove it from the pool.
    ///
    /// # Returns
    ///
    /// * `(true, elapsed_ms)` - The verification URL answered with a 2xx status
    /// * `(false, elapsed_ms)` - Error status, connection failure or timeout
    /// * `(false, 0)` - No verification URL is configured, or no client could
    ///   be built for `proxy`
    pub async fn verify(&self, proxy: &str) -> (bool, u64) {
        let Some(verify_url) = self.inner.verify_url.clone() else {
            return (false, 0);
        };

        let client = match self.client_for(proxy) {
            Ok(client) => client,
            Err(e) => {
                tracing::debug!("Cannot build client for proxy {}: {}", proxy, e);
                self.record_verification(proxy, false, 0, verify_url.scheme());
                return (false, 0);
            }
        };

        let start = Instant::now();
        let outcome =
            tokio::time::timeout(self.inner.verify_timeout, client.get(verify_url.clone()).send())
                .await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let ok = match outcome {
            Ok(Ok(response)) => response.status().is_success(),
            Ok(Err(e)) => {
                tracing::debug!("Verification of proxy {} failed: {}", proxy, e);
                false
            }
            Err(_) => {
                tracing::debug!("Verification of proxy {} timed out", proxy);
                false
            }
        };

        self.record_verification(proxy, ok, elapsed_ms, verify_url.scheme());
        (ok, elapsed_ms)
    }

    fn record_verification(&self, proxy: &str, ok: bool, elapsed_ms: u64, scheme: &str) {
        if let Some(record) = self.lock_records().get_mut(proxy) {
            if ok {
                record.record_success(elapsed_ms);
                record.note_protocol(scheme);
            } else {
                record.record_failure();
            }
        }
    }

    /// Re-verifies every unavailable proxy, stopping early on cancellation
    pub async fn sweep_unavailable(&self) {
        let unavailable: Vec<String> = self
            .lock_records()
            .values()
            .filter(|r| !r.is_available)
            .map(|r| r.address.clone())
            .collect();

        tracing::info!("Re-verifying {} unavailable proxies", unavailable.len());

        for proxy in unavailable {
            let cancel = self.inner.cancel.clone();
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Proxy sweep cancelled");
                    return;
                }
                (ok, _) = self.verify(&proxy) => {
                    if ok {
                        tracing::info!("Proxy {} is available again", proxy);
                    }
                }
            }
        }
    }

    fn spawn_sweep(&self) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        if self.inner.sweep_running.swap(true, Ordering::AcqRel) {
            return;
        }

        let manager = self.clone();
        handle.spawn(async move {
            manager.sweep_unavailable().await;
            manager.inner.sweep_running.store(false, Ordering::Release);
        });
    }

    pub fn is_sweep_running(&self) -> bool {
        self.inner.sweep_running.load(Ordering::Acquire)
    }

    /// Snapshot of every record in the pool
    pub fn records(&self) -> Vec<ProxyRecord> {
        self.lock_records().values().cloned().collect()
    }

    pub fn record(&self, proxy: &str) -> Option<ProxyRecord> {
        self.lock_records().get(proxy).cloned()
    }

    /// Restores statistics for proxies already in the pool from a state file
    ///
    /// Returns the number of records restored. If the pool is empty, every
    /// valid record in the file is added.
    pub fn load_state(&self, path: &Path) -> Result<usize> {
        let saved = store::read_state(path)?;
        let mut records = self.lock_records();
        let adopt_all = records.is_empty();
        let mut restored = 0;

        for (address, mut record) in saved {
            if parse_proxy_address(&address).is_none() {
                continue;
            }
            if adopt_all || records.contains_key(&address) {
                record.address = address.clone();
                records.insert(address, record);
                restored += 1;
            }
        }
        Ok(restored)
    }

    pub fn save_state(&self, path: &Path) -> Result<()> {
        let records = self.lock_records().clone();
        store::write_state(path, &records)?;
        tracing::debug!("Saved {} proxy records to {}", records.len(), path.display());
        Ok(())
    }

    /// HTTP client routed through `proxy`, built once and cached
    pub fn client_for(&self, proxy: &str) -> std::result::Result<reqwest::Client, reqwest::Error> {
        if let Some(client) = self.clients().get(proxy) {
            return Ok(client.clone());
        }
        let client = self.inner.settings.build(Some(proxy))?;
        self.clients()
            .entry(proxy.to_string())
            .or_insert(client.clone());
        Ok(client)
    }

    fn lock_records(&self) -> MutexGuard<'_, BTreeMap<String, ProxyRecord>> {
        self.inner
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn clients(&self) -> MutexGuard<'_, HashMap<String, reqwest::Client>> {
        self.inner
            .clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
