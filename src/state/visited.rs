use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Minimum spacing between full sweeps of expired entries
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

struct Inner {
    entries: HashMap<String, Instant>,
    last_purge: Instant,
}

/// Normalized URL to last-visit time, with expiry
///
/// A URL counts as visited for `ttl` after it was marked. Expired entries
/// are dropped on lookup and swept periodically so the map stays bounded
/// in long sessions.
pub struct VisitedSet {
    inner: Mutex<Inner>,
    ttl: Duration,
}

impl VisitedSet {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                last_purge: Instant::now(),
            }),
            ttl,
        }
    }

    /// Returns true if `url` was marked within the de-duplication window
    pub fn contains(&self, url: &Url) -> bool {
        let now = Instant::now();
        let mut inner = self.lock();
        match inner.entries.get(url.as_str()) {
            Some(visited_at) if now.saturating_duration_since(*visited_at) < self.ttl => true,
            Some(_) => {
                inner.entries.remove(url.as_str());
                false
            }
            None => false,
        }
    }

    /// Marks `url` as visited now
    ///
    /// Returns false if it was already visited within the window, in which
    /// case the caller lost the race and must not fetch it.
    pub fn mark(&self, url: &Url) -> bool {
        let now = Instant::now();
        let mut inner = self.lock();

        if now.saturating_duration_since(inner.last_purge) >= PURGE_INTERVAL {
            let ttl = self.ttl;
            inner
                .entries
                .retain(|_, visited_at| now.saturating_duration_since(*visited_at) < ttl);
            inner.last_purge = now;
        }

        if let Some(visited_at) = inner.entries.get(url.as_str()) {
            if now.saturating_duration_since(*visited_at) < self.ttl {
                return false;
            }
        }

        inner.entries.insert(url.as_str().to_string(), now);
        true
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
