use crate::model::PageResult;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

struct CacheEntry {
    page: Arc<PageResult>,
    inserted_at: Instant,
    sequence: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    next_sequence: u64,
}

/// Bounded, TTL-based store of crawled pages keyed by normalized URL
///
/// When an insert pushes the cache past `max_entries`, only the most
/// recently inserted entries are kept. Reads do not refresh an entry.
pub struct PageCache {
    inner: Mutex<Inner>,
    ttl: Duration,
    max_entries: usize,
}

impl PageCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Returns the cached page, evicting it if it has expired
    pub fn get(&self, url: &Url) -> Option<Arc<PageResult>> {
        let now = Instant::now();
        let mut inner = self.lock();

        let expired = match inner.entries.get(url.as_str()) {
            Some(entry) if now.saturating_duration_since(entry.inserted_at) < self.ttl => {
                return Some(entry.page.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            inner.entries.remove(url.as_str());
            tracing::trace!("Evicted expired cache entry for {}", url);
        }
        None
    }

    pub fn put(&self, url: &Url, page: Arc<PageResult>) {
        let mut inner = self.lock();
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.entries.insert(
            url.as_str().to_string(),
            CacheEntry {
                page,
                inserted_at: Instant::now(),
                sequence,
            },
        );

        if inner.entries.len() > self.max_entries {
            let mut sequences: Vec<u64> = inner.entries.values().map(|e| e.sequence).collect();
            sequences.sort_unstable_by(|a, b| b.cmp(a));
            let cutoff = sequences[self.max_entries - 1];
            inner.entries.retain(|_, entry| entry.sequence >= cutoff);
        }
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
