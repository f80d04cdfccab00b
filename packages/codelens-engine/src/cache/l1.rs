//! L1: in-process memory tier
//!
//! Entry-count-bounded LRU with TTL, empty on restart.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use crate::cache::key::CacheKey;
use crate::cache::CachedResult;

struct L1Entry {
    value: Arc<CachedResult>,
    created: Instant,
    hit_count: u64,
}

pub struct L1Cache {
    inner: Mutex<LruCache<CacheKey, L1Entry>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl L1Cache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_entries.max(1)).expect("non-zero");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<CachedResult>> {
        let mut inner = self.inner.lock();
        match inner.get_mut(key) {
            Some(entry) if entry.created.elapsed() <= self.ttl => {
                entry.hit_count += 1;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(&entry.value))
            }
            Some(_) => {
                // expired; delete in-band
                inner.pop(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, key: CacheKey, value: Arc<CachedResult>) {
        self.inner.lock().put(
            key,
            L1Entry {
                value,
                created: Instant::now(),
                hit_count: 0,
            },
        );
    }

    pub fn remove(&self, key: &CacheKey) {
        self.inner.lock().pop(key);
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn prune_older_than(&self, age: Duration) -> usize {
        let mut inner = self.inner.lock();
        let stale: Vec<CacheKey> = inner
            .iter()
            .filter(|(_, entry)| entry.created.elapsed() > age)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            inner.pop(key);
        }
        stale.len()
    }

    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
