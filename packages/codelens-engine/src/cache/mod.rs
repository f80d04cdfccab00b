//! Three-tier query-result cache
//!
//! L1 memory → L2 disk → L3 durable, consulted in order with promotion
//! one tier up on hit. Writes land in L1 synchronously and flow to
//! L2/L3 through a background writer; L3 is authoritative. Entries carry
//! the index version they were produced at and stale entries are treated
//! as misses and deleted in-band.

pub mod analytics;
pub mod key;
pub mod l1;
pub mod l2;
pub mod l3;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use codelens_core::config::CacheTierConfig;
use codelens_core::{EngineError, Result, ResultRecord};
use codelens_store::WorkspaceLayout;

pub use analytics::{parse_retention, CacheAnalytics, TierReport};
pub use key::CacheKey;
pub use l1::L1Cache;
pub use l2::L2Cache;
pub use l3::L3Cache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    L1,
    L2,
    L3,
}

/// Cached query result, versioned by the index epoch it was produced at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResult {
    pub index_version: i64,
    pub records: Vec<ResultRecord>,
}

/// Background write operation
enum WriteOp {
    Set(CacheKey, Vec<u8>),
    Remove(CacheKey),
}

pub struct QueryCache {
    l1: L1Cache,
    l2: Arc<L2Cache>,
    l3: Arc<L3Cache>,
    writer: Option<mpsc::UnboundedSender<WriteOp>>,
}

impl QueryCache {
    /// Build the cache over the workspace layout. With
    /// `background_writes`, L2/L3 writes run on a spawned task (requires
    /// a tokio runtime); without, they are synchronous.
    pub fn open(
        layout: &WorkspaceLayout,
        config: &CacheTierConfig,
        background_writes: bool,
    ) -> Result<Self> {
        let l1 = L1Cache::new(
            config.l1_max_entries,
            Duration::from_millis(config.l1_ttl_ms),
        );
        let l2 = Arc::new(
            L2Cache::new(
                layout.l2_cache_dir(),
                config.l2_max_bytes,
                Duration::from_millis(config.l2_ttl_ms),
            )
            .map_err(EngineError::from)?,
        );
        let l3 = Arc::new(
            L3Cache::new(
                layout.l3_cache_db(),
                Duration::from_millis(config.l3_ttl_ms),
            )
            .map_err(|e| EngineError::storage(format!("l3.db: {e}")))?,
        );

        let writer = if background_writes {
            let (tx, mut rx) = mpsc::unbounded_channel::<WriteOp>();
            let l2_writer = Arc::clone(&l2);
            let l3_writer = Arc::clone(&l3);
            tokio::spawn(async move {
                while let Some(op) = rx.recv().await {
                    match op {
                        WriteOp::Set(key, payload) => {
                            // best-effort; L1 already holds the entry
                            let _ = l2_writer.insert(&key, payload.clone());
                            let _ = l3_writer.insert(&key, &payload);
                        }
                        WriteOp::Remove(key) => {
                            l2_writer.remove(&key);
                            l3_writer.remove(&key);
                        }
                    }
                }
            });
            Some(tx)
        } else {
            None
        };

        Ok(Self {
            l1,
            l2,
            l3,
            writer,
        })
    }

    /// Tiered lookup with one-tier promotion. An entry whose version
    /// differs from `current_version` is a miss and is deleted in-band.
    pub fn lookup(
        &self,
        key: &CacheKey,
        current_version: i64,
    ) -> Option<(Vec<ResultRecord>, CacheTier)> {
        if let Some(cached) = self.l1.get(key) {
            if cached.index_version == current_version {
                return Some((cached.records.clone(), CacheTier::L1));
            }
            debug!(key = %key, "stale L1 entry invalidated");
            self.l1.remove(key);
        }

        if let Some(payload) = self.l2.get(key) {
            if let Ok(cached) = bincode::deserialize::<CachedResult>(&payload) {
                if cached.index_version == current_version {
                    // promote one tier up
                    self.l1.insert(key.clone(), Arc::new(cached.clone()));
                    return Some((cached.records, CacheTier::L2));
                }
            }
            debug!(key = %key, "stale L2 entry invalidated");
            self.l2.remove(key);
        }

        if let Some(payload) = self.l3.get(key) {
            if let Ok(cached) = bincode::deserialize::<CachedResult>(&payload) {
                if cached.index_version == current_version {
                    let _ = self.l2.insert(key, payload);
                    return Some((cached.records, CacheTier::L3));
                }
            }
            debug!(key = %key, "stale L3 entry invalidated");
            self.l3.remove(key);
        }

        None
    }

    /// Insert at L1 synchronously; L2/L3 follow through the writer.
    pub fn insert(&self, key: &CacheKey, cached: CachedResult) -> Result<()> {
        let payload = bincode::serialize(&cached)
            .map_err(|e| EngineError::storage(format!("cache serialization: {e}")))?;
        self.l1.insert(key.clone(), Arc::new(cached));

        match &self.writer {
            Some(writer) => {
                writer
                    .send(WriteOp::Set(key.clone(), payload))
                    .map_err(|_| EngineError::internal("cache writer channel closed"))?;
            }
            None => {
                self.l2.insert(key, payload.clone()).map_err(EngineError::from)?;
                self.l3
                    .insert(key, &payload)
                    .map_err(|e| EngineError::storage(format!("l3 insert: {e}")))?;
            }
        }
        Ok(())
    }

    pub fn remove(&self, key: &CacheKey) -> Result<()> {
        self.l1.remove(key);
        match &self.writer {
            Some(writer) => writer
                .send(WriteOp::Remove(key.clone()))
                .map_err(|_| EngineError::internal("cache writer channel closed"))?,
            None => {
                self.l2.remove(key);
                self.l3.remove(key);
            }
        }
        Ok(())
    }

    /// Clear one tier, or all of them.
    pub fn clear(&self, tier: Option<CacheTier>) -> Result<()> {
        match tier {
            Some(CacheTier::L1) => self.l1.clear(),
            Some(CacheTier::L2) => self.l2.clear().map_err(EngineError::from)?,
            Some(CacheTier::L3) => self
                .l3
                .clear()
                .map_err(|e| EngineError::storage(format!("l3 clear: {e}")))?,
            None => {
                self.l1.clear();
                self.l2.clear().map_err(EngineError::from)?;
                self.l3
                    .clear()
                    .map_err(|e| EngineError::storage(format!("l3 clear: {e}")))?;
            }
        }
        Ok(())
    }

    /// Delete entries older than `age` in one tier, or all of them.
    /// Returns how many entries went.
    pub fn prune(&self, age: Duration, tier: Option<CacheTier>) -> Result<usize> {
        let mut removed = 0;
        if matches!(tier, None | Some(CacheTier::L1)) {
            removed += self.l1.prune_older_than(age);
        }
        if matches!(tier, None | Some(CacheTier::L2)) {
            removed += self.l2.prune_older_than(age);
        }
        if matches!(tier, None | Some(CacheTier::L3)) {
            removed += self
                .l3
                .prune_older_than(age)
                .map_err(|e| EngineError::storage(format!("l3 prune: {e}")))?;
        }
        Ok(removed)
    }

    pub fn l1(&self) -> &L1Cache {
        &self.l1
    }

    pub fn l2(&self) -> &L2Cache {
        &self.l2
    }

    pub fn l3(&self) -> &L3Cache {
        &self.l3
    }
}
