//! L2: on-disk blob tier
//!
//! One file per entry under `cache/l2/<prefix>/<key>`, bounded by total
//! size with mtime-LRU eviction. Each blob carries a checksum; a
//! tampered file silently falls through to the next tier.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::key::CacheKey;

#[derive(Serialize, Deserialize)]
struct L2Blob {
    created_at_ms: u64,
    ttl_ms: u64,
    /// blake3 of `payload`, hex
    checksum: String,
    payload: Vec<u8>,
}

pub struct L2Cache {
    dir: PathBuf,
    max_bytes: u64,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl L2Cache {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: u64, ttl: Duration) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            max_bytes,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.prefix()).join(key.as_str())
    }

    pub fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let path = self.path_for(key);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(_) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        let blob: L2Blob = match bincode::deserialize(&bytes) {
            Ok(blob) => blob,
            Err(_) => {
                warn!(key = key.as_str(), "undecodable L2 blob; dropping");
                let _ = std::fs::remove_file(&path);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if blake3::hash(&blob.payload).to_hex().to_string() != blob.checksum {
            warn!(key = key.as_str(), "L2 checksum mismatch; dropping");
            let _ = std::fs::remove_file(&path);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        if now_ms().saturating_sub(blob.created_at_ms) > blob.ttl_ms {
            debug!(key = key.as_str(), "L2 entry expired");
            let _ = std::fs::remove_file(&path);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        touch(&path);
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(blob.payload)
    }

    pub fn insert(&self, key: &CacheKey, payload: Vec<u8>) -> std::io::Result<()> {
        let blob = L2Blob {
            created_at_ms: now_ms(),
            ttl_ms: self.ttl.as_millis() as u64,
            checksum: blake3::hash(&payload).to_hex().to_string(),
            payload,
        };
        let bytes = bincode::serialize(&blob)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;
        self.evict_to_budget();
        Ok(())
    }

    pub fn remove(&self, key: &CacheKey) {
        let _ = std::fs::remove_file(self.path_for(key));
    }

    pub fn clear(&self) -> std::io::Result<()> {
        for entry in walk_blobs(&self.dir) {
            std::fs::remove_file(entry)?;
        }
        Ok(())
    }

    /// Size-driven LRU by last-access mtime.
    fn evict_to_budget(&self) {
        let mut entries: Vec<(PathBuf, u64, SystemTime)> = walk_blobs(&self.dir)
            .filter_map(|path| {
                let meta = std::fs::metadata(&path).ok()?;
                Some((path, meta.len(), meta.modified().ok()?))
            })
            .collect();

        let mut total: u64 = entries.iter().map(|(_, size, _)| size).sum();
        if total <= self.max_bytes {
            return;
        }

        entries.sort_by_key(|(_, _, mtime)| *mtime);
        for (path, size, _) in entries {
            if total <= self.max_bytes {
                break;
            }
            if std::fs::remove_file(&path).is_ok() {
                total = total.saturating_sub(size);
            }
        }
    }

    /// Delete entries created before the cutoff; returns how many went.
    pub fn prune_older_than(&self, age: Duration) -> usize {
        let cutoff = now_ms().saturating_sub(age.as_millis() as u64);
        let mut removed = 0;
        for path in walk_blobs(&self.dir) {
            let created = std::fs::read(&path)
                .ok()
                .and_then(|bytes| bincode::deserialize::<L2Blob>(&bytes).ok())
                .map(|blob| blob.created_at_ms);
            match created {
                Some(created) if created < cutoff => {
                    if std::fs::remove_file(&path).is_ok() {
                        removed += 1;
                    }
                }
                Some(_) => {}
                None => {
                    // unreadable blob is garbage either way
                    let _ = std::fs::remove_file(&path);
                    removed += 1;
                }
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        walk_blobs(&self.dir).count()
    }

    pub fn total_bytes(&self) -> u64 {
        walk_blobs(&self.dir)
            .filter_map(|path| std::fs::metadata(path).ok())
            .map(|meta| meta.len())
            .sum()
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

fn walk_blobs(dir: &Path) -> impl Iterator<Item = PathBuf> {
    let mut files = Vec::new();
    if let Ok(shards) = std::fs::read_dir(dir) {
        for shard in shards.flatten() {
            if shard.path().is_dir() {
                if let Ok(entries) = std::fs::read_dir(shard.path()) {
                    for entry in entries.flatten() {
                        if entry.path().is_file() {
                            files.push(entry.path());
                        }
                    }
                }
            }
        }
    }
    files.into_iter()
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Bump mtime so eviction sees the access.
fn touch(path: &Path) {
    if let Ok(file) = std::fs::OpenOptions::new().write(true).open(path) {
        let _ = file.set_modified(SystemTime::now());
    }
}
