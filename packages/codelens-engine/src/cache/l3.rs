//! L3: durable relational tier
//!
//! The authoritative cache: one SQLite table, no hard size bound,
//! governed by pruning.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::cache::key::CacheKey;

pub struct L3Cache {
    conn: Arc<Mutex<Connection>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl L3Cache {
    pub fn new(db_path: impl AsRef<Path>, ttl: Duration) -> rusqlite::Result<Self> {
        Self::from_connection(Connection::open(db_path)?, ttl)
    }

    /// In-memory tier (for testing)
    pub fn in_memory(ttl: Duration) -> rusqlite::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, ttl)
    }

    fn from_connection(conn: Connection, ttl: Duration) -> rusqlite::Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                blob BLOB NOT NULL,
                size INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                last_access INTEGER NOT NULL,
                hit_count INTEGER NOT NULL DEFAULT 0,
                ttl INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    pub fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let conn = self.conn.lock();
        let row: Option<(Vec<u8>, u64, u64)> = conn
            .query_row(
                "SELECT blob, created_at, ttl FROM cache_entries WHERE key = ?1",
                params![key.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .ok()
            .flatten();

        match row {
            Some((blob, created_at, ttl)) => {
                if now_ms().saturating_sub(created_at) > ttl {
                    // expired; delete in-band
                    let _ = conn.execute(
                        "DELETE FROM cache_entries WHERE key = ?1",
                        params![key.as_str()],
                    );
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                let _ = conn.execute(
                    "UPDATE cache_entries
                     SET last_access = ?2, hit_count = hit_count + 1
                     WHERE key = ?1",
                    params![key.as_str(), now_ms()],
                );
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(blob)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, key: &CacheKey, blob: &[u8]) -> rusqlite::Result<()> {
        let conn = self.conn.lock();
        let now = now_ms();
        conn.execute(
            "INSERT OR REPLACE INTO cache_entries
             (key, blob, size, created_at, last_access, hit_count, ttl)
             VALUES (?1, ?2, ?3, ?4, ?4, 0, ?5)",
            params![
                key.as_str(),
                blob,
                blob.len() as i64,
                now,
                self.ttl.as_millis() as u64,
            ],
        )?;
        Ok(())
    }

    pub fn remove(&self, key: &CacheKey) {
        let conn = self.conn.lock();
        let _ = conn.execute(
            "DELETE FROM cache_entries WHERE key = ?1",
            params![key.as_str()],
        );
    }

    pub fn clear(&self) -> rusqlite::Result<()> {
        self.conn.lock().execute("DELETE FROM cache_entries", [])?;
        Ok(())
    }

    pub fn prune_older_than(&self, age: Duration) -> rusqlite::Result<usize> {
        let cutoff = now_ms().saturating_sub(age.as_millis() as u64);
        let deleted = self.conn.lock().execute(
            "DELETE FROM cache_entries WHERE created_at < ?1",
            params![cutoff],
        )?;
        Ok(deleted)
    }

    pub fn len(&self) -> rusqlite::Result<usize> {
        let count: i64 =
            self.conn
                .lock()
                .query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
