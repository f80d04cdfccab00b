//! Query log
//!
//! Append-only record of served queries with a retention policy. Feeds
//! cache warming and the analytics report. Appends are serialized on the
//! connection and safe under concurrent readers.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct QueryLogEntry {
    pub query_text: String,
    pub query_hash: String,
    pub options: String,
    pub result_count: usize,
    pub duration_ms: u64,
    pub cache_hit: bool,
    pub index_version: i64,
    pub timestamp: DateTime<Utc>,
}

/// A frequently-issued query, for cache warming
#[derive(Debug, Clone, PartialEq)]
pub struct FrequentQuery {
    pub query_text: String,
    pub options: String,
    pub count: usize,
}

#[derive(Clone)]
pub struct QueryLog {
    conn: Arc<Mutex<Connection>>,
}

impl QueryLog {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(db_path)?)
    }

    /// In-memory log (for testing)
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let log = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        log.init_schema()?;
        Ok(log)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS query_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                query_text TEXT NOT NULL,
                query_hash TEXT NOT NULL,
                options TEXT NOT NULL,
                result_count INTEGER NOT NULL,
                duration_ms INTEGER NOT NULL,
                cache_hit INTEGER NOT NULL,
                index_version INTEGER NOT NULL,
                timestamp INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_query_log_hash
             ON query_log(query_hash)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_query_log_time
             ON query_log(timestamp)",
            [],
        )?;
        Ok(())
    }

    pub fn append(&self, entry: &QueryLogEntry) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO query_log
             (query_text, query_hash, options, result_count, duration_ms,
              cache_hit, index_version, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.query_text,
                entry.query_hash,
                entry.options,
                entry.result_count as i64,
                entry.duration_ms as i64,
                entry.cache_hit,
                entry.index_version,
                entry.timestamp.timestamp(),
            ],
        )?;
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM query_log", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Most frequent distinct queries, for warming.
    pub fn top_queries(&self, limit: usize) -> Result<Vec<FrequentQuery>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT query_text, options, COUNT(*) AS uses
             FROM query_log
             GROUP BY query_hash
             ORDER BY uses DESC, MAX(timestamp) DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(FrequentQuery {
                query_text: row.get(0)?,
                options: row.get(1)?,
                count: row.get::<_, i64>(2)? as usize,
            })
        })?;
        let queries = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(queries)
    }

    /// Overall cache hit rate and totals: `(hits, total)`.
    pub fn hit_stats(&self) -> Result<(usize, usize)> {
        let conn = self.conn.lock();
        let (hits, total): (i64, i64) = conn.query_row(
            "SELECT COALESCE(SUM(cache_hit), 0), COUNT(*) FROM query_log",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((hits as usize, total as usize))
    }

    /// Delete entries older than the cutoff; returns how many went.
    pub fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM query_log WHERE timestamp < ?1",
            params![cutoff.timestamp()],
        )?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(text: &str, hit: bool) -> QueryLogEntry {
        QueryLogEntry {
            query_text: text.to_string(),
            query_hash: format!("hash-{text}"),
            options: "k=5".to_string(),
            result_count: 3,
            duration_ms: 12,
            cache_hit: hit,
            index_version: 1,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_append_and_count() {
        let log = QueryLog::in_memory().unwrap();
        log.append(&entry("tax", false)).unwrap();
        log.append(&entry("tax", true)).unwrap();
        assert_eq!(log.len().unwrap(), 2);
    }

    #[test]
    fn test_top_queries_by_frequency() {
        let log = QueryLog::in_memory().unwrap();
        for _ in 0..3 {
            log.append(&entry("popular", false)).unwrap();
        }
        log.append(&entry("rare", false)).unwrap();

        let top = log.top_queries(5).unwrap();
        assert_eq!(top[0].query_text, "popular");
        assert_eq!(top[0].count, 3);
        assert_eq!(top[1].query_text, "rare");
    }

    #[test]
    fn test_hit_stats() {
        let log = QueryLog::in_memory().unwrap();
        log.append(&entry("a", true)).unwrap();
        log.append(&entry("b", false)).unwrap();
        log.append(&entry("c", true)).unwrap();

        assert_eq!(log.hit_stats().unwrap(), (2, 3));
    }

    #[test]
    fn test_prune_by_age() {
        let log = QueryLog::in_memory().unwrap();
        let mut old = entry("old", false);
        old.timestamp = Utc::now() - Duration::days(10);
        log.append(&old).unwrap();
        log.append(&entry("new", false)).unwrap();

        let pruned = log
            .prune_older_than(Utc::now() - Duration::days(5))
            .unwrap();
        assert_eq!(pruned, 1);
        assert_eq!(log.len().unwrap(), 1);
    }
}
