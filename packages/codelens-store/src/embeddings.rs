//! Embedding store
//!
//! The embedder-owned SQLite database. Split from the fragment store so
//! the two main writers do not contend on one connection while keeping
//! per-store ACID.

use std::path::Path;
use std::sync::Arc;

use chrono::DateTime;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use codelens_core::model::{blob_to_vector, vector_to_blob, EmbeddingRecord};

use crate::error::Result;

#[derive(Clone)]
pub struct EmbeddingStore {
    conn: Arc<Mutex<Connection>>,
    dimension: usize,
}

impl EmbeddingStore {
    pub fn new(db_path: impl AsRef<Path>, dimension: usize) -> Result<Self> {
        Self::from_connection(Connection::open(db_path)?, dimension)
    }

    /// In-memory store (for testing)
    pub fn in_memory(dimension: usize) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, dimension)
    }

    fn from_connection(conn: Connection, dimension: usize) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            dimension,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS embeddings (
                fragment_id TEXT PRIMARY KEY,
                vector BLOB NOT NULL,
                model_id TEXT NOT NULL,
                model_version TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Upsert a batch in one transaction.
    pub fn upsert_batch(&self, records: &[EmbeddingRecord]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for record in records {
            tx.execute(
                "INSERT INTO embeddings
                 (fragment_id, vector, model_id, model_version, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(fragment_id) DO UPDATE SET
                    vector = excluded.vector,
                    model_id = excluded.model_id,
                    model_version = excluded.model_version,
                    updated_at = excluded.updated_at",
                params![
                    record.fragment_id,
                    vector_to_blob(&record.vector),
                    record.model_id,
                    record.model_version,
                    record.created_at.timestamp(),
                    record.updated_at.timestamp(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn delete(&self, fragment_ids: &[String]) -> Result<()> {
        if fragment_ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for id in fragment_ids {
            tx.execute(
                "DELETE FROM embeddings WHERE fragment_id = ?1",
                params![id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get(&self, fragment_id: &str) -> Result<Option<EmbeddingRecord>> {
        let conn = self.conn.lock();
        let dimension = self.dimension;
        let row = conn
            .query_row(
                "SELECT fragment_id, vector, model_id, model_version, created_at, updated_at
                 FROM embeddings WHERE fragment_id = ?1",
                params![fragment_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((id, blob, model_id, model_version, created, updated)) => {
                let vector = blob_to_vector(&blob, dimension).map_err(|e| {
                    crate::error::StoreError::Corrupt(format!(
                        "embedding blob for {}: {}",
                        id, e
                    ))
                })?;
                Ok(Some(EmbeddingRecord {
                    fragment_id: id,
                    vector,
                    model_id,
                    model_version,
                    created_at: DateTime::from_timestamp(created, 0).unwrap_or_default(),
                    updated_at: DateTime::from_timestamp(updated, 0).unwrap_or_default(),
                }))
            }
        }
    }

    /// Every `(fragment_id, vector)` pair, for index rebuilds and the
    /// bijection check on open.
    pub fn all_vectors(&self) -> Result<Vec<(String, Vec<f32>)>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT fragment_id, vector FROM embeddings ORDER BY fragment_id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, blob) = row?;
            let vector = blob_to_vector(&blob, self.dimension).map_err(|e| {
                crate::error::StoreError::Corrupt(format!("embedding blob for {}: {}", id, e))
            })?;
            out.push((id, vector));
        }
        Ok(out)
    }

    pub fn fragment_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT fragment_id FROM embeddings ORDER BY fragment_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
