//! Fragment store: fragments + annotations + file records
//!
//! One SQLite database owned by the ingestion side. Per-file replacement
//! is a single transaction: either all rows for the file replace the
//! prior set or none do. Annotations cascade with their fragments.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::DateTime;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use codelens_core::model::{Annotation, FileRecord, Fragment, FragmentKind, Span};

use crate::error::{Result, StoreError};

/// Fragment + annotation, as returned by the hydration join
#[derive(Debug, Clone, PartialEq)]
pub struct HydratedFragment {
    pub fragment: Fragment,
    pub annotation: Annotation,
}

#[derive(Clone)]
pub struct FragmentStore {
    conn: Arc<Mutex<Connection>>,
}

impl FragmentStore {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    /// In-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS fragments (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                name TEXT,
                start_line INTEGER NOT NULL,
                start_col INTEGER NOT NULL,
                end_line INTEGER NOT NULL,
                end_col INTEGER NOT NULL,
                parent_id TEXT,
                file_path TEXT NOT NULL,
                language TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_fragments_file
             ON fragments(file_path)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS annotations (
                fragment_id TEXT PRIMARY KEY
                    REFERENCES fragments(id) ON DELETE CASCADE,
                signature TEXT NOT NULL,
                summary TEXT NOT NULL,
                complexity INTEGER NOT NULL,
                dependencies TEXT NOT NULL,
                snippet TEXT NOT NULL,
                language TEXT NOT NULL,
                file_path TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS files (
                path TEXT PRIMARY KEY,
                content_hash TEXT NOT NULL,
                mtime_ns INTEGER NOT NULL,
                fragment_count INTEGER NOT NULL,
                language TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "INSERT OR IGNORE INTO meta (key, value) VALUES ('index_version', '0')",
            [],
        )?;

        Ok(())
    }

    /// Replace every row attributed to one file, atomically, and bump the
    /// index version. Returns the fragment IDs that did not survive the
    /// replacement (for vector-index cleanup).
    pub fn replace_file(
        &self,
        record: &FileRecord,
        fragments: &[Fragment],
        annotations: &[Annotation],
    ) -> Result<Vec<String>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let old_ids: Vec<String> = {
            let mut stmt = tx.prepare("SELECT id FROM fragments WHERE file_path = ?1")?;
            let ids = stmt
                .query_map(params![record.path], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            ids
        };

        tx.execute(
            "DELETE FROM fragments WHERE file_path = ?1",
            params![record.path],
        )?;

        for fragment in fragments {
            tx.execute(
                "INSERT INTO fragments
                 (id, kind, name, start_line, start_col, end_line, end_col,
                  parent_id, file_path, language, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    fragment.id,
                    fragment.kind.as_str(),
                    fragment.name,
                    fragment.span.start_line,
                    fragment.span.start_col,
                    fragment.span.end_line,
                    fragment.span.end_col,
                    fragment.parent_id,
                    fragment.file_path,
                    fragment.language,
                    fragment.created_at.timestamp(),
                    fragment.updated_at.timestamp(),
                ],
            )?;
        }

        for annotation in annotations {
            tx.execute(
                "INSERT INTO annotations
                 (fragment_id, signature, summary, complexity, dependencies,
                  snippet, language, file_path, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    annotation.fragment_id,
                    annotation.signature,
                    annotation.summary,
                    annotation.complexity,
                    serde_json::to_string(&annotation.dependencies)?,
                    annotation.snippet,
                    annotation.language,
                    annotation.file_path,
                    annotation.created_at.timestamp(),
                    annotation.updated_at.timestamp(),
                ],
            )?;
        }

        tx.execute(
            "INSERT OR REPLACE INTO files
             (path, content_hash, mtime_ns, fragment_count, language, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.path,
                record.content_hash,
                record.mtime_ns,
                record.fragment_count as i64,
                record.language,
                record.updated_at.timestamp(),
            ],
        )?;

        bump_version_tx(&tx)?;
        tx.commit()?;

        let kept: std::collections::HashSet<&str> =
            fragments.iter().map(|f| f.id.as_str()).collect();
        Ok(old_ids
            .into_iter()
            .filter(|id| !kept.contains(id.as_str()))
            .collect())
    }

    /// Delete a file's rows and record; returns the deleted fragment IDs.
    pub fn delete_file(&self, path: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let ids: Vec<String> = {
            let mut stmt = tx.prepare("SELECT id FROM fragments WHERE file_path = ?1")?;
            let ids = stmt
                .query_map(params![path], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            ids
        };

        tx.execute("DELETE FROM fragments WHERE file_path = ?1", params![path])?;
        tx.execute("DELETE FROM files WHERE path = ?1", params![path])?;
        bump_version_tx(&tx)?;
        tx.commit()?;
        Ok(ids)
    }

    pub fn get_fragment(&self, id: &str) -> Result<Option<Fragment>> {
        let conn = self.conn.lock();
        let result = conn
            .query_row(
                "SELECT id, kind, name, start_line, start_col, end_line, end_col,
                        parent_id, file_path, language, created_at, updated_at
                 FROM fragments WHERE id = ?1",
                params![id],
                row_to_fragment,
            )
            .optional()?;
        Ok(result)
    }

    pub fn get_annotation(&self, fragment_id: &str) -> Result<Option<Annotation>> {
        let conn = self.conn.lock();
        let result = conn
            .query_row(
                "SELECT fragment_id, signature, summary, complexity, dependencies,
                        snippet, language, file_path, created_at, updated_at
                 FROM annotations WHERE fragment_id = ?1",
                params![fragment_id],
                row_to_annotation,
            )
            .optional()?;
        Ok(result)
    }

    /// Single join returning fragment + annotation per requested ID.
    /// Missing IDs are silently absent from the result.
    pub fn fetch_hydration(&self, ids: &[String]) -> Result<Vec<HydratedFragment>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = std::iter::repeat("?")
            .take(ids.len())
            .collect::<Vec<_>>()
            .join(",");
        let sql = format!(
            "SELECT f.id, f.kind, f.name, f.start_line, f.start_col, f.end_line,
                    f.end_col, f.parent_id, f.file_path, f.language,
                    f.created_at, f.updated_at,
                    a.fragment_id, a.signature, a.summary, a.complexity,
                    a.dependencies, a.snippet, a.language, a.file_path,
                    a.created_at, a.updated_at
             FROM fragments f
             JOIN annotations a ON a.fragment_id = f.id
             WHERE f.id IN ({placeholders})"
        );

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(ids.iter()), |row| {
            let fragment = row_to_fragment(row)?;
            let annotation = Annotation {
                fragment_id: row.get(12)?,
                signature: row.get(13)?,
                summary: row.get(14)?,
                complexity: row.get(15)?,
                dependencies: serde_json::from_str(&row.get::<_, String>(16)?)
                    .unwrap_or_default(),
                snippet: row.get(17)?,
                language: row.get(18)?,
                file_path: row.get(19)?,
                created_at: timestamp(row.get(20)?),
                updated_at: timestamp(row.get(21)?),
            };
            Ok(HydratedFragment {
                fragment,
                annotation,
            })
        })?;
        let hydrated = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(hydrated)
    }

    pub fn all_fragment_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id FROM fragments")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn fragment_ids_for_file(&self, path: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id FROM fragments WHERE file_path = ?1 ORDER BY start_line, start_col",
        )?;
        let ids = stmt
            .query_map(params![path], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn file_records(&self) -> Result<HashMap<String, FileRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT path, content_hash, mtime_ns, fragment_count, language, updated_at
             FROM files",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(FileRecord {
                path: row.get(0)?,
                content_hash: row.get(1)?,
                mtime_ns: row.get(2)?,
                fragment_count: row.get::<_, i64>(3)? as usize,
                language: row.get(4)?,
                updated_at: timestamp(row.get(5)?),
            })
        })?;
        let mut records = HashMap::new();
        for row in rows {
            let record = row?;
            records.insert(record.path.clone(), record);
        }
        Ok(records)
    }

    pub fn get_file_record(&self, path: &str) -> Result<Option<FileRecord>> {
        let conn = self.conn.lock();
        let result = conn
            .query_row(
                "SELECT path, content_hash, mtime_ns, fragment_count, language, updated_at
                 FROM files WHERE path = ?1",
                params![path],
                |row| {
                    Ok(FileRecord {
                        path: row.get(0)?,
                        content_hash: row.get(1)?,
                        mtime_ns: row.get(2)?,
                        fragment_count: row.get::<_, i64>(3)? as usize,
                        language: row.get(4)?,
                        updated_at: timestamp(row.get(5)?),
                    })
                },
            )
            .optional()?;
        Ok(result)
    }

    pub fn fragment_count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM fragments", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn annotation_count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM annotations", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn index_version(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let value: String = conn.query_row(
            "SELECT value FROM meta WHERE key = 'index_version'",
            [],
            |row| row.get(0),
        )?;
        value
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("bad index_version '{value}'")))
    }

    pub fn bump_index_version(&self) -> Result<i64> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let version = bump_version_tx(&tx)?;
        tx.commit()?;
        Ok(version)
    }
}

fn bump_version_tx(tx: &rusqlite::Transaction<'_>) -> Result<i64> {
    tx.execute(
        "UPDATE meta SET value = CAST(CAST(value AS INTEGER) + 1 AS TEXT)
         WHERE key = 'index_version'",
        [],
    )?;
    let value: String = tx.query_row(
        "SELECT value FROM meta WHERE key = 'index_version'",
        [],
        |row| row.get(0),
    )?;
    value
        .parse()
        .map_err(|_| StoreError::Corrupt(format!("bad index_version '{value}'")))
}

fn row_to_fragment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Fragment> {
    let kind_str: String = row.get(1)?;
    let kind = FragmentKind::parse(&kind_str).unwrap_or(FragmentKind::Statement);
    Ok(Fragment {
        id: row.get(0)?,
        kind,
        name: row.get(2)?,
        span: Span::new(row.get(3)?, row.get(4)?, row.get(5)?, row.get(6)?),
        parent_id: row.get(7)?,
        file_path: row.get(8)?,
        language: row.get(9)?,
        created_at: timestamp(row.get(10)?),
        updated_at: timestamp(row.get(11)?),
    })
}

fn row_to_annotation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Annotation> {
    Ok(Annotation {
        fragment_id: row.get(0)?,
        signature: row.get(1)?,
        summary: row.get(2)?,
        complexity: row.get(3)?,
        dependencies: serde_json::from_str(&row.get::<_, String>(4)?).unwrap_or_default(),
        snippet: row.get(5)?,
        language: row.get(6)?,
        file_path: row.get(7)?,
        created_at: timestamp(row.get(8)?),
        updated_at: timestamp(row.get(9)?),
    })
}

fn timestamp(secs: i64) -> chrono::DateTime<chrono::Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}
