//! Store facade
//!
//! The one process-wide owner of every persistent artifact: the two
//! relational stores, the vector index pair, the query log, and the
//! advisory lock. Writers compose their work under
//! [`Store::with_exclusive_lock`]; readers under
//! [`Store::with_shared_lock`]. Mutating methods expect the caller to
//! hold the writer lease.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, warn};

use codelens_core::model::{Annotation, EmbeddingRecord, FileRecord, Fragment};
use codelens_core::{EngineConfig, EngineError, Result};

use crate::embeddings::EmbeddingStore;
use crate::error::StoreError;
use crate::fragments::{FragmentStore, HydratedFragment};
use crate::hnsw::{HnswParams, VectorIndex};
use crate::layout::WorkspaceLayout;
use crate::lock::WorkspaceLock;
use crate::query_log::QueryLog;

/// Row counts for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub fragments: usize,
    pub annotations: usize,
    pub embeddings: usize,
    pub vectors: usize,
    pub tombstones: usize,
    pub index_version: i64,
    pub query_log_entries: usize,
}

pub struct Store {
    layout: WorkspaceLayout,
    config: EngineConfig,
    lock: WorkspaceLock,
    fragments: FragmentStore,
    embeddings: EmbeddingStore,
    index: Mutex<VectorIndex>,
    query_log: QueryLog,
    needs_rebuild: AtomicBool,
    rebuild_running: AtomicBool,
}

impl Store {
    /// Open (initializing if needed) the store for one workspace.
    ///
    /// Verifies the vector index against the embedding table; corruption
    /// marks the index for a lazy rebuild instead of failing the open.
    pub fn open(workspace_root: &Path) -> Result<Arc<Self>> {
        if !workspace_root.is_dir() {
            return Err(EngineError::workspace(format!(
                "workspace root {} does not exist",
                workspace_root.display()
            ))
            .with_path(workspace_root)
            .with_remediation("create the directory or point at an existing workspace"));
        }

        let layout = WorkspaceLayout::new(workspace_root);
        layout.ensure().map_err(EngineError::from)?;

        let config_path = layout.config_file();
        let config = EngineConfig::load(&config_path)?;
        if !config_path.exists() {
            config.save(&config_path)?;
        }

        let lock = WorkspaceLock::new(
            layout.lock_file(),
            Duration::from_millis(config.lock_timeout_ms),
        );

        let fragments = FragmentStore::new(layout.fragments_db()).map_err(corruption_of("fragments.db"))?;
        let embeddings = EmbeddingStore::new(layout.embeddings_db(), config.embedding.dimension)
            .map_err(corruption_of("embeddings.db"))?;
        let query_log = QueryLog::new(layout.query_log_db()).map_err(EngineError::from)?;

        let params = HnswParams::cosine(
            config.embedding.dimension,
            config.hnsw.m,
            config.hnsw.ef_construction,
            config.hnsw.ef_search,
        );

        let mut needs_rebuild = false;
        let index = match VectorIndex::load(params.clone(), &layout.hnsw_bin(), &layout.hnsw_meta())
        {
            Ok((index, _version)) => index,
            Err(StoreError::IndexCorrupt(reason)) => {
                warn!(reason = %reason, "vector index unusable; scheduling rebuild");
                needs_rebuild = true;
                VectorIndex::new(params)
            }
            Err(other) => return Err(other.into()),
        };

        let store = Self {
            layout,
            config,
            lock,
            fragments,
            embeddings,
            index: Mutex::new(index),
            query_log,
            needs_rebuild: AtomicBool::new(needs_rebuild),
            rebuild_running: AtomicBool::new(false),
        };

        store.reconcile_on_open()?;
        Ok(Arc::new(store))
    }

    /// Cross-store repair after an unclean shutdown: embeddings whose
    /// fragment is gone are dropped, and the index must mirror the
    /// embedding table exactly or it is rebuilt.
    fn reconcile_on_open(&self) -> Result<()> {
        let fragment_ids: HashSet<String> =
            self.fragments.all_fragment_ids()?.into_iter().collect();
        let embedding_ids = self.embeddings.fragment_ids()?;

        let stale: Vec<String> = embedding_ids
            .iter()
            .filter(|id| !fragment_ids.contains(*id))
            .cloned()
            .collect();
        if !stale.is_empty() {
            warn!(count = stale.len(), "dropping embeddings for deleted fragments");
            self.embeddings.delete(&stale)?;
            let mut index = self.index.lock();
            for id in &stale {
                index.remove(id);
            }
        }

        if !self.needs_rebuild.load(Ordering::SeqCst) {
            let live: HashSet<String> = self.embeddings.fragment_ids()?.into_iter().collect();
            let indexed = self.index.lock().live_ids();
            if live != indexed {
                warn!(
                    embeddings = live.len(),
                    indexed = indexed.len(),
                    "vector index out of step with embedding table; scheduling rebuild"
                );
                self.needs_rebuild.store(true, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    pub fn layout(&self) -> &WorkspaceLayout {
        &self.layout
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn query_log(&self) -> &QueryLog {
        &self.query_log
    }

    // ── locking ────────────────────────────────────────────────────────

    /// Run `f` holding the process-wide writer lease.
    pub fn with_exclusive_lock<T>(&self, op: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let _guard = self.lock.exclusive(op)?;
        f()
    }

    /// Run `f` holding a reader lease.
    pub fn with_shared_lock<T>(&self, op: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let _guard = self.lock.shared(op)?;
        f()
    }

    // ── writes (caller holds the writer lease) ─────────────────────────

    /// Atomically replace one file's fragments, annotations, and
    /// embeddings. The fragment-store transaction is the atomicity
    /// point; the embedding table and vector index are reconciled to it
    /// before the call returns, and the index version is bumped.
    pub fn upsert_file_fragments(
        &self,
        record: &FileRecord,
        fragments: &[Fragment],
        annotations: &[Annotation],
        embeddings: &[EmbeddingRecord],
    ) -> Result<()> {
        let removed = self.fragments.replace_file(record, fragments, annotations)?;

        self.embeddings.delete(&removed)?;
        self.embeddings.upsert_batch(embeddings)?;

        for id in &removed {
            self.hnsw_remove(id)?;
        }
        for embedding in embeddings {
            self.hnsw_upsert(&embedding.fragment_id, embedding.vector.clone())?;
        }
        Ok(())
    }

    /// Remove one file entirely (fragments cascade annotations; the
    /// embedding rows and index handles follow).
    pub fn delete_file(&self, path: &str) -> Result<()> {
        let removed = self.fragments.delete_file(path)?;
        self.embeddings.delete(&removed)?;
        for id in &removed {
            self.hnsw_remove(id)?;
        }
        Ok(())
    }

    /// Insert or replace one vector under a fragment's ID.
    pub fn hnsw_upsert(&self, fragment_id: &str, vector: Vec<f32>) -> Result<()> {
        Ok(self.index.lock().upsert(fragment_id, vector)?)
    }

    /// Tombstone a fragment's handle; compaction happens at save time.
    pub fn hnsw_remove(&self, fragment_id: &str) -> Result<bool> {
        Ok(self.index.lock().remove(fragment_id))
    }

    /// Persist the vector index pair; called at batch boundaries.
    pub fn save_vector_index(&self) -> Result<()> {
        let version = self.fragments.index_version()?;
        self.index
            .lock()
            .save(&self.layout.hnsw_bin(), &self.layout.hnsw_meta(), version)?;
        Ok(())
    }

    // ── reads ──────────────────────────────────────────────────────────

    pub fn get_fragment(&self, id: &str) -> Result<Option<Fragment>> {
        Ok(self.fragments.get_fragment(id)?)
    }

    pub fn get_annotation(&self, fragment_id: &str) -> Result<Option<Annotation>> {
        Ok(self.fragments.get_annotation(fragment_id)?)
    }

    pub fn fetch_hydration(&self, ids: &[String]) -> Result<Vec<HydratedFragment>> {
        Ok(self.fragments.fetch_hydration(ids)?)
    }

    pub fn file_records(&self) -> Result<std::collections::HashMap<String, FileRecord>> {
        Ok(self.fragments.file_records()?)
    }

    pub fn get_file_record(&self, path: &str) -> Result<Option<FileRecord>> {
        Ok(self.fragments.get_file_record(path)?)
    }

    pub fn fragment_ids_for_file(&self, path: &str) -> Result<Vec<String>> {
        Ok(self.fragments.fragment_ids_for_file(path)?)
    }

    pub fn hnsw_search(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        if self.needs_rebuild() {
            return Err(EngineError::index_corrupt(
                "vector index awaiting rebuild",
            ));
        }
        Ok(self.index.lock().search(query, k)?)
    }

    pub fn current_index_version(&self) -> Result<i64> {
        Ok(self.fragments.index_version()?)
    }

    /// Explicit epoch bump for mutations outside the per-file write path.
    pub fn bump_index_version(&self) -> Result<i64> {
        Ok(self.fragments.bump_index_version()?)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let index = self.index.lock();
        Ok(StoreStats {
            fragments: self.fragments.fragment_count()?,
            annotations: self.fragments.annotation_count()?,
            embeddings: self.embeddings.count()?,
            vectors: index.len(),
            tombstones: index.tombstone_count(),
            index_version: self.fragments.index_version()?,
            query_log_entries: self.query_log.len()?,
        })
    }

    // ── rebuild ────────────────────────────────────────────────────────

    pub fn needs_rebuild(&self) -> bool {
        self.needs_rebuild.load(Ordering::SeqCst)
    }

    /// Claim the single rebuild slot; the claimant must call
    /// [`Store::rebuild_index`].
    pub fn try_begin_rebuild(&self) -> bool {
        self.rebuild_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Reconstruct the vector index from the embedding table and persist
    /// it. Takes the writer lease itself.
    pub fn rebuild_index(&self) -> Result<()> {
        let result = self.with_exclusive_lock("rebuild-index", || {
            let entries = self.embeddings.all_vectors()?;
            info!(entries = entries.len(), "rebuilding vector index from embeddings");
            {
                let mut index = self.index.lock();
                index.rebuild_from(entries)?;
            }
            self.save_vector_index()?;
            self.needs_rebuild.store(false, Ordering::SeqCst);
            Ok(())
        });
        self.rebuild_running.store(false, Ordering::SeqCst);
        result
    }
}

fn corruption_of(which: &'static str) -> impl Fn(StoreError) -> EngineError {
    move |err| match err {
        StoreError::Database(db) => {
            let message = format!("{which}: {db}");
            EngineError::store_corrupt(message).with_source(db)
        }
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codelens_core::model::{FragmentKind, Span};
    use tempfile::TempDir;

    fn fragment(path: &str, name: &str, line: u32) -> Fragment {
        Fragment::new(
            path,
            "python",
            FragmentKind::Function,
            Some(name.to_string()),
            Span::new(line, 0, line + 2, 0),
        )
    }

    fn annotation_for(frag: &Fragment) -> Annotation {
        let mut anno = Annotation::new(
            frag.id.clone(),
            frag.language.clone(),
            frag.file_path.clone(),
        );
        anno.summary = format!("Function {}", frag.name.as_deref().unwrap_or(""));
        anno.signature = "def f():".to_string();
        anno.snippet = "pass".to_string();
        anno
    }

    fn embedding_for(frag: &Fragment, direction: [f32; 4]) -> EmbeddingRecord {
        let norm: f32 = direction.iter().map(|x| x * x).sum::<f32>().sqrt();
        EmbeddingRecord::new(
            frag.id.clone(),
            direction.iter().map(|x| x / norm).collect(),
            "hashing-v1",
            "1",
        )
    }

    fn test_store(dir: &TempDir) -> Arc<Store> {
        // small dimension keeps fixtures readable
        let layout = WorkspaceLayout::new(dir.path());
        layout.ensure().unwrap();
        let mut config = EngineConfig::default();
        config.embedding.dimension = 4;
        config.save(&layout.config_file()).unwrap();
        Store::open(dir.path()).unwrap()
    }

    fn ingest(store: &Store, path: &str, name: &str, direction: [f32; 4]) -> Fragment {
        let frag = fragment(path, name, 0);
        let anno = annotation_for(&frag);
        let embed = embedding_for(&frag, direction);
        let record = FileRecord::new(path, format!("hash-{name}"), 0, 1, "python");
        store
            .with_exclusive_lock("test-ingest", || {
                store.upsert_file_fragments(&record, &[frag.clone()], &[anno], &[embed])
            })
            .unwrap();
        frag
    }

    #[test]
    fn test_open_initializes_layout() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        assert!(store.layout().config_file().exists());
        assert_eq!(store.current_index_version().unwrap(), 0);
    }

    #[test]
    fn test_upsert_then_search_and_hydrate() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);

        let frag = ingest(&store, "a.py", "f", [1.0, 0.0, 0.0, 0.0]);
        ingest(&store, "b.py", "g", [0.0, 1.0, 0.0, 0.0]);

        let hits = store.hnsw_search(&[1.0, 0.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].0, frag.id);

        let hydrated = store.fetch_hydration(&[frag.id.clone()]).unwrap();
        assert_eq!(hydrated.len(), 1);
        assert_eq!(hydrated[0].fragment.id, frag.id);
        assert_eq!(hydrated[0].annotation.fragment_id, frag.id);
    }

    #[test]
    fn test_version_bumps_per_write() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);

        assert_eq!(store.current_index_version().unwrap(), 0);
        ingest(&store, "a.py", "f", [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(store.current_index_version().unwrap(), 1);
        ingest(&store, "b.py", "g", [0.0, 1.0, 0.0, 0.0]);
        assert_eq!(store.current_index_version().unwrap(), 2);

        store.bump_index_version().unwrap();
        assert_eq!(store.current_index_version().unwrap(), 3);
    }

    #[test]
    fn test_delete_file_cascades_everywhere() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        let frag = ingest(&store, "a.py", "f", [1.0, 0.0, 0.0, 0.0]);

        store
            .with_exclusive_lock("test-delete", || store.delete_file("a.py"))
            .unwrap();

        assert!(store.get_fragment(&frag.id).unwrap().is_none());
        assert!(store.get_annotation(&frag.id).unwrap().is_none());
        let stats = store.stats().unwrap();
        assert_eq!(stats.embeddings, 0);
        assert_eq!(stats.vectors, 0);
        assert!(store.hnsw_search(&[1.0, 0.0, 0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_rename_replaces_stale_id() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        let old = ingest(&store, "a.py", "calcTax", [1.0, 0.0, 0.0, 0.0]);

        // rename: same file, new fragment identity
        let renamed = fragment("a.py", "computeTax", 0);
        let record = FileRecord::new("a.py", "hash-2", 0, 1, "python");
        store
            .with_exclusive_lock("test-rename", || {
                store.upsert_file_fragments(
                    &record,
                    &[renamed.clone()],
                    &[annotation_for(&renamed)],
                    &[embedding_for(&renamed, [0.0, 1.0, 0.0, 0.0])],
                )
            })
            .unwrap();

        assert_ne!(old.id, renamed.id);
        assert!(store.get_fragment(&old.id).unwrap().is_none());
        let stats = store.stats().unwrap();
        assert_eq!(stats.fragments, 1);
        assert_eq!(stats.embeddings, 1);
        assert_eq!(stats.vectors, 1);

        let hits = store.hnsw_search(&[0.0, 1.0, 0.0, 0.0], 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, renamed.id);
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = TempDir::new().unwrap();
        let frag_id;
        {
            let store = test_store(&dir);
            let frag = ingest(&store, "a.py", "f", [1.0, 0.0, 0.0, 0.0]);
            store.save_vector_index().unwrap();
            frag_id = frag.id;
        }

        let store = Store::open(dir.path()).unwrap();
        assert!(!store.needs_rebuild());
        let hits = store.hnsw_search(&[1.0, 0.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].0, frag_id);
    }

    #[test]
    fn test_truncated_index_triggers_rebuild_path() {
        let dir = TempDir::new().unwrap();
        {
            let store = test_store(&dir);
            ingest(&store, "a.py", "f", [1.0, 0.0, 0.0, 0.0]);
            store.save_vector_index().unwrap();
        }

        // corrupt hnsw.bin
        let bin = dir.path().join(".codelens/hnsw.bin");
        let bytes = std::fs::read(&bin).unwrap();
        std::fs::write(&bin, &bytes[..bytes.len() / 2]).unwrap();

        let store = Store::open(dir.path()).unwrap();
        assert!(store.needs_rebuild());
        let err = store.hnsw_search(&[1.0, 0.0, 0.0, 0.0], 1).unwrap_err();
        assert_eq!(err.kind, codelens_core::ErrorKind::IndexCorrupt);

        assert!(store.try_begin_rebuild());
        store.rebuild_index().unwrap();
        assert!(!store.needs_rebuild());

        let hits = store.hnsw_search(&[1.0, 0.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_unsaved_index_detected_on_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = test_store(&dir);
            ingest(&store, "a.py", "f", [1.0, 0.0, 0.0, 0.0]);
            // no save_vector_index: embeddings.db has rows, hnsw files do not
        }

        let store = Store::open(dir.path()).unwrap();
        assert!(store.needs_rebuild());
        assert!(store.try_begin_rebuild());
        store.rebuild_index().unwrap();
        let hits = store.hnsw_search(&[1.0, 0.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_second_rebuild_claim_rejected() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        assert!(store.try_begin_rebuild());
        assert!(!store.try_begin_rebuild());
        store.rebuild_index().unwrap();
        assert!(store.try_begin_rebuild());
    }
}
