//! Ingestion pipeline: change detection → parse → annotate → embed → store
//!
//! Per-file granularity throughout: parsing and annotation fan out over
//! a bounded rayon pool, embedding and the store submit run per file so
//! the writer lease is never held for more than one file's work.
//! Per-file errors are isolated; the batch degrades, the pipeline
//! survives.

use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use codelens_core::annotate::Annotator;
use codelens_core::changes::{ChangeDetector, ChangeSet, FileSelector, GitOracle, VcsOracle};
use codelens_core::model::{Annotation, FileRecord, Fragment};
use codelens_core::parser::FragmentParser;
use codelens_core::{EngineConfig, EngineError, Result};
use codelens_store::{Store, DATA_DIR_NAME};

use crate::embed::Embedder;

/// Outcome of one ingestion run
#[derive(Debug, Default)]
pub struct IngestReport {
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
    pub fragments_written: usize,
    /// `(path, error)` for files skipped by per-file isolation
    pub skipped: Vec<(String, EngineError)>,
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl IngestReport {
    pub fn files_processed(&self) -> usize {
        self.added + self.modified
    }
}

struct PreparedFile {
    record: FileRecord,
    fragments: Vec<Fragment>,
    annotations: Vec<Annotation>,
    /// `(fragment_id, embedding text)` in fragment order
    embed_batch: Vec<(String, String)>,
}

pub struct IngestPipeline {
    store: Arc<Store>,
    parser: Arc<FragmentParser>,
    annotator: Arc<Annotator>,
    embedder: Arc<Embedder>,
    detector: ChangeDetector,
    workers: rayon::ThreadPool,
}

impl IngestPipeline {
    pub fn new(store: Arc<Store>, embedder: Arc<Embedder>) -> Result<Self> {
        let config: &EngineConfig = store.config();
        let detector = ChangeDetector::new(
            store.layout().workspace_root(),
            DATA_DIR_NAME,
            &config.parse,
        )?;
        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(num_cpus::get().min(8))
            .thread_name(|i| format!("codelens-parse-{i}"))
            .build()
            .map_err(|e| EngineError::internal(format!("worker pool: {e}")))?;

        Ok(Self {
            parser: Arc::new(FragmentParser::new(config.parse.clone())),
            annotator: Arc::new(Annotator::new(config.query.snippet_lines)),
            store,
            embedder,
            detector,
            workers,
        })
    }

    /// Resolve the selector and ingest the resulting change set.
    pub async fn run(
        &self,
        selector: &FileSelector,
        cancel: &CancellationToken,
    ) -> Result<IngestReport> {
        let records = self.store.file_records()?;
        let oracle = self.open_oracle(selector)?;
        let changes =
            self.detector
                .detect(selector, &records, oracle.as_ref().map(|o| o as &dyn VcsOracle))?;
        self.ingest_changes(&changes, cancel).await
    }

    /// Classify and ingest a batch of absolute paths (the watcher's
    /// drain path). Paths outside the workspace or the glob filters are
    /// ignored.
    pub async fn ingest_paths(
        &self,
        paths: &[std::path::PathBuf],
        cancel: &CancellationToken,
    ) -> Result<IngestReport> {
        let candidates: std::collections::BTreeSet<String> = paths
            .iter()
            .filter_map(|p| self.detector.admit_absolute(p))
            .collect();
        let records = self.store.file_records()?;
        let changes = self.detector.classify(&candidates, &records)?;
        self.ingest_changes(&changes, cancel).await
    }

    /// Ingest an already-classified change set.
    pub async fn ingest_changes(
        &self,
        changes: &ChangeSet,
        cancel: &CancellationToken,
    ) -> Result<IngestReport> {
        let started = Instant::now();
        let mut report = IngestReport {
            added: changes.added.len(),
            modified: changes.modified.len(),
            removed: changes.removed.len(),
            ..IngestReport::default()
        };

        if changes.is_empty() {
            report.duration_ms = started.elapsed().as_millis() as u64;
            return Ok(report);
        }

        info!(
            added = changes.added.len(),
            modified = changes.modified.len(),
            removed = changes.removed.len(),
            "ingestion starting"
        );

        for path in &changes.removed {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            self.store
                .with_exclusive_lock("delete-file", || self.store.delete_file(path))?;
        }

        // A broken grammar disables its whole language for the batch
        // instead of failing file by file.
        let mut usable: std::collections::HashMap<codelens_core::Language, bool> =
            std::collections::HashMap::new();
        let to_process: Vec<String> = changes
            .to_process()
            .filter(|path| match codelens_core::Language::from_file_path(path) {
                Some(language) => *usable
                    .entry(language)
                    .or_insert_with(|| self.parser.language_available(language)),
                None => false,
            })
            .cloned()
            .collect();
        let prepared = self.parse_and_annotate(to_process, cancel);

        let mut wrote_any = false;
        for (path, outcome) in prepared {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            match outcome {
                Ok(Some(file)) => match self.embed_and_submit(file).await {
                    Ok(written) => {
                        wrote_any = true;
                        report.fragments_written += written;
                    }
                    Err(e) => {
                        warn!(file = path.as_str(), error = %e, "file skipped at embed/submit");
                        report.skipped.push((path, e));
                    }
                },
                Ok(None) => {} // unsupported language
                Err(e) => {
                    warn!(file = path.as_str(), error = %e, "file skipped at parse");
                    report.skipped.push((path, e));
                }
            }
        }

        if wrote_any || report.removed > 0 {
            self.store
                .with_exclusive_lock("save-index", || self.store.save_vector_index())?;
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            files = report.files_processed(),
            fragments = report.fragments_written,
            skipped = report.skipped.len(),
            duration_ms = report.duration_ms,
            "ingestion complete"
        );
        Ok(report)
    }

    /// Parse and annotate up to `P` files in parallel, preserving input
    /// order. Cancellation is honored at file boundaries.
    fn parse_and_annotate(
        &self,
        paths: Vec<String>,
        cancel: &CancellationToken,
    ) -> Vec<(String, Result<Option<PreparedFile>>)> {
        let parser = Arc::clone(&self.parser);
        let annotator = Arc::clone(&self.annotator);
        let detector = &self.detector;

        self.workers.install(|| {
            paths
                .into_par_iter()
                .map(|rel| {
                    if cancel.is_cancelled() {
                        return (rel, Ok(None));
                    }
                    let abs = detector.absolute(&rel);
                    let outcome = parser.parse_file(&abs, &rel).map(|parsed| {
                        parsed.map(|parsed| {
                            let annotations = annotator.annotate_file(&parsed);
                            let embed_batch = parsed
                                .fragments
                                .iter()
                                .zip(&annotations)
                                .map(|(f, a)| (f.fragment.id.clone(), a.embedding_text()))
                                .collect();
                            let mtime_ns = std::fs::metadata(&abs)
                                .and_then(|m| m.modified())
                                .ok()
                                .and_then(|t| {
                                    t.duration_since(std::time::UNIX_EPOCH)
                                        .ok()
                                        .map(|d| d.as_nanos() as i64)
                                })
                                .unwrap_or(0);
                            PreparedFile {
                                record: FileRecord::new(
                                    rel.clone(),
                                    parsed.content_hash.clone(),
                                    mtime_ns,
                                    parsed.fragments.len(),
                                    parsed.language.name(),
                                ),
                                fragments: parsed
                                    .fragments
                                    .iter()
                                    .map(|f| f.fragment.clone())
                                    .collect(),
                                annotations,
                                embed_batch,
                            }
                        })
                    });
                    (rel, outcome)
                })
                .collect()
        })
    }

    /// Embed one file's fragments and submit everything in one store
    /// transaction. An embed failure withholds the whole submit so the
    /// file keeps its previous persisted state.
    async fn embed_and_submit(&self, file: PreparedFile) -> Result<usize> {
        let embeddings = self.embedder.embed_fragments(&file.embed_batch).await?;
        let written = file.fragments.len();
        self.store.with_exclusive_lock("ingest-file", || {
            self.store.upsert_file_fragments(
                &file.record,
                &file.fragments,
                &file.annotations,
                &embeddings,
            )
        })?;
        Ok(written)
    }

    fn open_oracle(&self, selector: &FileSelector) -> Result<Option<GitOracle>> {
        match selector {
            FileSelector::ChangedSinceHead
            | FileSelector::Staged
            | FileSelector::ChangedSinceRef(_) => {
                GitOracle::open(self.store.layout().workspace_root()).map(Some)
            }
            FileSelector::Glob(_) | FileSelector::ForceAll => Ok(None),
        }
    }
}
