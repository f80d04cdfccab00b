//! Workspace data-directory layout
//!
//! Ground truth on disk, under `<workspace>/.codelens/`:
//!
//! ```text
//! .codelens/
//!   fragments.db    fragments + annotations + file records
//!   embeddings.db   embedding rows
//!   hnsw.bin        vector blobs per handle
//!   hnsw.meta       handle↔id map + graph parameters + index version
//!   grammars/       cached precompiled grammars
//!   models/         embedding model artifacts (owned by the runtime)
//!   cache/l2/       one blob per L2 entry
//!   cache/l3.db     durable cache
//!   cache/queries.db query log
//!   config.json     persisted configuration
//!   .lock           advisory lock file
//! ```
//!
//! Paths are contractual; new entries may be added but none renamed.

use std::path::{Path, PathBuf};

use crate::error::Result;

pub const DATA_DIR_NAME: &str = ".codelens";

#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    workspace_root: PathBuf,
    data_dir: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        let workspace_root = workspace_root.into();
        let data_dir = workspace_root.join(DATA_DIR_NAME);
        Self {
            workspace_root,
            data_dir,
        }
    }

    /// Create every directory the layout needs.
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(self.grammars_dir())?;
        std::fs::create_dir_all(self.models_dir())?;
        std::fs::create_dir_all(self.l2_cache_dir())?;
        Ok(())
    }

    pub fn exists(&self) -> bool {
        self.data_dir.is_dir()
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn fragments_db(&self) -> PathBuf {
        self.data_dir.join("fragments.db")
    }

    pub fn embeddings_db(&self) -> PathBuf {
        self.data_dir.join("embeddings.db")
    }

    pub fn hnsw_bin(&self) -> PathBuf {
        self.data_dir.join("hnsw.bin")
    }

    pub fn hnsw_meta(&self) -> PathBuf {
        self.data_dir.join("hnsw.meta")
    }

    pub fn grammars_dir(&self) -> PathBuf {
        self.data_dir.join("grammars")
    }

    pub fn models_dir(&self) -> PathBuf {
        self.data_dir.join("models")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    pub fn l2_cache_dir(&self) -> PathBuf {
        self.cache_dir().join("l2")
    }

    pub fn l3_cache_db(&self) -> PathBuf {
        self.cache_dir().join("l3.db")
    }

    pub fn query_log_db(&self) -> PathBuf {
        self.cache_dir().join("queries.db")
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.data_dir.join(".lock")
    }
}
