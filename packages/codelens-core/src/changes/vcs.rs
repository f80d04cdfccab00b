//! Revision-control oracle
//!
//! Pure functions of repository state; failures surface as
//! *vcs-unavailable* and callers degrade to the glob or force-all
//! selectors per policy.

use std::path::Path;
use std::sync::Mutex;

use git2::{Repository, StatusOptions};

use crate::error::{EngineError, Result};

pub trait VcsOracle: Send + Sync {
    /// Working-tree paths differing from HEAD (staged or not), plus
    /// untracked files.
    fn changed_since_head(&self) -> Result<Vec<String>>;

    /// Paths staged in the index.
    fn staged_files(&self) -> Result<Vec<String>>;

    /// Paths differing between `reference` and the working tree.
    fn diff_against(&self, reference: &str) -> Result<Vec<String>>;
}

/// git2-backed oracle rooted at the workspace directory
pub struct GitOracle {
    repo: Mutex<Repository>,
}

impl GitOracle {
    pub fn open(workspace_root: &Path) -> Result<Self> {
        let repo = Repository::discover(workspace_root).map_err(|e| {
            EngineError::vcs(format!("no git repository at {}", workspace_root.display()))
                .with_path(workspace_root)
                .with_source(e)
        })?;
        Ok(Self {
            repo: Mutex::new(repo),
        })
    }

    fn statuses(&self, staged_only: bool) -> Result<Vec<String>> {
        let mut options = StatusOptions::new();
        options
            .include_untracked(!staged_only)
            .recurse_untracked_dirs(!staged_only);

        let repo = self.repo.lock().unwrap();
        let statuses = repo.statuses(Some(&mut options))?;
        let mut paths = Vec::new();
        for entry in statuses.iter() {
            let status = entry.status();
            let relevant = if staged_only {
                status.is_index_new()
                    || status.is_index_modified()
                    || status.is_index_deleted()
                    || status.is_index_renamed()
                    || status.is_index_typechange()
            } else {
                !status.is_ignored()
            };
            if relevant {
                if let Some(path) = entry.path() {
                    paths.push(path.to_string());
                }
            }
        }
        paths.sort();
        paths.dedup();
        Ok(paths)
    }
}

impl VcsOracle for GitOracle {
    fn changed_since_head(&self) -> Result<Vec<String>> {
        self.statuses(false)
    }

    fn staged_files(&self) -> Result<Vec<String>> {
        self.statuses(true)
    }

    fn diff_against(&self, reference: &str) -> Result<Vec<String>> {
        let repo = self.repo.lock().unwrap();
        let object = repo.revparse_single(reference).map_err(|e| {
            EngineError::vcs(format!("cannot resolve ref '{}'", reference)).with_source(e)
        })?;
        let tree = object.peel_to_tree().map_err(|e| {
            EngineError::vcs(format!("ref '{}' is not a tree-ish", reference)).with_source(e)
        })?;

        let diff = repo.diff_tree_to_workdir_with_index(Some(&tree), None)?;

        let mut paths = Vec::new();
        for delta in diff.deltas() {
            for file in [delta.old_file(), delta.new_file()] {
                if let Some(path) = file.path().and_then(|p| p.to_str()) {
                    paths.push(path.to_string());
                }
            }
        }
        paths.sort();
        paths.dedup();
        Ok(paths)
    }
}
