//! Change detection
//!
//! Resolves "which files must be (re)processed" from a selector plus the
//! store's file records. Deterministic for a fixed selector and
//! repository state: every class is ordered by path.

pub mod vcs;

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;
use walkdir::WalkDir;

use crate::config::ParseConfig;
use crate::error::{EngineError, Result};
use crate::lang::Language;
use crate::model::file_record::FileRecord;
use crate::model::fragment::content_hash;

pub use vcs::{GitOracle, VcsOracle};

/// Which files to consider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSelector {
    ChangedSinceHead,
    Staged,
    ChangedSinceRef(String),
    Glob(String),
    ForceAll,
}

/// Classified change set, each class ordered by workspace-relative path
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    /// Paths needing a (re)parse, in order.
    pub fn to_process(&self) -> impl Iterator<Item = &String> {
        self.added.iter().chain(self.modified.iter())
    }
}

pub struct ChangeDetector {
    workspace_root: PathBuf,
    /// Directory name of the engine's own data, always excluded
    data_dir_name: String,
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl ChangeDetector {
    pub fn new(
        workspace_root: impl Into<PathBuf>,
        data_dir_name: impl Into<String>,
        config: &ParseConfig,
    ) -> Result<Self> {
        let include = if config.include_globs.is_empty() {
            None
        } else {
            Some(build_glob_set(&config.include_globs)?)
        };
        let exclude = build_glob_set(&config.exclude_globs)?;

        Ok(Self {
            workspace_root: workspace_root.into(),
            data_dir_name: data_dir_name.into(),
            include,
            exclude,
        })
    }

    /// Resolve the selector into a classified change set.
    ///
    /// `records` is the store's file-record table keyed by relative path;
    /// `oracle` is consulted only by the VCS-backed selectors.
    pub fn detect(
        &self,
        selector: &FileSelector,
        records: &HashMap<String, FileRecord>,
        oracle: Option<&dyn VcsOracle>,
    ) -> Result<ChangeSet> {
        let candidates: BTreeSet<String> = match selector {
            FileSelector::ForceAll => self.walk_workspace(None)?,
            FileSelector::Glob(pattern) => {
                let set = build_glob_set(std::slice::from_ref(pattern))?;
                self.walk_workspace(Some(&set))?
            }
            FileSelector::ChangedSinceHead => self.filter_paths(
                self.oracle_required(oracle)?.changed_since_head()?,
            ),
            FileSelector::Staged => {
                self.filter_paths(self.oracle_required(oracle)?.staged_files()?)
            }
            FileSelector::ChangedSinceRef(reference) => self.filter_paths(
                self.oracle_required(oracle)?.diff_against(reference)?,
            ),
        };

        let mut change_set = self.classify(&candidates, records)?;

        // A full sweep also notices records whose files disappeared.
        if matches!(selector, FileSelector::ForceAll) {
            for rel in records.keys() {
                if !candidates.contains(rel) && !self.workspace_root.join(rel).is_file() {
                    change_set.removed.push(rel.clone());
                }
            }
            change_set.removed.sort();
            change_set.removed.dedup();
        }

        debug!(
            added = change_set.added.len(),
            modified = change_set.modified.len(),
            removed = change_set.removed.len(),
            "change detection complete"
        );
        Ok(change_set)
    }

    /// Classify candidate relative paths against the file records:
    /// *added* (no record), *modified* (content hash differs), *removed*
    /// (record exists, file gone). Output is ordered by path.
    pub fn classify(
        &self,
        candidates: &BTreeSet<String>,
        records: &HashMap<String, FileRecord>,
    ) -> Result<ChangeSet> {
        let mut change_set = ChangeSet::default();

        for rel in candidates {
            let abs = self.workspace_root.join(rel);
            if !abs.is_file() {
                if records.contains_key(rel) {
                    change_set.removed.push(rel.clone());
                }
                continue;
            }
            let bytes = std::fs::read(&abs)
                .map_err(|e| EngineError::from(e).with_path(&abs))?;
            let hash = content_hash(&bytes);
            match records.get(rel) {
                None => change_set.added.push(rel.clone()),
                Some(record) if record.content_hash != hash => {
                    change_set.modified.push(rel.clone())
                }
                Some(_) => {}
            }
        }
        Ok(change_set)
    }

    /// Relative, filter-admitted form of an absolute path, if any.
    pub fn admit_absolute(&self, path: &Path) -> Option<String> {
        let rel = normalize(path.strip_prefix(&self.workspace_root).ok()?);
        self.admits(&rel).then_some(rel)
    }

    pub fn absolute(&self, rel: &str) -> PathBuf {
        self.workspace_root.join(rel)
    }

    fn oracle_required<'a>(&self, oracle: Option<&'a dyn VcsOracle>) -> Result<&'a dyn VcsOracle> {
        oracle.ok_or_else(|| EngineError::vcs("no revision-control oracle configured"))
    }

    /// Workspace scan: supported-language files passing the glob filters.
    fn walk_workspace(&self, extra: Option<&GlobSet>) -> Result<BTreeSet<String>> {
        let mut out = BTreeSet::new();
        let walker = WalkDir::new(&self.workspace_root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                entry.file_name().to_str() != Some(self.data_dir_name.as_str())
                    && entry.file_name().to_str() != Some(".git")
            });

        for entry in walker {
            let entry = entry.map_err(|e| {
                EngineError::storage(format!("workspace walk failed: {}", e))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = match entry.path().strip_prefix(&self.workspace_root) {
                Ok(rel) => normalize(rel),
                Err(_) => continue,
            };
            if !self.admits(&rel) {
                continue;
            }
            if let Some(set) = extra {
                if !set.is_match(&rel) {
                    continue;
                }
            }
            out.insert(rel);
        }
        Ok(out)
    }

    fn filter_paths(&self, paths: Vec<String>) -> BTreeSet<String> {
        paths.into_iter().filter(|p| self.admits(p)).collect()
    }

    fn admits(&self, rel: &str) -> bool {
        if Language::from_file_path(rel).is_none() {
            return false;
        }
        if self.exclude.is_match(rel) {
            return false;
        }
        match &self.include {
            Some(include) => include.is_match(rel),
            None => true,
        }
    }
}

fn build_glob_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            EngineError::configuration(format!("invalid glob '{}': {}", pattern, e))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| EngineError::configuration(format!("glob set build failed: {}", e)))
}

fn normalize(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record_for(dir: &Path, rel: &str) -> FileRecord {
        let bytes = std::fs::read(dir.join(rel)).unwrap();
        FileRecord::new(rel, content_hash(&bytes), 0, 1, "python")
    }

    fn detector(dir: &Path) -> ChangeDetector {
        ChangeDetector::new(dir, ".codelens", &ParseConfig::default()).unwrap()
    }

    #[test]
    fn test_force_all_classifies_added() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        std::fs::write(dir.path().join("b.py"), "y = 2\n").unwrap();
        std::fs::write(dir.path().join("README.md"), "docs").unwrap();

        let detector = detector(dir.path());
        let changes = detector
            .detect(&FileSelector::ForceAll, &HashMap::new(), None)
            .unwrap();

        assert_eq!(changes.added, vec!["a.py".to_string(), "b.py".to_string()]);
        assert!(changes.modified.is_empty());
        assert!(changes.removed.is_empty());
    }

    #[test]
    fn test_unchanged_files_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();

        let mut records = HashMap::new();
        records.insert("a.py".to_string(), record_for(dir.path(), "a.py"));

        let detector = detector(dir.path());
        let changes = detector
            .detect(&FileSelector::ForceAll, &records, None)
            .unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_modified_detected_by_hash() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();

        let mut records = HashMap::new();
        records.insert("a.py".to_string(), record_for(dir.path(), "a.py"));

        std::fs::write(dir.path().join("a.py"), "x = 2\n").unwrap();

        let detector = detector(dir.path());
        let changes = detector
            .detect(&FileSelector::ForceAll, &records, None)
            .unwrap();
        assert_eq!(changes.modified, vec!["a.py".to_string()]);
    }

    #[test]
    fn test_removed_detected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();

        let mut records = HashMap::new();
        records.insert("a.py".to_string(), record_for(dir.path(), "a.py"));
        std::fs::remove_file(dir.path().join("a.py")).unwrap();

        let detector = detector(dir.path());
        let changes = detector
            .detect(&FileSelector::ForceAll, &records, None)
            .unwrap();
        assert_eq!(changes.removed, vec!["a.py".to_string()]);
    }

    #[test]
    fn test_glob_selector_limits_scope() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.py"), "x = 1\n").unwrap();
        std::fs::write(dir.path().join("top.py"), "y = 2\n").unwrap();

        let detector = detector(dir.path());
        let changes = detector
            .detect(
                &FileSelector::Glob("src/**".to_string()),
                &HashMap::new(),
                None,
            )
            .unwrap();
        assert_eq!(changes.added, vec!["src/a.py".to_string()]);
    }

    #[test]
    fn test_exclude_globs_respected() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/dep")).unwrap();
        std::fs::write(dir.path().join("node_modules/dep/x.py"), "x = 1\n").unwrap();
        std::fs::write(dir.path().join("app.py"), "a = 1\n").unwrap();

        let detector = detector(dir.path());
        let changes = detector
            .detect(&FileSelector::ForceAll, &HashMap::new(), None)
            .unwrap();
        assert_eq!(changes.added, vec!["app.py".to_string()]);
    }

    #[test]
    fn test_vcs_selector_without_oracle_fails() {
        let dir = TempDir::new().unwrap();
        let detector = detector(dir.path());
        let err = detector
            .detect(&FileSelector::ChangedSinceHead, &HashMap::new(), None)
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::VcsUnavailable);
    }

    #[test]
    fn test_vcs_selector_with_oracle() {
        let dir = TempDir::new().unwrap();
        vcs::test_support::repo_with_commit(dir.path(), &[("a.py", "x = 1\n")]);
        std::fs::write(dir.path().join("a.py"), "x = 2\n").unwrap();

        let mut records = HashMap::new();
        records.insert(
            "a.py".to_string(),
            FileRecord::new("a.py", content_hash(b"x = 1\n"), 0, 1, "python"),
        );

        let oracle = GitOracle::open(dir.path()).unwrap();
        let detector = detector(dir.path());
        let changes = detector
            .detect(&FileSelector::ChangedSinceHead, &records, Some(&oracle))
            .unwrap();
        assert_eq!(changes.modified, vec!["a.py".to_string()]);
    }

    #[test]
    fn test_deterministic_ordering() {
        let dir = TempDir::new().unwrap();
        for name in ["z.py", "a.py", "m.py"] {
            std::fs::write(dir.path().join(name), "x = 1\n").unwrap();
        }

        let detector = detector(dir.path());
        let first = detector
            .detect(&FileSelector::ForceAll, &HashMap::new(), None)
            .unwrap();
        let second = detector
            .detect(&FileSelector::ForceAll, &HashMap::new(), None)
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first.added,
            vec!["a.py".to_string(), "m.py".to_string(), "z.py".to_string()]
        );
    }
}
