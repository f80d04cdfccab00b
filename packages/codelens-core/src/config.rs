//! Engine configuration
//!
//! Persisted as `config.json` in the workspace data directory. Every field
//! has a serde default so a partial file (or no file at all) yields a
//! working configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Parsing options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseConfig {
    /// Include globs applied before language detection (empty = all files)
    #[serde(default)]
    pub include_globs: Vec<String>,
    /// Exclude globs (matched against workspace-relative paths)
    #[serde(default = "default_exclude_globs")]
    pub exclude_globs: Vec<String>,
    /// Files larger than this are skipped with a parse error
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

fn default_exclude_globs() -> Vec<String> {
    vec![
        "**/.git/**".to_string(),
        "**/node_modules/**".to_string(),
        "**/target/**".to_string(),
    ]
}

fn default_max_file_bytes() -> u64 {
    1024 * 1024
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            include_globs: Vec::new(),
            exclude_globs: default_exclude_globs(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

/// Embedding model binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_model_id")]
    pub model_id: String,
    /// Vector dimension; fixed for the lifetime of the index
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    /// Maximum in-flight embedding batches before producers block
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Attempts per batch before the batch is marked failed
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
}

fn default_model_id() -> String {
    "hashing-v1".to_string()
}

fn default_dimension() -> usize {
    256
}

fn default_max_in_flight() -> usize {
    4
}

fn default_retry_attempts() -> u32 {
    3
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            dimension: default_dimension(),
            max_in_flight: default_max_in_flight(),
            retry_attempts: default_retry_attempts(),
        }
    }
}

/// HNSW graph parameters; changing any of these requires a rebuild
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HnswConfig {
    #[serde(default = "default_hnsw_m")]
    pub m: usize,
    #[serde(default = "default_ef_construction")]
    pub ef_construction: usize,
    #[serde(default = "default_ef_search")]
    pub ef_search: usize,
    #[serde(default = "default_metric")]
    pub metric: String,
}

fn default_hnsw_m() -> usize {
    16
}

fn default_ef_construction() -> usize {
    200
}

fn default_ef_search() -> usize {
    64
}

fn default_metric() -> String {
    "cosine".to_string()
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: default_hnsw_m(),
            ef_construction: default_ef_construction(),
            ef_search: default_ef_search(),
            metric: default_metric(),
        }
    }
}

/// Per-tier cache bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheTierConfig {
    /// L1 entry bound
    #[serde(default = "default_l1_max_entries")]
    pub l1_max_entries: usize,
    #[serde(default = "default_l1_ttl_ms")]
    pub l1_ttl_ms: u64,
    /// L2 total-size bound in bytes
    #[serde(default = "default_l2_max_bytes")]
    pub l2_max_bytes: u64,
    #[serde(default = "default_l2_ttl_ms")]
    pub l2_ttl_ms: u64,
    #[serde(default = "default_l3_ttl_ms")]
    pub l3_ttl_ms: u64,
}

fn default_l1_max_entries() -> usize {
    100
}

fn default_l1_ttl_ms() -> u64 {
    5 * 60 * 1000
}

fn default_l2_max_bytes() -> u64 {
    1024 * 1024 * 1024
}

fn default_l2_ttl_ms() -> u64 {
    60 * 60 * 1000
}

fn default_l3_ttl_ms() -> u64 {
    24 * 60 * 60 * 1000
}

impl Default for CacheTierConfig {
    fn default() -> Self {
        Self {
            l1_max_entries: default_l1_max_entries(),
            l1_ttl_ms: default_l1_ttl_ms(),
            l2_max_bytes: default_l2_max_bytes(),
            l2_ttl_ms: default_l2_ttl_ms(),
            l3_ttl_ms: default_l3_ttl_ms(),
        }
    }
}

/// Query serving options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Overfetch factor applied before post-filtering
    #[serde(default = "default_oversample")]
    pub oversample: usize,
    /// Soft deadline for a single query
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    /// Lines kept per snippet before truncation
    #[serde(default = "default_snippet_lines")]
    pub snippet_lines: usize,
}

fn default_top_k() -> usize {
    5
}

fn default_oversample() -> usize {
    3
}

fn default_deadline_ms() -> u64 {
    5000
}

fn default_snippet_lines() -> usize {
    10
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            oversample: default_oversample(),
            deadline_ms: default_deadline_ms(),
            snippet_lines: default_snippet_lines(),
        }
    }
}

/// Watcher options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Maximum files drained per flush
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_debounce_ms() -> u64 {
    200
}

fn default_batch_size() -> usize {
    512
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            batch_size: default_batch_size(),
        }
    }
}

/// Top-level engine configuration (`config.json`)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub parse: ParseConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub hnsw: HnswConfig,
    #[serde(default)]
    pub cache: CacheTierConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    /// Writer/reader lease acquisition timeout
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Query-log retention window
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u32,
}

fn default_lock_timeout_ms() -> u64 {
    30_000
}

fn default_log_retention_days() -> u32 {
    30
}

impl EngineConfig {
    /// Load from `config.json`, falling back to defaults when absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .map_err(|e| EngineError::from(e).with_path(path))?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            EngineError::configuration(format!("invalid config.json: {}", e))
                .with_path(path)
                .with_remediation("fix or delete config.json to restore defaults")
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Persist as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).map_err(|e| EngineError::from(e).with_path(path))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimension == 0 {
            return Err(EngineError::configuration(
                "embedding.dimension must be positive",
            ));
        }
        if self.hnsw.metric != "cosine" {
            return Err(EngineError::configuration(format!(
                "unsupported hnsw.metric '{}'",
                self.hnsw.metric
            ))
            .with_remediation("only 'cosine' is supported"));
        }
        if self.query.top_k == 0 {
            return Err(EngineError::configuration("query.top_k must be positive"));
        }
        if self.query.oversample == 0 {
            return Err(EngineError::configuration(
                "query.oversample must be positive",
            ));
        }
        if self.query.snippet_lines < 2 {
            return Err(EngineError::configuration(
                "query.snippet_lines must be at least 2",
            ));
        }
        Ok(())
    }
}
