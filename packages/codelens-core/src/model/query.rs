//! Query options and result records
//!
//! The result record wire shape is stable across consumers; canonical
//! options serialization feeds the cache key.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::model::fragment::FragmentKind;

/// Output rendering for the query consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Plain,
    Markdown,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Plain => "plain",
            OutputFormat::Markdown => "markdown",
        }
    }
}

/// Retrieval options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Result count (default from config when zero is never allowed)
    pub k: usize,
    /// Drop results scoring below this similarity
    pub min_score: Option<f32>,
    /// Restrict to file paths containing this substring
    pub file_filter: Option<String>,
    /// Restrict to a fragment kind
    pub kind_filter: Option<FragmentKind>,
    pub output_format: OutputFormat,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            k: 5,
            min_score: None,
            file_filter: None,
            kind_filter: None,
            output_format: OutputFormat::Json,
        }
    }
}

impl QueryOptions {
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Canonical serialization used for cache keys and the query log.
    ///
    /// Field order is fixed and min_score is rendered with a fixed
    /// precision so logically equal options always produce the same bytes.
    pub fn canonical(&self) -> String {
        format!(
            "k={};min_score={};file={};kind={};format={}",
            self.k,
            self.min_score
                .map(|s| format!("{:.6}", s))
                .unwrap_or_else(|| "-".to_string()),
            self.file_filter.as_deref().unwrap_or("-"),
            self.kind_filter
                .map(|k| k.as_str())
                .unwrap_or("-"),
            self.output_format.as_str()
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(EngineError::configuration("k must be positive"));
        }
        Ok(())
    }
}

/// One retrieval hit, hydrated
///
/// Wire shape:
/// `{ fragment_id, kind, name?, file_path, signature, summary,
///    complexity, dependencies, snippet, score }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub fragment_id: String,
    pub kind: FragmentKind,
    pub name: Option<String>,
    pub file_path: String,
    pub signature: String,
    pub summary: String,
    pub complexity: u32,
    pub dependencies: Vec<String>,
    pub snippet: String,
    pub score: f32,
    /// Start line of the fragment; participates in the tie-break order
    pub start_line: u32,
}

impl ResultRecord {
    /// Tie-break key: higher score, then lower path, then lower start line.
    pub fn rank_key(&self) -> (std::cmp::Reverse<ordered_score::OrderedScore>, String, u32) {
        (
            std::cmp::Reverse(ordered_score::OrderedScore(self.score)),
            self.file_path.clone(),
            self.start_line,
        )
    }
}

/// Total order over f32 scores (NaN sorts last).
pub mod ordered_score {
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct OrderedScore(pub f32);

    impl Eq for OrderedScore {}

    impl PartialOrd for OrderedScore {
        fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
            Some(self.cmp(other))
        }
    }

    impl Ord for OrderedScore {
        fn cmp(&self, other: &Self) -> std::cmp::Ordering {
            self.0
                .partial_cmp(&other.0)
                .unwrap_or(std::cmp::Ordering::Less)
        }
    }
}

/// Render a result list in the requested format.
pub fn render_results(records: &[ResultRecord], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(records)?),
        OutputFormat::Plain => {
            let mut out = String::new();
            for (i, r) in records.iter().enumerate() {
                out.push_str(&format!(
                    "{}. {} {} ({}:{}) score={:.4} complexity={}\n",
                    i + 1,
                    r.kind,
                    r.name.as_deref().unwrap_or("<anonymous>"),
                    r.file_path,
                    r.start_line,
                    r.score,
                    r.complexity
                ));
                out.push_str(&format!("   {}\n", r.signature));
            }
            Ok(out)
        }
        OutputFormat::Markdown => {
            let mut out = String::new();
            for r in records {
                out.push_str(&format!(
                    "### {} `{}` — {}:{} (score {:.4})\n\n",
                    r.kind.summary_word(),
                    r.name.as_deref().unwrap_or("anonymous"),
                    r.file_path,
                    r.start_line,
                    r.score
                ));
                out.push_str(&format!("{}\n\n```\n{}\n```\n\n", r.summary, r.snippet));
            }
            Ok(out)
        }
    }
}
