//! Annotation: per-fragment structural metadata
//!
//! One-to-one with a fragment; deleted with it (foreign-key cascade in the
//! fragment store).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel line inserted where a snippet was truncated
pub const SNIPPET_SENTINEL: &str = "  // ...";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub fragment_id: String,
    /// Declaration prototype (verbatim types where the language has them)
    pub signature: String,
    /// Terse templated summary; seeds the embedding text
    pub summary: String,
    /// `1 + count(decision points)`, always >= 1
    pub complexity: u32,
    /// Referenced-but-not-declared identifiers, first-occurrence order
    pub dependencies: Vec<String>,
    /// Line-truncated source text
    pub snippet: String,
    pub language: String,
    pub file_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Annotation {
    pub fn new(
        fragment_id: impl Into<String>,
        language: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            fragment_id: fragment_id.into(),
            signature: String::new(),
            summary: String::new(),
            complexity: 1,
            dependencies: Vec::new(),
            snippet: String::new(),
            language: language.into(),
            file_path: file_path.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Text handed to the embedder: `summary ‖ " " ‖ signature`.
    pub fn embedding_text(&self) -> String {
        if self.signature.is_empty() {
            self.summary.clone()
        } else {
            format!("{} {}", self.summary, self.signature)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_text_joins_summary_and_signature() {
        let mut anno = Annotation::new("abc", "python", "a.py");
        anno.summary = "Function f with 1 parameter".to_string();
        anno.signature = "def f(x):".to_string();
        assert_eq!(
            anno.embedding_text(),
            "Function f with 1 parameter def f(x):"
        );
    }

    #[test]
    fn test_embedding_text_without_signature() {
        let mut anno = Annotation::new("abc", "python", "a.py");
        anno.summary = "Branch".to_string();
        assert_eq!(anno.embedding_text(), "Branch");
    }

    #[test]
    fn test_default_complexity_floor() {
        let anno = Annotation::new("abc", "python", "a.py");
        assert_eq!(anno.complexity, 1);
    }
}
