//! Fragment: the unit of indexing
//!
//! A fragment is a normalized AST node selected for indexing. Its ID is a
//! content address over `(file_path, kind, span, name)` so reparsing
//! unchanged source reproduces identical IDs and upsert-by-id works across
//! incremental runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::model::span::Span;

/// Normalized fragment kind vocabulary
///
/// Grammar node kinds from every language map into this shared set; the
/// per-language tables live in the language descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    Function,
    Method,
    Class,
    Interface,
    Enum,
    Module,
    Branch,
    Loop,
    Switch,
    ExceptionHandler,
    Statement,
}

impl FragmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FragmentKind::Function => "function",
            FragmentKind::Method => "method",
            FragmentKind::Class => "class",
            FragmentKind::Interface => "interface",
            FragmentKind::Enum => "enum",
            FragmentKind::Module => "module",
            FragmentKind::Branch => "branch",
            FragmentKind::Loop => "loop",
            FragmentKind::Switch => "switch",
            FragmentKind::ExceptionHandler => "exception_handler",
            FragmentKind::Statement => "statement",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "function" => Some(FragmentKind::Function),
            "method" => Some(FragmentKind::Method),
            "class" => Some(FragmentKind::Class),
            "interface" => Some(FragmentKind::Interface),
            "enum" => Some(FragmentKind::Enum),
            "module" => Some(FragmentKind::Module),
            "branch" => Some(FragmentKind::Branch),
            "loop" => Some(FragmentKind::Loop),
            "switch" => Some(FragmentKind::Switch),
            "exception_handler" => Some(FragmentKind::ExceptionHandler),
            "statement" => Some(FragmentKind::Statement),
            _ => None,
        }
    }

    /// Declaration kinds carry names and signatures; control-flow sites
    /// exist for complexity accounting.
    pub fn is_declaration(&self) -> bool {
        matches!(
            self,
            FragmentKind::Function
                | FragmentKind::Method
                | FragmentKind::Class
                | FragmentKind::Interface
                | FragmentKind::Enum
                | FragmentKind::Module
        )
    }

    /// Human wording used by the summary template.
    pub fn summary_word(&self) -> &'static str {
        match self {
            FragmentKind::Function => "Function",
            FragmentKind::Method => "Method",
            FragmentKind::Class => "Class",
            FragmentKind::Interface => "Interface",
            FragmentKind::Enum => "Enum",
            FragmentKind::Module => "Module",
            FragmentKind::Branch => "Branch",
            FragmentKind::Loop => "Loop",
            FragmentKind::Switch => "Switch",
            FragmentKind::ExceptionHandler => "Exception handler",
            FragmentKind::Statement => "Statement",
        }
    }
}

impl std::fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized AST fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// Content-address ID (32 hex chars)
    pub id: String,
    pub kind: FragmentKind,
    /// Declared name, if the node carries one
    pub name: Option<String>,
    pub span: Span,
    /// Nearest significant ancestor in the same file
    pub parent_id: Option<String>,
    /// Workspace-relative, normalized path
    pub file_path: String,
    /// Language tag (e.g. "python")
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Fragment {
    pub fn new(
        file_path: impl Into<String>,
        language: impl Into<String>,
        kind: FragmentKind,
        name: Option<String>,
        span: Span,
    ) -> Self {
        let file_path = file_path.into();
        let id = fragment_id(&file_path, kind, &span, name.as_deref());
        let now = Utc::now();
        Self {
            id,
            kind,
            name,
            span,
            parent_id: None,
            file_path,
            language: language.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

/// Width of a fragment ID in hex chars (128 bits of SHA-256)
pub const FRAGMENT_ID_WIDTH: usize = 32;

/// Deterministic content address for a fragment.
///
/// SHA-256 over `file_path | kind | start | end | name_or_empty`, truncated
/// to [`FRAGMENT_ID_WIDTH`] hex chars. Two parses of identical source
/// produce identical IDs; renaming a declaration produces a new one.
pub fn fragment_id(file_path: &str, kind: FragmentKind, span: &Span, name: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file_path.as_bytes());
    hasher.update(b"|");
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(format!("{}:{}", span.start_line, span.start_col).as_bytes());
    hasher.update(b"|");
    hasher.update(format!("{}:{}", span.end_line, span.end_col).as_bytes());
    hasher.update(b"|");
    hasher.update(name.unwrap_or("").as_bytes());

    let digest = hasher.finalize();
    let mut hex = String::with_capacity(FRAGMENT_ID_WIDTH);
    for byte in digest.iter().take(FRAGMENT_ID_WIDTH / 2) {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

/// Content hash for change detection (full SHA-256, hex)
pub fn content_hash(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_id_deterministic() {
        let span = Span::new(3, 0, 9, 1);
        let a = fragment_id("src/tax.js", FragmentKind::Function, &span, Some("calcTax"));
        let b = fragment_id("src/tax.js", FragmentKind::Function, &span, Some("calcTax"));
        assert_eq!(a, b);
        assert_eq!(a.len(), FRAGMENT_ID_WIDTH);
    }

    #[test]
    fn test_fragment_id_name_participates() {
        let span = Span::new(3, 0, 9, 1);
        let a = fragment_id("src/tax.js", FragmentKind::Function, &span, Some("calcTax"));
        let b = fragment_id(
            "src/tax.js",
            FragmentKind::Function,
            &span,
            Some("computeTax"),
        );
        assert_ne!(a, b);
    }

    #[test]
    fn test_fragment_id_span_participates() {
        let a = fragment_id(
            "a.py",
            FragmentKind::Function,
            &Span::new(0, 0, 4, 0),
            Some("f"),
        );
        let b = fragment_id(
            "a.py",
            FragmentKind::Function,
            &Span::new(1, 0, 5, 0),
            Some("f"),
        );
        assert_ne!(a, b);
    }

    #[test]
    fn test_fragment_id_unnamed() {
        let span = Span::new(2, 4, 2, 30);
        let a = fragment_id("a.py", FragmentKind::Branch, &span, None);
        let b = fragment_id("a.py", FragmentKind::Branch, &span, Some(""));
        // None and empty name address the same content
        assert_eq!(a, b);
    }

    #[test]
    fn test_kind_roundtrip() {
        for kind in [
            FragmentKind::Function,
            FragmentKind::Method,
            FragmentKind::Class,
            FragmentKind::Interface,
            FragmentKind::Enum,
            FragmentKind::Module,
            FragmentKind::Branch,
            FragmentKind::Loop,
            FragmentKind::Switch,
            FragmentKind::ExceptionHandler,
            FragmentKind::Statement,
        ] {
            assert_eq!(FragmentKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(FragmentKind::parse("unknown"), None);
    }

    #[test]
    fn test_content_hash_stable() {
        assert_eq!(content_hash(b"abc"), content_hash(b"abc"));
        assert_ne!(content_hash(b"abc"), content_hash(b"abd"));
        assert_eq!(content_hash(b"abc").len(), 64);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn id_is_deterministic_and_fixed_width(
                path in "[a-z/]{1,40}\\.py",
                start in 0u32..10_000,
                len in 0u32..500,
                name in proptest::option::of("[A-Za-z_][A-Za-z0-9_]{0,30}"),
            ) {
                let span = Span::new(start, 0, start + len, 0);
                let a = fragment_id(&path, FragmentKind::Function, &span, name.as_deref());
                let b = fragment_id(&path, FragmentKind::Function, &span, name.as_deref());
                prop_assert_eq!(&a, &b);
                prop_assert_eq!(a.len(), FRAGMENT_ID_WIDTH);
                prop_assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
            }

            #[test]
            fn id_separates_kinds(
                path in "[a-z]{1,20}\\.py",
                start in 0u32..10_000,
            ) {
                let span = Span::new(start, 0, start + 3, 0);
                let func = fragment_id(&path, FragmentKind::Function, &span, Some("x"));
                let class = fragment_id(&path, FragmentKind::Class, &span, Some("x"));
                prop_assert_ne!(func, class);
            }
        }
    }
}
