//! Language descriptors
//!
//! Per-language behavior (significant-node set, kind normalization,
//! decision points, signature/body fields) is a capability table indexed by
//! language tag, not open-world polymorphism. One authoritative mapping per
//! language; deviations are explicit entries in that language's table.

mod go;
mod java;
mod kotlin;
mod python;
mod rust_lang;
mod typescript;

use crate::model::fragment::FragmentKind;

/// Supported programming languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    TypeScript,
    Rust,
    Go,
    Java,
    Kotlin,
}

impl Language {
    pub fn name(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::TypeScript => "typescript",
            Language::Rust => "rust",
            Language::Go => "go",
            Language::Java => "java",
            Language::Kotlin => "kotlin",
        }
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Language::Python => &["py", "pyi"],
            Language::TypeScript => &["ts"],
            Language::Rust => &["rs"],
            Language::Go => &["go"],
            Language::Java => &["java"],
            Language::Kotlin => &["kt", "kts"],
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "py" | "pyi" => Some(Language::Python),
            "ts" => Some(Language::TypeScript),
            "rs" => Some(Language::Rust),
            "go" => Some(Language::Go),
            "java" => Some(Language::Java),
            "kt" | "kts" => Some(Language::Kotlin),
            _ => None,
        }
    }

    pub fn from_file_path(path: &str) -> Option<Self> {
        match path.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => Self::from_extension(ext),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "python" => Some(Language::Python),
            "typescript" => Some(Language::TypeScript),
            "rust" => Some(Language::Rust),
            "go" => Some(Language::Go),
            "java" => Some(Language::Java),
            "kotlin" => Some(Language::Kotlin),
            _ => None,
        }
    }

    pub fn all() -> &'static [Language] {
        &[
            Language::Python,
            Language::TypeScript,
            Language::Rust,
            Language::Go,
            Language::Java,
            Language::Kotlin,
        ]
    }

    pub fn descriptor(&self) -> &'static LanguageDescriptor {
        match self {
            Language::Python => &python::DESCRIPTOR,
            Language::TypeScript => &typescript::DESCRIPTOR,
            Language::Rust => &rust_lang::DESCRIPTOR,
            Language::Go => &go::DESCRIPTOR,
            Language::Java => &java::DESCRIPTOR,
            Language::Kotlin => &kotlin::DESCRIPTOR,
        }
    }
}

/// Extra decision-point test for node kinds that need inspection beyond
/// their kind string (short-circuit operators, non-default case labels).
pub type DecisionPredicate = fn(&tree_sitter::Node, &str) -> bool;

/// Per-language capability table
pub struct LanguageDescriptor {
    pub language: Language,
    /// Compiled grammar constructor
    pub grammar: fn() -> tree_sitter::Language,
    /// Significant node kinds and their normalized fragment kinds
    pub significant: &'static [(&'static str, FragmentKind)],
    /// Node kinds that each contribute one decision point
    pub decision_kinds: &'static [&'static str],
    /// Node kinds handed to [`DecisionPredicate`] for inspection
    pub decision_inspect_kinds: &'static [&'static str],
    pub decision_predicate: Option<DecisionPredicate>,
    /// Kinds opening a nested complexity scope (not re-counted outward)
    pub scope_kinds: &'static [&'static str],
    /// Body child kinds; the signature is the text before the body
    pub body_kinds: &'static [&'static str],
    /// Child kinds holding the parameter list when the `parameters` field
    /// is absent
    pub parameter_kinds: &'static [&'static str],
    /// Identifier-like kinds counted as references
    pub reference_kinds: &'static [&'static str],
    /// Identifier-like kinds accepted as a declaration name
    pub name_kinds: &'static [&'static str],
    /// Import statement kinds feeding the per-file import table
    pub import_kinds: &'static [&'static str],
    /// Raw ancestor kinds inside which a Function is promoted to Method
    pub method_container_kinds: &'static [&'static str],
}

impl LanguageDescriptor {
    /// Normalized kind for a grammar node kind, if significant.
    pub fn normalized_kind(&self, node_kind: &str) -> Option<FragmentKind> {
        self.significant
            .iter()
            .find(|(k, _)| *k == node_kind)
            .map(|(_, fk)| *fk)
    }

    pub fn is_decision_point(&self, node: &tree_sitter::Node, source: &str) -> bool {
        let kind = node.kind();
        if self.decision_kinds.contains(&kind) {
            return true;
        }
        if self.decision_inspect_kinds.contains(&kind) {
            if let Some(predicate) = self.decision_predicate {
                return predicate(node, source);
            }
        }
        false
    }

    pub fn is_scope_boundary(&self, node_kind: &str) -> bool {
        self.scope_kinds.contains(&node_kind)
    }

    pub fn is_body(&self, node_kind: &str) -> bool {
        self.body_kinds.contains(&node_kind)
    }
}

/// Short-circuit test shared by the C-family grammars: a binary expression
/// whose operator child is `&&` or `||`.
pub(crate) fn short_circuit_binary(node: &tree_sitter::Node, _source: &str) -> bool {
    node.child_by_field_name("operator")
        .map(|op| matches!(op.kind(), "&&" | "||"))
        .unwrap_or(false)
}
