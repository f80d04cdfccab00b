//! CST walk: concrete syntax tree → normalized fragment stream
//!
//! Emits one fragment per significant node plus one per top-level
//! statement. `parent_id` is the nearest emitted ancestor, crossing
//! excluded intermediate nodes. Comments and trivia are skipped.

use std::collections::HashSet;

use tree_sitter::Node;

use crate::lang::LanguageDescriptor;
use crate::model::fragment::{Fragment, FragmentKind};
use crate::model::span::Span;

/// Fragment plus what is needed to re-locate its CST node
#[derive(Debug, Clone)]
pub struct ExtractedFragment {
    pub fragment: Fragment,
    pub start_byte: usize,
    pub end_byte: usize,
    /// Raw grammar kind, for disambiguating wrappers sharing a range
    pub ts_kind: String,
}

/// Wrapper kinds that are skipped without emitting a statement fragment;
/// their children are treated as if they sat at the wrapper's level.
const TRANSPARENT_KINDS: &[&str] = &["decorated_definition", "export_statement"];

/// Trivia kinds never emitted and never descended into
const SKIPPED_KINDS: &[&str] = &["comment", "decorator"];

pub fn extract_fragments(
    descriptor: &LanguageDescriptor,
    tree: &tree_sitter::Tree,
    source: &str,
    file_path: &str,
) -> Vec<ExtractedFragment> {
    let mut out = Vec::new();
    let mut seen_ids = HashSet::new();
    let root = tree.root_node();

    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        visit_top_level(
            descriptor,
            child,
            source,
            file_path,
            &mut out,
            &mut seen_ids,
        );
    }
    out
}

fn visit_top_level(
    descriptor: &LanguageDescriptor,
    node: Node,
    source: &str,
    file_path: &str,
    out: &mut Vec<ExtractedFragment>,
    seen_ids: &mut HashSet<String>,
) {
    if SKIPPED_KINDS.contains(&node.kind()) {
        return;
    }
    if TRANSPARENT_KINDS.contains(&node.kind()) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            visit_top_level(descriptor, child, source, file_path, out, seen_ids);
        }
        return;
    }

    if descriptor.normalized_kind(node.kind()).is_some() {
        visit(descriptor, node, source, file_path, None, false, out, seen_ids);
    } else {
        // Top-level statement: emitted as a fragment, and significant
        // descendants (if any) attach to it.
        let parent_id = emit(
            descriptor,
            node,
            FragmentKind::Statement,
            source,
            file_path,
            None,
            out,
            seen_ids,
        );
        let in_container = descriptor.method_container_kinds.contains(&node.kind());
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            visit(
                descriptor,
                child,
                source,
                file_path,
                parent_id.as_deref(),
                in_container,
                out,
                seen_ids,
            );
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn visit(
    descriptor: &LanguageDescriptor,
    node: Node,
    source: &str,
    file_path: &str,
    parent_id: Option<&str>,
    in_method_container: bool,
    out: &mut Vec<ExtractedFragment>,
    seen_ids: &mut HashSet<String>,
) {
    if SKIPPED_KINDS.contains(&node.kind()) {
        return;
    }

    let (own_id, child_container) = match descriptor.normalized_kind(node.kind()) {
        Some(mut kind) => {
            if kind == FragmentKind::Function && in_method_container {
                kind = FragmentKind::Method;
            }
            let id = emit(
                descriptor, node, kind, source, file_path, parent_id, out, seen_ids,
            );
            // Methods of a class attach under it; functions nested inside
            // a function are plain functions again.
            let container = if descriptor.method_container_kinds.contains(&node.kind()) {
                true
            } else {
                !kind.is_declaration() && in_method_container
            };
            (id, container)
        }
        None => {
            let container =
                in_method_container || descriptor.method_container_kinds.contains(&node.kind());
            (parent_id.map(str::to_string), container)
        }
    };

    let next_parent = own_id.as_deref().or(parent_id);
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        visit(
            descriptor,
            child,
            source,
            file_path,
            next_parent,
            child_container,
            out,
            seen_ids,
        );
    }
}

#[allow(clippy::too_many_arguments)]
fn emit(
    descriptor: &LanguageDescriptor,
    node: Node,
    kind: FragmentKind,
    source: &str,
    file_path: &str,
    parent_id: Option<&str>,
    out: &mut Vec<ExtractedFragment>,
    seen_ids: &mut HashSet<String>,
) -> Option<String> {
    let span = node_span(&node);
    let name = if kind.is_declaration() {
        extract_name(descriptor, &node, source)
    } else {
        None
    };

    let mut fragment = Fragment::new(file_path, descriptor.language.name(), kind, name, span);
    if let Some(parent) = parent_id {
        fragment = fragment.with_parent(parent);
    }

    // Wrapper nodes occasionally share an exact range with their only
    // child; the first emitted fragment wins.
    if !seen_ids.insert(fragment.id.clone()) {
        return Some(fragment.id);
    }

    let id = fragment.id.clone();
    out.push(ExtractedFragment {
        fragment,
        start_byte: node.start_byte(),
        end_byte: node.end_byte(),
        ts_kind: node.kind().to_string(),
    });
    Some(id)
}

pub fn node_span(node: &Node) -> Span {
    let start = node.start_position();
    let end = node.end_position();
    Span::new(
        start.row as u32,
        start.column as u32,
        end.row as u32,
        end.column as u32,
    )
}

/// Declared name of a node: the `name` field when present, otherwise the
/// first name-kind node within two levels (covers wrappers like Go's
/// `type_spec`).
pub fn extract_name(
    descriptor: &LanguageDescriptor,
    node: &Node,
    source: &str,
) -> Option<String> {
    if let Some(name_node) = node.child_by_field_name("name") {
        return Some(node_text(&name_node, source).to_string());
    }

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if descriptor.name_kinds.contains(&child.kind()) {
            return Some(node_text(&child, source).to_string());
        }
        if let Some(grandchild) = child.child_by_field_name("name") {
            return Some(node_text(&grandchild, source).to_string());
        }
    }
    None
}

pub fn node_text<'a>(node: &Node, source: &'a str) -> &'a str {
    &source[node.start_byte()..node.end_byte()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::Language;
    use crate::parser::pool::{GrammarProvider, ParserPool};

    fn parse(language: Language, source: &str) -> (tree_sitter::Tree, &'static LanguageDescriptor) {
        let provider = GrammarProvider::new();
        let pool = std::sync::Arc::new(ParserPool::new(language, &provider).unwrap());
        let mut lease = pool.lease().unwrap();
        (lease.parse(source).unwrap(), language.descriptor())
    }

    fn kinds_and_names(fragments: &[ExtractedFragment]) -> Vec<(FragmentKind, Option<String>)> {
        fragments
            .iter()
            .map(|f| (f.fragment.kind, f.fragment.name.clone()))
            .collect()
    }

    #[test]
    fn test_python_function_and_class() {
        let source = "\
class Account:
    def deposit(self, amount):
        if amount > 0:
            self.balance += amount

def helper():
    return 1
";
        let (tree, desc) = parse(Language::Python, source);
        let fragments = extract_fragments(desc, &tree, source, "bank.py");
        let kinds = kinds_and_names(&fragments);

        assert!(kinds.contains(&(FragmentKind::Class, Some("Account".to_string()))));
        assert!(kinds.contains(&(FragmentKind::Method, Some("deposit".to_string()))));
        assert!(kinds.contains(&(FragmentKind::Function, Some("helper".to_string()))));
        assert!(kinds.iter().any(|(k, _)| *k == FragmentKind::Branch));
    }

    #[test]
    fn test_python_parent_chain() {
        let source = "\
class Account:
    def deposit(self, amount):
        if amount > 0:
            pass
";
        let (tree, desc) = parse(Language::Python, source);
        let fragments = extract_fragments(desc, &tree, source, "bank.py");

        let class = fragments
            .iter()
            .find(|f| f.fragment.kind == FragmentKind::Class)
            .unwrap();
        let method = fragments
            .iter()
            .find(|f| f.fragment.kind == FragmentKind::Method)
            .unwrap();
        let branch = fragments
            .iter()
            .find(|f| f.fragment.kind == FragmentKind::Branch)
            .unwrap();

        assert_eq!(class.fragment.parent_id, None);
        assert_eq!(method.fragment.parent_id.as_deref(), Some(class.fragment.id.as_str()));
        assert_eq!(branch.fragment.parent_id.as_deref(), Some(method.fragment.id.as_str()));
    }

    #[test]
    fn test_typescript_declarations() {
        let source = "\
interface Shape {
    area(): number;
}

class Circle {
    radius: number;
    area(): number {
        return 3.14 * this.radius * this.radius;
    }
}

function calcTax(income, rate) {
    return income*rate;
}
";
        let (tree, desc) = parse(Language::TypeScript, source);
        let fragments = extract_fragments(desc, &tree, source, "shapes.ts");
        let kinds = kinds_and_names(&fragments);

        assert!(kinds.contains(&(FragmentKind::Interface, Some("Shape".to_string()))));
        assert!(kinds.contains(&(FragmentKind::Class, Some("Circle".to_string()))));
        assert!(kinds.contains(&(FragmentKind::Method, Some("area".to_string()))));
        assert!(kinds.contains(&(FragmentKind::Function, Some("calcTax".to_string()))));
    }

    #[test]
    fn test_rust_impl_methods() {
        let source = "\
struct Counter {
    value: u32,
}

impl Counter {
    fn bump(&mut self) {
        self.value += 1;
    }
}

fn free() {}
";
        let (tree, desc) = parse(Language::Rust, source);
        let fragments = extract_fragments(desc, &tree, source, "counter.rs");
        let kinds = kinds_and_names(&fragments);

        assert!(kinds.contains(&(FragmentKind::Class, Some("Counter".to_string()))));
        assert!(kinds.contains(&(FragmentKind::Method, Some("bump".to_string()))));
        assert!(kinds.contains(&(FragmentKind::Function, Some("free".to_string()))));
    }

    #[test]
    fn test_comment_only_file_yields_nothing() {
        let source = "# just a comment\n# another\n";
        let (tree, desc) = parse(Language::Python, source);
        let fragments = extract_fragments(desc, &tree, source, "empty.py");
        assert!(fragments.is_empty());
    }

    #[test]
    fn test_top_level_statement_emitted() {
        let source = "x = compute()\n";
        let (tree, desc) = parse(Language::Python, source);
        let fragments = extract_fragments(desc, &tree, source, "top.py");
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].fragment.kind, FragmentKind::Statement);
        assert_eq!(fragments[0].fragment.name, None);
    }

    #[test]
    fn test_decorated_function_not_wrapped_in_statement() {
        let source = "\
@cache
def fib(n):
    return n
";
        let (tree, desc) = parse(Language::Python, source);
        let fragments = extract_fragments(desc, &tree, source, "fib.py");
        let kinds = kinds_and_names(&fragments);
        assert!(kinds.contains(&(FragmentKind::Function, Some("fib".to_string()))));
        assert!(!kinds.iter().any(|(k, _)| *k == FragmentKind::Statement));
    }

    #[test]
    fn test_reparse_reproduces_ids() {
        let source = "\
def one():
    pass

def two():
    if True:
        pass
";
        let (tree_a, desc) = parse(Language::Python, source);
        let a = extract_fragments(desc, &tree_a, source, "same.py");
        let (tree_b, _) = parse(Language::Python, source);
        let b = extract_fragments(desc, &tree_b, source, "same.py");

        let ids_a: Vec<_> = a.iter().map(|f| f.fragment.id.clone()).collect();
        let ids_b: Vec<_> = b.iter().map(|f| f.fragment.id.clone()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn test_go_type_declaration_name() {
        let source = "\
package main

type Point struct {
    X int
    Y int
}

func dist(p Point) int {
    return p.X
}
";
        let (tree, desc) = parse(Language::Go, source);
        let fragments = extract_fragments(desc, &tree, source, "point.go");
        let kinds = kinds_and_names(&fragments);

        assert!(kinds.contains(&(FragmentKind::Class, Some("Point".to_string()))));
        assert!(kinds.contains(&(FragmentKind::Function, Some("dist".to_string()))));
    }
}
