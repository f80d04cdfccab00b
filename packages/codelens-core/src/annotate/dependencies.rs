//! Dependency extraction
//!
//! Identifiers a fragment references but does not declare locally,
//! resolved best-effort against the file's import/usage table. Missing
//! imports yield an empty list, never an error.

use std::collections::HashSet;

use tree_sitter::Node;

use crate::lang::LanguageDescriptor;

/// Names the rest of the file makes resolvable: imported names plus
/// declaration names anywhere in the file.
pub struct FileContext {
    known: HashSet<String>,
}

impl FileContext {
    pub fn build(descriptor: &LanguageDescriptor, tree: &tree_sitter::Tree, source: &str) -> Self {
        let mut known = HashSet::new();
        collect_known(descriptor, &tree.root_node(), source, &mut known);
        Self { known }
    }

    pub fn resolves(&self, name: &str) -> bool {
        self.known.contains(name)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.known.len()
    }
}

fn collect_known(
    descriptor: &LanguageDescriptor,
    node: &Node,
    source: &str,
    known: &mut HashSet<String>,
) {
    if descriptor.import_kinds.contains(&node.kind()) {
        collect_identifiers(descriptor, node, source, known);
        return;
    }
    if descriptor.normalized_kind(node.kind()).is_some() {
        if let Some(name) = node.child_by_field_name("name") {
            known.insert(text(&name, source).to_string());
        }
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_known(descriptor, &child, source, known);
    }
}

fn collect_identifiers(
    descriptor: &LanguageDescriptor,
    node: &Node,
    source: &str,
    out: &mut HashSet<String>,
) {
    if descriptor.reference_kinds.contains(&node.kind()) || descriptor.name_kinds.contains(&node.kind()) {
        out.insert(text(node, source).to_string());
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_identifiers(descriptor, &child, source, out);
    }
}

/// Receiver-ish names never reported as dependencies
const IMPLICIT_NAMES: &[&str] = &["self", "this", "cls", "super", "_"];

/// Child fields that declare names rather than reference them
const DECLARING_FIELDS: &[&str] = &["name", "left", "pattern"];

/// Child fields holding member accesses (`obj.member`): the member side
/// is not an independent reference
const MEMBER_FIELDS: &[&str] = &["attribute", "property", "field"];

pub fn extract_dependencies(
    descriptor: &LanguageDescriptor,
    node: &Node,
    source: &str,
    context: &FileContext,
) -> Vec<String> {
    let mut declared: HashSet<String> = HashSet::new();
    collect_declared(descriptor, node, source, &mut declared);

    let mut seen = HashSet::new();
    let mut ordered = Vec::new();
    collect_references(descriptor, node, source, &mut |name: &str| {
        if declared.contains(name) || IMPLICIT_NAMES.contains(&name) {
            return;
        }
        if !context.resolves(name) {
            return;
        }
        if seen.insert(name.to_string()) {
            ordered.push(name.to_string());
        }
    });
    ordered
}

fn collect_declared(
    descriptor: &LanguageDescriptor,
    node: &Node,
    source: &str,
    declared: &mut HashSet<String>,
) {
    if descriptor.parameter_kinds.contains(&node.kind()) {
        collect_identifiers(descriptor, node, source, declared);
    }

    for i in 0..node.child_count() {
        let child = match node.child(i) {
            Some(child) => child,
            None => continue,
        };
        if let Some(field) = node.field_name_for_child(i as u32) {
            if DECLARING_FIELDS.contains(&field) {
                collect_identifiers(descriptor, &child, source, declared);
            }
            if field == "parameters" {
                collect_identifiers(descriptor, &child, source, declared);
            }
        }
        collect_declared(descriptor, &child, source, declared);
    }
}

fn collect_references(
    descriptor: &LanguageDescriptor,
    node: &Node,
    source: &str,
    sink: &mut impl FnMut(&str),
) {
    for i in 0..node.child_count() {
        let child = match node.child(i) {
            Some(child) => child,
            None => continue,
        };
        if let Some(field) = node.field_name_for_child(i as u32) {
            if MEMBER_FIELDS.contains(&field) {
                continue;
            }
        }
        if descriptor.reference_kinds.contains(&child.kind()) {
            sink(text(&child, source));
        }
        collect_references(descriptor, &child, source, sink);
    }
}

fn text<'a>(node: &Node, source: &'a str) -> &'a str {
    &source[node.start_byte()..node.end_byte()]
}
