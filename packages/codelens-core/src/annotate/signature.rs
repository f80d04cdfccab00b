//! Signature extraction
//!
//! The declaration prototype is everything before the body child,
//! whitespace-normalized. Operates only on the fragment's span.

use tree_sitter::Node;

use crate::lang::LanguageDescriptor;

pub fn extract_signature(descriptor: &LanguageDescriptor, node: &Node, source: &str) -> String {
    let body_start = body_start_byte(descriptor, node);

    let raw = match body_start {
        Some(end) if end > node.start_byte() => &source[node.start_byte()..end],
        _ => first_line(&source[node.start_byte()..node.end_byte()]),
    };

    normalize_whitespace(raw)
}

/// Byte offset of the first body child, searched shallowly so a nested
/// function's body never truncates the enclosing signature.
fn body_start_byte(descriptor: &LanguageDescriptor, node: &Node) -> Option<usize> {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if descriptor.is_body(child.kind()) {
            return Some(child.start_byte());
        }
        if let Some(grandchild) = child
            .children(&mut child.walk())
            .find(|c| descriptor.is_body(c.kind()))
        {
            // e.g. Go's `type_spec` wrapping the struct body
            return Some(grandchild.start_byte());
        }
    }
    None
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
