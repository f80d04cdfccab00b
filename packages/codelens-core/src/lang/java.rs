//! Java language table

use crate::lang::{Language, LanguageDescriptor};
use crate::model::fragment::FragmentKind;

/// Short-circuit binaries plus non-default case labels.
fn java_decision(node: &tree_sitter::Node, source: &str) -> bool {
    match node.kind() {
        "binary_expression" => node
            .child_by_field_name("operator")
            .map(|op| matches!(op.kind(), "&&" | "||"))
            .unwrap_or(false),
        "switch_label" => {
            let text = &source[node.start_byte()..node.end_byte()];
            !text.trim_start().starts_with("default")
        }
        _ => false,
    }
}

pub(crate) static DESCRIPTOR: LanguageDescriptor = LanguageDescriptor {
    language: Language::Java,
    grammar: tree_sitter_java::language,
    significant: &[
        ("method_declaration", FragmentKind::Method),
        ("constructor_declaration", FragmentKind::Method),
        ("class_declaration", FragmentKind::Class),
        ("interface_declaration", FragmentKind::Interface),
        ("enum_declaration", FragmentKind::Enum),
        ("if_statement", FragmentKind::Branch),
        ("for_statement", FragmentKind::Loop),
        ("enhanced_for_statement", FragmentKind::Loop),
        ("while_statement", FragmentKind::Loop),
        ("do_statement", FragmentKind::Loop),
        ("switch_expression", FragmentKind::Switch),
        ("try_statement", FragmentKind::ExceptionHandler),
        ("try_with_resources_statement", FragmentKind::ExceptionHandler),
    ],
    decision_kinds: &[
        "if_statement",
        "for_statement",
        "enhanced_for_statement",
        "while_statement",
        "do_statement",
        "catch_clause",
        "ternary_expression",
    ],
    decision_inspect_kinds: &["binary_expression", "switch_label"],
    decision_predicate: Some(java_decision),
    scope_kinds: &[
        "method_declaration",
        "constructor_declaration",
        "lambda_expression",
        "class_declaration",
    ],
    body_kinds: &[
        "block",
        "class_body",
        "interface_body",
        "enum_body",
        "constructor_body",
    ],
    parameter_kinds: &["formal_parameters"],
    reference_kinds: &["identifier", "type_identifier"],
    name_kinds: &["identifier", "type_identifier"],
    import_kinds: &["import_declaration"],
    method_container_kinds: &[],
};
