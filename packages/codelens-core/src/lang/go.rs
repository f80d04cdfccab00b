//! Go language table

use crate::lang::{short_circuit_binary, Language, LanguageDescriptor};
use crate::model::fragment::FragmentKind;

pub(crate) static DESCRIPTOR: LanguageDescriptor = LanguageDescriptor {
    language: Language::Go,
    grammar: tree_sitter_go::language,
    significant: &[
        ("function_declaration", FragmentKind::Function),
        ("method_declaration", FragmentKind::Method),
        ("type_declaration", FragmentKind::Class),
        ("if_statement", FragmentKind::Branch),
        ("for_statement", FragmentKind::Loop),
        ("expression_switch_statement", FragmentKind::Switch),
        ("type_switch_statement", FragmentKind::Switch),
        ("select_statement", FragmentKind::Switch),
    ],
    decision_kinds: &[
        "if_statement",
        "for_statement",
        "expression_case",
        "type_case",
        "communication_case",
    ],
    decision_inspect_kinds: &["binary_expression"],
    decision_predicate: Some(short_circuit_binary),
    scope_kinds: &["function_declaration", "method_declaration", "func_literal"],
    body_kinds: &["block"],
    parameter_kinds: &["parameter_list"],
    reference_kinds: &["identifier", "type_identifier", "field_identifier"],
    name_kinds: &["identifier", "type_identifier", "field_identifier"],
    import_kinds: &["import_declaration"],
    method_container_kinds: &[],
};
