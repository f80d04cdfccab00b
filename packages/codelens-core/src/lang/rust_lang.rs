//! Rust language table
//!
//! `impl_item` is deliberately not significant: it is a container whose
//! functions surface as methods, mirroring class bodies elsewhere.

use crate::lang::{short_circuit_binary, Language, LanguageDescriptor};
use crate::model::fragment::FragmentKind;

pub(crate) static DESCRIPTOR: LanguageDescriptor = LanguageDescriptor {
    language: Language::Rust,
    grammar: tree_sitter_rust::language,
    significant: &[
        ("function_item", FragmentKind::Function),
        ("struct_item", FragmentKind::Class),
        ("enum_item", FragmentKind::Enum),
        ("trait_item", FragmentKind::Interface),
        ("mod_item", FragmentKind::Module),
        ("if_expression", FragmentKind::Branch),
        ("for_expression", FragmentKind::Loop),
        ("while_expression", FragmentKind::Loop),
        ("loop_expression", FragmentKind::Loop),
        ("match_expression", FragmentKind::Switch),
    ],
    decision_kinds: &[
        "if_expression",
        "for_expression",
        "while_expression",
        "match_arm",
    ],
    decision_inspect_kinds: &["binary_expression"],
    decision_predicate: Some(short_circuit_binary),
    scope_kinds: &["function_item", "closure_expression"],
    body_kinds: &[
        "block",
        "field_declaration_list",
        "enum_variant_list",
        "declaration_list",
    ],
    parameter_kinds: &["parameters"],
    reference_kinds: &["identifier", "type_identifier"],
    name_kinds: &["identifier", "type_identifier"],
    import_kinds: &["use_declaration"],
    method_container_kinds: &["impl_item", "trait_item"],
};
