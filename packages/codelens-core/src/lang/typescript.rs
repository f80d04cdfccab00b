//! TypeScript language table

use crate::lang::{short_circuit_binary, Language, LanguageDescriptor};
use crate::model::fragment::FragmentKind;

pub(crate) static DESCRIPTOR: LanguageDescriptor = LanguageDescriptor {
    language: Language::TypeScript,
    grammar: tree_sitter_typescript::language_typescript,
    significant: &[
        ("function_declaration", FragmentKind::Function),
        ("generator_function_declaration", FragmentKind::Function),
        ("method_definition", FragmentKind::Method),
        ("class_declaration", FragmentKind::Class),
        ("abstract_class_declaration", FragmentKind::Class),
        ("interface_declaration", FragmentKind::Interface),
        ("enum_declaration", FragmentKind::Enum),
        ("internal_module", FragmentKind::Module),
        ("if_statement", FragmentKind::Branch),
        ("for_statement", FragmentKind::Loop),
        ("for_in_statement", FragmentKind::Loop),
        ("while_statement", FragmentKind::Loop),
        ("do_statement", FragmentKind::Loop),
        ("switch_statement", FragmentKind::Switch),
        ("try_statement", FragmentKind::ExceptionHandler),
    ],
    decision_kinds: &[
        "if_statement",
        "for_statement",
        "for_in_statement",
        "while_statement",
        "do_statement",
        "switch_case",
        "catch_clause",
        "ternary_expression",
    ],
    decision_inspect_kinds: &["binary_expression"],
    decision_predicate: Some(short_circuit_binary),
    scope_kinds: &[
        "function_declaration",
        "generator_function_declaration",
        "method_definition",
        "arrow_function",
        "function_expression",
        "class_declaration",
    ],
    body_kinds: &["statement_block", "class_body", "enum_body", "object_type"],
    parameter_kinds: &["formal_parameters"],
    reference_kinds: &["identifier", "type_identifier"],
    name_kinds: &["identifier", "type_identifier", "property_identifier"],
    import_kinds: &["import_statement"],
    method_container_kinds: &[],
};
