//! Kotlin language table
//!
//! `conjunction_expression`/`disjunction_expression` are the grammar's
//! short-circuit nodes, so no operator inspection is needed here.

use crate::lang::{Language, LanguageDescriptor};
use crate::model::fragment::FragmentKind;

pub(crate) static DESCRIPTOR: LanguageDescriptor = LanguageDescriptor {
    language: Language::Kotlin,
    grammar: tree_sitter_kotlin::language,
    significant: &[
        ("function_declaration", FragmentKind::Function),
        ("class_declaration", FragmentKind::Class),
        ("object_declaration", FragmentKind::Class),
        ("if_expression", FragmentKind::Branch),
        ("for_statement", FragmentKind::Loop),
        ("while_statement", FragmentKind::Loop),
        ("do_while_statement", FragmentKind::Loop),
        ("when_expression", FragmentKind::Switch),
        ("try_expression", FragmentKind::ExceptionHandler),
    ],
    decision_kinds: &[
        "if_expression",
        "for_statement",
        "while_statement",
        "do_while_statement",
        "when_entry",
        "catch_block",
        "conjunction_expression",
        "disjunction_expression",
    ],
    decision_inspect_kinds: &[],
    decision_predicate: None,
    scope_kinds: &[
        "function_declaration",
        "lambda_literal",
        "anonymous_function",
        "class_declaration",
    ],
    body_kinds: &["function_body", "class_body"],
    parameter_kinds: &["function_value_parameters", "class_parameters"],
    reference_kinds: &["simple_identifier", "type_identifier"],
    name_kinds: &["simple_identifier", "type_identifier"],
    import_kinds: &["import_header"],
    method_container_kinds: &["class_declaration", "object_declaration"],
};
