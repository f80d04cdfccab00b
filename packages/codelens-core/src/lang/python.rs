//! Python language table

use crate::lang::{Language, LanguageDescriptor};
use crate::model::fragment::FragmentKind;

pub(crate) static DESCRIPTOR: LanguageDescriptor = LanguageDescriptor {
    language: Language::Python,
    grammar: tree_sitter_python::language,
    significant: &[
        ("function_definition", FragmentKind::Function),
        ("class_definition", FragmentKind::Class),
        ("if_statement", FragmentKind::Branch),
        ("for_statement", FragmentKind::Loop),
        ("while_statement", FragmentKind::Loop),
        ("match_statement", FragmentKind::Switch),
        ("try_statement", FragmentKind::ExceptionHandler),
    ],
    decision_kinds: &[
        "if_statement",
        "elif_clause",
        "for_statement",
        "while_statement",
        "except_clause",
        "case_clause",
        "conditional_expression",
        "boolean_operator",
    ],
    decision_inspect_kinds: &[],
    decision_predicate: None,
    scope_kinds: &["function_definition", "class_definition", "lambda"],
    body_kinds: &["block"],
    parameter_kinds: &["parameters", "lambda_parameters"],
    reference_kinds: &["identifier"],
    name_kinds: &["identifier"],
    import_kinds: &["import_statement", "import_from_statement"],
    method_container_kinds: &["class_definition"],
};
