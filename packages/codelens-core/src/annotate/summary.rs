//! Templated summaries
//!
//! Deterministic, terse; they exist to seed embeddings, not to be prose.

use tree_sitter::Node;

use crate::lang::LanguageDescriptor;
use crate::model::fragment::FragmentKind;

/// `"<Kind word> <name> with <N> parameter(s)"`, degrading gracefully when
/// the name or the parameter list is absent.
pub fn summarize(kind: FragmentKind, name: Option<&str>, param_count: Option<usize>) -> String {
    let mut out = kind.summary_word().to_string();
    if let Some(name) = name.filter(|n| !n.is_empty()) {
        out.push(' ');
        out.push_str(name);
    }
    if let Some(count) = param_count {
        let noun = if count == 1 { "parameter" } else { "parameters" };
        out.push_str(&format!(" with {} {}", count, noun));
    }
    out
}

/// Parameter count for declaration nodes: named children of the
/// `parameters` field, or of the first parameter-container child.
pub fn parameter_count(descriptor: &LanguageDescriptor, node: &Node) -> Option<usize> {
    if let Some(params) = node.child_by_field_name("parameters") {
        return Some(params.named_child_count());
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if descriptor.parameter_kinds.contains(&child.kind()) {
            return Some(child.named_child_count());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::Language;
    use crate::parser::pool::{GrammarProvider, ParserPool};

    #[test]
    fn test_summary_full() {
        assert_eq!(
            summarize(FragmentKind::Function, Some("calcTax"), Some(2)),
            "Function calcTax with 2 parameters"
        );
        assert_eq!(
            summarize(FragmentKind::Method, Some("get"), Some(1)),
            "Method get with 1 parameter"
        );
    }

    #[test]
    fn test_summary_degrades() {
        assert_eq!(summarize(FragmentKind::Class, Some("Tax"), None), "Class Tax");
        assert_eq!(summarize(FragmentKind::Branch, None, None), "Branch");
        assert_eq!(
            summarize(FragmentKind::Function, Some(""), Some(0)),
            "Function with 0 parameters"
        );
    }

    #[test]
    fn test_parameter_count_python() {
        let provider = GrammarProvider::new();
        let pool = std::sync::Arc::new(ParserPool::new(Language::Python, &provider).unwrap());
        let source = "def f(a, b, c):\n    pass\n";
        let tree = pool.lease().unwrap().parse(source).unwrap();
        let func = tree.root_node().named_child(0).unwrap();
        assert_eq!(func.kind(), "function_definition");
        assert_eq!(
            parameter_count(Language::Python.descriptor(), &func),
            Some(3)
        );
    }
}
