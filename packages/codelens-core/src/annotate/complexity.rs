//! Cyclomatic complexity
//!
//! Exactly `1 + D` where `D` is the number of decision points inside the
//! fragment's span. Nested function scopes are not re-counted for their
//! enclosing fragment.

use tree_sitter::Node;

use crate::lang::LanguageDescriptor;

pub fn cyclomatic_complexity(
    descriptor: &LanguageDescriptor,
    node: &Node,
    source: &str,
) -> u32 {
    1 + count_decisions(descriptor, node, source, true)
}

fn count_decisions(
    descriptor: &LanguageDescriptor,
    node: &Node,
    source: &str,
    is_root: bool,
) -> u32 {
    if !is_root && descriptor.is_scope_boundary(node.kind()) {
        return 0;
    }

    let mut count = if descriptor.is_decision_point(node, source) {
        1
    } else {
        0
    };

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        count += count_decisions(descriptor, &child, source, false);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::Language;
    use crate::parser::pool::{GrammarProvider, ParserPool};

    fn function_node(language: Language, source: &str, kind: &str) -> (tree_sitter::Tree, String) {
        let provider = GrammarProvider::new();
        let pool = std::sync::Arc::new(ParserPool::new(language, &provider).unwrap());
        let tree = pool.lease().unwrap().parse(source).unwrap();
        (tree, kind.to_string())
    }

    fn find<'a>(tree: &'a tree_sitter::Tree, kind: &str) -> tree_sitter::Node<'a> {
        let mut stack = vec![tree.root_node()];
        while let Some(node) = stack.pop() {
            if node.kind() == kind {
                return node;
            }
            for i in (0..node.child_count()).rev() {
                if let Some(child) = node.child(i) {
                    stack.push(child);
                }
            }
        }
        panic!("no {} node", kind);
    }

    #[test]
    fn test_straight_line_is_one() {
        let source = "def f(x):\n    return x * 2\n";
        let (tree, kind) = function_node(Language::Python, source, "function_definition");
        let node = find(&tree, &kind);
        assert_eq!(
            cyclomatic_complexity(Language::Python.descriptor(), &node, source),
            1
        );
    }

    #[test]
    fn test_python_branches_and_boolean_ops() {
        // if (+1), elif (+1), and (+1), for (+1) = 5
        let source = "\
def f(x, items):
    if x > 0 and x < 100:
        return 1
    elif x == 0:
        return 0
    for i in items:
        x += i
    return x
";
        let (tree, kind) = function_node(Language::Python, source, "function_definition");
        let node = find(&tree, &kind);
        assert_eq!(
            cyclomatic_complexity(Language::Python.descriptor(), &node, source),
            5
        );
    }

    #[test]
    fn test_python_except_counts() {
        let source = "\
def f():
    try:
        risky()
    except ValueError:
        pass
    except KeyError:
        pass
";
        let (tree, kind) = function_node(Language::Python, source, "function_definition");
        let node = find(&tree, &kind);
        // two except clauses
        assert_eq!(
            cyclomatic_complexity(Language::Python.descriptor(), &node, source),
            3
        );
    }

    #[test]
    fn test_nested_function_not_recounted() {
        let source = "\
def outer():
    def inner(x):
        if x:
            return 1
        return 0
    return inner
";
        let (tree, kind) = function_node(Language::Python, source, "function_definition");
        let node = find(&tree, &kind); // outer
        assert_eq!(
            cyclomatic_complexity(Language::Python.descriptor(), &node, source),
            1
        );
    }

    #[test]
    fn test_typescript_short_circuit_and_ternary() {
        // if (+1), && (+1), ternary (+1) = 4
        let source = "\
function check(a: number, b: number): number {
    if (a > 0 && b > 0) {
        return a > b ? a : b;
    }
    return 0;
}
";
        let (tree, kind) = function_node(Language::TypeScript, source, "function_declaration");
        let node = find(&tree, &kind);
        assert_eq!(
            cyclomatic_complexity(Language::TypeScript.descriptor(), &node, source),
            4
        );
    }

    #[test]
    fn test_typescript_switch_cases() {
        // two switch_case (+2); default not counted
        let source = "\
function label(n: number): string {
    switch (n) {
        case 0:
            return \"zero\";
        case 1:
            return \"one\";
        default:
            return \"many\";
    }
}
";
        let (tree, kind) = function_node(Language::TypeScript, source, "function_declaration");
        let node = find(&tree, &kind);
        assert_eq!(
            cyclomatic_complexity(Language::TypeScript.descriptor(), &node, source),
            3
        );
    }

    #[test]
    fn test_rust_match_arms() {
        // three match arms (+3), if (+1) = 5
        let source = "\
fn describe(n: i32) -> &'static str {
    if n < 0 {
        return \"negative\";
    }
    match n {
        0 => \"zero\",
        1 => \"one\",
        _ => \"many\",
    }
}
";
        let (tree, kind) = function_node(Language::Rust, source, "function_item");
        let node = find(&tree, &kind);
        assert_eq!(
            cyclomatic_complexity(Language::Rust.descriptor(), &node, source),
            5
        );
    }
}
