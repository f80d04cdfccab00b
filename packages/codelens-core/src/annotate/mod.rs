//! Annotator: per-fragment structural metadata
//!
//! Computes signature, summary, complexity, dependencies, and snippet for
//! every fragment of a parsed file. Annotations are written with their
//! fragments in the same store transaction.

pub mod complexity;
pub mod dependencies;
pub mod signature;
pub mod snippet;
pub mod summary;

use tracing::debug;
use tree_sitter::Node;

use crate::model::annotation::Annotation;
use crate::parser::{ExtractedFragment, ParsedFile};

pub use complexity::cyclomatic_complexity;
pub use dependencies::{extract_dependencies, FileContext};
pub use signature::extract_signature;
pub use snippet::truncate_snippet;
pub use summary::{parameter_count, summarize};

pub struct Annotator {
    snippet_lines: usize,
}

impl Annotator {
    pub fn new(snippet_lines: usize) -> Self {
        Self { snippet_lines }
    }

    /// Annotate every fragment of one parsed file.
    pub fn annotate_file(&self, parsed: &ParsedFile) -> Vec<Annotation> {
        let descriptor = parsed.language.descriptor();
        let context = FileContext::build(descriptor, &parsed.tree, &parsed.source);
        let root = parsed.tree.root_node();

        let annotations = parsed
            .fragments
            .iter()
            .map(|extracted| {
                let node = locate(&root, extracted);
                self.annotate_one(parsed, extracted, node, &context)
            })
            .collect::<Vec<_>>();

        debug!(
            file = parsed.file_path.as_str(),
            annotations = annotations.len(),
            "annotated file"
        );
        annotations
    }

    fn annotate_one(
        &self,
        parsed: &ParsedFile,
        extracted: &ExtractedFragment,
        node: Node,
        context: &FileContext,
    ) -> Annotation {
        let descriptor = parsed.language.descriptor();
        let fragment = &extracted.fragment;
        let source = parsed.source.as_str();

        let mut annotation = Annotation::new(
            fragment.id.clone(),
            fragment.language.clone(),
            fragment.file_path.clone(),
        );

        annotation.signature = extract_signature(descriptor, &node, source);
        let params = if fragment.kind.is_declaration() {
            parameter_count(descriptor, &node)
        } else {
            None
        };
        annotation.summary = summarize(fragment.kind, fragment.name.as_deref(), params);
        annotation.complexity = cyclomatic_complexity(descriptor, &node, source);
        annotation.dependencies = extract_dependencies(descriptor, &node, source, context);
        annotation.snippet = truncate_snippet(
            &source[extracted.start_byte..extracted.end_byte],
            self.snippet_lines,
        );
        annotation
    }
}

/// Re-locate a fragment's CST node. Wrappers can share the exact byte
/// range; the recorded grammar kind disambiguates.
fn locate<'tree>(root: &Node<'tree>, extracted: &ExtractedFragment) -> Node<'tree> {
    let mut node = root
        .descendant_for_byte_range(extracted.start_byte, extracted.end_byte)
        .unwrap_or(*root);

    loop {
        if node.kind() == extracted.ts_kind
            && node.start_byte() == extracted.start_byte
            && node.end_byte() == extracted.end_byte
        {
            return node;
        }
        match node.parent() {
            Some(parent)
                if parent.start_byte() == extracted.start_byte
                    && parent.end_byte() == extracted.end_byte =>
            {
                node = parent
            }
            _ => return node,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParseConfig;
    use crate::lang::Language;
    use crate::model::fragment::FragmentKind;
    use crate::parser::FragmentParser;

    fn annotate(language: Language, path: &str, source: &str) -> (ParsedFile, Vec<Annotation>) {
        let parser = FragmentParser::new(ParseConfig::default());
        let parsed = parser
            .parse_source(language, path, source.to_string())
            .unwrap();
        let annotator = Annotator::new(10);
        let annotations = annotator.annotate_file(&parsed);
        (parsed, annotations)
    }

    #[test]
    fn test_annotations_one_to_one_with_fragments() {
        let source = "\
def first():
    pass

def second(x):
    if x:
        return 1
    return 0
";
        let (parsed, annotations) = annotate(Language::Python, "two.py", source);
        assert_eq!(parsed.fragments.len(), annotations.len());
        for (fragment, annotation) in parsed.fragments.iter().zip(&annotations) {
            assert_eq!(fragment.fragment.id, annotation.fragment_id);
            assert!(annotation.complexity >= 1);
        }
    }

    #[test]
    fn test_calc_tax_annotation() {
        let source = "function calcTax(income, rate) {\n    return income*rate;\n}\n";
        let (parsed, annotations) = annotate(Language::TypeScript, "tax.ts", source);

        let idx = parsed
            .fragments
            .iter()
            .position(|f| f.fragment.name.as_deref() == Some("calcTax"))
            .unwrap();
        let anno = &annotations[idx];

        assert_eq!(anno.summary, "Function calcTax with 2 parameters");
        assert_eq!(anno.complexity, 1);
        assert!(anno.dependencies.is_empty());
        assert!(anno.signature.contains("income"));
        assert!(anno.signature.contains("rate"));
        assert!(anno.snippet.contains("income*rate"));
    }

    #[test]
    fn test_long_function_snippet_truncated() {
        let body: String = (0..30).map(|i| format!("    x{} = {}\n", i, i)).collect();
        let source = format!("def big():\n{}", body);
        let (parsed, annotations) = annotate(Language::Python, "big.py", &source);

        let idx = parsed
            .fragments
            .iter()
            .position(|f| f.fragment.name.as_deref() == Some("big"))
            .unwrap();
        let anno = &annotations[idx];
        assert!(anno.snippet.contains(crate::model::SNIPPET_SENTINEL));
        assert!(anno.snippet.lines().count() <= 11);
    }

    #[test]
    fn test_branch_fragment_annotated() {
        let source = "\
def f(x):
    if x > 0:
        return 1
    return 0
";
        let (parsed, annotations) = annotate(Language::Python, "branch.py", source);
        let idx = parsed
            .fragments
            .iter()
            .position(|f| f.fragment.kind == FragmentKind::Branch)
            .unwrap();
        let anno = &annotations[idx];
        assert_eq!(anno.summary, "Branch");
        // the branch itself is a decision point within its own span
        assert_eq!(anno.complexity, 2);
    }
}
