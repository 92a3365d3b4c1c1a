use crate::levels::{HierarchyLevel, LevelTable};
use crate::parser::{ParsedSource, ParserBackend, ParserRegistry, SyntaxNode};
use crate::source::{SourceUnit, Span};
use crate::tokens::TokenEstimator;
use crate::types::StructureSource;
use std::sync::Arc;

/// Node kind of the root that stands for the whole file
pub const FILE_KIND: &str = "file";
/// Node kind of the synthetic node used when no structure is available
pub const OPAQUE_KIND: &str = "opaque";
/// Deepest classified nesting kept below the root; deeper subtrees fold into
/// their outermost classified node
pub const MAX_DEPTH: usize = 96;

/// A classified node of a source unit.
///
/// Children are contained in the parent span, ordered by start offset and
/// pairwise disjoint. `estimated_tokens` covers the node's own span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyNode {
    pub kind: String,
    pub level: HierarchyLevel,
    pub span: Span,
    pub estimated_tokens: usize,
    pub children: Vec<HierarchyNode>,
}

impl HierarchyNode {
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Total number of nodes in this subtree, including `self`
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(HierarchyNode::node_count).sum::<usize>()
    }

    /// Finest level present in this subtree
    #[must_use]
    pub fn finest_level(&self) -> HierarchyLevel {
        self.children
            .iter()
            .map(HierarchyNode::finest_level)
            .fold(self.level, HierarchyLevel::max)
    }

    /// Depth-first, pre-order walk over the subtree
    pub fn walk(&self) -> impl Iterator<Item = &HierarchyNode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }
}

/// Root node of a unit plus how its structure was obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hierarchy {
    pub root: HierarchyNode,
    pub structure: StructureSource,
}

/// Builds hierarchy trees from parse trees
pub struct HierarchyExtractor {
    registry: Arc<ParserRegistry>,
    estimator: Arc<dyn TokenEstimator>,
}

impl HierarchyExtractor {
    pub fn new(registry: Arc<ParserRegistry>, estimator: Arc<dyn TokenEstimator>) -> Self {
        Self {
            registry,
            estimator,
        }
    }

    /// Parse a unit and extract its hierarchy.
    ///
    /// A grammar parse failure retries with the heuristic parser; when no
    /// tree can be built the unit degrades to a single opaque node.
    pub fn extract_unit(&self, unit: &SourceUnit) -> Hierarchy {
        let text = unit.text();
        let Some((parsed, backend)) = self.parse_unit(unit) else {
            return Hierarchy {
                root: self.opaque(text),
                structure: StructureSource::Opaque,
            };
        };

        let table = match backend {
            ParserBackend::Grammar => LevelTable::for_language(unit.language()),
            ParserBackend::Heuristic => LevelTable::heuristic(),
        };
        let structure = match backend {
            ParserBackend::Grammar => StructureSource::Syntactic,
            ParserBackend::Heuristic => StructureSource::Heuristic,
        };

        Hierarchy {
            root: self.extract(&parsed, table, text),
            structure,
        }
    }

    /// Classify a parse tree with `table`, returning a File-level root that
    /// covers the whole text. The parse-tree root itself is never classified.
    pub fn extract(&self, parsed: &ParsedSource, table: &LevelTable, text: &str) -> HierarchyNode {
        let children = self.collect(parsed.root(), table, text);
        self.node(FILE_KIND, HierarchyLevel::File, Span::new(0, text.len()), children, text)
    }

    /// Single Statement-level node spanning the whole text
    pub fn opaque(&self, text: &str) -> HierarchyNode {
        self.node(
            OPAQUE_KIND,
            HierarchyLevel::Statement,
            Span::new(0, text.len()),
            Vec::new(),
            text,
        )
    }

    fn parse_unit(&self, unit: &SourceUnit) -> Option<(ParsedSource, ParserBackend)> {
        let language = unit.language();
        let parser = self.registry.get_parser(language)?;

        let err = match parser.parse(unit.text()) {
            Ok(parsed) => return Some((parsed, parser.backend())),
            Err(e) => e,
        };
        log::warn!("Failed to parse {}: {err}", unit.path());

        if parser.backend() == ParserBackend::Grammar {
            let fallback = self.registry.fallback_parser(language)?;
            match fallback.parse(unit.text()) {
                Ok(parsed) => {
                    log::info!("Parsed {} with heuristic fallback", unit.path());
                    return Some((parsed, ParserBackend::Heuristic));
                }
                Err(e) => log::warn!("Heuristic fallback failed for {}: {e}", unit.path()),
            }
        }

        None
    }

    /// Walk the parse tree with an explicit stack so arbitrarily deep
    /// expression chains cannot exhaust the thread stack.
    fn collect(&self, root: SyntaxNode<'_>, table: &LevelTable, text: &str) -> Vec<HierarchyNode> {
        let spans = self.estimator.index(text);
        // open[0] gathers the root's children; every later entry is a
        // classified node still waiting for its subtree
        let mut open = vec![Pending::default()];
        let mut steps: Vec<Step<'_>> = root.children().into_iter().rev().map(Step::Visit).collect();

        while let Some(step) = steps.pop() {
            let node = match step {
                Step::Visit(node) => node,
                Step::Close => {
                    let Some(done) = open.pop() else { break };
                    let Some(parent) = open.last_mut() else { break };
                    parent.children.push(HierarchyNode {
                        kind: done.kind.to_string(),
                        level: done.level,
                        span: done.span,
                        estimated_tokens: spans.estimate_span(done.span),
                        children: done.children,
                    });
                    continue;
                }
            };

            let span = node.span();
            if span.is_empty() {
                continue;
            }

            match table.level_of(node.kind()) {
                // Past the nesting limit a classified node keeps its whole
                // subtree as one leaf
                Some(level) if open.len() >= MAX_DEPTH => {
                    if let Some(parent) = open.last_mut() {
                        parent.children.push(HierarchyNode {
                            kind: node.kind().to_string(),
                            level,
                            span,
                            estimated_tokens: spans.estimate_span(span),
                            children: Vec::new(),
                        });
                    }
                }
                Some(level) => {
                    open.push(Pending {
                        kind: node.kind(),
                        level,
                        span,
                        children: Vec::new(),
                    });
                    steps.push(Step::Close);
                    steps.extend(node.children().into_iter().rev().map(Step::Visit));
                }
                // Transparent kind: lift its classified descendants
                None => steps.extend(node.children().into_iter().rev().map(Step::Visit)),
            }
        }

        open.pop().map(|root| root.children).unwrap_or_default()
    }

    fn node(
        &self,
        kind: &str,
        level: HierarchyLevel,
        span: Span,
        children: Vec<HierarchyNode>,
        text: &str,
    ) -> HierarchyNode {
        HierarchyNode {
            kind: kind.to_string(),
            level,
            span,
            estimated_tokens: text
                .get(span.start..span.end)
                .map_or(0, |slice| self.estimator.estimate(slice)),
            children,
        }
    }
}

enum Step<'t> {
    Visit(SyntaxNode<'t>),
    Close,
}

struct Pending<'t> {
    kind: &'t str,
    level: HierarchyLevel,
    span: Span,
    children: Vec<HierarchyNode>,
}

impl Default for Pending<'_> {
    fn default() -> Self {
        Self {
            kind: FILE_KIND,
            level: HierarchyLevel::File,
            span: Span::new(0, 0),
            children: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;
    use crate::parser::RegistryOptions;
    use crate::tokens::HeuristicEstimator;

    fn extractor(options: RegistryOptions) -> HierarchyExtractor {
        HierarchyExtractor::new(
            Arc::new(ParserRegistry::with_options(options)),
            Arc::new(HeuristicEstimator::default()),
        )
    }

    fn assert_well_formed(node: &HierarchyNode) {
        let mut cursor = node.span.start;
        for child in &node.children {
            assert!(node.span.contains(&child.span), "{child:?} escapes {node:?}");
            assert!(child.span.start >= cursor, "children overlap");
            cursor = child.span.end;
            assert_well_formed(child);
        }
    }

    const PYTHON: &str = "\
import os

class Greeter:
    def greet(self, name):
        if name:
            return name
        return None

def main():
    print(Greeter().greet('x'))
";

    #[test]
    fn test_python_levels() {
        let unit = SourceUnit::new("greeter.py", Language::Python, PYTHON);
        let hierarchy = extractor(RegistryOptions::default()).extract_unit(&unit);
        assert_eq!(hierarchy.structure, StructureSource::Syntactic);

        let root = &hierarchy.root;
        assert_eq!(root.level, HierarchyLevel::File);
        assert_eq!(root.span, unit.full_span());

        let levels: Vec<_> = root.children.iter().map(|c| c.level).collect();
        assert_eq!(
            levels,
            vec![
                HierarchyLevel::Statement,
                HierarchyLevel::ClassModule,
                HierarchyLevel::FunctionMethod
            ]
        );

        let greet = &root.children[1].children[0];
        assert_eq!(greet.kind, "function_definition");
        assert_eq!(greet.children[0].kind, "if_statement");
        assert_eq!(greet.finest_level(), HierarchyLevel::Statement);
        assert_well_formed(root);
    }

    #[test]
    fn test_heuristic_folds_function_level() {
        let options = RegistryOptions::default().disable_grammar(Language::Python);
        let unit = SourceUnit::new("greeter.py", Language::Python, PYTHON);
        let hierarchy = extractor(options).extract_unit(&unit);
        assert_eq!(hierarchy.structure, StructureSource::Heuristic);

        let root = &hierarchy.root;
        assert!(root
            .walk()
            .all(|node| node.level != HierarchyLevel::FunctionMethod));
        assert_eq!(root.children[1].level, HierarchyLevel::ClassModule);
        assert_well_formed(root);
    }

    #[test]
    fn test_no_parser_yields_opaque_node() {
        let unit = SourceUnit::new("notes.xyz", Language::Unknown, "anything at all\n");
        let hierarchy = extractor(RegistryOptions::default()).extract_unit(&unit);
        assert_eq!(hierarchy.structure, StructureSource::Opaque);
        assert_eq!(hierarchy.root.level, HierarchyLevel::Statement);
        assert_eq!(hierarchy.root.kind, OPAQUE_KIND);
        assert_eq!(hierarchy.root.span, unit.full_span());
        assert!(hierarchy.root.is_leaf());
    }

    #[test]
    fn test_unparseable_text_degrades() {
        let options = RegistryOptions::default().disable_grammar(Language::Go);
        let unit = SourceUnit::new("blob.go", Language::Go, "pack\0age main\n");
        let hierarchy = extractor(options).extract_unit(&unit);
        assert_eq!(hierarchy.structure, StructureSource::Opaque);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let extractor = extractor(RegistryOptions::default());
        let unit = SourceUnit::new("greeter.py", Language::Python, PYTHON);
        let first = extractor.extract_unit(&unit);
        let second = extractor.extract_unit(&unit);
        assert_eq!(first, second);
    }

    #[test]
    fn test_estimates_cover_node_span() {
        let extractor = extractor(RegistryOptions::default());
        let unit = SourceUnit::new("greeter.py", Language::Python, PYTHON);
        let estimator = HeuristicEstimator::default();
        for node in extractor.extract_unit(&unit).root.walk() {
            assert_eq!(node.estimated_tokens, estimator.estimate(unit.slice(node.span)));
        }
    }

    #[test]
    fn test_deep_nesting_folds_at_max_depth() {
        let levels = MAX_DEPTH + 50;
        let mut code = String::new();
        for depth in 0..levels {
            code.push_str(&"    ".repeat(depth));
            code.push_str("if x:\n");
        }
        code.push_str(&"    ".repeat(levels));
        code.push_str("pass\n");

        let unit = SourceUnit::new("deep.py", Language::Python, code);
        let root = extractor(RegistryOptions::default()).extract_unit(&unit).root;

        let mut deepest = 0;
        let mut stack = vec![(&root, 0)];
        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            if depth == MAX_DEPTH {
                assert!(node.is_leaf(), "{} not folded", node.kind);
                assert_eq!(node.span.end, unit.text().trim_end().len());
            }
            stack.extend(node.children.iter().map(|child| (child, depth + 1)));
        }
        assert_eq!(deepest, MAX_DEPTH);
    }
}
