use crate::source::Span;

/// A node produced by the heuristic parser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeuristicNode {
    pub kind: &'static str,
    pub span: Span,
    pub children: Vec<HeuristicNode>,
}

/// Output of a structural parser, independent of the backend that built it
#[derive(Debug)]
pub enum ParsedSource {
    /// Concrete syntax tree from a tree-sitter grammar
    Grammar(tree_sitter::Tree),
    /// Approximate tree inferred from indentation, braces and keywords
    Heuristic(HeuristicNode),
}

impl ParsedSource {
    /// Root node of the tree
    #[must_use]
    pub fn root(&self) -> SyntaxNode<'_> {
        match self {
            Self::Grammar(tree) => SyntaxNode::Grammar(tree.root_node()),
            Self::Heuristic(root) => SyntaxNode::Heuristic(root),
        }
    }
}

/// Read-only view of a parse-tree node.
///
/// Both backends answer the same three questions: what kind of node this is,
/// which bytes it covers, and which children it has (in source order).
#[derive(Debug, Clone, Copy)]
pub enum SyntaxNode<'t> {
    Grammar(tree_sitter::Node<'t>),
    Heuristic(&'t HeuristicNode),
}

impl<'t> SyntaxNode<'t> {
    #[must_use]
    pub fn kind(&self) -> &'t str {
        match self {
            Self::Grammar(node) => node.kind(),
            Self::Heuristic(node) => node.kind,
        }
    }

    #[must_use]
    pub fn span(&self) -> Span {
        match self {
            Self::Grammar(node) => Span::new(node.start_byte(), node.end_byte()),
            Self::Heuristic(node) => node.span,
        }
    }

    #[must_use]
    pub fn children(&self) -> Vec<SyntaxNode<'t>> {
        match self {
            Self::Grammar(node) => {
                let mut cursor = node.walk();
                node.children(&mut cursor).map(SyntaxNode::Grammar).collect()
            }
            Self::Heuristic(node) => node.children.iter().map(SyntaxNode::Heuristic).collect(),
        }
    }
}
