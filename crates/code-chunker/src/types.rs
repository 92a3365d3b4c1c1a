use crate::levels::HierarchyLevel;
use crate::source::Span;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Stable chunk identifier: the unit path (or directory for grouped
/// chunks) plus the chunk's position within it
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId {
    pub scope: String,
    pub seq: usize,
}

impl ChunkId {
    pub fn new(scope: impl Into<String>, seq: usize) -> Self {
        Self {
            scope: scope.into(),
            seq,
        }
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.scope, self.seq)
    }
}

/// A contiguous region of one source unit that a chunk was built from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Path of the source unit
    pub path: String,

    /// Byte span within the unit text
    pub span: Span,

    /// Start line (1-indexed)
    pub start_line: usize,

    /// End line (1-indexed, inclusive)
    pub end_line: usize,

    /// Enclosing hierarchy nodes, outermost first, down to the deepest node
    /// that contains the whole region
    #[serde(default)]
    pub ancestry: Vec<NodeRef>,
}

impl SourceRef {
    /// Get the number of lines covered
    #[must_use]
    pub const fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }

    /// Location of the region in the hierarchy, e.g.
    /// `shapes.py:class_definition[3-9] > function_definition[4-6]`
    #[must_use]
    pub fn hierarchy_path(&self) -> String {
        let name = Path::new(&self.path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.path);
        let segments: Vec<String> = self.ancestry.iter().map(NodeRef::to_string).collect();
        format!("{name}:{}", segments.join(" > "))
    }
}

/// Kind and line range of one hierarchy node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef {
    pub kind: String,
    pub start_line: usize,
    pub end_line: usize,
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}-{}]", self.kind, self.start_line, self.end_line)
    }
}

/// How the structure behind a chunk was obtained, from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureSource {
    /// Tree-sitter grammar
    Syntactic,
    /// Heuristic line parser
    Heuristic,
    /// No structure: the whole text was one opaque node
    Opaque,
}

/// A budget-bounded piece of source text handed to downstream consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,

    /// Coarsest hierarchy level among the nodes packed into the chunk
    pub level: HierarchyLevel,

    /// Overlap prefix followed by the chunk's own text
    pub content: String,

    /// Estimated token count of `content`
    pub estimated_tokens: usize,

    /// Regions the body was taken from, in order (overlap excluded)
    pub source_refs: Vec<SourceRef>,

    /// Number of leading characters of `content` repeated from the previous
    /// chunk
    pub overlap_prefix_len: usize,

    /// Set when the content cuts through a node that could not fit whole
    #[serde(default)]
    pub forced_split: bool,

    /// Worst structure quality among the contributing units
    pub structure: StructureSource,
}

impl Chunk {
    /// Content without the overlap prefix
    #[must_use]
    pub fn body(&self) -> &str {
        &self.content[self.overlap_end()..]
    }

    /// Overlap prefix repeated from the previous chunk
    #[must_use]
    pub fn overlap(&self) -> &str {
        &self.content[..self.overlap_end()]
    }

    /// Byte offset where the overlap prefix ends
    fn overlap_end(&self) -> usize {
        if self.overlap_prefix_len == 0 {
            return 0;
        }
        self.content
            .char_indices()
            .nth(self.overlap_prefix_len)
            .map_or(self.content.len(), |(idx, _)| idx)
    }

    /// Hierarchy paths of every source region, separated by `; `
    #[must_use]
    pub fn hierarchy_path(&self) -> String {
        let paths: Vec<String> = self.source_refs.iter().map(SourceRef::hierarchy_path).collect();
        paths.join("; ")
    }

    /// True when the structure could not be recovered for some source
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.structure == StructureSource::Opaque
    }

    /// Paths of the units the chunk draws from, without repeats
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = Vec::new();
        for source_ref in &self.source_refs {
            if paths.last() != Some(&source_ref.path.as_str()) {
                paths.push(&source_ref.path);
            }
        }
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: &str, overlap: usize) -> Chunk {
        Chunk {
            id: ChunkId::new("src/lib.rs", 1),
            level: HierarchyLevel::FunctionMethod,
            content: content.to_string(),
            estimated_tokens: 3,
            source_refs: vec![
                SourceRef {
                    path: "src/lib.rs".to_string(),
                    span: Span::new(10, 20),
                    start_line: 2,
                    end_line: 4,
                    ancestry: vec![NodeRef {
                        kind: "impl_item".to_string(),
                        start_line: 1,
                        end_line: 9,
                    }],
                },
                SourceRef {
                    path: "src/lib.rs".to_string(),
                    span: Span::new(20, 30),
                    start_line: 4,
                    end_line: 5,
                    ancestry: vec![
                        NodeRef {
                            kind: "impl_item".to_string(),
                            start_line: 1,
                            end_line: 9,
                        },
                        NodeRef {
                            kind: "function_item".to_string(),
                            start_line: 4,
                            end_line: 5,
                        },
                    ],
                },
            ],
            overlap_prefix_len: overlap,
            forced_split: false,
            structure: StructureSource::Syntactic,
        }
    }

    #[test]
    fn test_chunk_id_display() {
        assert_eq!(ChunkId::new("pkg/mod.py", 3).to_string(), "pkg/mod.py#3");
        assert!(ChunkId::new("a", 2) < ChunkId::new("a", 10));
    }

    #[test]
    fn test_body_and_overlap() {
        let chunk = chunk("tail\nfn next() {}", 5);
        assert_eq!(chunk.overlap(), "tail\n");
        assert_eq!(chunk.body(), "fn next() {}");
        assert!(!chunk.is_degraded());
        assert_eq!(chunk.paths(), vec!["src/lib.rs"]);
    }

    #[test]
    fn test_overlap_counts_characters() {
        let c = chunk("é✓\nfn f() {}", 3);
        assert_eq!(c.overlap(), "é✓\n");
        assert_eq!(c.body(), "fn f() {}");

        let whole = chunk("ü", 1);
        assert_eq!(whole.overlap(), "ü");
        assert_eq!(whole.body(), "");
    }

    #[test]
    fn test_hierarchy_path_format() {
        let chunk = chunk("x", 0);
        assert_eq!(
            chunk.source_refs[1].hierarchy_path(),
            "lib.rs:impl_item[1-9] > function_item[4-5]"
        );
        assert_eq!(
            chunk.hierarchy_path(),
            "lib.rs:impl_item[1-9]; lib.rs:impl_item[1-9] > function_item[4-5]"
        );
    }

    #[test]
    fn test_source_ref_lines() {
        let chunk = chunk("x", 0);
        assert_eq!(chunk.source_refs[0].line_count(), 3);
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_value(chunk("x", 0)).unwrap();
        assert_eq!(json["level"], "function_method");
        assert_eq!(json["structure"], "syntactic");
        assert_eq!(json["id"]["seq"], 1);
    }
}
