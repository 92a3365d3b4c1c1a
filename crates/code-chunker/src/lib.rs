//! # Corpus Code Chunker
//!
//! Hierarchical, structure-aware chunking of source code for model input.
//!
//! ## Philosophy
//!
//! The chunker cuts a corpus into chunks that:
//! - Never exceed the input share of a model context window
//! - Break at syntactic boundaries (classes, functions, statements) whenever
//!   a boundary exists
//! - Carry a bounded overlap from the previous chunk of the same file
//! - Reassemble losslessly into the original text once overlap is removed
//!
//! ## Architecture
//!
//! ```text
//! Source Unit (path + text)
//!     │
//!     ├──> Language Detection (from extension)
//!     │
//!     ├──> Parser Registry (acquired once per language)
//!     │    ├─> tree-sitter grammar
//!     │    ├─> heuristic line parser
//!     │    └─> none: the text becomes one opaque node
//!     │
//!     ├──> Hierarchy Extraction
//!     │    └─> directory → file → class/module → function/method → statement
//!     │
//!     └──> Chunk Assembly
//!          ├─> Greedy packing under the token budget
//!          ├─> Descend into nodes that do not fit
//!          ├─> Forced split of oversized leaves
//!          └─> Overlap from the previous chunk
//! ```
//!
//! ## Example
//!
//! ```rust
//! use corpus_code_chunker::{Chunker, ChunkerConfig};
//!
//! let chunker = Chunker::new(ChunkerConfig::for_context_length(4096)).unwrap();
//!
//! let code = r#"
//! fn process_data(input: &str) -> String {
//!     let cleaned = input.trim();
//!     cleaned.to_uppercase()
//! }
//! "#;
//!
//! for chunk in chunker.chunk_str("example.rs", code) {
//!     println!("{} [{}]: {} tokens", chunk.id, chunk.level, chunk.estimated_tokens);
//! }
//! ```

mod assembler;
mod budget;
mod chunker;
mod config;
mod corpus;
mod error;
mod hierarchy;
mod language;
mod levels;
pub mod parser;
mod source;
mod tokens;
mod types;

pub use assembler::ChunkAssembler;
pub use budget::TokenBudget;
pub use chunker::{Chunker, ChunkingStats};
pub use config::{ChunkerConfig, GroupingMode, OverlapStrategy, DEFAULT_CONTEXT_LENGTH};
pub use corpus::{CorpusOptions, CorpusScanner};
pub use error::{ChunkerError, Result};
pub use hierarchy::{Hierarchy, HierarchyExtractor, HierarchyNode};
pub use language::{BlockStyle, Language};
pub use levels::{HierarchyLevel, LevelTable};
pub use parser::{ParserBackend, ParserRegistry, RegistryOptions, StructuralParser};
pub use source::{SourceUnit, Span};
pub use tokens::{HeuristicEstimator, SpanEstimates, TokenEstimator};
pub use types::{Chunk, ChunkId, NodeRef, SourceRef, StructureSource};
