use crate::assembler::ChunkAssembler;
use crate::budget::TokenBudget;
use crate::config::{ChunkerConfig, GroupingMode};
use crate::error::Result;
use crate::hierarchy::{Hierarchy, HierarchyExtractor};
use crate::parser::ParserRegistry;
use crate::source::SourceUnit;
use crate::tokens::{HeuristicEstimator, TokenEstimator};
use crate::types::Chunk;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Main chunker interface for processing code
pub struct Chunker {
    config: ChunkerConfig,
    registry: Arc<ParserRegistry>,
    estimator: Arc<dyn TokenEstimator>,
    extractor: HierarchyExtractor,
    assembler: ChunkAssembler,
}

impl Chunker {
    /// Create a chunker backed by the shared parser registry and the
    /// heuristic token estimator. Fails fast on an invalid configuration.
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        Self::with_parts(
            config,
            ParserRegistry::shared(),
            Arc::new(HeuristicEstimator::default()),
        )
    }

    /// Create a chunker from explicit collaborators
    pub fn with_parts(
        config: ChunkerConfig,
        registry: Arc<ParserRegistry>,
        estimator: Arc<dyn TokenEstimator>,
    ) -> Result<Self> {
        config.validate()?;
        let budget = config.budget()?;

        Ok(Self {
            extractor: HierarchyExtractor::new(Arc::clone(&registry), Arc::clone(&estimator)),
            assembler: ChunkAssembler::new(budget, config.overlap, Arc::clone(&estimator)),
            config,
            registry,
            estimator,
        })
    }

    /// Builder: use a different parser registry
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<ParserRegistry>) -> Self {
        self.extractor = HierarchyExtractor::new(Arc::clone(&registry), Arc::clone(&self.estimator));
        self.registry = registry;
        self
    }

    /// Builder: use a different token estimator
    #[must_use]
    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.extractor = HierarchyExtractor::new(Arc::clone(&self.registry), Arc::clone(&estimator));
        self.assembler = ChunkAssembler::new(
            self.assembler.budget(),
            self.config.overlap,
            Arc::clone(&estimator),
        );
        self.estimator = estimator;
        self
    }

    /// Get configuration
    #[must_use]
    pub const fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    #[must_use]
    pub fn budget(&self) -> TokenBudget {
        self.assembler.budget()
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ParserRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn estimator(&self) -> &dyn TokenEstimator {
        self.estimator.as_ref()
    }

    /// Extract the hierarchy of a unit without assembling chunks
    pub fn hierarchy(&self, unit: &SourceUnit) -> Hierarchy {
        self.extractor.extract_unit(unit)
    }

    /// Chunk one source unit. Empty text yields no chunks.
    pub fn chunk_unit(&self, unit: &SourceUnit) -> Vec<Chunk> {
        if unit.text().is_empty() {
            return Vec::new();
        }
        let hierarchy = self.hierarchy(unit);
        let chunks = self.assembler.assemble(unit, &hierarchy);
        log::debug!(
            "Chunked {} ({}, {:?} structure) into {} chunks",
            unit.path(),
            unit.language(),
            hierarchy.structure,
            chunks.len()
        );
        chunks
    }

    /// Chunk code from a string, detecting the language from `path`
    pub fn chunk_str(&self, path: &str, text: &str) -> Vec<Chunk> {
        self.chunk_unit(&SourceUnit::detect(path, text))
    }

    /// Chunk code from a file
    pub fn chunk_file(&self, path: impl AsRef<Path>) -> Result<Vec<Chunk>> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let unit = SourceUnit::detect(path.to_string_lossy().replace('\\', "/"), text);
        Ok(self.chunk_unit(&unit))
    }

    /// Chunk every unit on its own; units are processed in parallel and the
    /// result keeps input order.
    pub fn chunk_files(&self, units: &[SourceUnit]) -> Vec<Chunk> {
        let per_unit: Vec<Vec<Chunk>> = units.par_iter().map(|unit| self.chunk_unit(unit)).collect();
        per_unit.into_iter().flatten().collect()
    }

    /// Pack units sharing a parent directory together. Groups keep the order
    /// in which their first unit appears.
    pub fn chunk_directories(&self, units: &[SourceUnit]) -> Vec<Chunk> {
        let groups = group_by_directory(units);
        let per_group: Vec<Vec<Chunk>> = groups
            .par_iter()
            .map(|(directory, members)| {
                let hierarchies: Vec<Hierarchy> = members
                    .iter()
                    .map(|unit| self.extractor.extract_unit(unit))
                    .collect();
                let pairs: Vec<(&SourceUnit, &Hierarchy)> =
                    members.iter().copied().zip(hierarchies.iter()).collect();
                self.assembler.assemble_group(directory, &pairs)
            })
            .collect();
        per_group.into_iter().flatten().collect()
    }

    /// Chunk a corpus with the configured grouping mode
    pub fn chunk_corpus(&self, units: &[SourceUnit]) -> Vec<Chunk> {
        let chunks = match self.config.grouping {
            GroupingMode::PerFile => self.chunk_files(units),
            GroupingMode::PerDirectory => self.chunk_directories(units),
        };
        log::info!(
            "Chunked {} source units: {}",
            units.len(),
            Self::get_stats(&chunks)
        );
        chunks
    }

    /// Get statistics about chunking
    #[must_use]
    pub fn get_stats(chunks: &[Chunk]) -> ChunkingStats {
        let total_tokens: usize = chunks.iter().map(|c| c.estimated_tokens).sum();
        ChunkingStats {
            total_chunks: chunks.len(),
            total_lines: chunks
                .iter()
                .flat_map(|c| &c.source_refs)
                .map(|r| r.line_count())
                .sum(),
            total_tokens,
            avg_tokens_per_chunk: if chunks.is_empty() {
                0
            } else {
                total_tokens / chunks.len()
            },
            min_tokens: chunks.iter().map(|c| c.estimated_tokens).min().unwrap_or(0),
            max_tokens: chunks.iter().map(|c| c.estimated_tokens).max().unwrap_or(0),
            forced_splits: chunks.iter().filter(|c| c.forced_split).count(),
            degraded: chunks.iter().filter(|c| c.is_degraded()).count(),
        }
    }
}

fn group_by_directory(units: &[SourceUnit]) -> Vec<(String, Vec<&SourceUnit>)> {
    let mut groups: Vec<(String, Vec<&SourceUnit>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for unit in units {
        let directory = unit.directory();
        match index.get(&directory) {
            Some(&idx) => groups[idx].1.push(unit),
            None => {
                index.insert(directory.clone(), groups.len());
                groups.push((directory, vec![unit]));
            }
        }
    }
    groups
}

/// Statistics about chunking results
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkingStats {
    pub total_chunks: usize,
    pub total_lines: usize,
    pub total_tokens: usize,
    pub avg_tokens_per_chunk: usize,
    pub min_tokens: usize,
    pub max_tokens: usize,
    pub forced_splits: usize,
    pub degraded: usize,
}

impl std::fmt::Display for ChunkingStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Chunks: {} | Lines: {} | Tokens: {} | Avg: {} | Range: {}-{} | Forced: {} | Degraded: {}",
            self.total_chunks,
            self.total_lines,
            self.total_tokens,
            self.avg_tokens_per_chunk,
            self.min_tokens,
            self.max_tokens,
            self.forced_splits,
            self.degraded
        )
    }
}
