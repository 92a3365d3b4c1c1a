use crate::budget::TokenBudget;
use crate::error::{ChunkerError, Result};
use serde::{Deserialize, Serialize};

/// Context length used when the configuration does not name one
pub const DEFAULT_CONTEXT_LENGTH: usize = 8192;

/// Configuration for code chunking behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Model context length in tokens; the input budget is derived from it
    pub context_length: usize,

    /// Overlap strategy for context preservation
    pub overlap: OverlapStrategy,

    /// Whether files are chunked alone or packed together per directory
    pub grouping: GroupingMode,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            context_length: DEFAULT_CONTEXT_LENGTH,
            overlap: OverlapStrategy::default(),
            grouping: GroupingMode::default(),
        }
    }
}

impl ChunkerConfig {
    /// Default configuration for a specific model context length
    pub fn for_context_length(context_length: usize) -> Self {
        Self {
            context_length,
            ..Default::default()
        }
    }

    /// Builder: disable overlap
    #[must_use]
    pub fn without_overlap(mut self) -> Self {
        self.overlap = OverlapStrategy::None;
        self
    }

    /// Builder: set overlap strategy
    #[must_use]
    pub fn overlap(mut self, overlap: OverlapStrategy) -> Self {
        self.overlap = overlap;
        self
    }

    /// Builder: set grouping mode
    #[must_use]
    pub fn grouping(mut self, grouping: GroupingMode) -> Self {
        self.grouping = grouping;
        self
    }

    /// Decode a TOML document; missing keys take their defaults
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Token budget derived from `context_length`
    pub fn budget(&self) -> Result<TokenBudget> {
        TokenBudget::new(self.context_length)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let budget = self.budget()?;

        if let OverlapStrategy::BudgetPercent(percent) = self.overlap {
            if percent > OverlapStrategy::MAX_PERCENT {
                return Err(ChunkerError::invalid_config(format!(
                    "overlap percent ({percent}) cannot exceed {}",
                    OverlapStrategy::MAX_PERCENT
                )));
            }
        }

        let cap = self.overlap.cap_tokens(&budget);
        if cap > budget.input_limit() / 2 {
            return Err(ChunkerError::invalid_config(format!(
                "overlap ({cap} tokens) cannot exceed half of the input limit ({})",
                budget.input_limit()
            )));
        }

        Ok(())
    }
}

/// Strategy for overlapping chunks to preserve context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapStrategy {
    /// No overlap between chunks
    None,

    /// Overlap of up to this percentage of the input limit
    BudgetPercent(u8),

    /// Fixed number of tokens overlap
    FixedTokens(usize),
}

impl OverlapStrategy {
    pub const MAX_PERCENT: u8 = 50;

    /// Upper bound on overlap tokens under `budget`
    #[must_use]
    pub fn cap_tokens(&self, budget: &TokenBudget) -> usize {
        match *self {
            Self::None => 0,
            Self::BudgetPercent(percent) => budget.input_limit() * usize::from(percent) / 100,
            Self::FixedTokens(tokens) => tokens,
        }
    }
}

impl Default for OverlapStrategy {
    fn default() -> Self {
        Self::BudgetPercent(20)
    }
}

/// Unit of packing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingMode {
    /// Each file is assembled on its own
    #[default]
    PerFile,

    /// Files sharing a parent directory are packed together
    PerDirectory,
}
