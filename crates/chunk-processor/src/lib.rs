//! # Corpus Chunk Processor
//!
//! Turns chunked source into model prompts and sends them through a
//! caller-supplied [`ModelClient`].
//!
//! The context window is split the same way the chunker splits it: 80% for
//! input and the rest for the response. Prompt overhead is paid out of the
//! input share, so the chunker runs with a smaller context length derived
//! from [`ProcessorSettings::chunker_config_for`].
//!
//! ## Example
//!
//! ```rust
//! use corpus_chunk_processor::{ChunkProcessor, ProcessorSettings, PromptTemplate};
//! use corpus_code_chunker::SourceUnit;
//!
//! let template = PromptTemplate::new("Summarize this code:\n\n{code}").unwrap();
//! let processor = ChunkProcessor::new(ProcessorSettings::default(), template).unwrap();
//!
//! let units = vec![SourceUnit::detect("hello.py", "def hello():\n    print('hi')\n")];
//! let prompts = processor.prepare(&units).unwrap();
//! assert_eq!(prompts.len(), 1);
//! assert!(prompts[0].prompt.contains("def hello"));
//! ```

mod dispatch;
mod error;
mod prepare;
mod settings;
mod template;

pub use dispatch::{dispatch_prompts, write_jsonl, ChunkOutcome, ModelClient};
pub use error::{ProcessorError, Result};
pub use prepare::{
    estimate_model_calls, prepare_prompts, CallEstimate, PreparedPrompt, FILE_HEADER,
};
pub use settings::{
    ProcessorSettings, CONTEXT_LENGTH_ENV, DEFAULT_MAX_CONCURRENT, DEFAULT_PROMPT_OVERHEAD,
};
pub use template::{PromptTemplate, CODE_PLACEHOLDER};

use corpus_code_chunker::{Chunker, SourceUnit};
use std::sync::Arc;

/// Chunker, template and settings bundled for one processing run
pub struct ChunkProcessor {
    settings: ProcessorSettings,
    template: PromptTemplate,
    chunker: Chunker,
}

impl ChunkProcessor {
    /// Build a processor; fails when the settings leave no room for code or
    /// the template text is larger than the configured overhead
    pub fn new(settings: ProcessorSettings, template: PromptTemplate) -> Result<Self> {
        settings.validate()?;
        let chunker = Chunker::new(settings.chunker_config_for(template.placeholder_count())?)?;

        let overhead = template.overhead_tokens(chunker.estimator());
        if overhead > settings.prompt_overhead_tokens {
            return Err(ProcessorError::invalid_setting(
                "prompt_overhead_tokens",
                settings.prompt_overhead_tokens.to_string(),
                format!("template text needs {overhead} tokens"),
            ));
        }

        Ok(Self {
            settings,
            template,
            chunker,
        })
    }

    /// Build a processor from the current environment
    pub fn from_env(template: PromptTemplate) -> Result<Self> {
        Self::new(ProcessorSettings::from_env()?, template)
    }

    #[must_use]
    pub const fn settings(&self) -> &ProcessorSettings {
        &self.settings
    }

    #[must_use]
    pub const fn template(&self) -> &PromptTemplate {
        &self.template
    }

    #[must_use]
    pub const fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    /// Chunk the corpus and render a prompt per chunk
    pub fn prepare(&self, units: &[SourceUnit]) -> Result<Vec<PreparedPrompt>> {
        let chunks = self.chunker.chunk_corpus(units);
        prepare_prompts(
            &chunks,
            &self.template,
            &self.settings,
            self.chunker.estimator(),
        )
    }

    /// Estimate the calls `units` would need
    pub fn estimate(&self, units: &[SourceUnit]) -> Result<CallEstimate> {
        estimate_model_calls(units, &self.settings)
    }

    /// Prepare and dispatch every prompt
    pub async fn process(
        &self,
        units: &[SourceUnit],
        client: Arc<dyn ModelClient>,
    ) -> Result<Vec<ChunkOutcome>> {
        let prompts = self.prepare(units)?;
        Ok(dispatch_prompts(prompts, client, self.settings.max_concurrent).await)
    }
}
