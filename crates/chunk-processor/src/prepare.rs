use crate::error::Result;
use crate::settings::ProcessorSettings;
use crate::template::PromptTemplate;
use corpus_code_chunker::{Chunk, ChunkId, HeuristicEstimator, SourceUnit, TokenEstimator};
use serde::{Deserialize, Serialize};

/// A chunk rendered into a prompt, ready for a model call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedPrompt {
    pub chunk_id: ChunkId,

    /// Paths of the files the chunk covers
    pub files: Vec<String>,

    pub prompt: String,

    /// Code tokens (once per placeholder) plus template overhead
    pub token_count: usize,

    /// Tokens left in the context window for the response
    pub estimated_response_tokens: usize,
}

/// Line that introduces each file of a chunk spanning several files
pub const FILE_HEADER: &str = "# FILE: ";

/// Render each chunk that fits the effective input limit.
///
/// Chunks over the limit are skipped with a warning; with a chunker built
/// from [`ProcessorSettings::chunker_config_for`] none are. Chunks drawn
/// from several files get a [`FILE_HEADER`] line ahead of each file; those
/// lines count towards `token_count` but not towards the skip check.
pub fn prepare_prompts(
    chunks: &[Chunk],
    template: &PromptTemplate,
    settings: &ProcessorSettings,
    estimator: &dyn TokenEstimator,
) -> Result<Vec<PreparedPrompt>> {
    let budget = settings.budget()?;
    let copies = template.placeholder_count();
    let limit = settings.code_limit(copies)?;

    log::info!("Model context length: {}", budget.context_length());
    log::info!("Max input tokens: {}", budget.input_limit());
    log::info!("Effective max tokens for code: {limit}");

    let mut prompts = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        if chunk.estimated_tokens > limit {
            log::warn!(
                "Chunk {} exceeds max token limit ({} > {limit}). Skipping.",
                chunk.id,
                chunk.estimated_tokens
            );
            continue;
        }

        let headed = code_with_headers(chunk);
        let (code, code_tokens) = match &headed {
            Some(code) => (code.as_str(), estimator.estimate(code)),
            None => (chunk.content.as_str(), chunk.estimated_tokens),
        };

        prompts.push(PreparedPrompt {
            chunk_id: chunk.id.clone(),
            files: chunk.paths().into_iter().map(str::to_string).collect(),
            prompt: template.render(code),
            token_count: code_tokens * copies + settings.prompt_overhead_tokens,
            estimated_response_tokens: budget.reserved_for_response(),
        });
    }

    Ok(prompts)
}

/// Chunk text with a header line ahead of each file, or `None` when the
/// chunk comes from a single file. Overlap stays under the first header.
fn code_with_headers(chunk: &Chunk) -> Option<String> {
    if chunk.paths().len() < 2 {
        return None;
    }

    let mut code = String::with_capacity(chunk.content.len() + 64);
    let mut body = chunk.body();
    let mut current: Option<&str> = None;

    for (idx, source_ref) in chunk.source_refs.iter().enumerate() {
        let len = source_ref.span.len();
        let text = body.get(..len)?;
        body = &body[len..];

        if current != Some(source_ref.path.as_str()) {
            if !code.is_empty() && !code.ends_with('\n') {
                code.push('\n');
            }
            code.push_str(FILE_HEADER);
            code.push_str(&source_ref.path);
            code.push('\n');
            if idx == 0 {
                code.push_str(chunk.overlap());
            }
            current = Some(&source_ref.path);
        }
        code.push_str(text);
    }

    Some(code)
}

/// Up-front estimate of the model calls a corpus needs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEstimate {
    pub files: usize,
    pub estimated_code_tokens: usize,
    pub estimated_chunks: usize,
    pub estimated_input_tokens: usize,
    pub estimated_response_tokens: usize,
    pub total_tokens: usize,
    pub model_context_length: usize,
}

/// Estimate calls from corpus size alone, without chunking it.
///
/// Code tokens are approximated at four characters per token; every chunk
/// pays the template overhead and reserves the response share.
pub fn estimate_model_calls(
    units: &[SourceUnit],
    settings: &ProcessorSettings,
) -> Result<CallEstimate> {
    let budget = settings.budget()?;
    let effective = settings.effective_input_limit()?;

    let total_chars: usize = units.iter().map(|unit| unit.text().chars().count()).sum();
    let code_tokens = total_chars / HeuristicEstimator::DEFAULT_CHARS_PER_TOKEN;
    let chunks = code_tokens / effective + 1;

    let input_tokens = code_tokens + settings.prompt_overhead_tokens * chunks;
    let response_tokens = budget.reserved_for_response() * chunks;

    Ok(CallEstimate {
        files: units.len(),
        estimated_code_tokens: code_tokens,
        estimated_chunks: chunks,
        estimated_input_tokens: input_tokens,
        estimated_response_tokens: response_tokens,
        total_tokens: input_tokens + response_tokens,
        model_context_length: budget.context_length(),
    })
}
