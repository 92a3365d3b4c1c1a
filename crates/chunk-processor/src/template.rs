use crate::error::{ProcessorError, Result};
use corpus_code_chunker::TokenEstimator;
use std::fmt;

/// Placeholder replaced by chunk content
pub const CODE_PLACEHOLDER: &str = "{code}";

/// Prompt text with a `{code}` placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    /// Fails when `text` has no placeholder
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if !text.contains(CODE_PLACEHOLDER) {
            return Err(ProcessorError::MissingPlaceholder);
        }
        Ok(Self { text })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Substitute `code` for every placeholder
    #[must_use]
    pub fn render(&self, code: &str) -> String {
        self.text.replace(CODE_PLACEHOLDER, code)
    }

    /// How many times the code appears in a rendered prompt
    #[must_use]
    pub fn placeholder_count(&self) -> usize {
        self.text.matches(CODE_PLACEHOLDER).count()
    }

    /// Estimated tokens of the template with the placeholders removed
    #[must_use]
    pub fn overhead_tokens(&self, estimator: &dyn TokenEstimator) -> usize {
        estimator.estimate(&self.text.replace(CODE_PLACEHOLDER, ""))
    }
}

impl fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
