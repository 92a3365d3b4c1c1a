use corpus_code_chunker::ChunkerError;
use thiserror::Error;

/// Result type for processor operations
pub type Result<T> = std::result::Result<T, ProcessorError>;

/// Errors raised while preparing prompts or exporting outcomes.
///
/// Model client failures are not here: they are recorded on the
/// outcome of the chunk that caused them.
#[derive(Error, Debug)]
pub enum ProcessorError {
    /// Prompt template has no `{code}` placeholder
    #[error("Prompt template is missing the {{code}} placeholder")]
    MissingPlaceholder,

    /// Environment or settings value rejected
    #[error("Invalid setting {name}={value:?}: {reason}")]
    InvalidSetting {
        name: String,
        value: String,
        reason: String,
    },

    /// Chunker configuration or I/O failure
    #[error(transparent)]
    Chunker(#[from] ChunkerError),

    /// Outcome serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessorError {
    /// Create an invalid setting error
    pub fn invalid_setting(
        name: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidSetting {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}
