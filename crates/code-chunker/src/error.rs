use thiserror::Error;

/// Result type for chunker operations
pub type Result<T> = std::result::Result<T, ChunkerError>;

/// Errors that can occur while preparing or chunking a corpus.
///
/// Parser unavailability and parse failures are recovered inside the
/// chunker; only configuration and I/O problems reach callers.
#[derive(Error, Debug)]
pub enum ChunkerError {
    /// Source text could not be turned into a tree
    #[error("Parse error: {0}")]
    Parse(String),

    /// No parser backend exists for the language
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration text could not be decoded
    #[error("Invalid configuration format: {0}")]
    ConfigFormat(#[from] toml::de::Error),

    /// Reading a source file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Include/exclude glob could not be compiled
    #[error("Invalid path pattern: {0}")]
    Pattern(#[from] globset::Error),

    /// Grammar could not be loaded into a parser
    #[error("Tree-sitter error: {0}")]
    TreeSitter(String),
}

impl ChunkerError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn unsupported_language(lang: impl Into<String>) -> Self {
        Self::UnsupportedLanguage(lang.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn tree_sitter(msg: impl Into<String>) -> Self {
        Self::TreeSitter(msg.into())
    }
}
