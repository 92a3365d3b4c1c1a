use crate::error::{ProcessorError, Result};
use corpus_code_chunker::{ChunkerConfig, GroupingMode, TokenBudget, DEFAULT_CONTEXT_LENGTH};
use serde::{Deserialize, Serialize};

/// Environment variable holding the model context length
pub const CONTEXT_LENGTH_ENV: &str = "CURRENT_MODEL_CONTEXT_LENGTH";

/// Tokens assumed for the prompt template around the code
pub const DEFAULT_PROMPT_OVERHEAD: usize = 200;

/// Model calls in flight at once
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// Settings shared by prompt preparation, estimation and dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorSettings {
    /// Model context window in tokens
    pub context_length: usize,

    /// Estimated tokens of the template text (excluding code)
    pub prompt_overhead_tokens: usize,

    /// Upper bound on concurrent model calls
    pub max_concurrent: usize,

    /// How source units are grouped before chunking
    pub grouping: GroupingMode,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            context_length: DEFAULT_CONTEXT_LENGTH,
            prompt_overhead_tokens: DEFAULT_PROMPT_OVERHEAD,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            grouping: GroupingMode::default(),
        }
    }
}

impl ProcessorSettings {
    /// Read settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`; an absent context length takes the
    /// default, an unparsable or non-positive one is an error
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let raw = lookup(CONTEXT_LENGTH_ENV);
        let settings = Self {
            context_length: parse_context_length(raw.as_deref())?,
            ..Self::default()
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Builder: set context length
    #[must_use]
    pub const fn context_length(mut self, context_length: usize) -> Self {
        self.context_length = context_length;
        self
    }

    /// Builder: set template overhead estimate
    #[must_use]
    pub const fn prompt_overhead_tokens(mut self, tokens: usize) -> Self {
        self.prompt_overhead_tokens = tokens;
        self
    }

    /// Builder: set concurrency bound
    #[must_use]
    pub const fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Builder: set grouping mode
    #[must_use]
    pub const fn grouping(mut self, grouping: GroupingMode) -> Self {
        self.grouping = grouping;
        self
    }

    /// Budget of the full prompt (template plus code)
    pub fn budget(&self) -> Result<TokenBudget> {
        Ok(TokenBudget::new(self.context_length)?)
    }

    /// Tokens left for code once the template overhead is paid
    pub fn effective_input_limit(&self) -> Result<usize> {
        let input_limit = self.budget()?.input_limit();
        input_limit
            .checked_sub(self.prompt_overhead_tokens)
            .filter(|limit| *limit >= 2)
            .ok_or_else(|| {
                ProcessorError::invalid_setting(
                    "prompt_overhead_tokens",
                    self.prompt_overhead_tokens.to_string(),
                    format!("leaves no room for code within an input limit of {input_limit}"),
                )
            })
    }

    /// Tokens each copy of the code may take when the template repeats the
    /// placeholder `copies` times
    pub fn code_limit(&self, copies: usize) -> Result<usize> {
        let limit = self.effective_input_limit()? / copies.max(1);
        if limit < 2 {
            return Err(ProcessorError::invalid_setting(
                "prompt_overhead_tokens",
                self.prompt_overhead_tokens.to_string(),
                format!("leaves no room for {copies} copies of the code"),
            ));
        }
        Ok(limit)
    }

    /// Chunker configuration whose input limit fits the effective limit.
    ///
    /// The chunker keeps 80% of its context for input, so its context length
    /// is `floor(effective * 5 / 4)`.
    pub fn chunker_config(&self) -> Result<ChunkerConfig> {
        self.chunker_config_for(1)
    }

    /// Chunker configuration for a template that repeats the code `copies`
    /// times
    pub fn chunker_config_for(&self, copies: usize) -> Result<ChunkerConfig> {
        let limit = self.code_limit(copies)?;
        let config = ChunkerConfig::for_context_length(limit * 5 / 4).grouping(self.grouping);
        config.validate()?;
        Ok(config)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(ProcessorError::invalid_setting(
                "max_concurrent",
                "0",
                "must be at least 1",
            ));
        }
        self.chunker_config().map(|_| ())
    }
}

fn parse_context_length(raw: Option<&str>) -> Result<usize> {
    let Some(raw) = raw.map(str::trim) else {
        return Ok(DEFAULT_CONTEXT_LENGTH);
    };

    match raw.parse::<i64>() {
        Ok(value) if value > 0 => usize::try_from(value).map_err(|e| {
            ProcessorError::invalid_setting(CONTEXT_LENGTH_ENV, raw, e.to_string())
        }),
        Ok(_) => Err(ProcessorError::invalid_setting(
            CONTEXT_LENGTH_ENV,
            raw,
            "must be a positive integer",
        )),
        Err(e) => Err(ProcessorError::invalid_setting(
            CONTEXT_LENGTH_ENV,
            raw,
            e.to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lookup(value: Option<&'static str>) -> impl Fn(&str) -> Option<String> {
        move |key| {
            assert_eq!(key, CONTEXT_LENGTH_ENV);
            value.map(str::to_string)
        }
    }

    #[test]
    fn test_missing_variable_uses_default() {
        let settings = ProcessorSettings::from_lookup(lookup(None)).unwrap();
        assert_eq!(settings, ProcessorSettings::default());
        assert_eq!(settings.context_length, 8192);
    }

    #[test]
    fn test_variable_overrides_context_length() {
        let settings = ProcessorSettings::from_lookup(lookup(Some(" 32768 "))).unwrap();
        assert_eq!(settings.context_length, 32768);
        assert_eq!(settings.prompt_overhead_tokens, DEFAULT_PROMPT_OVERHEAD);
    }

    #[test]
    fn test_invalid_values_are_errors() {
        for raw in ["", "abc", "0", "-100", "12.5"] {
            let err = ProcessorSettings::from_lookup(lookup(Some(raw))).unwrap_err();
            assert!(
                matches!(err, ProcessorError::InvalidSetting { .. }),
                "{raw}: {err}"
            );
        }
    }

    #[test]
    fn test_effective_limit_subtracts_overhead() {
        let settings = ProcessorSettings::default();
        assert_eq!(settings.effective_input_limit().unwrap(), 6553 - 200);

        let tight = ProcessorSettings::default().context_length(200);
        assert!(tight.effective_input_limit().is_err());
        assert!(tight.validate().is_err());
    }

    #[test]
    fn test_chunker_limit_fits_effective_limit() {
        for context_length in [300, 1000, 4096, 8192, 128_000] {
            let settings = ProcessorSettings::default().context_length(context_length);
            let effective = settings.effective_input_limit().unwrap();
            let chunker_limit = settings.chunker_config().unwrap().budget().unwrap().input_limit();
            assert!(chunker_limit <= effective, "{context_length}");
            assert!(chunker_limit + 1 >= effective, "{context_length}");
        }
    }

    #[test]
    fn test_repeated_code_splits_the_limit() {
        let settings = ProcessorSettings::default().context_length(1000);
        // effective limit 600
        assert_eq!(settings.code_limit(1).unwrap(), 600);
        assert_eq!(settings.code_limit(3).unwrap(), 200);
        let limit = settings.chunker_config_for(3).unwrap().budget().unwrap().input_limit();
        assert!(limit <= 200);

        assert!(settings.code_limit(400).is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        assert!(ProcessorSettings::default().max_concurrent(0).validate().is_err());
    }
}
