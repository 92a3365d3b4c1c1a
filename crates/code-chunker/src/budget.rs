use crate::error::{ChunkerError, Result};

/// Share of the context window (in percent) available to chunk input.
const INPUT_SHARE_PERCENT: usize = 80;

/// Token budget derived from a model context length.
///
/// `input_limit` is `floor(0.8 * context_length)` and the remainder is
/// reserved for the model response. Both halves are always derived together,
/// so `input_limit + reserved_for_response == context_length` holds for every
/// value of this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenBudget {
    context_length: usize,
    input_limit: usize,
    reserved_for_response: usize,
}

impl TokenBudget {
    /// Derive a budget from a context length.
    ///
    /// Fails when the context length leaves no room for input (`< 2`).
    pub fn new(context_length: usize) -> Result<Self> {
        if context_length == 0 {
            return Err(ChunkerError::invalid_config(
                "context_length must be > 0",
            ));
        }

        let input_limit = context_length * INPUT_SHARE_PERCENT / 100;
        if input_limit == 0 {
            return Err(ChunkerError::invalid_config(format!(
                "context_length ({context_length}) leaves no input budget"
            )));
        }

        Ok(Self {
            context_length,
            input_limit,
            reserved_for_response: context_length - input_limit,
        })
    }

    /// Re-derive the budget for a different context length.
    pub fn with_context_length(self, context_length: usize) -> Result<Self> {
        Self::new(context_length)
    }

    #[must_use]
    pub const fn context_length(&self) -> usize {
        self.context_length
    }

    /// Maximum estimated tokens a chunk may carry.
    #[must_use]
    pub const fn input_limit(&self) -> usize {
        self.input_limit
    }

    #[must_use]
    pub const fn reserved_for_response(&self) -> usize {
        self.reserved_for_response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_context_split() {
        let budget = TokenBudget::new(8192).unwrap();
        assert_eq!(budget.input_limit(), 6553);
        assert_eq!(budget.reserved_for_response(), 1639);
    }

    #[test]
    fn test_halves_always_sum_to_context() {
        for context in [2, 3, 7, 10, 99, 1000, 4097, 128_000] {
            let budget = TokenBudget::new(context).unwrap();
            assert_eq!(
                budget.input_limit() + budget.reserved_for_response(),
                context
            );
            assert_eq!(budget.input_limit(), context * 4 / 5);
        }
    }

    #[test]
    fn test_rejects_unusable_context() {
        assert!(TokenBudget::new(0).is_err());
        assert!(TokenBudget::new(1).is_err());
        assert!(TokenBudget::new(2).is_ok());
    }

    #[test]
    fn test_recomputed_on_change() {
        let budget = TokenBudget::new(1000).unwrap();
        let resized = budget.with_context_length(500).unwrap();
        assert_eq!(resized.input_limit(), 400);
        assert_eq!(resized.reserved_for_response(), 100);
        assert!(budget.with_context_length(0).is_err());
    }
}
