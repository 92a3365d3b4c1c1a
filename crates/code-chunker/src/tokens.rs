use crate::source::Span;
use once_cell::sync::Lazy;
use regex::Regex;

/// Words and individual punctuation marks, the smallest units a BPE
/// tokenizer will not merge across.
static LEXEME: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+|[^\w\s]").expect("valid lexeme regex"));

/// Estimates how many model tokens a span of text occupies.
///
/// Implementations must be deterministic, free of side effects and monotonic:
/// extending a text at either end never lowers its estimate. The assembler
/// also relies on estimates being subadditive (the estimate of a
/// concatenation never exceeds the sum of the parts), which lets it keep
/// running totals instead of re-estimating whole chunks.
pub trait TokenEstimator: Send + Sync {
    /// Human readable name (for logs)
    fn name(&self) -> &str;

    /// Estimate token count of `text`
    fn estimate(&self, text: &str) -> usize;

    /// Prepare `text` for estimating many of its spans.
    ///
    /// `index(text).estimate_span(span)` must equal
    /// `estimate(&text[span.start..span.end])`. The default re-reads the
    /// slice on every call.
    fn index<'a>(&'a self, text: &'a str) -> Box<dyn SpanEstimates + 'a> {
        Box::new(SliceEstimates {
            estimator: self,
            text,
        })
    }
}

/// Token estimates for spans of one text
pub trait SpanEstimates {
    /// Estimate of `text[span]`; spans must fall on char boundaries
    fn estimate_span(&self, span: Span) -> usize;
}

struct SliceEstimates<'a, E: ?Sized> {
    estimator: &'a E,
    text: &'a str,
}

impl<E: TokenEstimator + ?Sized> SpanEstimates for SliceEstimates<'_, E> {
    fn estimate_span(&self, span: Span) -> usize {
        self.text
            .get(span.start..span.end)
            .map_or(0, |slice| self.estimator.estimate(slice))
    }
}

/// Tokenizer-free estimator tuned for source code.
///
/// Takes the larger of a character-density estimate and a lexeme count, so
/// punctuation-heavy code is not under-counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeuristicEstimator {
    chars_per_token: usize,
}

impl HeuristicEstimator {
    /// Average characters per token assumed for code
    pub const DEFAULT_CHARS_PER_TOKEN: usize = 4;

    #[must_use]
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }

    #[must_use]
    pub const fn chars_per_token(&self) -> usize {
        self.chars_per_token
    }
}

impl Default for HeuristicEstimator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CHARS_PER_TOKEN)
    }
}

impl TokenEstimator for HeuristicEstimator {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        let by_density = text.chars().count().div_ceil(self.chars_per_token);
        let by_lexemes = LEXEME.find_iter(text).count();
        by_density.max(by_lexemes)
    }

    fn index<'a>(&'a self, text: &'a str) -> Box<dyn SpanEstimates + 'a> {
        Box::new(HeuristicIndex::new(self.chars_per_token, text))
    }
}

/// Char offsets and lexeme bounds of a text, so a span costs two binary
/// searches per measure instead of a rescan
struct HeuristicIndex {
    chars_per_token: usize,
    char_starts: Vec<usize>,
    lexemes: Vec<(usize, usize)>,
}

impl HeuristicIndex {
    fn new(chars_per_token: usize, text: &str) -> Self {
        Self {
            chars_per_token,
            char_starts: text.char_indices().map(|(idx, _)| idx).collect(),
            lexemes: LEXEME
                .find_iter(text)
                .map(|m| (m.start(), m.end()))
                .collect(),
        }
    }
}

impl SpanEstimates for HeuristicIndex {
    fn estimate_span(&self, span: Span) -> usize {
        if span.is_empty() {
            return 0;
        }

        let chars = self.char_starts.partition_point(|&idx| idx < span.end)
            - self.char_starts.partition_point(|&idx| idx < span.start);

        // A lexeme cut by either edge still matches once inside the slice
        let started = self.lexemes.partition_point(|&(start, _)| start < span.end);
        let finished = self.lexemes.partition_point(|&(_, end)| end <= span.start);
        let lexemes = started.saturating_sub(finished);

        chars.div_ceil(self.chars_per_token).max(lexemes)
    }
}
