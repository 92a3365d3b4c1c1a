use crate::language::Language;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Half-open byte range `[start, end)` into a source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether `other` lies entirely inside this span
    #[must_use]
    pub const fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// One input file: path, raw text and language tag. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    path: String,
    language: Language,
    text: String,
    /// Byte offset of every line start, used for line lookups
    line_starts: Vec<usize>,
}

impl SourceUnit {
    /// Create a unit with an explicit language tag
    pub fn new(path: impl Into<String>, language: Language, text: impl Into<String>) -> Self {
        let text = text.into();
        let line_starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(idx, _)| idx + 1))
            .collect();

        Self {
            path: path.into(),
            language,
            text,
            line_starts,
        }
    }

    /// Create a unit, detecting the language from the path extension
    pub fn detect(path: impl Into<String>, text: impl Into<String>) -> Self {
        let path = path.into();
        let language = Language::from_path(Path::new(&path));
        Self::new(path, language, text)
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub const fn language(&self) -> Language {
        self.language
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Span covering the whole text
    #[must_use]
    pub fn full_span(&self) -> Span {
        Span::new(0, self.text.len())
    }

    /// Text of a span; spans always come from this unit's own hierarchy
    #[must_use]
    pub fn slice(&self, span: Span) -> &str {
        &self.text[span.start..span.end]
    }

    /// Directory part of the path (`"."` for top-level files)
    #[must_use]
    pub fn directory(&self) -> String {
        match Path::new(&self.path).parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                parent.to_string_lossy().replace('\\', "/")
            }
            _ => ".".to_string(),
        }
    }

    /// 1-indexed line containing byte `offset`
    #[must_use]
    pub fn line_of(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        }
    }

    /// 1-indexed inclusive line range covered by a span
    #[must_use]
    pub fn line_range(&self, span: Span) -> (usize, usize) {
        let start = self.line_of(span.start);
        let last_byte = if span.is_empty() {
            span.start
        } else {
            span.end - 1
        };
        (start, self.line_of(last_byte).max(start))
    }
}
