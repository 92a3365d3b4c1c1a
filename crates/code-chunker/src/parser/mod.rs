//! Structural parsers and the per-language parser registry.
//!
//! A language resolves to at most one parser per process: the tree-sitter
//! grammar when one is compiled in, otherwise the heuristic line parser,
//! otherwise nothing. The decision is made once and cached.

mod grammar;
mod heuristic;
mod syntax;

pub use grammar::GrammarParser;
pub use heuristic::HeuristicParser;
pub use syntax::{HeuristicNode, ParsedSource, SyntaxNode};

use crate::error::Result;
use crate::language::Language;
use once_cell::sync::{Lazy, OnceCell};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Which kind of parser produced a tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserBackend {
    /// Compiled tree-sitter grammar
    Grammar,
    /// Line-based approximation
    Heuristic,
}

/// A parser turning source text into a [`ParsedSource`] tree
pub trait StructuralParser: Send + Sync {
    fn language(&self) -> Language;

    fn backend(&self) -> ParserBackend;

    /// Parse `source`. Syntax errors inside the text are tolerated; an
    /// error means no usable tree could be built at all.
    fn parse(&self, source: &str) -> Result<ParsedSource>;
}

/// Shared handle to a parser; parsers are stateless between calls
pub type ParserHandle = Arc<dyn StructuralParser>;

/// Backends to skip during acquisition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryOptions {
    grammar_disabled: HashSet<Language>,
    heuristic_disabled: HashSet<Language>,
}

impl RegistryOptions {
    /// Never load the tree-sitter grammar for `language`
    #[must_use]
    pub fn disable_grammar(mut self, language: Language) -> Self {
        self.grammar_disabled.insert(language);
        self
    }

    /// Never fall back to the heuristic parser for `language`
    #[must_use]
    pub fn disable_heuristic(mut self, language: Language) -> Self {
        self.heuristic_disabled.insert(language);
        self
    }

    fn grammar_allowed(&self, language: Language) -> bool {
        !self.grammar_disabled.contains(&language)
    }

    fn heuristic_allowed(&self, language: Language) -> bool {
        !self.heuristic_disabled.contains(&language)
    }
}

/// Language -> parser cache.
///
/// Slots are created up front for every language so lookups never mutate
/// the map; each slot is initialized at most once, even under concurrent
/// first use, and a negative result is cached like a positive one.
pub struct ParserRegistry {
    options: RegistryOptions,
    slots: HashMap<Language, OnceCell<Option<ParserHandle>>>,
}

static SHARED: Lazy<Arc<ParserRegistry>> = Lazy::new(|| Arc::new(ParserRegistry::new()));

impl ParserRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(RegistryOptions::default())
    }

    #[must_use]
    pub fn with_options(options: RegistryOptions) -> Self {
        let slots = Language::ALL
            .iter()
            .map(|&language| (language, OnceCell::new()))
            .collect();
        Self { options, slots }
    }

    /// Process-wide registry used by default-constructed chunkers
    #[must_use]
    pub fn shared() -> Arc<ParserRegistry> {
        Arc::clone(&SHARED)
    }

    #[must_use]
    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    /// Parser for `language`, acquiring it on first request.
    ///
    /// `None` means the language has neither a grammar nor a heuristic
    /// parser (or both were disabled); callers treat its text as opaque.
    #[must_use]
    pub fn get_parser(&self, language: Language) -> Option<ParserHandle> {
        self.slots
            .get(&language)?
            .get_or_init(|| self.acquire(language))
            .clone()
    }

    /// Whether acquisition for `language` has already run
    #[must_use]
    pub fn is_cached(&self, language: Language) -> bool {
        self.slots
            .get(&language)
            .is_some_and(|slot| slot.get().is_some())
    }

    /// Heuristic parser for `language`, used after a grammar parse fails.
    /// Not cached: the heuristic parser is cheap to build.
    #[must_use]
    pub fn fallback_parser(&self, language: Language) -> Option<ParserHandle> {
        if !self.options.heuristic_allowed(language) {
            return None;
        }
        HeuristicParser::new(language)
            .ok()
            .map(|parser| Arc::new(parser) as ParserHandle)
    }

    /// Forget every cached acquisition
    pub fn reset(&mut self) {
        for slot in self.slots.values_mut() {
            slot.take();
        }
    }

    fn acquire(&self, language: Language) -> Option<ParserHandle> {
        if self.options.grammar_allowed(language) && language.has_grammar() {
            match GrammarParser::new(language) {
                Ok(parser) => {
                    log::info!("Loaded tree-sitter grammar for {language}");
                    return Some(Arc::new(parser));
                }
                Err(e) => {
                    log::warn!("Grammar for {language} unavailable, trying heuristic parser: {e}");
                }
            }
        }

        match self.fallback_parser(language) {
            Some(parser) => {
                log::info!("Using heuristic parser for {language}");
                Some(parser)
            }
            None => {
                log::info!("No parser available for {language}; text will be chunked as opaque");
                None
            }
        }
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cached: Vec<Language> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.get().is_some())
            .map(|(&language, _)| language)
            .collect();
        f.debug_struct("ParserRegistry")
            .field("options", &self.options)
            .field("cached", &cached)
            .finish()
    }
}
