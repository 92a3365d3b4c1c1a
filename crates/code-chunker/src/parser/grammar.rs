use super::syntax::ParsedSource;
use super::{ParserBackend, StructuralParser};
use crate::error::{ChunkerError, Result};
use crate::language::Language;
use tree_sitter::Parser;

/// High-fidelity parser backed by a compiled tree-sitter grammar.
///
/// `tree_sitter::Parser` is neither `Sync` nor reusable across threads, so
/// only the grammar is kept; a parser is created per call.
pub struct GrammarParser {
    language: Language,
    grammar: tree_sitter::Language,
}

impl GrammarParser {
    /// Load the grammar for `language` and check it is usable
    pub fn new(language: Language) -> Result<Self> {
        let grammar = language.tree_sitter_language()?;
        Self::parser_for(&grammar)?;
        Ok(Self { language, grammar })
    }

    fn parser_for(grammar: &tree_sitter::Language) -> Result<Parser> {
        let mut parser = Parser::new();
        parser
            .set_language(grammar)
            .map_err(|e| ChunkerError::tree_sitter(format!("Failed to set language: {e}")))?;
        Ok(parser)
    }
}

impl StructuralParser for GrammarParser {
    fn language(&self) -> Language {
        self.language
    }

    fn backend(&self) -> ParserBackend {
        ParserBackend::Grammar
    }

    fn parse(&self, source: &str) -> Result<ParsedSource> {
        let mut parser = Self::parser_for(&self.grammar)?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| ChunkerError::parse("Failed to parse source code"))?;

        if tree.root_node().has_error() {
            log::debug!(
                "{} source parsed with syntax errors; error nodes stay transparent",
                self.language
            );
        }

        Ok(ParsedSource::Grammar(tree))
    }
}
