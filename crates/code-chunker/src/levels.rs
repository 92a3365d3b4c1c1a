use crate::language::Language;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Granularity at which a hierarchy node (and a chunk) lives.
///
/// Ordered from coarsest to finest, so `min` of two levels is the coarser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyLevel {
    Directory,
    File,
    ClassModule,
    FunctionMethod,
    Statement,
}

impl HierarchyLevel {
    /// Numeric depth (1 = directory ... 5 = statement)
    #[must_use]
    pub const fn depth(self) -> u8 {
        match self {
            Self::Directory => 1,
            Self::File => 2,
            Self::ClassModule => 3,
            Self::FunctionMethod => 4,
            Self::Statement => 5,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Directory => "directory",
            Self::File => "file",
            Self::ClassModule => "class_module",
            Self::FunctionMethod => "function_method",
            Self::Statement => "statement",
        }
    }
}

impl std::fmt::Display for HierarchyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node-kind -> level lookup for one parser backend/language
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelTable {
    kinds: HashMap<String, HierarchyLevel>,
}

impl LevelTable {
    /// Level assigned to a node kind; `None` means the kind is transparent
    #[must_use]
    pub fn level_of(&self, kind: &str) -> Option<HierarchyLevel> {
        self.kinds.get(kind).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Table for a grammar-backed language (empty when none is defined)
    #[must_use]
    pub fn for_language(language: Language) -> &'static LevelTable {
        static EMPTY: Lazy<LevelTable> = Lazy::new(LevelTable::default);
        NODE_LEVELS
            .languages
            .get(&language)
            .unwrap_or_else(|| &*EMPTY)
    }

    /// Table for the node kinds emitted by the heuristic parser
    #[must_use]
    pub fn heuristic() -> &'static LevelTable {
        &NODE_LEVELS.heuristic
    }
}

#[derive(Debug, Deserialize)]
struct RawLevelTable {
    #[serde(default)]
    class_module: Vec<String>,
    #[serde(default)]
    function_method: Vec<String>,
    #[serde(default)]
    statement: Vec<String>,
}

impl From<RawLevelTable> for LevelTable {
    fn from(raw: RawLevelTable) -> Self {
        let kinds = raw
            .class_module
            .into_iter()
            .map(|kind| (kind, HierarchyLevel::ClassModule))
            .chain(
                raw.function_method
                    .into_iter()
                    .map(|kind| (kind, HierarchyLevel::FunctionMethod)),
            )
            .chain(
                raw.statement
                    .into_iter()
                    .map(|kind| (kind, HierarchyLevel::Statement)),
            )
            .collect();
        Self { kinds }
    }
}

#[derive(Debug, Deserialize)]
struct RawNodeLevels {
    heuristic: RawLevelTable,
    languages: HashMap<String, RawLevelTable>,
}

struct NodeLevels {
    heuristic: LevelTable,
    languages: HashMap<Language, LevelTable>,
}

impl NodeLevels {
    fn parse(source: &str) -> Result<Self, String> {
        let raw: RawNodeLevels = toml::from_str(source).map_err(|e| e.to_string())?;
        let mut languages = HashMap::new();
        for (tag, table) in raw.languages {
            let language = tag
                .parse::<Language>()
                .map_err(|e| format!("node level table `{tag}`: {e}"))?;
            languages.insert(language, LevelTable::from(table));
        }
        Ok(Self {
            heuristic: raw.heuristic.into(),
            languages,
        })
    }
}

static NODE_LEVELS: Lazy<NodeLevels> = Lazy::new(|| {
    NodeLevels::parse(include_str!("node_levels.toml"))
        .expect("embedded node_levels.toml is valid")
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_tables_load() {
        for language in Language::ALL {
            assert_eq!(
                !LevelTable::for_language(language).is_empty(),
                language.has_grammar(),
                "{language}"
            );
        }
        assert!(!LevelTable::heuristic().is_empty());
    }

    #[test]
    fn test_python_levels() {
        let table = LevelTable::for_language(Language::Python);
        assert_eq!(
            table.level_of("class_definition"),
            Some(HierarchyLevel::ClassModule)
        );
        assert_eq!(
            table.level_of("function_definition"),
            Some(HierarchyLevel::FunctionMethod)
        );
        assert_eq!(
            table.level_of("return_statement"),
            Some(HierarchyLevel::Statement)
        );
        assert_eq!(table.level_of("module"), None);
        assert_eq!(table.level_of("block"), None);
    }

    #[test]
    fn test_heuristic_folds_functions() {
        let table = LevelTable::heuristic();
        assert_eq!(
            table.level_of("class_block"),
            Some(HierarchyLevel::ClassModule)
        );
        assert_eq!(table.level_of("function_block"), None);
        assert_eq!(table.level_of("statement"), Some(HierarchyLevel::Statement));
    }

    #[test]
    fn test_level_order_is_coarse_to_fine() {
        assert!(HierarchyLevel::Directory < HierarchyLevel::File);
        assert!(HierarchyLevel::ClassModule < HierarchyLevel::Statement);
        assert_eq!(
            HierarchyLevel::FunctionMethod.min(HierarchyLevel::ClassModule),
            HierarchyLevel::ClassModule
        );
        assert_eq!(HierarchyLevel::Statement.depth(), 5);
    }

    #[test]
    fn test_unknown_language_tag_rejected() {
        let source = "[heuristic]\n[languages.cobol]\nstatement = [\"x\"]\n";
        assert!(NodeLevels::parse(source).is_err());
    }
}
