use crate::error::Result;
use crate::source::SourceUnit;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Filters applied while scanning a corpus directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorpusOptions {
    /// Glob patterns a relative path must match (empty = everything)
    pub include: Vec<String>,

    /// Glob patterns that reject a relative path; checked before `include`
    pub exclude: Vec<String>,

    /// Files larger than this many bytes are skipped
    pub max_file_size: Option<u64>,

    /// Visit hidden files and directories
    pub include_hidden: bool,
}

impl CorpusOptions {
    /// Builder: add include pattern
    #[must_use]
    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.include.push(pattern.into());
        self
    }

    /// Builder: add exclude pattern
    #[must_use]
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude.push(pattern.into());
        self
    }

    /// Builder: set maximum file size
    #[must_use]
    pub const fn max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = Some(bytes);
        self
    }
}

/// Walks a directory and loads source units (.gitignore aware)
pub struct CorpusScanner {
    root: PathBuf,
    options: CorpusOptions,
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl CorpusScanner {
    /// Create a scanner; fails when a pattern is not a valid glob
    pub fn new(root: impl AsRef<Path>, options: CorpusOptions) -> Result<Self> {
        let include = if options.include.is_empty() {
            None
        } else {
            Some(build_glob_set(&options.include)?)
        };
        let exclude = build_glob_set(&options.exclude)?;

        Ok(Self {
            root: root.as_ref().to_path_buf(),
            options,
            include,
            exclude,
        })
    }

    #[must_use]
    pub fn options(&self) -> &CorpusOptions {
        &self.options
    }

    /// Whether a relative path passes the include/exclude filters
    #[must_use]
    pub fn accepts(&self, relative: &str) -> bool {
        if self.exclude.is_match(relative) {
            return false;
        }
        self.include
            .as_ref()
            .map_or(true, |include| include.is_match(relative))
    }

    /// Relative paths (with `/` separators) of the files to load, sorted
    pub fn scan(&self) -> Vec<(PathBuf, String)> {
        let mut files = Vec::new();

        let mut builder = WalkBuilder::new(&self.root);
        builder
            .hidden(!self.options.include_hidden)
            .git_ignore(true)
            .git_exclude(true)
            .require_git(false);

        for result in builder.build() {
            match result {
                Ok(entry) => {
                    let Some(file_type) = entry.file_type() else {
                        continue;
                    };
                    if !file_type.is_file() {
                        continue;
                    }

                    let path = entry.path();
                    let Ok(relative) = path.strip_prefix(&self.root) else {
                        continue;
                    };
                    let relative = relative.to_string_lossy().replace('\\', "/");

                    if !self.accepts(&relative) {
                        log::debug!("Skipping filtered file {relative}");
                        continue;
                    }

                    if let (Some(limit), Ok(meta)) = (self.options.max_file_size, entry.metadata()) {
                        if meta.len() > limit {
                            log::debug!(
                                "Skipping large file {relative} ({} bytes > {limit})",
                                meta.len()
                            );
                            continue;
                        }
                    }

                    files.push((path.to_path_buf(), relative));
                }
                Err(e) => log::warn!("Failed to read entry: {e}"),
            }
        }

        files.sort_by(|a, b| a.1.cmp(&b.1));
        log::info!("Found {} files under {}", files.len(), self.root.display());
        files
    }

    /// Scan and read every accepted file. Files that cannot be read as
    /// UTF-8 are skipped.
    pub fn load(&self) -> Vec<SourceUnit> {
        self.scan()
            .into_par_iter()
            .filter_map(|(path, relative)| match std::fs::read_to_string(&path) {
                Ok(text) => Some(SourceUnit::detect(relative, text)),
                Err(e) => {
                    log::debug!("Skipping unreadable file {relative}: {e}");
                    None
                }
            })
            .collect()
    }
}

fn build_glob_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, relative: &str, content: &[u8]) {
        let path = dir.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_scan_relative_paths_and_languages() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/main.rs", b"fn main() {}\n");
        write(dir.path(), "lib/util.py", b"x = 1\n");
        write(dir.path(), "README", b"hello\n");

        let scanner = CorpusScanner::new(dir.path(), CorpusOptions::default()).unwrap();
        let units = scanner.load();
        let seen: Vec<_> = units.iter().map(|u| (u.path(), u.language())).collect();
        assert_eq!(
            seen,
            vec![
                ("README", Language::Unknown),
                ("lib/util.py", Language::Python),
                ("src/main.rs", Language::Rust),
            ]
        );
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "app.py", b"a = 1\n");
        write(dir.path(), "tests/test_app.py", b"b = 2\n");
        write(dir.path(), "app.js", b"c = 3\n");

        let options = CorpusOptions::default().include("*.py").exclude("tests/*");
        let scanner = CorpusScanner::new(dir.path(), options).unwrap();
        let paths: Vec<_> = scanner.scan().into_iter().map(|(_, rel)| rel).collect();
        assert_eq!(paths, vec!["app.py".to_string()]);
    }

    #[test]
    fn test_gitignore_size_and_encoding_filters() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), ".gitignore", b"build/\n");
        write(dir.path(), "build/out.py", b"x = 1\n");
        write(dir.path(), "big.py", &vec![b'#'; 2048]);
        write(dir.path(), "blob.py", &[0xff, 0xfe, 0x00, 0x81]);
        write(dir.path(), "ok.py", b"y = 2\n");

        let options = CorpusOptions::default().max_file_size(1024);
        let scanner = CorpusScanner::new(dir.path(), options).unwrap();
        let units = scanner.load();
        let paths: Vec<_> = units.iter().map(SourceUnit::path).collect();
        assert_eq!(paths, vec!["ok.py"]);
    }

    #[test]
    fn test_invalid_glob_rejected() {
        let options = CorpusOptions::default().include("src/[");
        assert!(CorpusScanner::new(".", options).is_err());
    }
}
