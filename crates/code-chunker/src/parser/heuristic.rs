use super::syntax::{HeuristicNode, ParsedSource};
use super::{ParserBackend, StructuralParser};
use crate::error::{ChunkerError, Result};
use crate::hierarchy::MAX_DEPTH;
use crate::language::{BlockStyle, Language};
use crate::source::Span;
use once_cell::sync::Lazy;
use regex::Regex;

pub const ROOT_KIND: &str = "source_file";
pub const CLASS_KIND: &str = "class_block";
pub const FUNCTION_KIND: &str = "function_block";
pub const STATEMENT_KIND: &str = "statement";

static CLASS_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:(?:pub(?:\([^)]*\))?|public|private|protected|internal|export|default|abstract|final|sealed|static|data|open|partial|inline|enum)\s+)*(?:class|interface|namespace|module|enum|struct|trait|impl|object|record|protocol|extension|union)(?:\s+|<)",
    )
    .expect("valid class header regex")
});

static FUNCTION_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^\s*(?:(?:pub(?:\([^)]*\))?|public|private|protected|internal|fileprivate|export|default|static|async|unsafe|const|extern(?:\s+"[^"]*")?|override|virtual|abstract|final|inline|open|suspend)\s+)*(?:def|fn|func|fun|sub|function)\b\*?\s*[\w(<]"#,
    )
    .expect("valid function header regex")
});

/// Structure-approximating parser used when no grammar is available.
///
/// Blocks are found from brace balance or indentation depending on the
/// language; headers are classified by keyword. Comment-only, blank and
/// closing-delimiter lines produce no nodes.
pub struct HeuristicParser {
    language: Language,
    style: BlockStyle,
}

/// Per-line facts gathered in one pass over the source
#[derive(Debug, Clone, Copy)]
struct Line {
    start: usize,
    /// End of line content, excluding the newline
    end: usize,
    /// Byte length of leading whitespace
    indent_bytes: usize,
    /// Indentation width with tabs expanded to 4 columns
    indent: usize,
    /// Net bracket balance of the line
    delta: i32,
    /// Blank, comment-only or closing-delimiter-only
    skip: bool,
}

impl Line {
    fn content_start(&self) -> usize {
        self.start + self.indent_bytes
    }
}

impl HeuristicParser {
    pub fn new(language: Language) -> Result<Self> {
        let style = language
            .block_style()
            .ok_or_else(|| ChunkerError::unsupported_language(language.as_str()))?;
        Ok(Self { language, style })
    }

    fn scan_lines(&self, source: &str) -> Vec<Line> {
        let mut lines = Vec::new();
        let mut start = 0;
        for raw in source.split_inclusive('\n') {
            let content = raw.strip_suffix('\n').unwrap_or(raw);
            let content = content.strip_suffix('\r').unwrap_or(content);
            let trimmed = content.trim_start();
            let indent_bytes = content.len() - trimmed.len();
            let indent = content[..indent_bytes]
                .chars()
                .map(|c| if c == '\t' { 4 } else { 1 })
                .sum();

            lines.push(Line {
                start,
                end: start + content.len(),
                indent_bytes,
                indent,
                delta: self.bracket_delta(trimmed),
                skip: self.is_skippable(trimmed.trim_end()),
            });
            start += raw.len();
        }
        lines
    }

    fn is_skippable(&self, trimmed: &str) -> bool {
        if trimmed.is_empty() {
            return true;
        }
        if let Some(prefix) = self.language.line_comment() {
            if trimmed.starts_with(prefix) {
                return true;
            }
        }
        if trimmed.starts_with("/*") || trimmed.starts_with("* ") || trimmed == "*/" {
            return self.style == BlockStyle::Braces;
        }
        if self.language == Language::Ruby && trimmed == "end" {
            return true;
        }
        trimmed
            .chars()
            .all(|c| matches!(c, '}' | ')' | ']' | ';' | ','))
    }

    /// Net count of opening minus closing brackets outside strings and
    /// line comments
    fn bracket_delta(&self, line: &str) -> i32 {
        let comment = self.language.line_comment();
        let mut delta = 0;
        let mut quote: Option<char> = None;
        let mut escaped = false;

        for (idx, c) in line.char_indices() {
            if let Some(open) = quote {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == open {
                    quote = None;
                }
                continue;
            }

            if comment.is_some_and(|prefix| line[idx..].starts_with(prefix)) {
                break;
            }

            match c {
                '"' | '`' => quote = Some(c),
                // Rust lifetimes would otherwise open a string
                '\'' if self.language != Language::Rust => quote = Some(c),
                '{' | '(' | '[' => delta += 1,
                '}' | ')' | ']' => delta -= 1,
                _ => {}
            }
        }
        delta
    }

    fn classify(source: &str, line: &Line) -> &'static str {
        let header = &source[line.start..line.end];
        if CLASS_HEADER.is_match(header) {
            CLASS_KIND
        } else if FUNCTION_HEADER.is_match(header) {
            FUNCTION_KIND
        } else {
            STATEMENT_KIND
        }
    }

    /// Index of the last line belonging to the construct starting at `first`
    fn block_end(&self, source: &str, lines: &[Line], first: usize, to: usize) -> usize {
        let mut last = first;
        let mut depth = lines[first].delta;

        let header = source[lines[first].content_start()..lines[first].end].trim_end();
        if self.style == BlockStyle::Braces
            && depth <= 0
            && !header.ends_with([';', ',', '}', '{'])
        {
            // Allman style: the opening brace sits on the next line
            if let Some(next) = (first + 1..to).find(|&idx| !lines[idx].skip) {
                if source[lines[next].content_start()..].starts_with('{') {
                    depth += lines[next].delta;
                    last = next;
                }
            }
        }

        while depth > 0 && last + 1 < to {
            last += 1;
            depth += lines[last].delta;
        }

        if self.style == BlockStyle::Indentation {
            let base = lines[first].indent;
            for (idx, line) in lines.iter().enumerate().take(to).skip(last + 1) {
                if line.skip && line.end == line.content_start() {
                    continue;
                }
                if line.indent <= base {
                    if line.skip {
                        continue;
                    }
                    break;
                }
                last = idx;
            }
        }

        last
    }

    fn parse_lines(
        &self,
        source: &str,
        lines: &[Line],
        from: usize,
        to: usize,
        depth: usize,
    ) -> Vec<HeuristicNode> {
        let mut nodes = Vec::new();
        let mut idx = from;

        while idx < to {
            let line = &lines[idx];
            if line.skip {
                idx += 1;
                continue;
            }

            let last = self.block_end(source, lines, idx, to);
            // Blocks nested past the limit stay flat inside their opener
            let children = if last > idx && depth < MAX_DEPTH {
                self.parse_lines(source, lines, idx + 1, last + 1, depth + 1)
            } else {
                Vec::new()
            };

            nodes.push(HeuristicNode {
                kind: Self::classify(source, line),
                span: Span::new(line.content_start(), lines[last].end),
                children,
            });
            idx = last + 1;
        }

        nodes
    }
}

impl StructuralParser for HeuristicParser {
    fn language(&self) -> Language {
        self.language
    }

    fn backend(&self) -> ParserBackend {
        ParserBackend::Heuristic
    }

    fn parse(&self, source: &str) -> Result<ParsedSource> {
        if source.contains('\0') {
            return Err(ChunkerError::parse("source contains NUL bytes"));
        }

        let lines = self.scan_lines(source);
        let children = self.parse_lines(source, &lines, 0, lines.len(), 1);

        Ok(ParsedSource::Heuristic(HeuristicNode {
            kind: ROOT_KIND,
            span: Span::new(0, source.len()),
            children,
        }))
    }
}
