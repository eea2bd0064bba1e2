//! Removal of client chrome around EXPLAIN output
//!
//! psql prints a `QUERY PLAN` header with a dash rule, a `(N rows)` footer
//! and, in aligned mode, a trailing `+` on wrapped lines. pgAdmin exports
//! wrap every line in double quotes and double the quotes inside.

use regex::Regex;
use std::sync::LazyLock;

static ROW_COUNT_FOOTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\(\d+\s+rows?\)$").expect("valid regex"));

static CONTINUATION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+\+$").expect("valid regex"));

/// A non-blank line of TEXT output with its indentation measured
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLine {
    /// Column of the first non-whitespace character
    pub indent: usize,
    /// The line with surrounding whitespace removed
    pub content: String,
}

impl TextLine {
    pub fn new(line: &str) -> Self {
        let indent = line.len() - line.trim_start().len();
        Self {
            indent,
            content: line.trim().to_string(),
        }
    }

    /// Returns true if the line introduces a child node
    pub fn is_child(&self) -> bool {
        self.content.starts_with("->")
    }
}

fn is_header(trimmed: &str) -> bool {
    trimmed.trim_matches('"').trim().eq_ignore_ascii_case("QUERY PLAN")
}

fn is_rule(trimmed: &str) -> bool {
    !trimmed.is_empty() && trimmed.chars().all(|c| matches!(c, '-' | '=' | '+'))
}

fn is_footer(trimmed: &str) -> bool {
    ROW_COUNT_FOOTER.is_match(trimmed)
}

fn strip_continuation(line: &str) -> &str {
    match CONTINUATION_MARKER.find(line) {
        Some(m) => &line[..m.start()],
        None => line,
    }
}

/// Strips psql chrome, keeping the remaining text byte-for-byte
pub fn strip_psql_chrome(raw: &str) -> String {
    raw.trim()
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !is_header(trimmed) && !is_rule(trimmed) && !is_footer(trimmed)
        })
        .map(strip_continuation)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Removes pgAdmin's per-line quoting from a single line
pub fn unquote_pgadmin_line(line: &str) -> String {
    let trimmed = line.trim_end();
    let leading = &trimmed[..trimmed.len() - trimmed.trim_start().len()];
    let body = trimmed.trim_start();

    if body.len() >= 2 && body.starts_with('"') && body.ends_with('"') {
        let inner = &body[1..body.len() - 1];
        format!("{}{}", leading, inner.replace("\"\"", "\""))
    } else {
        trimmed.to_string()
    }
}

/// Splits raw TEXT output into cleaned, non-blank lines
pub fn text_lines(raw: &str) -> Vec<TextLine> {
    raw.lines()
        .map(unquote_pgadmin_line)
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !is_header(trimmed) && !is_rule(trimmed) && !is_footer(trimmed)
        })
        .map(|line| TextLine::new(strip_continuation(&line)))
        .collect()
}
