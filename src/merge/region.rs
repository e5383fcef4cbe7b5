//! Marker-delimited managed regions
//!
//! A region is owned by the generator: everything between its start and end
//! marker lines is rewritten on every merge, everything outside is left alone.
//! Statements the generator used to emit before markers existed are described
//! by [`OwnedStatement`] so legacy files can be adopted.

use super::document::{TextDocument, indent_of};

/// A statement the generator owns, spanning from the line that starts with
/// `opener` through the first line that ends with `terminator`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedStatement {
    pub opener: String,
    pub terminator: String,
}

impl OwnedStatement {
    pub fn new(opener: impl Into<String>, terminator: impl Into<String>) -> Self {
        Self {
            opener: opener.into(),
            terminator: terminator.into(),
        }
    }
}

/// Line span of a located region, marker lines included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionSpan {
    pub start: usize,
    pub end: usize,
    pub indent: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedRegion {
    pub start_marker: String,
    pub end_marker: String,
    pub owned_statements: Vec<OwnedStatement>,
}

impl ManagedRegion {
    pub fn new(start_marker: impl Into<String>, end_marker: impl Into<String>) -> Self {
        Self {
            start_marker: start_marker.into(),
            end_marker: end_marker.into(),
            owned_statements: Vec::new(),
        }
    }

    pub fn with_owned_statement(mut self, statement: OwnedStatement) -> Self {
        self.owned_statements.push(statement);
        self
    }

    fn is_start(&self, line: &str) -> bool {
        line.trim() == self.start_marker
    }

    fn is_end(&self, line: &str) -> bool {
        line.trim() == self.end_marker
    }

    /// First start marker followed by an end marker
    pub fn locate(&self, doc: &TextDocument) -> Option<RegionSpan> {
        let start = (0..doc.len()).find(|&idx| self.is_start(doc.line(idx)))?;
        let end = (start + 1..doc.len()).find(|&idx| self.is_end(doc.line(idx)))?;
        Some(RegionSpan {
            start,
            end,
            indent: indent_of(doc.line(start)).to_string(),
        })
    }

    /// Marker lines around `body`, every non-empty line prefixed with `indent`
    pub fn render(&self, indent: &str, body: &[String]) -> Vec<String> {
        let mut lines = Vec::with_capacity(body.len() + 2);
        lines.push(format!("{}{}", indent, self.start_marker));
        for line in body {
            if line.is_empty() {
                lines.push(String::new());
            } else {
                lines.push(format!("{}{}", indent, line));
            }
        }
        lines.push(format!("{}{}", indent, self.end_marker));
        lines
    }

    /// Rewrite the region in place. `None` when the document has no region.
    pub fn replace_region(&self, doc: &mut TextDocument, body: &[String]) -> Option<RegionSpan> {
        let span = self.locate(doc)?;
        let rendered = self.render(&span.indent, body);
        let end = span.start + rendered.len() - 1;
        doc.splice(span.start..span.end + 1, &rendered);
        Some(RegionSpan { end, ..span })
    }

    /// Drop marker lines, region contents and owned statements, keeping
    /// everything else in order.
    pub fn strip_owned<'a>(&self, lines: &[&'a str]) -> Vec<&'a str> {
        let mut kept = Vec::with_capacity(lines.len());
        let mut in_region = false;
        let mut open_statement: Option<&OwnedStatement> = None;

        for &line in lines {
            let trimmed = line.trim();

            if in_region {
                if self.is_end(line) {
                    in_region = false;
                }
                continue;
            }
            if let Some(statement) = open_statement {
                if trimmed.ends_with(statement.terminator.as_str()) {
                    open_statement = None;
                }
                continue;
            }
            if self.is_start(line) {
                in_region = true;
                continue;
            }
            if self.is_end(line) {
                continue;
            }
            if let Some(statement) = self
                .owned_statements
                .iter()
                .find(|s| trimmed.starts_with(s.opener.as_str()))
            {
                if !trimmed.ends_with(statement.terminator.as_str()) {
                    open_statement = Some(statement);
                }
                continue;
            }

            kept.push(line);
        }

        kept
    }
}
