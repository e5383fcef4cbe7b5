//! Line-oriented view of a hand-maintained text file
//!
//! Lines are split on `\n` only, so a CRLF file keeps its `\r` on every line
//! and untouched lines render back byte-for-byte. Lines added by a merge take
//! the file's detected line ending.

use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    Crlf,
}

impl LineEnding {
    /// Decided by the first line break; files without one are `Lf`
    pub fn detect(text: &str) -> Self {
        match text.find('\n') {
            Some(idx) if idx > 0 && text.as_bytes()[idx - 1] == b'\r' => LineEnding::Crlf,
            _ => LineEnding::Lf,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::Crlf => "\r\n",
        }
    }

    fn terminated(&self, content: &str) -> String {
        match self {
            LineEnding::Lf => content.to_string(),
            LineEnding::Crlf => format!("{}\r", content),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDocument {
    lines: Vec<String>,
    ending: LineEnding,
}

impl TextDocument {
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text.split('\n').map(str::to_string).collect(),
            ending: LineEnding::detect(text),
        }
    }

    pub fn ending(&self) -> LineEnding {
        self.ending
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.len() == 1 && self.lines[0].is_empty()
    }

    /// Line content without its `\r`
    pub fn line(&self, idx: usize) -> &str {
        self.lines[idx].strip_suffix('\r').unwrap_or(&self.lines[idx])
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
    }

    /// Replace one line, keeping whatever terminator it had
    pub fn replace_line(&mut self, idx: usize, content: &str) {
        let had_cr = self.lines[idx].ends_with('\r');
        self.lines[idx] = if had_cr {
            format!("{}\r", content)
        } else {
            content.to_string()
        };
    }

    /// Replace `range` with `contents`, terminating new lines per the file's ending
    pub fn splice(&mut self, range: Range<usize>, contents: &[String]) {
        let covers_last = range.end == self.lines.len();
        let mut replacement: Vec<String> = contents
            .iter()
            .map(|content| self.ending.terminated(content))
            .collect();
        if covers_last {
            if let Some(last) = replacement.last_mut() {
                if last.ends_with('\r') {
                    last.pop();
                }
            }
        }
        self.lines.splice(range, replacement);
    }

    pub fn insert_lines(&mut self, idx: usize, contents: &[String]) {
        self.splice(idx..idx, contents);
    }

    /// Index to insert at so new lines land after the last line of text
    /// but before the final newline.
    pub fn append_position(&mut self) -> usize {
        self.ensure_trailing_newline();
        self.lines.len() - 1
    }

    pub fn ensure_trailing_newline(&mut self) {
        if self.lines.last().is_some_and(|last| !last.is_empty()) {
            let idx = self.lines.len() - 1;
            if self.ending == LineEnding::Crlf && !self.lines[idx].ends_with('\r') {
                self.lines[idx].push('\r');
            }
            self.lines.push(String::new());
        }
    }

    /// Index of the last line that is not blank
    pub fn last_non_blank(&self) -> Option<usize> {
        (0..self.lines.len())
            .rev()
            .find(|&idx| !self.line(idx).trim().is_empty())
    }

    pub fn render(&self) -> String {
        self.lines.join("\n")
    }
}

/// Leading spaces and tabs of a line; other whitespace counts as content
pub fn indent_of(line: &str) -> &str {
    let trimmed = line.trim_start_matches([' ', '\t']);
    &line[..line.len() - trimmed.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_is_byte_exact() {
        for text in ["", "a", "a\n", "a\r\nb\r\n", "a\r\nb\nc", "\n\n"] {
            assert_eq!(TextDocument::parse(text).render(), text);
        }
    }

    #[test]
    fn test_detects_crlf() {
        assert_eq!(LineEnding::detect("a\r\nb"), LineEnding::Crlf);
        assert_eq!(LineEnding::detect("a\nb\r\n"), LineEnding::Lf);
        assert_eq!(LineEnding::detect("single"), LineEnding::Lf);
    }

    #[test]
    fn test_inserted_lines_follow_file_ending() {
        let mut doc = TextDocument::parse("one\r\ntwo\r\n");
        let at = doc.append_position();
        doc.insert_lines(at, &["three".to_string()]);
        assert_eq!(doc.render(), "one\r\ntwo\r\nthree\r\n");
    }

    #[test]
    fn test_append_adds_missing_final_newline() {
        let mut doc = TextDocument::parse("one\r\ntwo");
        let at = doc.append_position();
        doc.insert_lines(at, &["three".to_string()]);
        assert_eq!(doc.render(), "one\r\ntwo\r\nthree\r\n");
    }

    #[test]
    fn test_replace_line_keeps_terminator() {
        let mut doc = TextDocument::parse("a\r\nb");
        doc.replace_line(0, "x");
        doc.replace_line(1, "y");
        assert_eq!(doc.render(), "x\r\ny");
        assert_eq!(doc.line(0), "x");
    }

    #[test]
    fn test_indent_of() {
        assert_eq!(indent_of("        $this->call([]);"), "        ");
        assert_eq!(indent_of("\tfoo"), "\t");
        assert_eq!(indent_of("bar"), "");
        assert_eq!(indent_of("  \u{3000}x"), "  ");
        assert_eq!(indent_of("\u{3000}x"), "");
    }
}
