use std::fmt;
use std::path::Path;

use serde::Serialize;

/// Where a compilation unit came from.
///
/// Reed compiles physical files, literal strings (tests, `-e` style
/// invocations), standard input, and REPL lines. Only the name matters to
/// the core -- streams are opened by the driver -- but diagnostics want a
/// printable provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SourceName {
    /// An on-disk file, by path.
    File(String),
    /// A string of code with no backing file.
    Str,
    /// Standard input.
    Stdin,
    /// A REPL line.
    Repl,
}

impl SourceName {
    /// Create a source name for a file path.
    pub fn file(path: impl AsRef<Path>) -> Self {
        SourceName::File(path.as_ref().display().to_string())
    }

    /// Printable name used in diagnostics.
    pub fn as_str(&self) -> &str {
        match self {
            SourceName::File(p) => p,
            SourceName::Str => "<one-liner>",
            SourceName::Stdin => "<stdin>",
            SourceName::Repl => "<repl>",
        }
    }

    /// The module name for this source: file stem without extension,
    /// or the provenance name for non-file sources.
    pub fn module_name(&self) -> String {
        match self {
            SourceName::File(p) => Path::new(p)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(p)
                .to_string(),
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source location of a token or IR node: a line range and a column range.
///
/// Lines and columns are 1-based and inclusive on both ends. Multi-line
/// nodes (a whole function, a triple-quoted string) carry the line of their
/// first and last token. This is intentionally all the source mapping the
/// compiler keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceInfo {
    pub lines: (u32, u32),
    pub cols: (u32, u32),
}

impl SourceInfo {
    /// Location spanning a single point range on one line.
    pub fn new(line: u32, col_start: u32, col_end: u32) -> Self {
        Self {
            lines: (line, line),
            cols: (col_start, col_end),
        }
    }

    /// A zero location for synthesized nodes.
    pub fn none() -> Self {
        Self {
            lines: (0, 0),
            cols: (0, 0),
        }
    }

    /// Extend this location so it ends where `end` ends.
    pub fn to(self, end: SourceInfo) -> SourceInfo {
        SourceInfo {
            lines: (self.lines.0, end.lines.1),
            cols: (self.cols.0, end.cols.1),
        }
    }
}

impl fmt::Display for SourceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.lines.0 == self.lines.1 {
            write!(f, "{}:{}-{}", self.lines.0, self.cols.0, self.cols.1)
        } else {
            write!(
                f,
                "{}:{}-{}:{}",
                self.lines.0, self.cols.0, self.lines.1, self.cols.1
            )
        }
    }
}
