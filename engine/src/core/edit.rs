//! Shared result, error and newline handling for text edits.

use serde_json::{Map, Value};
use thiserror::Error;

/// Result of a successful edit: the full new content plus structured details.
#[derive(Debug, Clone, PartialEq)]
pub struct EditOutcome {
    pub content: String,
    pub summary: String,
    pub details: Map<String, Value>,
}

impl EditOutcome {
    pub(crate) fn new(content: String, summary: impl Into<String>) -> Self {
        Self {
            content,
            summary: summary.into(),
            details: Map::new(),
        }
    }

    pub(crate) fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// Edit-semantic failures. None of these leave partial output behind.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EditError {
    #[error("line {line} out of range (file has {line_count} lines, valid 1..={max})")]
    LineOutOfRange {
        line: usize,
        line_count: usize,
        max: usize,
    },
    #[error("end_line ({end}) must be >= start_line ({start})")]
    RangeInverted { start: usize, end: usize },
    #[error("range {start}-{end} out of bounds (file has {line_count} lines)")]
    RangeOutOfBounds {
        start: usize,
        end: usize,
        line_count: usize,
    },
    #[error("search text must not be empty")]
    EmptyNeedle,
    #[error("text not found: {0:?}")]
    TextNotFound(String),
    #[error("invalid regex pattern: {0}")]
    InvalidPattern(String),
    #[error("invalid regex flags: {0}")]
    InvalidFlags(String),
    #[error("pattern not found: {0}")]
    PatternNotFound(String),
    #[error("threshold must be within 0.0..=1.0, got {0}")]
    InvalidThreshold(f64),
    #[error("no sufficiently similar line (best score {best:.2} < {threshold})")]
    BelowThreshold {
        best: f64,
        threshold: f64,
        line: Option<usize>,
    },
    #[error("{kind} '{name}' not found")]
    SymbolNotFound { kind: &'static str, name: String },
    #[error("{kind} '{name}' is ambiguous ({count} definitions)")]
    AmbiguousSymbol {
        kind: &'static str,
        name: String,
        count: usize,
    },
    #[error("no function or class definition found to decorate")]
    NoDecoratorTarget,
    #[error("decorator '{0}' already present")]
    DuplicateDecorator(String),
    #[error("import for '{0}' already exists")]
    DuplicateImport(String),
    #[error("key path must not be empty")]
    EmptyKeyPath,
    #[error("cannot descend into non-map value at '{0}'")]
    NonMapIntermediate(String),
    #[error("parse {format}: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },
}

/// Line terminator convention of a piece of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Newline {
    Lf,
    CrLf,
}

impl Newline {
    pub fn detect(text: &str) -> Self {
        if text.contains("\r\n") {
            Self::CrLf
        } else {
            Self::Lf
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
        }
    }

    /// Convert LF-normalized text back to this convention.
    pub fn restore(self, text: &str) -> String {
        match self {
            Self::Lf => text.to_string(),
            Self::CrLf => text.replace('\n', "\r\n"),
        }
    }
}

/// Normalize CRLF and bare CR to LF.
pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Line view of a document.
///
/// A trailing newline terminates the last line instead of opening a new empty
/// one, so `"a\nb\n"` has two lines and round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TextBuffer {
    pub lines: Vec<String>,
    newline: Newline,
    trailing_newline: bool,
}

impl TextBuffer {
    pub fn parse(content: &str) -> Self {
        let newline = Newline::detect(content);
        let normalized = normalize_newlines(content);
        let trailing_newline = normalized.ends_with('\n');
        let body = normalized.strip_suffix('\n').unwrap_or(&normalized);
        let lines = if normalized.is_empty() {
            Vec::new()
        } else {
            body.split('\n').map(str::to_string).collect()
        };
        Self {
            lines,
            newline,
            trailing_newline,
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn render(&self) -> String {
        if self.lines.is_empty() {
            return String::new();
        }
        let mut out = self.lines.join("\n");
        if self.trailing_newline {
            out.push('\n');
        }
        self.newline.restore(&out)
    }
}

/// Split a caller-supplied block into lines (one trailing newline is dropped).
///
/// An empty block is a single empty line.
pub(crate) fn block_lines(block: &str) -> Vec<String> {
    let normalized = normalize_newlines(block);
    let body = normalized.strip_suffix('\n').unwrap_or(&normalized);
    body.split('\n').map(str::to_string).collect()
}
