//! Error and diagnostic types.
//!
//! Only tokenizer-level I/O and encoding failures are fatal (`ParseError`);
//! everything else — unbalanced conditionals, macro arity mismatches,
//! unknown type names, and so on — surfaces as a [`Diagnostic`] and
//! processing continues.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors that abort a parse.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error reading {0}: {1}")]
    IoError(PathBuf, #[source] std::io::Error),

    #[error("{0} is not valid {1:?}")]
    EncodingError(PathBuf, crate::config::Encoding),

    #[error("unterminated string or character literal at {0}:{1}")]
    UnterminatedLiteral(PathBuf, u32),

    #[error("cache I/O error: {0}")]
    CacheError(String),
}

/// Result type for fallible parser operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Severity of a non-fatal diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Severity {
    Warning,
    Error,
}

/// A source location: a file path (when known) and a 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct SourceLocation {
    pub file: Option<PathBuf>,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: Option<PathBuf>, line: u32) -> Self {
        Self { file, line }
    }

    pub fn unknown() -> Self {
        Self { file: None, line: 0 }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(path) => write!(f, "{}:{}", path.display(), self.line),
            None => write!(f, "<unknown>:{}", self.line),
        }
    }
}

/// A non-fatal diagnostic: a warning or soft error with a location and
/// message. Recoverable problems (unbalanced conditionals, macro arity
/// mismatches, unknown type names, and so on) become one of these rather
/// than aborting the parse.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub location: SourceLocation,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(location: SourceLocation, message: impl Into<String>) -> Self {
        let diag = Self {
            severity: Severity::Warning,
            location,
            message: message.into(),
        };
        log::warn!("{}: {}", diag.location, diag.message);
        diag
    }

    pub fn error(location: SourceLocation, message: impl Into<String>) -> Self {
        let diag = Self {
            severity: Severity::Error,
            location,
            message: message.into(),
        };
        log::error!("{}: {}", diag.location, diag.message);
        diag
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{kind}: {}: {}", self.location, self.message)
    }
}

/// An append-only collection of diagnostics shared across pipeline stages.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    pub fn warn(&mut self, location: SourceLocation, message: impl Into<String>) {
        self.push(Diagnostic::warning(location, message));
    }

    pub fn error(&mut self, location: SourceLocation, message: impl Into<String>) {
        self.push(Diagnostic::error(location, message));
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.0
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_accumulate_in_order() {
        let mut diags = Diagnostics::new();
        diags.warn(SourceLocation::new(None, 1), "first");
        diags.warn(SourceLocation::new(None, 2), "second");
        assert_eq!(diags.len(), 2);
        let msgs: Vec<_> = diags.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(msgs, vec!["first", "second"]);
    }

    #[test]
    fn source_location_display_with_and_without_file() {
        let with_file = SourceLocation::new(Some(PathBuf::from("a.h")), 3);
        assert_eq!(with_file.to_string(), "a.h:3");
        let without_file = SourceLocation::unknown();
        assert_eq!(without_file.to_string(), "<unknown>:0");
    }
}
