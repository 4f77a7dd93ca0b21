//! Error types shared across the engine.

use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::value::Type;

/// A point in an input script: source name, 1-based line and column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pos {
    /// Name of the input (file path, `-e`, …).
    pub source: Rc<str>,
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
}

impl Pos {
    /// Creates a new position.
    #[must_use]
    pub fn new(source: Rc<str>, line: u32, column: u32) -> Self {
        Self {
            source,
            line,
            column,
        }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.line, self.column)
    }
}

/// A lex or parse failure with enough context to render a caret-aligned
/// excerpt of the offending line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    /// Where the failure was detected.
    pub pos: Pos,
    /// The full text of the offending source line.
    pub line_text: String,
    /// What went wrong.
    pub message: String,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {}", self.pos, self.message)?;
        writeln!(f, "  {}", self.line_text)?;
        let indent = self.pos.column.saturating_sub(1) as usize;
        write!(f, "  {}^", " ".repeat(indent))
    }
}

/// Every failure the engine surfaces. Errors bubble to the nearest
/// statement boundary and abort the current statement.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed token or literal.
    #[error("{0}")]
    Lex(SyntaxError),

    /// Unexpected token.
    #[error("{0}")]
    Parse(SyntaxError),

    /// A reference resolved against neither the FROM columns nor the scope.
    #[error("unbound identifier: {0}")]
    UnboundIdentifier(String),

    /// An unqualified column name matched more than one FROM source.
    #[error("ambiguous column: {0}")]
    AmbiguousColumn(String),

    /// A selected column is not present in the source document.
    #[error("unknown column: {0}")]
    UnknownColumn(String),

    /// Incompatible operand or assignment types.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// The requested CAST combination is not defined.
    #[error("unsupported cast from {from} to {to}")]
    UnsupportedCast {
        /// Source type.
        from: Type,
        /// Target type.
        to: Type,
    },

    /// Integer division with a zero divisor.
    #[error("division by zero")]
    DivisionByZero,

    /// A call with the wrong number of arguments.
    #[error("{function}: expected {expected} arguments, got {got}")]
    ArityMismatch {
        /// The function being called.
        function: String,
        /// Human-readable bound, e.g. `2` or `2..3`.
        expected: String,
        /// The count actually supplied.
        got: usize,
    },

    /// An argument value outside the function's domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A source could not be acquired (HTTP failure, no glob matches, …).
    #[error("not found: {0}")]
    NotFound(String),

    /// Neither path suffix nor media type identified the document format.
    #[error("unresolved format: {0}")]
    UnresolvedFormat(String),

    /// A FROM clause FILTER string the adapter does not understand.
    #[error("invalid filter option: {0}")]
    FilterOption(String),

    /// Adapter-level parse failure, e.g. a CSV field-count mismatch.
    #[error("format error: {0}")]
    Format(String),

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_caret_alignment() {
        let err = SyntaxError {
            pos: Pos::new("test.iql".into(), 2, 8),
            line_text: "SELECT ) FROM x".to_string(),
            message: "unexpected token ')'".to_string(),
        };
        let rendered = err.to_string();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "test.iql:2:8: unexpected token ')'");
        assert_eq!(lines[1], "  SELECT ) FROM x");
        // The caret sits under the ')' at column 8.
        assert_eq!(lines[2], "  \u{20}\u{20}\u{20}\u{20}\u{20}\u{20}\u{20}^");
    }

    #[test]
    fn test_pos_display() {
        let pos = Pos::new("script.iql".into(), 10, 3);
        assert_eq!(pos.to_string(), "script.iql:10:3");
    }
}
