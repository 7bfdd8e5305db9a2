//! Diagnostics reported by the Ember compiler pipeline.
//!
//! Every compiler stage (tokenizer, parser, semantic analyzer, code
//! generator) reports problems as a [`Diagnostic`]. Compilation stops at the
//! first diagnostic with [`Severity::Error`]; there is no error recovery.
//!
//! # Code bands
//!
//! Each stage owns a band of numeric codes so a host can tell where a
//! diagnostic came from without parsing the message:
//!
//! | band  | stage             |
//! |-------|-------------------|
//! | `1xx` | tokenizer         |
//! | `2xx` | parser            |
//! | `3xx` | semantic analyzer |
//! | `4xx` | code generator    |
//!
//! Codes ending in `90` are reserved for stage warnings. The compiler does not
//! emit them today.
//!
//! # Examples
//!
//! ```rust
//! use ember_syntax::error::{error_at, DiagnosticCode, Result};
//!
//! fn must_be_positive(n: i64, offset: usize) -> Result<i64> {
//!     if n < 0 {
//!         error_at(DiagnosticCode::InvalidOperands, offset, "expected a positive value")
//!     } else {
//!         Ok(n)
//!     }
//! }
//!
//! let err = must_be_positive(-1, 7).unwrap_err();
//! assert_eq!(err.code.number(), 302);
//! assert_eq!(err.offset, 7);
//! ```

use thiserror::Error;

/// Severity of a diagnostic. Only errors stop compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// Stage that produced a diagnostic, derived from the code band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Tokenizer,
    Parser,
    Semantic,
    CodeGen,
}

/// Numeric diagnostic codes, grouped by stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum DiagnosticCode {
    // tokenizer
    InvalidEscape = 101,
    UnterminatedString = 102,
    InvalidIdentifier = 103,
    UnterminatedComment = 104,
    InvalidNumber = 105,
    TokenizerWarning = 190,

    // parser
    UnexpectedToken = 201,
    UnexpectedEnd = 202,
    ExpectedExpression = 203,
    ExpectedIdentifier = 204,
    ExpectedEndLine = 205,
    InvalidAssignment = 206,
    InvalidStatement = 207,
    ParserWarning = 290,

    // semantic analyzer
    UseBeforeDeclaration = 301,
    InvalidOperands = 302,
    AmbiguousMatch = 303,
    InvalidMember = 304,
    InvalidType = 305,
    ArgumentCount = 306,
    ArgumentType = 307,
    MisplacedDeclaration = 308,
    BreakOutsideLoop = 309,
    ContinueOutsideLoop = 310,
    FunctionsNotSupported = 311,
    CastNotSupported = 312,
    DuplicateInVar = 313,
    NotAssignable = 314,
    NotIterable = 315,
    SemanticWarning = 390,

    // code generator
    UnsupportedConstruct = 401,
    TooManyLocals = 402,
    TooManyStrings = 403,
    UnresolvedLabel = 404,
    JumpOutOfRange = 405,
    CodeGenWarning = 490,
}

impl DiagnosticCode {
    pub fn number(self) -> u16 {
        self as u16
    }

    pub fn stage(self) -> Stage {
        match self.number() {
            100..=199 => Stage::Tokenizer,
            200..=299 => Stage::Parser,
            300..=399 => Stage::Semantic,
            _ => Stage::CodeGen,
        }
    }

    pub fn severity(self) -> Severity {
        if self.number() % 100 == 90 {
            Severity::Warning
        } else {
            Severity::Error
        }
    }

    /// Header shown above the message, one per stage.
    pub fn header(self) -> &'static str {
        match (self.stage(), self.severity()) {
            (Stage::Tokenizer, Severity::Error) => "Tokenizer Error",
            (Stage::Parser, Severity::Error) => "Parser Error",
            (Stage::Semantic, Severity::Error) => "Semantic Error",
            (Stage::CodeGen, Severity::Error) => "Compiler Error",
            (Stage::Tokenizer, Severity::Warning) => "Tokenizer Warning",
            (Stage::Parser, Severity::Warning) => "Parser Warning",
            (Stage::Semantic, Severity::Warning) => "Semantic Warning",
            (Stage::CodeGen, Severity::Warning) => "Compiler Warning",
        }
    }
}

/// A problem found while compiling a script.
///
/// `offset` is the byte offset into the source text; use [`line_col`] to turn
/// it into a position for display.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{header}: {message}")]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub header: String,
    pub message: String,
    pub offset: usize,
    pub severity: Severity,
}

impl Diagnostic {
    pub fn new(code: DiagnosticCode, offset: usize, message: impl Into<String>) -> Self {
        Self {
            code,
            header: code.header().to_string(),
            message: message.into(),
            offset,
            severity: code.severity(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Result type used by every compiler stage.
pub type Result<T> = std::result::Result<T, Diagnostic>;

/// Shorthand for `Err(Diagnostic::new(code, offset, message))`.
pub fn error_at<T>(code: DiagnosticCode, offset: usize, message: impl Into<String>) -> Result<T> {
    Err(Diagnostic::new(code, offset, message))
}

/// Convert a byte offset into a 1-based `(line, column)` pair.
///
/// Offsets past the end of the source resolve to the position just after the
/// last character.
pub fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for (i, c) in source.char_indices() {
        if i >= offset {
            break;
        }
        if c == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_bands() {
        assert_eq!(DiagnosticCode::InvalidEscape.stage(), Stage::Tokenizer);
        assert_eq!(DiagnosticCode::UnexpectedToken.stage(), Stage::Parser);
        assert_eq!(DiagnosticCode::AmbiguousMatch.stage(), Stage::Semantic);
        assert_eq!(DiagnosticCode::TooManyLocals.stage(), Stage::CodeGen);
        assert_eq!(DiagnosticCode::SemanticWarning.severity(), Severity::Warning);
        assert_eq!(DiagnosticCode::InvalidMember.severity(), Severity::Error);
    }

    #[test]
    fn test_display_uses_header() {
        let d = Diagnostic::new(DiagnosticCode::UseBeforeDeclaration, 3, "'x' is not declared");
        assert_eq!(d.to_string(), "Semantic Error: 'x' is not declared");
    }

    #[test]
    fn test_line_col() {
        let src = "var [x] = [1]\nprint [y]";
        assert_eq!(line_col(src, 0), (1, 1));
        assert_eq!(line_col(src, 5), (1, 6));
        assert_eq!(line_col(src, 14), (2, 1));
        assert_eq!(line_col(src, 21), (2, 8));
    }
}
