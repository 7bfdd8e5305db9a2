//! Token definitions produced by the Ember tokenizer.
//!
//! Ember tokens are deliberately coarse: the tokenizer only decides which
//! *category* a lexeme belongs to and keeps the (lowercased) lexeme text
//! itself. Keywords and operators are matched by text in the parser.
//!
//! # Token Categories
//!
//! - **Keywords**: reserved words such as `var`, `if`, `while`, `end`
//! - **Identifiers**: variable, member, type and namespace names (`math.abs`)
//! - **Operators**: greedy runs of operator characters (`+=`, `==`) and the
//!   word operators `and`, `or`, `not`
//! - **Literals**: `null`, numbers, strings, `true`, `false`
//! - **Punctuation**: `[`, `]`, `:` and line ends
//! - **Comments**: kept by the tokenizer so offsets stay exact, stripped
//!   before parsing
//!
//! # Examples
//!
//! ```rust
//! use ember_syntax::{Token, TokenKind};
//!
//! let token = Token::new("var", TokenKind::Keyword, 0);
//! assert!(token.is_keyword("var"));
//! assert!(!token.is_operator("="));
//! ```

use std::fmt;

/// Category of a lexeme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Keyword,
    Identifier,
    Operator,
    NullLiteral,
    NumLiteral,
    StringLiteral,
    TrueLiteral,
    FalseLiteral,
    /// `[`
    OpenBracket,
    /// `]`
    ClosedBracket,
    /// A newline; statements are terminated by line ends.
    EndLine,
    /// `:` member access separator
    Colon,
    Comment,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Keyword => "keyword",
            TokenKind::Identifier => "identifier",
            TokenKind::Operator => "operator",
            TokenKind::NullLiteral => "null",
            TokenKind::NumLiteral => "number",
            TokenKind::StringLiteral => "string",
            TokenKind::TrueLiteral => "true",
            TokenKind::FalseLiteral => "false",
            TokenKind::OpenBracket => "'['",
            TokenKind::ClosedBracket => "']'",
            TokenKind::EndLine => "end of line",
            TokenKind::Colon => "':'",
            TokenKind::Comment => "comment",
        };
        f.write_str(name)
    }
}

/// A token with its source offset.
///
/// `lexeme` holds the lowercased source text for every kind except
/// [`TokenKind::StringLiteral`], whose lexeme is the unescaped string
/// contents without quotes.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub lexeme: String,
    pub kind: TokenKind,
    /// Byte offset of the first character of the token in the source.
    pub offset: usize,
}

impl Token {
    pub fn new(lexeme: impl Into<String>, kind: TokenKind, offset: usize) -> Self {
        Self {
            lexeme: lexeme.into(),
            kind,
            offset,
        }
    }

    pub fn is_keyword(&self, word: &str) -> bool {
        self.kind == TokenKind::Keyword && self.lexeme == word
    }

    pub fn is_operator(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.lexeme == op
    }

    /// Human readable description used in parse errors.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::EndLine => "end of line".to_string(),
            TokenKind::StringLiteral => format!("string \"{}\"", self.lexeme),
            _ => format!("'{}'", self.lexeme),
        }
    }
}

/// Reserved words.
pub const KEYWORDS: &[&str] = &[
    "using", "in", "var", "if", "elseif", "else", "while", "for", "foreach", "loop", "do", "end",
    "break", "continue", "return", "exit", "function", "new",
];

/// Every lexeme classified as [`TokenKind::Operator`].
pub const OPERATORS: &[&str] = &[
    "+", "-", "*", "/", "%", "=", "==", "!=", "<", "<=", ">", ">=", "+=", "-=", "*=", "/=", "%=",
    "++", "--", "!", "&&", "||", "and", "or", "not",
];

/// Characters that accumulate into operator runs.
pub fn is_operator_char(c: char) -> bool {
    matches!(c, '+' | '-' | '*' | '/' | '%' | '=' | '!' | '<' | '>' | '&' | '|')
}
