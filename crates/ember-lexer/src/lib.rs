//! Ember tokenizer: converts source text into tokens.
use ember_syntax::error::{error_at, DiagnosticCode, Result};
use ember_syntax::token::{is_operator_char, Token, TokenKind, KEYWORDS, OPERATORS};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Pending {
    None,
    Word,
    Operator,
}

/// Single-pass scanner that accumulates lexemes in a pending buffer and
/// classifies them when a terminator is reached.
pub struct Lexer {
    src: Vec<char>,
    pos: usize,
    offset: usize,
    pending: String,
    pending_kind: Pending,
    pending_start: usize,
    tokens: Vec<Token>,
}

impl Lexer {
    /// Create a new lexer over the given source string.
    pub fn new(input: &str) -> Self {
        Self {
            src: input.chars().collect(),
            pos: 0,
            offset: 0,
            pending: String::new(),
            pending_kind: Pending::None,
            pending_start: 0,
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.src.get(self.pos).copied()
    }
    fn peek_next(&self) -> Option<char> {
        self.src.get(self.pos + 1).copied()
    }
    fn advance(&mut self) -> Option<char> {
        let ch = self.src.get(self.pos).copied();
        if let Some(c) = ch {
            self.pos += 1;
            self.offset += c.len_utf8();
        }
        ch
    }

    fn push(&mut self, lexeme: impl Into<String>, kind: TokenKind, offset: usize) {
        self.tokens.push(Token::new(lexeme, kind, offset));
    }

    fn start_pending(&mut self, kind: Pending) {
        self.pending_kind = kind;
        self.pending_start = self.offset;
    }

    /// Whether the last significant token can end an operand, which makes a
    /// following `-` a binary operator rather than a sign.
    fn after_operand(&self) -> bool {
        self.tokens
            .iter()
            .rev()
            .find(|t| t.kind != TokenKind::Comment)
            .map_or(false, |t| {
                matches!(
                    t.kind,
                    TokenKind::Identifier
                        | TokenKind::NumLiteral
                        | TokenKind::StringLiteral
                        | TokenKind::NullLiteral
                        | TokenKind::TrueLiteral
                        | TokenKind::FalseLiteral
                        | TokenKind::ClosedBracket
                )
            })
    }

    fn flush(&mut self) -> Result<()> {
        if self.pending_kind == Pending::None {
            return Ok(());
        }
        let raw = std::mem::take(&mut self.pending);
        let kind = self.pending_kind;
        let offset = self.pending_start;
        self.pending_kind = Pending::None;

        let lexeme = raw.to_lowercase();
        let token_kind = match kind {
            Pending::Operator => {
                if OPERATORS.contains(&lexeme.as_str()) {
                    TokenKind::Operator
                } else {
                    return error_at(
                        DiagnosticCode::InvalidIdentifier,
                        offset,
                        format!("Unknown operator '{}'", raw),
                    );
                }
            }
            _ => classify_word(&lexeme, &raw, offset)?,
        };
        self.push(lexeme, token_kind, offset);
        Ok(())
    }

    fn read_string(&mut self) -> Result<()> {
        let start = self.offset;
        self.advance(); // opening quote
        let mut s = String::new();
        while let Some(c) = self.advance() {
            match c {
                '"' => {
                    self.push(s, TokenKind::StringLiteral, start);
                    return Ok(());
                }
                '\\' => {
                    let esc_offset = self.offset - 1;
                    match self.advance() {
                        Some('"') => s.push('"'),
                        Some('\\') => s.push('\\'),
                        Some('n') => s.push('\n'),
                        Some(other) => {
                            return error_at(
                                DiagnosticCode::InvalidEscape,
                                esc_offset,
                                format!("Invalid escape sequence '\\{}'", other),
                            );
                        }
                        None => {
                            return error_at(
                                DiagnosticCode::InvalidEscape,
                                esc_offset,
                                "Unterminated escape sequence",
                            );
                        }
                    }
                }
                other => s.push(other),
            }
        }
        error_at(DiagnosticCode::UnterminatedString, start, "Unterminated string")
    }

    fn read_line_comment(&mut self) {
        let start = self.offset;
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            s.push(c);
            self.advance();
        }
        self.push(s, TokenKind::Comment, start);
    }

    fn read_block_comment(&mut self) -> Result<()> {
        let start = self.offset;
        let mut s = String::new();
        self.advance();
        self.advance();
        s.push_str("/*");
        loop {
            match self.advance() {
                Some('*') if self.peek() == Some('/') => {
                    self.advance();
                    s.push_str("*/");
                    self.push(s, TokenKind::Comment, start);
                    return Ok(());
                }
                Some(c) => s.push(c),
                None => {
                    return error_at(
                        DiagnosticCode::UnterminatedComment,
                        start,
                        "Unterminated block comment",
                    )
                }
            }
        }
    }

    /// Tokenize the entire input, keeping comment tokens.
    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        while let Some(c) = self.peek() {
            match c {
                '"' => {
                    self.flush()?;
                    self.read_string()?;
                }
                '#' => {
                    self.flush()?;
                    self.read_line_comment();
                }
                '/' if matches!(self.peek_next(), Some('/')) => {
                    self.flush()?;
                    self.read_line_comment();
                }
                '/' if matches!(self.peek_next(), Some('*')) => {
                    self.flush()?;
                    self.read_block_comment()?;
                }
                '\n' => {
                    self.flush()?;
                    let at = self.offset;
                    self.advance();
                    self.push("\n", TokenKind::EndLine, at);
                }
                '[' | ']' | ':' => {
                    self.flush()?;
                    let at = self.offset;
                    self.advance();
                    let kind = match c {
                        '[' => TokenKind::OpenBracket,
                        ']' => TokenKind::ClosedBracket,
                        _ => TokenKind::Colon,
                    };
                    self.push(c.to_string(), kind, at);
                }
                c if c.is_whitespace() => {
                    self.flush()?;
                    self.advance();
                }
                '-' if self.pending_kind == Pending::None
                    && matches!(self.peek_next(), Some(d) if d.is_ascii_digit())
                    && !self.after_operand() =>
                {
                    self.start_pending(Pending::Word);
                    self.pending.push('-');
                    self.advance();
                }
                c if is_operator_char(c) => {
                    if self.pending_kind != Pending::Operator {
                        self.flush()?;
                        self.start_pending(Pending::Operator);
                    }
                    self.pending.push(c);
                    self.advance();
                }
                c => {
                    if self.pending_kind != Pending::Word {
                        self.flush()?;
                        self.start_pending(Pending::Word);
                    }
                    self.pending.push(c);
                    self.advance();
                }
            }
        }
        self.flush()?;
        Ok(std::mem::take(&mut self.tokens))
    }
}

fn classify_word(lexeme: &str, raw: &str, offset: usize) -> Result<TokenKind> {
    if KEYWORDS.contains(&lexeme) {
        return Ok(TokenKind::Keyword);
    }
    match lexeme {
        "null" => return Ok(TokenKind::NullLiteral),
        "true" => return Ok(TokenKind::TrueLiteral),
        "false" => return Ok(TokenKind::FalseLiteral),
        _ => {}
    }
    if OPERATORS.contains(&lexeme) {
        return Ok(TokenKind::Operator);
    }
    if is_numeric(lexeme) {
        if parse_number(lexeme).is_none() {
            return error_at(
                DiagnosticCode::InvalidNumber,
                offset,
                format!("Invalid number '{}'", raw),
            );
        }
        return Ok(TokenKind::NumLiteral);
    }
    if let Some(bad) = lexeme
        .chars()
        .find(|c| !(c.is_alphanumeric() || *c == '.' || *c == '_'))
    {
        return error_at(
            DiagnosticCode::InvalidIdentifier,
            offset,
            format!("Invalid character '{}' in identifier '{}'", bad, raw),
        );
    }
    Ok(TokenKind::Identifier)
}

/// Digits and underscores with at most one `.`; a leading `-` is allowed only
/// at position 0 and the first character after it must be a digit.
fn is_numeric(lexeme: &str) -> bool {
    let body = lexeme.strip_prefix('-').unwrap_or(lexeme);
    let mut dots = 0;
    let mut digits = 0;
    for c in body.chars() {
        match c {
            '0'..='9' => digits += 1,
            '_' => {}
            '.' => dots += 1,
            _ => return false,
        }
    }
    digits > 0 && dots <= 1 && body.starts_with(|c: char| c.is_ascii_digit())
}

/// A parsed numeric literal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Long(i64),
    Double(f64),
}

/// Parse a lexeme accepted by the numeric-literal test. Whole numbers without
/// a `.` that fit in an `i64` become [`Number::Long`].
pub fn parse_number(lexeme: &str) -> Option<Number> {
    let cleaned: String = lexeme.chars().filter(|c| *c != '_').collect();
    if !cleaned.contains('.') {
        if let Ok(n) = cleaned.parse::<i64>() {
            return Some(Number::Long(n));
        }
    }
    cleaned.parse::<f64>().ok().map(Number::Double)
}

/// Tokenize `source` and drop comment tokens, producing the parser's input.
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let tokens = Lexer::new(source).tokenize()?;
    Ok(tokens
        .into_iter()
        .filter(|t| t.kind != TokenKind::Comment)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<(String, TokenKind)> {
        tokenize(src)
            .expect("tokenize should succeed")
            .into_iter()
            .map(|t| (t.lexeme, t.kind))
            .collect()
    }

    #[test]
    fn test_brackets_and_operators() {
        let toks = kinds("Var [x]=[10]");
        assert_eq!(
            toks,
            vec![
                ("var".to_string(), TokenKind::Keyword),
                ("[".to_string(), TokenKind::OpenBracket),
                ("x".to_string(), TokenKind::Identifier),
                ("]".to_string(), TokenKind::ClosedBracket),
                ("=".to_string(), TokenKind::Operator),
                ("[".to_string(), TokenKind::OpenBracket),
                ("10".to_string(), TokenKind::NumLiteral),
                ("]".to_string(), TokenKind::ClosedBracket),
            ]
        );
    }

    #[test]
    fn test_operator_adjacent_to_identifier() {
        let toks = kinds("x+y");
        assert_eq!(toks.len(), 3);
        assert_eq!(toks[1], ("+".to_string(), TokenKind::Operator));
        let toks = kinds("<double>");
        assert_eq!(toks[0].0, "<");
        assert_eq!(toks[1], ("double".to_string(), TokenKind::Identifier));
        assert_eq!(toks[2].0, ">");
    }

    #[test]
    fn test_greedy_operator_runs() {
        let toks = kinds("[x] += [1]\n[a]==[b]");
        assert!(toks.contains(&("+=".to_string(), TokenKind::Operator)));
        assert!(toks.contains(&("==".to_string(), TokenKind::Operator)));
        assert!(toks.contains(&("\n".to_string(), TokenKind::EndLine)));
    }

    #[test]
    fn test_negative_numbers() {
        assert_eq!(kinds("[-5]")[1], ("-5".to_string(), TokenKind::NumLiteral));
        let toks = kinds("x-5");
        assert_eq!(toks[1], ("-".to_string(), TokenKind::Operator));
        let toks = kinds("[x]-[5]");
        assert_eq!(toks[3], ("-".to_string(), TokenKind::Operator));
    }

    #[test]
    fn test_case_folding_except_strings() {
        let toks = kinds("PRINT [\"Hello\"]");
        assert_eq!(toks[0], ("print".to_string(), TokenKind::Identifier));
        assert_eq!(toks[2], ("Hello".to_string(), TokenKind::StringLiteral));
    }

    #[test]
    fn test_literals_and_word_operators() {
        let toks = kinds("null true FALSE and or 1_000 2.5 math.pi");
        let k: Vec<TokenKind> = toks.iter().map(|t| t.1).collect();
        assert_eq!(
            k,
            vec![
                TokenKind::NullLiteral,
                TokenKind::TrueLiteral,
                TokenKind::FalseLiteral,
                TokenKind::Operator,
                TokenKind::Operator,
                TokenKind::NumLiteral,
                TokenKind::NumLiteral,
                TokenKind::Identifier,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        let toks = kinds(r#""a\"b\\c\nd""#);
        assert_eq!(toks[0].0, "a\"b\\c\nd");
        let err = tokenize(r#""bad \t""#).unwrap_err();
        assert_eq!(err.code, DiagnosticCode::InvalidEscape);
        let err = tokenize("\"open").unwrap_err();
        assert_eq!(err.code, DiagnosticCode::UnterminatedString);
    }

    #[test]
    fn test_comments_are_kept_then_stripped() {
        let src = "# hash\nvar [x] = [1] // trailing\n/* block\n */print [x]";
        let all = Lexer::new(src).tokenize().unwrap();
        assert_eq!(all.iter().filter(|t| t.kind == TokenKind::Comment).count(), 3);
        let print = all.iter().find(|t| t.lexeme == "print").unwrap();
        assert_eq!(print.offset, src.find("print").unwrap());
        assert!(tokenize(src).unwrap().iter().all(|t| t.kind != TokenKind::Comment));
    }

    #[test]
    fn test_invalid_identifier() {
        let err = tokenize("var [x$] = [1]").unwrap_err();
        assert_eq!(err.code, DiagnosticCode::InvalidIdentifier);
        assert_eq!(err.offset, 5);
        assert!(tokenize("[a] +* [b]").is_err());
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("1_000"), Some(Number::Long(1000)));
        assert_eq!(parse_number("2.5"), Some(Number::Double(2.5)));
        assert_eq!(parse_number("-3"), Some(Number::Long(-3)));
    }
}
