//! Recursive-descent parser from tokens to the Ember AST.

use ember_lexer::{parse_number, Number};
use ember_syntax::ast::*;
use ember_syntax::error::{error_at, DiagnosticCode, Result};
use ember_syntax::token::{Token, TokenKind};
use ember_syntax::types::ScriptType;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end_offset: usize,
}

impl Parser {
    /// Create a parser over a token stream. Comment tokens are ignored.
    pub fn new(tokens: Vec<Token>) -> Self {
        let end_offset = tokens
            .last()
            .map(|t| t.offset + t.lexeme.len())
            .unwrap_or(0);
        let tokens = tokens
            .into_iter()
            .filter(|t| t.kind != TokenKind::Comment)
            .collect();
        Self {
            tokens,
            pos: 0,
            end_offset,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }
    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }
    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }
    fn offset(&self) -> usize {
        self.peek().map_or(self.end_offset, |t| t.offset)
    }
    fn check_keyword(&self, word: &str) -> bool {
        self.peek().map_or(false, |t| t.is_keyword(word))
    }
    fn check_operator(&self, op: &str) -> bool {
        self.peek().map_or(false, |t| t.is_operator(op))
    }
    fn check_kind(&self, kind: TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    fn skip_endlines(&mut self) {
        while self.check_kind(TokenKind::EndLine) {
            self.pos += 1;
        }
    }

    fn unexpected<T>(&self, expected: &str) -> Result<T> {
        match self.peek() {
            Some(t) => error_at(
                DiagnosticCode::UnexpectedToken,
                t.offset,
                format!("Expected {}, found {}", expected, t.describe()),
            ),
            None => error_at(
                DiagnosticCode::UnexpectedEnd,
                self.end_offset,
                format!("Expected {}, found end of input", expected),
            ),
        }
    }

    fn expect_kind(&mut self, kind: TokenKind, what: &str) -> Result<Token> {
        if self.check_kind(kind) {
            if let Some(t) = self.advance() {
                return Ok(t);
            }
        }
        if kind == TokenKind::Identifier {
            if let Some(t) = self.peek() {
                return error_at(
                    DiagnosticCode::ExpectedIdentifier,
                    t.offset,
                    format!("Expected {}, found {}", what, t.describe()),
                );
            }
        }
        self.unexpected(what)
    }

    fn expect_keyword(&mut self, word: &str) -> Result<Token> {
        if self.check_keyword(word) {
            if let Some(t) = self.advance() {
                return Ok(t);
            }
        }
        self.unexpected(&format!("'{}'", word))
    }

    /// `[name]`
    fn bracketed_name(&mut self) -> Result<(String, usize)> {
        self.expect_kind(TokenKind::OpenBracket, "'['")?;
        let name = self.expect_kind(TokenKind::Identifier, "a name")?;
        self.expect_kind(TokenKind::ClosedBracket, "']'")?;
        Ok((name.lexeme, name.offset))
    }

    /// `<type>`
    fn type_ref(&mut self) -> Result<String> {
        if !self.check_operator("<") {
            return self.unexpected("'<'");
        }
        self.advance();
        let name = self.expect_kind(TokenKind::Identifier, "a type name")?;
        if !self.check_operator(">") {
            return self.unexpected("'>'");
        }
        self.advance();
        Ok(name.lexeme)
    }

    fn at_stmt_end(&self) -> bool {
        match self.peek() {
            None => true,
            Some(t) => {
                t.kind == TokenKind::EndLine
                    || t.is_keyword("end")
                    || t.is_keyword("else")
                    || t.is_keyword("elseif")
            }
        }
    }

    fn expect_stmt_end(&mut self) -> Result<()> {
        if self.at_stmt_end() {
            if self.check_kind(TokenKind::EndLine) {
                self.advance();
            }
            return Ok(());
        }
        match self.peek() {
            Some(t) => error_at(
                DiagnosticCode::ExpectedEndLine,
                t.offset,
                format!("Expected end of line, found {}", t.describe()),
            ),
            None => Ok(()),
        }
    }

    /// Parse a whole script.
    pub fn parse_script(&mut self) -> Result<Script> {
        let mut statements = Vec::new();
        loop {
            self.skip_endlines();
            if self.peek().is_none() {
                break;
            }
            statements.push(self.parse_stmt()?);
            self.expect_stmt_end()?;
        }
        Ok(Script { statements })
    }

    /// Statements up to (not including) one of the `terminators` keywords.
    fn parse_block(&mut self, terminators: &[&str]) -> Result<Vec<Stmt>> {
        let mut body = Vec::new();
        loop {
            self.skip_endlines();
            match self.peek() {
                None => {
                    return error_at(
                        DiagnosticCode::UnexpectedEnd,
                        self.end_offset,
                        "Expected 'end' before end of input",
                    )
                }
                Some(t)
                    if t.kind == TokenKind::Keyword
                        && terminators.contains(&t.lexeme.as_str()) =>
                {
                    return Ok(body)
                }
                _ => {}
            }
            body.push(self.parse_stmt()?);
            self.expect_stmt_end()?;
        }
    }

    /// A block header expression followed by an optional `do`.
    fn header_expr(&mut self) -> Result<Expr> {
        self.skip_endlines();
        let e = self.parse_expr()?;
        self.skip_endlines();
        if self.check_keyword("do") {
            self.advance();
        }
        Ok(e)
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        let offset = self.offset();
        let Some(tok) = self.peek() else {
            return self.unexpected("a statement");
        };
        if tok.kind != TokenKind::Keyword || tok.lexeme == "new" {
            return self.parse_member_stmt();
        }
        let word = tok.lexeme.clone();
        let kind = match word.as_str() {
            "using" => {
                self.advance();
                let ns = self.expect_kind(TokenKind::Identifier, "a namespace")?;
                StmtKind::Using { namespace: ns.lexeme }
            }
            "in" => {
                self.advance();
                let type_name = if self.check_operator("<") {
                    Some(self.type_ref()?)
                } else {
                    None
                };
                let (name, _) = self.bracketed_name()?;
                StmtKind::In {
                    name,
                    type_name,
                    declared: ScriptType::Dynamic,
                }
            }
            "var" => return self.parse_var_stmt(),
            "if" => self.parse_if()?,
            "while" => {
                self.advance();
                let cond = self.header_expr()?;
                let body = self.parse_block(&["end"])?;
                self.expect_keyword("end")?;
                StmtKind::While { cond, body }
            }
            "for" => {
                self.advance();
                self.skip_endlines();
                let init = self.parse_var_stmt()?;
                self.skip_endlines();
                let cond = self.parse_expr()?;
                self.skip_endlines();
                let step = self.parse_var_stmt()?;
                self.skip_endlines();
                if self.check_keyword("do") {
                    self.advance();
                }
                let body = self.parse_block(&["end"])?;
                self.expect_keyword("end")?;
                StmtKind::For {
                    init: Box::new(init),
                    cond,
                    step: Box::new(step),
                    body,
                }
            }
            "foreach" => {
                self.advance();
                self.skip_endlines();
                let (item, _) = self.bracketed_name()?;
                self.skip_endlines();
                self.expect_keyword("in")?;
                let iterable = self.header_expr()?;
                let body = self.parse_block(&["end"])?;
                self.expect_keyword("end")?;
                StmtKind::Foreach {
                    item,
                    iterable,
                    body,
                    iteration: IterationBinding::Unresolved,
                }
            }
            "loop" => {
                self.advance();
                let count = self.header_expr()?;
                let body = self.parse_block(&["end"])?;
                self.expect_keyword("end")?;
                StmtKind::Loop { count, body }
            }
            "break" => {
                self.advance();
                StmtKind::Break
            }
            "continue" => {
                self.advance();
                StmtKind::Continue
            }
            "exit" => {
                self.advance();
                StmtKind::Exit
            }
            "return" => {
                self.advance();
                if self.at_stmt_end() {
                    StmtKind::Return(None)
                } else {
                    StmtKind::Return(Some(self.parse_expr()?))
                }
            }
            "function" => {
                self.advance();
                let name = self.expect_kind(TokenKind::Identifier, "a function name")?;
                let mut params = Vec::new();
                while self.check_kind(TokenKind::OpenBracket) {
                    params.push(self.bracketed_name()?.0);
                }
                let body = self.parse_block(&["end"])?;
                self.expect_keyword("end")?;
                StmtKind::Function {
                    name: name.lexeme,
                    params,
                    body,
                }
            }
            _ => {
                return error_at(
                    DiagnosticCode::InvalidStatement,
                    offset,
                    format!("Unexpected keyword '{}'", word),
                )
            }
        };
        Ok(Stmt::new(kind, offset))
    }

    fn parse_if(&mut self) -> Result<StmtKind> {
        self.advance();
        let mut branches = Vec::new();
        let cond = self.header_expr()?;
        let body = self.parse_block(&["elseif", "else", "end"])?;
        branches.push(CondBranch { cond, body });
        let mut else_body = None;
        loop {
            match self.peek().map(|t| t.lexeme.as_str()) {
                Some("elseif") => {
                    self.advance();
                    let cond = self.header_expr()?;
                    let body = self.parse_block(&["elseif", "else", "end"])?;
                    branches.push(CondBranch { cond, body });
                }
                Some("else") => {
                    self.advance();
                    else_body = Some(self.parse_block(&["end"])?);
                    self.expect_keyword("end")?;
                    break;
                }
                _ => {
                    self.expect_keyword("end")?;
                    break;
                }
            }
        }
        Ok(StmtKind::If {
            branches,
            else_body,
        })
    }

    /// `var [x] = e`, `var [x] op= e`, `var [x]++`, `var [x]--`
    fn parse_var_stmt(&mut self) -> Result<Stmt> {
        let offset = self.offset();
        if !self.check_keyword("var") {
            return error_at(
                DiagnosticCode::InvalidStatement,
                offset,
                "Expected a 'var' statement",
            );
        }
        self.advance();
        let (name, _) = self.bracketed_name()?;
        let op_offset = self.offset();
        let op = match self.peek() {
            Some(t) if t.kind == TokenKind::Operator => t.lexeme.clone(),
            _ => {
                return error_at(
                    DiagnosticCode::InvalidAssignment,
                    op_offset,
                    format!("Expected an assignment to '{}'", name),
                )
            }
        };
        self.advance();
        let assign = match op.as_str() {
            "=" => {
                let value = self.parse_expr()?;
                return Ok(Stmt::new(StmtKind::VarDecl { name, value }, offset));
            }
            "+=" => AssignOp::Add,
            "-=" => AssignOp::Sub,
            "*=" => AssignOp::Mul,
            "/=" => AssignOp::Div,
            "%=" => AssignOp::Mod,
            "++" => AssignOp::Increment,
            "--" => AssignOp::Decrement,
            other => {
                return error_at(
                    DiagnosticCode::InvalidAssignment,
                    op_offset,
                    format!("'{}' is not an assignment operator", other),
                )
            }
        };
        let value = match assign {
            AssignOp::Increment | AssignOp::Decrement => None,
            _ => Some(self.parse_expr()?),
        };
        Ok(Stmt::new(
            StmtKind::VarAssign {
                name,
                op: assign,
                value,
                current: ScriptType::Dynamic,
                result: ScriptType::Dynamic,
            },
            offset,
        ))
    }

    fn parse_member_stmt(&mut self) -> Result<Stmt> {
        let offset = self.offset();
        let target = self.parse_operand()?;
        let is_property = match &target.kind {
            ExprKind::Identifier(_) => true,
            ExprKind::Member(m) => m.args.is_none(),
            ExprKind::Constructor { .. } => false,
            _ => {
                return error_at(
                    DiagnosticCode::InvalidStatement,
                    offset,
                    "Only calls and property assignments can be used as statements",
                )
            }
        };
        let assign = if self.check_operator("=") {
            let at = self.offset();
            self.advance();
            if !is_property {
                return error_at(
                    DiagnosticCode::InvalidAssignment,
                    at,
                    "Only properties can be assigned",
                );
            }
            Some(self.parse_expr()?)
        } else {
            None
        };
        if assign.is_none() && matches!(target.kind, ExprKind::Constructor { .. }) {
            return error_at(
                DiagnosticCode::InvalidStatement,
                offset,
                "A constructor cannot be used as a statement",
            );
        }
        Ok(Stmt::new(StmtKind::Member { target, assign }, offset))
    }

    /// `expr := unary (binop expr)?`
    ///
    /// Binary operators chain to the right and have no precedence, so
    /// `[a] - [b] - [c]` is `a - (b - c)`.
    pub fn parse_expr(&mut self) -> Result<Expr> {
        let lhs = self.parse_unary()?;
        let op = match self.peek() {
            Some(t) if t.kind == TokenKind::Operator => BinaryOp::from_lexeme(&t.lexeme),
            _ => None,
        };
        let Some(op) = op else {
            return Ok(lhs);
        };
        self.advance();
        let rhs = self.parse_expr()?;
        let offset = lhs.offset;
        Ok(Expr::new(
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            offset,
        ))
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let offset = self.offset();
        let op = match self.peek() {
            Some(t) if t.is_operator("-") => Some(UnaryOp::Neg),
            Some(t) if t.is_operator("!") || t.is_operator("not") => Some(UnaryOp::Not),
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::new(
                    ExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    offset,
                ))
            }
            None => self.parse_operand(),
        }
    }

    fn parse_operand(&mut self) -> Result<Expr> {
        let offset = self.offset();
        let Some(tok) = self.peek().cloned() else {
            return error_at(
                DiagnosticCode::UnexpectedEnd,
                self.end_offset,
                "Expected an expression, found end of input",
            );
        };
        match tok.kind {
            TokenKind::OpenBracket => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect_kind(TokenKind::ClosedBracket, "']'")?;
                self.parse_suffixes(inner)
            }
            TokenKind::NumLiteral => {
                self.advance();
                let lit = match parse_number(&tok.lexeme) {
                    Some(Number::Long(n)) => Literal::Long(n),
                    Some(Number::Double(d)) => Literal::Double(d),
                    None => {
                        return error_at(
                            DiagnosticCode::InvalidNumber,
                            offset,
                            format!("Invalid number '{}'", tok.lexeme),
                        )
                    }
                };
                Ok(Expr::new(ExprKind::Literal(lit), offset))
            }
            TokenKind::StringLiteral => {
                self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::String(tok.lexeme)), offset))
            }
            TokenKind::NullLiteral => {
                self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::Null), offset))
            }
            TokenKind::TrueLiteral | TokenKind::FalseLiteral => {
                self.advance();
                let b = tok.kind == TokenKind::TrueLiteral;
                Ok(Expr::new(ExprKind::Literal(Literal::Bool(b)), offset))
            }
            TokenKind::Identifier => {
                self.advance();
                let expr = match self.parse_args()? {
                    Some(args) => Expr::new(
                        ExprKind::Member(MemberExpr {
                            target: None,
                            name: tok.lexeme,
                            args: Some(args),
                            binding: MemberBinding::Unresolved,
                        }),
                        offset,
                    ),
                    None => Expr::new(ExprKind::Identifier(tok.lexeme), offset),
                };
                self.parse_suffixes(expr)
            }
            TokenKind::Keyword if tok.lexeme == "new" => {
                self.advance();
                let type_name = self.expect_kind(TokenKind::Identifier, "a type name")?;
                let args = self.parse_args()?.unwrap_or_default();
                let expr = Expr::new(
                    ExprKind::Constructor {
                        type_name: type_name.lexeme,
                        args,
                        binding: None,
                    },
                    offset,
                );
                self.parse_suffixes(expr)
            }
            TokenKind::Operator if tok.lexeme == "<" => {
                let type_name = self.type_ref()?;
                let operand = self.parse_operand()?;
                Ok(Expr::new(
                    ExprKind::Cast {
                        type_name,
                        operand: Box::new(operand),
                    },
                    offset,
                ))
            }
            _ => error_at(
                DiagnosticCode::ExpectedExpression,
                offset,
                format!("Expected an expression, found {}", tok.describe()),
            ),
        }
    }

    /// `([expr])+` on the current line, or `None` when no `[` follows.
    fn parse_args(&mut self) -> Result<Option<Vec<Expr>>> {
        if !self.check_kind(TokenKind::OpenBracket) {
            return Ok(None);
        }
        let mut args = Vec::new();
        while self.check_kind(TokenKind::OpenBracket) {
            self.advance();
            args.push(self.parse_expr()?);
            self.expect_kind(TokenKind::ClosedBracket, "']'")?;
        }
        Ok(Some(args))
    }

    /// `(: ident args?)*`
    fn parse_suffixes(&mut self, mut expr: Expr) -> Result<Expr> {
        while self.check_kind(TokenKind::Colon) {
            self.advance();
            let name = self.expect_kind(TokenKind::Identifier, "a member name")?;
            let args = self.parse_args()?;
            expr = Expr::new(
                ExprKind::Member(MemberExpr {
                    target: Some(Box::new(expr)),
                    name: name.lexeme,
                    args,
                    binding: MemberBinding::Unresolved,
                }),
                name.offset,
            );
        }
        Ok(expr)
    }
}
