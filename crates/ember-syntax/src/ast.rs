//! AST (abstract syntax tree) types for the Ember language.
//!
//! The parser builds the tree with every `ty` field set to
//! [`ScriptType::Dynamic`] and every binding unresolved; the semantic analyzer
//! fills them in place and the code generator reads them.

use crate::types::{ConstructorId, MethodId, PropertyId, ScriptType};

/// Literal values, also used for folded host constants.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    String(String),
}

impl Literal {
    pub fn script_type(&self) -> ScriptType {
        match self {
            Literal::Null => ScriptType::Null,
            Literal::Bool(_) => ScriptType::Bool,
            Literal::Long(_) => ScriptType::Long,
            Literal::Double(_) => ScriptType::Double,
            Literal::String(_) => ScriptType::String,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn from_lexeme(op: &str) -> Option<BinaryOp> {
        Some(match op {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Mod,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            "and" | "&&" => BinaryOp::And,
            "or" | "||" => BinaryOp::Or,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Compound assignment forms of `var [x] <op>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Increment,
    Decrement,
}

impl AssignOp {
    /// The binary operator applied by this assignment.
    pub fn binary(self) -> BinaryOp {
        match self {
            AssignOp::Add | AssignOp::Increment => BinaryOp::Add,
            AssignOp::Sub | AssignOp::Decrement => BinaryOp::Sub,
            AssignOp::Mul => BinaryOp::Mul,
            AssignOp::Div => BinaryOp::Div,
            AssignOp::Mod => BinaryOp::Mod,
        }
    }
}

/// What a member access resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberBinding {
    Unresolved,
    Method(MethodId),
    Property(PropertyId),
    /// A host constant, folded into the literal.
    Const(Literal),
    /// Looked up by name on the runtime type of the target.
    Dynamic,
}

/// Member access: `target:name[args]`, or a static reference when `target`
/// is `None` (`print [x]`, `math.pi`).
#[derive(Debug, Clone)]
pub struct MemberExpr {
    pub target: Option<Box<Expr>>,
    pub name: String,
    pub args: Option<Vec<Expr>>,
    pub binding: MemberBinding,
}

impl MemberExpr {
    pub fn arg_count(&self) -> usize {
        self.args.as_ref().map_or(0, Vec::len)
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Identifier(String),
    Literal(Literal),
    Member(MemberExpr),
    Constructor {
        type_name: String,
        args: Vec<Expr>,
        binding: Option<ConstructorId>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Cast {
        type_name: String,
        operand: Box<Expr>,
    },
}

/// An expression with its source offset and analyzed result type.
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub offset: usize,
    pub ty: ScriptType,
}

impl Expr {
    pub fn new(kind: ExprKind, offset: usize) -> Self {
        Self {
            kind,
            offset,
            ty: ScriptType::Dynamic,
        }
    }

    pub fn literal(&self) -> Option<&Literal> {
        match &self.kind {
            ExprKind::Literal(l) => Some(l),
            _ => None,
        }
    }
}

/// Resolved iteration protocol of a `foreach` target.
#[derive(Debug, Clone, PartialEq)]
pub enum IterationBinding {
    Unresolved,
    Static {
        count: PropertyId,
        get_item: MethodId,
    },
    Dynamic,
}

#[derive(Debug, Clone)]
pub struct CondBranch {
    pub cond: Expr,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Using {
        namespace: String,
    },
    In {
        name: String,
        type_name: Option<String>,
        declared: ScriptType,
    },
    VarDecl {
        name: String,
        value: Expr,
    },
    VarAssign {
        name: String,
        op: AssignOp,
        value: Option<Expr>,
        /// Type of the variable before the write.
        current: ScriptType,
        /// Type of the variable after the write.
        result: ScriptType,
    },
    If {
        branches: Vec<CondBranch>,
        else_body: Option<Vec<Stmt>>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    For {
        init: Box<Stmt>,
        cond: Expr,
        step: Box<Stmt>,
        body: Vec<Stmt>,
    },
    Foreach {
        item: String,
        iterable: Expr,
        body: Vec<Stmt>,
        iteration: IterationBinding,
    },
    Loop {
        count: Expr,
        body: Vec<Stmt>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    Exit,
    Function {
        name: String,
        params: Vec<String>,
        body: Vec<Stmt>,
    },
    /// A member expression used as a statement; `assign` turns a property
    /// access into a property write.
    Member {
        target: Expr,
        assign: Option<Expr>,
    },
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub offset: usize,
}

impl Stmt {
    pub fn new(kind: StmtKind, offset: usize) -> Self {
        Self { kind, offset }
    }
}

/// A whole parsed script.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub statements: Vec<Stmt>,
}
