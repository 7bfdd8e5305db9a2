//! Semantic analysis: declaration checks, type inference and member
//! resolution. Annotates the AST in place.

use std::collections::HashSet;

use ember_host::registry::{split_qualified, ConstDef, HostTypeRegistry, MethodDef, PropertyDef};
use ember_syntax::ast::*;
use ember_syntax::error::{error_at, DiagnosticCode, Result};
use ember_syntax::types::ScriptType;
use tracing::debug;

use crate::context::{FrameKind, TypeContext};
use crate::operators::{binary_result, unary_result};
use crate::symbols::SymbolTable;

/// An input variable declared with `in`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InVarDecl {
    pub name: String,
    pub ty: ScriptType,
}

/// Everything later stages need besides the annotated AST.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    pub in_vars: Vec<InVarDecl>,
    pub symbols: SymbolTable,
    pub usings: Vec<String>,
}

enum StaticMatch<'r> {
    Method(&'r MethodDef),
    Property(&'r PropertyDef),
    Const(&'r ConstDef),
}

/// Loop parts analysed inside the Loop frame.
enum LoopBody<'a> {
    While {
        cond: &'a mut Expr,
        body: &'a mut Vec<Stmt>,
    },
    For {
        cond: &'a mut Expr,
        step: &'a mut Stmt,
        body: &'a mut Vec<Stmt>,
    },
    Foreach {
        item: &'a str,
        item_ty: ScriptType,
        offset: usize,
        body: &'a mut Vec<Stmt>,
    },
    Counted {
        body: &'a mut Vec<Stmt>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Header {
    Usings,
    InVars,
    Body,
}

pub struct Analyzer<'r> {
    registry: &'r HostTypeRegistry,
    ctx: TypeContext,
    symbols: SymbolTable,
    usings: Vec<String>,
    in_vars: Vec<InVarDecl>,
    /// Writes recorded per active loop, innermost last.
    loop_writes: Vec<Vec<(String, ScriptType)>>,
    header: Header,
}

impl<'r> Analyzer<'r> {
    pub fn new(registry: &'r HostTypeRegistry, usings: &[String]) -> Self {
        let mut analyzer = Self {
            registry,
            ctx: TypeContext::new(),
            symbols: SymbolTable::new(),
            usings: Vec::new(),
            in_vars: Vec::new(),
            loop_writes: Vec::new(),
            header: Header::Usings,
        };
        for ns in usings {
            analyzer.add_using(ns);
        }
        analyzer
    }

    fn add_using(&mut self, ns: &str) {
        let ns = ns.to_lowercase();
        if !self.usings.contains(&ns) {
            self.usings.push(ns);
        }
    }

    pub fn analyze(mut self, script: &mut Script) -> Result<Analysis> {
        for stmt in &mut script.statements {
            self.top_level_stmt(stmt)?;
        }
        debug!(
            symbols = self.symbols.len(),
            in_vars = self.in_vars.len(),
            "semantic analysis complete"
        );
        Ok(Analysis {
            in_vars: self.in_vars,
            symbols: self.symbols,
            usings: self.usings,
        })
    }

    fn top_level_stmt(&mut self, stmt: &mut Stmt) -> Result<()> {
        let offset = stmt.offset;
        match &mut stmt.kind {
            StmtKind::Using { namespace } => {
                if self.header > Header::Usings {
                    return error_at(
                        DiagnosticCode::MisplacedDeclaration,
                        offset,
                        "'using' must come before 'in' and all other statements",
                    );
                }
                if !self.registry.has_namespace(namespace) {
                    return error_at(
                        DiagnosticCode::InvalidMember,
                        offset,
                        format!("Unknown namespace '{}'", namespace),
                    );
                }
                let ns = namespace.clone();
                self.add_using(&ns);
                Ok(())
            }
            StmtKind::In {
                name,
                type_name,
                declared,
            } => {
                if self.header > Header::InVars {
                    return error_at(
                        DiagnosticCode::MisplacedDeclaration,
                        offset,
                        "'in' must come before all other statements",
                    );
                }
                self.header = Header::InVars;
                if self.in_vars.iter().any(|v| v.name == *name) {
                    return error_at(
                        DiagnosticCode::DuplicateInVar,
                        offset,
                        format!("Input variable '{}' is already declared", name),
                    );
                }
                let ty = match type_name {
                    Some(t) => self.resolve_type(t, offset)?,
                    None => ScriptType::Dynamic,
                };
                *declared = ty;
                self.ctx.set(name, ty);
                let sym = self.symbols.record(name, offset);
                sym.is_in_var = true;
                sym.may_hold_ref |= ty.may_be_ref();
                self.in_vars.push(InVarDecl {
                    name: name.clone(),
                    ty,
                });
                Ok(())
            }
            _ => {
                self.header = Header::Body;
                self.stmt(stmt)
            }
        }
    }

    fn resolve_type(&self, name: &str, offset: usize) -> Result<ScriptType> {
        let found = self.registry.resolve_type(&self.usings, name);
        match found.as_slice() {
            [ty] => Ok(*ty),
            [] => error_at(
                DiagnosticCode::InvalidType,
                offset,
                format!("Unknown type '{}'", name),
            ),
            _ => error_at(
                DiagnosticCode::AmbiguousMatch,
                offset,
                format!("Type '{}' matches more than one registered type", name),
            ),
        }
    }

    fn write(&mut self, name: &str, ty: ScriptType, offset: usize) {
        self.ctx.set(name, ty);
        let sym = self.symbols.record(name, offset);
        sym.may_hold_ref |= ty.may_be_ref();
        for writes in &mut self.loop_writes {
            writes.push((name.to_string(), ty));
        }
    }

    fn block(&mut self, body: &mut [Stmt]) -> Result<()> {
        for s in body {
            self.stmt(s)?;
        }
        Ok(())
    }

    fn stmt(&mut self, stmt: &mut Stmt) -> Result<()> {
        let offset = stmt.offset;
        match &mut stmt.kind {
            StmtKind::Using { .. } | StmtKind::In { .. } => error_at(
                DiagnosticCode::MisplacedDeclaration,
                offset,
                "'using' and 'in' are only allowed at the start of a script",
            ),
            StmtKind::VarDecl { name, value } => {
                self.expr(value)?;
                if value.ty == ScriptType::Void {
                    return error_at(
                        DiagnosticCode::InvalidType,
                        value.offset,
                        format!("Cannot assign an expression without a value to '{}'", name),
                    );
                }
                let ty = value.ty;
                let name = name.clone();
                self.write(&name, ty, offset);
                Ok(())
            }
            StmtKind::VarAssign {
                name,
                op,
                value,
                current,
                result,
            } => {
                let Some(cur) = self.ctx.lookup(name) else {
                    return error_at(
                        DiagnosticCode::UseBeforeDeclaration,
                        offset,
                        format!("'{}' is used before it is declared", name),
                    );
                };
                let rhs = match value {
                    Some(v) => {
                        self.expr(v)?;
                        v.ty
                    }
                    None => ScriptType::Long,
                };
                let Some(res) = binary_result(op.binary(), cur, rhs) else {
                    return error_at(
                        DiagnosticCode::InvalidOperands,
                        offset,
                        format!(
                            "Operator '{}' cannot be applied to {} and {}",
                            op.binary().symbol(),
                            cur,
                            rhs
                        ),
                    );
                };
                *current = cur;
                *result = res;
                let name = name.clone();
                self.write(&name, res, offset);
                Ok(())
            }
            StmtKind::If {
                branches,
                else_body,
            } => {
                for branch in branches.iter_mut() {
                    self.condition(&mut branch.cond)?;
                    self.ctx.push(FrameKind::Condition);
                    self.block(&mut branch.body)?;
                    self.ctx.pop();
                }
                if let Some(body) = else_body {
                    self.ctx.push(FrameKind::Condition);
                    self.block(body)?;
                    self.ctx.pop();
                }
                Ok(())
            }
            StmtKind::While { cond, body } => self.analyze_loop(LoopBody::While { cond, body }),
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                self.stmt(init)?;
                self.analyze_loop(LoopBody::For { cond, step, body })
            }
            StmtKind::Foreach {
                item,
                iterable,
                body,
                iteration,
            } => {
                self.expr(iterable)?;
                let (binding, item_ty) = self.iteration_of(iterable)?;
                *iteration = binding;
                self.analyze_loop(LoopBody::Foreach {
                    item: item.as_str(),
                    item_ty,
                    offset,
                    body,
                })
            }
            StmtKind::Loop { count, body } => {
                self.expr(count)?;
                if !matches!(count.ty, ScriptType::Long | ScriptType::Double | ScriptType::Dynamic) {
                    return error_at(
                        DiagnosticCode::InvalidType,
                        count.offset,
                        format!("Loop count must be a number, found {}", count.ty),
                    );
                }
                self.analyze_loop(LoopBody::Counted { body })
            }
            StmtKind::Break => {
                if !self.ctx.in_loop() {
                    return error_at(
                        DiagnosticCode::BreakOutsideLoop,
                        offset,
                        "'break' can only be used inside a loop",
                    );
                }
                Ok(())
            }
            StmtKind::Continue => {
                if !self.ctx.in_loop() {
                    return error_at(
                        DiagnosticCode::ContinueOutsideLoop,
                        offset,
                        "'continue' can only be used inside a loop",
                    );
                }
                Ok(())
            }
            StmtKind::Return(value) => {
                if let Some(v) = value {
                    self.expr(v)?;
                    if v.ty == ScriptType::Void {
                        return error_at(
                            DiagnosticCode::InvalidType,
                            v.offset,
                            "Cannot return an expression without a value",
                        );
                    }
                }
                Ok(())
            }
            StmtKind::Exit => Ok(()),
            StmtKind::Function { name, .. } => error_at(
                DiagnosticCode::FunctionsNotSupported,
                offset,
                format!("Function declarations are not supported ('{}')", name),
            ),
            StmtKind::Member { target, assign } => self.member_stmt(target, assign.as_mut(), offset),
        }
    }

    fn condition(&mut self, cond: &mut Expr) -> Result<()> {
        self.expr(cond)?;
        if !matches!(cond.ty, ScriptType::Bool | ScriptType::Dynamic) {
            return error_at(
                DiagnosticCode::InvalidType,
                cond.offset,
                format!("Condition must be a bool, found {}", cond.ty),
            );
        }
        Ok(())
    }

    fn iteration_of(&self, iterable: &Expr) -> Result<(IterationBinding, ScriptType)> {
        match iterable.ty {
            ScriptType::Dynamic => Ok((IterationBinding::Dynamic, ScriptType::Dynamic)),
            ScriptType::Object(id) => {
                let iteration = self.registry.type_def(id).and_then(|t| t.iteration);
                match iteration {
                    Some(it) => {
                        let item_ty = self
                            .registry
                            .method(it.get_item)
                            .map_or(ScriptType::Dynamic, |m| m.returns);
                        Ok((
                            IterationBinding::Static {
                                count: it.count,
                                get_item: it.get_item,
                            },
                            item_ty,
                        ))
                    }
                    None => error_at(
                        DiagnosticCode::NotIterable,
                        iterable.offset,
                        format!("{} cannot be used in 'foreach'", self.registry.type_name(iterable.ty)),
                    ),
                }
            }
            other => error_at(
                DiagnosticCode::NotIterable,
                iterable.offset,
                format!("{} cannot be used in 'foreach'", other),
            ),
        }
    }

    fn loop_pass(&mut self, body: &mut LoopBody<'_>, seeded: &[String]) -> Result<()> {
        for name in seeded {
            self.ctx.set(name, ScriptType::Dynamic);
        }
        match body {
            LoopBody::While { cond, body } => {
                self.condition(cond)?;
                self.block(body)
            }
            LoopBody::For { cond, step, body } => {
                self.condition(cond)?;
                self.block(body)?;
                self.stmt(step)
            }
            LoopBody::Foreach {
                item,
                item_ty,
                offset,
                body,
            } => {
                let (item, item_ty) = (item.to_string(), *item_ty);
                self.write(&item, item_ty, *offset);
                self.block(body)
            }
            LoopBody::Counted { body } => self.block(body),
        }
    }

    /// Analyse a loop, re-running the body with widened bindings when a
    /// variable visible before the loop changes type inside it. The header
    /// and body see the widened type; code after the loop sees the type the
    /// body last assigned.
    fn analyze_loop(&mut self, mut body: LoopBody<'_>) -> Result<()> {
        let before = self.ctx.clone();
        self.loop_writes.push(Vec::new());
        self.ctx.push(FrameKind::Loop);
        let first = self.loop_pass(&mut body, &[]);
        let writes = self.loop_writes.pop().unwrap_or_default();
        first?;

        let mut seen = HashSet::new();
        let changed: Vec<String> = writes
            .into_iter()
            .filter(|(name, ty)| matches!(before.lookup(name), Some(outer) if outer != *ty))
            .filter_map(|(name, _)| seen.insert(name.clone()).then_some(name))
            .collect();

        if !changed.is_empty() {
            debug!(?changed, "loop-carried variables widened to dynamic");
            self.ctx = before;
            self.loop_writes.push(Vec::new());
            self.ctx.push(FrameKind::Loop);
            let second = self.loop_pass(&mut body, &changed);
            self.loop_writes.pop();
            second?;
        }

        // Leaving the loop frame overwrites the outer bindings with the body's.
        self.ctx.pop();
        Ok(())
    }

    fn member_stmt(&mut self, target: &mut Expr, assign: Option<&mut Expr>, offset: usize) -> Result<()> {
        if let ExprKind::Identifier(name) = &target.kind {
            if self.ctx.lookup(name).is_some() {
                let msg = if assign.is_some() {
                    format!("Use 'var [{}] = ...' to assign a variable", name)
                } else {
                    format!("Variable '{}' cannot be used as a statement", name)
                };
                let code = if assign.is_some() {
                    DiagnosticCode::NotAssignable
                } else {
                    DiagnosticCode::InvalidStatement
                };
                return error_at(code, offset, msg);
            }
        }
        let Some(value) = assign else {
            return self.expr(target);
        };
        self.expr(value)?;
        if let ExprKind::Identifier(name) = &target.kind {
            let member = MemberExpr {
                target: None,
                name: name.clone(),
                args: None,
                binding: MemberBinding::Unresolved,
            };
            target.kind = ExprKind::Member(member);
        }
        let ExprKind::Member(m) = &mut target.kind else {
            return error_at(DiagnosticCode::NotAssignable, offset, "Only properties can be assigned");
        };
        if let Some(t) = m.target.as_deref_mut() {
            self.expr(t)?;
        }
        let ty = self.resolve_member(m, target.offset, true)?;
        target.ty = ty;
        match &m.binding {
            MemberBinding::Dynamic => Ok(()),
            MemberBinding::Property(id) => {
                let prop = self.registry.property(*id).filter(|p| p.setter.is_some());
                let Some(prop) = prop else {
                    return error_at(
                        DiagnosticCode::NotAssignable,
                        target.offset,
                        format!("Property '{}' is read-only", m.name),
                    );
                };
                if !prop.ty.accepts(value.ty) {
                    return error_at(
                        DiagnosticCode::InvalidType,
                        value.offset,
                        format!(
                            "Cannot assign {} to property '{}' of type {}",
                            value.ty,
                            m.name,
                            self.registry.type_name(prop.ty)
                        ),
                    );
                }
                Ok(())
            }
            _ => error_at(
                DiagnosticCode::NotAssignable,
                target.offset,
                format!("'{}' is not an assignable property", m.name),
            ),
        }
    }

    fn static_matches(&self, name: &str) -> Vec<StaticMatch<'r>> {
        let registry = self.registry;
        let (prefix, short) = split_qualified(name);
        let namespaces: Vec<&str> = match prefix {
            Some(ns) => vec![ns],
            None => self.usings.iter().map(String::as_str).collect(),
        };
        let mut found = Vec::new();
        for ns in &namespaces {
            found.extend(registry.static_methods(ns, short).into_iter().map(StaticMatch::Method));
        }
        for ns in &namespaces {
            found.extend(
                registry
                    .static_properties(ns, short)
                    .into_iter()
                    .map(StaticMatch::Property),
            );
        }
        for ns in &namespaces {
            found.extend(registry.consts(ns, short).into_iter().map(StaticMatch::Const));
        }
        found
    }

    fn check_args(&self, name: &str, params: &[ScriptType], args: &[Expr], offset: usize) -> Result<()> {
        if params.len() != args.len() {
            return error_at(
                DiagnosticCode::ArgumentCount,
                offset,
                format!(
                    "'{}' expects {} argument(s), found {}",
                    name,
                    params.len(),
                    args.len()
                ),
            );
        }
        for (i, (param, arg)) in params.iter().zip(args).enumerate() {
            if !param.accepts(arg.ty) {
                return error_at(
                    DiagnosticCode::ArgumentType,
                    arg.offset,
                    format!(
                        "Argument {} of '{}' must be {}, found {}",
                        i + 1,
                        name,
                        self.registry.type_name(*param),
                        arg.ty
                    ),
                );
            }
        }
        Ok(())
    }

    /// Resolve a member whose target (if any) and arguments are already
    /// analysed. Returns the member's result type.
    fn resolve_member(&self, m: &mut MemberExpr, offset: usize, for_assign: bool) -> Result<ScriptType> {
        let no_args: [Expr; 0] = [];
        let args: &[Expr] = m.args.as_deref().unwrap_or(&no_args);
        let has_args = m.args.is_some();

        let (methods, properties, consts): (Vec<&MethodDef>, Vec<&PropertyDef>, Vec<&ConstDef>) =
            match m.target.as_deref() {
                None => {
                    let mut ms = Vec::new();
                    let mut ps = Vec::new();
                    let mut cs = Vec::new();
                    for found in self.static_matches(&m.name) {
                        match found {
                            StaticMatch::Method(x) => ms.push(x),
                            StaticMatch::Property(x) => ps.push(x),
                            StaticMatch::Const(x) => cs.push(x),
                        }
                    }
                    (ms, ps, cs)
                }
                Some(t) => match t.ty {
                    ScriptType::Dynamic => {
                        m.binding = MemberBinding::Dynamic;
                        return Ok(ScriptType::Dynamic);
                    }
                    ScriptType::Object(id) => (
                        self.registry.instance_methods(id, &m.name),
                        self.registry.instance_properties(id, &m.name),
                        Vec::new(),
                    ),
                    other => {
                        return error_at(
                            DiagnosticCode::InvalidMember,
                            offset,
                            format!("Values of type {} have no member '{}'", other, m.name),
                        )
                    }
                },
            };

        match methods.len() + properties.len() + consts.len() {
            0 => {
                let owner = match m.target.as_deref() {
                    Some(t) => format!(" on {}", self.registry.type_name(t.ty)),
                    None => String::new(),
                };
                return error_at(
                    DiagnosticCode::InvalidMember,
                    offset,
                    format!("Unknown member '{}'{}", m.name, owner),
                );
            }
            1 => {}
            _ => {
                return error_at(
                    DiagnosticCode::AmbiguousMatch,
                    offset,
                    format!("'{}' matches more than one member", m.name),
                )
            }
        }

        if let Some(method) = methods.first() {
            self.check_args(&m.name, &method.params, args, offset)?;
            m.binding = MemberBinding::Method(method.id);
            return Ok(method.returns);
        }
        if has_args {
            return error_at(
                DiagnosticCode::ArgumentCount,
                offset,
                format!("'{}' is not a method and takes no arguments", m.name),
            );
        }
        if let Some(prop) = properties.first() {
            if !for_assign && prop.getter.is_none() {
                return error_at(
                    DiagnosticCode::InvalidMember,
                    offset,
                    format!("Property '{}' cannot be read", m.name),
                );
            }
            m.binding = MemberBinding::Property(prop.id);
            return Ok(prop.ty);
        }
        match consts.first() {
            Some(c) => {
                m.binding = MemberBinding::Const(c.value.clone());
                Ok(c.value.script_type())
            }
            None => error_at(
                DiagnosticCode::InvalidMember,
                offset,
                format!("Unknown member '{}'", m.name),
            ),
        }
    }

    fn expr(&mut self, expr: &mut Expr) -> Result<()> {
        let offset = expr.offset;
        let ty = match &mut expr.kind {
            ExprKind::Literal(lit) => lit.script_type(),
            ExprKind::Identifier(name) => match self.ctx.lookup(name) {
                Some(ty) => {
                    self.symbols.record(name, offset);
                    ty
                }
                None => {
                    let mut member = MemberExpr {
                        target: None,
                        name: name.clone(),
                        args: None,
                        binding: MemberBinding::Unresolved,
                    };
                    if self.static_matches(name).is_empty() {
                        return error_at(
                            DiagnosticCode::UseBeforeDeclaration,
                            offset,
                            format!("'{}' is used before it is declared", name),
                        );
                    }
                    let ty = self.resolve_member(&mut member, offset, false)?;
                    expr.kind = ExprKind::Member(member);
                    ty
                }
            },
            ExprKind::Member(m) => {
                if let Some(t) = m.target.as_deref_mut() {
                    self.expr(t)?;
                }
                if let Some(args) = m.args.as_mut() {
                    for a in args.iter_mut() {
                        self.expr(a)?;
                    }
                }
                self.resolve_member(m, offset, false)?
            }
            ExprKind::Constructor {
                type_name,
                args,
                binding,
            } => {
                for a in args.iter_mut() {
                    self.expr(a)?;
                }
                let ty = self.resolve_type(type_name, offset)?;
                let ScriptType::Object(id) = ty else {
                    return error_at(
                        DiagnosticCode::InvalidType,
                        offset,
                        format!("'{}' is not a host type and cannot be constructed", type_name),
                    );
                };
                let counted: Vec<_> = self
                    .registry
                    .constructors_of(id)
                    .into_iter()
                    .filter(|c| c.params.len() == args.len())
                    .collect();
                if counted.is_empty() {
                    return error_at(
                        DiagnosticCode::ArgumentCount,
                        offset,
                        format!("'{}' has no constructor taking {} argument(s)", type_name, args.len()),
                    );
                }
                let fitting: Vec<_> = counted
                    .into_iter()
                    .filter(|c| c.params.iter().zip(args.iter()).all(|(p, a)| p.accepts(a.ty)))
                    .collect();
                match fitting.as_slice() {
                    [c] => *binding = Some(c.id),
                    [] => {
                        return error_at(
                            DiagnosticCode::ArgumentType,
                            offset,
                            format!("No constructor of '{}' accepts these arguments", type_name),
                        )
                    }
                    _ => {
                        return error_at(
                            DiagnosticCode::AmbiguousMatch,
                            offset,
                            format!("More than one constructor of '{}' matches", type_name),
                        )
                    }
                }
                ty
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.expr(lhs)?;
                self.expr(rhs)?;
                match binary_result(*op, lhs.ty, rhs.ty) {
                    Some(t) => t,
                    None => {
                        return error_at(
                            DiagnosticCode::InvalidOperands,
                            offset,
                            format!(
                                "Operator '{}' cannot be applied to {} and {}",
                                op.symbol(),
                                lhs.ty,
                                rhs.ty
                            ),
                        )
                    }
                }
            }
            ExprKind::Unary { op, operand } => {
                self.expr(operand)?;
                match unary_result(*op, operand.ty) {
                    Some(t) => t,
                    None => {
                        let sym = if *op == UnaryOp::Neg { "-" } else { "!" };
                        return error_at(
                            DiagnosticCode::InvalidOperands,
                            offset,
                            format!("Operator '{}' cannot be applied to {}", sym, operand.ty),
                        );
                    }
                }
            }
            ExprKind::Cast { type_name, .. } => {
                return error_at(
                    DiagnosticCode::CastNotSupported,
                    offset,
                    format!("Casts are not supported ('<{}>')", type_name),
                )
            }
        };
        expr.ty = ty;
        Ok(())
    }
}
