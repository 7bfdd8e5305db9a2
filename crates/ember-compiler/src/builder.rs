//! Script builder and local slot management for codegen.

use std::collections::HashMap;

use ember_analyzer::Analysis;
use ember_bytecode::instruction::{encode_peek, encode_type};
use ember_bytecode::{BytecodeWriter, Label, OpCode, StringPool};
use ember_host::HostTypeRegistry;
use ember_syntax::ast::*;
use ember_syntax::error::{error_at, DiagnosticCode, Result};
use ember_syntax::types::ScriptType;

/// Names of the iteration protocol members used when the iterable's type is
/// only known at runtime.
const DYNAMIC_COUNT: &str = "count";
const DYNAMIC_GET_ITEM: &str = "getitem";

pub(crate) struct ScriptBuilder<'a> {
    registry: &'a HostTypeRegistry,
    analysis: &'a Analysis,
    optimization_level: u8,
    code: BytecodeWriter,
    strings: StringPool,
    locals: Locals,
    loop_stack: Vec<LoopCtx>,
    depth: usize,
    max_depth: usize,
    hidden: usize,
}

/// Finished pieces of a compiled script.
pub(crate) struct BuiltScript {
    pub bytecode: Vec<u8>,
    pub strings: Vec<String>,
    pub locals_count: usize,
    pub max_stack_hint: usize,
    pub slots: HashMap<String, u8>,
}

impl<'a> ScriptBuilder<'a> {
    pub(crate) fn new(registry: &'a HostTypeRegistry, analysis: &'a Analysis, optimization_level: u8) -> Self {
        Self {
            registry,
            analysis,
            optimization_level,
            code: BytecodeWriter::new(),
            strings: StringPool::new(),
            locals: Locals::default(),
            loop_stack: Vec::new(),
            depth: 0,
            max_depth: 0,
            hidden: 0,
        }
    }

    pub(crate) fn build(mut self, script: &Script) -> Result<BuiltScript> {
        // In-vars take the first slots, in declaration order.
        for v in &self.analysis.in_vars {
            self.locals.slot(&v.name, 0)?;
        }
        for stmt in &script.statements {
            self.emit_stmt(stmt)?;
        }
        self.code.emit(OpCode::Exit);
        Ok(BuiltScript {
            bytecode: self.code.finish()?,
            strings: self.strings.into_strings(),
            locals_count: self.locals.slots.len(),
            max_stack_hint: self.max_depth,
            slots: self.locals.slots,
        })
    }

    fn push(&mut self, n: usize) {
        self.depth += n;
        self.max_depth = self.max_depth.max(self.depth);
    }

    fn pop(&mut self, n: usize) {
        self.depth = self.depth.saturating_sub(n);
    }

    fn hidden_local(&mut self, what: &str, offset: usize) -> Result<u8> {
        // `$` never lexes as part of an identifier, so hidden names cannot
        // collide with script variables.
        self.hidden += 1;
        let name = format!("${}{}", what, self.hidden);
        self.locals.slot(&name, offset)
    }

    fn holds_ref(&self, name: &str) -> bool {
        self.analysis.symbols.may_hold_ref(name)
    }

    fn load_var(&mut self, name: &str, offset: usize) -> Result<()> {
        let slot = self.locals.slot(name, offset)?;
        let op = if self.holds_ref(name) { OpCode::LoadLoc } else { OpCode::LoadLocNoRef };
        self.code.emit_u8(op, slot);
        self.push(1);
        Ok(())
    }

    fn store_var(&mut self, name: &str, offset: usize) -> Result<()> {
        let slot = self.locals.slot(name, offset)?;
        let op = if self.holds_ref(name) { OpCode::SetLoc } else { OpCode::SetLocNoRef };
        self.code.emit_u8(op, slot);
        self.pop(1);
        Ok(())
    }

    fn load_hidden(&mut self, slot: u8, holds_ref: bool) {
        let op = if holds_ref { OpCode::LoadLoc } else { OpCode::LoadLocNoRef };
        self.code.emit_u8(op, slot);
        self.push(1);
    }

    fn store_hidden(&mut self, slot: u8, holds_ref: bool) {
        let op = if holds_ref { OpCode::SetLoc } else { OpCode::SetLocNoRef };
        self.code.emit_u8(op, slot);
        self.pop(1);
    }

    fn type_operand(&self, ty: ScriptType, offset: usize) -> Result<i32> {
        match encode_type(ty) {
            Some(code) => Ok(code),
            None => error_at(
                DiagnosticCode::UnsupportedConstruct,
                offset,
                format!("Type {} cannot be checked at runtime", self.registry.type_name(ty)),
            ),
        }
    }

    /// Guard the value on top of the stack when it is only known at runtime.
    fn check_top(&mut self, expected: ScriptType, actual: ScriptType, offset: usize) -> Result<()> {
        if expected != ScriptType::Dynamic && actual == ScriptType::Dynamic {
            let code = self.type_operand(expected, offset)?;
            self.code.emit_i32(OpCode::CheckType, code);
        }
        Ok(())
    }

    fn emit_jump(&mut self, op: OpCode, label: Label) {
        self.code.emit_jump(op, label);
        if op != OpCode::Jump {
            self.pop(1);
        }
    }

    fn emit_body(&mut self, body: &[Stmt]) -> Result<()> {
        for s in body {
            self.emit_stmt(s)?;
        }
        Ok(())
    }

    fn emit_stmt(&mut self, s: &Stmt) -> Result<()> {
        match &s.kind {
            StmtKind::Using { .. } | StmtKind::In { .. } => Ok(()),
            StmtKind::VarDecl { name, value } => {
                self.emit_expr(value)?;
                self.store_var(name, s.offset)
            }
            StmtKind::VarAssign {
                name,
                op,
                value,
                current,
                ..
            } => {
                self.load_var(name, s.offset)?;
                let rhs = match value {
                    Some(v) => {
                        self.emit_expr(v)?;
                        v.ty
                    }
                    None => {
                        self.code.emit_long(1);
                        self.push(1);
                        ScriptType::Long
                    }
                };
                self.emit_binary_op(op.binary(), *current, rhs);
                self.store_var(name, s.offset)
            }
            StmtKind::If { branches, else_body } => {
                let end = self.code.new_label();
                for branch in branches {
                    let next = self.code.new_label();
                    self.emit_expr(&branch.cond)?;
                    self.emit_jump(OpCode::JumpIfFalse, next);
                    self.emit_body(&branch.body)?;
                    self.emit_jump(OpCode::Jump, end);
                    self.code.mark(next);
                }
                if let Some(body) = else_body {
                    self.emit_body(body)?;
                }
                self.code.mark(end);
                Ok(())
            }
            StmtKind::While { cond, body } => {
                let top = self.code.new_label();
                let end = self.code.new_label();
                self.code.mark(top);
                self.emit_expr(cond)?;
                self.emit_jump(OpCode::JumpIfFalse, end);
                self.loop_stack.push(LoopCtx::new(end, top));
                self.emit_body(body)?;
                self.loop_stack.pop();
                self.emit_jump(OpCode::Jump, top);
                self.code.mark(end);
                Ok(())
            }
            StmtKind::For { init, cond, step, body } => {
                self.emit_stmt(init)?;
                let top = self.code.new_label();
                let next = self.code.new_label();
                let end = self.code.new_label();
                self.code.mark(top);
                self.emit_expr(cond)?;
                self.emit_jump(OpCode::JumpIfFalse, end);
                self.loop_stack.push(LoopCtx::new(end, next));
                self.emit_body(body)?;
                self.loop_stack.pop();
                self.code.mark(next);
                self.emit_stmt(step)?;
                self.emit_jump(OpCode::Jump, top);
                self.code.mark(end);
                Ok(())
            }
            StmtKind::Foreach {
                item,
                iterable,
                body,
                iteration,
            } => self.emit_foreach(item, iterable, body, iteration, s.offset),
            StmtKind::Loop { count, body } => self.emit_counted_loop(count, body, s.offset),
            StmtKind::Break => {
                let Some(ctx) = self.loop_stack.last() else {
                    return error_at(DiagnosticCode::UnsupportedConstruct, s.offset, "'break' outside of loop");
                };
                let label = ctx.break_label;
                self.emit_jump(OpCode::Jump, label);
                Ok(())
            }
            StmtKind::Continue => {
                let Some(ctx) = self.loop_stack.last() else {
                    return error_at(DiagnosticCode::UnsupportedConstruct, s.offset, "'continue' outside of loop");
                };
                let label = ctx.continue_label;
                self.emit_jump(OpCode::Jump, label);
                Ok(())
            }
            StmtKind::Return(value) => {
                match value {
                    Some(v) => self.emit_expr(v)?,
                    None => {
                        self.code.emit(OpCode::PushNull);
                        self.push(1);
                    }
                }
                self.code.emit(OpCode::Return);
                self.pop(1);
                Ok(())
            }
            StmtKind::Exit => {
                self.code.emit(OpCode::Exit);
                Ok(())
            }
            StmtKind::Function { name, .. } => error_at(
                DiagnosticCode::UnsupportedConstruct,
                s.offset,
                format!("Function '{}' cannot be compiled", name),
            ),
            StmtKind::Member { target, assign: None } => {
                self.emit_expr(target)?;
                self.code.emit(OpCode::Pop);
                self.pop(1);
                Ok(())
            }
            StmtKind::Member {
                target,
                assign: Some(value),
            } => self.emit_property_set(target, value),
        }
    }

    fn emit_property_set(&mut self, target: &Expr, value: &Expr) -> Result<()> {
        let ExprKind::Member(m) = &target.kind else {
            return error_at(DiagnosticCode::UnsupportedConstruct, target.offset, "Only properties can be assigned");
        };
        if let Some(t) = m.target.as_deref() {
            self.emit_expr(t)?;
        }
        self.emit_expr(value)?;
        match &m.binding {
            MemberBinding::Property(id) => {
                let ty = self.registry.property(*id).map_or(ScriptType::Dynamic, |p| p.ty);
                self.check_top(ty, value.ty, value.offset)?;
                let op = if m.target.is_some() { OpCode::SetProperty } else { OpCode::SetStaticProperty };
                self.code.emit_i32(op, id.0 as i32);
            }
            MemberBinding::Dynamic => {
                let name = self.strings.intern(&m.name)?;
                self.code.emit_u16(OpCode::SetDynamicProperty, name);
            }
            _ => {
                return error_at(
                    DiagnosticCode::UnsupportedConstruct,
                    target.offset,
                    format!("'{}' is not an assignable property", m.name),
                )
            }
        }
        self.pop(if m.target.is_some() { 2 } else { 1 });
        Ok(())
    }

    fn emit_foreach(
        &mut self,
        item: &str,
        iterable: &Expr,
        body: &[Stmt],
        iteration: &IterationBinding,
        offset: usize,
    ) -> Result<()> {
        let source = self.hidden_local("iter", offset)?;
        let count = self.hidden_local("count", offset)?;
        let index = self.hidden_local("index", offset)?;

        self.emit_expr(iterable)?;
        self.store_hidden(source, true);
        self.load_hidden(source, true);
        match iteration {
            IterationBinding::Static { count: prop, .. } => {
                self.code.emit_i32(OpCode::GetProperty, prop.0 as i32);
            }
            IterationBinding::Dynamic => {
                let name = self.strings.intern(DYNAMIC_COUNT)?;
                self.code.emit_u16(OpCode::GetDynamicProperty, name);
                let code = self.type_operand(ScriptType::Double, offset)?;
                self.code.emit_i32(OpCode::CheckType, code);
            }
            IterationBinding::Unresolved => {
                return error_at(DiagnosticCode::UnsupportedConstruct, offset, "unresolved 'foreach' target")
            }
        }
        self.store_hidden(count, false);
        self.code.emit_long(0);
        self.push(1);
        self.store_hidden(index, false);

        let top = self.code.new_label();
        let next = self.code.new_label();
        let end = self.code.new_label();
        self.code.mark(top);
        self.load_hidden(index, false);
        self.load_hidden(count, false);
        self.code.emit(OpCode::LessNum);
        self.pop(1);
        self.emit_jump(OpCode::JumpIfFalse, end);

        self.load_hidden(source, true);
        self.load_hidden(index, false);
        match iteration {
            IterationBinding::Static { get_item, .. } => {
                self.code.emit_i32(OpCode::Invoke, get_item.0 as i32);
            }
            _ => {
                let name = self.strings.intern(DYNAMIC_GET_ITEM)?;
                self.code.emit_u16_pair(OpCode::InvokeDynamic, name, 1);
            }
        }
        self.pop(1);
        self.store_var(item, offset)?;

        self.loop_stack.push(LoopCtx::new(end, next));
        self.emit_body(body)?;
        self.loop_stack.pop();

        self.code.mark(next);
        self.load_hidden(index, false);
        self.code.emit_long(1);
        self.push(1);
        self.code.emit(OpCode::AddNum);
        self.pop(1);
        self.store_hidden(index, false);
        self.emit_jump(OpCode::Jump, top);
        self.code.mark(end);

        // Drop the iterable's reference as soon as the loop is done.
        self.code.emit(OpCode::PushNull);
        self.push(1);
        self.store_hidden(source, true);
        Ok(())
    }

    fn emit_counted_loop(&mut self, count: &Expr, body: &[Stmt], offset: usize) -> Result<()> {
        if self.optimization_level >= 1 && !escapes(body) {
            let literal = match count.literal() {
                Some(Literal::Long(n)) => i32::try_from((*n).max(0)).ok(),
                Some(Literal::Double(d)) => {
                    let n = d.ceil().max(0.0);
                    (n <= i32::MAX as f64).then_some(n as i32)
                }
                _ => None,
            };
            let at = match literal {
                Some(n) => self.code.emit_i32_pair(OpCode::Loop, n, 0) + 4,
                None => {
                    self.emit_expr(count)?;
                    self.check_top(ScriptType::Double, count.ty, count.offset)?;
                    self.pop(1);
                    self.code.emit_i32(OpCode::LoopNum, 0)
                }
            };
            let start = self.code.position();
            self.emit_body(body)?;
            let len = self.code.position() - start;
            let Ok(len) = i32::try_from(len) else {
                return error_at(DiagnosticCode::JumpOutOfRange, offset, "loop body is too large");
            };
            self.code.patch_i32(at, len);
            return Ok(());
        }

        let limit = self.hidden_local("limit", offset)?;
        let index = self.hidden_local("index", offset)?;
        self.emit_expr(count)?;
        self.check_top(ScriptType::Double, count.ty, count.offset)?;
        self.store_hidden(limit, false);
        self.code.emit_long(0);
        self.push(1);
        self.store_hidden(index, false);

        let top = self.code.new_label();
        let next = self.code.new_label();
        let end = self.code.new_label();
        self.code.mark(top);
        self.load_hidden(index, false);
        self.load_hidden(limit, false);
        self.code.emit(OpCode::LessNum);
        self.pop(1);
        self.emit_jump(OpCode::JumpIfFalse, end);

        self.loop_stack.push(LoopCtx::new(end, next));
        self.emit_body(body)?;
        self.loop_stack.pop();

        self.code.mark(next);
        self.load_hidden(index, false);
        self.code.emit_long(1);
        self.push(1);
        self.code.emit(OpCode::AddNum);
        self.pop(1);
        self.store_hidden(index, false);
        self.emit_jump(OpCode::Jump, top);
        self.code.mark(end);
        Ok(())
    }

    fn emit_literal(&mut self, lit: &Literal) -> Result<()> {
        match lit {
            Literal::Null => {
                self.code.emit(OpCode::PushNull);
            }
            Literal::Bool(true) => {
                self.code.emit(OpCode::PushTrue);
            }
            Literal::Bool(false) => {
                self.code.emit(OpCode::PushFalse);
            }
            Literal::Long(n) => self.code.emit_long(*n),
            Literal::Double(d) => self.code.emit_double(*d),
            Literal::String(s) => {
                let index = self.strings.intern(s)?;
                self.code.emit_u16(OpCode::PushString, index);
            }
        }
        self.push(1);
        Ok(())
    }

    fn emit_binary_op(&mut self, op: BinaryOp, lhs: ScriptType, rhs: ScriptType) {
        let numeric = lhs.is_numeric() && rhs.is_numeric();
        let code = match (op, numeric) {
            (BinaryOp::Add, true) => OpCode::AddNum,
            (BinaryOp::Add, false) => OpCode::Add,
            (BinaryOp::Sub, true) => OpCode::SubNum,
            (BinaryOp::Sub, false) => OpCode::Sub,
            (BinaryOp::Mul, true) => OpCode::MulNum,
            (BinaryOp::Mul, false) => OpCode::Mul,
            (BinaryOp::Div, true) => OpCode::DivNum,
            (BinaryOp::Div, false) => OpCode::Div,
            (BinaryOp::Mod, true) => OpCode::ModNum,
            (BinaryOp::Mod, false) => OpCode::Mod,
            (BinaryOp::Lt, true) => OpCode::LessNum,
            (BinaryOp::Lt, false) => OpCode::Less,
            (BinaryOp::Le, true) => OpCode::LessEqNum,
            (BinaryOp::Le, false) => OpCode::LessEq,
            (BinaryOp::Gt, true) => OpCode::GreaterNum,
            (BinaryOp::Gt, false) => OpCode::Greater,
            (BinaryOp::Ge, true) => OpCode::GreaterEqNum,
            (BinaryOp::Ge, false) => OpCode::GreaterEq,
            (BinaryOp::Eq, true) => OpCode::EqualsNum,
            (BinaryOp::Eq, false) => OpCode::Equals,
            (BinaryOp::Ne, true) => OpCode::NotEqualsNum,
            (BinaryOp::Ne, false) => OpCode::NotEquals,
            // Lowered with jumps before reaching here.
            (BinaryOp::And | BinaryOp::Or, _) => OpCode::Nop,
        };
        self.code.emit(code);
        self.pop(1);
    }

    /// Push the arguments of a call and guard runtime-typed ones against
    /// the declared parameter types.
    fn emit_args(&mut self, params: &[ScriptType], args: &[Expr]) -> Result<()> {
        for a in args {
            self.emit_expr(a)?;
        }
        let argc = args.len();
        for (i, (param, arg)) in params.iter().zip(args).enumerate() {
            if *param != ScriptType::Dynamic && arg.ty == ScriptType::Dynamic {
                let depth = u8::try_from(argc - 1 - i).unwrap_or(u8::MAX);
                let Some(code) = encode_peek(*param, depth) else {
                    return error_at(
                        DiagnosticCode::UnsupportedConstruct,
                        arg.offset,
                        format!("Type {} cannot be checked at runtime", self.registry.type_name(*param)),
                    );
                };
                self.code.emit_i32(OpCode::PeekCheckType, code);
            }
        }
        Ok(())
    }

    fn emit_member(&mut self, m: &MemberExpr, offset: usize) -> Result<()> {
        let no_args: [Expr; 0] = [];
        let args: &[Expr] = m.args.as_deref().unwrap_or(&no_args);
        match &m.binding {
            MemberBinding::Const(lit) => self.emit_literal(lit),
            MemberBinding::Method(id) => {
                let params = self.registry.method(*id).map(|d| d.params.clone()).unwrap_or_default();
                if let Some(t) = m.target.as_deref() {
                    self.emit_expr(t)?;
                }
                self.emit_args(&params, args)?;
                let op = if m.target.is_some() { OpCode::Invoke } else { OpCode::InvokeStatic };
                self.code.emit_i32(op, id.0 as i32);
                self.pop(args.len() + usize::from(m.target.is_some()));
                self.push(1);
                Ok(())
            }
            MemberBinding::Property(id) => {
                match m.target.as_deref() {
                    Some(t) => {
                        self.emit_expr(t)?;
                        self.code.emit_i32(OpCode::GetProperty, id.0 as i32);
                        self.pop(1);
                    }
                    None => {
                        self.code.emit_i32(OpCode::GetStaticProperty, id.0 as i32);
                    }
                }
                self.push(1);
                Ok(())
            }
            MemberBinding::Dynamic => {
                let Some(t) = m.target.as_deref() else {
                    return error_at(DiagnosticCode::UnsupportedConstruct, offset, "dynamic member without a target");
                };
                self.emit_expr(t)?;
                let name = self.strings.intern(&m.name)?;
                match &m.args {
                    Some(args) => {
                        for a in args {
                            self.emit_expr(a)?;
                        }
                        let Ok(argc) = u16::try_from(args.len()) else {
                            return error_at(DiagnosticCode::UnsupportedConstruct, offset, "too many arguments");
                        };
                        self.code.emit_u16_pair(OpCode::InvokeDynamic, name, argc);
                        self.pop(args.len() + 1);
                    }
                    None => {
                        self.code.emit_u16(OpCode::GetDynamicProperty, name);
                        self.pop(1);
                    }
                }
                self.push(1);
                Ok(())
            }
            MemberBinding::Unresolved => error_at(
                DiagnosticCode::UnsupportedConstruct,
                offset,
                format!("member '{}' was not resolved", m.name),
            ),
        }
    }

    fn emit_expr(&mut self, e: &Expr) -> Result<()> {
        match &e.kind {
            ExprKind::Literal(lit) => self.emit_literal(lit),
            ExprKind::Identifier(name) => self.load_var(name, e.offset),
            ExprKind::Member(m) => self.emit_member(m, e.offset),
            ExprKind::Constructor { args, binding, type_name } => {
                let Some(id) = binding else {
                    return error_at(
                        DiagnosticCode::UnsupportedConstruct,
                        e.offset,
                        format!("constructor of '{}' was not resolved", type_name),
                    );
                };
                let params = self.registry.constructor(*id).map(|c| c.params.clone()).unwrap_or_default();
                self.emit_args(&params, args)?;
                self.code.emit_i32(OpCode::New, id.0 as i32);
                self.pop(args.len());
                self.push(1);
                Ok(())
            }
            ExprKind::Binary { op: BinaryOp::And, lhs, rhs } => {
                let skip = self.code.new_label();
                let end = self.code.new_label();
                self.emit_expr(lhs)?;
                self.emit_jump(OpCode::JumpIfFalse, skip);
                self.emit_expr(rhs)?;
                self.check_top(ScriptType::Bool, rhs.ty, rhs.offset)?;
                self.emit_jump(OpCode::Jump, end);
                self.code.mark(skip);
                self.code.emit(OpCode::PushFalse);
                self.code.mark(end);
                Ok(())
            }
            ExprKind::Binary { op: BinaryOp::Or, lhs, rhs } => {
                let skip = self.code.new_label();
                let end = self.code.new_label();
                self.emit_expr(lhs)?;
                self.emit_jump(OpCode::JumpIfTrue, skip);
                self.emit_expr(rhs)?;
                self.check_top(ScriptType::Bool, rhs.ty, rhs.offset)?;
                self.emit_jump(OpCode::Jump, end);
                self.code.mark(skip);
                self.code.emit(OpCode::PushTrue);
                self.code.mark(end);
                Ok(())
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.emit_expr(lhs)?;
                self.emit_expr(rhs)?;
                self.emit_binary_op(*op, lhs.ty, rhs.ty);
                Ok(())
            }
            ExprKind::Unary { op, operand } => {
                match (op, operand.literal()) {
                    (UnaryOp::Neg, Some(Literal::Long(n))) => return self.emit_literal(&Literal::Long(n.wrapping_neg())),
                    (UnaryOp::Neg, Some(Literal::Double(d))) => return self.emit_literal(&Literal::Double(-d)),
                    (UnaryOp::Not, Some(Literal::Bool(b))) => return self.emit_literal(&Literal::Bool(!b)),
                    _ => {}
                }
                self.emit_expr(operand)?;
                let code = match op {
                    UnaryOp::Neg if operand.ty.is_numeric() => OpCode::NegNum,
                    UnaryOp::Neg => OpCode::Neg,
                    UnaryOp::Not => OpCode::Not,
                };
                self.code.emit(code);
                Ok(())
            }
            ExprKind::Cast { type_name, .. } => error_at(
                DiagnosticCode::UnsupportedConstruct,
                e.offset,
                format!("Cast to '{}' cannot be compiled", type_name),
            ),
        }
    }
}

/// Whether `body` leaves its loop early through `break` or `continue`.
/// Nested loops own their own `break`/`continue`.
fn escapes(body: &[Stmt]) -> bool {
    body.iter().any(|s| match &s.kind {
        StmtKind::Break | StmtKind::Continue => true,
        StmtKind::If { branches, else_body } => {
            branches.iter().any(|b| escapes(&b.body)) || else_body.as_deref().is_some_and(escapes)
        }
        _ => false,
    })
}

/// Symbol to slot table. A slot is allocated on first use and never reused
/// within one compile.
#[derive(Default)]
struct Locals {
    slots: HashMap<String, u8>,
}

impl Locals {
    fn slot(&mut self, name: &str, offset: usize) -> Result<u8> {
        if let Some(&slot) = self.slots.get(name) {
            return Ok(slot);
        }
        let Ok(slot) = u8::try_from(self.slots.len()) else {
            return error_at(
                DiagnosticCode::TooManyLocals,
                offset,
                format!("Too many variables; '{}' needs a slot beyond 256", name),
            );
        };
        self.slots.insert(name.to_string(), slot);
        Ok(slot)
    }
}

struct LoopCtx {
    break_label: Label,
    continue_label: Label,
}

impl LoopCtx {
    fn new(break_label: Label, continue_label: Label) -> Self {
        Self { break_label, continue_label }
    }
}
