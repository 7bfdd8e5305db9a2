//! Machine state shared by the opcode handlers.

use std::sync::Arc;

use ember_bytecode::instruction::{read_f64, read_i32, read_i64, read_u16, read_u8};
use ember_bytecode::{CompiledScript, OpCode};
use ember_host::value::{format_number, is_whole};
use ember_host::{HostContext, HostTypeRegistry, ScriptObject, Value};
use ember_syntax::types::ScriptType;
use tracing::{trace, warn};

use crate::error::{fail, RuntimeErrorCode, RuntimeResult, RuntimeWarning};
use crate::handlers::handler_for;
use crate::listener::RuntimeListener;
use crate::refs::{Payload, ReferenceTable};
use crate::value::ScriptVar;

/// Whether execution continues after a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Read-only inputs of one run plus the event sink.
pub struct Exec<'a> {
    pub script: &'a CompiledScript,
    pub registry: &'a HostTypeRegistry,
    pub listener: &'a mut dyn RuntimeListener,
}

impl Exec<'_> {
    pub fn warn(&mut self, code: RuntimeErrorCode, message: impl Into<String>) {
        let warning = RuntimeWarning {
            code,
            message: message.into(),
        };
        warn!(code = code.number(), "{}", warning.message);
        self.listener.on_warning(&warning);
    }
}

impl HostContext for Exec<'_> {
    fn print(&mut self, text: &str) {
        self.listener.on_print(text);
    }

    fn registry(&self) -> Option<&HostTypeRegistry> {
        Some(self.registry)
    }
}

/// Operand stack, locals and reference table of a runtime.
#[derive(Debug)]
pub struct Machine {
    pub(crate) stack: Vec<ScriptVar>,
    stack_capacity: usize,
    pub(crate) locals: Vec<ScriptVar>,
    pub(crate) refs: ReferenceTable,
    /// Next instruction.
    pub(crate) pc: usize,
    /// Operands of the executing instruction.
    pub(crate) operand: usize,
    pub(crate) returned: Option<Value>,
}

impl Machine {
    pub fn new(stack_capacity: usize, locals_capacity: usize, reference_capacity: usize) -> Self {
        Self {
            stack: Vec::with_capacity(stack_capacity),
            stack_capacity,
            locals: vec![ScriptVar::Null; locals_capacity],
            refs: ReferenceTable::new(reference_capacity),
            pc: 0,
            operand: 0,
            returned: None,
        }
    }

    /// Re-initialise for a run needing `locals` slots.
    pub(crate) fn prepare(&mut self, locals: usize) {
        self.stack.clear();
        if self.locals.len() < locals {
            self.locals.resize(locals, ScriptVar::Null);
        }
        self.locals.fill(ScriptVar::Null);
        self.pc = 0;
        self.operand = 0;
        self.returned = None;
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub(crate) fn push(&mut self, v: ScriptVar) -> RuntimeResult<()> {
        if self.stack.len() >= self.stack_capacity {
            self.release(v)?;
            return fail(
                RuntimeErrorCode::StackOverflow,
                format!("Stack overflow (capacity {})", self.stack_capacity),
            );
        }
        self.stack.push(v);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> RuntimeResult<ScriptVar> {
        match self.stack.pop() {
            Some(v) => Ok(v),
            None => fail(RuntimeErrorCode::StackUnderflow, "Stack underflow"),
        }
    }

    /// Pop `n` values, returned in push order.
    pub(crate) fn pop_n(&mut self, n: usize) -> RuntimeResult<Vec<ScriptVar>> {
        if self.stack.len() < n {
            return fail(RuntimeErrorCode::StackUnderflow, "Stack underflow");
        }
        let start = self.stack.len() - n;
        Ok(self.stack.drain(start..).collect())
    }

    /// Value `depth` entries below the top.
    pub(crate) fn peek(&self, depth: usize) -> RuntimeResult<ScriptVar> {
        match self.stack.len().checked_sub(depth + 1) {
            Some(i) => Ok(self.stack[i]),
            None => fail(RuntimeErrorCode::StackUnderflow, "Stack underflow"),
        }
    }

    pub(crate) fn release(&mut self, v: ScriptVar) -> RuntimeResult<()> {
        match v.handle() {
            Some(h) => self.refs.release(h),
            None => Ok(()),
        }
    }

    pub(crate) fn release_all(&mut self, vars: &[ScriptVar]) -> RuntimeResult<()> {
        for v in vars {
            self.release(*v)?;
        }
        Ok(())
    }

    pub(crate) fn local_index(&self, slot: u8) -> RuntimeResult<usize> {
        let i = slot as usize;
        if i >= self.locals.len() {
            return fail(RuntimeErrorCode::InvalidLocal, format!("Invalid local slot {}", slot));
        }
        Ok(i)
    }

    /// Copy a value out for the host.
    pub(crate) fn to_value(&self, v: ScriptVar) -> RuntimeResult<Value> {
        Ok(match v {
            ScriptVar::Null => Value::Null,
            ScriptVar::Double(n) => Value::Number(n),
            ScriptVar::Bool(b) => Value::Bool(b),
            ScriptVar::StringRef(h) => Value::Str(self.refs.string(h)?.to_string()),
            ScriptVar::ObjectRef(h) => Value::Object(Arc::clone(self.refs.object(h)?)),
        })
    }

    /// Bring a host value in, taking one reference when it is a string or
    /// object.
    pub(crate) fn from_value(&mut self, value: Value) -> RuntimeResult<ScriptVar> {
        Ok(match value {
            Value::Null => ScriptVar::Null,
            Value::Number(n) => ScriptVar::Double(n),
            Value::Bool(b) => ScriptVar::Bool(b),
            Value::Str(s) => ScriptVar::StringRef(self.refs.insert_string(s)?),
            Value::Object(o) => ScriptVar::ObjectRef(self.refs.acquire_object(o)?),
        })
    }

    pub(crate) fn object(&self, v: ScriptVar, member: &str) -> RuntimeResult<Arc<dyn ScriptObject>> {
        match v {
            ScriptVar::ObjectRef(h) => Ok(Arc::clone(self.refs.object(h)?)),
            other => fail(
                RuntimeErrorCode::InvalidOperation,
                format!("Cannot access '{}' on a {} value", member, other.kind_name()),
            ),
        }
    }

    /// Runtime script type of a value.
    pub(crate) fn type_of(&self, registry: &HostTypeRegistry, v: ScriptVar) -> ScriptType {
        match v {
            ScriptVar::Null => ScriptType::Null,
            ScriptVar::Double(n) if is_whole(n) => ScriptType::Long,
            ScriptVar::Double(_) => ScriptType::Double,
            ScriptVar::Bool(_) => ScriptType::Bool,
            ScriptVar::StringRef(_) => ScriptType::String,
            ScriptVar::ObjectRef(h) => match self.refs.get(h) {
                Some(Payload::Object(o)) => registry
                    .type_of_object(o.as_ref())
                    .map_or(ScriptType::Dynamic, ScriptType::Object),
                _ => ScriptType::Dynamic,
            },
        }
    }

    /// Text of a value when concatenated or printed.
    pub(crate) fn display(&self, v: ScriptVar) -> RuntimeResult<String> {
        Ok(match v {
            ScriptVar::Null => "null".to_string(),
            ScriptVar::Double(n) => format_number(n),
            ScriptVar::Bool(b) => b.to_string(),
            ScriptVar::StringRef(h) => self.refs.string(h)?.to_string(),
            ScriptVar::ObjectRef(h) => self.refs.object(h)?.display(),
        })
    }

    pub(crate) fn operand_u8(&self, code: &[u8]) -> RuntimeResult<u8> {
        read_u8(code, self.operand).ok_or_else(truncated)
    }

    pub(crate) fn operand_u16(&self, code: &[u8], offset: usize) -> RuntimeResult<u16> {
        read_u16(code, self.operand + offset).ok_or_else(truncated)
    }

    pub(crate) fn operand_i32(&self, code: &[u8], offset: usize) -> RuntimeResult<i32> {
        read_i32(code, self.operand + offset).ok_or_else(truncated)
    }

    pub(crate) fn operand_i64(&self, code: &[u8]) -> RuntimeResult<i64> {
        read_i64(code, self.operand).ok_or_else(truncated)
    }

    pub(crate) fn operand_f64(&self, code: &[u8]) -> RuntimeResult<f64> {
        read_f64(code, self.operand).ok_or_else(truncated)
    }
}

fn truncated() -> crate::error::RuntimeError {
    crate::error::RuntimeError::new(RuntimeErrorCode::InvalidBytecode, "Truncated instruction")
}

/// Execute `[start, end)` of the script's bytecode.
pub(crate) fn run_range(m: &mut Machine, exec: &mut Exec<'_>, start: usize, end: usize) -> RuntimeResult<Flow> {
    let code = exec.script.bytecode.as_slice();
    m.pc = start;
    while m.pc < end {
        let Some(&byte) = code.get(m.pc) else {
            return fail(RuntimeErrorCode::InvalidBytecode, format!("Jumped outside the script to {}", m.pc));
        };
        let Some(op) = OpCode::from_byte(byte) else {
            return fail(
                RuntimeErrorCode::InvalidBytecode,
                format!("Unknown opcode {:#04x} at {}", byte, m.pc),
            );
        };
        trace!(pc = m.pc, op = op.name(), depth = m.stack.len());
        m.operand = m.pc + 1;
        m.pc = m.operand + op.operand_size();
        if handler_for(op)(m, exec)? == Flow::Stop {
            return Ok(Flow::Stop);
        }
    }
    Ok(Flow::Continue)
}
