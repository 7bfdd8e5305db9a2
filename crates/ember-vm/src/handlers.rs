//! Opcode handlers and the dispatch table.
//!
//! Each handler runs one instruction. `m.operand` points at the
//! instruction's operands and `m.pc` already at the next instruction, so
//! jumps simply overwrite `m.pc`.

use std::sync::OnceLock;

use ember_bytecode::instruction::{decode_peek, decode_type};
use ember_bytecode::{OpCode, OPCODE_COUNT};
use ember_host::{HostTypeRegistry, Value};
use ember_syntax::types::{ConstructorId, HostTypeId, MethodId, PropertyId, ScriptType};

use crate::error::{fail, RuntimeErrorCode, RuntimeResult};
use crate::machine::{run_range, Exec, Flow, Machine};
use crate::value::ScriptVar;

pub type Handler = fn(&mut Machine, &mut Exec<'_>) -> RuntimeResult<Flow>;

/// Handler for `op`, from a table built on first use.
pub fn handler_for(op: OpCode) -> Handler {
    static HANDLERS: OnceLock<[Handler; OPCODE_COUNT]> = OnceLock::new();
    HANDLERS.get_or_init(|| {
        std::array::from_fn(|index| {
            OpCode::from_byte(index as u8).map_or(handle_invalid as Handler, handler_of)
        })
    })[op as usize]
}

fn handler_of(op: OpCode) -> Handler {
    match op {
        OpCode::Nop => handle_nop,
        OpCode::PushNull => handle_push_null,
        OpCode::PushTrue => handle_push_true,
        OpCode::PushFalse => handle_push_false,
        OpCode::PushLong => handle_push_long,
        OpCode::PushDouble => handle_push_double,
        OpCode::PushString => handle_push_string,
        OpCode::Pop => handle_pop,
        OpCode::LoadLoc => handle_load_loc,
        OpCode::LoadLocNoRef => handle_load_loc_no_ref,
        OpCode::SetLoc => handle_set_loc,
        OpCode::SetLocNoRef => handle_set_loc_no_ref,
        OpCode::Add => |m, _| generic_arith(m, Arith::Add),
        OpCode::Sub => |m, _| generic_arith(m, Arith::Sub),
        OpCode::Mul => |m, _| generic_arith(m, Arith::Mul),
        OpCode::Div => |m, _| generic_arith(m, Arith::Div),
        OpCode::Mod => |m, _| generic_arith(m, Arith::Mod),
        OpCode::AddNum => |m, _| numeric_arith(m, Arith::Add),
        OpCode::SubNum => |m, _| numeric_arith(m, Arith::Sub),
        OpCode::MulNum => |m, _| numeric_arith(m, Arith::Mul),
        OpCode::DivNum => |m, _| numeric_arith(m, Arith::Div),
        OpCode::ModNum => |m, _| numeric_arith(m, Arith::Mod),
        OpCode::Less => |m, _| generic_compare(m, Compare::Less),
        OpCode::LessEq => |m, _| generic_compare(m, Compare::LessEq),
        OpCode::Greater => |m, _| generic_compare(m, Compare::Greater),
        OpCode::GreaterEq => |m, _| generic_compare(m, Compare::GreaterEq),
        OpCode::Equals => |m, _| generic_equals(m, false),
        OpCode::NotEquals => |m, _| generic_equals(m, true),
        OpCode::LessNum => |m, _| numeric_compare(m, Compare::Less),
        OpCode::LessEqNum => |m, _| numeric_compare(m, Compare::LessEq),
        OpCode::GreaterNum => |m, _| numeric_compare(m, Compare::Greater),
        OpCode::GreaterEqNum => |m, _| numeric_compare(m, Compare::GreaterEq),
        OpCode::EqualsNum => |m, _| numeric_compare(m, Compare::Equals),
        OpCode::NotEqualsNum => |m, _| numeric_compare(m, Compare::NotEquals),
        OpCode::Neg => handle_neg,
        OpCode::NegNum => handle_neg_num,
        OpCode::Not => handle_not,
        OpCode::Jump => handle_jump,
        OpCode::JumpIfFalse => |m, exec| conditional_jump(m, exec, false),
        OpCode::JumpIfTrue => |m, exec| conditional_jump(m, exec, true),
        OpCode::Invoke => handle_invoke,
        OpCode::InvokeStatic => handle_invoke_static,
        OpCode::InvokeDynamic => handle_invoke_dynamic,
        OpCode::GetProperty => handle_get_property,
        OpCode::SetProperty => handle_set_property,
        OpCode::GetStaticProperty => handle_get_static_property,
        OpCode::SetStaticProperty => handle_set_static_property,
        OpCode::GetDynamicProperty => handle_get_dynamic_property,
        OpCode::SetDynamicProperty => handle_set_dynamic_property,
        OpCode::New => handle_new,
        OpCode::CheckType => handle_check_type,
        OpCode::PeekCheckType => handle_peek_check_type,
        OpCode::Loop => handle_loop,
        OpCode::LoopNum => handle_loop_num,
        OpCode::Return => handle_return,
        OpCode::Exit => handle_exit,
    }
}

fn handle_invalid(m: &mut Machine, _: &mut Exec<'_>) -> RuntimeResult<Flow> {
    fail(
        RuntimeErrorCode::InvalidBytecode,
        format!("Unknown opcode at {}", m.operand.saturating_sub(1)),
    )
}

fn handle_nop(_: &mut Machine, _: &mut Exec<'_>) -> RuntimeResult<Flow> {
    Ok(Flow::Continue)
}

fn push(m: &mut Machine, v: ScriptVar) -> RuntimeResult<Flow> {
    m.push(v)?;
    Ok(Flow::Continue)
}

fn handle_push_null(m: &mut Machine, _: &mut Exec<'_>) -> RuntimeResult<Flow> {
    push(m, ScriptVar::Null)
}

fn handle_push_true(m: &mut Machine, _: &mut Exec<'_>) -> RuntimeResult<Flow> {
    push(m, ScriptVar::Bool(true))
}

fn handle_push_false(m: &mut Machine, _: &mut Exec<'_>) -> RuntimeResult<Flow> {
    push(m, ScriptVar::Bool(false))
}

fn handle_push_long(m: &mut Machine, exec: &mut Exec<'_>) -> RuntimeResult<Flow> {
    let n = m.operand_i64(&exec.script.bytecode)?;
    push(m, ScriptVar::Double(n as f64))
}

fn handle_push_double(m: &mut Machine, exec: &mut Exec<'_>) -> RuntimeResult<Flow> {
    let n = m.operand_f64(&exec.script.bytecode)?;
    push(m, ScriptVar::Double(n))
}

fn pool_string<'a>(m: &Machine, exec: &Exec<'a>) -> RuntimeResult<&'a str> {
    let index = m.operand_u16(&exec.script.bytecode, 0)?;
    match exec.script.string(index) {
        Some(s) => Ok(s),
        None => fail(
            RuntimeErrorCode::InvalidBytecode,
            format!("String pool index {} out of range", index),
        ),
    }
}

fn handle_push_string(m: &mut Machine, exec: &mut Exec<'_>) -> RuntimeResult<Flow> {
    let s = pool_string(m, exec)?;
    let h = m.refs.insert_string(s.to_string())?;
    push(m, ScriptVar::StringRef(h))
}

fn handle_pop(m: &mut Machine, _: &mut Exec<'_>) -> RuntimeResult<Flow> {
    let v = m.pop()?;
    m.release(v)?;
    Ok(Flow::Continue)
}

fn handle_load_loc(m: &mut Machine, exec: &mut Exec<'_>) -> RuntimeResult<Flow> {
    let i = m.local_index(m.operand_u8(&exec.script.bytecode)?)?;
    let v = m.locals[i];
    if let Some(h) = v.handle() {
        m.refs.add_ref(h)?;
    }
    push(m, v)
}

fn handle_load_loc_no_ref(m: &mut Machine, exec: &mut Exec<'_>) -> RuntimeResult<Flow> {
    let i = m.local_index(m.operand_u8(&exec.script.bytecode)?)?;
    let v = m.locals[i];
    push(m, v)
}

fn handle_set_loc(m: &mut Machine, exec: &mut Exec<'_>) -> RuntimeResult<Flow> {
    let i = m.local_index(m.operand_u8(&exec.script.bytecode)?)?;
    let v = m.pop()?;
    let old = std::mem::replace(&mut m.locals[i], v);
    m.release(old)?;
    Ok(Flow::Continue)
}

fn handle_set_loc_no_ref(m: &mut Machine, exec: &mut Exec<'_>) -> RuntimeResult<Flow> {
    let i = m.local_index(m.operand_u8(&exec.script.bytecode)?)?;
    m.locals[i] = m.pop()?;
    Ok(Flow::Continue)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl Arith {
    fn apply(self, x: f64, y: f64) -> f64 {
        match self {
            Arith::Add => x + y,
            Arith::Sub => x - y,
            Arith::Mul => x * y,
            Arith::Div => x / y,
            Arith::Mod => x % y,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Arith::Add => "+",
            Arith::Sub => "-",
            Arith::Mul => "*",
            Arith::Div => "/",
            Arith::Mod => "%",
        }
    }
}

fn invalid_operands<T>(symbol: &str, a: ScriptVar, b: ScriptVar) -> RuntimeResult<T> {
    fail(
        RuntimeErrorCode::InvalidOperation,
        format!(
            "Invalid Operation: '{}' cannot be applied to {} and {}",
            symbol,
            a.kind_name(),
            b.kind_name()
        ),
    )
}

fn concat(m: &mut Machine, a: ScriptVar, b: ScriptVar) -> RuntimeResult<ScriptVar> {
    let mut text = m.display(a)?;
    text.push_str(&m.display(b)?);
    Ok(ScriptVar::StringRef(m.refs.insert_string(text)?))
}

fn generic_arith(m: &mut Machine, op: Arith) -> RuntimeResult<Flow> {
    let b = m.pop()?;
    let a = m.pop()?;
    let result = match (a, b) {
        (ScriptVar::Double(x), ScriptVar::Double(y)) => Ok(ScriptVar::Double(op.apply(x, y))),
        (ScriptVar::StringRef(_), _) | (_, ScriptVar::StringRef(_)) if op == Arith::Add => concat(m, a, b),
        _ => invalid_operands(op.symbol(), a, b),
    };
    m.release(a)?;
    m.release(b)?;
    push(m, result?)
}

fn numbers(m: &mut Machine) -> RuntimeResult<(f64, f64)> {
    let b = m.pop()?;
    let a = m.pop()?;
    match (a, b) {
        (ScriptVar::Double(x), ScriptVar::Double(y)) => Ok((x, y)),
        (a, b) => {
            m.release(a)?;
            m.release(b)?;
            fail(
                RuntimeErrorCode::InvalidBytecode,
                "Numeric instruction applied to non-numeric values",
            )
        }
    }
}

fn numeric_arith(m: &mut Machine, op: Arith) -> RuntimeResult<Flow> {
    let (x, y) = numbers(m)?;
    push(m, ScriptVar::Double(op.apply(x, y)))
}

#[derive(Debug, Clone, Copy)]
enum Compare {
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Equals,
    NotEquals,
}

impl Compare {
    fn apply(self, x: f64, y: f64) -> bool {
        match self {
            Compare::Less => x < y,
            Compare::LessEq => x <= y,
            Compare::Greater => x > y,
            Compare::GreaterEq => x >= y,
            Compare::Equals => x == y,
            Compare::NotEquals => x != y,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Compare::Less => "<",
            Compare::LessEq => "<=",
            Compare::Greater => ">",
            Compare::GreaterEq => ">=",
            Compare::Equals => "==",
            Compare::NotEquals => "!=",
        }
    }
}

fn generic_compare(m: &mut Machine, op: Compare) -> RuntimeResult<Flow> {
    let b = m.pop()?;
    let a = m.pop()?;
    let result = match (a, b) {
        (ScriptVar::Double(x), ScriptVar::Double(y)) => Ok(ScriptVar::Bool(op.apply(x, y))),
        _ => invalid_operands(op.symbol(), a, b),
    };
    m.release(a)?;
    m.release(b)?;
    push(m, result?)
}

fn numeric_compare(m: &mut Machine, op: Compare) -> RuntimeResult<Flow> {
    let (x, y) = numbers(m)?;
    push(m, ScriptVar::Bool(op.apply(x, y)))
}

/// Strings compare by content, objects by identity.
fn values_equal(m: &Machine, a: ScriptVar, b: ScriptVar) -> RuntimeResult<bool> {
    Ok(match (a, b) {
        (ScriptVar::Null, ScriptVar::Null) => true,
        (ScriptVar::Double(x), ScriptVar::Double(y)) => x == y,
        (ScriptVar::Bool(x), ScriptVar::Bool(y)) => x == y,
        (ScriptVar::StringRef(x), ScriptVar::StringRef(y)) => x == y || m.refs.string(x)? == m.refs.string(y)?,
        (ScriptVar::ObjectRef(x), ScriptVar::ObjectRef(y)) => x == y,
        _ => false,
    })
}

fn generic_equals(m: &mut Machine, negate: bool) -> RuntimeResult<Flow> {
    let b = m.pop()?;
    let a = m.pop()?;
    let equal = values_equal(m, a, b);
    m.release(a)?;
    m.release(b)?;
    push(m, ScriptVar::Bool(equal? != negate))
}

fn handle_neg(m: &mut Machine, _: &mut Exec<'_>) -> RuntimeResult<Flow> {
    match m.pop()? {
        ScriptVar::Double(n) => push(m, ScriptVar::Double(-n)),
        other => {
            m.release(other)?;
            fail(
                RuntimeErrorCode::InvalidOperation,
                format!("Invalid Operation: '-' cannot be applied to {}", other.kind_name()),
            )
        }
    }
}

fn handle_neg_num(m: &mut Machine, _: &mut Exec<'_>) -> RuntimeResult<Flow> {
    match m.pop()? {
        ScriptVar::Double(n) => push(m, ScriptVar::Double(-n)),
        other => {
            m.release(other)?;
            fail(
                RuntimeErrorCode::InvalidBytecode,
                "Numeric instruction applied to a non-numeric value",
            )
        }
    }
}

fn handle_not(m: &mut Machine, _: &mut Exec<'_>) -> RuntimeResult<Flow> {
    match m.pop()? {
        ScriptVar::Bool(b) => push(m, ScriptVar::Bool(!b)),
        other => {
            m.release(other)?;
            fail(
                RuntimeErrorCode::InvalidOperation,
                format!("Invalid Operation: '!' cannot be applied to {}", other.kind_name()),
            )
        }
    }
}

fn jump_target(m: &Machine, exec: &Exec<'_>) -> RuntimeResult<usize> {
    let target = m.operand_i32(&exec.script.bytecode, 0)?;
    match usize::try_from(target) {
        Ok(t) if t <= exec.script.bytecode.len() => Ok(t),
        _ => fail(RuntimeErrorCode::InvalidBytecode, format!("Jump target {} out of range", target)),
    }
}

fn handle_jump(m: &mut Machine, exec: &mut Exec<'_>) -> RuntimeResult<Flow> {
    m.pc = jump_target(m, exec)?;
    Ok(Flow::Continue)
}

fn conditional_jump(m: &mut Machine, exec: &mut Exec<'_>, when: bool) -> RuntimeResult<Flow> {
    let target = jump_target(m, exec)?;
    match m.pop()? {
        ScriptVar::Bool(b) => {
            if b == when {
                m.pc = target;
            }
            Ok(Flow::Continue)
        }
        other => {
            m.release(other)?;
            fail(
                RuntimeErrorCode::InvalidType,
                format!("Invalid Type: expected bool, found {}", other.kind_name()),
            )
        }
    }
}

/// Pop `n` arguments and convert them for the host, releasing the script's
/// references.
fn pop_args(m: &mut Machine, n: usize) -> RuntimeResult<Vec<Value>> {
    let vars = m.pop_n(n)?;
    let values = vars.iter().map(|v| m.to_value(*v)).collect::<RuntimeResult<Vec<_>>>();
    m.release_all(&vars)?;
    values
}

/// Push a host result after checking it against the member's declared type.
fn push_result(
    m: &mut Machine,
    registry: &HostTypeRegistry,
    declared: ScriptType,
    member: &str,
    value: Value,
) -> RuntimeResult<Flow> {
    if declared == ScriptType::Void {
        return push(m, ScriptVar::Null);
    }
    let actual = registry.type_of_value(&value);
    if !HostTypeRegistry::runtime_accepts(declared, actual) {
        return fail(
            RuntimeErrorCode::HostCallFailed,
            format!(
                "'{}' returned {}, expected {}",
                member,
                registry.type_name(actual),
                registry.type_name(declared)
            ),
        );
    }
    let v = m.from_value(value)?;
    push(m, v)
}

fn member_id(m: &Machine, exec: &Exec<'_>) -> RuntimeResult<u32> {
    Ok(m.operand_i32(&exec.script.bytecode, 0)? as u32)
}

fn unknown_member<T>(kind: &str, id: u32) -> RuntimeResult<T> {
    fail(RuntimeErrorCode::InvalidMember, format!("Unknown {} #{}", kind, id))
}

fn handle_invoke_static(m: &mut Machine, exec: &mut Exec<'_>) -> RuntimeResult<Flow> {
    let id = member_id(m, exec)?;
    let registry = exec.registry;
    let Some(def) = registry.method(MethodId(id)) else {
        return unknown_member("method", id);
    };
    let args = pop_args(m, def.params.len())?;
    let value = (def.func)(exec, None, &args)?;
    push_result(m, registry, def.returns, &def.name, value)
}

fn handle_invoke(m: &mut Machine, exec: &mut Exec<'_>) -> RuntimeResult<Flow> {
    let id = member_id(m, exec)?;
    let registry = exec.registry;
    let Some(def) = registry.method(MethodId(id)) else {
        return unknown_member("method", id);
    };
    let args = pop_args(m, def.params.len())?;
    let target = m.pop()?;
    let value = match m.object(target, &def.name) {
        Ok(obj) => (def.func)(exec, Some(&obj), &args).map_err(Into::into),
        Err(e) => Err(e),
    };
    m.release(target)?;
    push_result(m, registry, def.returns, &def.name, value?)
}

fn instance_type(m: &Machine, registry: &HostTypeRegistry, target: ScriptVar, member: &str) -> RuntimeResult<HostTypeId> {
    match m.type_of(registry, target) {
        ScriptType::Object(id) => Ok(id),
        ScriptType::Dynamic => fail(
            RuntimeErrorCode::InvalidMember,
            format!("Cannot look up '{}' on an unregistered object", member),
        ),
        other => fail(
            RuntimeErrorCode::InvalidOperation,
            format!("Cannot access '{}' on a {} value", member, other),
        ),
    }
}

fn invoke_dynamic(
    m: &Machine,
    exec: &mut Exec<'_>,
    name: &str,
    target: ScriptVar,
    vars: &[ScriptVar],
) -> RuntimeResult<(ScriptType, Value)> {
    let registry = exec.registry;
    let ty = instance_type(m, registry, target, name)?;
    let obj = m.object(target, name)?;
    let candidates: Vec<_> = registry
        .instance_methods(ty, name)
        .into_iter()
        .filter(|d| d.params.len() == vars.len())
        .collect();
    let def = match candidates.as_slice() {
        [d] => *d,
        [] => {
            return fail(
                RuntimeErrorCode::InvalidMember,
                format!(
                    "{} has no method '{}' taking {} argument(s)",
                    registry.type_name(ScriptType::Object(ty)),
                    name,
                    vars.len()
                ),
            )
        }
        _ => {
            return fail(
                RuntimeErrorCode::InvalidMember,
                format!("'{}' matches more than one method", name),
            )
        }
    };
    for (i, (param, v)) in def.params.iter().zip(vars).enumerate() {
        let actual = m.type_of(registry, *v);
        if !HostTypeRegistry::runtime_accepts(*param, actual) {
            return fail(
                RuntimeErrorCode::InvalidType,
                format!(
                    "Invalid Type: argument {} of '{}' expected {}, found {}",
                    i + 1,
                    name,
                    registry.type_name(*param),
                    registry.type_name(actual)
                ),
            );
        }
    }
    let args = vars.iter().map(|v| m.to_value(*v)).collect::<RuntimeResult<Vec<_>>>()?;
    let value = (def.func)(exec, Some(&obj), &args)?;
    Ok((def.returns, value))
}

fn handle_invoke_dynamic(m: &mut Machine, exec: &mut Exec<'_>) -> RuntimeResult<Flow> {
    let name = pool_string(m, exec)?;
    let argc = m.operand_u16(&exec.script.bytecode, 2)? as usize;
    let vars = m.pop_n(argc)?;
    let target = m.pop()?;
    let outcome = invoke_dynamic(m, exec, name, target, &vars);
    m.release_all(&vars)?;
    m.release(target)?;
    let (declared, value) = outcome?;
    push_result(m, exec.registry, declared, name, value)
}

fn handle_get_property(m: &mut Machine, exec: &mut Exec<'_>) -> RuntimeResult<Flow> {
    let id = member_id(m, exec)?;
    let registry = exec.registry;
    let Some(def) = registry.property(PropertyId(id)) else {
        return unknown_member("property", id);
    };
    let Some(getter) = &def.getter else {
        return fail(RuntimeErrorCode::InvalidMember, format!("Property '{}' cannot be read", def.name));
    };
    let target = m.pop()?;
    let value = m
        .object(target, &def.name)
        .and_then(|obj| getter(Some(&obj)).map_err(Into::into));
    m.release(target)?;
    push_result(m, registry, def.ty, &def.name, value?)
}

fn handle_get_static_property(m: &mut Machine, exec: &mut Exec<'_>) -> RuntimeResult<Flow> {
    let id = member_id(m, exec)?;
    let registry = exec.registry;
    let Some(def) = registry.property(PropertyId(id)) else {
        return unknown_member("property", id);
    };
    let Some(getter) = &def.getter else {
        return fail(RuntimeErrorCode::InvalidMember, format!("Property '{}' cannot be read", def.name));
    };
    let value = getter(None)?;
    push_result(m, registry, def.ty, &def.name, value)
}

fn handle_set_property(m: &mut Machine, exec: &mut Exec<'_>) -> RuntimeResult<Flow> {
    let id = member_id(m, exec)?;
    let Some(def) = exec.registry.property(PropertyId(id)) else {
        return unknown_member("property", id);
    };
    let Some(setter) = &def.setter else {
        return fail(RuntimeErrorCode::InvalidMember, format!("Property '{}' is read-only", def.name));
    };
    let v = m.pop()?;
    let target = m.pop()?;
    let outcome = m
        .object(target, &def.name)
        .and_then(|obj| Ok((obj, m.to_value(v)?)))
        .and_then(|(obj, value)| setter(Some(&obj), value).map_err(Into::into));
    m.release(v)?;
    m.release(target)?;
    outcome?;
    Ok(Flow::Continue)
}

fn handle_set_static_property(m: &mut Machine, exec: &mut Exec<'_>) -> RuntimeResult<Flow> {
    let id = member_id(m, exec)?;
    let Some(def) = exec.registry.property(PropertyId(id)) else {
        return unknown_member("property", id);
    };
    let Some(setter) = &def.setter else {
        return fail(RuntimeErrorCode::InvalidMember, format!("Property '{}' is read-only", def.name));
    };
    let v = m.pop()?;
    let outcome = m
        .to_value(v)
        .and_then(|value| setter(None, value).map_err(Into::into));
    m.release(v)?;
    outcome?;
    Ok(Flow::Continue)
}

fn get_dynamic(m: &Machine, exec: &mut Exec<'_>, name: &str, target: ScriptVar) -> RuntimeResult<(ScriptType, Value)> {
    let registry = exec.registry;
    let ty = instance_type(m, registry, target, name)?;
    let obj = m.object(target, name)?;
    let readable: Vec<_> = registry
        .instance_properties(ty, name)
        .into_iter()
        .filter_map(|p| p.getter.as_ref().map(|g| (p.ty, g)))
        .collect();
    if let [(declared, getter)] = readable.as_slice() {
        return Ok((*declared, getter(Some(&obj))?));
    }
    let methods: Vec<_> = registry
        .instance_methods(ty, name)
        .into_iter()
        .filter(|d| d.params.is_empty())
        .collect();
    if let [def] = methods.as_slice() {
        return Ok((def.returns, (def.func)(exec, Some(&obj), &[])?));
    }
    fail(
        RuntimeErrorCode::InvalidMember,
        format!("{} has no readable member '{}'", registry.type_name(ScriptType::Object(ty)), name),
    )
}

fn handle_get_dynamic_property(m: &mut Machine, exec: &mut Exec<'_>) -> RuntimeResult<Flow> {
    let name = pool_string(m, exec)?;
    let target = m.pop()?;
    let outcome = get_dynamic(m, exec, name, target);
    m.release(target)?;
    let (declared, value) = outcome?;
    push_result(m, exec.registry, declared, name, value)
}

fn set_dynamic(m: &Machine, registry: &HostTypeRegistry, name: &str, target: ScriptVar, v: ScriptVar) -> RuntimeResult<()> {
    let ty = instance_type(m, registry, target, name)?;
    let obj = m.object(target, name)?;
    let writable: Vec<_> = registry
        .instance_properties(ty, name)
        .into_iter()
        .filter_map(|p| p.setter.as_ref().map(|s| (p.ty, s)))
        .collect();
    let [(declared, setter)] = writable.as_slice() else {
        return fail(
            RuntimeErrorCode::InvalidMember,
            format!("{} has no writable property '{}'", registry.type_name(ScriptType::Object(ty)), name),
        );
    };
    let actual = m.type_of(registry, v);
    if !HostTypeRegistry::runtime_accepts(*declared, actual) {
        return fail(
            RuntimeErrorCode::InvalidType,
            format!(
                "Invalid Type: property '{}' expected {}, found {}",
                name,
                registry.type_name(*declared),
                registry.type_name(actual)
            ),
        );
    }
    setter(Some(&obj), m.to_value(v)?)?;
    Ok(())
}

fn handle_set_dynamic_property(m: &mut Machine, exec: &mut Exec<'_>) -> RuntimeResult<Flow> {
    let name = pool_string(m, exec)?;
    let v = m.pop()?;
    let target = m.pop()?;
    let outcome = set_dynamic(m, exec.registry, name, target, v);
    m.release(v)?;
    m.release(target)?;
    outcome?;
    Ok(Flow::Continue)
}

fn handle_new(m: &mut Machine, exec: &mut Exec<'_>) -> RuntimeResult<Flow> {
    let id = member_id(m, exec)?;
    let Some(def) = exec.registry.constructor(ConstructorId(id)) else {
        return unknown_member("constructor", id);
    };
    let args = pop_args(m, def.params.len())?;
    let object = (def.func)(&args)?;
    let h = m.refs.acquire_object(object)?;
    push(m, ScriptVar::ObjectRef(h))
}

fn check_value(m: &Machine, registry: &HostTypeRegistry, expected: ScriptType, v: ScriptVar) -> RuntimeResult<Flow> {
    let actual = m.type_of(registry, v);
    if HostTypeRegistry::runtime_accepts(expected, actual) {
        return Ok(Flow::Continue);
    }
    fail(
        RuntimeErrorCode::InvalidType,
        format!(
            "Invalid Type: expected {}, found {}",
            registry.type_name(expected),
            registry.type_name(actual)
        ),
    )
}

fn handle_check_type(m: &mut Machine, exec: &mut Exec<'_>) -> RuntimeResult<Flow> {
    let code = m.operand_i32(&exec.script.bytecode, 0)?;
    let Some(expected) = decode_type(code) else {
        return fail(RuntimeErrorCode::InvalidBytecode, format!("Bad type check {:#x}", code));
    };
    check_value(m, exec.registry, expected, m.peek(0)?)
}

fn handle_peek_check_type(m: &mut Machine, exec: &mut Exec<'_>) -> RuntimeResult<Flow> {
    let code = m.operand_i32(&exec.script.bytecode, 0)?;
    let Some((expected, depth)) = decode_peek(code) else {
        return fail(RuntimeErrorCode::InvalidBytecode, format!("Bad type check {:#x}", code));
    };
    check_value(m, exec.registry, expected, m.peek(depth as usize)?)
}

/// Run the body following a counted loop instruction `count` times.
fn run_counted(m: &mut Machine, exec: &mut Exec<'_>, count: u64, len: i32) -> RuntimeResult<Flow> {
    let start = m.pc;
    let end = match usize::try_from(len) {
        Ok(len) if start + len <= exec.script.bytecode.len() => start + len,
        _ => return fail(RuntimeErrorCode::InvalidBytecode, format!("Loop body length {} out of range", len)),
    };
    for _ in 0..count {
        if run_range(m, exec, start, end)? == Flow::Stop {
            return Ok(Flow::Stop);
        }
    }
    m.pc = end;
    Ok(Flow::Continue)
}

fn handle_loop(m: &mut Machine, exec: &mut Exec<'_>) -> RuntimeResult<Flow> {
    let count = m.operand_i32(&exec.script.bytecode, 0)?;
    let len = m.operand_i32(&exec.script.bytecode, 4)?;
    run_counted(m, exec, count.max(0) as u64, len)
}

fn handle_loop_num(m: &mut Machine, exec: &mut Exec<'_>) -> RuntimeResult<Flow> {
    let len = m.operand_i32(&exec.script.bytecode, 0)?;
    let n = match m.pop()? {
        ScriptVar::Double(n) => n,
        other => {
            m.release(other)?;
            return fail(
                RuntimeErrorCode::InvalidType,
                format!("Invalid Type: loop count must be a number, found {}", other.kind_name()),
            );
        }
    };
    // Matches the counter lowering `i < n` for fractional counts.
    let count = if n > 0.0 { n.ceil() as u64 } else { 0 };
    run_counted(m, exec, count, len)
}

/// Drop whatever is left on the stack when the script stops.
fn unwind(m: &mut Machine, exec: &mut Exec<'_>) -> RuntimeResult<()> {
    if m.stack.is_empty() {
        return Ok(());
    }
    exec.warn(
        RuntimeErrorCode::StackNotEmpty,
        format!("stack not empty: {} value(s) left", m.stack.len()),
    );
    let rest: Vec<ScriptVar> = m.stack.drain(..).collect();
    m.release_all(&rest)
}

fn handle_return(m: &mut Machine, exec: &mut Exec<'_>) -> RuntimeResult<Flow> {
    let v = m.pop()?;
    let value = m.to_value(v);
    m.release(v)?;
    m.returned = Some(value?);
    unwind(m, exec)?;
    Ok(Flow::Stop)
}

fn handle_exit(m: &mut Machine, exec: &mut Exec<'_>) -> RuntimeResult<Flow> {
    unwind(m, exec)?;
    Ok(Flow::Stop)
}
