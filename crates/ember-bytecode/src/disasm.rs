//! Human-readable listing of compiled bytecode.

use std::fmt::Write;

use crate::instruction::*;
use crate::program::CompiledScript;

/// Render one instruction per line as `offset  Name operands`.
///
/// Truncated or unknown bytes end the listing with a `<bad ...>` line rather
/// than failing, so a damaged script can still be inspected.
pub fn disassemble(script: &CompiledScript) -> String {
    let code = &script.bytecode;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "; {} ({} locals, stack {}, {} strings)",
        script.name,
        script.locals_count,
        script.max_stack_hint,
        script.string_pool.len()
    );
    for (name, v) in &script.in_vars {
        let _ = writeln!(out, "; in {} <{}> -> loc {}", name, v.ty, v.slot);
    }
    let mut pc = 0;
    while pc < code.len() {
        let Some(op) = OpCode::from_byte(code[pc]) else {
            let _ = writeln!(out, "{:04}  <bad opcode {:#04x}>", pc, code[pc]);
            break;
        };
        let at = pc + 1;
        match operands(script, op, at) {
            Some(text) if text.is_empty() => {
                let _ = writeln!(out, "{:04}  {}", pc, op.name());
            }
            Some(text) => {
                let _ = writeln!(out, "{:04}  {} {}", pc, op.name(), text);
            }
            None => {
                let _ = writeln!(out, "{:04}  <bad operands for {}>", pc, op.name());
                break;
            }
        }
        pc = at + op.operand_size();
    }
    out
}

fn quoted(script: &CompiledScript, index: u16) -> String {
    match script.string(index) {
        Some(s) => format!("{:?}", s),
        None => format!("#{}?", index),
    }
}

fn operands(script: &CompiledScript, op: OpCode, at: usize) -> Option<String> {
    let code = &script.bytecode;
    Some(match op {
        OpCode::PushLong => read_i64(code, at)?.to_string(),
        OpCode::PushDouble => format!("{:?}", read_f64(code, at)?),
        OpCode::PushString | OpCode::GetDynamicProperty | OpCode::SetDynamicProperty => {
            quoted(script, read_u16(code, at)?)
        }
        OpCode::LoadLoc | OpCode::LoadLocNoRef | OpCode::SetLoc | OpCode::SetLocNoRef => {
            format!("loc {}", read_u8(code, at)?)
        }
        OpCode::Jump | OpCode::JumpIfFalse | OpCode::JumpIfTrue => format!("-> {:04}", read_i32(code, at)?),
        OpCode::Invoke | OpCode::InvokeStatic => format!("method #{}", read_i32(code, at)?),
        OpCode::GetProperty | OpCode::SetProperty | OpCode::GetStaticProperty | OpCode::SetStaticProperty => {
            format!("property #{}", read_i32(code, at)?)
        }
        OpCode::New => format!("ctor #{}", read_i32(code, at)?),
        OpCode::InvokeDynamic => {
            format!("{} argc {}", quoted(script, read_u16(code, at)?), read_u16(code, at + 2)?)
        }
        OpCode::CheckType => format!("<{}>", decode_type(read_i32(code, at)?)?),
        OpCode::PeekCheckType => {
            let (ty, depth) = decode_peek(read_i32(code, at)?)?;
            format!("<{}> depth {}", ty, depth)
        }
        OpCode::Loop => format!("x{} len {}", read_i32(code, at)?, read_i32(code, at + 4)?),
        OpCode::LoopNum => format!("len {}", read_i32(code, at)?),
        _ => String::new(),
    })
}
