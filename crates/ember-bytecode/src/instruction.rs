//! Instruction set for Ember bytecode.
//!
//! Every instruction is one opcode byte followed by its operands, encoded
//! little-endian. Generic opcodes check operand types at runtime; the `Num`
//! forms assume both operands are numbers and are only emitted when the
//! compiler has proven it.

use ember_syntax::types::{HostTypeId, ScriptType};

macro_rules! opcodes {
    ($($name:ident = $byte:literal, $size:literal;)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum OpCode {
            $($name = $byte,)*
        }

        impl OpCode {
            pub fn from_byte(b: u8) -> Option<OpCode> {
                match b {
                    $($byte => Some(OpCode::$name),)*
                    _ => None,
                }
            }

            /// Size in bytes of the operands following the opcode.
            pub fn operand_size(self) -> usize {
                match self {
                    $(OpCode::$name => $size,)*
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(OpCode::$name => stringify!($name),)*
                }
            }
        }

        /// Number of opcodes; the dispatch table has this many entries.
        pub const OPCODE_COUNT: usize = [$(OpCode::$name),*].len();
    };
}

opcodes! {
    Nop = 0, 0;

    // Constants
    PushNull = 1, 0;
    PushTrue = 2, 0;
    PushFalse = 3, 0;
    PushLong = 4, 8;       // i64
    PushDouble = 5, 8;     // f64
    PushString = 6, 2;     // u16 pool index

    // Stack
    Pop = 7, 0;

    // Locals (u8 slot)
    LoadLoc = 8, 1;
    LoadLocNoRef = 9, 1;
    SetLoc = 10, 1;
    SetLocNoRef = 11, 1;

    // Arithmetic
    Add = 12, 0;
    Sub = 13, 0;
    Mul = 14, 0;
    Div = 15, 0;
    Mod = 16, 0;
    AddNum = 17, 0;
    SubNum = 18, 0;
    MulNum = 19, 0;
    DivNum = 20, 0;
    ModNum = 21, 0;

    // Comparisons
    Less = 22, 0;
    LessEq = 23, 0;
    Greater = 24, 0;
    GreaterEq = 25, 0;
    Equals = 26, 0;
    NotEquals = 27, 0;
    LessNum = 28, 0;
    LessEqNum = 29, 0;
    GreaterNum = 30, 0;
    GreaterEqNum = 31, 0;
    EqualsNum = 32, 0;
    NotEqualsNum = 33, 0;

    // Unary
    Neg = 34, 0;
    NegNum = 35, 0;
    Not = 36, 0;

    // Control flow (absolute byte offsets)
    Jump = 37, 4;
    JumpIfFalse = 38, 4;
    JumpIfTrue = 39, 4;

    // Host members
    Invoke = 40, 4;                // method id
    InvokeStatic = 41, 4;          // method id
    InvokeDynamic = 42, 4;         // u16 name, u16 argc
    GetProperty = 43, 4;           // property id
    SetProperty = 44, 4;
    GetStaticProperty = 45, 4;
    SetStaticProperty = 46, 4;
    GetDynamicProperty = 47, 2;    // u16 name
    SetDynamicProperty = 48, 2;
    New = 49, 4;                   // constructor id

    // Type guards
    CheckType = 50, 4;
    PeekCheckType = 51, 4;

    // Counted loops
    Loop = 52, 8;                  // i32 count, i32 body length
    LoopNum = 53, 4;               // i32 body length

    Return = 54, 0;
    Exit = 55, 0;
}

const KIND_DYNAMIC: u32 = 0;
const KIND_NULL: u32 = 1;
const KIND_BOOL: u32 = 2;
const KIND_LONG: u32 = 3;
const KIND_DOUBLE: u32 = 4;
const KIND_STRING: u32 = 5;
const KIND_OBJECT: u32 = 6;

/// Encode a type check operand: bits 0-7 hold the kind, bits 8-23 the host
/// type id. Host type ids above `u16::MAX` cannot be encoded.
pub fn encode_type(ty: ScriptType) -> Option<i32> {
    let code = match ty {
        ScriptType::Dynamic | ScriptType::Void => KIND_DYNAMIC,
        ScriptType::Null => KIND_NULL,
        ScriptType::Bool => KIND_BOOL,
        ScriptType::Long => KIND_LONG,
        ScriptType::Double => KIND_DOUBLE,
        ScriptType::String => KIND_STRING,
        ScriptType::Object(HostTypeId(id)) => {
            if id > u16::MAX as u32 {
                return None;
            }
            KIND_OBJECT | (id << 8)
        }
    };
    Some(code as i32)
}

pub fn decode_type(code: i32) -> Option<ScriptType> {
    let code = code as u32;
    Some(match code & 0xFF {
        KIND_DYNAMIC => ScriptType::Dynamic,
        KIND_NULL => ScriptType::Null,
        KIND_BOOL => ScriptType::Bool,
        KIND_LONG => ScriptType::Long,
        KIND_DOUBLE => ScriptType::Double,
        KIND_STRING => ScriptType::String,
        KIND_OBJECT => ScriptType::Object(HostTypeId((code >> 8) & 0xFFFF)),
        _ => return None,
    })
}

/// Encode a `PeekCheckType` operand: a type check plus the stack depth of
/// the checked value (0 = top) in bits 24-31.
pub fn encode_peek(ty: ScriptType, depth: u8) -> Option<i32> {
    let base = encode_type(ty)? as u32;
    Some((base | ((depth as u32) << 24)) as i32)
}

pub fn decode_peek(code: i32) -> Option<(ScriptType, u8)> {
    let depth = ((code as u32) >> 24) as u8;
    let ty = decode_type(((code as u32) & 0x00FF_FFFF) as i32)?;
    Some((ty, depth))
}

/// Little-endian operand readers. `None` means the bytecode is truncated.
pub fn read_u8(code: &[u8], at: usize) -> Option<u8> {
    code.get(at).copied()
}

pub fn read_u16(code: &[u8], at: usize) -> Option<u16> {
    let b = code.get(at..at + 2)?;
    Some(u16::from_le_bytes([b[0], b[1]]))
}

pub fn read_i32(code: &[u8], at: usize) -> Option<i32> {
    let b = code.get(at..at + 4)?;
    Some(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

pub fn read_i64(code: &[u8], at: usize) -> Option<i64> {
    let b: [u8; 8] = code.get(at..at + 8)?.try_into().ok()?;
    Some(i64::from_le_bytes(b))
}

pub fn read_f64(code: &[u8], at: usize) -> Option<f64> {
    let b: [u8; 8] = code.get(at..at + 8)?.try_into().ok()?;
    Some(f64::from_le_bytes(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_bytes_round_trip() {
        for b in 0..OPCODE_COUNT as u8 {
            let op = OpCode::from_byte(b).expect("dense opcode numbering");
            assert_eq!(op as u8, b);
        }
        assert_eq!(OpCode::from_byte(OPCODE_COUNT as u8), None);
        assert_eq!(OpCode::Loop.operand_size(), 8);
        assert_eq!(OpCode::InvokeDynamic.name(), "InvokeDynamic");
    }

    #[test]
    fn test_type_codes() {
        let list = ScriptType::Object(HostTypeId(3));
        assert_eq!(decode_type(encode_type(list).unwrap()), Some(list));
        assert_eq!(encode_type(ScriptType::Long), Some(3));
        assert_eq!(encode_type(ScriptType::Object(HostTypeId(70_000))), None);
        assert_eq!(decode_peek(encode_peek(list, 2).unwrap()), Some((list, 2)));
        assert_eq!(decode_peek(encode_peek(ScriptType::String, 200).unwrap()), Some((ScriptType::String, 200)));
    }
}
