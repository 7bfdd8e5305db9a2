//! Bytecode format for the Ember scripting language.
//!
//! This crate defines the instruction set, a writer used by the code
//! generator, the [`CompiledScript`] container executed by the VM, and a
//! disassembler.

pub mod disasm;
pub mod instruction;
pub mod program;
pub mod writer;

pub use disasm::disassemble;
pub use instruction::{OpCode, OPCODE_COUNT};
pub use program::{CompiledScript, InVarSlot, RuntimeKind};
pub use writer::{BytecodeWriter, Label, StringPool};
