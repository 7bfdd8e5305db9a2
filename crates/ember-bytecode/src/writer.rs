//! Append-only bytecode writer with forward labels and a string pool.

use std::collections::HashMap;

use ember_syntax::error::{error_at, DiagnosticCode, Result};

use crate::instruction::OpCode;

/// A jump target that may be bound after jumps to it are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug, Default)]
pub struct BytecodeWriter {
    code: Vec<u8>,
    labels: Vec<Option<usize>>,
    /// (operand position, label) pairs resolved by `finish`.
    patches: Vec<(usize, Label)>,
}

impl BytecodeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current byte offset; the position of the next emitted opcode.
    pub fn position(&self) -> usize {
        self.code.len()
    }

    pub fn emit(&mut self, op: OpCode) -> usize {
        let at = self.code.len();
        self.code.push(op as u8);
        at
    }

    pub fn emit_u8(&mut self, op: OpCode, operand: u8) {
        self.emit(op);
        self.code.push(operand);
    }

    pub fn emit_u16(&mut self, op: OpCode, operand: u16) {
        self.emit(op);
        self.code.extend_from_slice(&operand.to_le_bytes());
    }

    pub fn emit_u16_pair(&mut self, op: OpCode, a: u16, b: u16) {
        self.emit(op);
        self.code.extend_from_slice(&a.to_le_bytes());
        self.code.extend_from_slice(&b.to_le_bytes());
    }

    /// Emit an opcode with an i32 operand; returns the operand position for
    /// later patching.
    pub fn emit_i32(&mut self, op: OpCode, operand: i32) -> usize {
        self.emit(op);
        let at = self.code.len();
        self.code.extend_from_slice(&operand.to_le_bytes());
        at
    }

    pub fn emit_i32_pair(&mut self, op: OpCode, a: i32, b: i32) -> usize {
        let at = self.emit_i32(op, a);
        self.code.extend_from_slice(&b.to_le_bytes());
        at
    }

    pub fn emit_long(&mut self, value: i64) {
        self.emit(OpCode::PushLong);
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    pub fn emit_double(&mut self, value: f64) {
        self.emit(OpCode::PushDouble);
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the current position.
    pub fn mark(&mut self, label: Label) {
        self.labels[label.0] = Some(self.code.len());
    }

    /// Emit a jump to `label`, bound now or later.
    pub fn emit_jump(&mut self, op: OpCode, label: Label) {
        let at = self.emit_i32(op, 0);
        self.patches.push((at, label));
    }

    /// Overwrite an i32 operand written earlier.
    pub fn patch_i32(&mut self, at: usize, value: i32) {
        self.code[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Resolve every label reference and return the finished bytecode.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        let patches = std::mem::take(&mut self.patches);
        for (at, label) in patches {
            let Some(target) = self.labels[label.0] else {
                return error_at(DiagnosticCode::UnresolvedLabel, 0, format!("label {} was never bound", label.0));
            };
            let Ok(target) = i32::try_from(target) else {
                return error_at(DiagnosticCode::JumpOutOfRange, 0, format!("jump target {} out of range", target));
            };
            self.patch_i32(at, target);
        }
        Ok(self.code)
    }
}

/// Deduplicated string constants addressed by `u16` index.
#[derive(Debug, Default)]
pub struct StringPool {
    strings: Vec<String>,
    index: HashMap<String, u16>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, s: &str) -> Result<u16> {
        if let Some(&i) = self.index.get(s) {
            return Ok(i);
        }
        let Ok(i) = u16::try_from(self.strings.len()) else {
            return error_at(DiagnosticCode::TooManyStrings, 0, "string pool exceeds 65536 entries");
        };
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), i);
        Ok(i)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn into_strings(self) -> Vec<String> {
        self.strings
    }
}
