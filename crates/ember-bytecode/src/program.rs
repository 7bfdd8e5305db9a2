//! The compiled form of a script, handed to a runtime.

use std::collections::BTreeMap;

use ember_syntax::types::ScriptType;
use serde::{Deserialize, Serialize};

/// Back end a compiled script targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RuntimeKind {
    #[default]
    Bytecode,
}

/// Declared type and local slot of an input variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InVarSlot {
    pub ty: ScriptType,
    pub slot: u8,
}

/// Immutable output of the compiler; share it across runtimes with `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledScript {
    pub name: String,
    pub runtime_kind: RuntimeKind,
    pub bytecode: Vec<u8>,
    pub string_pool: Vec<String>,
    pub locals_count: usize,
    pub max_stack_hint: usize,
    pub in_vars: BTreeMap<String, InVarSlot>,
}

impl CompiledScript {
    pub fn string(&self, index: u16) -> Option<&str> {
        self.string_pool.get(index as usize).map(String::as_str)
    }

    pub fn disassemble(&self) -> String {
        crate::disasm::disassemble(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::OpCode;

    #[test]
    fn test_serde_round_trip() {
        let mut in_vars = BTreeMap::new();
        in_vars.insert("n".to_string(), InVarSlot { ty: ScriptType::Long, slot: 0 });
        let script = CompiledScript {
            name: "demo".into(),
            runtime_kind: RuntimeKind::Bytecode,
            bytecode: vec![OpCode::PushNull as u8, OpCode::Return as u8],
            string_pool: vec!["hi".into()],
            locals_count: 1,
            max_stack_hint: 1,
            in_vars,
        };
        let json = serde_json::to_string(&script).unwrap();
        let back: CompiledScript = serde_json::from_str(&json).unwrap();
        assert_eq!(back, script);
        assert_eq!(back.string(0), Some("hi"));
        assert_eq!(back.string(1), None);
    }
}
