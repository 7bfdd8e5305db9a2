//! Ember compiler: source text -> bytecode.
//!
//! [`Compiler`] chains the tokenizer, parser, semantic analyzer and code
//! generator. The generator picks the unchecked numeric opcodes whenever the
//! analyzer proved both operands numeric, and the `NoRef` local opcodes for
//! variables that never hold a string or object.

mod builder;
pub mod compiler;

pub use compiler::Compiler;

use ember_bytecode::RuntimeKind;

/// Namespace imported by every script unless the host says otherwise.
pub const DEFAULT_USING: &str = "system";

#[derive(Debug, Clone, PartialEq)]
pub struct CompileOptions {
    pub name: String,
    pub runtime_kind: RuntimeKind,
    /// 0 disables the counted `Loop`/`LoopNum` opcodes.
    pub optimization_level: u8,
    /// Namespaces searched for unqualified static names.
    pub usings: Vec<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            name: "script".to_string(),
            runtime_kind: RuntimeKind::Bytecode,
            optimization_level: 1,
            usings: vec![DEFAULT_USING.to_string()],
        }
    }
}

impl CompileOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_optimization_level(mut self, level: u8) -> Self {
        self.optimization_level = level;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_bytecode::instruction::read_i32;
    use ember_bytecode::{CompiledScript, OpCode};
    use ember_host::stdlib::core_registry;
    use ember_syntax::error::{DiagnosticCode, Result};
    use ember_syntax::types::ScriptType;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn compile_with(src: &str, options: &CompileOptions) -> Result<CompiledScript> {
        let registry = Arc::new(core_registry().expect("core registry"));
        let mut compiler = Compiler::new(registry);
        compiler.set_src(src);
        compiler.compile(options)
    }

    fn compile(src: &str) -> CompiledScript {
        compile_with(src, &CompileOptions::default()).expect("compile should succeed")
    }

    fn opcodes(script: &CompiledScript) -> Vec<OpCode> {
        let mut ops = Vec::new();
        let mut pc = 0;
        while pc < script.bytecode.len() {
            let op = OpCode::from_byte(script.bytecode[pc]).expect("valid opcode");
            ops.push(op);
            pc += 1 + op.operand_size();
        }
        ops
    }

    #[test]
    fn test_numeric_fast_path_for_known_numbers() {
        let script = compile("var [x] = [10]\nvar [y] = [20]\nprint [x+y]");
        let ops = opcodes(&script);
        assert!(ops.contains(&OpCode::AddNum));
        assert!(!ops.contains(&OpCode::Add));
        assert!(ops.contains(&OpCode::SetLocNoRef));
        assert!(ops.contains(&OpCode::InvokeStatic));
        assert_eq!(ops.last(), Some(&OpCode::Exit));
        assert_eq!(script.locals_count, 2);
    }

    #[test]
    fn test_dynamic_operands_use_checked_ops() {
        let script = compile("in [a]\nvar [b] = [a] + [1]\nvar [c] = [a] < [2]");
        let ops = opcodes(&script);
        assert!(ops.contains(&OpCode::Add));
        assert!(ops.contains(&OpCode::Less));
        assert!(ops.contains(&OpCode::LoadLoc));
        assert_eq!(script.in_vars["a"].slot, 0);
        assert_eq!(script.in_vars["a"].ty, ScriptType::Dynamic);
    }

    #[test]
    fn test_string_variables_keep_ref_ops() {
        let ops = opcodes(&compile("var [s] = [\"a\"]\nvar [t] = [s] + [1]"));
        assert!(ops.contains(&OpCode::SetLoc));
        assert!(!ops.contains(&OpCode::SetLocNoRef));
    }

    #[test]
    fn test_literal_folding() {
        let ops = opcodes(&compile("var [x] = -[5]\nvar [b] = ![true]\nvar [p] = [math.pi]"));
        assert!(!ops.contains(&OpCode::NegNum));
        assert!(!ops.contains(&OpCode::Not));
        assert!(!ops.contains(&OpCode::GetStaticProperty));
        assert_eq!(ops.iter().filter(|o| **o == OpCode::PushDouble).count(), 1);
    }

    #[test]
    fn test_counted_loop_opcodes_follow_optimization_level() {
        let src = "loop [3]\n print [1]\nend";
        let fast = compile(src);
        assert_eq!(opcodes(&fast)[0], OpCode::Loop);
        assert_eq!(read_i32(&fast.bytecode, 1), Some(3));
        let slow = compile_with(src, &CompileOptions::default().with_optimization_level(0)).unwrap();
        assert!(!opcodes(&slow).contains(&OpCode::Loop));
        assert!(opcodes(&slow).contains(&OpCode::LessNum));

        let with_break = compile("loop [3]\n if [true]\n  break\n end\nend");
        assert!(!opcodes(&with_break).contains(&OpCode::Loop));

        let counted = compile("in [n]\nloop [n]\n print [n]\nend");
        let ops = opcodes(&counted);
        assert!(ops.contains(&OpCode::LoopNum));
        assert!(ops.contains(&OpCode::CheckType));
    }

    #[test]
    fn test_dynamic_arguments_are_guarded() {
        let ops = opcodes(&compile("in [d]\nvar [m] = [math.max [1] [d]]"));
        assert!(ops.contains(&OpCode::PeekCheckType));
        let ops = opcodes(&compile("var [m] = [math.max [1] [2]]"));
        assert!(!ops.contains(&OpCode::PeekCheckType));
    }

    #[test]
    fn test_short_circuit_uses_jumps() {
        let ops = opcodes(&compile("var [a] = [true]\nvar [b] = [a] and [false]"));
        assert!(ops.contains(&OpCode::JumpIfFalse));
        assert!(ops.contains(&OpCode::Jump));
        assert!(!ops.contains(&OpCode::Nop));
    }

    #[test]
    fn test_foreach_uses_iteration_protocol() {
        let ops = opcodes(&compile("using collections\nvar [l] = [new List]\nforeach [i] in [l]\n print [i]\nend"));
        assert!(ops.contains(&OpCode::New));
        assert!(ops.contains(&OpCode::GetProperty));
        assert!(ops.contains(&OpCode::Invoke));
        let ops = opcodes(&compile("in [l]\nforeach [i] in [l]\n print [i]\nend"));
        assert!(ops.contains(&OpCode::GetDynamicProperty));
        assert!(ops.contains(&OpCode::InvokeDynamic));
    }

    #[test]
    fn test_stack_hint_and_string_pool() {
        let script = compile("var [s] = [\"a\"] + [\"b\"] + [\"a\"]");
        assert_eq!(script.string_pool, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(script.max_stack_hint, 3);
    }

    #[test]
    fn test_stage_errors_stop_compilation() {
        let err = compile_with("var [x] = \"open", &CompileOptions::default()).unwrap_err();
        assert_eq!(err.code, DiagnosticCode::UnterminatedString);
        let err = compile_with("print [y]", &CompileOptions::default()).unwrap_err();
        assert_eq!(err.code, DiagnosticCode::UseBeforeDeclaration);
    }

    #[test]
    fn test_analyze_only() {
        let registry = Arc::new(core_registry().unwrap());
        let mut compiler = Compiler::new(registry);
        compiler.set_src("var [l] = [new List]");
        assert_eq!(compiler.analyze(&[]).unwrap_err().code, DiagnosticCode::InvalidType);
        assert!(compiler.analyze(&["collections".to_string()]).is_ok());
    }

    proptest! {
        #[test]
        fn prop_compilation_is_deterministic(values in prop::collection::vec(-1000i64..1000, 1..8)) {
            let mut src = String::new();
            for (i, v) in values.iter().enumerate() {
                src.push_str(&format!("var [v{}] = [\"s{}\"] + [{}] * [2]\n", i, i % 3, v));
            }
            let a = compile(&src);
            let b = compile(&src);
            prop_assert_eq!(a, b);
        }
    }
}
