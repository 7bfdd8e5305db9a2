//! Ember VM: executes compiled Ember bytecode.
//!
//! The machine is a stack of [`ScriptVar`] values plus a fixed set of local
//! slots. Strings and host objects live in a reference-counted table and are
//! addressed by handle. Instructions are dispatched through a table of
//! handler functions, one per opcode.
//!
//! ```rust,ignore
//! let mut runtime = Runtime::new(registry);
//! runtime.run_script(&script, &InVars::new())?;
//! println!("{:?}", runtime.returned_value());
//! ```

pub mod config;
pub mod error;
mod handlers;
pub mod listener;
mod machine;
pub mod refs;
pub mod runtime;
pub mod value;

pub use config::RuntimeConfig;
pub use error::{RuntimeError, RuntimeErrorCode, RuntimeResult, RuntimeWarning};
pub use listener::{CollectingListener, RuntimeListener, StdoutListener};
pub use runtime::{InVars, RunState, Runtime};
pub use value::ScriptVar;

#[cfg(test)]
mod tests {
    use super::*;
    use ember_bytecode::CompiledScript;
    use ember_compiler::{CompileOptions, Compiler};
    use ember_host::stdlib::{self, List};
    use ember_host::{HostTypeRegistry, RegistryBuilder, ScriptObject, Value};
    use ember_syntax::types::ScriptType;
    use proptest::prelude::*;
    use std::any::Any;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    fn compile_in(registry: &Arc<HostTypeRegistry>, src: &str, opt: u8) -> CompiledScript {
        let mut compiler = Compiler::new(Arc::clone(registry));
        compiler.set_src(src);
        compiler
            .compile(&CompileOptions::named("test").with_optimization_level(opt))
            .expect("compile should succeed")
    }

    fn core() -> Arc<HostTypeRegistry> {
        Arc::new(stdlib::core_registry().expect("core registry"))
    }

    fn run_with(
        registry: Arc<HostTypeRegistry>,
        src: &str,
        opt: u8,
        inputs: InVars,
    ) -> (Runtime<CollectingListener>, RuntimeResult<()>) {
        let script = compile_in(&registry, src, opt);
        let mut runtime = Runtime::with_listener(registry, RuntimeConfig::default(), CollectingListener::default());
        let result = runtime.run_script(&script, &inputs);
        (runtime, result)
    }

    fn printed(src: &str) -> Vec<String> {
        let (runtime, result) = run_with(core(), src, 1, InVars::new());
        result.expect("script should run");
        assert!(runtime.listener().warnings.is_empty(), "{:?}", runtime.listener().warnings);
        runtime.into_listener().printed
    }

    fn inputs(pairs: &[(&str, Value)]) -> InVars {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_addition_prints_sum() {
        assert_eq!(printed("Var [x]=[10]\nVar [y]=[20]\nPrint [x+y]"), vec!["30"]);
    }

    #[test]
    fn test_while_counts() {
        let out = printed("var [i] = [0]\nwhile [i] < [2]\n print [i]\n var [i]++\nend");
        assert_eq!(out, vec!["0", "1"]);
    }

    #[test]
    fn test_for_counts() {
        let out = printed("for var [i] = [0] [i] < [4] var [i]++\n print [i]\nend");
        assert_eq!(out, vec!["0", "1", "2", "3"]);
    }

    #[test]
    fn test_loop_runs_body_count_times_at_every_level() {
        for opt in [0, 1] {
            let (runtime, result) = run_with(core(), "loop [3]\n print [\"hi\"]\nend", opt, InVars::new());
            result.unwrap();
            assert_eq!(runtime.listener().printed, vec!["hi"; 3], "opt {}", opt);
        }
    }

    #[test]
    fn test_loop_with_break_and_dynamic_count() {
        let src = "in [n]\nvar [c] = [0]\nloop [n]\n var [c]++\n if [c] == [2]\n  break\n end\nend\nprint [c]";
        let (runtime, result) = run_with(core(), src, 1, inputs(&[("n", Value::Number(5.0))]));
        result.unwrap();
        assert_eq!(runtime.listener().printed, vec!["2"]);

        let (runtime, result) = run_with(core(), "in [n]\nloop [n]\n print [1]\nend", 1, inputs(&[("n", Value::Number(2.5))]));
        result.unwrap();
        assert_eq!(runtime.listener().printed.len(), 3);
    }

    #[test]
    fn test_string_assigned_in_branch_is_released() {
        let out = printed("var [s] = [\"a\"]\nif [true]\n var [s] = [\"b\"] + [s]\nend\nprint [s]");
        assert_eq!(out, vec!["ba"]);
    }

    #[test]
    fn test_return_value_and_inputs() {
        let (runtime, result) = run_with(core(), "in [A]\nreturn [a] * [2]", 1, inputs(&[("a", Value::Number(21.0))]));
        result.unwrap();
        assert_eq!(runtime.returned_value().as_number(), Some(42.0));
        assert_eq!(runtime.state(), RunState::Idle);
    }

    #[test]
    fn test_in_var_type_error() {
        let (runtime, result) = run_with(
            core(),
            "in <long> [n]\nprint [n]",
            1,
            inputs(&[("n", Value::Str("x".into()))]),
        );
        assert_eq!(result.unwrap_err().code, RuntimeErrorCode::InVarTypeError);
        assert_eq!(runtime.listener().errors.len(), 1);
        assert!(runtime.listener().printed.is_empty());
    }

    #[test]
    fn test_invalid_operation_reports_and_resets() {
        let (runtime, result) = run_with(core(), "in [a]\nvar [b] = [a] - [1]", 1, inputs(&[("a", Value::Str("x".into()))]));
        let err = result.unwrap_err();
        assert_eq!(err.code, RuntimeErrorCode::InvalidOperation);
        assert_eq!(err.header, "Runtime Error");
        assert!(runtime.listener().warnings.is_empty());
    }

    #[test]
    fn test_dynamic_foreach_over_list_input() {
        let list: Arc<dyn ScriptObject> = Arc::new(List::from_values(vec![
            Value::Number(1.0),
            Value::Str("two".into()),
        ]));
        let (runtime, result) = run_with(
            core(),
            "in [l]\nforeach [i] in [l]\n print [i]\nend",
            1,
            inputs(&[("l", Value::Object(list))]),
        );
        result.unwrap();
        assert_eq!(runtime.listener().printed, vec!["1", "two"]);
    }

    #[test]
    fn test_static_foreach_and_instance_calls() {
        let src = "using collections\nvar [l] = [new List]\n[l]:add [3]\n[l]:add [4]\nvar [t] = [0]\nforeach [i] in [l]\n var [t] += [i]\nend\nprint [t]";
        assert_eq!(printed(src), vec!["7"]);
    }

    #[test]
    fn test_stack_overflow() {
        let registry = core();
        let script = compile_in(&registry, "var [x] = [1] + [2]", 1);
        let config = RuntimeConfig {
            stack_capacity: 1,
            ..RuntimeConfig::default()
        };
        let mut runtime = Runtime::with_listener(registry, config, CollectingListener::default());
        let err = runtime.run_script(&script, &InVars::new()).unwrap_err();
        assert_eq!(err.code, RuntimeErrorCode::StackOverflow);
    }

    #[derive(Debug, Default)]
    struct Tracker {
        live: AtomicI32,
        acquired: AtomicI32,
    }

    impl ScriptObject for Tracker {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn on_acquire(&self) {
            self.live.fetch_add(1, Ordering::SeqCst);
            self.acquired.fetch_add(1, Ordering::SeqCst);
        }

        fn on_release(&self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn tracker_registry(tracker: Arc<Tracker>) -> Arc<HostTypeRegistry> {
        let mut builder = RegistryBuilder::new();
        stdlib::register(&mut builder).unwrap();
        let ty = builder.register_type::<Tracker>("test", "Tracker");
        builder.static_method("test", "Make", vec![], ScriptType::Object(ty), move |_, _| {
            Ok(Value::Object(tracker.clone()))
        });
        builder.static_method("test", "Keep", vec![ScriptType::Dynamic], ScriptType::Void, |_, _| {
            Ok(Value::Null)
        });
        Arc::new(builder.build())
    }

    #[test]
    fn test_object_references_balance() {
        let tracker = Arc::new(Tracker::default());
        let registry = tracker_registry(tracker.clone());
        let src = "using test\nvar [a] = [make]\nvar [b] = [a]\nkeep [b]\nvar [a] = [null]\nloop [2]\n var [c] = [make]\nend";
        let (runtime, result) = run_with(registry, src, 1, InVars::new());
        result.unwrap();
        assert!(runtime.listener().warnings.is_empty(), "{:?}", runtime.listener().warnings);
        assert_eq!(tracker.live.load(Ordering::SeqCst), 0);
        assert_eq!(tracker.acquired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_returned_object_outlives_run() {
        let tracker = Arc::new(Tracker::default());
        let registry = tracker_registry(tracker.clone());
        let (runtime, result) = run_with(registry, "using test\nreturn [make]", 1, InVars::new());
        result.unwrap();
        assert_eq!(tracker.live.load(Ordering::SeqCst), 0);
        let returned = runtime.returned_object().expect("object returned");
        assert!(returned.as_any().downcast_ref::<Tracker>().is_some());
    }

    #[test]
    fn test_runtime_is_reusable() {
        let registry = core();
        let script = compile_in(&registry, "in [a]\nprint [\"v\" + [a]]", 1);
        let mut runtime = Runtime::with_listener(registry, RuntimeConfig::default(), CollectingListener::default());
        runtime.run_script(&script, &inputs(&[("a", Value::Number(1.0))])).unwrap();
        runtime.run_script(&script, &inputs(&[("a", Value::Bool(true))])).unwrap();
        assert_eq!(runtime.listener().printed, vec!["v1", "vtrue"]);
    }

    #[test]
    fn test_type_name_reports_host_type() {
        let list: Arc<dyn ScriptObject> = Arc::new(List::default());
        let (runtime, result) = run_with(
            core(),
            "in [l]\nprint [typename [l]]\nprint [typename [1.5]]",
            1,
            inputs(&[("l", Value::Object(list))]),
        );
        result.unwrap();
        assert_eq!(runtime.listener().printed, vec!["collections.list", "double"]);
    }

    #[test]
    fn test_loop_local_after_zero_iterations() {
        let src = "in [n]\nloop [n]\n var [k] = [1]\nend\nreturn [k] + [1]";
        let (runtime, result) = run_with(core(), src, 1, inputs(&[("n", Value::Number(2.0))]));
        result.unwrap();
        assert_eq!(runtime.returned_value().as_number(), Some(2.0));

        let (runtime, result) = run_with(core(), src, 1, inputs(&[("n", Value::Number(0.0))]));
        assert_eq!(result.unwrap_err().code, RuntimeErrorCode::InvalidBytecode);
        assert!(runtime.listener().warnings.is_empty());
        assert!(runtime.returned_value().is_null());
    }

    fn eval(registry: &Arc<HostTypeRegistry>, src: &str, a: f64, b: f64) -> Value {
        let script = compile_in(registry, src, 1);
        let mut runtime = Runtime::with_listener(Arc::clone(registry), RuntimeConfig::default(), CollectingListener::default());
        runtime
            .run_script(&script, &inputs(&[("a", Value::Number(a)), ("b", Value::Number(b))]))
            .unwrap();
        runtime.returned_value().clone()
    }

    /// Equal values, with numbers compared bit for bit.
    fn same_value(x: &Value, y: &Value) -> bool {
        match (x, y) {
            (Value::Number(x), Value::Number(y)) => x.to_bits() == y.to_bits(),
            (x, y) => x == y,
        }
    }

    fn operand() -> impl Strategy<Value = f64> {
        prop_oneof![
            Just(0.0),
            Just(-0.0),
            (-1000i32..1000).prop_map(f64::from),
            -1.0e6f64..1.0e6f64,
        ]
    }

    fn statement() -> impl Strategy<Value = String> {
        prop_oneof![
            (0usize..3, 1i32..10).prop_map(|(op, n)| format!("var [x] = [x] {} [{}]", ["+", "-", "*"][op], n)),
            Just("print [x]".to_string()),
            Just("var [s] = [s] + [x]".to_string()),
            (0i32..50).prop_map(|n| format!("if [x] > [{}]\n print [s]\nend", n)),
            (0i32..4).prop_map(|n| format!("loop [{}]\n var [x] = [x] + [1]\nend", n)),
        ]
    }

    fn run_fresh(registry: &Arc<HostTypeRegistry>, src: &str, a: f64) -> (Vec<String>, Value) {
        let script = compile_in(registry, src, 1);
        let mut runtime = Runtime::with_listener(Arc::clone(registry), RuntimeConfig::default(), CollectingListener::default());
        runtime.run_script(&script, &inputs(&[("a", Value::Number(a))])).unwrap();
        let returned = runtime.returned_value().clone();
        (runtime.into_listener().printed, returned)
    }

    proptest! {
        #[test]
        fn numeric_opcodes_match_generic(a in operand(), b in operand(), op in 0usize..11) {
            let symbol = ["+", "-", "*", "/", "%", "<", "<=", ">", ">=", "==", "!="][op];
            let registry = core();
            let generic = eval(&registry, &format!("in [a]\nin [b]\nreturn [a] {} [b]", symbol), a, b);
            let numeric = eval(
                &registry,
                &format!("in <double> [a]\nin <double> [b]\nreturn [a] {} [b]", symbol),
                a,
                b,
            );
            prop_assert!(matches!(generic, Value::Number(_) | Value::Bool(_)), "{:?}", generic);
            prop_assert!(same_value(&generic, &numeric), "{} {} {}: {:?} vs {:?}", a, symbol, b, generic, numeric);
        }

        #[test]
        fn negation_opcodes_match(a in operand()) {
            let registry = core();
            let generic = eval(&registry, "in [a]\nin [b]\nreturn -[a]", a, 0.0);
            let numeric = eval(&registry, "in <double> [a]\nin [b]\nreturn -[a]", a, 0.0);
            prop_assert!(same_value(&generic, &numeric), "-{}: {:?} vs {:?}", a, generic, numeric);
        }

        #[test]
        fn repeated_runs_are_identical(body in prop::collection::vec(statement(), 1..12), a in -100i32..100) {
            let src = format!("in [a]\nvar [x] = [a]\nvar [s] = [\"s\"]\n{}\nreturn [x]", body.join("\n"));
            let registry = core();
            let (first_out, first_ret) = run_fresh(&registry, &src, f64::from(a));
            let (second_out, second_ret) = run_fresh(&registry, &src, f64::from(a));
            prop_assert_eq!(first_out, second_out);
            prop_assert!(same_value(&first_ret, &second_ret), "{:?} vs {:?}", first_ret, second_ret);
        }
    }
}
