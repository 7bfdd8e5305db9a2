//! Semantic analyzer for Ember scripts.
//!
//! The analyzer walks the parsed [`Script`] once (loops may be walked twice,
//! see [`Analyzer`]), checks declarations and operator types against the
//! static operator tables, resolves member names against a
//! [`HostTypeRegistry`], and records the inferred type of every expression
//! on the AST for the code generator.

pub mod analyzer;
pub mod context;
pub mod operators;
pub mod symbols;

pub use analyzer::{Analysis, Analyzer, InVarDecl};
pub use context::{FrameKind, TypeContext};
pub use symbols::{Symbol, SymbolTable};

use ember_host::HostTypeRegistry;
use ember_syntax::ast::Script;
use ember_syntax::error::Result;

/// Analyze `script` in place with the given default namespaces.
pub fn analyze(script: &mut Script, registry: &HostTypeRegistry, usings: &[String]) -> Result<Analysis> {
    Analyzer::new(registry, usings).analyze(script)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_host::stdlib::core_registry;
    use ember_host::{RegistryBuilder, Value};
    use ember_syntax::ast::*;
    use ember_syntax::error::DiagnosticCode;
    use ember_syntax::types::ScriptType;

    fn analyze_with(registry: &HostTypeRegistry, src: &str) -> Result<(Script, Analysis)> {
        let mut script = ember_parser::parse(src)?;
        let analysis = analyze(&mut script, registry, &["system".to_string()])?;
        Ok((script, analysis))
    }

    fn analyze_src(src: &str) -> Result<(Script, Analysis)> {
        let registry = core_registry().expect("core registry");
        analyze_with(&registry, src)
    }

    fn err_code(src: &str) -> DiagnosticCode {
        analyze_src(src).expect_err("analysis should fail").code
    }

    fn decl_type(script: &Script, index: usize) -> ScriptType {
        match &script.statements[index].kind {
            StmtKind::VarDecl { value, .. } => value.ty,
            other => panic!("Expected VarDecl, got {:?}", other),
        }
    }

    #[test]
    fn test_literal_addition_types() {
        let (script, _) = analyze_src("Var [x]=[10]\nVar [y]=[20]\nvar [z] = [x+y]\nvar [h] = [x / y]").unwrap();
        assert_eq!(decl_type(&script, 2), ScriptType::Long);
        assert_eq!(decl_type(&script, 3), ScriptType::Double);
    }

    #[test]
    fn test_static_call_resolution() {
        let (script, _) = analyze_src("Print [\"hi\"]\nvar [p] = [math.pi]").unwrap();
        match &script.statements[0].kind {
            StmtKind::Member { target, .. } => match &target.kind {
                ExprKind::Member(m) => assert!(matches!(m.binding, MemberBinding::Method(_))),
                other => panic!("Expected Member, got {:?}", other),
            },
            other => panic!("Expected Member stmt, got {:?}", other),
        }
        match &script.statements[1].kind {
            StmtKind::VarDecl { value, .. } => {
                assert_eq!(value.ty, ScriptType::Double);
                assert!(matches!(
                    &value.kind,
                    ExprKind::Member(MemberExpr { binding: MemberBinding::Const(Literal::Double(_)), .. })
                ));
            }
            other => panic!("Expected VarDecl, got {:?}", other),
        }
    }

    #[test]
    fn test_using_brings_namespace_into_scope() {
        assert_eq!(err_code("var [a] = [abs [-1]]"), DiagnosticCode::InvalidMember);
        let (script, analysis) = analyze_src("using math\nvar [a] = [abs [-1]]").unwrap();
        assert_eq!(decl_type(&script, 1), ScriptType::Double);
        assert!(analysis.usings.contains(&"math".to_string()));
    }

    #[test]
    fn test_use_before_declaration() {
        assert_eq!(err_code("print [x]"), DiagnosticCode::UseBeforeDeclaration);
        assert_eq!(err_code("var [x]++"), DiagnosticCode::UseBeforeDeclaration);
    }

    #[test]
    fn test_if_branch_declaration_is_dynamic_afterwards() {
        let src = "var [c] = [true]\nif [c] do\n var [s] = [\"text\"]\nend\nprint [s]\nvar [t] = [s]";
        let (script, analysis) = analyze_src(src).unwrap();
        assert_eq!(decl_type(&script, 3), ScriptType::Dynamic);
        assert!(analysis.symbols.may_hold_ref("s"));
    }

    #[test]
    fn test_if_branch_same_type_keeps_type() {
        let src = "var [n] = [1]\nif [n] > [0]\n var [n] = [2]\nelse\n var [n] = [\"x\"]\nend\nvar [m] = [n]";
        let (script, _) = analyze_src(src).unwrap();
        assert_eq!(decl_type(&script, 2), ScriptType::Dynamic);

        let src = "var [n] = [1]\nif [n] > [0]\n var [n] = [2]\nend\nvar [m] = [n]";
        let (script, _) = analyze_src(src).unwrap();
        assert_eq!(decl_type(&script, 2), ScriptType::Long);
    }

    #[test]
    fn test_loop_carried_widening() {
        let src = "var [x] = [1]\nwhile [x] < [10] do\n var [x] = [x] * [0.5]\nend\nvar [y] = [x]";
        let (script, _) = analyze_src(src).unwrap();
        match &script.statements[1].kind {
            StmtKind::While { cond, .. } => match &cond.kind {
                ExprKind::Binary { lhs, .. } => assert_eq!(lhs.ty, ScriptType::Dynamic),
                other => panic!("Expected Binary, got {:?}", other),
            },
            other => panic!("Expected While, got {:?}", other),
        }
        assert_eq!(decl_type(&script, 2), ScriptType::Double);
    }

    #[test]
    fn test_loop_retyping_carries_body_type_out() {
        let src = "var [x] = [1]\nwhile [false]\n var [x] = [\"s\"]\nend\nvar [y] = [x]";
        let (script, analysis) = analyze_src(src).unwrap();
        assert_eq!(decl_type(&script, 2), ScriptType::String);
        assert!(analysis.symbols.may_hold_ref("x"));
    }

    #[test]
    fn test_stable_loop_keeps_numeric_types() {
        let src = "for var [i] = [0] [i] < [5] var [i]++ do\n print [i]\nend\nvar [j] = [i]";
        let (script, analysis) = analyze_src(src).unwrap();
        match &script.statements[0].kind {
            StmtKind::For { cond, .. } => match &cond.kind {
                ExprKind::Binary { lhs, .. } => assert_eq!(lhs.ty, ScriptType::Long),
                other => panic!("Expected Binary, got {:?}", other),
            },
            other => panic!("Expected For, got {:?}", other),
        }
        assert_eq!(decl_type(&script, 1), ScriptType::Long);
        assert!(!analysis.symbols.may_hold_ref("i"));
    }

    #[test]
    fn test_loop_local_keeps_type_after_loop() {
        let src = "loop [3]\n var [k] = [1]\nend\nvar [after] = [k]";
        let (script, _) = analyze_src(src).unwrap();
        assert_eq!(decl_type(&script, 1), ScriptType::Long);
    }

    #[test]
    fn test_break_and_continue_need_a_loop() {
        assert_eq!(err_code("break"), DiagnosticCode::BreakOutsideLoop);
        assert_eq!(err_code("if [true]\n continue\nend"), DiagnosticCode::ContinueOutsideLoop);
        assert!(analyze_src("while [true]\n if [true]\n break\n end\nend").is_ok());
    }

    #[test]
    fn test_header_ordering() {
        assert_eq!(err_code("in [a]\nusing math"), DiagnosticCode::MisplacedDeclaration);
        assert_eq!(err_code("var [x] = [1]\nin [a]"), DiagnosticCode::MisplacedDeclaration);
        assert_eq!(err_code("in [a]\nin [a]"), DiagnosticCode::DuplicateInVar);
        assert_eq!(err_code("in <widget> [a]"), DiagnosticCode::InvalidType);
        let (_, analysis) = analyze_src("using collections\nin <long> [n]\nin <list> [items]\nin [any]").unwrap();
        assert_eq!(analysis.in_vars.len(), 3);
        assert_eq!(analysis.in_vars[0].ty, ScriptType::Long);
        assert!(matches!(analysis.in_vars[1].ty, ScriptType::Object(_)));
        assert_eq!(analysis.in_vars[2].ty, ScriptType::Dynamic);
    }

    #[test]
    fn test_operator_errors() {
        assert_eq!(err_code("var [x] = [\"a\"] - [1]"), DiagnosticCode::InvalidOperands);
        assert_eq!(err_code("var [x] = [1] and [true]"), DiagnosticCode::InvalidOperands);
        assert_eq!(err_code("var [x] = -[true]"), DiagnosticCode::InvalidOperands);
        assert_eq!(err_code("if [1]\nend"), DiagnosticCode::InvalidType);
        assert!(analyze_src("var [x] = [\"n=\"] + [1]").is_ok());
    }

    #[test]
    fn test_members_on_objects() {
        let (script, _) =
            analyze_src("using collections\nvar [l] = [new List]\n[l]:Add [1]\nvar [n] = [l:Count]").unwrap();
        assert_eq!(decl_type(&script, 3), ScriptType::Long);
        assert_eq!(
            err_code("using collections\nvar [l] = [new List]\n[l]:Nope"),
            DiagnosticCode::InvalidMember
        );
        assert_eq!(
            err_code("using collections\nvar [l] = [new List]\n[l]:Count = [3]"),
            DiagnosticCode::NotAssignable
        );
        assert_eq!(err_code("var [n] = [1]\n[n]:Count"), DiagnosticCode::InvalidMember);
    }

    #[test]
    fn test_dynamic_members() {
        let (script, _) = analyze_src("in [o]\n[o]:Anything [1]\nvar [v] = [o:Value]").unwrap();
        match &script.statements[1].kind {
            StmtKind::Member { target, .. } => match &target.kind {
                ExprKind::Member(m) => assert_eq!(m.binding, MemberBinding::Dynamic),
                other => panic!("Expected Member, got {:?}", other),
            },
            other => panic!("Expected Member stmt, got {:?}", other),
        }
        assert_eq!(decl_type(&script, 2), ScriptType::Dynamic);
    }

    #[test]
    fn test_argument_checks() {
        assert_eq!(err_code("var [m] = [math.max [1]]"), DiagnosticCode::ArgumentCount);
        assert_eq!(err_code("var [m] = [math.max [1] [\"x\"]]"), DiagnosticCode::ArgumentType);
        assert!(analyze_src("in [d]\nvar [m] = [math.max [1] [d]]").is_ok());
        assert_eq!(err_code("var [x] = [print [1]]"), DiagnosticCode::InvalidType);
    }

    #[test]
    fn test_ambiguous_match() {
        let mut b = RegistryBuilder::new();
        ember_host::stdlib::register(&mut b).unwrap();
        b.static_method("alpha", "Shared", vec![], ScriptType::Long, |_, _| Ok(Value::Number(1.0)));
        b.constant("beta", "Shared", Literal::Long(2));
        let registry = b.build();
        let err = analyze_with(&registry, "using alpha\nusing beta\nvar [x] = [shared]").unwrap_err();
        assert_eq!(err.code, DiagnosticCode::AmbiguousMatch);
        assert!(analyze_with(&registry, "using alpha\nusing beta\nvar [x] = [beta.shared]").is_ok());
    }

    #[test]
    fn test_foreach_iteration() {
        let (script, _) = analyze_src("using collections\nvar [l] = [new List]\nforeach [i] in [l]\n print [i]\nend").unwrap();
        assert!(matches!(
            &script.statements[2].kind,
            StmtKind::Foreach { iteration: IterationBinding::Static { .. }, .. }
        ));
        assert_eq!(err_code("foreach [i] in [5]\nend"), DiagnosticCode::NotIterable);
    }

    #[test]
    fn test_functions_and_casts_rejected() {
        assert_eq!(err_code("function f [a]\n return [a]\nend"), DiagnosticCode::FunctionsNotSupported);
        assert_eq!(err_code("var [x] = [1]\nvar [y] = <double> [x]"), DiagnosticCode::CastNotSupported);
    }

    #[test]
    fn test_variable_statement_errors() {
        assert_eq!(err_code("var [x] = [1]\nx = [2]"), DiagnosticCode::NotAssignable);
        assert_eq!(err_code("var [x] = [1]\nx"), DiagnosticCode::InvalidStatement);
    }
}
