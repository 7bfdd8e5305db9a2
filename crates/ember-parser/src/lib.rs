pub mod parser;

pub use parser::Parser;

use ember_syntax::ast::Script;
use ember_syntax::error::Result;

/// Tokenize and parse `source` in one step.
pub fn parse(source: &str) -> Result<Script> {
    let tokens = ember_lexer::tokenize(source)?;
    Parser::new(tokens).parse_script()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_lexer::Lexer;
    use ember_syntax::ast::*;
    use ember_syntax::error::DiagnosticCode;

    fn parse_expr_str(input: &str) -> Expr {
        let mut lexer = Lexer::new(input);
        let tokens = lexer.tokenize().expect("Lexing should succeed");
        let mut parser = Parser::new(tokens);
        parser.parse_expr().expect("Parsing should succeed")
    }

    fn parse_script_str(input: &str) -> Script {
        parse(input).expect("Parsing should succeed")
    }

    fn parse_err(input: &str) -> DiagnosticCode {
        parse(input).expect_err("Parsing should fail").code
    }

    #[test]
    fn test_literal_expressions() {
        assert!(matches!(parse_expr_str("42").kind, ExprKind::Literal(Literal::Long(42))));
        assert!(matches!(parse_expr_str("2.5").kind, ExprKind::Literal(Literal::Double(d)) if d == 2.5));
        assert!(
            matches!(parse_expr_str("\"Hello\"").kind, ExprKind::Literal(Literal::String(s)) if s == "Hello")
        );
        assert!(matches!(parse_expr_str("true").kind, ExprKind::Literal(Literal::Bool(true))));
        assert!(matches!(parse_expr_str("null").kind, ExprKind::Literal(Literal::Null)));
    }

    #[test]
    fn test_identifier_and_static_call() {
        assert!(matches!(parse_expr_str("Counter").kind, ExprKind::Identifier(s) if s == "counter"));
        match parse_expr_str("math.max [1] [2]").kind {
            ExprKind::Member(m) => {
                assert!(m.target.is_none());
                assert_eq!(m.name, "math.max");
                assert_eq!(m.arg_count(), 2);
            }
            other => panic!("Expected Member, got {:?}", other),
        }
    }

    #[test]
    fn test_binary_is_right_associative() {
        match parse_expr_str("[1] - [2] - [3]").kind {
            ExprKind::Binary { op, lhs, rhs } => {
                assert_eq!(op, BinaryOp::Sub);
                assert!(matches!(lhs.kind, ExprKind::Literal(Literal::Long(1))));
                assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Sub, .. }));
            }
            other => panic!("Expected Binary, got {:?}", other),
        }
        // no precedence: `*` does not bind tighter than `+`
        match parse_expr_str("[2] * [3] + [1]").kind {
            ExprKind::Binary { op, .. } => assert_eq!(op, BinaryOp::Mul),
            other => panic!("Expected Binary, got {:?}", other),
        }
    }

    #[test]
    fn test_unary_and_logical() {
        assert!(matches!(parse_expr_str("-[x]").kind, ExprKind::Unary { op: UnaryOp::Neg, .. }));
        assert!(matches!(parse_expr_str("not [b]").kind, ExprKind::Unary { op: UnaryOp::Not, .. }));
        assert!(matches!(
            parse_expr_str("[a] and [b]").kind,
            ExprKind::Binary { op: BinaryOp::And, .. }
        ));
        assert!(matches!(
            parse_expr_str("[a] || [b]").kind,
            ExprKind::Binary { op: BinaryOp::Or, .. }
        ));
    }

    #[test]
    fn test_member_suffixes_and_constructor() {
        match parse_expr_str("new List:Count").kind {
            ExprKind::Member(m) => {
                assert_eq!(m.name, "count");
                assert!(m.args.is_none());
                assert!(matches!(
                    m.target.as_deref().map(|t| &t.kind),
                    Some(ExprKind::Constructor { .. })
                ));
            }
            other => panic!("Expected Member, got {:?}", other),
        }
        match parse_expr_str("[items]:GetItem [0]").kind {
            ExprKind::Member(m) => assert_eq!(m.arg_count(), 1),
            other => panic!("Expected Member, got {:?}", other),
        }
    }

    #[test]
    fn test_cast_expression() {
        assert!(matches!(parse_expr_str("<double> [x]").kind, ExprKind::Cast { type_name, .. } if type_name == "double"));
    }

    #[test]
    fn test_basic_statements() {
        let script = parse_script_str(
            "using math\nin <long> [limit]\nVar [x]=[10]\nvar [x] += [1]\nvar [x]++\nprint [x]\n",
        );
        assert_eq!(script.statements.len(), 6);
        assert!(matches!(&script.statements[0].kind, StmtKind::Using { namespace } if namespace == "math"));
        assert!(
            matches!(&script.statements[1].kind, StmtKind::In { name, type_name: Some(t), .. } if name == "limit" && t == "long")
        );
        assert!(matches!(&script.statements[2].kind, StmtKind::VarDecl { name, .. } if name == "x"));
        assert!(matches!(
            &script.statements[3].kind,
            StmtKind::VarAssign { op: AssignOp::Add, value: Some(_), .. }
        ));
        assert!(matches!(
            &script.statements[4].kind,
            StmtKind::VarAssign { op: AssignOp::Increment, value: None, .. }
        ));
        assert!(matches!(&script.statements[5].kind, StmtKind::Member { assign: None, .. }));
    }

    #[test]
    fn test_control_flow() {
        let script = parse_script_str(
            "if [x] < [1] do\n print [1]\nelseif [x] < [2]\n print [2]\nelse\n print [3]\nend\n\
             while [x] < [3] do\n var [x]++\nend\n\
             for var [i] = [0] [i] < [5] var [i]++ do\n continue\nend\n\
             foreach [item] in [list] do\n break\nend\n\
             loop [3]\n print [\"hi\"]\nend\n",
        );
        assert_eq!(script.statements.len(), 5);
        match &script.statements[0].kind {
            StmtKind::If { branches, else_body } => {
                assert_eq!(branches.len(), 2);
                assert!(else_body.is_some());
            }
            other => panic!("Expected If, got {:?}", other),
        }
        assert!(matches!(&script.statements[1].kind, StmtKind::While { body, .. } if body.len() == 1));
        assert!(matches!(&script.statements[2].kind, StmtKind::For { .. }));
        assert!(matches!(&script.statements[3].kind, StmtKind::Foreach { item, .. } if item == "item"));
        assert!(matches!(&script.statements[4].kind, StmtKind::Loop { .. }));
    }

    #[test]
    fn test_header_skips_line_ends() {
        let script = parse_script_str("while\n [x] < [3]\n do\n var [x]++\nend");
        assert_eq!(script.statements.len(), 1);
    }

    #[test]
    fn test_return_exit_function_and_property_set() {
        let script = parse_script_str(
            "function add [a] [b]\n return [a] + [b]\nend\n[obj]:Name = [\"x\"]\nreturn\nexit",
        );
        assert!(matches!(&script.statements[0].kind, StmtKind::Function { params, .. } if params.len() == 2));
        assert!(matches!(&script.statements[1].kind, StmtKind::Member { assign: Some(_), .. }));
        assert!(matches!(&script.statements[2].kind, StmtKind::Return(None)));
        assert!(matches!(&script.statements[3].kind, StmtKind::Exit));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_err("var [x] [1]"), DiagnosticCode::InvalidAssignment);
        assert_eq!(parse_err("var [x] = "), DiagnosticCode::UnexpectedEnd);
        assert_eq!(parse_err("while [x]\n print [x]\n"), DiagnosticCode::UnexpectedEnd);
        assert_eq!(parse_err("print [x] ]"), DiagnosticCode::ExpectedEndLine);
        assert_eq!(parse_err("[1] + [2]"), DiagnosticCode::InvalidStatement);
        assert_eq!(parse_err("print [x]:Count [1] = [2]"), DiagnosticCode::InvalidAssignment);
        assert_eq!(parse_err("var [1] = [2]"), DiagnosticCode::ExpectedIdentifier);
        assert_eq!(parse_err("end"), DiagnosticCode::InvalidStatement);
    }

    #[test]
    fn test_error_offsets() {
        let src = "var [x] = [1]\nvar [y] = ]";
        let err = parse(src).unwrap_err();
        assert_eq!(err.code, DiagnosticCode::ExpectedExpression);
        assert_eq!(err.offset, src.rfind(']').unwrap());
    }
}
