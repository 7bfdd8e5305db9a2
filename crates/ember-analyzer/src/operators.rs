//! Static operator tables indexed by operand category.
//!
//! Rows are the left operand and columns the right operand, both in the
//! order `dynamic, null, bool, long, double, string, object`.

use ember_syntax::ast::{BinaryOp, UnaryOp};
use ember_syntax::types::ScriptType;

#[derive(Clone, Copy)]
enum R {
    /// invalid
    X,
    Dyn,
    Bool,
    Long,
    Dbl,
    Str,
}

use R::*;

const ADD: [[R; 7]; 7] = [
    [Dyn, Dyn, Dyn, Dyn, Dyn, Str, Dyn],
    [Dyn, X, X, X, X, Str, X],
    [Dyn, X, X, X, X, Str, X],
    [Dyn, X, X, Long, Dbl, Str, X],
    [Dyn, X, X, Dbl, Dbl, Str, X],
    [Str, Str, Str, Str, Str, Str, Str],
    [Dyn, X, X, X, X, Str, X],
];

// A dynamic operand that survives the runtime check is a number, so the
// result is typed double.
const ARITHMETIC: [[R; 7]; 7] = [
    [Dbl, X, X, Dbl, Dbl, X, X],
    [X, X, X, X, X, X, X],
    [X, X, X, X, X, X, X],
    [Dbl, X, X, Long, Dbl, X, X],
    [Dbl, X, X, Dbl, Dbl, X, X],
    [X, X, X, X, X, X, X],
    [X, X, X, X, X, X, X],
];

const COMPARE: [[R; 7]; 7] = [
    [Bool, X, X, Bool, Bool, X, X],
    [X, X, X, X, X, X, X],
    [X, X, X, X, X, X, X],
    [Bool, X, X, Bool, Bool, X, X],
    [Bool, X, X, Bool, Bool, X, X],
    [X, X, X, X, X, X, X],
    [X, X, X, X, X, X, X],
];

fn category(ty: ScriptType) -> Option<usize> {
    Some(match ty {
        ScriptType::Dynamic => 0,
        ScriptType::Null => 1,
        ScriptType::Bool => 2,
        ScriptType::Long => 3,
        ScriptType::Double => 4,
        ScriptType::String => 5,
        ScriptType::Object(_) => 6,
        ScriptType::Void => return None,
    })
}

fn lookup(table: &[[R; 7]; 7], lhs: ScriptType, rhs: ScriptType) -> Option<ScriptType> {
    let r = table[category(lhs)?][category(rhs)?];
    match r {
        X => None,
        Dyn => Some(ScriptType::Dynamic),
        Bool => Some(ScriptType::Bool),
        Long => Some(ScriptType::Long),
        Dbl => Some(ScriptType::Double),
        Str => Some(ScriptType::String),
    }
}

/// Result type of `lhs op rhs`, or `None` when the combination is invalid.
pub fn binary_result(op: BinaryOp, lhs: ScriptType, rhs: ScriptType) -> Option<ScriptType> {
    match op {
        BinaryOp::Add => lookup(&ADD, lhs, rhs),
        BinaryOp::Div => lookup(&ARITHMETIC, lhs, rhs).map(|t| match t {
            ScriptType::Long => ScriptType::Double,
            other => other,
        }),
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Mod => lookup(&ARITHMETIC, lhs, rhs),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => lookup(&COMPARE, lhs, rhs),
        BinaryOp::Eq | BinaryOp::Ne => {
            category(lhs)?;
            category(rhs)?;
            Some(ScriptType::Bool)
        }
        BinaryOp::And | BinaryOp::Or => {
            let ok = |t: ScriptType| matches!(t, ScriptType::Bool | ScriptType::Dynamic);
            (ok(lhs) && ok(rhs)).then_some(ScriptType::Bool)
        }
    }
}

pub fn unary_result(op: UnaryOp, operand: ScriptType) -> Option<ScriptType> {
    match (op, operand) {
        (UnaryOp::Neg, ScriptType::Long) => Some(ScriptType::Long),
        (UnaryOp::Neg, ScriptType::Double | ScriptType::Dynamic) => Some(ScriptType::Double),
        (UnaryOp::Not, ScriptType::Bool | ScriptType::Dynamic) => Some(ScriptType::Bool),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{binary_result, unary_result};
    use ember_syntax::ast::{BinaryOp, UnaryOp};
    use ember_syntax::types::ScriptType as T;

    #[test]
    fn test_add_table() {
        assert_eq!(binary_result(BinaryOp::Add, T::Long, T::Long), Some(T::Long));
        assert_eq!(binary_result(BinaryOp::Add, T::Long, T::Double), Some(T::Double));
        assert_eq!(binary_result(BinaryOp::Add, T::String, T::Bool), Some(T::String));
        assert_eq!(binary_result(BinaryOp::Add, T::Null, T::String), Some(T::String));
        assert_eq!(binary_result(BinaryOp::Add, T::Dynamic, T::Long), Some(T::Dynamic));
        assert_eq!(binary_result(BinaryOp::Add, T::Bool, T::Long), None);
    }

    #[test]
    fn test_arithmetic_table() {
        assert_eq!(binary_result(BinaryOp::Div, T::Long, T::Long), Some(T::Double));
        assert_eq!(binary_result(BinaryOp::Mod, T::Long, T::Long), Some(T::Long));
        assert_eq!(binary_result(BinaryOp::Mul, T::Dynamic, T::Long), Some(T::Double));
        assert_eq!(binary_result(BinaryOp::Sub, T::String, T::Long), None);
        assert_eq!(binary_result(BinaryOp::Sub, T::Void, T::Long), None);
    }

    #[test]
    fn test_compare_and_logic() {
        assert_eq!(binary_result(BinaryOp::Lt, T::Long, T::Double), Some(T::Bool));
        assert_eq!(binary_result(BinaryOp::Lt, T::String, T::String), None);
        assert_eq!(binary_result(BinaryOp::Eq, T::String, T::Long), Some(T::Bool));
        assert_eq!(binary_result(BinaryOp::And, T::Bool, T::Dynamic), Some(T::Bool));
        assert_eq!(binary_result(BinaryOp::Or, T::Bool, T::Long), None);
    }

    #[test]
    fn test_unary() {
        assert_eq!(unary_result(UnaryOp::Neg, T::Long), Some(T::Long));
        assert_eq!(unary_result(UnaryOp::Neg, T::Dynamic), Some(T::Double));
        assert_eq!(unary_result(UnaryOp::Not, T::Long), None);
    }
}
