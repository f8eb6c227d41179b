use crate::ast::node::{BinaryOp, ExprKind, ExprNode, TermKind};
use crate::diag::Diagnostics;

/// Reduce a constant expression to an integer.
///
/// Supports integer literals and the five arithmetic operators. Any other
/// term, or a division or modulo by zero, is an error and folds to 0.
pub fn evaluate_const_expr(expr: &ExprNode<'_>, diag: &mut Diagnostics) -> i64 {
    match &expr.kind {
        ExprKind::Term(term) => match term.kind {
            TermKind::Int(value) => value,
            _ => {
                diag.error_at(expr.line, "Array size must be a constant expression");
                0
            }
        },
        ExprKind::Binary { op, left, right } => {
            let lhs = evaluate_const_expr(left, diag);
            let rhs = evaluate_const_expr(right, diag);
            match op {
                BinaryOp::Add => lhs.wrapping_add(rhs),
                BinaryOp::Subtract => lhs.wrapping_sub(rhs),
                BinaryOp::Multiply => lhs.wrapping_mul(rhs),
                BinaryOp::Divide => {
                    if rhs == 0 {
                        diag.error_at(expr.line, "Division by zero in array size");
                        0
                    } else {
                        lhs.wrapping_div(rhs)
                    }
                }
                BinaryOp::Modulo => {
                    if rhs == 0 {
                        diag.error_at(expr.line, "Division by zero in array size");
                        0
                    } else {
                        lhs.wrapping_rem(rhs)
                    }
                }
            }
        }
    }
}
