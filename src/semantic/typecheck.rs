use crate::ast::node::{
    ExprKind, ExprNode, InstrKind, InstrNode, LoopKind, MatchPattern, RelNode, TermKind, TermNode,
};
use crate::diag::Diagnostics;
use crate::symbols::{FnTable, SymbolTable, Type};

use super::resolve_variable;

/// The type of a term.
///
/// Identifiers resolve through the chain `{innermost scope -> enclosing
/// globals}`. An unresolved identifier types as `Void` without a diagnostic
/// here; the variable pass has already reported it, and `Void` suppresses
/// follow-on mismatch noise.
pub(super) fn term_type<'a>(
    term: &TermNode<'a>,
    variables: &SymbolTable,
    globals: Option<&SymbolTable>,
    functions: &FnTable<'a>,
    diag: &mut Diagnostics,
) -> Type {
    match &term.kind {
        TermKind::Int(_) => Type::Int,
        TermKind::Char(_) => Type::Char,
        TermKind::Str(_) => Type::String,
        TermKind::Identifier(name) => resolve_variable(name, variables, globals)
            .map(|v| v.ty)
            .unwrap_or(Type::Void),
        TermKind::Deref(_) | TermKind::AddressOf(_) => Type::Pointer,
        TermKind::ArrayAccess { array, index } => {
            let array_type = resolve_variable(array, variables, globals)
                .map(|v| v.ty)
                .unwrap_or(Type::Void);
            let index_type = expr_type(index, variables, globals, functions, diag);
            if index_type != Type::Int && index_type != Type::Void {
                diag.error_at(
                    term.line,
                    format!("Array index must be of type int, got {}", index_type),
                );
            }
            array_type
        }
        TermKind::ArrayLiteral(_) => {
            diag.error_at(term.line, "Array literal cannot be used in expressions");
            Type::Void
        }
        TermKind::Call { name, .. } => match functions.lookup(name) {
            None => Type::Void,
            Some(f) if f.return_types.is_empty() => {
                diag.error_at(
                    term.line,
                    format!(
                        "Function '{}' has no return value but is used in expression",
                        name
                    ),
                );
                Type::Void
            }
            Some(f) => f.return_types[0],
        },
    }
}

/// The type of an expression.
///
/// Binary arithmetic requires both operands to share a type; pointer
/// participation is permitted and yields pointer.
pub(super) fn expr_type<'a>(
    expr: &ExprNode<'a>,
    variables: &SymbolTable,
    globals: Option<&SymbolTable>,
    functions: &FnTable<'a>,
    diag: &mut Diagnostics,
) -> Type {
    match &expr.kind {
        ExprKind::Term(term) => term_type(term, variables, globals, functions, diag),
        ExprKind::Binary { left, right, .. } => {
            let lhs = expr_type(left, variables, globals, functions, diag);
            let rhs = expr_type(right, variables, globals, functions, diag);
            if lhs == Type::Pointer || rhs == Type::Pointer {
                Type::Pointer
            } else if lhs == Type::Void || rhs == Type::Void {
                if lhs == Type::Void {
                    rhs
                } else {
                    lhs
                }
            } else if lhs != rhs {
                diag.error_at(
                    expr.line,
                    format!("Type mismatch in arithmetic expression: {} vs {}", lhs, rhs),
                );
                lhs
            } else {
                lhs
            }
        }
    }
}

pub(super) fn rel_typecheck<'a>(
    rel: &RelNode<'a>,
    variables: &SymbolTable,
    globals: Option<&SymbolTable>,
    functions: &FnTable<'a>,
    diag: &mut Diagnostics,
) {
    let lhs = term_type(&rel.lhs, variables, globals, functions, diag);
    let rhs = term_type(&rel.rhs, variables, globals, functions, diag);
    if lhs != rhs && lhs != Type::Void && rhs != Type::Void {
        diag.error_at(
            rel.line,
            format!("Type mismatch in conditional statement: {} vs {}", lhs, rhs),
        );
    }
}

/// Validity of one call site: callee exists, argument count matches, and
/// argument types match position-by-position, except that a declared
/// pointer parameter accepts any argument.
pub(super) fn check_function_call<'a>(
    name: &str,
    args: &[ExprNode<'a>],
    variables: &SymbolTable,
    globals: Option<&SymbolTable>,
    functions: &FnTable<'a>,
    diag: &mut Diagnostics,
    line: usize,
) {
    let Some(f) = functions.lookup(name) else {
        diag.error_at(line, format!("Call to undeclared function: {}", name));
        return;
    };

    let arity_ok = if f.is_variadic {
        args.len() >= f.params.len()
    } else {
        args.len() == f.params.len()
    };
    if !arity_ok {
        diag.error_at(
            line,
            format!(
                "Function '{}' expects {} arguments, but {} were provided",
                name,
                f.params.len(),
                args.len()
            ),
        );
        return;
    }

    for (i, (arg, param)) in args.iter().zip(f.params.iter()).enumerate() {
        let arg_type = expr_type(arg, variables, globals, functions, diag);
        if arg_type != param.ty && param.ty != Type::Pointer && arg_type != Type::Void {
            diag.error_at(
                line,
                format!(
                    "Type mismatch in argument {} to function '{}': expected {}, got {}",
                    i + 1,
                    name,
                    param.ty,
                    arg_type
                ),
            );
        }
    }
}

/// Leaf-level type checking of one instruction. Nested blocks are driven by
/// the variable pass, which calls back in for each child.
pub(super) fn instr_typecheck<'a>(
    instr: &InstrNode<'a>,
    variables: &SymbolTable,
    globals: Option<&SymbolTable>,
    functions: &FnTable<'a>,
    diag: &mut Diagnostics,
) {
    match &instr.kind {
        InstrKind::Initialize { var, expr } => {
            let target_type = var.ty;
            let expr_result = expr_type(expr, variables, globals, functions, diag);
            // The analyzer refuses to narrow pointer targets
            if target_type == Type::Pointer {
                return;
            }
            if target_type != expr_result && expr_result != Type::Void {
                diag.error_at(
                    instr.line,
                    format!(
                        "Type mismatch in initialization to {} - {} to {}",
                        var.name, expr_result, target_type
                    ),
                );
            }
        }

        InstrKind::InitializeArray { var, elements, .. } => {
            for (i, elem) in elements.iter().enumerate() {
                let elem_type = expr_type(elem, variables, globals, functions, diag);
                if var.ty != elem_type && var.ty != Type::Pointer && elem_type != Type::Void {
                    diag.error_at(
                        instr.line,
                        format!(
                            "Type mismatch in array initialization - element {} is {} but array is {}",
                            i, elem_type, var.ty
                        ),
                    );
                }
            }
        }

        InstrKind::Assign { target, expr } => {
            let target_type = if target.ty == Type::Pointer {
                Type::Pointer
            } else {
                resolve_variable(target.name, variables, globals)
                    .map(|v| v.ty)
                    .unwrap_or(Type::Void)
            };
            let expr_result = expr_type(expr, variables, globals, functions, diag);
            if target_type == Type::Pointer || target_type == Type::Void {
                return;
            }
            if target_type != expr_result && expr_result != Type::Void {
                diag.error_at(
                    instr.line,
                    format!(
                        "Type mismatch in assignment to {} - {} to {}",
                        target.name, expr_result, target_type
                    ),
                );
            }
        }

        InstrKind::AssignToSubscript { array, index, expr } => {
            let array_type = resolve_variable(array.name, variables, globals)
                .map(|v| v.ty)
                .unwrap_or(Type::Void);

            let index_type = expr_type(index, variables, globals, functions, diag);
            if index_type != Type::Int && index_type != Type::Void {
                diag.error_at(
                    instr.line,
                    format!("Array index must be of type int, got {}", index_type),
                );
            }

            let expr_result = expr_type(expr, variables, globals, functions, diag);
            if array_type != expr_result
                && array_type != Type::Pointer
                && array_type != Type::Void
                && expr_result != Type::Void
            {
                diag.error_at(
                    instr.line,
                    format!(
                        "Type mismatch in array assignment to {} - {} to {}",
                        array.name, expr_result, array_type
                    ),
                );
            }
        }

        InstrKind::If { rel, .. } => rel_typecheck(rel, variables, globals, functions, diag),

        InstrKind::Loop(loop_node) => match &loop_node.kind {
            LoopKind::While(rel) | LoopKind::DoWhile(rel) => {
                rel_typecheck(rel, variables, globals, functions, diag)
            }
            LoopKind::For { start, end, .. } => {
                for bound in [start, end] {
                    let bound_type = expr_type(bound, variables, globals, functions, diag);
                    if bound_type != Type::Int && bound_type != Type::Void {
                        diag.error_at(
                            instr.line,
                            format!("For loop bounds must be of type int, got {}", bound_type),
                        );
                    }
                }
            }
            LoopKind::Unconditional => {}
        },

        InstrKind::Match { expr, cases } => {
            let subject = expr_type(expr, variables, globals, functions, diag);
            for case in *cases {
                match &case.pattern {
                    MatchPattern::Values(values) => {
                        for value in *values {
                            let value_type =
                                expr_type(value, variables, globals, functions, diag);
                            if value_type != subject
                                && value_type != Type::Void
                                && subject != Type::Void
                            {
                                diag.error_at(
                                    value.line,
                                    format!(
                                        "Match case type mismatch: {} vs {}",
                                        value_type, subject
                                    ),
                                );
                            }
                        }
                    }
                    MatchPattern::Range { start, end } => {
                        for bound in [start, end] {
                            let bound_type =
                                expr_type(bound, variables, globals, functions, diag);
                            if bound_type != subject
                                && bound_type != Type::Void
                                && subject != Type::Void
                            {
                                diag.error_at(
                                    bound.line,
                                    format!(
                                        "Match range type mismatch: {} vs {}",
                                        bound_type, subject
                                    ),
                                );
                            }
                        }
                    }
                    MatchPattern::Default => {}
                }
            }
        }

        _ => {}
    }
}
