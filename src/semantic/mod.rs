use crate::ast::node::{
    ExprNode, FnBody, FnNode, InstrKind, InstrNode, LoopKind, MatchPattern, RelNode, TermKind,
    TermNode, VarDecl,
};
use crate::ast::Ast;
use crate::diag::Diagnostics;
use crate::symbols::{ArrayShape, FnKind, FnTable, Function, SymbolTable, Type, Variable};

mod fold;
mod typecheck;

#[cfg(test)]
mod tests;

pub use fold::evaluate_const_expr;
use typecheck::{check_function_call, expr_type, instr_typecheck};

/// Look a name up through the resolution chain: the innermost scope's
/// table first, then the enclosing globals.
pub(super) fn resolve_variable<'s>(
    name: &str,
    table: &'s SymbolTable,
    globals: Option<&'s SymbolTable>,
) -> Option<&'s Variable> {
    table
        .lookup(name)
        .or_else(|| globals.and_then(|g| g.lookup(name)))
}

/// Run all semantic passes over a parsed program.
///
/// In order: function registration (so forward references resolve), the
/// global pass over top-level instructions, the per-function pass over each
/// defined body, and the label pass. Variables receive their stack slots
/// here; the backend relies on the resulting tables without re-walking the
/// tree.
pub fn check_semantics<'a>(
    program: &Ast<'a>,
    globals: &mut SymbolTable,
    functions: &mut FnTable<'a>,
    diag: &mut Diagnostics,
) {
    for instr in &program.instrs {
        if let InstrKind::Fn(fn_node) = &instr.kind {
            register_function(fn_node, functions, diag);
        }
    }

    // Validate everything in source order: a global is only visible to
    // function bodies that follow its declaration.
    let mut offset = 0usize;
    for instr in &program.instrs {
        match &instr.kind {
            InstrKind::Fn(fn_node) => {
                if let FnBody::Defined(body) = fn_node.body {
                    let locals = check_function_body(fn_node, body, globals, functions, diag);
                    if let Some(f) = functions.lookup_mut(fn_node.name) {
                        f.locals = locals;
                    }
                }
            }
            _ => {
                instr_check_variables(instr, globals, None, functions, &mut offset, diag);
                instr_typecheck(instr, globals, None, functions, diag);
            }
        }
    }

    // Labels resolve within their own function; the top level is its own
    // goto scope.
    check_labels_in(&program.instrs, diag);
    for instr in &program.instrs {
        if let InstrKind::Fn(FnNode {
            body: FnBody::Defined(body),
            ..
        }) = instr.kind
        {
            check_labels_in(body, diag);
        }
    }
}

/// Insert a function into the table, enforcing signature agreement.
///
/// A name may be declared many times; a second definition is an error. The
/// signature must match across declaration and definition: parameter count,
/// parameter types modulo pointer-compatibility, return-type count.
fn register_function<'a>(fn_node: &FnNode<'a>, functions: &mut FnTable<'a>, diag: &mut Diagnostics) {
    let kind = match fn_node.body {
        FnBody::Declared => FnKind::Declared,
        FnBody::Defined(_) => FnKind::Defined,
    };

    if let Some(existing) = functions.lookup(fn_node.name) {
        if kind == FnKind::Defined && existing.kind == FnKind::Defined {
            diag.error(format!("Duplicate function definition: {}", fn_node.name));
            return;
        }

        if existing.params.len() != fn_node.params.len() {
            diag.error(format!(
                "Function '{}' parameter count mismatch: declared with {}, but has {}",
                fn_node.name,
                existing.params.len(),
                fn_node.params.len()
            ));
        }
        for (declared, param) in existing.params.iter().zip(fn_node.params.iter()) {
            if declared.ty != param.ty
                && declared.ty != Type::Pointer
                && param.ty != Type::Pointer
            {
                diag.error(format!(
                    "Function '{}' parameter '{}' type mismatch: {} vs {}",
                    fn_node.name, param.name, declared.ty, param.ty
                ));
            }
        }
        if existing.return_types.len() != fn_node.return_types.len() {
            diag.error(format!(
                "Function '{}' return type count mismatch",
                fn_node.name
            ));
        }

        // Re-declaration is idempotent; a definition replaces a declaration
        if kind == FnKind::Declared {
            return;
        }
    }

    let params = fn_node
        .params
        .iter()
        .enumerate()
        .map(|(i, p)| Variable {
            ty: p.ty,
            name: p.name.to_string(),
            line: p.line,
            stack_offset: i,
            array: None,
        })
        .collect();

    functions.insert(Function {
        name: fn_node.name.to_string(),
        kind,
        params,
        return_types: fn_node.return_types.to_vec(),
        is_variadic: fn_node.is_variadic,
        body: match fn_node.body {
            FnBody::Defined(body) => Some(body),
            FnBody::Declared => None,
        },
        locals: SymbolTable::new(),
    });
}

/// Register a scalar declaration and advance the scope's slot counter.
fn declare_variable(var: &VarDecl<'_>, table: &mut SymbolTable, offset: &mut usize) {
    if table.contains(var.name) {
        return;
    }
    table.declare(Variable {
        ty: var.ty,
        name: var.name.to_string(),
        line: var.line,
        stack_offset: *offset,
        array: None,
    });
    *offset += 1;
}

/// Register an array declaration; it consumes as many slots as its folded
/// element count.
fn declare_array(
    var: &VarDecl<'_>,
    size: &ExprNode<'_>,
    table: &mut SymbolTable,
    offset: &mut usize,
    diag: &mut Diagnostics,
) {
    if table.contains(var.name) {
        return;
    }
    let folded = fold::evaluate_const_expr(size, diag);
    let count = if folded < 0 { 0 } else { folded as usize };
    table.declare(Variable {
        ty: var.ty,
        name: var.name.to_string(),
        line: var.line,
        stack_offset: *offset,
        array: Some(ArrayShape {
            dimension_sizes: vec![count],
        }),
    });
    *offset += count;
}

fn term_check_variables<'a>(
    term: &TermNode<'a>,
    table: &SymbolTable,
    globals: Option<&SymbolTable>,
    functions: &FnTable<'a>,
    diag: &mut Diagnostics,
) {
    match &term.kind {
        TermKind::Identifier(name) | TermKind::Deref(name) | TermKind::AddressOf(name) => {
            if resolve_variable(name, table, globals).is_none() {
                diag.error_at(term.line, format!("Use of undeclared variable: {}", name));
            }
        }
        TermKind::ArrayAccess { array, index } => {
            if resolve_variable(array, table, globals).is_none() {
                diag.error_at(term.line, format!("Use of undeclared array: {}", array));
            }
            expr_check_variables(index, table, globals, functions, diag);
        }
        TermKind::ArrayLiteral(elements) => {
            for elem in *elements {
                expr_check_variables(elem, table, globals, functions, diag);
            }
        }
        TermKind::Call { name, args } => {
            for arg in *args {
                expr_check_variables(arg, table, globals, functions, diag);
            }
            check_function_call(name, args, table, globals, functions, diag, term.line);
        }
        TermKind::Int(_) | TermKind::Char(_) | TermKind::Str(_) => {}
    }
}

fn expr_check_variables<'a>(
    expr: &ExprNode<'a>,
    table: &SymbolTable,
    globals: Option<&SymbolTable>,
    functions: &FnTable<'a>,
    diag: &mut Diagnostics,
) {
    match &expr.kind {
        crate::ast::node::ExprKind::Term(term) => {
            term_check_variables(term, table, globals, functions, diag)
        }
        crate::ast::node::ExprKind::Binary { left, right, .. } => {
            expr_check_variables(left, table, globals, functions, diag);
            expr_check_variables(right, table, globals, functions, diag);
        }
    }
}

fn rel_check_variables<'a>(
    rel: &RelNode<'a>,
    table: &SymbolTable,
    globals: Option<&SymbolTable>,
    functions: &FnTable<'a>,
    diag: &mut Diagnostics,
) {
    term_check_variables(&rel.lhs, table, globals, functions, diag);
    term_check_variables(&rel.rhs, table, globals, functions, diag);
}

/// The variable pass over one instruction.
///
/// Declarations insert into the nearest enclosing scope's table; nested
/// blocks share that table, so a name declared anywhere in the function is
/// visible throughout it. References resolve against the table first, then
/// the enclosing globals. Children of nested blocks get both passes from
/// here.
fn instr_check_variables<'a>(
    instr: &InstrNode<'a>,
    table: &mut SymbolTable,
    globals: Option<&SymbolTable>,
    functions: &FnTable<'a>,
    offset: &mut usize,
    diag: &mut Diagnostics,
) {
    match &instr.kind {
        InstrKind::Declare(var) => declare_variable(var, table, offset),

        InstrKind::Initialize { var, expr } => {
            expr_check_variables(expr, table, globals, functions, diag);
            declare_variable(var, table, offset);
        }

        InstrKind::DeclareArray { var, size } => declare_array(var, size, table, offset, diag),

        InstrKind::InitializeArray {
            var,
            size,
            elements,
        } => {
            declare_array(var, size, table, offset, diag);
            for elem in *elements {
                expr_check_variables(elem, table, globals, functions, diag);
            }
        }

        InstrKind::Assign { target, expr } => {
            if resolve_variable(target.name, table, globals).is_none() {
                diag.error_at(
                    instr.line,
                    format!("Use of undeclared variable: {}", target.name),
                );
            }
            expr_check_variables(expr, table, globals, functions, diag);
        }

        InstrKind::AssignToSubscript { array, index, expr } => {
            if resolve_variable(array.name, table, globals).is_none() {
                diag.error_at(
                    array.line,
                    format!("Use of undeclared array: {}", array.name),
                );
            }
            expr_check_variables(index, table, globals, functions, diag);
            expr_check_variables(expr, table, globals, functions, diag);
        }

        InstrKind::If { rel, then, else_ } => {
            rel_check_variables(rel, table, globals, functions, diag);
            for child in then.instrs() {
                instr_check_variables(child, table, globals, functions, offset, diag);
                instr_typecheck(child, table, globals, functions, diag);
            }
            if let Some(else_block) = else_ {
                for child in else_block.instrs() {
                    instr_check_variables(child, table, globals, functions, offset, diag);
                    instr_typecheck(child, table, globals, functions, diag);
                }
            }
        }

        InstrKind::Match { expr, cases } => {
            expr_check_variables(expr, table, globals, functions, diag);
            for case in *cases {
                match &case.pattern {
                    MatchPattern::Values(values) => {
                        for value in *values {
                            expr_check_variables(value, table, globals, functions, diag);
                        }
                    }
                    MatchPattern::Range { start, end } => {
                        expr_check_variables(start, table, globals, functions, diag);
                        expr_check_variables(end, table, globals, functions, diag);
                    }
                    MatchPattern::Default => {}
                }
                for child in case.body.instrs() {
                    instr_check_variables(child, table, globals, functions, offset, diag);
                    instr_typecheck(child, table, globals, functions, diag);
                }
            }
        }

        InstrKind::Loop(loop_node) => {
            match &loop_node.kind {
                LoopKind::While(rel) | LoopKind::DoWhile(rel) => {
                    rel_check_variables(rel, table, globals, functions, diag)
                }
                LoopKind::For {
                    iterator,
                    start,
                    end,
                } => {
                    expr_check_variables(start, table, globals, functions, diag);
                    expr_check_variables(end, table, globals, functions, diag);
                    declare_variable(
                        &VarDecl {
                            ty: Type::Int,
                            name: *iterator,
                            line: instr.line,
                        },
                        table,
                        offset,
                    );
                }
                LoopKind::Unconditional => {}
            }
            for child in loop_node.body {
                instr_check_variables(child, table, globals, functions, offset, diag);
                instr_typecheck(child, table, globals, functions, diag);
            }
        }

        InstrKind::Return(values) => {
            for value in *values {
                expr_check_variables(value, table, globals, functions, diag);
            }
        }

        InstrKind::Call { name, args } => {
            for arg in *args {
                expr_check_variables(arg, table, globals, functions, diag);
            }
            check_function_call(name, args, table, globals, functions, diag, instr.line);
        }

        InstrKind::Goto(_)
        | InstrKind::Label(_)
        | InstrKind::Break
        | InstrKind::Continue
        | InstrKind::Fn(_) => {}
    }
}

/// Check one defined function: parameters become locals with sequential
/// offsets, the body is checked recursively against the locals-then-globals
/// chain, and every return statement is validated against the signature.
fn check_function_body<'a>(
    fn_node: &FnNode<'a>,
    body: &'a [InstrNode<'a>],
    globals: &SymbolTable,
    functions: &FnTable<'a>,
    diag: &mut Diagnostics,
) -> SymbolTable {
    let mut locals = SymbolTable::new();
    for (i, param) in fn_node.params.iter().enumerate() {
        locals.declare(Variable {
            ty: param.ty,
            name: param.name.to_string(),
            line: param.line,
            stack_offset: i,
            array: None,
        });
    }
    // Locals start after the parameters
    let mut offset = fn_node.params.len();

    for instr in body {
        instr_check_variables(instr, &mut locals, Some(globals), functions, &mut offset, diag);
        instr_typecheck(instr, &locals, Some(globals), functions, diag);
    }

    let mut returns = Vec::new();
    collect_returns(body, &mut returns);
    if let Some(f) = functions.lookup(fn_node.name) {
        for ret in returns {
            if let InstrKind::Return(values) = &ret.kind {
                check_return_statement(values, f, &locals, Some(globals), functions, diag, ret.line);
            }
        }
    }

    locals
}

fn check_return_statement<'a>(
    values: &[ExprNode<'a>],
    f: &Function<'a>,
    variables: &SymbolTable,
    globals: Option<&SymbolTable>,
    functions: &FnTable<'a>,
    diag: &mut Diagnostics,
    line: usize,
) {
    if values.len() != f.return_types.len() {
        diag.error_at(
            line,
            format!(
                "Function '{}' expects {} return values, but {} were provided",
                f.name,
                f.return_types.len(),
                values.len()
            ),
        );
        return;
    }

    for (value, expected) in values.iter().zip(f.return_types.iter()) {
        let actual = expr_type(value, variables, globals, functions, diag);
        if actual != *expected && *expected != Type::Pointer && actual != Type::Void {
            diag.error_at(
                line,
                format!(
                    "Return type mismatch in function '{}': expected {}, got {}",
                    f.name, expected, actual
                ),
            );
        }
    }
}

fn collect_returns<'i, 'a>(instrs: &'i [InstrNode<'a>], out: &mut Vec<&'i InstrNode<'a>>) {
    for instr in instrs {
        match &instr.kind {
            InstrKind::Return(_) => out.push(instr),
            InstrKind::If { then, else_, .. } => {
                collect_returns(then.instrs(), out);
                if let Some(else_block) = else_ {
                    collect_returns(else_block.instrs(), out);
                }
            }
            InstrKind::Loop(loop_node) => collect_returns(loop_node.body, out),
            InstrKind::Match { cases, .. } => {
                for case in *cases {
                    collect_returns(case.body.instrs(), out);
                }
            }
            _ => {}
        }
    }
}

/// The label pass for one goto scope: collect every label declaration
/// (duplicates error), then verify that every goto targets one of them.
fn check_labels_in(instrs: &[InstrNode<'_>], diag: &mut Diagnostics) {
    let mut labels: Vec<&str> = Vec::new();
    collect_labels(instrs, &mut labels, diag);
    verify_gotos(instrs, &labels, diag);
}

fn collect_labels<'a>(instrs: &[InstrNode<'a>], labels: &mut Vec<&'a str>, diag: &mut Diagnostics) {
    for instr in instrs {
        match &instr.kind {
            InstrKind::Label(name) => {
                if labels.contains(name) {
                    diag.error_at(instr.line, format!("Duplicate label declaration: {}", name));
                } else {
                    labels.push(*name);
                }
            }
            InstrKind::If { then, else_, .. } => {
                collect_labels(then.instrs(), labels, diag);
                if let Some(else_block) = else_ {
                    collect_labels(else_block.instrs(), labels, diag);
                }
            }
            InstrKind::Loop(loop_node) => collect_labels(loop_node.body, labels, diag),
            InstrKind::Match { cases, .. } => {
                for case in *cases {
                    collect_labels(case.body.instrs(), labels, diag);
                }
            }
            _ => {}
        }
    }
}

fn verify_gotos(instrs: &[InstrNode<'_>], labels: &[&str], diag: &mut Diagnostics) {
    for instr in instrs {
        match &instr.kind {
            InstrKind::Goto(label) => {
                if !labels.contains(label) {
                    diag.error_at(instr.line, format!("Use of undeclared label: {}", label));
                }
            }
            InstrKind::If { then, else_, .. } => {
                verify_gotos(then.instrs(), labels, diag);
                if let Some(else_block) = else_ {
                    verify_gotos(else_block.instrs(), labels, diag);
                }
            }
            InstrKind::Loop(loop_node) => verify_gotos(loop_node.body, labels, diag),
            InstrKind::Match { cases, .. } => {
                for case in *cases {
                    verify_gotos(case.body.instrs(), labels, diag);
                }
            }
            _ => {}
        }
    }
}
