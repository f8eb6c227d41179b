use std::fmt;

use bumpalo::Bump;

use crate::diag::Diagnostics;
use crate::lexer::token::{escape_char, escape_string, Token};
use crate::symbols::Type;

pub mod node;
mod parser;

#[cfg(test)]
mod tests;

pub use parser::Parser;

use node::{
    CondBlock, ExprKind, ExprNode, FnBody, FnNode, InstrKind, InstrNode, LoopKind, MatchPattern,
    Param, RelNode, TermKind, TermNode, VarDecl,
};

/// The abstract syntax tree of one compilation unit.
///
/// Nodes live in a `bumpalo` arena owned by the caller; the tree holds only
/// references into it, so dropping the arena releases the whole tree at
/// once.
#[derive(Debug, PartialEq)]
pub struct Ast<'a> {
    pub instrs: Vec<InstrNode<'a>>,
}

impl<'a> Ast<'a> {
    /// Parse a token stream into an AST rooted in `arena`.
    pub fn parse(tokens: &[Token], arena: &'a Bump, diag: &mut Diagnostics) -> Ast<'a> {
        Parser::new(tokens, arena, diag).parse_program()
    }
}

// The printer emits canonical source: parsing its output reproduces the
// tree, which is what the round-trip tests lean on.

fn write_indent(f: &mut fmt::Formatter<'_>, level: usize) -> fmt::Result {
    for _ in 0..level {
        write!(f, "    ")?;
    }
    Ok(())
}

fn fmt_decl(f: &mut fmt::Formatter<'_>, var: &VarDecl<'_>) -> fmt::Result {
    match var.ty {
        Type::Int => write!(f, "int {}", var.name),
        Type::Char => write!(f, "char {}", var.name),
        Type::String => write!(f, "char *{}", var.name),
        Type::Pointer => write!(f, "int *{}", var.name),
        Type::Void => write!(f, "{}", var.name),
    }
}

fn fmt_param(f: &mut fmt::Formatter<'_>, param: &Param<'_>) -> fmt::Result {
    match param.ty {
        Type::Char => write!(f, "char {}", param.name),
        Type::Pointer => write!(f, "int *{}", param.name),
        Type::String => write!(f, "char *{}", param.name),
        _ => write!(f, "int {}", param.name),
    }
}

fn fmt_term(f: &mut fmt::Formatter<'_>, term: &TermNode<'_>) -> fmt::Result {
    match &term.kind {
        TermKind::Int(v) => write!(f, "{}", v),
        TermKind::Char(c) => write!(f, "'{}'", escape_char(*c)),
        TermKind::Str(s) => write!(f, "\"{}\"", escape_string(s)),
        TermKind::Identifier(name) => write!(f, "{}", name),
        TermKind::Deref(name) => write!(f, "*{}", name),
        TermKind::AddressOf(name) => write!(f, "&{}", name),
        TermKind::ArrayAccess { array, index } => {
            write!(f, "{}[", array)?;
            fmt_expr(f, index)?;
            write!(f, "]")
        }
        TermKind::ArrayLiteral(elements) => {
            write!(f, "{{ ")?;
            fmt_expr_list(f, elements)?;
            write!(f, " }}")
        }
        TermKind::Call { name, args } => {
            write!(f, "{}(", name)?;
            fmt_expr_list(f, args)?;
            write!(f, ")")
        }
    }
}

fn fmt_expr_list(f: &mut fmt::Formatter<'_>, exprs: &[ExprNode<'_>]) -> fmt::Result {
    for (i, expr) in exprs.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        fmt_expr(f, expr)?;
    }
    Ok(())
}

fn fmt_operand(f: &mut fmt::Formatter<'_>, expr: &ExprNode<'_>) -> fmt::Result {
    match &expr.kind {
        ExprKind::Term(_) => fmt_expr(f, expr),
        ExprKind::Binary { .. } => {
            write!(f, "(")?;
            fmt_expr(f, expr)?;
            write!(f, ")")
        }
    }
}

fn fmt_expr(f: &mut fmt::Formatter<'_>, expr: &ExprNode<'_>) -> fmt::Result {
    match &expr.kind {
        ExprKind::Term(term) => fmt_term(f, term),
        ExprKind::Binary { op, left, right } => {
            fmt_operand(f, left)?;
            write!(f, " {} ", op)?;
            fmt_operand(f, right)
        }
    }
}

fn fmt_rel(f: &mut fmt::Formatter<'_>, rel: &RelNode<'_>) -> fmt::Result {
    fmt_term(f, &rel.lhs)?;
    write!(f, " {} ", rel.op)?;
    fmt_term(f, &rel.rhs)
}

fn fmt_block(f: &mut fmt::Formatter<'_>, instrs: &[InstrNode<'_>], level: usize) -> fmt::Result {
    writeln!(f, "{{")?;
    for instr in instrs {
        write_indent(f, level + 1)?;
        fmt_instr(f, instr, level + 1)?;
        writeln!(f)?;
    }
    write_indent(f, level)?;
    write!(f, "}}")
}

fn fmt_cond_block(f: &mut fmt::Formatter<'_>, block: &CondBlock<'_>, level: usize) -> fmt::Result {
    match block {
        CondBlock::Single(instr) => {
            write!(f, "then ")?;
            fmt_instr(f, instr, level)
        }
        CondBlock::Multi(instrs) => fmt_block(f, instrs, level),
    }
}

fn fmt_fn(f: &mut fmt::Formatter<'_>, fn_node: &FnNode<'_>, level: usize) -> fmt::Result {
    write!(f, "fn {}(", fn_node.name)?;
    for (i, param) in fn_node.params.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        fmt_param(f, param)?;
    }
    if fn_node.is_variadic {
        if fn_node.params.is_empty() {
            write!(f, "...")?;
        } else {
            write!(f, ", ...")?;
        }
    }
    write!(f, ")")?;

    if !fn_node.return_types.is_empty() {
        write!(f, " : ")?;
        for (i, ty) in fn_node.return_types.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", ty)?;
        }
    }

    match fn_node.body {
        FnBody::Declared => Ok(()),
        FnBody::Defined(body) => {
            write!(f, " ")?;
            fmt_block(f, body, level)
        }
    }
}

fn fmt_instr(f: &mut fmt::Formatter<'_>, instr: &InstrNode<'_>, level: usize) -> fmt::Result {
    match &instr.kind {
        InstrKind::Declare(var) => fmt_decl(f, var),
        InstrKind::Initialize { var, expr } => {
            fmt_decl(f, var)?;
            write!(f, " = ")?;
            fmt_expr(f, expr)
        }
        InstrKind::DeclareArray { var, size } => {
            fmt_decl(f, var)?;
            write!(f, "[")?;
            fmt_expr(f, size)?;
            write!(f, "]")
        }
        InstrKind::InitializeArray {
            var,
            size,
            elements,
        } => {
            fmt_decl(f, var)?;
            write!(f, "[")?;
            fmt_expr(f, size)?;
            write!(f, "] = {{ ")?;
            fmt_expr_list(f, elements)?;
            write!(f, " }}")
        }
        InstrKind::Assign { target, expr } => {
            if target.ty == Type::Pointer {
                write!(f, "*{} = ", target.name)?;
            } else {
                write!(f, "{} = ", target.name)?;
            }
            fmt_expr(f, expr)
        }
        InstrKind::AssignToSubscript { array, index, expr } => {
            write!(f, "{}[", array.name)?;
            fmt_expr(f, index)?;
            write!(f, "] = ")?;
            fmt_expr(f, expr)
        }
        InstrKind::If { rel, then, else_ } => {
            write!(f, "if ")?;
            fmt_rel(f, rel)?;
            write!(f, " ")?;
            fmt_cond_block(f, then, level)?;
            if let Some(else_block) = else_ {
                write!(f, " else ")?;
                match else_block {
                    CondBlock::Single(instr) => fmt_instr(f, instr, level)?,
                    CondBlock::Multi(instrs) => fmt_block(f, instrs, level)?,
                }
            }
            Ok(())
        }
        InstrKind::Match { expr, cases } => {
            write!(f, "match ")?;
            fmt_expr(f, expr)?;
            writeln!(f, " {{")?;
            for case in *cases {
                write_indent(f, level + 1)?;
                match &case.pattern {
                    MatchPattern::Values(values) => fmt_expr_list(f, values)?,
                    MatchPattern::Range { start, end } => {
                        fmt_expr(f, start)?;
                        write!(f, "...")?;
                        fmt_expr(f, end)?;
                    }
                    MatchPattern::Default => write!(f, "_")?,
                }
                write!(f, " : ")?;
                match &case.body {
                    CondBlock::Single(instr) => fmt_instr(f, instr, level + 1)?,
                    CondBlock::Multi(instrs) => fmt_block(f, instrs, level + 1)?,
                }
                writeln!(f)?;
            }
            write_indent(f, level)?;
            write!(f, "}}")
        }
        InstrKind::Goto(label) => write!(f, "goto {}", label),
        InstrKind::Label(label) => write!(f, ":{}", label),
        InstrKind::Loop(loop_node) => match &loop_node.kind {
            LoopKind::Unconditional => {
                write!(f, "loop ")?;
                fmt_block(f, loop_node.body, level)
            }
            LoopKind::While(rel) => {
                write!(f, "while ")?;
                fmt_rel(f, rel)?;
                write!(f, " ")?;
                fmt_block(f, loop_node.body, level)
            }
            LoopKind::DoWhile(rel) => {
                write!(f, "dowhile ")?;
                fmt_block(f, loop_node.body, level)?;
                write!(f, " ")?;
                fmt_rel(f, rel)
            }
            LoopKind::For {
                iterator,
                start,
                end,
            } => {
                write!(f, "for {} in ", iterator)?;
                fmt_expr(f, start)?;
                write!(f, "...")?;
                fmt_expr(f, end)?;
                write!(f, " ")?;
                fmt_block(f, loop_node.body, level)
            }
        },
        InstrKind::Break => write!(f, "break"),
        InstrKind::Continue => write!(f, "continue"),
        InstrKind::Fn(fn_node) => fmt_fn(f, fn_node, level),
        InstrKind::Return(values) => {
            write!(f, "return")?;
            if !values.is_empty() {
                write!(f, " ")?;
                fmt_expr_list(f, values)?;
            }
            Ok(())
        }
        InstrKind::Call { name, args } => {
            write!(f, "{}(", name)?;
            fmt_expr_list(f, args)?;
            write!(f, ")")
        }
    }
}

impl fmt::Display for Ast<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instr in &self.instrs {
            fmt_instr(f, instr, 0)?;
            writeln!(f)?;
        }
        Ok(())
    }
}
