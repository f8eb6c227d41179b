use std::path::Path;

use bumpalo::Bump;

use crate::diag::Diagnostics;
use crate::lexer::tokenize;
use crate::symbols::Type;

use super::node::{
    BinaryOp, CondBlock, ExprKind, FnBody, InstrKind, LoopKind, MatchPattern, RelOp, TermKind,
};
use super::Ast;

fn parse_in<'a>(source: &str, arena: &'a Bump) -> (Ast<'a>, u32) {
    let mut tokens = Vec::new();
    tokenize(source, &mut tokens, Path::new(".")).unwrap();
    let mut diag = Diagnostics::new();
    let program = Ast::parse(&tokens, arena, &mut diag);
    (program, diag.error_count())
}

// ========================================
// Declarations and Assignments
// ========================================

#[test]
fn test_parse_declarations() {
    let arena = Bump::new();
    let (program, errors) = parse_in("int x\nchar c\nchar *s\nint *p", &arena);
    assert_eq!(errors, 0);
    assert_eq!(program.instrs.len(), 4);

    let types: Vec<Type> = program
        .instrs
        .iter()
        .map(|i| match &i.kind {
            InstrKind::Declare(var) => var.ty,
            other => panic!("expected declaration, got {:?}", other),
        })
        .collect();
    assert_eq!(
        types,
        vec![Type::Int, Type::Char, Type::String, Type::Pointer]
    );
}

#[test]
fn test_parse_initialization_expression() {
    let arena = Bump::new();
    let (program, errors) = parse_in("int r = a * b + 1", &arena);
    assert_eq!(errors, 0);

    let InstrKind::Initialize { var, expr } = &program.instrs[0].kind else {
        panic!("expected initialize");
    };
    assert_eq!(var.name, "r");

    // (a * b) + 1, multiplication binding tighter
    let ExprKind::Binary { op, left, right } = &expr.kind else {
        panic!("expected binary expression");
    };
    assert_eq!(*op, BinaryOp::Add);
    assert!(matches!(
        left.kind,
        ExprKind::Binary {
            op: BinaryOp::Multiply,
            ..
        }
    ));
    assert!(matches!(
        right.kind,
        ExprKind::Term(super::node::TermNode {
            kind: TermKind::Int(1),
            ..
        })
    ));
}

#[test]
fn test_parse_array_forms() {
    let arena = Bump::new();
    let (program, errors) = parse_in("int a[3]\nint b[3] = { 7, 8, 9 }\nb[0] = 1", &arena);
    assert_eq!(errors, 0);

    assert!(matches!(program.instrs[0].kind, InstrKind::DeclareArray { .. }));
    let InstrKind::InitializeArray { elements, .. } = &program.instrs[1].kind else {
        panic!("expected array initialization");
    };
    assert_eq!(elements.len(), 3);
    assert!(matches!(
        program.instrs[2].kind,
        InstrKind::AssignToSubscript { .. }
    ));
}

#[test]
fn test_parse_pointer_assignment() {
    let arena = Bump::new();
    let (program, errors) = parse_in("*p = 5", &arena);
    assert_eq!(errors, 0);
    let InstrKind::Assign { target, .. } = &program.instrs[0].kind else {
        panic!("expected assignment");
    };
    assert_eq!(target.ty, Type::Pointer);
    assert_eq!(target.name, "p");
}

// ========================================
// Control Flow
// ========================================

#[test]
fn test_parse_if_then_single() {
    let arena = Bump::new();
    let (program, errors) = parse_in("if i < 10 then i = i + 1", &arena);
    assert_eq!(errors, 0);
    let InstrKind::If { rel, then, else_ } = &program.instrs[0].kind else {
        panic!("expected if");
    };
    assert_eq!(rel.op, RelOp::LessThan);
    assert!(matches!(then, CondBlock::Single(_)));
    assert!(else_.is_none());
}

#[test]
fn test_parse_if_else_blocks() {
    let arena = Bump::new();
    let (program, errors) = parse_in("if a == b { x = 1 } else { x = 2 }", &arena);
    assert_eq!(errors, 0);
    let InstrKind::If { then, else_, .. } = &program.instrs[0].kind else {
        panic!("expected if");
    };
    assert!(matches!(then, CondBlock::Multi(instrs) if instrs.len() == 1));
    assert!(matches!(else_, Some(CondBlock::Multi(instrs)) if instrs.len() == 1));
}

#[test]
fn test_parse_goto_and_label() {
    let arena = Bump::new();
    let (program, errors) = parse_in(":top\ngoto top\ngoto :top", &arena);
    assert_eq!(errors, 0);
    assert!(matches!(program.instrs[0].kind, InstrKind::Label("top")));
    assert!(matches!(program.instrs[1].kind, InstrKind::Goto("top")));
    assert!(matches!(program.instrs[2].kind, InstrKind::Goto("top")));
}

#[test]
fn test_parse_loops() {
    let arena = Bump::new();
    let source = "loop { break }\nwhile i < 10 { continue }\ndowhile { i = i + 1 } i < 10\nfor i in 0...10 { x = i }";
    let (program, errors) = parse_in(source, &arena);
    assert_eq!(errors, 0);
    assert_eq!(program.instrs.len(), 4);

    let kinds: Vec<&InstrKind> = program.instrs.iter().map(|i| &i.kind).collect();
    assert!(matches!(
        kinds[0],
        InstrKind::Loop(l) if matches!(l.kind, LoopKind::Unconditional)
    ));
    assert!(matches!(
        kinds[1],
        InstrKind::Loop(l) if matches!(l.kind, LoopKind::While(_))
    ));
    assert!(matches!(
        kinds[2],
        InstrKind::Loop(l) if matches!(l.kind, LoopKind::DoWhile(_))
    ));
    assert!(matches!(
        kinds[3],
        InstrKind::Loop(l) if matches!(l.kind, LoopKind::For { .. })
    ));
}

#[test]
fn test_parse_match() {
    let arena = Bump::new();
    let source = "match x {\n1, 2 : y = 1\n3...9 : y = 2\n_ : { y = 3 }\n}";
    let (program, errors) = parse_in(source, &arena);
    assert_eq!(errors, 0);

    let InstrKind::Match { cases, .. } = &program.instrs[0].kind else {
        panic!("expected match");
    };
    assert_eq!(cases.len(), 3);
    assert!(matches!(cases[0].pattern, MatchPattern::Values(v) if v.len() == 2));
    assert!(matches!(cases[1].pattern, MatchPattern::Range { .. }));
    assert!(matches!(cases[2].pattern, MatchPattern::Default));
    assert!(matches!(cases[2].body, CondBlock::Multi(_)));
}

// ========================================
// Functions
// ========================================

#[test]
fn test_parse_function_definition() {
    let arena = Bump::new();
    let (program, errors) = parse_in("fn f(int a, char b) : int, char { return a, b }", &arena);
    assert_eq!(errors, 0);

    let InstrKind::Fn(fn_node) = &program.instrs[0].kind else {
        panic!("expected function");
    };
    assert_eq!(fn_node.name, "f");
    assert_eq!(fn_node.params.len(), 2);
    assert_eq!(fn_node.params[0].ty, Type::Int);
    assert_eq!(fn_node.params[1].ty, Type::Char);
    assert_eq!(fn_node.return_types, &[Type::Int, Type::Char]);
    assert!(!fn_node.is_variadic);

    let FnBody::Defined(body) = fn_node.body else {
        panic!("expected definition");
    };
    assert!(matches!(body[0].kind, InstrKind::Return(values) if values.len() == 2));
}

#[test]
fn test_parse_function_declaration_and_variadic() {
    let arena = Bump::new();
    let (program, errors) = parse_in("fn printf(char *fmt, ...) : int", &arena);
    assert_eq!(errors, 0);

    let InstrKind::Fn(fn_node) = &program.instrs[0].kind else {
        panic!("expected function");
    };
    assert!(fn_node.is_variadic);
    assert_eq!(fn_node.params.len(), 1);
    assert_eq!(fn_node.params[0].ty, Type::Pointer);
    assert!(matches!(fn_node.body, FnBody::Declared));
}

#[test]
fn test_parse_bare_call_statement() {
    let arena = Bump::new();
    let (program, errors) = parse_in("putchar('a')", &arena);
    assert_eq!(errors, 0);
    assert!(matches!(
        program.instrs[0].kind,
        InstrKind::Call { name: "putchar", args } if args.len() == 1
    ));
}

// ========================================
// Error Recovery
// ========================================

#[test]
fn test_parse_error_recovers_and_continues() {
    let arena = Bump::new();
    // ']' is unexpected at instruction position; the declaration after it
    // should still parse
    let (program, errors) = parse_in("]\nint x", &arena);
    assert!(errors > 0);
    assert!(program
        .instrs
        .iter()
        .any(|i| matches!(i.kind, InstrKind::Declare(_))));
}

#[test]
fn test_parse_reports_all_errors_in_file() {
    let arena = Bump::new();
    let (_, errors) = parse_in("]\n)\nint x", &arena);
    assert!(errors >= 2);
}

// ========================================
// Printer Round-trip
// ========================================

#[test]
fn test_print_parse_round_trip() {
    let source = r#"
        fn fib(int n) : int {
            if n <= 1 then return n
            return fib(n - 1) + fib(n - 2)
        }

        fn main() : int {
            int values[2 + 1] = { 7, 8, 9 }
            int i = 0
            :top
            if i < 3 then i = i + 1
            if i < 3 then goto top
            while i > 0 {
                i = i - 1
                if i == 1 then break
            }
            match i {
                0, 1 : i = 5
                2...4 : i = 6
                _ : { i = 7 }
            }
            for j in 0...3 {
                values[j] = fib(j) * (i + 2)
            }
            return values[1]
        }
    "#;

    let arena = Bump::new();
    let (program, errors) = parse_in(source, &arena);
    assert_eq!(errors, 0);

    let printed = program.to_string();
    let arena2 = Bump::new();
    let (reparsed, reparse_errors) = parse_in(&printed, &arena2);
    assert_eq!(reparse_errors, 0, "printed source failed to parse:\n{}", printed);

    // Printing is canonical, so a second print is the structural comparison
    assert_eq!(printed, reparsed.to_string());
}
