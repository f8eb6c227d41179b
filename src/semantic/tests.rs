use std::path::Path;

use bumpalo::Bump;

use crate::ast::Ast;
use crate::diag::Diagnostics;
use crate::lexer::tokenize;
use crate::symbols::{FnKind, FnTable, SymbolTable, Type};

use super::{check_semantics, evaluate_const_expr};

/// Lex, parse, and analyze; returns the diagnostic count.
fn analyze(source: &str) -> u32 {
    let mut tokens = Vec::new();
    tokenize(source, &mut tokens, Path::new(".")).unwrap();
    let arena = Bump::new();
    let mut diag = Diagnostics::new();
    let program = Ast::parse(&tokens, &arena, &mut diag);
    assert_eq!(diag.error_count(), 0, "unexpected parse errors");

    let mut globals = SymbolTable::new();
    let mut functions = FnTable::new();
    check_semantics(&program, &mut globals, &mut functions, &mut diag);
    diag.error_count()
}

fn fold(source: &str) -> (i64, u32) {
    let mut tokens = Vec::new();
    tokenize(source, &mut tokens, Path::new(".")).unwrap();
    let arena = Bump::new();
    let mut diag = Diagnostics::new();
    let program = Ast::parse(&tokens, &arena, &mut diag);
    let crate::ast::node::InstrKind::DeclareArray { size, .. } = &program.instrs[0].kind else {
        panic!("expected array declaration");
    };
    let value = evaluate_const_expr(size, &mut diag);
    (value, diag.error_count())
}

// ========================================
// Variable Resolution
// ========================================

#[test]
fn test_undeclared_variable_is_an_error() {
    assert!(analyze("fn main() : int { return x }") > 0);
}

#[test]
fn test_declaration_must_precede_use() {
    assert!(analyze("fn main() : int { y = 1 int y return y }") > 0);
}

#[test]
fn test_redeclaration_is_ignored() {
    // First declaration wins; re-declaration of the same name is silent
    assert_eq!(analyze("fn main() : int { int x = 1 int x = 2 return x }"), 0);
}

#[test]
fn test_nested_blocks_share_the_function_scope() {
    let source = "fn main() : int { if 1 == 1 then int x  x = 2  return x }";
    assert_eq!(analyze(source), 0);
}

#[test]
fn test_parameters_are_in_scope() {
    assert_eq!(analyze("fn f(int a, int b) : int { int r = a * b + 1 return r }"), 0);
}

#[test]
fn test_global_is_visible_inside_functions() {
    assert_eq!(analyze("int g = 5\nfn main() : int { return g }"), 0);
}

#[test]
fn test_global_array_is_visible_inside_functions() {
    let source = "int table[3] = { 1, 2, 3 }\nfn main() : int { table[0] = 9 return table[1] }";
    assert_eq!(analyze(source), 0);
}

#[test]
fn test_global_resolves_with_its_declared_type() {
    // g is char at the top level, so an int assignment inside a body must
    // be flagged through the fallback lookup
    assert!(analyze("char g = 'a'\nfn main() : int { g = 1 return 0 }") > 0);
}

#[test]
fn test_local_shadows_global() {
    // The chain is innermost scope first; the char local wins over the
    // int global of the same name
    let source = "int g = 5\nfn main() : int { char g = 'x' char c = g return 0 }";
    assert_eq!(analyze(source), 0);
}

// ========================================
// Type Checking
// ========================================

#[test]
fn test_char_int_mixed_arithmetic_is_an_error() {
    assert!(analyze("fn main() : int { char c = 1 + 'a' return 0 }") > 0);
}

#[test]
fn test_initialization_type_mismatch() {
    assert!(analyze("fn main() : int { char c = 1 return 0 }") > 0);
}

#[test]
fn test_pointer_target_accepts_any_rhs() {
    assert_eq!(analyze("fn main() : int { int *p p = 'a' p = 3 return 0 }"), 0);
}

#[test]
fn test_pointer_arithmetic_yields_pointer() {
    assert_eq!(analyze("fn main(int *p) : int { int *q q = p + 1 return 0 }"), 0);
}

#[test]
fn test_array_index_must_be_int() {
    assert!(analyze("fn main() : int { int a[3] a['x'] = 1 return 0 }") > 0);
}

#[test]
fn test_return_type_mismatch() {
    assert!(analyze("fn main() : int { return 'c' }") > 0);
}

#[test]
fn test_return_count_mismatch() {
    assert!(analyze("fn main() : int { return 1, 2 }") > 0);
}

#[test]
fn test_nested_return_is_checked() {
    assert!(analyze("fn main() : int { if 1 == 1 then return 'c' return 0 }") > 0);
}

// ========================================
// Functions
// ========================================

#[test]
fn test_duplicate_definition_is_an_error() {
    let source = "fn f() : int { return 1 }\nfn f() : int { return 2 }";
    assert!(analyze(source) > 0);
}

#[test]
fn test_redeclaration_is_idempotent() {
    let mut tokens = Vec::new();
    let source = "fn f(int a) : int\nfn f(int a) : int\nfn f(int a) : int { return a }";
    tokenize(source, &mut tokens, Path::new(".")).unwrap();
    let arena = Bump::new();
    let mut diag = Diagnostics::new();
    let program = Ast::parse(&tokens, &arena, &mut diag);

    let mut globals = SymbolTable::new();
    let mut functions = FnTable::new();
    check_semantics(&program, &mut globals, &mut functions, &mut diag);

    assert_eq!(diag.error_count(), 0);
    assert_eq!(functions.len(), 1);
    assert_eq!(functions.lookup("f").unwrap().kind, FnKind::Defined);
}

#[test]
fn test_signature_mismatch_on_redeclaration() {
    assert!(analyze("fn f(int a) : int\nfn f(int a, int b) : int { return a }") > 0);
}

#[test]
fn test_forward_function_reference_resolves() {
    let source = "fn main() : int { return helper() }\nfn helper() : int { return 42 }";
    assert_eq!(analyze(source), 0);
}

#[test]
fn test_unknown_function_call() {
    assert!(analyze("fn main() : int { return nope() }") > 0);
}

#[test]
fn test_argument_count_mismatch() {
    assert!(analyze("fn f(int a) : int { return a }\nfn main() : int { return f(1, 2) }") > 0);
}

#[test]
fn test_argument_type_mismatch() {
    assert!(analyze("fn f(int a) : int { return a }\nfn main() : int { return f('c') }") > 0);
}

#[test]
fn test_pointer_parameter_accepts_any_argument() {
    let source = "fn f(int *p) : int { return 0 }\nfn main() : int { int x = 1 return f(x) }";
    assert_eq!(analyze(source), 0);
}

#[test]
fn test_void_call_in_expression_is_an_error() {
    assert!(analyze("fn f() { int x = 0 }\nfn main() : int { return f() }") > 0);
}

#[test]
fn test_variadic_accepts_extra_arguments() {
    let source = "fn printf(int *fmt, ...) : int\nfn main() : int { char *s = \"hi\" return printf(s, 1, 2) }";
    assert_eq!(analyze(source), 0);
}

// ========================================
// Labels
// ========================================

#[test]
fn test_goto_loop_program() {
    let source = "fn main() : int {\nint i = 0\n:top\nif i < 10 then i = i + 1\nif i < 10 then goto top\nreturn i\n}";
    assert_eq!(analyze(source), 0);
}

#[test]
fn test_duplicate_label_is_an_error() {
    assert!(analyze("fn main() : int { :top :top return 0 }") > 0);
}

#[test]
fn test_goto_without_label_is_an_error() {
    assert!(analyze("fn main() : int { goto nowhere return 0 }") > 0);
}

#[test]
fn test_goto_does_not_cross_functions() {
    let source = "fn a() { :spot }\nfn b() { goto spot }";
    assert!(analyze(source) > 0);
}

// ========================================
// Constant Folding
// ========================================

#[test]
fn test_fold_arithmetic() {
    assert_eq!(fold("int a[2 + 3 * 4]"), (14, 0));
    assert_eq!(fold("int a[(10 - 4) / 2]"), (3, 0));
    assert_eq!(fold("int a[10 % 3]"), (1, 0));
}

#[test]
fn test_fold_division_by_zero_is_an_error() {
    let (_, errors) = fold("int a[1 / 0]");
    assert!(errors > 0);
    let (_, errors) = fold("int a[1 % 0]");
    assert!(errors > 0);
}

#[test]
fn test_fold_non_constant_is_an_error() {
    let (_, errors) = fold("int a[n + 1]");
    assert!(errors > 0);
}

// ========================================
// Stack Offsets
// ========================================

#[test]
fn test_offsets_follow_declaration_order() {
    let mut tokens = Vec::new();
    let source = "fn main() : int { int a int b[3] int c return 0 }";
    tokenize(source, &mut tokens, Path::new(".")).unwrap();
    let arena = Bump::new();
    let mut diag = Diagnostics::new();
    let program = Ast::parse(&tokens, &arena, &mut diag);

    let mut globals = SymbolTable::new();
    let mut functions = FnTable::new();
    check_semantics(&program, &mut globals, &mut functions, &mut diag);
    assert_eq!(diag.error_count(), 0);

    let locals = &functions.lookup("main").unwrap().locals;
    assert_eq!(locals.lookup("a").unwrap().stack_offset, 0);
    // The array consumes a slot per element
    assert_eq!(locals.lookup("b").unwrap().stack_offset, 1);
    assert_eq!(locals.lookup("c").unwrap().stack_offset, 4);
}

#[test]
fn test_parameters_occupy_leading_slots() {
    let mut tokens = Vec::new();
    let source = "fn f(int a, int b) : int { int c return c }";
    tokenize(source, &mut tokens, Path::new(".")).unwrap();
    let arena = Bump::new();
    let mut diag = Diagnostics::new();
    let program = Ast::parse(&tokens, &arena, &mut diag);

    let mut globals = SymbolTable::new();
    let mut functions = FnTable::new();
    check_semantics(&program, &mut globals, &mut functions, &mut diag);
    assert_eq!(diag.error_count(), 0);

    let locals = &functions.lookup("f").unwrap().locals;
    assert_eq!(locals.lookup("a").unwrap().stack_offset, 0);
    assert_eq!(locals.lookup("b").unwrap().stack_offset, 1);
    assert_eq!(locals.lookup("c").unwrap().stack_offset, 2);
}
