use std::path::Path;

use bumpalo::Bump;

use crate::ast::Ast;
use crate::diag::Diagnostics;
use crate::lexer::tokenize;
use crate::semantic::check_semantics;
use crate::symbols::{FnTable, SymbolTable};

use super::ir::{IrType, Module, Terminator};
use super::irgen::lower_module;
use super::passes;

/// Run the front half of the pipeline and lower to IR.
fn lower(source: &str) -> (Module, u32) {
    let mut tokens = Vec::new();
    tokenize(source, &mut tokens, Path::new(".")).unwrap();
    let arena = Bump::new();
    let mut diag = Diagnostics::new();
    let program = Ast::parse(&tokens, &arena, &mut diag);

    let mut globals = SymbolTable::new();
    let mut functions = FnTable::new();
    check_semantics(&program, &mut globals, &mut functions, &mut diag);
    assert_eq!(diag.error_count(), 0, "front end reported errors");

    let module = lower_module(&program, &functions, "test", "x86_64-unknown-linux", &mut diag);
    (module, diag.error_count())
}

// ========================================
// Function Lowering
// ========================================

#[test]
fn test_lower_hello_world() {
    let (module, errors) = lower("fn main() : int { return 0 }");
    assert_eq!(errors, 0);

    let main = module.function("main").unwrap();
    assert!(main.is_definition);
    assert_eq!(main.ret, IrType::I32);
    assert!(main.params.is_empty());
    assert_eq!(main.blocks[0].label, "entry");
    assert!(matches!(
        main.blocks[0].terminator,
        Some(Terminator::Ret(Some(_)))
    ));
}

#[test]
fn test_lower_empty_source() {
    let (module, errors) = lower("");
    assert_eq!(errors, 0);
    assert!(module.functions.is_empty());
}

#[test]
fn test_lower_empty_function() {
    let (module, errors) = lower("fn nothing() { }");
    assert_eq!(errors, 0);
    let f = module.function("nothing").unwrap();
    // Void default return synthesized on the unterminated path
    assert!(matches!(f.blocks[0].terminator, Some(Terminator::Ret(None))));
}

#[test]
fn test_lower_missing_return_synthesizes_null() {
    let (module, errors) = lower("fn f() : int { int x = 1 }");
    assert_eq!(errors, 0);
    let f = module.function("f").unwrap();
    assert!(matches!(f.blocks[0].terminator, Some(Terminator::Ret(Some(_)))));
}

#[test]
fn test_lower_parameters_get_slots() {
    let (module, errors) = lower("fn f(int a, char b) : int { return a }");
    assert_eq!(errors, 0);
    let f = module.function("f").unwrap();
    assert_eq!(f.slots.len(), 2);
    assert_eq!(f.slots[0].ty, IrType::I32);
    assert_eq!(f.slots[1].ty, IrType::I8);
}

#[test]
fn test_lower_declaration_only_function() {
    let (module, errors) = lower("fn getchar() : int");
    assert_eq!(errors, 0);
    let f = module.function("getchar").unwrap();
    assert!(!f.is_definition);
    assert!(f.blocks.is_empty());
}

// ========================================
// Globals
// ========================================

#[test]
fn test_lower_global_variable_gets_module_storage() {
    let (module, errors) = lower("int g = 5\nfn main() : int { g = g + 1 return g }");
    assert_eq!(errors, 0);

    assert_eq!(module.globals.len(), 1);
    assert_eq!(module.globals[0].name, "g");
    assert_eq!(module.globals[0].ty, IrType::I32);
    assert_eq!(module.globals[0].init, vec![5]);

    // Body references resolve to the global's address
    let main = module.function("main").unwrap();
    let touches_global = main
        .blocks
        .iter()
        .flat_map(|b| b.instrs.iter())
        .any(|i| matches!(i, super::ir::Inst::Load { addr: super::ir::Operand::Global(0), .. }));
    assert!(touches_global);
}

#[test]
fn test_lower_global_array_access() {
    let (module, errors) = lower("int t[2] = { 3, 4 }\nfn main() : int { t[0] = 9 return t[1] }");
    assert_eq!(errors, 0);

    let g = &module.globals[0];
    assert_eq!(g.len, 2);
    assert_eq!(g.init, vec![3, 4]);

    // Global arrays take the two-index static access form
    let main = module.function("main").unwrap();
    let static_gep = main
        .blocks
        .iter()
        .flat_map(|b| b.instrs.iter())
        .any(|i| matches!(
            i,
            super::ir::Inst::Gep {
                base: super::ir::Operand::Global(0),
                static_len: Some(2),
                ..
            }
        ));
    assert!(static_gep);
}

#[test]
fn test_lower_uninitialized_global_is_zeroed() {
    let (module, errors) = lower("int counter\nfn main() : int { return counter }");
    assert_eq!(errors, 0);
    assert_eq!(module.globals[0].init, Vec::<i64>::new());
}

#[test]
fn test_lower_local_shadows_global() {
    let (module, errors) = lower("int g = 1\nfn f() : int { int g = 2 return g }");
    assert_eq!(errors, 0);
    let f = module.function("f").unwrap();
    // The body load resolves to the local slot, not the module global
    let loads_local = f
        .blocks
        .iter()
        .flat_map(|b| b.instrs.iter())
        .any(|i| matches!(i, super::ir::Inst::Load { addr: super::ir::Operand::Slot(_), .. }));
    let loads_global = f
        .blocks
        .iter()
        .flat_map(|b| b.instrs.iter())
        .any(|i| matches!(i, super::ir::Inst::Load { addr: super::ir::Operand::Global(_), .. }));
    assert!(loads_local);
    assert!(!loads_global);
}

// ========================================
// Arrays
// ========================================

#[test]
fn test_lower_static_vs_initialized_array_form() {
    let source = "fn main() : int { int a[3] int b[3] = { 7, 8, 9 } return a[0] + b[1] }";
    let (module, errors) = lower(source);
    assert_eq!(errors, 0);

    let main = module.function("main").unwrap();
    let a = main.slots.iter().find(|s| s.name == "a").unwrap();
    let b = main.slots.iter().find(|s| s.name == "b").unwrap();
    // A constant-sized declaration is a static array; an initialized one
    // allocates as a dynamic run of elements
    assert!(a.is_static_array);
    assert_eq!(a.len, 3);
    assert!(!b.is_static_array);
    assert_eq!(b.len, 3);
}

// ========================================
// Control Flow
// ========================================

#[test]
fn test_lower_if_produces_then_and_merge() {
    let (module, errors) = lower("fn f(int a) : int { if a < 1 then a = 2 return a }");
    assert_eq!(errors, 0);
    let f = module.function("f").unwrap();
    assert!(f.blocks.iter().any(|b| b.label.starts_with("if.then")));
    assert!(f.blocks.iter().any(|b| b.label.starts_with("if.end")));
}

#[test]
fn test_lower_goto_label_either_order() {
    let source = "fn f() : int {\nint i = 0\ngoto done\n:done\nreturn i\n}";
    let (module, errors) = lower(source);
    assert_eq!(errors, 0);
    let f = module.function("f").unwrap();
    let done = f.blocks.iter().position(|b| b.label == "done").unwrap();
    assert!(matches!(
        f.blocks[0].terminator,
        Some(Terminator::Br(target)) if target == done
    ));
}

#[test]
fn test_lower_always_false_while_still_emits_body() {
    let (module, errors) = lower("fn f() : int { int x = 0 while 1 < 0 { x = 1 } return x }");
    assert_eq!(errors, 0);
    let f = module.function("f").unwrap();
    assert!(f.blocks.iter().any(|b| b.label.starts_with("loop.header")));
    assert!(f.blocks.iter().any(|b| b.label.starts_with("loop.body")));
    assert!(f.blocks.iter().any(|b| b.label.starts_with("loop.exit")));
}

#[test]
fn test_lower_break_targets_innermost_loop() {
    let source = "fn f() : int { loop { loop { break } break } return 0 }";
    let (module, errors) = lower(source);
    assert_eq!(errors, 0);
    // Two loops, each with its own exit; no diagnostics means both breaks
    // resolved against a live loop frame
    let f = module.function("f").unwrap();
    assert_eq!(
        f.blocks.iter().filter(|b| b.label.starts_with("loop.exit")).count(),
        2
    );
}

#[test]
fn test_lower_break_outside_loop_is_a_diagnostic() {
    let mut tokens = Vec::new();
    tokenize("fn f() { break }", &mut tokens, Path::new(".")).unwrap();
    let arena = Bump::new();
    let mut diag = Diagnostics::new();
    let program = Ast::parse(&tokens, &arena, &mut diag);
    let mut globals = SymbolTable::new();
    let mut functions = FnTable::new();
    check_semantics(&program, &mut globals, &mut functions, &mut diag);
    assert_eq!(diag.error_count(), 0);

    lower_module(&program, &functions, "test", "t", &mut diag);
    assert!(diag.error_count() > 0);
}

#[test]
fn test_lower_match_chains_comparisons() {
    let source = "fn f(int x) : int { match x { 1, 2 : x = 1\n3...5 : x = 2\n_ : x = 3 } return x }";
    let (module, errors) = lower(source);
    assert_eq!(errors, 0);
    let f = module.function("f").unwrap();
    assert!(f.blocks.iter().any(|b| b.label.starts_with("match.body")));
    assert!(f.blocks.iter().any(|b| b.label.starts_with("match.range")));
    assert!(f.blocks.iter().any(|b| b.label.starts_with("match.end")));
}

// ========================================
// Calls
// ========================================

#[test]
fn test_lower_forward_call_resolves() {
    let source = "fn main() : int { return answer() }\nfn answer() : int { return 42 }";
    let (module, errors) = lower(source);
    assert_eq!(errors, 0);
    assert!(module.function("answer").unwrap().is_definition);
}

// ========================================
// Optimization Passes
// ========================================

#[test]
fn test_fold_constants_removes_constant_arithmetic() {
    let (mut module, errors) = lower("fn f() : int { int x = 2 + 3 return x }");
    assert_eq!(errors, 0);
    passes::fold_constants(&mut module);

    let f = module.function("f").unwrap();
    let any_bin = f
        .blocks
        .iter()
        .flat_map(|b| b.instrs.iter())
        .any(|i| matches!(i, super::ir::Inst::Bin { .. }));
    assert!(!any_bin);
}

#[test]
fn test_prune_removes_unreachable_blocks() {
    let (mut module, errors) =
        lower("fn f() : int { if 1 < 0 then return 1 return 0 }");
    assert_eq!(errors, 0);
    let before = module.function("f").unwrap().blocks.len();
    passes::fold_constants(&mut module);
    passes::prune_unreachable_blocks(&mut module);
    let after = module.function("f").unwrap().blocks.len();
    assert!(after < before);
}
