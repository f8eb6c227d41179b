//! Ahead-of-time compiler for the SCULL language.
//!
//! Compilation is a linear pipeline per source file, with one shared
//! per-binary state aggregating files and link inputs:
//!
//! 1. **Lexing** — the source buffer becomes a token stream terminated by
//!    an `End` sentinel; `-include "path"` directives are spliced inline.
//!    Module: [`lexer`]
//! 2. **Parsing** — recursive descent over the token stream builds the
//!    instruction list of an [`ast::Ast`], every node allocated in a
//!    per-file bump arena. Module: [`ast`]
//! 3. **Semantic analysis** — symbol tables for variables and functions,
//!    type checking, label resolution, and stack-offset assignment.
//!    Module: [`semantic`]
//! 4. **Code generation** — a pluggable [`backend::Backend`] lowers the
//!    AST to its IR, optimizes, and emits an object artifact per file;
//!    the external linker combines them. Module: [`backend`]
//!
//! Errors from any stage accumulate in a [`diag::Diagnostics`] counter and
//! the pipeline halts at the barrier between stages if any were reported.
//!
//! ```no_run
//! use bumpalo::Bump;
//! use scullc::prelude::*;
//!
//! let mut diag = Diagnostics::new();
//! let mut tokens = Vec::new();
//! tokenize("fn main() : int { return 0 }", &mut tokens, std::path::Path::new(".")).unwrap();
//!
//! let arena = Bump::new();
//! let program = Ast::parse(&tokens, &arena, &mut diag);
//!
//! let mut globals = SymbolTable::new();
//! let mut functions = FnTable::new();
//! check_semantics(&program, &mut globals, &mut functions, &mut diag);
//! assert!(diag.check().is_ok());
//! ```

pub mod ast;
pub mod backend;
pub mod cstate;
pub mod diag;
pub mod error;
pub mod fstate;
pub mod lexer;
pub mod semantic;
pub mod symbols;

pub mod prelude {
    pub use super::ast::{Ast, Parser};
    pub use super::backend::{self, Backend, IrBackend, Target};
    pub use super::cstate::{CompileState, OptLevel, Options};
    pub use super::diag::Diagnostics;
    pub use super::error::CompileError;
    pub use super::fstate::FileState;
    pub use super::lexer::tokenize;
    pub use super::semantic::{check_semantics, evaluate_const_expr};
    pub use super::symbols::{FnTable, SymbolTable, Type};
}
