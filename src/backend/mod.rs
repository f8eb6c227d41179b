use crate::ast::Ast;
use crate::cstate::CompileState;
use crate::error::CompileError;
use crate::fstate::FileState;
use crate::symbols::FnTable;

pub mod ir;
pub mod irgen;
mod link;
mod passes;

#[cfg(test)]
mod tests;

pub use irgen::IrBackend;

/// The hooks every code-generation backend provides.
///
/// The first five are invoked in order once per file; `link` runs once per
/// binary after all files, unless compile-only is set.
pub trait Backend {
    /// One-time global setup, before any file is compiled.
    fn setup(&mut self, cst: &CompileState);

    /// Lower one file's AST into in-memory IR, reading the semantic
    /// analyzer's tables.
    fn compile(
        &mut self,
        cst: &CompileState,
        fst: &mut FileState,
        program: &Ast<'_>,
        functions: &FnTable<'_>,
    );

    /// Run the pass pipeline selected by the user's optimization level.
    fn optimize(&mut self, cst: &CompileState, fst: &mut FileState);

    /// Serialize the IR to disk: the object artifact, plus IR text or
    /// assembly on request.
    fn emit(&mut self, cst: &CompileState, fst: &mut FileState) -> Result<(), CompileError>;

    /// Release per-file IR resources.
    fn cleanup(&mut self, cst: &CompileState, fst: &mut FileState);

    /// Drive the external linker over the accumulated object-file list.
    fn link(&mut self, cst: &CompileState) -> Result<(), CompileError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    Aarch64,
}

/// A code-generation target, parsed from a target triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub triple: String,
    pub arch: Arch,
}

impl Target {
    pub fn parse(triple: &str) -> Result<Self, CompileError> {
        let arch = match triple.split('-').next().unwrap_or("") {
            "x86_64" | "amd64" => Arch::X86_64,
            "aarch64" | "arm64" => Arch::Aarch64,
            _ => return Err(CompileError::InvalidTarget(triple.to_string())),
        };
        Ok(Self {
            triple: triple.to_string(),
            arch,
        })
    }

    /// The host triple, used when no target is given.
    pub fn host() -> Self {
        let (arch, arch_str) = if cfg!(target_arch = "aarch64") {
            (Arch::Aarch64, "aarch64")
        } else {
            (Arch::X86_64, "x86_64")
        };
        Self {
            triple: format!("{}-unknown-{}", arch_str, std::env::consts::OS),
            arch,
        }
    }
}

/// Select the backend implementation for the requested target.
pub fn select(_target: &Target) -> Box<dyn Backend> {
    Box::new(IrBackend)
}
