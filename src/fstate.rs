use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::backend::ir::Module;
use crate::diag::Diagnostics;
use crate::error::CompileError;
use crate::lexer::token::Token;

/// Per-file compilation state: the source buffer, the token stream, the
/// file's diagnostics, and the backend's in-memory IR between `compile`
/// and `cleanup`. Released at the end of the file's compile.
#[derive(Debug)]
pub struct FileState {
    pub filepath: PathBuf,
    /// File path without its extension ("lib/io.scl" -> "lib/io").
    pub extracted: PathBuf,
    /// Module name ("lib/io" -> "io").
    pub stem: String,
    /// Precomputed object artifact path: next to the source under `-c`,
    /// in the scratch directory otherwise.
    pub obj_path: PathBuf,
    pub source: String,
    pub tokens: Vec<Token>,
    pub diag: Diagnostics,
    pub ir: Option<Module>,
}

impl FileState {
    pub fn new(filepath: &Path, compile_only: bool) -> Result<Self, CompileError> {
        let source = fs::read_to_string(filepath).map_err(|source| CompileError::Io {
            path: filepath.to_path_buf(),
            source,
        })?;

        let extracted = filepath.with_extension("");
        let stem = extracted
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "out".to_string());

        let obj_path = if compile_only {
            let mut path = extracted.clone();
            path.set_extension("o");
            path
        } else {
            env::temp_dir().join("scullc").join(format!("{}.o", stem))
        };

        Ok(Self {
            filepath: filepath.to_path_buf(),
            extracted,
            stem,
            obj_path,
            source,
            tokens: Vec::new(),
            diag: Diagnostics::new(),
            ir: None,
        })
    }
}
