use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort a compiler run.
///
/// Syntactic and semantic problems are accumulated in
/// [`Diagnostics`](crate::diag::Diagnostics) instead and only become a
/// `CompileError` at a pipeline barrier.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{0} error(s) found")]
    Diagnostics(u32),

    #[error("failed to read {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("invalid or unsupported target triple '{0}'")]
    InvalidTarget(String),

    #[error("include directory does not exist or is not a directory: {0}")]
    BadIncludeDir(PathBuf),

    #[error("missing input filename")]
    NoInput,

    #[error("linker failed: {0}")]
    Linker(String),
}
