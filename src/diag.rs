use log::{error, warn};

use crate::error::CompileError;

/// Error accounting for one compilation unit.
///
/// Every stage reports through the same counter, which is monotonically
/// non-decreasing for the life of a file compile. `check` is the barrier
/// invoked between stages: the pipeline halts there if anything has been
/// reported. Warnings are printed but never counted.
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: u32,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report an error carrying its source line.
    pub fn error_at(&mut self, line: usize, msg: impl AsRef<str>) {
        self.errors += 1;
        error!("{} [line {}]", msg.as_ref(), line);
    }

    /// Report an error with no line information.
    pub fn error(&mut self, msg: impl AsRef<str>) {
        self.errors += 1;
        error!("{}", msg.as_ref());
    }

    pub fn warning(&mut self, msg: impl AsRef<str>) {
        warn!("{}", msg.as_ref());
    }

    pub fn error_count(&self) -> u32 {
        self.errors
    }

    /// Pipeline barrier: fail if any error has been reported so far.
    pub fn check(&self) -> Result<(), CompileError> {
        if self.errors > 0 {
            warn!("{} error(s) found", self.errors);
            Err(CompileError::Diagnostics(self.errors))
        } else {
            Ok(())
        }
    }
}
