use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::CompileError;

/// Drive the external linker over the accumulated object files.
pub fn link_objects(output: &Path, objects: &[PathBuf]) -> Result<(), CompileError> {
    let mut cmd = Command::new("cc");
    cmd.arg("-o").arg(output);
    for obj in objects {
        cmd.arg(obj);
    }

    let status = cmd
        .status()
        .map_err(|e| CompileError::Linker(format!("failed to run cc: {}", e)))?;
    if !status.success() {
        return Err(CompileError::Linker(format!("cc exited with {}", status)));
    }
    Ok(())
}
