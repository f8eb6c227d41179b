use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::backend::Target;
use crate::error::CompileError;
use crate::fstate::FileState;

/// Optimization levels mapped from `-O0`..`-Oz`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptLevel {
    /// No optimization.
    O0,
    /// Basic.
    O1,
    /// Default.
    #[default]
    O2,
    /// Aggressive.
    O3,
    /// Optimize for size.
    Os,
    /// Optimize for minimum size.
    Oz,
}

impl FromStr for OptLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0" => Ok(Self::O0),
            "1" => Ok(Self::O1),
            "2" => Ok(Self::O2),
            "3" => Ok(Self::O3),
            "s" => Ok(Self::Os),
            "z" => Ok(Self::Oz),
            other => Err(format!("unknown optimization level '-O{}'", other)),
        }
    }
}

/// User-selected options for one compiler run.
#[derive(Debug, Default)]
pub struct Options {
    pub verbose: bool,
    pub compile_only: bool,
    pub emit_llvm: bool,
    pub emit_asm: bool,
    pub opt_level: OptLevel,
}

/// Per-binary compilation state: everything shared across the files of one
/// build. Only the currently active file's state is mutated; this stays
/// read-only during the per-file pipeline.
#[derive(Debug)]
pub struct CompileState {
    /// Directory resolved against for `-include` directives.
    pub include_dir: PathBuf,
    /// Path of the output binary; defaults to the first input's stem.
    pub output_filepath: PathBuf,
    /// Object artifact per input file, in input order.
    pub obj_file_list: Vec<PathBuf>,
    pub target: Target,
    pub options: Options,
}

impl CompileState {
    /// Build the per-binary state and one `FileState` per input file.
    pub fn new(
        files: &[String],
        target: Option<&str>,
        output: Option<&str>,
        include_dir: Option<&str>,
        options: Options,
    ) -> Result<(Self, Vec<FileState>), CompileError> {
        if files.is_empty() {
            return Err(CompileError::NoInput);
        }

        let target = match target {
            Some(triple) => Target::parse(triple)?,
            None => Target::host(),
        };

        let include_dir = PathBuf::from(include_dir.unwrap_or("."));
        if !include_dir.is_dir() {
            return Err(CompileError::BadIncludeDir(include_dir));
        }

        let mut fstates = Vec::with_capacity(files.len());
        let mut obj_file_list = Vec::with_capacity(files.len());
        for file in files {
            let fst = FileState::new(Path::new(file), options.compile_only)?;
            obj_file_list.push(fst.obj_path.clone());
            fstates.push(fst);
        }

        let output_filepath = match output {
            Some(path) => PathBuf::from(path),
            None => fstates[0]
                .extracted
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("a.out")),
        };

        Ok((
            Self {
                include_dir,
                output_filepath,
                obj_file_list,
                target,
                options,
            },
            fstates,
        ))
    }
}
