use std::process::ExitCode;

use bumpalo::Bump;
use clap::{CommandFactory, Parser};
use log::{error, info};

use scullc::prelude::*;

#[derive(Parser)]
#[command(version, about = "Ahead-of-time compiler for the SCULL language", long_about = None)]
struct Args {
    #[arg(help = "Source files to compile")]
    files: Vec<String>,

    #[arg(long, help = "Output target triple (default: host)")]
    target: Option<String>,

    #[arg(short, long, help = "Output binary path")]
    output: Option<String>,

    #[arg(short = 'c', help = "Compile only, do not link")]
    compile_only: bool,

    #[arg(
        short = 'i',
        long = "include_dir",
        help = "Directory resolved against for -include directives"
    )]
    include_dir: Option<String>,

    #[arg(short, long, help = "Print per-stage progress")]
    verbose: bool,

    #[arg(long = "emit-llvm", help = "Emit textual IR (implies -c)")]
    emit_llvm: bool,

    #[arg(long = "emit-asm", help = "Emit target assembly (implies -c)")]
    emit_asm: bool,

    #[arg(
        short = 'O',
        value_name = "LEVEL",
        default_value = "2",
        value_parser = parse_opt_level,
        help = "Optimization level (0, 1, 2, 3, s, z)"
    )]
    opt_level: OptLevel,
}

fn parse_opt_level(s: &str) -> Result<OptLevel, String> {
    s.parse()
}

fn main() -> ExitCode {
    colog::init();

    let args = Args::parse();
    if args.files.is_empty() {
        let mut cmd = Args::command();
        let _ = cmd.print_help();
        return ExitCode::FAILURE;
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), CompileError> {
    let options = Options {
        verbose: args.verbose,
        compile_only: args.compile_only || args.emit_llvm || args.emit_asm,
        emit_llvm: args.emit_llvm,
        emit_asm: args.emit_asm,
        opt_level: args.opt_level,
    };

    let (state, mut files) = CompileState::new(
        &args.files,
        args.target.as_deref(),
        args.output.as_deref(),
        args.include_dir.as_deref(),
        options,
    )?;

    let mut backend = backend::select(&state.target);
    backend.setup(&state);

    for fst in files.iter_mut() {
        compile_file(&state, fst, backend.as_mut())?;
        if state.options.verbose {
            info!("COMPILED {}", fst.filepath.display());
        }
    }

    backend.link(&state)?;
    if state.options.verbose && !state.options.compile_only {
        info!("LINKED {}", state.output_filepath.display());
    }

    Ok(())
}

/// Drive one file through the pipeline, halting at the barrier between
/// stages if any diagnostic has been reported.
fn compile_file(
    state: &CompileState,
    fst: &mut FileState,
    backend: &mut dyn Backend,
) -> Result<(), CompileError> {
    if state.options.verbose {
        info!("Lexing {}", fst.filepath.display());
    }
    tokenize(&fst.source, &mut fst.tokens, &state.include_dir)?;
    if state.options.verbose {
        for token in &fst.tokens {
            info!("{}: {}", token.line, token);
        }
    }

    if state.options.verbose {
        info!("Parsing {}", fst.filepath.display());
    }
    let arena = Bump::new();
    let program = Ast::parse(&fst.tokens, &arena, &mut fst.diag);
    fst.diag.check()?;
    if state.options.verbose {
        info!("AST for {}:\n{}", fst.filepath.display(), program);
    }

    if state.options.verbose {
        info!("Analyzing {}", fst.filepath.display());
    }
    let mut globals = SymbolTable::new();
    let mut functions = FnTable::new();
    check_semantics(&program, &mut globals, &mut functions, &mut fst.diag);
    fst.diag.check()?;

    if state.options.verbose {
        info!("Generating code for {}", fst.filepath.display());
    }
    backend.compile(state, fst, &program, &functions);
    fst.diag.check()?;
    backend.optimize(state, fst);
    backend.emit(state, fst)?;
    backend.cleanup(state, fst);

    Ok(())
}
