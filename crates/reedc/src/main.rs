//! The Reed compiler CLI.
//!
//! Provides the `reedc` command with the following subcommands:
//!
//! - `reedc check <file>` - Parse and analyze, reporting diagnostics
//! - `reedc build <file>` - Compile to bytecode and print the disassembly
//! - `reedc dump-ir <file>` - Print the IR after the pass pipeline
//!
//! Options:
//! - `-O` - Run the optimizing transforms (folding, dead code, dead
//!   branches) before emission
//! - `--verbose` - Enable tracing output

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser as ClapParser, Subcommand};
use reed_codegen::opcode::Bytecode;
use reed_codegen::BytecodeGen;
use reed_common::diag::Diagnostic;
use reed_common::span::SourceName;
use reed_parser::Parser;
use reed_passes::Pipeline;

#[derive(ClapParser)]
#[command(name = "reedc", version, about = "The Reed compiler")]
struct Cli {
    /// Enable tracing output on stderr.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and analyze a Reed file, reporting diagnostics
    Check {
        /// Path to the .reed source file
        file: PathBuf,
    },
    /// Compile a Reed file and print the bytecode disassembly
    Build {
        /// Path to the .reed source file
        file: PathBuf,

        /// Run the optimizing transforms before emission
        #[arg(short = 'O', long = "optimize")]
        optimize: bool,
    },
    /// Print the IR after the pass pipeline
    DumpIr {
        /// Path to the .reed source file
        file: PathBuf,

        /// Run the optimizing transforms as well
        #[arg(short = 'O', long = "optimize")]
        optimize: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "debug".into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    let result = match cli.command {
        Commands::Check { file } => check(&file),
        Commands::Build { file, optimize } => build(&file, optimize),
        Commands::DumpIr { file, optimize } => dump_ir(&file, optimize),
    };

    if let Err(message) = result {
        eprintln!("error: {message}");
        process::exit(1);
    }
}

/// Read, parse, and run the pass pipeline; report every diagnostic.
///
/// Returns the analyzed module on success.
fn compile_frontend(
    file: &Path,
    optimize: bool,
) -> Result<(String, reed_parser::ir::Module), String> {
    let source = std::fs::read_to_string(file)
        .map_err(|e| format!("failed to read '{}': {e}", file.display()))?;
    let name = SourceName::file(file);

    let mut parser = Parser::new(&source, name.clone());
    let mut module = parser.parse();
    let parse_errors = parser.take_errors();
    if !parse_errors.is_empty() {
        for diag in &parse_errors {
            report(diag, &source);
        }
        return Err(format!(
            "compilation failed with {} parse error(s)",
            parse_errors.len()
        ));
    }

    let mut pipeline = if optimize {
        Pipeline::with_transforms(name)
    } else {
        Pipeline::new(name)
    };
    if let Err(diag) = pipeline.run(&mut module) {
        report(&diag, &source);
        return Err("compilation failed".to_string());
    }

    Ok((source, module))
}

fn check(file: &Path) -> Result<(), String> {
    compile_frontend(file, false)?;
    println!("{}: ok", file.display());
    Ok(())
}

fn build(file: &Path, optimize: bool) -> Result<(), String> {
    let (source, module) = compile_frontend(file, optimize)?;
    let mut code = Bytecode::new();
    let mut gen = BytecodeGen::new(&mut code, SourceName::file(file));
    if let Err(diag) = gen.generate(&reed_parser::ir::Ir::Module(module)) {
        report(&diag, &source);
        return Err("emission failed".to_string());
    }
    print!("{code}");
    Ok(())
}

fn dump_ir(file: &Path, optimize: bool) -> Result<(), String> {
    let (_, module) = compile_frontend(file, optimize)?;
    print!("{module}");
    Ok(())
}

/// Render one diagnostic over the source with its caret label.
fn report(diag: &Diagnostic, source: &str) {
    eprint!("{}", diag.render(source));
}
