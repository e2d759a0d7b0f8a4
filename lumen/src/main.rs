use clap::{Parser, Subcommand};
use log::info;
use lumen_core::diags::format_diagnostic;
use lumen_core::{BaseScope, CompiledShader, Compiler, Type};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;

#[derive(Parser)]
#[command(name = "lumen")]
#[command(about = "Front-end for the Lumen shading language", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a shader and write the linked program as JSON
    Compile {
        /// Input source file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output JSON file (defaults to input name with .json extension)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Engine-provided uniform visible to the shader, e.g. `u_time:float`
        #[arg(short, long, value_name = "NAME:TYPE")]
        uniform: Vec<String>,

        /// Print verbose output
        #[arg(short, long)]
        verbose: bool,
    },
    /// Check a shader without writing any output
    Check {
        /// Input source file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Engine-provided uniform visible to the shader, e.g. `u_time:float`
        #[arg(short, long, value_name = "NAME:TYPE")]
        uniform: Vec<String>,

        /// Print verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Debug, Error)]
enum DriverError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    CompilationError(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid uniform '{0}': {1}")]
    InvalidUniform(String, String),
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Compile {
            input,
            output,
            uniform,
            verbose,
        } => compile_file(input, output, &uniform, verbose),
        Commands::Check {
            input,
            uniform,
            verbose,
        } => check_file(input, &uniform, verbose),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// `NAME:TYPE` pairs from the command line, added on top of the intrinsics.
fn base_scope(uniforms: &[String]) -> Result<BaseScope, DriverError> {
    let mut base = BaseScope::standard();
    for spec in uniforms {
        let (name, ty) = spec
            .split_once(':')
            .ok_or_else(|| DriverError::InvalidUniform(spec.clone(), "expected NAME:TYPE".to_string()))?;
        let ty: Type = ty
            .parse()
            .map_err(|e: lumen_core::CompilerError| DriverError::InvalidUniform(spec.clone(), e.to_string()))?;
        base = base.with_uniform(name.trim(), ty);
    }
    Ok(base)
}

fn run_compiler(input: &Path, uniforms: &[String]) -> Result<CompiledShader, DriverError> {
    let compiler = Compiler::with_base_scope(base_scope(uniforms)?);

    // Read source file
    let source = fs::read_to_string(input)?;

    compiler
        .compile(&source)
        .map_err(|e| DriverError::CompilationError(format_diagnostic(&e, &source)))
}

fn compile_file(
    input: PathBuf,
    output: Option<PathBuf>,
    uniforms: &[String],
    verbose: bool,
) -> Result<(), DriverError> {
    if verbose {
        info!("Compiling {}...", input.display());
    }

    let shader = run_compiler(&input, uniforms)?;

    // Determine output path
    let output_path = output.unwrap_or_else(|| {
        let mut path = input.clone();
        path.set_extension("json");
        path
    });

    fs::write(&output_path, serde_json::to_string_pretty(&shader)?)?;

    if verbose {
        info!("Successfully compiled to {}", output_path.display());
        info!(
            "{} outputs, {} uniforms, {} functions",
            shader.outputs().len(),
            shader.uniforms().len(),
            shader.functions().len()
        );
    }

    Ok(())
}

fn check_file(input: PathBuf, uniforms: &[String], verbose: bool) -> Result<(), DriverError> {
    if verbose {
        info!("Checking {}...", input.display());
    }

    run_compiler(&input, uniforms)?;

    if verbose {
        info!("✓ {} is valid", input.display());
    }

    Ok(())
}
