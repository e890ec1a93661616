//! Machine Dialect execution core CLI.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use mdc::error::report_diagnostic_machine;
use mdc::{ast, mir};

#[derive(Parser)]
#[command(name = "mdc", version, about = "Machine Dialect compiler: HIR/MIR/bytecode and register VM")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a JSON-encoded AST (§6) into a `.mdbc` bytecode module.
    Compile {
        /// Path to the JSON-encoded `ast::Program` to compile.
        source: PathBuf,
        /// Output path for the assembled bytecode module.
        #[arg(short, long)]
        output: PathBuf,
        /// Optimization level.
        #[arg(long, default_value = "basic")]
        optimize: CliOptLevel,
        /// Diagnostic output format.
        #[arg(long, default_value = "text")]
        format: DiagnosticFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliOptLevel {
    None,
    Basic,
    Aggressive,
}

impl From<CliOptLevel> for mir::OptLevel {
    fn from(level: CliOptLevel) -> Self {
        match level {
            CliOptLevel::None => mir::OptLevel::None,
            CliOptLevel::Basic => mir::OptLevel::Basic,
            CliOptLevel::Aggressive => mir::OptLevel::Aggressive,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DiagnosticFormat {
    Text,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Compile {
            source,
            output,
            optimize,
            format,
        } => compile_command(&source, &output, optimize.into(), format),
    }
}

fn compile_command(
    source: &PathBuf,
    output: &PathBuf,
    opt_level: mir::OptLevel,
    format: DiagnosticFormat,
) -> ExitCode {
    let filename = source.display().to_string();

    let json = match std::fs::read_to_string(source) {
        Ok(json) => json,
        Err(err) => {
            eprintln!("error: could not read {filename}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let program: ast::Program = match serde_json::from_str(&json) {
        Ok(program) => program,
        Err(err) => {
            eprintln!("error: {filename} is not a valid AST: {err}");
            return ExitCode::FAILURE;
        }
    };

    let module_name = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("module")
        .to_string();

    match mdc::compile(&program, &module_name, opt_level) {
        Ok(result) => {
            print_diagnostics(&filename, &json, &result.diagnostics, format);
            let bytes = mdc::bytecode::encode(&result.module);
            if let Err(err) = std::fs::write(output, &bytes) {
                eprintln!("error: could not write {}: {err}", output.display());
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(diagnostics) => {
            print_diagnostics(&filename, &json, &diagnostics, format);
            ExitCode::FAILURE
        }
    }
}

fn print_diagnostics(filename: &str, source: &str, diagnostics: &mdc::error::Diagnostics, format: DiagnosticFormat) {
    match format {
        DiagnosticFormat::Text => mdc::error::report_diagnostics(filename, source, diagnostics),
        DiagnosticFormat::Json => {
            for diag in &diagnostics.0 {
                report_diagnostic_machine(filename, diag);
            }
        }
    }
}
