// File: src/main.rs
//
// Entry point for the det command-line tool: runs a `.det` script file,
// or with no file drops into the interactive REPL.

mod ast;
mod bytecode;
mod compiler;
mod errors;
mod heap;
mod lexer;
mod parser;
mod repl;
mod symbol_table;
mod type_checker;
mod value;
mod vm;

use clap::Parser as ClapParser;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use colored::Colorize;
use compiler::{Compiler, GlobalNames};
use errors::DetError;
use symbol_table::SymbolTable;
use type_checker::TypeChecker;
use vm::Vm;

#[derive(ClapParser)]
#[command(
    name = "det",
    about = "det: a small, statically-typed, garbage-collected scripting language",
    version = env!("CARGO_PKG_VERSION"),
    long_about = None
)]
struct Cli {
    /// Path to a .det script. Omit to start the interactive REPL.
    file: Option<PathBuf>,

    /// Trace the parser's descent into each grammar rule to stderr.
    #[arg(short = 'd', long = "pda-debug")]
    pda_debug: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.file {
        Some(path) => run_file(&path, cli.pda_debug),
        None => run_repl(cli.pda_debug),
    }
}

fn run_file(path: &PathBuf, debug_trace: bool) -> ExitCode {
    if path.extension().and_then(|e| e.to_str()) != Some("det") {
        eprintln!("{} expected a '.det' file, got '{}'", "Warning:".bright_yellow(), path.display());
    }

    let source = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{} could not read '{}': {e}", "Error:".bright_red().bold(), path.display());
            return ExitCode::FAILURE;
        }
    };

    let program = match parser::Parser::new(&source, debug_trace).parse() {
        Ok(program) => program,
        Err(errors) => return report(&errors),
    };

    let mut table = SymbolTable::new();
    if let Err(errors) = TypeChecker::new().check(&program, &mut table) {
        return report(&errors);
    }

    let mut vm = Vm::new();
    let mut globals = GlobalNames::new();
    let script = {
        let compiler = Compiler::new(vm.heap(), &mut globals);
        match compiler.compile(&program) {
            Ok(script) => script,
            Err(errors) => return report(&errors),
        }
    };

    match vm.run(script) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprint!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run_repl(debug_trace: bool) -> ExitCode {
    match repl::Repl::new(debug_trace) {
        Ok(mut repl) => match repl.run() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("{} {e}", "REPL error:".bright_red().bold());
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            eprintln!("{} failed to start REPL: {e}", "Error:".bright_red().bold());
            ExitCode::FAILURE
        }
    }
}

fn report(errors: &[DetError]) -> ExitCode {
    for err in errors {
        eprint!("{err}");
    }
    ExitCode::FAILURE
}
