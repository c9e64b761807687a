// File: src/repl.rs
//
// Interactive REPL for det. Each line (or multi-line block, while
// braces/parens stay unbalanced) is lexed, parsed, type-checked,
// compiled and run against session-persistent state: the symbol
// table, the compiler's global name slots, and the VM's globals array
// and heap all survive between inputs, so a function or variable
// defined on one line is visible on the next.

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::compiler::{Compiler, GlobalNames};
use crate::errors::DetError;
use crate::parser::Parser;
use crate::symbol_table::SymbolTable;
use crate::type_checker::TypeChecker;
use crate::vm::Vm;

pub struct Repl {
    editor: DefaultEditor,
    table: SymbolTable,
    globals: GlobalNames,
    vm: Vm,
    checker: TypeChecker,
    debug_trace: bool,
}

impl Repl {
    pub fn new(debug_trace: bool) -> Result<Self, Box<dyn std::error::Error>> {
        let editor = DefaultEditor::new()?;
        Ok(Repl {
            editor,
            table: SymbolTable::new(),
            globals: GlobalNames::new(),
            vm: Vm::new(),
            checker: TypeChecker::new(),
            debug_trace,
        })
    }

    fn show_banner(&self) {
        println!("{}", "╔══════════════════════════════════════════════════╗".bright_cyan());
        println!("{}", "║             det REPL — interactive shell           ║".bright_cyan());
        println!("{}", "╚══════════════════════════════════════════════════╝".bright_cyan());
        println!();
        println!(
            "  {} Use {}{}{}{}",
            "Welcome!".bright_green(),
            ":".bright_blue(),
            "help".bright_yellow(),
            " for commands or ".bright_blue(),
            ":quit".bright_yellow()
        );
        println!("  {} Multi-line input: end with unclosed braces", "Tip:".bright_magenta());
        println!();
    }

    pub fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.show_banner();
        let mut buffer = String::new();

        loop {
            let prompt =
                if buffer.is_empty() { "det> ".bright_green().to_string() } else { "...> ".bright_blue().to_string() };

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let _ = self.editor.add_history_entry(line.as_str());

                    if buffer.is_empty() && line.trim().starts_with(':') {
                        if self.handle_command(line.trim()) {
                            continue;
                        } else {
                            break;
                        }
                    }

                    buffer.push_str(&line);
                    buffer.push('\n');

                    if braces_balanced(&buffer) {
                        self.eval_input(&buffer);
                        buffer.clear();
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C (Ctrl+C to interrupt, :quit to exit)".bright_yellow());
                    buffer.clear();
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "Goodbye!".bright_cyan());
                    break;
                }
                Err(err) => {
                    eprintln!("{} {}", "Error:".bright_red(), err);
                    break;
                }
            }
        }

        Ok(())
    }

    /// Returns true to keep the REPL running, false on `:quit`.
    fn handle_command(&mut self, cmd: &str) -> bool {
        match cmd {
            ":help" | ":h" => {
                self.show_help();
                true
            }
            ":quit" | ":q" | ":exit" => {
                println!("{}", "Goodbye!".bright_cyan());
                false
            }
            ":clear" | ":c" => {
                print!("\x1B[2J\x1B[1;1H");
                self.show_banner();
                true
            }
            ":reset" | ":r" => {
                self.table = SymbolTable::new();
                self.globals = GlobalNames::new();
                self.vm = Vm::new();
                self.checker = TypeChecker::new();
                println!("{}", "Environment reset.".bright_green());
                true
            }
            _ => {
                println!(
                    "{} Unknown command: {}. Type {}{} for available commands.",
                    "Error:".bright_red(),
                    cmd.bright_yellow(),
                    ":".bright_blue(),
                    "help".bright_yellow()
                );
                true
            }
        }
    }

    fn show_help(&self) {
        println!();
        println!("{}", "REPL commands:".bright_cyan().bold());
        println!("  {}{}  show this help", ":help".bright_yellow(), " or :h   ".dimmed());
        println!("  {}{}  exit the REPL", ":quit".bright_yellow(), " or :q   ".dimmed());
        println!("  {}{}  clear the screen", ":clear".bright_yellow(), " or :c  ".dimmed());
        println!("  {}{}  reset all session state", ":reset".bright_yellow(), " or :r  ".dimmed());
        println!();
        println!("{}", "Navigation:".bright_cyan().bold());
        println!("  {}  command history", "\u{2191}/\u{2193} arrows".bright_blue());
        println!("  {}  interrupt current input", "Ctrl+C   ".bright_blue());
        println!("  {}  exit the REPL", "Ctrl+D   ".bright_blue());
        println!();
    }

    fn eval_input(&mut self, input: &str) {
        if input.trim().is_empty() {
            return;
        }

        let program = match Parser::new(input, self.debug_trace).parse() {
            Ok(program) => program,
            Err(errors) => return print_errors(&errors),
        };

        if let Err(errors) = self.checker.check(&program, &mut self.table) {
            return print_errors(&errors);
        }

        let script = {
            let compiler = Compiler::new(self.vm.heap(), &mut self.globals);
            match compiler.compile(&program) {
                Ok(script) => script,
                Err(errors) => return print_errors(&errors),
            }
        };

        if let Err(err) = self.vm.run(script) {
            print_errors(std::slice::from_ref(&err));
        }
    }
}

fn print_errors(errors: &[DetError]) {
    for err in errors {
        eprint!("{err}");
    }
}

/// Whether `input`'s braces/brackets/parens are balanced outside of
/// strings and line comments, used to decide whether to keep reading
/// more lines before evaluating.
fn braces_balanced(input: &str) -> bool {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => in_string = !in_string,
            '/' if !in_string && chars.peek() == Some(&'/') => {
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '{' | '(' if !in_string => depth += 1,
            '}' | ')' if !in_string => depth -= 1,
            _ => {}
        }
    }

    !in_string && depth <= 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unclosed_brace_is_incomplete() {
        assert!(!braces_balanced("func f() {"));
    }

    #[test]
    fn closed_braces_are_complete() {
        assert!(braces_balanced("func f() { return 1; }"));
    }

    #[test]
    fn brace_inside_string_is_ignored() {
        assert!(braces_balanced("print \"{ not a brace\";"));
    }
}
