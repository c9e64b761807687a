// File: src/errors.rs
//
// Diagnostics shared by every stage of the pipeline. Lex, parse, type,
// compile and runtime errors all report through the same `DetError`
// shape so the driver never has to special-case a stage's output.

use colored::Colorize;
use std::fmt;

/// Which stage detected the error. Exactly one kind is ever reported
/// per failure (see spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lex,
    Parse,
    Type,
    Compile,
    Runtime,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Lex => "Lex Error",
            ErrorKind::Parse => "Parse Error",
            ErrorKind::Type => "Type Error",
            ErrorKind::Compile => "Compile Error",
            ErrorKind::Runtime => "Runtime Error",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct SourceLocation {
    pub line: usize,
}

impl SourceLocation {
    pub fn new(line: usize) -> Self {
        SourceLocation { line }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Line {}", self.line)
    }
}

/// One frame of a runtime stack trace: `[line <n>] in <name>`.
#[derive(Debug, Clone)]
pub struct TraceFrame {
    pub line: usize,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct DetError {
    pub kind: ErrorKind,
    pub message: String,
    pub location: SourceLocation,
    /// Lexeme the parser was looking at, for the `at '<lexeme>'`/`at
    /// end` shape in spec.md §4.2.
    pub near: Option<String>,
    pub trace: Vec<TraceFrame>,
}

impl DetError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, line: usize) -> Self {
        DetError {
            kind,
            message: message.into(),
            location: SourceLocation::new(line),
            near: None,
            trace: Vec::new(),
        }
    }

    pub fn with_near(mut self, near: impl Into<String>) -> Self {
        self.near = Some(near.into());
        self
    }

    pub fn with_trace(mut self, trace: Vec<TraceFrame>) -> Self {
        self.trace = trace;
        self
    }
}

impl fmt::Display for DetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::Parse => {
                let near = match &self.near {
                    Some(lex) => format!("at '{lex}'"),
                    None => "at end".to_string(),
                };
                writeln!(
                    f,
                    "{} {}: {}",
                    format!("[{}]", self.location).bright_blue(),
                    format!("Error {near}").red().bold(),
                    self.message
                )?;
            }
            _ => {
                writeln!(
                    f,
                    "{} {}",
                    format!("[{}]", self.location).bright_blue(),
                    self.message.red().bold()
                )?;
            }
        }

        for frame in &self.trace {
            writeln!(f, "[line {}] in {}", frame.line, frame.name)?;
        }

        Ok(())
    }
}

impl std::error::Error for DetError {}
