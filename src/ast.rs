// File: src/ast.rs
//
// Abstract syntax tree for the det language. Every node is a tagged
// variant carrying the source line it came from, so diagnostics can
// always point back into the program text.

use crate::lexer::Token;

/// A type name as written in source (`int`, `bool`, `str`, `void`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeName {
    Int,
    Bool,
    Str,
    Void,
}

#[derive(Debug, Clone)]
pub struct Program<'src> {
    pub statements: Vec<Stmt<'src>>,
}

#[derive(Debug, Clone)]
pub struct Block<'src> {
    pub statements: Vec<Stmt<'src>>,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub enum Expr<'src> {
    IntLiteral { value: i32, line: usize },
    StringLiteral { value: Vec<u8>, line: usize },
    BoolLiteral { value: bool, line: usize },
    VarAccess { name: Token<'src> },
    Unary { op: Token<'src>, operand: Box<Expr<'src>> },
    Binary { op: Token<'src>, left: Box<Expr<'src>>, right: Box<Expr<'src>> },
    VarAssign { name: Token<'src>, value: Box<Expr<'src>> },
    Call { callee: Token<'src>, args: Vec<Expr<'src>> },
}

impl<'src> Expr<'src> {
    pub fn line(&self) -> usize {
        match self {
            Expr::IntLiteral { line, .. } => *line,
            Expr::StringLiteral { line, .. } => *line,
            Expr::BoolLiteral { line, .. } => *line,
            Expr::VarAccess { name } => name.line,
            Expr::Unary { op, .. } => op.line,
            Expr::Binary { op, .. } => op.line,
            Expr::VarAssign { name, .. } => name.line,
            Expr::Call { callee, .. } => callee.line,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Stmt<'src> {
    // Initializer is optional at the grammar level (`IDENT ('=' expression)? ';'`);
    // the type checker rejects a missing one since types are inferred, never declared.
    VarDecl { name: Token<'src>, initializer: Option<Expr<'src>> },
    PrintStmt { expr: Expr<'src>, line: usize },
    ExprStmt { expr: Expr<'src> },
    Block(Block<'src>),
    If {
        condition: Expr<'src>,
        then_branch: Block<'src>,
        else_branch: Option<Box<ElseBranch<'src>>>,
        line: usize,
    },
    While { condition: Expr<'src>, body: Block<'src>, line: usize },
    FuncDecl { name: Token<'src>, params: Vec<Token<'src>>, return_type: TypeName, body: Block<'src> },
    Return { value: Option<Expr<'src>>, line: usize },
}

/// An `else` clause is either a plain block or a nested `elif`, which
/// parses as another `If` node (see the grammar's `'elif' if_stmt`).
#[derive(Debug, Clone)]
pub enum ElseBranch<'src> {
    Block(Block<'src>),
    If(Box<Stmt<'src>>),
}
