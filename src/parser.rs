// File: src/parser.rs
//
// Recursive-descent parser with one token of lookahead. Builds the
// AST defined in `ast.rs` directly off the lexer's token stream (no
// token vector is ever materialized). On a syntax error the parser
// sets `had_error`, skips forward to the next `;` or EOF (so a single
// pass can report more than one syntax error), and keeps going; the
// final AST is discarded if any error was recorded.

use crate::ast::{Block, ElseBranch, Expr, Program, Stmt, TypeName};
use crate::errors::{DetError, ErrorKind};
use crate::lexer::{Lexer, Token, TokenKind};

pub struct Parser<'src> {
    lexer: Lexer<'src>,
    current: Token<'src>,
    previous: Token<'src>,
    had_error: bool,
    panic_mode: bool,
    errors: Vec<DetError>,
    pub debug_trace: bool,
    trace_depth: usize,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str, debug_trace: bool) -> Self {
        let mut lexer = Lexer::new(source);
        let first = lexer.next_token();
        Parser {
            lexer,
            current: first,
            previous: first,
            had_error: false,
            panic_mode: false,
            errors: Vec::new(),
            debug_trace,
            trace_depth: 0,
        }
    }

    /// Parses the whole source as one `Program`. Returns `None` (and
    /// has already queued diagnostics) on any syntax error.
    pub fn parse(mut self) -> Result<Program<'src>, Vec<DetError>> {
        let mut statements = Vec::new();
        while self.current.kind != TokenKind::Eof {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
            if self.panic_mode {
                self.synchronize();
            }
        }
        if self.had_error {
            Err(self.errors)
        } else {
            Ok(Program { statements })
        }
    }

    // --- token plumbing -----------------------------------------------

    fn traced<T>(&mut self, name: &'static str, f: impl FnOnce(&mut Self) -> T) -> T {
        if self.debug_trace {
            eprintln!("{}-> {name}", "  ".repeat(self.trace_depth));
        }
        self.trace_depth += 1;
        let result = f(self);
        self.trace_depth -= 1;
        if self.debug_trace {
            eprintln!("{}<- {name}", "  ".repeat(self.trace_depth));
        }
        result
    }

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.lexer.next_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            self.lex_error(self.current.lexeme.to_string(), self.current.line);
        }
    }

    /// A bad token from the lexer (unterminated string, unknown
    /// character) is its own diagnostic kind, distinct from a syntax
    /// error over an otherwise well-formed token stream.
    fn lex_error(&mut self, message: String, line: usize) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        self.errors.push(DetError::new(ErrorKind::Lex, message, line));
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.check(kind) {
            self.advance();
        } else {
            self.error_at_current(message.to_string());
        }
    }

    fn error_at_current(&mut self, message: String) {
        self.error_at(self.current, message);
    }

    fn error_at_previous(&mut self, message: String) {
        self.error_at(self.previous, message);
    }

    fn error_at(&mut self, token: Token<'src>, message: String) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        let mut err = DetError::new(ErrorKind::Parse, message, token.line);
        if token.kind != TokenKind::Eof {
            err = err.with_near(token.lexeme.to_string());
        }
        self.errors.push(err);
    }

    /// Skips tokens until just past the next `;` or until `EOF`.
    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            self.advance();
        }
    }

    // --- declarations ---------------------------------------------------

    fn declaration(&mut self) -> Option<Stmt<'src>> {
        self.traced("declaration", |p| {
            if p.matches(TokenKind::Func) {
                p.func_decl()
            } else if p.matches(TokenKind::Var) {
                p.var_decl()
            } else {
                p.statement()
            }
        })
    }

    fn func_decl(&mut self) -> Option<Stmt<'src>> {
        self.consume(TokenKind::Identifier, "Expect function name.");
        let name = self.previous;
        self.consume(TokenKind::LeftParen, "Expect '(' after function name.");
        let mut params = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                self.consume(TokenKind::Identifier, "Expect parameter name.");
                params.push(self.previous);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");

        let return_type = if self.matches(TokenKind::Colon) {
            self.type_name()?
        } else {
            TypeName::Void
        };

        self.consume(TokenKind::LeftBrace, "Expect '{' before function body.");
        let body = self.block();
        Some(Stmt::FuncDecl { name, params, return_type, body })
    }

    fn type_name(&mut self) -> Option<TypeName> {
        let ty = match self.current.kind {
            TokenKind::KwInt => TypeName::Int,
            TokenKind::KwBool => TypeName::Bool,
            TokenKind::KwStr => TypeName::Str,
            TokenKind::KwVoid => TypeName::Void,
            _ => {
                self.error_at_current("Expect type name.".to_string());
                return None;
            }
        };
        self.advance();
        Some(ty)
    }

    fn var_decl(&mut self) -> Option<Stmt<'src>> {
        self.consume(TokenKind::Identifier, "Expect variable name.");
        let name = self.previous;
        let initializer = if self.matches(TokenKind::Equal) { Some(self.expression()) } else { None };
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.");
        Some(Stmt::VarDecl { name, initializer })
    }

    // --- statements -------------------------------------------------------

    fn statement(&mut self) -> Option<Stmt<'src>> {
        self.traced("statement", |p| {
            if p.matches(TokenKind::If) {
                p.if_stmt()
            } else if p.matches(TokenKind::While) {
                p.while_stmt()
            } else if p.matches(TokenKind::LeftBrace) {
                Some(Stmt::Block(p.block()))
            } else if p.matches(TokenKind::Return) {
                p.return_stmt()
            } else if p.matches(TokenKind::Print) {
                p.print_stmt()
            } else {
                p.expr_stmt()
            }
        })
    }

    fn block(&mut self) -> Block<'src> {
        let line = self.previous.line;
        let mut statements = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
            if self.panic_mode {
                self.synchronize();
            }
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
        Block { statements, line }
    }

    fn if_stmt(&mut self) -> Option<Stmt<'src>> {
        let line = self.previous.line;
        let condition = self.expression();
        self.consume(TokenKind::LeftBrace, "Expect '{' after if condition.");
        let then_branch = self.block();
        let else_branch = if self.matches(TokenKind::Elif) {
            self.if_stmt().map(|s| Box::new(ElseBranch::If(Box::new(s))))
        } else if self.matches(TokenKind::Else) {
            self.consume(TokenKind::LeftBrace, "Expect '{' after else.");
            Some(Box::new(ElseBranch::Block(self.block())))
        } else {
            None
        };
        Some(Stmt::If { condition, then_branch, else_branch, line })
    }

    fn while_stmt(&mut self) -> Option<Stmt<'src>> {
        let line = self.previous.line;
        let condition = self.expression();
        self.consume(TokenKind::LeftBrace, "Expect '{' after while condition.");
        let body = self.block();
        Some(Stmt::While { condition, body, line })
    }

    fn return_stmt(&mut self) -> Option<Stmt<'src>> {
        let line = self.previous.line;
        let value = if !self.check(TokenKind::Semicolon) { Some(self.expression()) } else { None };
        self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
        Some(Stmt::Return { value, line })
    }

    fn print_stmt(&mut self) -> Option<Stmt<'src>> {
        let line = self.previous.line;
        let expr = self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        Some(Stmt::PrintStmt { expr, line })
    }

    fn expr_stmt(&mut self) -> Option<Stmt<'src>> {
        let expr = self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        Some(Stmt::ExprStmt { expr })
    }

    // --- expressions, lowest to highest precedence ------------------------

    fn expression(&mut self) -> Expr<'src> {
        self.traced("expression", |p| p.assignment())
    }

    fn assignment(&mut self) -> Expr<'src> {
        self.traced("assignment", |p| {
            let expr = p.equality();

            let compound_op = match p.current.kind {
                TokenKind::Equal => None,
                TokenKind::PlusEqual => Some(TokenKind::Plus),
                TokenKind::MinusEqual => Some(TokenKind::Minus),
                TokenKind::StarEqual => Some(TokenKind::Star),
                TokenKind::SlashEqual => Some(TokenKind::Slash),
                TokenKind::PercentEqual => Some(TokenKind::Percent),
                _ => return expr,
            };
            let assign_token = p.current;
            p.advance();
            let rhs = p.assignment();

            let target_name = match &expr {
                Expr::VarAccess { name } => *name,
                _ => {
                    p.error_at_previous("Invalid assignment target.".to_string());
                    return expr;
                }
            };

            let value = match compound_op {
                None => rhs,
                Some(op_kind) => {
                    // Desugar `x op= e` into `VarAssign(x, BinaryOp(op, VarAccess(x), e))`.
                    // The target is re-read via a fresh copy of its (non-owning) token,
                    // never by reusing `expr`'s subtree, so no node ends up with two parents.
                    let op = Token { kind: op_kind, lexeme: assign_token.lexeme, line: assign_token.line };
                    Expr::Binary {
                        op,
                        left: Box::new(Expr::VarAccess { name: target_name }),
                        right: Box::new(rhs),
                    }
                }
            };

            Expr::VarAssign { name: target_name, value: Box::new(value) }
        })
    }

    fn equality(&mut self) -> Expr<'src> {
        self.traced("equality", |p| {
            let mut expr = p.comparison();
            while matches!(p.current.kind, TokenKind::EqualEqual | TokenKind::BangEqual) {
                let op = p.current;
                p.advance();
                let right = p.comparison();
                expr = Expr::Binary { op, left: Box::new(expr), right: Box::new(right) };
            }
            expr
        })
    }

    fn comparison(&mut self) -> Expr<'src> {
        self.traced("comparison", |p| {
            let mut expr = p.term();
            while matches!(
                p.current.kind,
                TokenKind::Less | TokenKind::LessEqual | TokenKind::Greater | TokenKind::GreaterEqual
            ) {
                let op = p.current;
                p.advance();
                let right = p.term();
                expr = Expr::Binary { op, left: Box::new(expr), right: Box::new(right) };
            }
            expr
        })
    }

    fn term(&mut self) -> Expr<'src> {
        self.traced("term", |p| {
            let mut expr = p.factor();
            while matches!(p.current.kind, TokenKind::Plus | TokenKind::Minus) {
                let op = p.current;
                p.advance();
                let right = p.factor();
                expr = Expr::Binary { op, left: Box::new(expr), right: Box::new(right) };
            }
            expr
        })
    }

    fn factor(&mut self) -> Expr<'src> {
        self.traced("factor", |p| {
            let mut expr = p.unary();
            while matches!(p.current.kind, TokenKind::Star | TokenKind::Slash | TokenKind::Percent) {
                let op = p.current;
                p.advance();
                let right = p.unary();
                expr = Expr::Binary { op, left: Box::new(expr), right: Box::new(right) };
            }
            expr
        })
    }

    fn unary(&mut self) -> Expr<'src> {
        self.traced("unary", |p| {
            if matches!(p.current.kind, TokenKind::Minus | TokenKind::Bang) {
                let op = p.current;
                p.advance();
                let operand = p.unary();
                Expr::Unary { op, operand: Box::new(operand) }
            } else {
                p.primary()
            }
        })
    }

    fn primary(&mut self) -> Expr<'src> {
        self.traced("primary", |p| {
            let line = p.current.line;
            match p.current.kind {
                TokenKind::Int => {
                    let lexeme = p.current.lexeme;
                    p.advance();
                    let value = lexeme.parse::<i32>().unwrap_or(0);
                    Expr::IntLiteral { value, line }
                }
                TokenKind::String => {
                    let lexeme = p.current.lexeme;
                    p.advance();
                    let value = lexeme[1..lexeme.len() - 1].as_bytes().to_vec();
                    Expr::StringLiteral { value, line }
                }
                TokenKind::True => {
                    p.advance();
                    Expr::BoolLiteral { value: true, line }
                }
                TokenKind::False => {
                    p.advance();
                    Expr::BoolLiteral { value: false, line }
                }
                TokenKind::Identifier => {
                    let name = p.current;
                    p.advance();
                    if p.matches(TokenKind::LeftParen) {
                        let mut args = Vec::new();
                        if !p.check(TokenKind::RightParen) {
                            loop {
                                args.push(p.expression());
                                if !p.matches(TokenKind::Comma) {
                                    break;
                                }
                            }
                        }
                        p.consume(TokenKind::RightParen, "Expect ')' after arguments.");
                        Expr::Call { callee: name, args }
                    } else {
                        Expr::VarAccess { name }
                    }
                }
                TokenKind::LeftParen => {
                    p.advance();
                    let expr = p.expression();
                    p.consume(TokenKind::RightParen, "Expect ')' after expression.");
                    expr
                }
                _ => {
                    p.error_at_current("Expect expression.".to_string());
                    Expr::IntLiteral { value: 0, line }
                }
            }
        })
    }
}
