// File: src/type_checker.rs
//
// Single-pass static type checker. Walks the AST produced by the
// parser, resolves every name against a lexically scoped symbol
// table, and enforces the operator/arity/scope rules from spec.md
// §4.3. Runs against a checker-local copy of the persistent symbol
// table so a run that ends in errors never pollutes state the REPL
// relies on between lines; a clean run commits its table back.

use crate::ast::{Block, ElseBranch, Expr, Program, Stmt, TypeName};
use crate::errors::{DetError, ErrorKind};
use crate::lexer::Token;
use crate::symbol_table::{DataType, FuncSignature, SymbolTable};

pub struct TypeChecker {
    table: SymbolTable,
    current_return_type: Option<DataType>,
    errors: Vec<DetError>,
}

impl TypeChecker {
    pub fn new() -> Self {
        TypeChecker { table: SymbolTable::new(), current_return_type: None, errors: Vec::new() }
    }

    /// Checks `program` against a private copy of `table`. On success
    /// the copy (with every new global/function it defined) replaces
    /// `table`; on failure `table` is left untouched and the errors
    /// are returned.
    pub fn check(&mut self, program: &Program<'_>, table: &mut SymbolTable) -> Result<(), Vec<DetError>> {
        self.table = std::mem::take(table);
        self.errors.clear();

        for stmt in &program.statements {
            self.check_stmt(stmt);
        }

        if self.errors.is_empty() {
            *table = std::mem::take(&mut self.table);
            Ok(())
        } else {
            Err(std::mem::take(&mut self.errors))
        }
    }

    fn error(&mut self, line: usize, message: impl Into<String>) {
        self.errors.push(DetError::new(ErrorKind::Type, message, line));
    }

    fn check_block(&mut self, block: &Block<'_>) {
        self.table.enter_scope();
        for stmt in &block.statements {
            self.check_stmt(stmt);
        }
        self.table.exit_scope();
    }

    fn check_stmt(&mut self, stmt: &Stmt<'_>) {
        match stmt {
            Stmt::VarDecl { name, initializer } => {
                let ty = match initializer {
                    Some(expr) => self.check_expr(expr),
                    None => {
                        self.error(name.line, "Variable declaration requires an initializer.");
                        DataType::Error
                    }
                };
                if !self.table.define(name.lexeme, ty, None) {
                    self.error(name.line, format!("Variable '{}' already declared in this scope.", name.lexeme));
                }
            }
            Stmt::PrintStmt { expr, line } => {
                let ty = self.check_expr(expr);
                if ty == DataType::Void {
                    self.error(*line, "Cannot print a void expression.");
                }
            }
            Stmt::ExprStmt { expr } => {
                self.check_expr(expr);
            }
            Stmt::Block(block) => self.check_block(block),
            Stmt::If { condition, then_branch, else_branch, line } => {
                self.check_condition(condition, *line);
                self.check_block(then_branch);
                if let Some(branch) = else_branch {
                    match branch.as_ref() {
                        ElseBranch::Block(block) => self.check_block(block),
                        ElseBranch::If(stmt) => self.check_stmt(stmt),
                    }
                }
            }
            Stmt::While { condition, body, line } => {
                self.check_condition(condition, *line);
                self.check_block(body);
            }
            Stmt::FuncDecl { name, params, return_type, body } => {
                let ret: DataType = (*return_type).into();
                let sig = FuncSignature { arity: params.len(), return_type: ret };
                if !self.table.define(name.lexeme, ret, Some(sig)) {
                    self.error(name.line, format!("Function '{}' already declared in this scope.", name.lexeme));
                }

                let outer_return = self.current_return_type.replace(ret);
                self.table.enter_function();
                for param in params {
                    // See SPEC_FULL's decision #5: untyped parameters are
                    // treated as Int, the only type the grammar lets a
                    // parameter take part in arithmetic with.
                    self.table.define(param.lexeme, DataType::Int, None);
                }
                for s in &body.statements {
                    self.check_stmt(s);
                }
                self.table.exit_function();
                self.current_return_type = outer_return;

                if ret != DataType::Void && !block_always_returns(body) {
                    self.error(name.line, format!("Function '{}' must return a value on every path.", name.lexeme));
                }
            }
            Stmt::Return { value, line } => {
                let actual = match value {
                    Some(expr) => self.check_expr(expr),
                    None => DataType::Void,
                };
                // A bare `return` at the top level isn't inside any
                // declared function, so there's no declared return type
                // to check it against — the script's final value is
                // whatever it returns (spec.md §8's bare-`return` rows).
                if let Some(expected) = self.current_return_type {
                    if actual != DataType::Error && expected != DataType::Error && actual != expected {
                        self.error(
                            *line,
                            format!("Expected return type '{expected}' but got '{actual}'."),
                        );
                    }
                }
            }
        }
    }

    fn check_condition(&mut self, expr: &Expr<'_>, line: usize) {
        let ty = self.check_expr(expr);
        if ty != DataType::Bool && ty != DataType::Error {
            self.error(line, format!("Condition must be 'bool', got '{ty}'."));
        }
    }

    fn check_expr(&mut self, expr: &Expr<'_>) -> DataType {
        match expr {
            Expr::IntLiteral { .. } => DataType::Int,
            Expr::StringLiteral { .. } => DataType::String,
            Expr::BoolLiteral { .. } => DataType::Bool,
            Expr::VarAccess { name } => self.lookup_var(name),
            Expr::Unary { op, operand } => self.check_unary(op, operand),
            Expr::Binary { op, left, right } => self.check_binary(op, left, right),
            Expr::VarAssign { name, value } => {
                let value_ty = self.check_expr(value);
                let var_ty = self.lookup_var(name);
                if var_ty != DataType::Error && value_ty != DataType::Error && var_ty != value_ty {
                    self.error(
                        name.line,
                        format!("Cannot assign '{value_ty}' to variable '{}' of type '{var_ty}'.", name.lexeme),
                    );
                }
                value_ty
            }
            Expr::Call { callee, args } => self.check_call(callee, args),
        }
    }

    fn lookup_var(&mut self, name: &Token<'_>) -> DataType {
        let ty = self.table.lookup(name.lexeme);
        if ty == DataType::Error {
            self.error(name.line, format!("Undefined variable '{}'.", name.lexeme));
        }
        ty
    }

    fn check_unary(&mut self, op: &Token<'_>, operand: &Expr<'_>) -> DataType {
        let ty = self.check_expr(operand);
        if ty == DataType::Error {
            return DataType::Error;
        }
        use crate::lexer::TokenKind::*;
        match op.kind {
            Minus if ty == DataType::Int => DataType::Int,
            Bang if ty == DataType::Bool => DataType::Bool,
            Minus => {
                self.error(op.line, format!("Cannot negate '{ty}'."));
                DataType::Error
            }
            Bang => {
                self.error(op.line, format!("Cannot apply '!' to '{ty}'."));
                DataType::Error
            }
            _ => DataType::Error,
        }
    }

    fn check_binary(&mut self, op: &Token<'_>, left: &Expr<'_>, right: &Expr<'_>) -> DataType {
        let lt = self.check_expr(left);
        let rt = self.check_expr(right);
        if lt == DataType::Error || rt == DataType::Error {
            return DataType::Error;
        }

        use crate::lexer::TokenKind::*;
        match op.kind {
            Plus if lt == DataType::Int && rt == DataType::Int => DataType::Int,
            Plus if lt == DataType::String && rt == DataType::String => DataType::String,
            Minus | Star | Slash | Percent if lt == DataType::Int && rt == DataType::Int => DataType::Int,
            Plus | Minus | Star | Slash | Percent => {
                self.error(op.line, format!("Operator '{}' not defined for '{lt}' and '{rt}'.", op.lexeme));
                DataType::Error
            }
            Less | LessEqual | Greater | GreaterEqual if lt == DataType::Int && rt == DataType::Int => {
                DataType::Bool
            }
            Less | LessEqual | Greater | GreaterEqual => {
                self.error(op.line, format!("Comparison '{}' requires two 'int' operands.", op.lexeme));
                DataType::Error
            }
            EqualEqual | BangEqual if lt == rt => DataType::Bool,
            EqualEqual | BangEqual => {
                self.error(op.line, format!("Cannot compare '{lt}' and '{rt}'."));
                DataType::Error
            }
            _ => DataType::Error,
        }
    }

    fn check_call(&mut self, callee: &Token<'_>, args: &[Expr<'_>]) -> DataType {
        for arg in args {
            self.check_expr(arg);
        }
        match self.table.lookup_func(callee.lexeme).cloned() {
            Some(sig) => {
                if sig.arity != args.len() {
                    self.error(
                        callee.line,
                        format!(
                            "Function '{}' expects {} argument(s) but got {}.",
                            callee.lexeme,
                            sig.arity,
                            args.len()
                        ),
                    );
                    DataType::Error
                } else {
                    sig.return_type
                }
            }
            None => {
                self.error(callee.line, format!("Undefined function '{}'.", callee.lexeme));
                DataType::Error
            }
        }
    }
}

impl Default for TypeChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether every path through `block` ends in an explicit `return`.
/// Used to enforce SPEC_FULL's decision that a non-`void` function
/// must return explicitly on every path rather than falling off the
/// end.
fn block_always_returns(block: &Block<'_>) -> bool {
    block.statements.last().map(stmt_always_returns).unwrap_or(false)
}

fn stmt_always_returns(stmt: &Stmt<'_>) -> bool {
    match stmt {
        Stmt::Return { .. } => true,
        Stmt::Block(inner) => block_always_returns(inner),
        Stmt::If { then_branch, else_branch: Some(branch), .. } => {
            block_always_returns(then_branch)
                && match branch.as_ref() {
                    ElseBranch::Block(b) => block_always_returns(b),
                    ElseBranch::If(stmt) => stmt_always_returns(stmt),
                }
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn check_source(src: &str) -> Result<(), Vec<DetError>> {
        let program = Parser::new(src, false).parse().expect("parses");
        let mut checker = TypeChecker::new();
        let mut table = SymbolTable::new();
        checker.check(&program, &mut table)
    }

    #[test]
    fn redefinition_at_depth_zero_is_accepted() {
        assert!(check_source("var x = 1; var x = 2;").is_ok());
    }

    #[test]
    fn redefinition_at_nested_depth_is_rejected() {
        assert!(check_source("{ var x = 1; var x = 2; }").is_err());
    }

    #[test]
    fn undefined_variable_read_is_rejected() {
        assert!(check_source("print x;").is_err());
    }

    #[test]
    fn print_of_void_call_is_rejected() {
        let src = "func f() { print 1; } print f();";
        assert!(check_source(src).is_err());
    }

    #[test]
    fn string_concatenation_is_accepted() {
        assert!(check_source("print \"a\" + \"b\";").is_ok());
    }

    #[test]
    fn string_subtraction_is_rejected() {
        assert!(check_source("print \"a\" - \"b\";").is_err());
    }

    #[test]
    fn not_on_integer_is_rejected() {
        assert!(check_source("print !1;").is_err());
    }

    #[test]
    fn bare_return_at_top_level_is_accepted() {
        assert!(check_source("return 1 + 2;").is_ok());
    }

    #[test]
    fn recursive_global_function_is_accepted() {
        let src = "func fact(n): int { if n <= 1 { return 1; } return n * fact(n - 1); } print fact(5);";
        assert!(check_source(src).is_ok());
    }

    #[test]
    fn nested_function_calling_itself_is_rejected() {
        // No closures: a locally declared function cannot see its own
        // name from inside its own body, only globals can recurse.
        let src = r#"
            func outer(): int {
                func inner(n): int {
                    if n <= 0 { return 0; }
                    return inner(n - 1);
                }
                return inner(3);
            }
        "#;
        assert!(check_source(src).is_err());
    }

    #[test]
    fn nested_function_called_from_its_declaring_scope_is_accepted() {
        let src = r#"
            func outer(): int {
                func helper(n): int { return n * 2; }
                return helper(5);
            }
            print outer();
        "#;
        assert!(check_source(src).is_ok());
    }
}
