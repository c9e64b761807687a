// File: src/compiler.rs
//
// Single-pass compiler: walks the AST and emits bytecode directly into
// a per-function `Chunk`, with no separate intermediate representation.
// The top-level script is compiled as an implicit, unnamed, zero-arity
// function (see SPEC_FULL's decision on the synthetic `<script>` name),
// so the VM only ever has one kind of thing to call.

use crate::ast::{Block, ElseBranch, Expr, Program, Stmt, TypeName};
use crate::bytecode::{Chunk, OpCode};
use crate::errors::{DetError, ErrorKind};
use crate::heap::{GcRoots, Heap};
use crate::lexer::TokenKind;
use crate::value::{ObjFunction, ObjRef, Value};

/// Persistent mapping from a global's source name to its dense slot
/// index, carried across compilations so the interactive prompt can
/// refer to globals declared on earlier lines.
#[derive(Default)]
pub struct GlobalNames {
    names: Vec<String>,
}

impl GlobalNames {
    pub fn new() -> Self {
        GlobalNames::default()
    }

    fn index_of(&mut self, name: &str) -> Result<u8, String> {
        if let Some(pos) = self.names.iter().position(|n| n == name) {
            return Ok(pos as u8);
        }
        if self.names.len() >= 256 {
            return Err("Too many global variables.".to_string());
        }
        self.names.push(name.to_string());
        Ok((self.names.len() - 1) as u8)
    }

    fn find(&self, name: &str) -> Option<u8> {
        self.names.iter().position(|n| n == name).map(|p| p as u8)
    }
}

struct Local {
    name: String,
    depth: usize,
}

struct FunctionState {
    chunk: Chunk,
    name: Option<String>,
    arity: u8,
    locals: Vec<Local>,
    scope_depth: usize,
}

impl FunctionState {
    fn new(name: Option<String>) -> Self {
        // Slot 0 is reserved for the callee's own value (see OP_CALL's
        // frame-base computation in vm.rs).
        FunctionState {
            chunk: Chunk::new(),
            name,
            arity: 0,
            locals: vec![Local { name: String::new(), depth: 0 }],
            scope_depth: 0,
        }
    }
}

pub struct Compiler<'h> {
    heap: &'h Heap,
    globals: &'h mut GlobalNames,
    states: Vec<FunctionState>,
    errors: Vec<DetError>,
    /// Holds an object allocated but not yet stored anywhere a chunk's
    /// `constants` would reach it — e.g. a function's name string
    /// between its own allocation and the `ObjFunction` allocation that
    /// takes ownership of it. Cleared once it's safely stored.
    scratch_root: Option<ObjRef>,
}

impl<'h> GcRoots for Compiler<'h> {
    fn mark_roots(&self, heap: &Heap) {
        for state in &self.states {
            for c in &state.chunk.constants {
                heap.mark_value(*c);
            }
        }
        if let Some(r) = self.scratch_root {
            heap.mark_object(r);
        }
    }
}

impl<'h> Compiler<'h> {
    pub fn new(heap: &'h Heap, globals: &'h mut GlobalNames) -> Self {
        Compiler {
            heap,
            globals,
            states: vec![FunctionState::new(None)],
            errors: Vec::new(),
            scratch_root: None,
        }
    }

    pub fn compile(mut self, program: &Program<'_>) -> Result<ObjRef, Vec<DetError>> {
        // A trailing bare expression statement becomes the script's
        // return value instead of being popped, so `add(400, 700);` as
        // the program's last line leaves `Int(1100)` on the stack
        // rather than the usual Int(0) placeholder (spec.md §8).
        let tail_expr = match program.statements.last() {
            Some(Stmt::ExprStmt { expr }) => Some(expr),
            _ => None,
        };
        let body_count = if tail_expr.is_some() { program.statements.len() - 1 } else { program.statements.len() };

        for stmt in &program.statements[..body_count] {
            self.compile_stmt(stmt);
        }

        match tail_expr {
            Some(expr) => {
                let line = expr.line();
                self.compile_expr(expr);
                self.current().chunk.write_op(OpCode::Return, line);
            }
            None => self.emit_implicit_return(0),
        }

        if !self.errors.is_empty() {
            return Err(self.errors);
        }

        let state = self.states.pop().expect("script function state");
        let func = ObjFunction { arity: 0, name: None, chunk: state.chunk };
        Ok(self.heap.alloc_function(func, &self))
    }

    fn error(&mut self, line: usize, message: impl Into<String>) {
        self.errors.push(DetError::new(ErrorKind::Compile, message, line));
    }

    fn current(&mut self) -> &mut FunctionState {
        self.states.last_mut().expect("at least one function state")
    }

    fn emit_implicit_return(&mut self, line: usize) {
        // Every function's bytecode ends with a return (invariant #6).
        // A non-void function reaching this point has already failed
        // type checking, so the pushed placeholder is never observed
        // by well-typed code (see SPEC_FULL's decision #1).
        self.emit_constant(Value::Int(0), line);
        self.current().chunk.write_op(OpCode::Return, line);
    }

    // --- statements -------------------------------------------------------

    fn compile_stmt(&mut self, stmt: &Stmt<'_>) {
        match stmt {
            Stmt::VarDecl { name, initializer } => {
                let line = name.line;
                match initializer {
                    Some(expr) => self.compile_expr(expr),
                    None => {
                        // Already reported by the type checker; emit a
                        // placeholder so the chunk stays well-formed.
                        self.emit_constant(Value::Int(0), line);
                    }
                }
                self.declare_variable(name.lexeme, line);
            }
            Stmt::PrintStmt { expr, line } => {
                self.compile_expr(expr);
                self.current().chunk.write_op(OpCode::Print, *line);
            }
            Stmt::ExprStmt { expr } => {
                self.compile_expr(expr);
                self.current().chunk.write_op(OpCode::Pop, expr.line());
            }
            Stmt::Block(block) => self.compile_block(block),
            Stmt::If { condition, then_branch, else_branch, line } => {
                self.compile_if(condition, then_branch, else_branch, *line)
            }
            Stmt::While { condition, body, line } => self.compile_while(condition, body, *line),
            Stmt::FuncDecl { name, params, return_type, body } => {
                self.compile_func_decl(name.lexeme, name.line, params, *return_type, body)
            }
            Stmt::Return { value, line } => {
                match value {
                    Some(expr) => self.compile_expr(expr),
                    None => self.emit_constant(Value::Int(0), *line),
                }
                self.current().chunk.write_op(OpCode::Return, *line);
            }
        }
    }

    /// A declaration-statement's value (as opposed to an assignment
    /// *expression*'s) is never left on the stack: globals are copied
    /// out into the globals array and popped; locals simply adopt the
    /// stack slot the initializer already occupies.
    fn declare_variable(&mut self, name: &str, line: usize) {
        if self.current().scope_depth == 0 {
            match self.globals.index_of(name) {
                Ok(idx) => {
                    self.current().chunk.write_op(OpCode::SetGlobal, line);
                    self.current().chunk.write_byte(idx, line);
                    self.current().chunk.write_op(OpCode::Pop, line);
                }
                Err(msg) => self.error(line, msg),
            }
        } else {
            let depth = self.current().scope_depth;
            self.current().locals.push(Local { name: name.to_string(), depth });
        }
    }

    fn compile_block(&mut self, block: &Block<'_>) {
        self.current().scope_depth += 1;
        for stmt in &block.statements {
            self.compile_stmt(stmt);
        }
        self.end_scope(block.line);
    }

    fn end_scope(&mut self, line: usize) {
        let depth = self.current().scope_depth;
        while self.current().locals.last().map(|l| l.depth == depth).unwrap_or(false) {
            self.current().locals.pop();
            self.current().chunk.write_op(OpCode::Pop, line);
        }
        self.current().scope_depth -= 1;
    }

    fn compile_if(
        &mut self,
        condition: &Expr<'_>,
        then_branch: &Block<'_>,
        else_branch: &Option<Box<ElseBranch<'_>>>,
        line: usize,
    ) {
        self.compile_expr(condition);
        let then_jump = self.current().chunk.emit_jump(OpCode::JumpIfFalse, line);
        self.current().chunk.write_op(OpCode::Pop, line);
        self.compile_block(then_branch);
        let else_jump = self.current().chunk.emit_jump(OpCode::Jump, line);

        if let Err(msg) = self.current().chunk.patch_jump(then_jump) {
            self.error(line, msg);
        }
        self.current().chunk.write_op(OpCode::Pop, line);

        if let Some(branch) = else_branch {
            match branch.as_ref() {
                ElseBranch::Block(b) => self.compile_block(b),
                ElseBranch::If(stmt) => self.compile_stmt(stmt),
            }
        }

        if let Err(msg) = self.current().chunk.patch_jump(else_jump) {
            self.error(line, msg);
        }
    }

    fn compile_while(&mut self, condition: &Expr<'_>, body: &Block<'_>, line: usize) {
        let loop_start = self.current().chunk.code.len();
        self.compile_expr(condition);
        let exit_jump = self.current().chunk.emit_jump(OpCode::JumpIfFalse, line);
        self.current().chunk.write_op(OpCode::Pop, line);
        self.compile_block(body);
        if let Err(msg) = self.current().chunk.emit_loop(loop_start, line) {
            self.error(line, msg);
        }
        if let Err(msg) = self.current().chunk.patch_jump(exit_jump) {
            self.error(line, msg);
        }
        self.current().chunk.write_op(OpCode::Pop, line);
    }

    fn compile_func_decl(
        &mut self,
        name: &str,
        line: usize,
        params: &[crate::lexer::Token<'_>],
        _return_type: TypeName,
        body: &Block<'_>,
    ) {
        let is_global = self.current().scope_depth == 0;
        let global_idx = if is_global {
            match self.globals.index_of(name) {
                Ok(idx) => Some(idx),
                Err(msg) => {
                    self.error(line, msg);
                    None
                }
            }
        } else {
            let depth = self.current().scope_depth;
            self.current().locals.push(Local { name: name.to_string(), depth });
            None
        };

        self.states.push(FunctionState::new(Some(name.to_string())));
        self.current().arity = params.len() as u8;
        for param in params {
            let depth = self.current().scope_depth;
            self.current().locals.push(Local { name: param.lexeme.to_string(), depth });
        }

        self.compile_block(body); // body already enters/exits its own nested scope
        self.emit_implicit_return(line);

        let state = self.states.pop().expect("function state just pushed");
        let name_obj = self.heap.alloc_string(name.as_bytes().to_vec(), self);
        self.scratch_root = Some(name_obj);
        let func = ObjFunction { arity: state.arity, name: Some(name_obj), chunk: state.chunk };
        let func_obj = self.heap.alloc_function(func, self);
        self.scratch_root = None;

        let idx = self.current().chunk.add_constant(Value::Obj(func_obj));
        if idx >= 256 {
            self.error(line, "Too many constants in one chunk.");
            return;
        }
        self.current().chunk.write_op(OpCode::Constant, line);
        self.current().chunk.write_byte(idx as u8, line);

        if is_global {
            if let Some(slot) = global_idx {
                self.current().chunk.write_op(OpCode::SetGlobal, line);
                self.current().chunk.write_byte(slot, line);
                self.current().chunk.write_op(OpCode::Pop, line);
            }
        }
        // Local function declarations leave the value on the stack,
        // same as a local `var`: that slot *is* the local.
    }

    // --- expressions --------------------------------------------------------

    fn emit_constant(&mut self, value: Value, line: usize) {
        let idx = self.current().chunk.add_constant(value);
        if idx >= 256 {
            self.error(line, "Too many constants in one chunk.");
            return;
        }
        self.current().chunk.write_op(OpCode::Constant, line);
        self.current().chunk.write_byte(idx as u8, line);
    }

    fn compile_expr(&mut self, expr: &Expr<'_>) {
        match expr {
            Expr::IntLiteral { value, line } => self.emit_constant(Value::Int(*value), *line),
            Expr::StringLiteral { value, line } => {
                let obj = self.heap.alloc_string(value.clone(), self);
                self.emit_constant(Value::Obj(obj), *line);
            }
            Expr::BoolLiteral { value, line } => {
                let op = if *value { OpCode::True } else { OpCode::False };
                self.current().chunk.write_op(op, *line);
            }
            Expr::VarAccess { name } => self.compile_name_load(name.lexeme, name.line),
            Expr::Unary { op, operand } => {
                self.compile_expr(operand);
                let opcode = match op.kind {
                    TokenKind::Minus => OpCode::Negate,
                    TokenKind::Bang => OpCode::Not,
                    _ => unreachable!("parser only produces - and ! as unary operators"),
                };
                self.current().chunk.write_op(opcode, op.line);
            }
            Expr::Binary { op, left, right } => {
                self.compile_expr(left);
                self.compile_expr(right);
                self.emit_binary_op(op.kind, op.line);
            }
            Expr::VarAssign { name, value } => {
                self.compile_expr(value);
                self.compile_name_store(name.lexeme, name.line);
            }
            Expr::Call { callee, args } => {
                self.compile_name_load(callee.lexeme, callee.line);
                for arg in args {
                    self.compile_expr(arg);
                }
                self.current().chunk.write_op(OpCode::Call, callee.line);
                self.current().chunk.write_byte(args.len() as u8, callee.line);
            }
        }
    }

    fn emit_binary_op(&mut self, kind: TokenKind, line: usize) {
        use TokenKind::*;
        let chunk = &mut self.current().chunk;
        match kind {
            Plus => chunk.write_op(OpCode::Add, line),
            Minus => chunk.write_op(OpCode::Subtract, line),
            Star => chunk.write_op(OpCode::Multiply, line),
            Slash => chunk.write_op(OpCode::Divide, line),
            Percent => chunk.write_op(OpCode::Modulo, line),
            EqualEqual => chunk.write_op(OpCode::Equal, line),
            BangEqual => {
                chunk.write_op(OpCode::Equal, line);
                chunk.write_op(OpCode::Not, line);
            }
            Less => chunk.write_op(OpCode::Less, line),
            Greater => chunk.write_op(OpCode::Greater, line),
            LessEqual => {
                chunk.write_op(OpCode::Greater, line);
                chunk.write_op(OpCode::Not, line);
            }
            GreaterEqual => {
                chunk.write_op(OpCode::Less, line);
                chunk.write_op(OpCode::Not, line);
            }
            _ => unreachable!("parser only produces binary operators here"),
        }
    }

    /// Innermost locals, then globals, then undefined.
    fn resolve(&mut self, name: &str, line: usize) -> Option<Resolved> {
        if let Some(slot) = self.current().locals.iter().rposition(|l| l.name == name) {
            return Some(Resolved::Local(slot as u8));
        }
        if let Some(idx) = self.globals.find(name) {
            return Some(Resolved::Global(idx));
        }
        self.error(line, format!("Undefined variable '{name}'."));
        None
    }

    fn compile_name_load(&mut self, name: &str, line: usize) {
        match self.resolve(name, line) {
            Some(Resolved::Local(slot)) => {
                self.current().chunk.write_op(OpCode::GetLocal, line);
                self.current().chunk.write_byte(slot, line);
            }
            Some(Resolved::Global(idx)) => {
                self.current().chunk.write_op(OpCode::GetGlobal, line);
                self.current().chunk.write_byte(idx, line);
            }
            None => {}
        }
    }

    fn compile_name_store(&mut self, name: &str, line: usize) {
        match self.resolve(name, line) {
            Some(Resolved::Local(slot)) => {
                self.current().chunk.write_op(OpCode::SetLocal, line);
                self.current().chunk.write_byte(slot, line);
            }
            Some(Resolved::Global(idx)) => {
                self.current().chunk.write_op(OpCode::SetGlobal, line);
                self.current().chunk.write_byte(idx, line);
            }
            None => {}
        }
    }
}

enum Resolved {
    Local(u8),
    Global(u8),
}
