// Integration tests for det: each test runs a complete program through
// the full pipeline (lex -> parse -> type-check -> compile -> run) and
// checks that it succeeds or fails the way the language's operator,
// arity and scope rules require.

use det::compiler::{Compiler, GlobalNames};
use det::errors::{DetError, ErrorKind};
use det::parser::Parser;
use det::symbol_table::SymbolTable;
use det::type_checker::TypeChecker;
use det::value::Value;
use det::vm::Vm;

fn run(src: &str) -> Result<(), Vec<DetError>> {
    run_value(src).map(|_| ())
}

fn run_value(src: &str) -> Result<Value, Vec<DetError>> {
    let program = Parser::new(src, false).parse()?;

    let mut table = SymbolTable::new();
    TypeChecker::new().check(&program, &mut table)?;

    let mut vm = Vm::new();
    let mut globals = GlobalNames::new();
    let script = {
        let compiler = Compiler::new(vm.heap(), &mut globals);
        compiler.compile(&program)?
    };

    vm.run(script).map_err(|e| vec![e])
}

#[test]
fn hello_world_prints() {
    assert!(run(r#"print "hello, world";"#).is_ok());
}

#[test]
fn fibonacci_runs_to_completion() {
    let src = r#"
        func fib(n): int {
            if n <= 1 {
                return n;
            }
            return fib(n - 1) + fib(n - 2);
        }
        print fib(15);
    "#;
    assert!(run(src).is_ok());
}

#[test]
fn while_loop_and_compound_assignment() {
    let src = r#"
        var total = 0;
        var i = 0;
        while i < 10 {
            total += i;
            i += 1;
        }
        print total;
    "#;
    assert!(run(src).is_ok());
}

#[test]
fn elif_chain_compiles_as_nested_if() {
    let src = r#"
        func classify(n): str {
            if n < 0 {
                return "negative";
            } elif n == 0 {
                return "zero";
            } else {
                return "positive";
            }
        }
        print classify(-5);
        print classify(0);
        print classify(5);
    "#;
    assert!(run(src).is_ok());
}

#[test]
fn string_concatenation_and_comparison() {
    let src = r#"
        var greeting = "hello" + ", " + "world";
        print greeting;
        print greeting == "hello, world";
    "#;
    assert!(run(src).is_ok());
}

#[test]
fn global_shadowing_across_lines_is_allowed() {
    assert!(run("var x = 1; var x = 2; print x;").is_ok());
}

#[test]
fn division_by_zero_is_a_runtime_error() {
    let err = run("print 1 / 0;").unwrap_err();
    assert_eq!(err.len(), 1);
    assert_eq!(err[0].kind, ErrorKind::Runtime);
}

#[test]
fn modulo_by_zero_is_a_runtime_error() {
    let err = run("print 5 % 0;").unwrap_err();
    assert_eq!(err[0].kind, ErrorKind::Runtime);
}

#[test]
fn calling_with_wrong_arity_is_a_type_error() {
    let src = "func add(a, b): int { return a + b; } print add(1);";
    let err = run(src).unwrap_err();
    assert_eq!(err[0].kind, ErrorKind::Type);
}

#[test]
fn unbounded_recursion_overflows_the_call_stack() {
    let src = "func spin() { spin(); } spin();";
    let err = run(src).unwrap_err();
    assert_eq!(err[0].kind, ErrorKind::Runtime);
    assert!(err[0].message.contains("Stack overflow"));
}

#[test]
fn type_mismatch_in_assignment_is_rejected() {
    let err = run("var x = 1; x = \"oops\";").unwrap_err();
    assert_eq!(err[0].kind, ErrorKind::Type);
}

#[test]
fn missing_return_on_some_path_is_rejected() {
    let src = "func f(n): int { if n > 0 { return n; } }";
    let err = run(src).unwrap_err();
    assert_eq!(err[0].kind, ErrorKind::Type);
}

#[test]
fn undeclared_variable_is_rejected_by_the_type_checker() {
    let err = run("print y;").unwrap_err();
    assert_eq!(err[0].kind, ErrorKind::Type);
}

#[test]
fn unterminated_string_is_a_lex_error() {
    let err = run("print \"oops;").unwrap_err();
    assert_eq!(err[0].kind, ErrorKind::Lex);
}

#[test]
fn missing_semicolon_is_a_parse_error() {
    let err = run("var x = 1").unwrap_err();
    assert_eq!(err[0].kind, ErrorKind::Parse);
}

#[test]
fn locally_declared_function_is_callable_from_its_declaring_scope() {
    let src = r#"
        func outer(): int {
            func double(n): int { return n * 2; }
            return double(21);
        }
        print outer();
    "#;
    assert!(run(src).is_ok());
}

#[test]
fn locally_declared_function_cannot_call_itself() {
    let src = r#"
        func outer(): int {
            func inner(n): int {
                if n <= 0 { return 0; }
                return inner(n - 1);
            }
            return inner(3);
        }
        print outer();
    "#;
    let err = run(src).unwrap_err();
    assert_eq!(err[0].kind, ErrorKind::Type);
}

#[test]
fn bare_top_level_return_leaves_its_value_on_the_stack() {
    assert!(matches!(run_value("return 1 + 2;"), Ok(Value::Int(3))));
    assert!(matches!(run_value("return -5 + 10;"), Ok(Value::Int(5))));
}

#[test]
fn trailing_expression_statement_leaves_its_value_on_the_stack() {
    let src = "func add(a, b): int { return a + b; } add(400, 700);";
    assert!(matches!(run_value(src), Ok(Value::Int(1100))));
}

#[test]
fn trailing_recursive_call_leaves_its_value_on_the_stack() {
    let src = r#"
        func fib(n): int {
            if n <= 1 { return n; }
            return fib(n - 1) + fib(n - 2);
        }
        fib(8);
    "#;
    assert!(matches!(run_value(src), Ok(Value::Int(21))));
}

#[test]
fn nested_blocks_do_not_leak_locals() {
    let src = r#"
        func f(): int {
            var total = 0;
            {
                var inner = 5;
                total = total + inner;
            }
            return total;
        }
        print f();
    "#;
    assert!(run(src).is_ok());
}
