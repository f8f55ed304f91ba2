//! End-to-end scenarios: compile source strings through the whole pipeline,
//! verify the emitted module, inspect the IR, and JIT-execute the programs
//! that do not call external functions.

use std::io::Cursor;

use inkwell::context::Context;

use minic::codegen::Codegen;
use minic::lexer::Lexer;
use minic::parser;

/// Compile the source through lexer, parser, and codegen (which verifies the
/// module), and return the textual IR.
fn compile_ir(src: &str) -> String {
    let (program, funcs) = match parser::parse(Lexer::new(Cursor::new(src))) {
        Ok(parsed) => parsed,
        Err(e) => panic!("{}", e.full_msg(src)),
    };

    let ctx = Context::create();
    let mut codegen = Codegen::new(&ctx, "test", &funcs);
    codegen.compile(&program).unwrap();
    codegen.module().print_to_string().to_string()
}

/// Compile the source and JIT-run its `main`, returning the produced value.
fn run_main(src: &str) -> i32 {
    let (program, funcs) = match parser::parse(Lexer::new(Cursor::new(src))) {
        Ok(parsed) => parsed,
        Err(e) => panic!("{}", e.full_msg(src)),
    };

    let ctx = Context::create();
    let mut codegen = Codegen::new(&ctx, "test", &funcs);
    codegen.compile(&program).unwrap();
    unsafe { codegen.jit_run("main").unwrap() }
}

#[test]
fn scalar_arithmetic() {
    let src = "int main() { int a = 3; int b = 4; return a + b * 2; }";

    let ir = compile_ir(src);
    assert!(ir.contains("mul i32"), "expected integer multiply:\n{ir}");
    assert!(ir.contains("add i32"), "expected integer add:\n{ir}");

    assert_eq!(run_main(src), 11);
}

#[test]
fn float_path() {
    let ir = compile_ir("float f(float x) { return x / 2.0 + 1.5; }");
    assert!(ir.contains("fdiv float"), "expected float divide:\n{ir}");
    assert!(ir.contains("fadd float"), "expected float add:\n{ir}");
    // no integer arithmetic on the float path
    assert!(!ir.contains("sdiv"), "unexpected integer divide:\n{ir}");
    assert!(!ir.contains("add i32"), "unexpected integer add:\n{ir}");
}

#[test]
fn negative_literal_vs_binary_minus() {
    let src = "int main() { int a = -3; int b = a - -2; return b; }";
    assert_eq!(run_main(src), -1);
}

#[test]
fn for_loop_with_array() {
    let src = "int main() { \
               int x[4] = {0,0,0,0}; \
               for (int i = 0; i < 4; i = i + 1) { x[i] = i; } \
               return x[3]; }";

    let ir = compile_ir(src);
    assert!(ir.contains("icmp slt"), "expected signed compare:\n{ir}");
    assert!(ir.contains("getelementptr"), "expected element stores:\n{ir}");
    assert!(ir.contains("[4 x i32]"), "expected array alloca:\n{ir}");

    assert_eq!(run_main(src), 3);
}

#[test]
fn while_with_if_and_builtin_call() {
    let src = "int main() { \
               int i = 0; \
               while (i < 3) { \
                 if (i == 1) { printVarInt(i); } else { printVarInt(0); } \
                 i = i + 1; \
               } \
               return 0; }";

    // not run: printVarInt is an external symbol
    let ir = compile_ir(src);
    assert!(
        ir.contains("declare void @printVarInt(i32"),
        "expected external declaration:\n{ir}"
    );
    assert!(
        ir.contains("call void @printVarInt"),
        "expected built-in call:\n{ir}"
    );
    assert!(ir.contains("icmp slt"), "expected loop compare:\n{ir}");
    assert!(ir.contains("icmp eq"), "expected branch compare:\n{ir}");
}

#[test]
fn nested_control_flow_runs() {
    let src = "int main() { \
               int n = 0; \
               int j = 0; \
               while (j < 2) { \
                 for (int i = 0; i < 3; i = i + 1) { \
                   if (i == 1) { n = n + 10; } else { n = n + 1; } \
                 } \
                 j = j + 1; \
               } \
               return n; }";

    // per outer iteration: 1 + 10 + 1
    assert_eq!(run_main(src), 24);
}

#[test]
fn user_function_calls_run() {
    let src = "int add(int a, int b) { return a + b; } \
               int twice(int x) { return add(x, x); } \
               int main() { return twice(7) + add(1, 2); }";

    assert_eq!(run_main(src), 17);
}

#[test]
fn recursion_runs() {
    let src = "int fact(int n) { if (n < 2) { return 1; } return n * fact(n - 1); } \
               int main() { return fact(5); }";

    assert_eq!(run_main(src), 120);
}

#[test]
fn float_comparison_ir() {
    let ir = compile_ir(
        "int main() { float x = 0.0; while (x < 1.5) { x = x + 0.5; } return 0; }",
    );
    assert!(ir.contains("fcmp olt"), "expected ordered compare:\n{ir}");
    assert!(ir.contains("fadd float"), "expected float add:\n{ir}");
}

#[test]
fn type_mismatch_is_rejected() {
    let src = "int main() { int a = 1; float b = 2.0; return a + b; }";
    let err = parser::parse(Lexer::new(Cursor::new(src))).unwrap_err();

    assert!(
        matches!(
            err.inner(),
            minic::parser::ParseErr::TypeMismatch { .. }
        ),
        "expected a type mismatch, got: {}",
        err.short_msg()
    );
    assert_eq!(err.line(), Some(1));
}
