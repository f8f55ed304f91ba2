//! Compiler front end for the minic language: a small, statically typed
//! imperative language with functions, `int`/`float` scalars, fixed-size
//! arrays, conditionals, counted and conditional loops, and two print
//! built-ins.
//!
//! The pipeline is linear:
//! characters → [tokens][lexer] → [AST][parser] → [LLVM IR][codegen] → bitcode.

pub use lexer::{tokenize, Lexer};
pub use parser::parse;

pub mod ast;
pub mod codegen;
pub mod err;
pub mod lexer;
pub mod parser;
