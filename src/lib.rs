//! Tree-walking interpreter for the Megaladon scripting language.
//!
//! The pipeline is `tokenizer` -> `parser` -> `runtime`: source text
//! becomes a token stream, the tokens become an AST, and the AST is
//! evaluated directly against an arena of lexical scopes. `run_program`
//! and `run_statement` are the two embedding entry points; the binary
//! in `main.rs` is a thin shell over them.

pub mod ast;
pub mod cli;
pub mod environment;
pub mod error;
pub mod parser;
pub mod repl;
pub mod runtime;
pub mod stdlib;
pub mod tokenizer;

use crate::ast::Stmt;
use crate::error::Diagnostics;
use crate::parser::parse;
use crate::runtime::{Interpreter, Value};
use crate::tokenizer::scan;

/// Runs a complete program in a fresh interpreter. All lexical, syntax,
/// and runtime problems come back in the returned collection; an empty
/// collection means the program ran to completion.
pub fn run_program(source: &str) -> Diagnostics {
    let mut interpreter = Interpreter::new();
    run_program_in(source, &mut interpreter)
}

/// Like [`run_program`], but against a caller-owned interpreter so
/// global state survives across calls.
///
/// Evaluation only starts on a clean parse: a program with lexical or
/// syntax errors reports them all and never runs.
pub fn run_program_in(source: &str, interpreter: &mut Interpreter) -> Diagnostics {
    let (tokens, mut diagnostics) = scan(source);
    let (program, parse_diagnostics) = parse(&tokens);
    diagnostics.extend(parse_diagnostics);
    if !diagnostics.is_empty() {
        return diagnostics;
    }

    if let Err(err) = interpreter.interpret(&program) {
        diagnostics.runtime(err);
    }
    diagnostics
}

/// Runs one REPL submission against a persistent interpreter. When the
/// submission is a single bare expression its value comes back for
/// echoing; declarations and statements yield `None`.
pub fn run_statement(source: &str, interpreter: &mut Interpreter) -> (Diagnostics, Option<Value>) {
    let (tokens, mut diagnostics) = scan(source);
    let (program, parse_diagnostics) = parse(&tokens);
    diagnostics.extend(parse_diagnostics);
    if !diagnostics.is_empty() {
        return (diagnostics, None);
    }

    if let [Stmt::Expression(expr)] = program.as_slice() {
        return match interpreter.eval(expr) {
            Ok(value) => (diagnostics, Some(value)),
            Err(err) => {
                diagnostics.runtime(err);
                (diagnostics, None)
            }
        };
    }

    if let Err(err) = interpreter.interpret(&program) {
        diagnostics.runtime(err);
    }
    (diagnostics, None)
}
