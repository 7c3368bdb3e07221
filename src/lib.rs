//! Crate root: wires together the compilation pipeline.
//!
//! The stages stay small and composable:
//! - `tokenizer` performs lexical analysis and produces a flat token stream.
//! - `parser` owns all syntactic knowledge, drives the `symtab` scopes and
//!   returns an `ast` whose variable references are already frame slots.
//! - `codegen` lowers each function into tail-call-aware Morpho instructions.
//! - `emit` wraps the functions into the final module text.
//! - `error` centralises the diagnostics shared by the other modules.

pub mod ast;
pub mod codegen;
pub mod emit;
pub mod error;
pub mod parser;
pub mod symtab;
pub mod tokenizer;

pub use ast::{Body, Expr, Function, Program};
pub use codegen::{CompiledFunction, Instruction, Label};
pub use error::{CompileError, CompileResult};

/// Parse source text into a program without generating code.
pub fn parse_program(source: &str) -> CompileResult<Program> {
  let tokens = tokenizer::tokenize(source)?;
  parser::parse(tokens)
}

/// Compile source text into the assembly of a Morpho module named
/// `module_name`.
pub fn generate_assembly(source: &str, module_name: &str) -> CompileResult<String> {
  let program = parse_program(source)?;
  let functions = codegen::generate(&program);
  Ok(emit::render_module(module_name, &functions))
}
