//! Crate root: wires together the compilation pipeline.
//!
//! The stages are small and run strictly in order:
//! - `tokenizer` performs lexical analysis and produces a flat token stream.
//! - `parser` owns all syntactic knowledge and returns a function AST with locals.
//! - `codegen` lays out the stack frame and lowers the function into RISC-V assembly.
//! - `error` centralises reporting utilities shared by the other modules.
//! - `cli` holds the command-line configuration used by the binary.

pub mod cli;
pub mod error;
pub mod parser;
pub mod tokenizer;

mod codegen;

pub use error::{CompileError, CompileResult, ErrorKind};

/// Knobs that change the emitted assembly without changing its meaning.
#[derive(Debug, Clone, Default)]
pub struct Options {
  /// Interleave `#` comments describing each step.
  pub annotate: bool,
}

/// Compile a source string into RISC-V assembly.
pub fn generate_assembly(source: &str) -> CompileResult<String> {
  compile(source, &Options::default())
}

/// Compile a source string into RISC-V assembly using `options`.
pub fn compile(source: &str, options: &Options) -> CompileResult<String> {
  let tokens = tokenizer::tokenize(source)?;
  let mut program = parser::parse(tokens, source)?;
  codegen::generate(&mut program, source, options)
}
