//! Shared error utilities used across the compilation pipeline.
//!
//! Diagnostics are kept lightweight: located errors echo the source line that
//! holds the offending byte and put a caret under it, in the chibicc style.

use std::io;
use std::path::PathBuf;

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

/// Coarse classification of a [`CompileError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Lexical,
  Syntax,
  Semantic,
  Internal,
  Io,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CompileError {
  #[snafu(display("{line}\n{marker} {message}"))]
  Lexical {
    line: String,
    marker: String,
    message: String,
  },

  #[snafu(display("{line}\n{marker} {message}"))]
  Syntax {
    line: String,
    marker: String,
    message: String,
  },

  #[snafu(display("{line}\n{marker} not an lvalue"))]
  NotLvalue { line: String, marker: String },

  #[snafu(display("internal error: {node} is not a valid {expected}"))]
  InvalidNode {
    node: &'static str,
    expected: &'static str,
  },

  #[snafu(display("internal error: operand stack depth is {depth} after a statement"))]
  StackImbalance { depth: i64 },

  #[snafu(display("failed to write {}: {source}", path.display()))]
  WriteOutput { path: PathBuf, source: io::Error },
}

impl CompileError {
  /// A tokenizer failure anchored at byte offset `loc`.
  pub fn lexical(source: &str, loc: usize, message: impl Into<String>) -> Self {
    let (line, marker) = anchor(source, loc);
    LexicalSnafu {
      line,
      marker,
      message: message.into(),
    }
    .build()
  }

  /// A parser failure anchored at byte offset `loc`.
  pub fn syntax(source: &str, loc: usize, message: impl Into<String>) -> Self {
    let (line, marker) = anchor(source, loc);
    SyntaxSnafu {
      line,
      marker,
      message: message.into(),
    }
    .build()
  }

  pub fn not_lvalue(source: &str, loc: usize) -> Self {
    let (line, marker) = anchor(source, loc);
    NotLvalueSnafu { line, marker }.build()
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Lexical { .. } => ErrorKind::Lexical,
      Self::Syntax { .. } => ErrorKind::Syntax,
      Self::NotLvalue { .. } => ErrorKind::Semantic,
      Self::InvalidNode { .. } | Self::StackImbalance { .. } => ErrorKind::Internal,
      Self::WriteOutput { .. } => ErrorKind::Io,
    }
  }
}

/// Return the source line containing `loc` and a caret marker pointing at it.
fn anchor(source: &str, loc: usize) -> (String, String) {
  let loc = loc.min(source.len());
  let start = source[..loc].rfind('\n').map_or(0, |i| i + 1);
  let end = source[loc..].find('\n').map_or(source.len(), |i| loc + i);
  let column = source[start..loc].chars().count();
  let marker = format!("{}^", " ".repeat(column));
  (source[start..end].to_string(), marker)
}
