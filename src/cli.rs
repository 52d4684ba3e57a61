//! Command-line configuration for the `rvcc` binary.

use std::fs;
use std::path::PathBuf;

use clap::{ArgAction, Parser};
use snafu::ResultExt;
use tracing::{Level, info};

use crate::error::{CompileResult, WriteOutputSnafu};
use crate::{Options, compile};

#[derive(Parser, Debug)]
#[command(
  name = "rvcc",
  version,
  about = "Compile a tiny C subset into RISC-V assembly"
)]
pub struct Cli {
  /// The whole program, e.g. "a=3; return a*2;"
  #[arg(value_name = "SOURCE", allow_hyphen_values = true)]
  pub source: String,

  /// Write the assembly to FILE instead of stdout
  #[arg(short, long, value_name = "FILE")]
  pub output: Option<PathBuf>,

  /// Interleave comments describing each emitted step
  #[arg(long)]
  pub annotate: bool,

  /// Raise the log level (-v info, -vv debug, -vvv trace)
  #[arg(short, long, action = ArgAction::Count)]
  pub verbose: u8,
}

impl Cli {
  pub fn log_level(&self) -> Level {
    match self.verbose {
      0 => Level::WARN,
      1 => Level::INFO,
      2 => Level::DEBUG,
      _ => Level::TRACE,
    }
  }

  pub fn options(&self) -> Options {
    Options {
      annotate: self.annotate,
    }
  }
}

/// Compile `cli.source` and write the assembly where `cli` asks for it.
///
/// Nothing is written unless compilation succeeds as a whole.
pub fn run(cli: &Cli) -> CompileResult<()> {
  let asm = compile(&cli.source, &cli.options())?;

  match &cli.output {
    Some(path) => {
      fs::write(path, &asm).context(WriteOutputSnafu { path: path.clone() })?;
      info!(path = %path.display(), "wrote assembly");
    }
    None => print!("{asm}"),
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn source_may_start_with_a_minus() {
    let cli = Cli::try_parse_from(["rvcc", "-1;"]).unwrap();
    assert_eq!(cli.source, "-1;");
    assert_eq!(cli.log_level(), Level::WARN);
  }

  #[test]
  fn flags_are_parsed() {
    let cli = Cli::try_parse_from(["rvcc", "-vv", "--annotate", "-o", "out.s", "1;"]).unwrap();
    assert_eq!(cli.log_level(), Level::DEBUG);
    assert!(cli.options().annotate);
    assert_eq!(cli.output, Some(PathBuf::from("out.s")));
  }

  #[test]
  fn exactly_one_source_is_required() {
    assert!(Cli::try_parse_from(["rvcc"]).is_err());
    assert!(Cli::try_parse_from(["rvcc", "1;", "2;"]).is_err());
  }
}
