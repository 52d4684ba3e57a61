use std::io;
use std::process;

use clap::Parser;
use rvcc::cli::{self, Cli};
use tracing::debug;

fn main() {
  let cli = Cli::parse();

  tracing_subscriber::fmt()
    .with_writer(io::stderr)
    .with_target(false)
    .with_max_level(cli.log_level())
    .init();

  if let Err(err) = cli::run(&cli) {
    debug!(kind = ?err.kind(), "compilation failed");
    eprintln!("{err}");
    process::exit(1);
  }
}
