//! CLI front end for the edit-script runner: applies a script to every
//! object of a store, in place.

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use vmap2::edit::{run, Script};
use vmap2::store::VMap2;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
  /// VMap2 store file to edit, in place.
  store: PathBuf,

  /// Edit script to run against it.
  script: PathBuf,
}

fn main() {
  tracing_subscriber::fmt::init();
  let args = Args::parse();

  if let Err(e) = run_cli(&args) {
    error!("{e}");
    std::process::exit(1);
  }
}

fn run_cli(args: &Args) -> Result<(), vmap2::Error> {
  let mut store = VMap2::open_file(&args.store, false)?;
  let script = Script::load(&args.script)?;
  let log = run(&mut store, &script)?;
  for line in &log {
    info!("{line}");
  }
  Ok(())
}
