//! Worker process of the radar gridder.
//!
//! Reads one task from stdin, grids it and prints its report on stdout.
//! Started by `radar-gridder`; not meant to be run by hand.

use std::io;

use anyhow::Result;
use clap::Parser;

use gridder::{init_tracing, worker};

#[derive(Parser, Debug)]
#[command(name = "gridder-worker")]
#[command(about = "Grid one radar volume read as a JSON task from stdin")]
struct WorkerArgs {
    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,
}

fn main() -> Result<()> {
    let args = WorkerArgs::parse();
    init_tracing(&args.log_level, args.json_logs)?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    worker::run(stdin.lock(), stdout.lock())
}
