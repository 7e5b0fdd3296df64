//! Radar gridder batch job.
//!
//! Grids every radar volume of a date range onto the configured Cartesian
//! grids, one isolated worker process per volume.

use anyhow::Result;
use clap::{error::ErrorKind, CommandFactory, Parser};
use tracing::info;

use gridder::config::{Args, GridderConfig};
use gridder::{init_tracing, scheduler};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let dates = match args.date_range() {
        Ok(dates) => dates,
        Err(e) => Args::command().error(ErrorKind::ValueValidation, e).exit(),
    };

    init_tracing(&args.log_level, args.json_logs)?;
    info!("Starting radar gridder");

    let config = GridderConfig::from_args(&args, dates)?;
    config.log();

    let summary = scheduler::run(&config).await?;
    info!(
        items = summary.items,
        completed = summary.completed,
        "Radar gridder finished"
    );
    Ok(())
}
