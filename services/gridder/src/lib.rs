//! Radar gridder batch job.
//!
//! `radar-gridder` walks a date range, finds the radar volumes of each day and
//! hands every volume to a `gridder-worker` process, which grids it onto each
//! spec of the catalog:
//!
//! ```text
//! dates ──> discovery ──> scheduler ──(stdin: WorkerTask)──> gridder-worker
//!                            ^                                   │
//!                            └────────(stdout: ItemReport)───────┘
//! ```

pub mod config;
pub mod discovery;
pub mod scheduler;
pub mod worker;

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Parse a log level name, falling back to INFO.
pub fn parse_level(name: &str) -> Level {
    match name.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Install the global tracing subscriber. Logs go to stderr so that a
/// worker's stdout carries nothing but its report.
pub fn init_tracing(log_level: &str, json: bool) -> Result<()> {
    let builder = FmtSubscriber::builder()
        .with_max_level(parse_level(log_level))
        .with_target(true)
        .with_writer(std::io::stderr);

    if json {
        tracing::subscriber::set_global_default(builder.with_thread_ids(true).json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}
