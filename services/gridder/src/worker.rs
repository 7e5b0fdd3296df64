//! Worker side of the scheduler protocol.
//!
//! A worker process reads one JSON [`WorkerTask`] from stdin, runs the
//! production pipeline on it and prints one JSON [`ItemReport`] line on
//! stdout. Logs go to stderr.

use std::any::Any;
use std::io::{Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use gridding::{
    default_reader, default_writer, run_item, BarnesEngine, FieldPolicy, GridWriter,
    GriddingEngine, ItemReport, MaskPolicy, Pipeline, VolumeReader,
};
use radar_common::{GridSpec, WorkItem};

use crate::config::GridderConfig;

/// Everything a worker needs to process one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerTask {
    pub item: WorkItem,
    pub specs: Vec<GridSpec>,
    pub field_policy: FieldPolicy,
    pub mask: MaskPolicy,
    /// Temporary outputs older than this many seconds belong to killed
    /// workers and are removed before writing.
    #[serde(default)]
    pub stale_temp_secs: Option<u64>,
}

impl WorkerTask {
    pub fn new(item: WorkItem, config: &GridderConfig) -> Self {
        Self {
            item,
            specs: config.catalog.specs.clone(),
            field_policy: config.field_policy.clone(),
            mask: config.mask.clone(),
            stale_temp_secs: Some(config.timeout.as_secs()),
        }
    }
}

/// Run the pipeline for `task`, turning a panic into [`ItemReport::Raised`].
pub fn execute(
    task: &WorkerTask,
    reader: &dyn VolumeReader,
    engine: &dyn GriddingEngine,
    writer: &dyn GridWriter,
) -> ItemReport {
    let mut pipeline = Pipeline::new(engine, writer).with_mask(task.mask.clone());
    if let Some(secs) = task.stale_temp_secs {
        pipeline = pipeline.with_stale_temp_age(Duration::from_secs(secs));
    }
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        run_item(&pipeline, reader, &task.item, &task.specs, &task.field_policy)
    }));
    match result {
        Ok(report) => report,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(input = %task.item.display_name(), message = %message, "Worker panicked");
            ItemReport::Raised { message }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Worker entry point: task from `input`, report line to `output`.
pub fn run<R: Read, W: Write>(mut input: R, mut output: W) -> Result<()> {
    let mut raw = String::new();
    input
        .read_to_string(&mut raw)
        .context("Failed to read task from stdin")?;

    let report = match serde_json::from_str::<WorkerTask>(&raw) {
        Ok(task) => {
            info!(input = %task.item.display_name(), specs = task.specs.len(), "Worker started");
            let reader = default_reader();
            let writer = default_writer();
            execute(&task, reader.as_ref(), &BarnesEngine::new(), writer.as_ref())
        }
        Err(e) => ItemReport::Raised {
            message: format!("invalid task: {}", e),
        },
    };

    writeln!(output, "{}", report.to_line()).context("Failed to write report")?;
    output.flush().context("Failed to flush report")?;
    Ok(())
}
