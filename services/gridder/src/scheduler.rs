//! Chunked worker-pool scheduler.
//!
//! Work items of a day are split into contiguous chunks. Each chunk runs
//! every item in its own worker process, at most `ncpu` at a time, and the
//! next chunk only starts once the whole chunk has finished. A worker that
//! exceeds the timeout is killed; a worker that dies is recorded with its
//! exit status. Nothing is retried.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::stream::{self, StreamExt};
use metrics::{counter, histogram};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use gridding::{ItemReport, SpecOutcome};
use radar_common::WorkItem;

use crate::config::GridderConfig;
use crate::discovery::Enumerator;
use crate::worker::WorkerTask;

/// Terminal state of one work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The worker processed the volume; one outcome per grid spec.
    Completed(Vec<SpecOutcome>),
    ReadFailure(String),
    Raised(String),
    TimedOut { elapsed: Duration, limit: Duration },
    WorkerCrashed { code: Option<i32>, signal: Option<i32> },
}

impl JobOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            JobOutcome::Completed(_) => "completed",
            JobOutcome::ReadFailure(_) => "read_failure",
            JobOutcome::Raised(_) => "raised",
            JobOutcome::TimedOut { .. } => "timed_out",
            JobOutcome::WorkerCrashed { .. } => "worker_crashed",
        }
    }
}

impl From<ItemReport> for JobOutcome {
    fn from(report: ItemReport) -> Self {
        match report {
            ItemReport::Processed { specs, .. } => JobOutcome::Completed(specs),
            ItemReport::ReadFailure { reason } => JobOutcome::ReadFailure(reason),
            ItemReport::Raised { message } => JobOutcome::Raised(message),
        }
    }
}

/// Program and arguments used to start a worker.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn from_config(config: &GridderConfig) -> Self {
        let mut args = vec!["--log-level".to_string(), config.log_level.clone()];
        if config.json_logs {
            args.push("--json-logs".to_string());
        }
        Self {
            program: config.worker_bin.clone(),
            args,
        }
    }
}

/// Contiguous chunks of at most `size` items; the last may be shorter.
pub fn chunks<T>(items: &[T], size: usize) -> std::slice::Chunks<'_, T> {
    items.chunks(size.max(1))
}

/// Counts of outcomes over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub days: usize,
    pub days_without_files: usize,
    pub items: usize,
    pub completed: usize,
    pub read_failures: usize,
    pub raised: usize,
    pub timed_out: usize,
    pub crashed: usize,
    pub grids_written: usize,
    pub grids_skipped: usize,
    pub grid_failures: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &JobOutcome) {
        self.items += 1;
        match outcome {
            JobOutcome::Completed(specs) => {
                self.completed += 1;
                for spec in specs {
                    match spec {
                        SpecOutcome::Success { .. } => self.grids_written += 1,
                        SpecOutcome::SkippedExists { .. } => self.grids_skipped += 1,
                        SpecOutcome::GridFailure { .. } => self.grid_failures += 1,
                    }
                }
            }
            JobOutcome::ReadFailure(_) => self.read_failures += 1,
            JobOutcome::Raised(_) => self.raised += 1,
            JobOutcome::TimedOut { .. } => self.timed_out += 1,
            JobOutcome::WorkerCrashed { .. } => self.crashed += 1,
        }
    }

    pub fn log(&self, elapsed: Duration) {
        info!(
            days = self.days,
            days_without_files = self.days_without_files,
            items = self.items,
            completed = self.completed,
            read_failures = self.read_failures,
            raised = self.raised,
            timed_out = self.timed_out,
            crashed = self.crashed,
            grids_written = self.grids_written,
            grids_skipped = self.grids_skipped,
            grid_failures = self.grid_failures,
            elapsed_s = elapsed.as_secs(),
            "Run complete"
        );
    }
}

/// Runs work items in isolated worker processes.
#[derive(Debug, Clone)]
pub struct Scheduler {
    worker: WorkerCommand,
    ncpu: usize,
    chunk_size: usize,
    timeout: Duration,
}

impl Scheduler {
    pub fn new(worker: WorkerCommand, ncpu: usize, chunk_size: usize, timeout: Duration) -> Self {
        Self {
            worker,
            ncpu: ncpu.max(1),
            chunk_size: chunk_size.max(1),
            timeout,
        }
    }

    pub fn from_config(config: &GridderConfig) -> Self {
        Self::new(
            WorkerCommand::from_config(config),
            config.ncpu,
            config.chunk_size,
            config.timeout,
        )
    }

    /// Run `tasks` chunk by chunk, recording every outcome in `summary`.
    pub async fn run_tasks(&self, tasks: &[WorkerTask], summary: &mut RunSummary) {
        let total = tasks.len().div_ceil(self.chunk_size);
        for (index, chunk) in chunks(tasks, self.chunk_size).enumerate() {
            debug!(chunk = index + 1, of = total, items = chunk.len(), "Starting chunk");
            for (_, outcome) in self.run_chunk(chunk).await {
                summary.record(&outcome);
            }
        }
    }

    /// Run one chunk to completion. Results come back in completion order.
    pub async fn run_chunk(&self, chunk: &[WorkerTask]) -> Vec<(WorkItem, JobOutcome)> {
        stream::iter(chunk)
            .map(|task| async move {
                let start = Instant::now();
                let outcome = self.dispatch(task).await;
                let elapsed = start.elapsed();
                log_outcome(&task.item, &outcome, elapsed);
                counter!("gridder_items_total", "outcome" => outcome.label()).increment(1);
                if let JobOutcome::Completed(specs) = &outcome {
                    for spec in specs {
                        counter!(
                            "gridder_grids_total",
                            "spec" => spec.spec().to_string(),
                            "outcome" => spec.label()
                        )
                        .increment(1);
                    }
                }
                histogram!("gridder_item_duration_seconds").record(elapsed.as_secs_f64());
                (task.item.clone(), outcome)
            })
            .buffer_unordered(self.ncpu)
            .collect()
            .await
    }

    /// Run one task in a fresh worker process.
    pub async fn dispatch(&self, task: &WorkerTask) -> JobOutcome {
        let payload = match serde_json::to_vec(task) {
            Ok(payload) => payload,
            Err(e) => return JobOutcome::Raised(format!("failed to encode task: {}", e)),
        };

        let start = Instant::now();
        let mut child = match Command::new(&self.worker.program)
            .args(&self.worker.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return JobOutcome::Raised(format!(
                    "failed to start worker {}: {}",
                    self.worker.program.display(),
                    e
                ))
            }
        };
        let stdin = child.stdin.take();

        let run = async move {
            if let Some(mut stdin) = stdin {
                // A worker that exits without reading is judged by its status
                if let Err(e) = stdin.write_all(&payload).await {
                    debug!(error = %e, "Worker closed stdin early");
                }
            }
            child.wait_with_output().await
        };

        match tokio::time::timeout(self.timeout, run).await {
            // Dropping the future kills the worker
            Err(_) => JobOutcome::TimedOut {
                elapsed: start.elapsed(),
                limit: self.timeout,
            },
            Ok(Err(e)) => JobOutcome::Raised(format!("failed to wait for worker: {}", e)),
            Ok(Ok(output)) => classify(output.status, &output.stdout),
        }
    }
}

/// Outcome of a finished worker from its exit status and stdout.
fn classify(status: ExitStatus, stdout: &[u8]) -> JobOutcome {
    let text = String::from_utf8_lossy(stdout);
    if let Some(report) = text.lines().rev().find_map(ItemReport::from_line) {
        return report.into();
    }
    if status.success() {
        return JobOutcome::Raised("worker exited without a report".to_string());
    }
    JobOutcome::WorkerCrashed {
        code: status.code(),
        signal: exit_signal(&status),
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

fn log_outcome(item: &WorkItem, outcome: &JobOutcome, elapsed: Duration) {
    let input = item.display_name();
    match outcome {
        JobOutcome::Completed(specs) => {
            for spec in specs {
                match spec {
                    SpecOutcome::Success { spec, path } => {
                        info!(input = %input, spec = %spec, path = %path.display(), "Grid produced")
                    }
                    SpecOutcome::SkippedExists { spec, path } => {
                        debug!(input = %input, spec = %spec, path = %path.display(), "Grid exists, skipped")
                    }
                    SpecOutcome::GridFailure { spec, reason } => {
                        warn!(input = %input, spec = %spec, reason = %reason, "Grid failed")
                    }
                }
            }
            debug!(input = %input, elapsed_ms = elapsed.as_millis() as u64, "Item completed");
        }
        JobOutcome::ReadFailure(reason) => warn!(input = %input, reason = %reason, "Unreadable volume"),
        JobOutcome::Raised(message) => error!(input = %input, message = %message, "Worker raised"),
        JobOutcome::TimedOut { elapsed, limit } => error!(
            input = %input,
            elapsed_s = elapsed.as_secs_f64(),
            limit_s = limit.as_secs(),
            "Worker timed out"
        ),
        JobOutcome::WorkerCrashed { code, signal } => error!(
            input = %input,
            code = ?code,
            signal = ?signal,
            "Worker crashed"
        ),
    }
}

/// Process every day of the configured range.
pub async fn run(config: &GridderConfig) -> Result<RunSummary> {
    let start = Instant::now();
    let scheduler = Scheduler::from_config(config);
    let enumerator = Enumerator::new(config);
    let mut summary = RunSummary::default();

    for day in config.dates.days() {
        summary.days += 1;
        let lister = enumerator.clone();
        let batch = match tokio::task::spawn_blocking(move || lister.day(day)).await? {
            Ok(batch) => batch,
            Err(e) => {
                error!(day = %day, error = %e, "Failed to list input files");
                summary.days_without_files += 1;
                continue;
            }
        };
        if batch.is_empty() {
            info!(day = %day, "No input files, skipping day");
            summary.days_without_files += 1;
            continue;
        }

        info!(day = %day, files = batch.items.len(), "Processing day");
        let tasks: Vec<WorkerTask> = batch
            .items
            .iter()
            .map(|item| WorkerTask::new(item.clone(), config))
            .collect();
        scheduler.run_tasks(&tasks, &mut summary).await;
        drop(batch);
    }

    summary.log(start.elapsed());
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridding::{FieldPolicy, MaskPolicy};
    use test_utils::small_catalog;

    const REPORT: &str = r#"{"status":"processed","specs":[],"elapsed_ms":1}"#;

    fn task(input: &str) -> WorkerTask {
        WorkerTask {
            item: WorkItem::new(input, "/out", "502"),
            specs: small_catalog().specs,
            field_policy: FieldPolicy::default(),
            mask: MaskPolicy::default(),
            stale_temp_secs: None,
        }
    }

    fn shell(script: &str, ncpu: usize, timeout: Duration) -> Scheduler {
        let worker = WorkerCommand {
            program: PathBuf::from("sh"),
            args: vec!["-c".to_string(), script.to_string()],
        };
        Scheduler::new(worker, ncpu, ncpu, timeout)
    }

    #[test]
    fn test_chunk_partition() {
        for n in 0..40usize {
            let items: Vec<usize> = (0..n).collect();
            for k in 1..10usize {
                let parts: Vec<&[usize]> = chunks(&items, k).collect();
                let flat: Vec<usize> = parts.iter().flat_map(|c| c.iter().copied()).collect();
                assert_eq!(flat, items, "chunks must cover all items in order");
                assert_eq!(parts.len(), n.div_ceil(k));
                if let Some(last) = parts.last() {
                    let expected = if n % k == 0 { k } else { n % k };
                    assert_eq!(last.len(), expected);
                    assert!(parts[..parts.len() - 1].iter().all(|c| c.len() == k));
                }
            }
        }
    }

    #[tokio::test]
    async fn test_report_is_used() {
        let scheduler = shell(&format!("cat >/dev/null; echo 'log noise'; echo '{}'", REPORT), 1, Duration::from_secs(10));
        assert_eq!(scheduler.dispatch(&task("a.nc")).await, JobOutcome::Completed(vec![]));
    }

    #[tokio::test]
    async fn test_task_reaches_worker() {
        // Echo back the input path as a read failure
        let script = r#"input=$(cat); case "$input" in *volume_42.nc*) echo '{"status":"read_failure","reason":"seen"}';; esac"#;
        let scheduler = shell(script, 1, Duration::from_secs(10));
        assert_eq!(
            scheduler.dispatch(&task("/in/volume_42.nc")).await,
            JobOutcome::ReadFailure("seen".to_string())
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_crash_and_exit_status() {
        let crashed = shell("cat >/dev/null; kill -SEGV $$", 1, Duration::from_secs(10));
        assert_eq!(
            crashed.dispatch(&task("a.nc")).await,
            JobOutcome::WorkerCrashed {
                code: None,
                signal: Some(11)
            }
        );

        let failed = shell("cat >/dev/null; exit 3", 1, Duration::from_secs(10));
        assert_eq!(
            failed.dispatch(&task("a.nc")).await,
            JobOutcome::WorkerCrashed {
                code: Some(3),
                signal: None
            }
        );

        let silent = shell("cat >/dev/null", 1, Duration::from_secs(10));
        assert!(matches!(silent.dispatch(&task("a.nc")).await, JobOutcome::Raised(_)));
    }

    #[tokio::test]
    async fn test_missing_worker_binary() {
        let worker = WorkerCommand {
            program: PathBuf::from("/nonexistent/gridder-worker"),
            args: vec![],
        };
        let scheduler = Scheduler::new(worker, 1, 1, Duration::from_secs(1));
        assert!(matches!(
            scheduler.dispatch(&task("a.nc")).await,
            JobOutcome::Raised(msg) if msg.contains("failed to start worker")
        ));
    }

    #[tokio::test]
    async fn test_hung_worker_does_not_hold_chunk() {
        let script = format!(
            r#"input=$(cat); case "$input" in *hang*) exec sleep 30;; esac; echo '{}'"#,
            REPORT
        );
        let scheduler = shell(&script, 4, Duration::from_secs(1));
        let chunk = vec![task("a.nc"), task("hang.nc"), task("b.nc"), task("c.nc")];

        let start = Instant::now();
        let results = scheduler.run_chunk(&chunk).await;
        assert!(start.elapsed() < Duration::from_secs(10));

        assert_eq!(results.len(), 4);
        for (item, outcome) in results {
            if item.display_name() == "hang.nc" {
                assert!(matches!(
                    outcome,
                    JobOutcome::TimedOut { limit, .. } if limit == Duration::from_secs(1)
                ));
            } else {
                assert_eq!(outcome, JobOutcome::Completed(vec![]));
            }
        }
    }

    #[tokio::test]
    async fn test_run_tasks_counts_outcomes() {
        let script = format!(r#"input=$(cat); case "$input" in *bad*) exit 1;; esac; echo '{}'"#, REPORT);
        let scheduler = shell(&script, 2, Duration::from_secs(10));
        let tasks = vec![task("a.nc"), task("bad.nc"), task("b.nc"), task("c.nc"), task("d.nc")];

        let mut summary = RunSummary::default();
        scheduler.run_tasks(&tasks, &mut summary).await;
        assert_eq!(summary.items, 5);
        assert_eq!(summary.completed, 4);
        assert_eq!(summary.crashed, 1);
    }

    #[tokio::test]
    async fn test_chunk_drains_before_next_starts() {
        let dir = test_utils::temp_test_dir();
        let log = dir.path().join("markers.log");
        let script = format!(
            r#"input=$(cat); for k in 0 1 2; do case "$input" in *chunk$k*) tag=$k;; esac; done; echo "start $tag" >> '{log}'; sleep 0.2; echo "end $tag" >> '{log}'; echo '{report}'"#,
            log = log.display(),
            report = REPORT,
        );
        let scheduler = shell(&script, 2, Duration::from_secs(10));
        let tasks = vec![
            task("chunk0_a.nc"),
            task("chunk0_b.nc"),
            task("chunk1_a.nc"),
            task("chunk1_b.nc"),
            task("chunk2_a.nc"),
        ];

        let mut summary = RunSummary::default();
        scheduler.run_tasks(&tasks, &mut summary).await;
        assert_eq!(summary.completed, 5);

        let markers: Vec<String> = std::fs::read_to_string(&log)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        assert_eq!(markers.len(), 10);
        for k in 0..2 {
            let last_end = markers
                .iter()
                .rposition(|m| *m == format!("end {}", k))
                .unwrap();
            let first_start = markers
                .iter()
                .position(|m| *m == format!("start {}", k + 1))
                .unwrap();
            assert!(
                last_end < first_start,
                "chunk {} still running when chunk {} started: {:?}",
                k,
                k + 1,
                markers
            );
        }
    }

    #[test]
    fn test_summary_counts_specs() {
        let mut summary = RunSummary::default();
        summary.record(&JobOutcome::Completed(vec![
            SpecOutcome::Success {
                spec: "a".into(),
                path: "/o/a.nc".into(),
            },
            SpecOutcome::SkippedExists {
                spec: "b".into(),
                path: "/o/b.nc".into(),
            },
            SpecOutcome::GridFailure {
                spec: "c".into(),
                reason: "no gates".into(),
            },
        ]));
        summary.record(&JobOutcome::TimedOut {
            elapsed: Duration::from_secs(181),
            limit: Duration::from_secs(180),
        });
        assert_eq!(summary.items, 2);
        assert_eq!(
            (summary.grids_written, summary.grids_skipped, summary.grid_failures),
            (1, 1, 1)
        );
        assert_eq!(summary.timed_out, 1);
    }
}
