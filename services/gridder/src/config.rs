//! Command-line arguments and the run configuration derived from them.
//!
//! [`GridderConfig`] is built once in `main` and handed to the enumerator
//! and scheduler by reference; workers receive everything they need in their
//! task.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{builder::RangedU64ValueParser, Parser, ValueEnum};
use tracing::{info, warn};

use gridding::{FieldPolicy, MaskPolicy};
use radar_common::{time::parse_day, DateRange, GridCatalog, NamingConvention, RadarResult};

use crate::discovery::InputSource;

#[derive(Parser, Debug, Clone)]
#[command(name = "radar-gridder")]
#[command(about = "Grid archived radar volumes onto Cartesian grids")]
pub struct Args {
    /// First day to process (YYYYMMDD)
    #[arg(short = 's', long, value_parser = parse_date)]
    pub start_date: NaiveDate,

    /// Last day to process, inclusive (YYYYMMDD)
    #[arg(short = 'e', long, value_parser = parse_date)]
    pub end_date: NaiveDate,

    /// Root of the input volumes
    #[arg(short = 'i', long, env = "GRIDDER_INPUT_DIR", default_value = "/data/radar/volumes")]
    pub input_dir: String,

    /// Root of the output grids
    #[arg(short = 'o', long, env = "GRIDDER_OUTPUT_DIR", default_value = "/data/radar/grids")]
    pub output_dir: String,

    /// Worker processes running at once
    #[arg(short = 'j', long, default_value = "16", value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    pub ncpu: usize,

    /// Work items per chunk (defaults to --ncpu)
    #[arg(long, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    pub chunk_size: Option<usize>,

    /// Seconds before a worker is killed
    #[arg(long, default_value = "180", value_parser = RangedU64ValueParser::<u64>::new().range(1..))]
    pub timeout: u64,

    /// Radar prefix used in output file names
    #[arg(long, env = "GRIDDER_PREFIX", default_value = "502")]
    pub prefix: String,

    /// Override the file naming convention of every grid spec
    #[arg(long, value_enum)]
    pub naming: Option<NamingArg>,

    /// YAML grid catalog replacing the built-in one
    #[arg(long, env = "GRIDDER_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Read the national archive's daily zip files of this radar ID
    #[arg(long)]
    pub archive_rid: Option<u32>,

    /// Where daily archives are unpacked
    #[arg(long, env = "GRIDDER_SCRATCH_DIR", default_value = "/tmp/radar-gridder")]
    pub scratch_dir: String,

    /// Accepted input file extensions
    #[arg(long, value_delimiter = ',', default_value = "nc,h5,hdf")]
    pub extensions: Vec<String>,

    /// Worker executable (defaults to gridder-worker next to this binary)
    #[arg(long, env = "GRIDDER_WORKER_BIN")]
    pub worker_bin: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,
}

fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    parse_day(s).map_err(|e| e.to_string())
}

impl Args {
    /// The validated date range; an inverted range is a usage error.
    pub fn date_range(&self) -> RadarResult<DateRange> {
        DateRange::new(self.start_date, self.end_date)
    }
}

/// File naming conventions selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NamingArg {
    /// `{prefix}_{YYYYMMDD_HHMM}00_grid.nc`
    NationalArchive,
    /// `{prefix}.b2.{YYYYMMDD.HHMM}00.nc`
    Legacy,
    /// Input file name with `PPI` replaced by `GRID`
    InputDerived,
}

impl From<NamingArg> for NamingConvention {
    fn from(arg: NamingArg) -> Self {
        match arg {
            NamingArg::NationalArchive => NamingConvention::NationalArchive,
            NamingArg::Legacy => NamingConvention::LegacyDateStamped,
            NamingArg::InputDerived => NamingConvention::InputDerived {
                marker: "PPI".to_string(),
            },
        }
    }
}

/// Everything a run needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct GridderConfig {
    pub dates: DateRange,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub ncpu: usize,
    pub chunk_size: usize,
    pub timeout: Duration,
    pub prefix: String,
    pub catalog: GridCatalog,
    pub field_policy: FieldPolicy,
    pub mask: MaskPolicy,
    pub source: InputSource,
    /// Lower-case extensions without the dot
    pub extensions: Vec<String>,
    pub worker_bin: PathBuf,
    pub log_level: String,
    pub json_logs: bool,
}

impl GridderConfig {
    pub fn from_args(args: &Args, dates: DateRange) -> Result<Self> {
        let mut catalog = match &args.catalog {
            Some(path) => GridCatalog::load(expand(path)?)
                .with_context(|| format!("Failed to load grid catalog {}", path.display()))?,
            None => GridCatalog::default(),
        };
        if let Some(naming) = args.naming {
            catalog = catalog.with_naming(naming.into());
        }
        catalog.validate().context("Invalid grid catalog")?;

        let (source, field_policy) = match args.archive_rid {
            Some(rid) => (
                InputSource::NationalArchive {
                    rid,
                    scratch_dir: expand_str(&args.scratch_dir)?,
                },
                FieldPolicy::national_archive(),
            ),
            None => (InputSource::DayDirectories, FieldPolicy::default()),
        };

        let worker_bin = match &args.worker_bin {
            Some(path) => expand(path)?,
            None => default_worker_bin()?,
        };

        let cores = num_cpus::get();
        if args.ncpu > cores {
            warn!(ncpu = args.ncpu, cores, "More workers requested than CPU cores");
        }

        let extensions = args
            .extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        Ok(Self {
            dates,
            input_dir: expand_str(&args.input_dir)?,
            output_dir: expand_str(&args.output_dir)?,
            ncpu: args.ncpu,
            chunk_size: args.chunk_size.unwrap_or(args.ncpu),
            timeout: Duration::from_secs(args.timeout),
            prefix: args.prefix.clone(),
            catalog,
            field_policy,
            mask: MaskPolicy::default(),
            source,
            extensions,
            worker_bin,
            log_level: args.log_level.clone(),
            json_logs: args.json_logs,
        })
    }

    /// Log the effective configuration.
    pub fn log(&self) {
        info!(
            start = %self.dates.start,
            end = %self.dates.end,
            days = self.dates.num_days(),
            input_dir = %self.input_dir.display(),
            output_dir = %self.output_dir.display(),
            ncpu = self.ncpu,
            chunk_size = self.chunk_size,
            timeout_s = self.timeout.as_secs(),
            specs = ?self.catalog.specs.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            "Configuration loaded"
        );
    }
}

/// Expand `~` and `$VARS` in a directory argument.
fn expand_str(raw: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(raw).with_context(|| format!("Failed to expand path '{}'", raw))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

fn expand(path: &Path) -> Result<PathBuf> {
    expand_str(&path.to_string_lossy())
}

fn default_worker_bin() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Failed to locate the running executable")?;
    Ok(exe.with_file_name(format!("gridder-worker{}", std::env::consts::EXE_SUFFIX)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["radar-gridder", "--start-date", "20210312", "--end-date", "20210314"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = args(&["--worker-bin", "/opt/gridder-worker"]);
        let config = GridderConfig::from_args(&args, args.date_range().unwrap()).unwrap();
        assert_eq!(config.dates.num_days(), 3);
        assert_eq!(config.ncpu, 16);
        assert_eq!(config.chunk_size, 16);
        assert_eq!(config.timeout, Duration::from_secs(180));
        assert_eq!(config.prefix, "502");
        assert_eq!(config.catalog.len(), 3);
        assert_eq!(config.extensions, vec!["nc", "h5", "hdf"]);
        assert_eq!(config.source, InputSource::DayDirectories);
        assert_eq!(config.field_policy, FieldPolicy::default());
        assert_eq!(config.worker_bin, PathBuf::from("/opt/gridder-worker"));
    }

    #[test]
    fn test_overrides() {
        let args = args(&[
            "--ncpu", "4", "--chunk-size", "32", "--timeout", "60", "--naming", "legacy",
            "--archive-rid", "2", "--extensions", ".H5,nc", "--worker-bin", "w",
        ]);
        let config = GridderConfig::from_args(&args, args.date_range().unwrap()).unwrap();
        assert_eq!(config.ncpu, 4);
        assert_eq!(config.chunk_size, 32);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!(config
            .catalog
            .specs
            .iter()
            .all(|s| s.naming == NamingConvention::LegacyDateStamped));
        assert!(matches!(config.source, InputSource::NationalArchive { rid: 2, .. }));
        assert_eq!(config.field_policy, FieldPolicy::national_archive());
        assert_eq!(config.extensions, vec!["h5", "nc"]);
    }

    #[test]
    fn test_usage_errors() {
        assert!(Args::try_parse_from(["radar-gridder", "--start-date", "2021-03-12", "--end-date", "20210312"]).is_err());
        assert!(Args::try_parse_from(["radar-gridder", "--start-date", "20210312"]).is_err());
        assert!(Args::try_parse_from([
            "radar-gridder", "--start-date", "20210312", "--end-date", "20210312", "--ncpu", "0"
        ])
        .is_err());

        let inverted = Args::try_parse_from(["radar-gridder", "--start-date", "20210314", "--end-date", "20210312"]).unwrap();
        assert!(inverted.date_range().is_err());
    }

    #[test]
    fn test_catalog_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.yaml");
        let catalog = GridCatalog {
            specs: vec![radar_common::GridSpec::narrow_fine()],
        };
        std::fs::write(&path, catalog.to_yaml().unwrap()).unwrap();

        let args = args(&["--catalog", path.to_str().unwrap(), "--worker-bin", "w"]);
        let config = GridderConfig::from_args(&args, args.date_range().unwrap()).unwrap();
        assert_eq!(config.catalog, catalog);

        let args = args_with_missing_catalog();
        assert!(GridderConfig::from_args(&args, args.date_range().unwrap()).is_err());
    }

    fn args_with_missing_catalog() -> Args {
        args(&["--catalog", "/nonexistent/catalog.yaml", "--worker-bin", "w"])
    }
}
