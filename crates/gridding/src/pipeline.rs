//! The grid production pipeline: one volume in, one product per grid spec
//! out.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use radar_common::{GridSpec, RadarVolume, WorkItem};

use crate::collab::{GridWriter, GriddingEngine, MaskPolicy, VolumeReader, WriteOptions};
use crate::error::Result;
use crate::normalize::{normalize, FieldPolicy};
use crate::outcome::{ItemReport, SpecOutcome};
use crate::postprocess::finalize;
use crate::resolver::{self, Published};

/// Runs every grid spec of a catalog against one volume.
#[derive(Clone)]
pub struct Pipeline<'a> {
    engine: &'a dyn GriddingEngine,
    writer: &'a dyn GridWriter,
    mask: MaskPolicy,
    options: WriteOptions,
    linear: Vec<String>,
    stale_temp_age: Option<Duration>,
}

impl<'a> Pipeline<'a> {
    pub fn new(engine: &'a dyn GriddingEngine, writer: &'a dyn GridWriter) -> Self {
        Self {
            engine,
            writer,
            mask: MaskPolicy::default(),
            options: WriteOptions::default(),
            linear: Vec::new(),
            stale_temp_age: None,
        }
    }

    pub fn with_mask(mut self, mask: MaskPolicy) -> Self {
        self.mask = mask;
        self
    }

    /// Fields the volume carries in linear units; converted back to
    /// decibels before writing.
    pub fn with_linear_fields(mut self, linear: Vec<String>) -> Self {
        self.linear = linear;
        self
    }

    /// Remove temporary files older than `age` from output directories
    /// before writing. Leftovers of killed workers are the only ones that
    /// old when `age` is at least the worker timeout.
    pub fn with_stale_temp_age(mut self, age: Duration) -> Self {
        self.stale_temp_age = Some(age);
        self
    }

    /// Produce every spec for an already normalized volume.
    ///
    /// Specs are independent: a failure is recorded as
    /// [`SpecOutcome::GridFailure`] and the next spec still runs.
    #[instrument(skip_all, fields(input = %item.display_name()))]
    pub fn produce(
        &self,
        volume: &RadarVolume,
        specs: &[GridSpec],
        item: &WorkItem,
    ) -> Vec<SpecOutcome> {
        specs
            .iter()
            .map(|spec| match self.produce_one(volume, spec, item) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(spec = %spec.name, error = %e, "Grid spec failed");
                    SpecOutcome::GridFailure {
                        spec: spec.name.clone(),
                        reason: e.to_string(),
                    }
                }
            })
            .collect()
    }

    fn produce_one(
        &self,
        volume: &RadarVolume,
        spec: &GridSpec,
        item: &WorkItem,
    ) -> Result<SpecOutcome> {
        let path = resolver::resolve(spec, item, volume.capture_time())?;
        if resolver::exists(&path) {
            debug!(spec = %spec.name, path = %path.display(), "Output exists, skipping");
            return Ok(SpecOutcome::SkippedExists {
                spec: spec.name.clone(),
                path,
            });
        }

        let start = Instant::now();
        let mut product = self.engine.grid(volume, &self.mask, spec)?;
        let lonlat = finalize(&mut product, spec, item, &self.linear, Utc::now())?;

        if let (Some(age), Some(dir)) = (self.stale_temp_age, path.parent()) {
            resolver::sweep_stale_temps(dir, age);
        }
        let temp = resolver::temp_path(&path);
        debug!(spec = %spec.name, temp = %temp.display(), "Writing temporary product");
        let written = self
            .writer
            .write(&temp, &product, &self.options)
            .and_then(|()| self.writer.append_fields(&temp, &lonlat));
        drop(product);
        if let Err(e) = written {
            discard(&temp);
            return Err(e);
        }

        let published = match resolver::publish(&temp, &path) {
            Ok(published) => published,
            Err(e) => {
                discard(&temp);
                return Err(e.into());
            }
        };
        Ok(match published {
            Published::Created => {
                info!(
                    spec = %spec.name,
                    path = %path.display(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Grid written"
                );
                SpecOutcome::Success {
                    spec: spec.name.clone(),
                    path,
                }
            }
            Published::AlreadyExists => SpecOutcome::SkippedExists {
                spec: spec.name.clone(),
                path,
            },
        })
    }
}

fn discard(temp: &Path) {
    if let Err(e) = fs::remove_file(temp) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %temp.display(), error = %e, "Failed to remove temporary file");
        }
    }
}

/// Read, normalize and grid one work item.
///
/// Read and normalization failures abort the item as
/// [`ItemReport::ReadFailure`]; everything after is contained per spec.
/// Fields linearized by normalization go back to decibels in every product.
pub fn run_item(
    pipeline: &Pipeline<'_>,
    reader: &dyn VolumeReader,
    item: &WorkItem,
    specs: &[GridSpec],
    policy: &FieldPolicy,
) -> ItemReport {
    let start = Instant::now();

    let mut volume = match reader.read(item.input()) {
        Ok(volume) => volume,
        Err(e) => {
            warn!(input = %item.display_name(), error = %e, "Unable to read volume");
            return ItemReport::ReadFailure {
                reason: e.to_string(),
            };
        }
    };
    let report = match normalize(&mut volume, policy) {
        Ok(report) => report,
        Err(e) => {
            warn!(input = %item.display_name(), error = %e, "Volume unusable");
            return ItemReport::ReadFailure {
                reason: e.to_string(),
            };
        }
    };

    let pipeline = pipeline.clone().with_linear_fields(report.linearized);
    let specs = pipeline.produce(&volume, specs, item);
    ItemReport::Processed {
        specs,
        elapsed_ms: start.elapsed().as_millis() as u64,
    }
}

