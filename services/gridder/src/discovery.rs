//! Work discovery: which input volumes exist for each day of the run.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use radar_common::WorkItem;

use crate::config::GridderConfig;

/// Where the volumes of a day come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// Plain `<input>/<YYYY>/<YYYYMMDD>/` directories
    DayDirectories,
    /// One zip per radar and day, unpacked into `scratch_dir`
    NationalArchive { rid: u32, scratch_dir: PathBuf },
}

/// Work items of one day.
///
/// Files unpacked from an archive live in a scratch directory that is removed
/// when the batch is dropped.
#[derive(Debug)]
pub struct DayBatch {
    pub day: NaiveDate,
    pub items: Vec<WorkItem>,
    scratch: Option<PathBuf>,
}

impl DayBatch {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Drop for DayBatch {
    fn drop(&mut self) {
        if let Some(dir) = self.scratch.take() {
            match fs::remove_dir_all(&dir) {
                Ok(()) => debug!(dir = %dir.display(), "Removed scratch directory"),
                Err(e) => warn!(dir = %dir.display(), error = %e, "Failed to remove scratch directory"),
            }
        }
    }
}

/// Lists the work of each day according to the configured input source.
#[derive(Debug, Clone)]
pub struct Enumerator {
    input_dir: PathBuf,
    output_dir: PathBuf,
    prefix: String,
    extensions: Vec<String>,
    source: InputSource,
}

impl Enumerator {
    pub fn new(config: &GridderConfig) -> Self {
        Self {
            input_dir: config.input_dir.clone(),
            output_dir: config.output_dir.clone(),
            prefix: config.prefix.clone(),
            extensions: config.extensions.clone(),
            source: config.source.clone(),
        }
    }

    /// Ordered work items for `day`. An absent day is an empty batch.
    pub fn day(&self, day: NaiveDate) -> Result<DayBatch> {
        match &self.source {
            InputSource::DayDirectories => {
                let dir = day_dir(&self.input_dir, day);
                let items = list_volumes(&dir, &self.extensions)?
                    .into_iter()
                    .map(|path| WorkItem::new(path, &self.output_dir, &self.prefix))
                    .collect();
                Ok(DayBatch {
                    day,
                    items,
                    scratch: None,
                })
            }
            InputSource::NationalArchive { rid, scratch_dir } => {
                let archive = archive_path(&self.input_dir, *rid, day);
                if !archive.is_file() {
                    info!(archive = %archive.display(), "No archive for day");
                    return Ok(DayBatch {
                        day,
                        items: Vec::new(),
                        scratch: None,
                    });
                }

                let dest = scratch_dir.join(format!("{}_{}", rid, day.format("%Y%m%d")));
                // Set before extracting so a failed extraction is cleaned up too
                let mut batch = DayBatch {
                    day,
                    items: Vec::new(),
                    scratch: Some(dest.clone()),
                };
                extract_archive(&archive, &dest)?;

                let output_root = self.output_dir.join(rid.to_string());
                batch.items = list_volumes_recursive(&dest, &self.extensions)?
                    .into_iter()
                    .map(|path| WorkItem::new(path, &output_root, rid.to_string()))
                    .collect();
                Ok(batch)
            }
        }
    }
}

/// `<root>/<YYYY>/<YYYYMMDD>`
pub fn day_dir(root: &Path, day: NaiveDate) -> PathBuf {
    root.join(day.format("%Y").to_string())
        .join(day.format("%Y%m%d").to_string())
}

/// `<root>/<RID:02>/<YYYY>/vol/<RID:02>_<YYYYMMDD>.pvol.zip`
pub fn archive_path(root: &Path, rid: u32, day: NaiveDate) -> PathBuf {
    root.join(format!("{:02}", rid))
        .join(day.format("%Y").to_string())
        .join("vol")
        .join(format!("{:02}_{}.pvol.zip", rid, day.format("%Y%m%d")))
}

/// Volume files directly inside `dir`, sorted by name.
///
/// Hidden files and files with other extensions are skipped; a missing
/// directory yields no files.
pub fn list_volumes(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    walk_volumes(WalkDir::new(dir).max_depth(1), dir, extensions)
}

/// Volume files anywhere below `dir`, sorted by path. Archives may keep
/// their volumes in subdirectories.
pub fn list_volumes_recursive(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    walk_volumes(WalkDir::new(dir), dir, extensions)
}

fn walk_volumes(walker: WalkDir, dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "Input directory does not exist");
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in walker.min_depth(1) {
        let entry = entry.with_context(|| format!("Failed to list {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') {
            continue;
        }
        let accepted = entry
            .path()
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| extensions.iter().any(|e| *e == ext));
        if accepted {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Unpack `archive` into `dest`, creating it.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create scratch directory {}", dest.display()))?;
    let file = File::open(archive).with_context(|| format!("Failed to open {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(file)
        .with_context(|| format!("Failed to read archive {}", archive.display()))?;
    let count = zip.len();
    zip.extract(dest)
        .with_context(|| format!("Failed to extract {}", archive.display()))?;
    debug!(archive = %archive.display(), files = count, "Extracted archive");
    Ok(())
}
