//! Output path resolution and idempotent publishing.
//!
//! Products land in `<output_root>/<spec.subdir>/<year>/<YYYYMMDD>/<file>`.
//! Directory creation tolerates sibling workers racing to create the same
//! directories. Files are written under a hidden temporary name and then
//! published with create-exclusive semantics, so an existing product is never
//! overwritten and a killed worker never leaves a partial file behind.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use radar_common::{GridSpec, WorkItem};

use crate::error::Result;

/// Directory holding the products of `spec` for a capture day. Pure.
pub fn output_dir(spec: &GridSpec, item: &WorkItem, capture_time: DateTime<Utc>) -> PathBuf {
    item.output_root
        .join(&spec.subdir)
        .join(capture_time.format("%Y").to_string())
        .join(capture_time.format("%Y%m%d").to_string())
}

/// Full output path of `spec` for a capture time. Pure.
pub fn output_path(spec: &GridSpec, item: &WorkItem, capture_time: DateTime<Utc>) -> PathBuf {
    output_dir(spec, item, capture_time).join(spec.file_name(
        &item.prefix,
        &item.input,
        capture_time,
    ))
}

/// Resolve the output path, creating intermediate directories.
pub fn resolve(spec: &GridSpec, item: &WorkItem, capture_time: DateTime<Utc>) -> Result<PathBuf> {
    let path = output_path(spec, item, capture_time);
    if let Some(dir) = path.parent() {
        ensure_dir(dir)?;
    }
    Ok(path)
}

/// Whether a product already exists at `path`.
pub fn exists(path: &Path) -> bool {
    path.exists()
}

/// Create `dir` and its parents; losing a creation race is not an error.
pub fn ensure_dir(dir: &Path) -> io::Result<()> {
    match fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        Err(e) => Err(e),
    }
}

/// Hidden sibling of `path` used while the product is being written.
pub fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()))
}

fn is_temp_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(".tmp")
}

/// Remove temporary products in `dir` last modified more than `max_age` ago.
///
/// Returns how many were removed. Entries that vanish or cannot be inspected
/// are skipped.
pub fn sweep_stale_temps(dir: &Path, max_age: Duration) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    let now = SystemTime::now();
    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        if !is_temp_name(&name.to_string_lossy()) {
            continue;
        }
        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if age.is_some_and(|age| age > max_age) && fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }
    if removed > 0 {
        info!(dir = %dir.display(), removed, "Removed stale temporary products");
    }
    removed
}

/// Result of publishing a temporary file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Published {
    Created,
    /// Another writer published first; the temporary file was discarded.
    AlreadyExists,
}

/// Move `temp` to `path` unless `path` already exists.
pub fn publish(temp: &Path, path: &Path) -> io::Result<Published> {
    match fs::hard_link(temp, path) {
        Ok(()) => {
            fs::remove_file(temp)?;
            Ok(Published::Created)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            debug!(path = %path.display(), "Output appeared while writing, discarding copy");
            fs::remove_file(temp)?;
            Ok(Published::AlreadyExists)
        }
        Err(e) => {
            // Filesystems without hard links: rename is still atomic, but a
            // racing writer may replace an identical product.
            debug!(error = %e, "Hard link unavailable, publishing with rename");
            if path.exists() {
                fs::remove_file(temp)?;
                return Ok(Published::AlreadyExists);
            }
            fs::rename(temp, path)?;
            Ok(Published::Created)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use radar_common::NamingConvention;

    fn item(root: &Path) -> WorkItem {
        WorkItem::new("/input/2021/20210312/cpol_ppi.nc", root, "502")
    }

    fn capture() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 3, 12, 5, 40, 0).unwrap()
    }

    #[test]
    fn test_output_path_layout() {
        let spec = GridSpec::wide_coarse();
        let path = output_path(&spec, &item(Path::new("/out")), capture());
        assert_eq!(
            path,
            PathBuf::from("/out/grid_150km_2500m/2021/20210312/502_20210312_054000_grid.nc")
        );
    }

    #[test]
    fn test_legacy_layout() {
        let spec = GridSpec {
            naming: NamingConvention::LegacyDateStamped,
            ..GridSpec::narrow_fine()
        };
        let mut work = item(Path::new("/out"));
        work.prefix = "cpol".to_string();
        let path = output_path(&spec, &work, capture());
        assert_eq!(
            path,
            PathBuf::from("/out/grid_70km_1000m/2021/20210312/cpol.b2.20210312.054000.nc")
        );
    }

    #[test]
    fn test_resolve_creates_directories_repeatedly() {
        let dir = tempfile::tempdir().unwrap();
        let spec = GridSpec::wide_fine();
        let first = resolve(&spec, &item(dir.path()), capture()).unwrap();
        let second = resolve(&spec, &item(dir.path()), capture()).unwrap();
        assert_eq!(first, second);
        assert!(first.parent().unwrap().is_dir());
        assert!(!exists(&first));
    }

    #[test]
    fn test_publish_is_create_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("product.nc");

        let first = temp_path(&target);
        fs::write(&first, b"first").unwrap();
        assert_eq!(publish(&first, &target).unwrap(), Published::Created);
        assert!(!first.exists());

        let second = temp_path(&target);
        fs::write(&second, b"second").unwrap();
        assert_eq!(publish(&second, &target).unwrap(), Published::AlreadyExists);
        assert!(!second.exists());
        assert_eq!(fs::read(&target).unwrap(), b"first");
    }

    #[test]
    fn test_temp_path_is_hidden_sibling() {
        let target = Path::new("/out/a/b/product.nc");
        let temp = temp_path(target);
        assert_eq!(temp.parent(), target.parent());
        let name = temp.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".product.nc."));
        assert!(name.ends_with(".tmp"));
    }

    #[test]
    fn test_concurrent_resolve_same_day() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let root = root.clone();
                std::thread::spawn(move || {
                    let work = WorkItem::new(format!("/input/cpol_{}.nc", i), root, "502");
                    resolve(&GridSpec::wide_coarse(), &work, capture())
                })
            })
            .collect();

        let paths: Vec<PathBuf> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();
        assert!(paths.windows(2).all(|w| w[0] == w[1]));
        assert!(paths[0].parent().unwrap().is_dir());
    }

    #[test]
    fn test_sweep_removes_only_stale_temps() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("product.nc");
        fs::write(&target, b"done").unwrap();

        let stale = temp_path(&target);
        fs::write(&stale, b"partial").unwrap();
        let old = SystemTime::now() - Duration::from_secs(3600);
        fs::File::options()
            .write(true)
            .open(&stale)
            .unwrap()
            .set_modified(old)
            .unwrap();
        let fresh = temp_path(&target);
        fs::write(&fresh, b"in progress").unwrap();

        assert_eq!(sweep_stale_temps(dir.path(), Duration::from_secs(180)), 1);
        assert!(!stale.exists());
        assert!(fresh.exists());
        assert!(target.exists());
        assert_eq!(sweep_stale_temps(&dir.path().join("missing"), Duration::ZERO), 0);
    }
}
