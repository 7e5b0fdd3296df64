//! Path utilities for locating test data files.
//!
//! Sample volumes live outside the repository; these helpers look for them in
//! the usual places and hand out scratch directories for test output.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

/// Returns the workspace root directory.
pub fn workspace_root() -> PathBuf {
    // Start from the test-utils crate manifest dir
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir)
        .parent() // crates/
        .and_then(|p| p.parent()) // workspace root
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from(manifest_dir))
}

/// Searches for a test file in multiple locations.
///
/// This function checks the following locations in order:
/// 1. Environment variable `TEST_DATA_DIR` (if set)
/// 2. `crates/gridding/testdata/`
/// 3. `testdata/` at the workspace root
pub fn find_test_file(name: &str) -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(test_data_dir) = std::env::var("TEST_DATA_DIR") {
        candidates.push(PathBuf::from(test_data_dir).join(name));
    }

    let root = workspace_root();
    candidates.extend([
        root.join("crates/gridding/testdata").join(name),
        root.join("testdata").join(name),
    ]);

    candidates.into_iter().find(|path| path.exists())
}

/// Creates a temporary directory for test output.
///
/// The directory is automatically cleaned up when the returned `TempDir` is dropped.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temporary test directory")
}

/// Create the `<root>/<YYYY>/<YYYYMMDD>` input directory for `day`.
pub fn make_day_dir(root: &Path, day: NaiveDate) -> PathBuf {
    let dir = root
        .join(day.format("%Y").to_string())
        .join(day.format("%Y%m%d").to_string());
    std::fs::create_dir_all(&dir).expect("Failed to create day directory");
    dir
}

/// Write a small placeholder file under `dir`, returning its path.
pub fn touch(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"volume").expect("Failed to write placeholder file");
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_root_is_valid() {
        let root = workspace_root();
        assert!(
            root.join("Cargo.toml").exists(),
            "Workspace root should contain Cargo.toml: {:?}",
            root
        );
    }

    #[test]
    fn test_make_day_dir_layout() {
        let root = temp_test_dir();
        let day = NaiveDate::from_ymd_opt(2021, 3, 12).unwrap();
        let dir = make_day_dir(root.path(), day);
        assert_eq!(dir, root.path().join("2021").join("20210312"));
        assert!(dir.is_dir());

        let file = touch(&dir, "a.nc");
        assert!(file.is_file());
    }
}
