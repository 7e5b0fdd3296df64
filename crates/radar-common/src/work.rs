//! Work items handed from the enumerator to the workers.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One input volume file to grid. Immutable once enumerated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    /// Input volume file; the identity of the item
    pub input: PathBuf,
    /// Root under which every grid spec writes its products
    pub output_root: PathBuf,
    /// Radar/site prefix used in output file names
    pub prefix: String,
}

impl WorkItem {
    pub fn new(
        input: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            input: input.into(),
            output_root: output_root.into(),
            prefix: prefix.into(),
        }
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    /// Input file name for log messages.
    pub fn display_name(&self) -> String {
        self.input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.input.display().to_string())
    }
}
