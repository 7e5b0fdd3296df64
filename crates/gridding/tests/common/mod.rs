//! Common test doubles for gridding integration tests
//!
//! Provides:
//! - A reader handing out a prepared volume
//! - An engine wrapper that counts calls and fails on chosen specs
//! - A writer producing small deterministic text files

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use gridding::{
    BarnesEngine, GridWriter, GriddingEngine, GriddingError, MaskPolicy, Result, VolumeReader,
    WriteOptions,
};
use radar_common::{FieldMap, GridProduct, GridSpec, RadarVolume};

/// Returns a clone of its volume, or a read error when it has none.
pub struct FixedReader(pub Option<RadarVolume>);

impl VolumeReader for FixedReader {
    fn read(&self, path: &Path) -> Result<RadarVolume> {
        self.0
            .clone()
            .ok_or_else(|| GriddingError::read(format!("corrupt file {}", path.display())))
    }
}

/// Barnes engine that counts calls and fails on the named specs.
#[derive(Default)]
pub struct ScriptedEngine {
    pub fail_on: Vec<String>,
    pub calls: AtomicUsize,
}

impl ScriptedEngine {
    pub fn failing_on(name: &str) -> Self {
        Self {
            fail_on: vec![name.to_string()],
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl GriddingEngine for ScriptedEngine {
    fn grid(&self, volume: &RadarVolume, mask: &MaskPolicy, spec: &GridSpec) -> Result<GridProduct> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on.contains(&spec.name) {
            return Err(GriddingError::interpolation("not enough valid gates"));
        }
        BarnesEngine::new().grid(volume, mask, spec)
    }
}

/// Writes a text summary of the product; `append_fields` adds one line per
/// field. Fails every write when `broken` is set.
#[derive(Default)]
pub struct TextWriter {
    pub broken: bool,
}

impl GridWriter for TextWriter {
    fn write(&self, path: &Path, product: &GridProduct, _options: &WriteOptions) -> Result<()> {
        let mut text = format!("shape {:?}\n", product.shape());
        for name in product.fields.names() {
            text.push_str(&format!("field {}\n", name));
        }
        if let Some(title) = product.metadata.get("title") {
            text.push_str(&format!("title {}\n", title));
        }
        fs::write(path, &text)?;
        if self.broken {
            return Err(GriddingError::write("disk full"));
        }
        Ok(())
    }

    fn append_fields(&self, path: &Path, fields: &FieldMap) -> Result<()> {
        let mut file = OpenOptions::new().append(true).open(path)?;
        for (name, field) in fields.iter() {
            writeln!(file, "extra {} {:?}", name, field.shape)?;
        }
        Ok(())
    }
}

/// Every file under `dir`, recursively, as sorted relative paths.
pub fn list_files(dir: &Path) -> Vec<String> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(root, &path, out);
            } else if let Ok(rel) = path.strip_prefix(root) {
                out.push(rel.to_string_lossy().into_owned());
            }
        }
    }
    let mut out = Vec::new();
    walk(dir, dir, &mut out);
    out.sort();
    out
}
