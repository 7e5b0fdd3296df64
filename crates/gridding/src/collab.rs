//! Seams to the collaborators around the pipeline: the volume reader, the
//! gridding engine and the grid writer.

use std::path::Path;

use serde::{Deserialize, Serialize};

use radar_common::{FieldMap, GridProduct, GridSpec, RadarVolume};

use crate::error::{GriddingError, Result};

/// Decodes one volume file.
pub trait VolumeReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<RadarVolume>;
}

/// Maps a volume onto the Cartesian grid described by a spec.
///
/// Returns [`GriddingError::Interpolation`] when the volume cannot be gridded.
pub trait GriddingEngine: Send + Sync {
    fn grid(&self, volume: &RadarVolume, mask: &MaskPolicy, spec: &GridSpec)
        -> Result<GridProduct>;
}

/// Persists grid products.
pub trait GridWriter: Send + Sync {
    fn write(&self, path: &Path, product: &GridProduct, options: &WriteOptions) -> Result<()>;

    /// Add variables to a file written by [`GridWriter::write`].
    fn append_fields(&self, path: &Path, fields: &FieldMap) -> Result<()>;
}

/// Gates excluded from gridding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskPolicy {
    /// Skip rays recorded while the antenna moved between sweeps
    pub exclude_transition: bool,
    /// Skip gates where this field is masked or invalid
    pub exclude_masked: Option<String>,
}

impl Default for MaskPolicy {
    fn default() -> Self {
        Self {
            exclude_transition: true,
            exclude_masked: Some("reflectivity".to_string()),
        }
    }
}

/// Options forwarded to the grid writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Write ARM-style `base_time` / `time_offset` variables
    pub arm_time_variables: bool,
    /// Write 3D point longitude/latitude/altitude variables
    pub write_point_lon_lat_alt: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            arm_time_variables: true,
            write_point_lon_lat_alt: false,
        }
    }
}

/// Stand-in used when no file backend is compiled in.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableBackend;

const NO_BACKEND: &str = "built without the `netcdf` feature";

impl VolumeReader for UnavailableBackend {
    fn read(&self, path: &Path) -> Result<RadarVolume> {
        Err(GriddingError::BackendUnavailable(format!(
            "cannot read {}: {}",
            path.display(),
            NO_BACKEND
        )))
    }
}

impl GridWriter for UnavailableBackend {
    fn write(&self, path: &Path, _product: &GridProduct, _options: &WriteOptions) -> Result<()> {
        Err(GriddingError::BackendUnavailable(format!(
            "cannot write {}: {}",
            path.display(),
            NO_BACKEND
        )))
    }

    fn append_fields(&self, path: &Path, _fields: &FieldMap) -> Result<()> {
        Err(GriddingError::BackendUnavailable(format!(
            "cannot append to {}: {}",
            path.display(),
            NO_BACKEND
        )))
    }
}

/// Reader for the compiled-in file backend.
pub fn default_reader() -> Box<dyn VolumeReader> {
    #[cfg(feature = "netcdf")]
    {
        Box::new(crate::netcdf_io::FormatReader::new())
    }
    #[cfg(not(feature = "netcdf"))]
    {
        Box::new(UnavailableBackend)
    }
}

/// Writer for the compiled-in file backend.
pub fn default_writer() -> Box<dyn GridWriter> {
    #[cfg(feature = "netcdf")]
    {
        Box::new(crate::netcdf_io::NetcdfGridWriter::new())
    }
    #[cfg(not(feature = "netcdf"))]
    {
        Box::new(UnavailableBackend)
    }
}
