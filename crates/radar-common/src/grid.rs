//! Grid specifications for gridded radar products.
//!
//! A [`GridSpec`] fully determines one output product: its geometry, the
//! interpolation parameters handed to the gridding engine, the output
//! subdirectory and the file naming convention. A run holds an ordered
//! [`GridCatalog`] of specs; the order only affects log ordering.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RadarError, RadarResult};

/// Radius of influence used when weighting gates for a grid point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Roi {
    /// Same radius everywhere (metres)
    Constant { radius: f64 },
    /// Radius growing with height and distance from the radar to follow
    /// beam spreading.
    DistBeam {
        h_factor: f64,
        /// Virtual beam width
        nb: f64,
        /// Virtual beam spacing
        bsp: f64,
        min_radius: f64,
    },
}

impl Roi {
    /// Radius of influence at a grid point (metres from the radar).
    pub fn radius_at(&self, z: f64, y: f64, x: f64) -> f64 {
        match *self {
            Roi::Constant { radius } => radius,
            Roi::DistBeam {
                h_factor,
                nb,
                bsp,
                min_radius,
            } => {
                let spread = (nb * bsp).to_radians().tan();
                (h_factor * z / 20.0 + (x * x + y * y).sqrt() * spread).max(min_radius)
            }
        }
    }
}

/// Weighting applied to gates inside the radius of influence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightingFunction {
    Barnes,
    Barnes2,
    Cressman,
    Nearest,
}

fn default_marker() -> String {
    "PPI".to_string()
}

/// How output file names are built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NamingConvention {
    /// `{prefix}.b2.{YYYYMMDD.HHMM}00.nc`
    LegacyDateStamped,
    /// `{prefix}_{YYYYMMDD_HHMM}00_grid.nc`
    NationalArchive,
    /// Input basename with `marker` replaced by `GRID`
    InputDerived {
        #[serde(default = "default_marker")]
        marker: String,
    },
}

impl NamingConvention {
    /// Output file name for a volume captured at `capture_time`.
    pub fn file_name(&self, prefix: &str, input: &Path, capture_time: DateTime<Utc>) -> String {
        match self {
            NamingConvention::LegacyDateStamped => format!(
                "{}.b2.{}00.nc",
                prefix,
                capture_time.format("%Y%m%d.%H%M")
            ),
            NamingConvention::NationalArchive => format!(
                "{}_{}00_grid.nc",
                prefix,
                capture_time.format("%Y%m%d_%H%M")
            ),
            NamingConvention::InputDerived { marker } => {
                let basename = input
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                substitute_marker(&basename, marker)
            }
        }
    }
}

fn substitute_marker(basename: &str, marker: &str) -> String {
    if !marker.is_empty() {
        // ASCII lowering keeps byte offsets aligned with the original.
        let lowered = basename.to_ascii_lowercase();
        if let Some(start) = lowered.find(&marker.to_ascii_lowercase()) {
            return format!(
                "{}GRID{}",
                &basename[..start],
                &basename[start + marker.len()..]
            );
        }
    }
    match basename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}_GRID.{}", stem, ext),
        _ => format!("{}_GRID", basename),
    }
}

/// One named grid product configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub name: String,
    /// Cell counts `(z, y, x)`
    pub shape: (usize, usize, usize),
    /// Vertical limits in metres
    pub z_limits: (f64, f64),
    /// North-south limits in metres
    pub y_limits: (f64, f64),
    /// East-west limits in metres
    pub x_limits: (f64, f64),
    pub roi: Roi,
    pub weighting: WeightingFunction,
    /// Directory under the output root, e.g. `grid_150km_2500m`
    pub subdir: String,
    pub naming: NamingConvention,
    /// Replaces the work item's prefix in generated file names
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl GridSpec {
    /// Check geometry and interpolation parameters.
    pub fn validate(&self) -> RadarResult<()> {
        let invalid = |message: &str| RadarError::InvalidGridSpec {
            name: self.name.clone(),
            message: message.to_string(),
        };

        let (nz, ny, nx) = self.shape;
        if nz == 0 || ny == 0 || nx == 0 {
            return Err(invalid("shape must have at least one cell per axis"));
        }
        for (lo, hi) in [self.z_limits, self.y_limits, self.x_limits] {
            if !(lo.is_finite() && hi.is_finite()) || lo > hi {
                return Err(invalid("limits must be finite and ordered (min, max)"));
            }
        }
        let roi_ok = match self.roi {
            Roi::Constant { radius } => radius > 0.0,
            Roi::DistBeam { min_radius, .. } => min_radius > 0.0,
        };
        if !roi_ok {
            return Err(invalid("radius of influence must be positive"));
        }
        if self.subdir.trim().is_empty() || self.subdir.contains(['/', '\\']) {
            return Err(invalid("subdir must be a single non-empty path component"));
        }
        Ok(())
    }

    pub fn z_coords(&self) -> Vec<f64> {
        linspace(self.z_limits, self.shape.0)
    }

    pub fn y_coords(&self) -> Vec<f64> {
        linspace(self.y_limits, self.shape.1)
    }

    pub fn x_coords(&self) -> Vec<f64> {
        linspace(self.x_limits, self.shape.2)
    }

    /// Cell spacing `(dz, dy, dx)` in metres.
    pub fn spacing(&self) -> (f64, f64, f64) {
        (
            step(self.z_limits, self.shape.0),
            step(self.y_limits, self.shape.1),
            step(self.x_limits, self.shape.2),
        )
    }

    /// Human readable title encoding the grid extent.
    pub fn title(&self) -> String {
        format!(
            "Gridded radar volume on a {}x{}x{}km grid",
            km(self.x_limits.1 - self.x_limits.0),
            km(self.y_limits.1 - self.y_limits.0),
            km(self.z_limits.1),
        )
    }

    /// Output file name for this spec.
    pub fn file_name(&self, prefix: &str, input: &Path, capture_time: DateTime<Utc>) -> String {
        let prefix = self.file_prefix.as_deref().unwrap_or(prefix);
        self.naming.file_name(prefix, input, capture_time)
    }

    /// Full-domain grid at 2.5 km resolution.
    pub fn wide_coarse() -> Self {
        Self {
            name: "150km_2500m".to_string(),
            shape: (41, 117, 117),
            z_limits: (0.0, 20_000.0),
            y_limits: (-150_000.0, 150_000.0),
            x_limits: (-150_000.0, 150_000.0),
            roi: Roi::Constant { radius: 2500.0 },
            weighting: WeightingFunction::Barnes2,
            subdir: "grid_150km_2500m".to_string(),
            naming: NamingConvention::NationalArchive,
            file_prefix: None,
        }
    }

    /// Full-domain grid at 1 km resolution.
    pub fn wide_fine() -> Self {
        Self {
            name: "150km_1000m".to_string(),
            shape: (41, 301, 301),
            subdir: "grid_150km_1000m".to_string(),
            ..Self::wide_coarse()
        }
    }

    /// Inner-domain grid at 1 km resolution.
    pub fn narrow_fine() -> Self {
        Self {
            name: "70km_1000m".to_string(),
            shape: (41, 141, 141),
            z_limits: (0.0, 20_000.0),
            y_limits: (-70_000.0, 70_000.0),
            x_limits: (-70_000.0, 70_000.0),
            roi: Roi::DistBeam {
                h_factor: 1.0,
                nb: 1.5,
                bsp: 1.0,
                min_radius: 500.0,
            },
            weighting: WeightingFunction::Barnes,
            subdir: "grid_70km_1000m".to_string(),
            naming: NamingConvention::NationalArchive,
            file_prefix: None,
        }
    }
}

fn linspace((lo, hi): (f64, f64), n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![lo];
    }
    let step = (hi - lo) / (n - 1) as f64;
    (0..n).map(|i| lo + i as f64 * step).collect()
}

fn step((lo, hi): (f64, f64), n: usize) -> f64 {
    if n <= 1 {
        0.0
    } else {
        (hi - lo) / (n - 1) as f64
    }
}

fn km(metres: f64) -> String {
    let km = metres / 1000.0;
    if (km - km.round()).abs() < 1e-9 {
        format!("{}", km.round() as i64)
    } else {
        format!("{:.1}", km)
    }
}

/// Ordered set of grid specs processed for every volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCatalog {
    pub specs: Vec<GridSpec>,
}

impl Default for GridCatalog {
    fn default() -> Self {
        Self {
            specs: vec![
                GridSpec::wide_coarse(),
                GridSpec::wide_fine(),
                GridSpec::narrow_fine(),
            ],
        }
    }
}

impl GridCatalog {
    /// Parse and validate a YAML catalog.
    pub fn from_yaml_str(yaml: &str) -> RadarResult<Self> {
        let catalog: GridCatalog = serde_yaml::from_str(yaml)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load a YAML catalog file.
    pub fn load<P: AsRef<Path>>(path: P) -> RadarResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            RadarError::CatalogRead(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml(&self) -> RadarResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate every spec and require unique names and subdirectories.
    pub fn validate(&self) -> RadarResult<()> {
        if self.specs.is_empty() {
            return Err(RadarError::CatalogParse("catalog has no grid specs".to_string()));
        }
        for (i, spec) in self.specs.iter().enumerate() {
            spec.validate()?;
            if self.specs[..i]
                .iter()
                .any(|other| other.name == spec.name || other.subdir == spec.subdir)
            {
                return Err(RadarError::InvalidGridSpec {
                    name: spec.name.clone(),
                    message: "duplicate name or subdir".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Apply one naming convention to every spec.
    pub fn with_naming(mut self, naming: NamingConvention) -> Self {
        for spec in &mut self.specs {
            spec.naming = naming.clone();
        }
        self
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
