//! Polar radar volume scans.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RadarError, RadarResult};
use crate::field::{Attributes, FieldMap};

/// Radar site location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadarSite {
    /// Latitude in degrees north
    pub latitude: f64,
    /// Longitude in degrees east
    pub longitude: f64,
    /// Antenna altitude in metres above mean sea level
    pub altitude: f64,
}

/// One volume scan as decoded by a volume reader.
///
/// Ray-wise arrays (ray times, `azimuth`, `elevation`, `antenna_transition`)
/// have one entry per ray; fields are shaped `(nrays, ngates)` with gate
/// distances given by `range`. Ray times are fixed at construction and
/// never empty.
#[derive(Debug, Clone)]
pub struct RadarVolume {
    pub site: RadarSite,
    time: Vec<DateTime<Utc>>,
    capture: DateTime<Utc>,
    coverage: (DateTime<Utc>, DateTime<Utc>),
    /// Azimuth per ray, degrees clockwise from north
    pub azimuth: Vec<f64>,
    /// Elevation per ray, degrees above horizon
    pub elevation: Vec<f64>,
    /// Gate centre distances in metres
    pub range: Vec<f64>,
    /// Rays recorded while the antenna moved between sweeps
    pub antenna_transition: Option<Vec<bool>>,
    pub fields: FieldMap,
    pub metadata: Attributes,
}

impl RadarVolume {
    /// Build a volume, checking the ray-wise arrays agree.
    pub fn new(
        site: RadarSite,
        time: Vec<DateTime<Utc>>,
        azimuth: Vec<f64>,
        elevation: Vec<f64>,
        range: Vec<f64>,
    ) -> RadarResult<Self> {
        let (Some(&capture), Some(&start), Some(&end)) =
            (time.first(), time.iter().min(), time.iter().max())
        else {
            return Err(RadarError::EmptyVolume);
        };
        for len in [azimuth.len(), elevation.len()] {
            if len != time.len() {
                return Err(RadarError::ShapeMismatch {
                    expected: time.len(),
                    found: len,
                });
            }
        }
        Ok(Self {
            site,
            time,
            capture,
            coverage: (start, end),
            azimuth,
            elevation,
            range,
            antenna_transition: None,
            fields: FieldMap::new(),
            metadata: Attributes::new(),
        })
    }

    pub fn nrays(&self) -> usize {
        self.time.len()
    }

    pub fn ngates(&self) -> usize {
        self.range.len()
    }

    /// Timestamp of the first ray, used to name output products.
    pub fn capture_time(&self) -> DateTime<Utc> {
        self.capture
    }

    /// Earliest and latest ray time.
    pub fn time_coverage(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        self.coverage
    }

    /// Whether ray `ray` was flagged as an antenna transition.
    pub fn is_transition(&self, ray: usize) -> bool {
        self.antenna_transition
            .as_ref()
            .and_then(|flags| flags.get(ray).copied())
            .unwrap_or(false)
    }
}
