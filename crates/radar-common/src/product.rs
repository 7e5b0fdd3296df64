//! Cartesian grid products.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::field::{Attributes, FieldMap};
use crate::volume::RadarSite;

/// Names of the coordinate variables carried by every product.
pub const COORDINATE_NAMES: [&str; 7] = [
    "origin_latitude",
    "origin_longitude",
    "origin_altitude",
    "time",
    "point_latitude",
    "point_longitude",
    "point_altitude",
];

/// A gridded volume on a regular Cartesian grid centred on the radar.
///
/// Field arrays are shaped `(z, y, x)`; axis coordinates are metres relative
/// to `origin`.
#[derive(Debug, Clone)]
pub struct GridProduct {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    pub origin: RadarSite,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    pub fields: FieldMap,
    /// Global attributes
    pub metadata: Attributes,
    /// Attributes of coordinate variables, keyed by variable name
    pub coordinates: BTreeMap<String, Attributes>,
}

impl GridProduct {
    pub fn new(
        x: Vec<f64>,
        y: Vec<f64>,
        z: Vec<f64>,
        origin: RadarSite,
        time_start: DateTime<Utc>,
        time_end: DateTime<Utc>,
    ) -> Self {
        let coordinates = COORDINATE_NAMES
            .iter()
            .map(|name| (name.to_string(), Attributes::new()))
            .collect();
        Self {
            x,
            y,
            z,
            origin,
            time_start,
            time_end,
            fields: FieldMap::new(),
            metadata: Attributes::new(),
            coordinates,
        }
    }

    /// Grid shape as `(nz, ny, nx)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.z.len(), self.y.len(), self.x.len())
    }
}
