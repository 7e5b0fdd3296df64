//! Common test fixtures: synthetic radar volumes and small grid specs.
//!
//! Real volumes are tens of megabytes; these fixtures build small but
//! physically plausible volumes in memory so gridding and pipeline tests run
//! without sample data.

use chrono::{DateTime, Duration, TimeZone, Utc};

use radar_common::{
    Field, FieldValues, GridCatalog, GridSpec, NamingConvention, RadarSite, RadarVolume, Roi,
    WeightingFunction,
};

use crate::generators::{create_constant_field, create_storm_cell, create_velocity_field};

/// Site of the test radar (Darwin area).
pub const TEST_SITE: RadarSite = RadarSite {
    latitude: -12.249,
    longitude: 131.044,
    altitude: 50.0,
};

/// Capture time used by default fixtures: 2021-03-12 05:40:00 UTC.
pub fn test_capture_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 3, 12, 5, 40, 0).unwrap()
}

/// Shape and content of a synthetic volume.
#[derive(Debug, Clone)]
pub struct VolumeFixture {
    pub capture_time: DateTime<Utc>,
    /// One sweep per elevation angle (degrees)
    pub elevations: Vec<f64>,
    pub rays_per_sweep: usize,
    pub ngates: usize,
    /// Gate spacing in metres; the first gate sits at half a spacing
    pub gate_spacing: f64,
    /// Field names to generate
    pub fields: Vec<String>,
    /// Value of non-velocity float fields; `None` draws a storm cell
    pub constant_value: Option<f32>,
    /// Mask every gate of every field
    pub all_masked: bool,
    /// Flag the first ray of each sweep as an antenna transition
    pub transition_rays: bool,
}

impl Default for VolumeFixture {
    fn default() -> Self {
        Self {
            capture_time: test_capture_time(),
            elevations: vec![0.5, 1.5, 3.0, 6.0],
            rays_per_sweep: 72,
            ngates: 80,
            gate_spacing: 250.0,
            fields: vec!["reflectivity".to_string(), "velocity".to_string()],
            constant_value: Some(30.0),
            all_masked: false,
            transition_rays: false,
        }
    }
}

/// Build a volume from a fixture description.
///
/// Field dtypes follow the archive conventions: classification fields are
/// `Int16` with a fill value, everything else is `Float32`.
pub fn synthetic_volume(fixture: &VolumeFixture) -> RadarVolume {
    let nsweeps = fixture.elevations.len();
    let nrays = nsweeps * fixture.rays_per_sweep;
    let step = 360.0 / fixture.rays_per_sweep as f64;

    let mut time = Vec::with_capacity(nrays);
    let mut azimuth = Vec::with_capacity(nrays);
    let mut elevation = Vec::with_capacity(nrays);
    for (sweep, elev) in fixture.elevations.iter().enumerate() {
        for ray in 0..fixture.rays_per_sweep {
            let index = sweep * fixture.rays_per_sweep + ray;
            time.push(fixture.capture_time + Duration::milliseconds(index as i64 * 100));
            azimuth.push(ray as f64 * step);
            elevation.push(*elev);
        }
    }
    let range: Vec<f64> = (0..fixture.ngates)
        .map(|g| (g as f64 + 0.5) * fixture.gate_spacing)
        .collect();

    let mut volume = RadarVolume::new(TEST_SITE, time, azimuth, elevation, range)
        .expect("fixture ray arrays are consistent");

    if fixture.transition_rays {
        volume.antenna_transition = Some(
            (0..nrays)
                .map(|i| i % fixture.rays_per_sweep == 0)
                .collect(),
        );
    }

    let shape = vec![nrays, fixture.ngates];
    for name in &fixture.fields {
        let field = if name.contains("classification") {
            let fill = radar_common::field::DEFAULT_INT16_FILL;
            let value = if fixture.all_masked { fill } else { 3 };
            Field::new(FieldValues::Int16(vec![value; nrays * fixture.ngates]), shape.clone())
                .expect("fixture field shape")
                .with_attribute("_FillValue", fill as i64)
        } else {
            let data = if fixture.all_masked {
                create_constant_field(nrays, fixture.ngates, f32::NAN)
            } else if name.contains("velocity") {
                create_velocity_field(&volume.azimuth, fixture.ngates, 12.0, 45.0)
            } else if let Some(value) = fixture.constant_value {
                create_constant_field(nrays, fixture.ngates, value)
            } else {
                let max_range = fixture.ngates as f64 * fixture.gate_spacing;
                create_storm_cell(
                    &volume.azimuth,
                    &volume.range,
                    (45.0, max_range / 2.0),
                    max_range / 6.0,
                    55.0,
                )
            };
            Field::new(FieldValues::Float32(data), shape.clone())
                .expect("fixture field shape")
                .with_attribute("units", units_for(name))
        };
        volume
            .fields
            .insert(name.as_str(), field.with_attribute("long_name", name.as_str()));
    }

    volume
        .metadata
        .insert("instrument_name".to_string(), "CPOL".into());
    volume
        .metadata
        .insert("Conventions".to_string(), "CF/Radial".into());
    volume
}

fn units_for(name: &str) -> &'static str {
    if name.contains("reflectivity") && !name.contains("differential") {
        "dBZ"
    } else if name.contains("velocity") || name.contains("width") {
        "m/s"
    } else {
        "1"
    }
}

/// A small grid covering the synthetic volume: 5 x 21 x 21 cells over
/// +-20 km and 0-4 km height.
pub fn small_spec(name: &str) -> GridSpec {
    GridSpec {
        name: name.to_string(),
        shape: (5, 21, 21),
        z_limits: (0.0, 4_000.0),
        y_limits: (-20_000.0, 20_000.0),
        x_limits: (-20_000.0, 20_000.0),
        roi: Roi::Constant { radius: 2_500.0 },
        weighting: WeightingFunction::Barnes2,
        subdir: format!("grid_{}", name),
        naming: NamingConvention::NationalArchive,
        file_prefix: None,
    }
}

/// Three small specs with distinct subdirectories.
pub fn small_catalog() -> GridCatalog {
    GridCatalog {
        specs: vec![small_spec("a"), small_spec("b"), small_spec("c")],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_volume_shape() {
        let volume = synthetic_volume(&VolumeFixture::default());
        assert_eq!(volume.nrays(), 4 * 72);
        assert_eq!(volume.ngates(), 80);
        assert_eq!(volume.capture_time(), test_capture_time());
        let refl = volume.fields.get("reflectivity").unwrap();
        assert_eq!(refl.shape, vec![288, 80]);
        assert_eq!(refl.value(0), Some(30.0));
    }

    #[test]
    fn test_all_masked_fixture() {
        let volume = synthetic_volume(&VolumeFixture {
            all_masked: true,
            fields: vec!["reflectivity".into(), "radar_echo_classification".into()],
            ..VolumeFixture::default()
        });
        for (_, field) in volume.fields.iter() {
            assert!((0..field.len()).all(|i| field.is_masked(i)));
        }
    }

    #[test]
    fn test_transition_rays_flagged() {
        let volume = synthetic_volume(&VolumeFixture {
            transition_rays: true,
            ..VolumeFixture::default()
        });
        assert!(volume.is_transition(0));
        assert!(!volume.is_transition(1));
        assert!(volume.is_transition(72));
    }

    #[test]
    fn test_small_catalog_is_valid() {
        small_catalog().validate().unwrap();
    }
}
