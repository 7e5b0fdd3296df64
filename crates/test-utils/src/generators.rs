//! Field value generators for synthetic radar volumes.
//!
//! All generators return flat, row-major `(nrays, ngates)` arrays so they can
//! be wrapped directly into a `radar_common::Field`.

/// Creates a field filled with one value.
pub fn create_constant_field(nrays: usize, ngates: usize, value: f32) -> Vec<f32> {
    vec![value; nrays * ngates]
}

/// Creates a field increasing linearly with gate index.
///
/// Gate `g` of every ray holds `start + g * step`.
pub fn create_range_gradient(nrays: usize, ngates: usize, start: f32, step: f32) -> Vec<f32> {
    let mut data = Vec::with_capacity(nrays * ngates);
    for _ in 0..nrays {
        for gate in 0..ngates {
            data.push(start + gate as f32 * step);
        }
    }
    data
}

/// Creates a Gaussian storm cell of reflectivity.
///
/// # Arguments
///
/// * `azimuths` - Azimuth of each ray in degrees
/// * `ranges` - Gate distances in metres
/// * `center` - Cell centre as (azimuth degrees, range metres)
/// * `radius` - E-folding radius of the cell in metres
/// * `peak` - Peak reflectivity in dBZ
///
/// Gates far from the cell drop to a 0 dBZ background.
pub fn create_storm_cell(
    azimuths: &[f64],
    ranges: &[f64],
    center: (f64, f64),
    radius: f64,
    peak: f32,
) -> Vec<f32> {
    let (caz, cr) = center;
    let cx = cr * caz.to_radians().sin();
    let cy = cr * caz.to_radians().cos();

    let mut data = Vec::with_capacity(azimuths.len() * ranges.len());
    for az in azimuths {
        let (sin_az, cos_az) = az.to_radians().sin_cos();
        for r in ranges {
            let dx = r * sin_az - cx;
            let dy = r * cos_az - cy;
            let d2 = (dx * dx + dy * dy) / (radius * radius);
            data.push(peak * (-d2).exp() as f32);
        }
    }
    data
}

/// Creates a uniform wind seen as radial velocity.
///
/// A wind of `speed` m/s blowing towards `toward_deg` gives
/// `speed * cos(azimuth - toward)` on every gate of a ray.
pub fn create_velocity_field(azimuths: &[f64], ngates: usize, speed: f32, toward_deg: f64) -> Vec<f32> {
    let mut data = Vec::with_capacity(azimuths.len() * ngates);
    for az in azimuths {
        let v = speed * (az - toward_deg).to_radians().cos() as f32;
        data.extend(std::iter::repeat(v).take(ngates));
    }
    data
}

/// Creates a field with NaN at specified positions.
///
/// Useful for testing masked gate handling.
///
/// # Arguments
///
/// * `nrays` - Number of rays
/// * `ngates` - Number of gates per ray
/// * `nan_positions` - List of (ray, gate) positions that should be NaN
pub fn create_field_with_nans(
    nrays: usize,
    ngates: usize,
    value: f32,
    nan_positions: &[(usize, usize)],
) -> Vec<f32> {
    let mut data = vec![value; nrays * ngates];
    for &(ray, gate) in nan_positions {
        if ray < nrays && gate < ngates {
            data[ray * ngates + gate] = f32::NAN;
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_range_gradient() {
        let data = create_range_gradient(3, 4, 10.0, 0.5);
        assert_eq!(data.len(), 12);
        assert_eq!(data[0], 10.0);
        assert_eq!(data[3], 11.5);
        assert_eq!(data[4], 10.0); // next ray restarts
    }

    #[test]
    fn test_create_storm_cell_peaks_at_center() {
        let azimuths = [0.0, 90.0, 180.0];
        let ranges = [10_000.0, 20_000.0, 30_000.0];
        let data = create_storm_cell(&azimuths, &ranges, (90.0, 20_000.0), 5_000.0, 50.0);
        let peak = data[4]; // azimuth 90, range 20 km
        assert!((peak - 50.0).abs() < 1e-3);
        assert!(data.iter().all(|&v| v <= peak));
        assert!(data[7] < 1.0); // opposite side of the radar
    }

    #[test]
    fn test_create_velocity_field() {
        let data = create_velocity_field(&[0.0, 90.0, 180.0], 2, 10.0, 0.0);
        assert!((data[0] - 10.0).abs() < 1e-5);
        assert!(data[2].abs() < 1e-5);
        assert!((data[5] + 10.0).abs() < 1e-5);
    }

    #[test]
    fn test_create_field_with_nans() {
        let data = create_field_with_nans(4, 5, 1.0, &[(1, 2), (9, 9)]);
        assert!(data[7].is_nan());
        assert_eq!(data.iter().filter(|v| v.is_nan()).count(), 1);
    }
}
