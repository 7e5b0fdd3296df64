//! Azimuthal equidistant projection centred on the radar.
//!
//! Grid coordinates are metres east (`x`) and north (`y`) of the radar; the
//! inverse projection gives the geographic position of each grid column.

use radar_common::RadarSite;

/// Sphere radius used for the grid's geographic coordinates (metres).
pub const EARTH_RADIUS: f64 = 6_370_997.0;

/// Effective earth radius for beam propagation under standard refraction.
pub const EFFECTIVE_EARTH_RADIUS: f64 = 6_371_000.0 * 4.0 / 3.0;

/// Inverse azimuthal equidistant projection.
///
/// Returns `(longitude, latitude)` in degrees, longitude wrapped to
/// [-180, 180].
pub fn xy_to_lonlat(x: f64, y: f64, origin: &RadarSite) -> (f64, f64) {
    let lat0 = origin.latitude.to_radians();
    let lon0 = origin.longitude.to_radians();

    let rho = (x * x + y * y).sqrt();
    if rho == 0.0 {
        return (origin.longitude, origin.latitude);
    }
    let c = rho / EARTH_RADIUS;
    let (sin_c, cos_c) = c.sin_cos();
    let (sin_lat0, cos_lat0) = lat0.sin_cos();

    let lat = (cos_c * sin_lat0 + y * sin_c * cos_lat0 / rho)
        .clamp(-1.0, 1.0)
        .asin();
    let lon = lon0 + (x * sin_c).atan2(rho * cos_lat0 * cos_c - y * sin_lat0 * sin_c);

    (wrap_longitude(lon.to_degrees()), lat.to_degrees())
}

/// 2D longitude and latitude arrays for the horizontal grid, shaped
/// `(y.len(), x.len())` row-major.
pub fn lonlat_grid(x: &[f64], y: &[f64], origin: &RadarSite) -> (Vec<f64>, Vec<f64>) {
    let mut lon = Vec::with_capacity(x.len() * y.len());
    let mut lat = Vec::with_capacity(x.len() * y.len());
    for yv in y {
        for xv in x {
            let (lo, la) = xy_to_lonlat(*xv, *yv, origin);
            lon.push(lo);
            lat.push(la);
        }
    }
    (lon, lat)
}

/// Cartesian gate position relative to the antenna.
///
/// Uses the 4/3 effective earth radius model. `range` is metres along the
/// beam; angles are degrees. Returns `(x, y, z)` in metres.
pub fn antenna_to_cartesian(range: f64, azimuth: f64, elevation: f64) -> (f64, f64, f64) {
    let r = range;
    let re = EFFECTIVE_EARTH_RADIUS;
    let elev = elevation.to_radians();
    let az = azimuth.to_radians();

    let z = (r * r + re * re + 2.0 * r * re * elev.sin()).sqrt() - re;
    let s = re * (r * elev.cos() / (re + z)).asin();
    (s * az.sin(), s * az.cos(), z)
}

fn wrap_longitude(lon: f64) -> f64 {
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && lon > 0.0 {
        180.0
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{assert_approx_eq, assert_lonlat_approx_eq, TEST_SITE};

    #[test]
    fn test_origin_maps_to_site() {
        let (lon, lat) = xy_to_lonlat(0.0, 0.0, &TEST_SITE);
        assert_lonlat_approx_eq!((lon, lat), (TEST_SITE.longitude, TEST_SITE.latitude), 1e-12);
    }

    #[test]
    fn test_north_offset_moves_latitude_only() {
        // 1 degree of arc on the projection sphere
        let d = EARTH_RADIUS * 1.0_f64.to_radians();
        let (lon, lat) = xy_to_lonlat(0.0, d, &TEST_SITE);
        assert_approx_eq!(lon, TEST_SITE.longitude, 1e-9);
        assert_approx_eq!(lat, TEST_SITE.latitude + 1.0, 1e-9);
    }

    #[test]
    fn test_east_offset_at_equator() {
        let origin = RadarSite {
            latitude: 0.0,
            longitude: 179.5,
            altitude: 0.0,
        };
        let d = EARTH_RADIUS * 1.0_f64.to_radians();
        let (lon, lat) = xy_to_lonlat(d, 0.0, &origin);
        assert_approx_eq!(lat, 0.0, 1e-9);
        assert_approx_eq!(lon, -179.5, 1e-9); // wrapped across the antimeridian
    }

    #[test]
    fn test_lonlat_grid_layout() {
        let x = [-1000.0, 0.0, 1000.0];
        let y = [-500.0, 500.0];
        let (lon, lat) = lonlat_grid(&x, &y, &TEST_SITE);
        assert_eq!(lon.len(), 6);
        assert!(lon[0] < lon[1] && lon[1] < lon[2]);
        assert!(lat[0] < lat[3]);
        assert_approx_eq!(lat[0], lat[2], 1e-6);
    }

    #[test]
    fn test_antenna_to_cartesian() {
        let (x, y, z) = antenna_to_cartesian(10_000.0, 90.0, 0.0);
        assert_approx_eq!(y, 0.0, 1e-6);
        assert_approx_eq!(x, 10_000.0, 1.0);
        // Beam rises above the curved earth even at zero elevation
        assert!(z > 0.0 && z < 10.0);

        let (_, _, z) = antenna_to_cartesian(10_000.0, 0.0, 90.0);
        assert_approx_eq!(z, 10_000.0, 1e-3);
    }
}
