//! Post-processing of engine output before it is persisted.

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use radar_common::{AttrValue, DataType, Field, FieldMap, FieldValues, GridProduct, GridSpec, WorkItem};

use crate::barnes::ROI_FIELD;
use crate::error::Result;
use crate::normalize::to_decibels;
use crate::projection::lonlat_grid;

/// Engine diagnostics and raw inputs never shipped in products.
pub const DROPPED_FIELDS: [&str; 2] = [ROI_FIELD, "raw_velocity"];

/// Fields carrying a radial velocity.
const VELOCITY_FIELDS: [&str; 2] = ["velocity", "corrected_velocity"];

const VELOCITY_STANDARD_NAME: &str = "radial_velocity_of_scatterers_away_from_instrument";

/// Storage precision of known fields. Unlisted fields keep the engine's type.
pub fn target_dtype(name: &str) -> Option<DataType> {
    match name {
        "air_echo_classification" | "radar_echo_classification" => Some(DataType::Int16),
        "corrected_differential_phase"
        | "corrected_differential_reflectivity"
        | "corrected_reflectivity"
        | "corrected_specific_differential_phase"
        | "corrected_velocity"
        | "cross_correlation_ratio"
        | "normalized_coherent_power"
        | "radar_estimated_rain_rate"
        | "reflectivity"
        | "signal_to_noise_ratio"
        | "spectrum_width"
        | "total_power"
        | "velocity" => Some(DataType::Float32),
        _ => None,
    }
}

/// Clean up `product` and enrich its metadata.
///
/// Fields named in `linear` were gridded in linear units and are turned back
/// into decibels. Returns the 2D `longitude`/`latitude` fields to append once
/// the product has been written.
pub fn finalize(
    product: &mut GridProduct,
    spec: &GridSpec,
    item: &WorkItem,
    linear: &[String],
    now: DateTime<Utc>,
) -> Result<FieldMap> {
    for name in DROPPED_FIELDS {
        product.fields.remove(name);
    }
    for name in linear {
        if let Some(field) = product.fields.get_mut(name) {
            to_decibels(field);
        }
    }

    for (name, field) in product.fields.iter_mut() {
        if let Some(dtype) = target_dtype(name) {
            field.cast(dtype);
        }
        if VELOCITY_FIELDS.contains(&name) {
            field
                .attributes
                .insert("standard_name".to_string(), VELOCITY_STANDARD_NAME.into());
        }
    }

    for (name, attrs) in product.coordinates.iter_mut() {
        let standard_name = match name.as_str() {
            "origin_latitude" | "point_latitude" => "latitude",
            "origin_longitude" | "point_longitude" => "longitude",
            "origin_altitude" | "point_altitude" => "altitude",
            "time" => "time",
            _ => continue,
        };
        attrs.insert("standard_name".to_string(), standard_name.into());
        attrs.insert("coverage_content_type".to_string(), "coordinate".into());
    }

    let (lon, lat) = lonlat_grid(&product.x, &product.y, &product.origin);
    let metadata = derived_metadata(product, spec, item, now, &lon, &lat);
    product.metadata.extend(metadata);

    let shape = vec![product.y.len(), product.x.len()];
    let mut extra = FieldMap::new();
    extra.insert(
        "longitude",
        coordinate_field(lon, shape.clone(), "degrees_east", "longitude")?,
    );
    extra.insert(
        "latitude",
        coordinate_field(lat, shape, "degrees_north", "latitude")?,
    );
    Ok(extra)
}

fn coordinate_field(values: Vec<f64>, shape: Vec<usize>, units: &str, name: &str) -> Result<Field> {
    let values = values.into_iter().map(|v| v as f32).collect();
    Ok(Field::new(FieldValues::Float32(values), shape)?
        .with_attribute("units", units)
        .with_attribute("standard_name", name)
        .with_attribute("long_name", format!("{}_{}", name, units).as_str()))
}

fn derived_metadata(
    product: &GridProduct,
    spec: &GridSpec,
    item: &WorkItem,
    now: DateTime<Utc>,
    lon: &[f64],
    lat: &[f64],
) -> Vec<(String, AttrValue)> {
    let (minlon, maxlon) = min_max(lon);
    let (minlat, maxlat) = min_max(lat);
    let (minlon, maxlon, minlat, maxlat) = (g6(minlon), g6(maxlon), g6(minlat), g6(maxlat));
    let polygon = format!(
        "POLYGON(({minlon} {minlat},{minlon} {maxlat},{maxlon} {maxlat},{maxlon} {minlat},{minlon} {minlat}))"
    );
    let prefix = spec.file_prefix.as_deref().unwrap_or(&item.prefix);
    let field_names = product.fields.names().collect::<Vec<_>>().join(", ");
    let iso = |t: DateTime<Utc>| t.to_rfc3339_opts(SecondsFormat::Secs, true);

    let entries: Vec<(&str, AttrValue)> = vec![
        ("comment", "Gridded radar volume using Barnes et al. ROI".into()),
        ("field_names", field_names.into()),
        ("geospatial_bounds", polygon.into()),
        ("geospatial_lat_max", maxlat.into()),
        ("geospatial_lat_min", minlat.into()),
        ("geospatial_lat_units", "degrees_north".into()),
        ("geospatial_lon_max", maxlon.into()),
        ("geospatial_lon_min", minlon.into()),
        ("geospatial_lon_units", "degrees_east".into()),
        ("geospatial_vertical_min", AttrValue::Int(product.origin.altitude as i64)),
        ("geospatial_vertical_max", AttrValue::Int(spec.z_limits.1 as i64)),
        ("geospatial_vertical_positive", "up".into()),
        (
            "history",
            format!(
                "created by radar-gridder {} at {}",
                env!("CARGO_PKG_VERSION"),
                iso(now)
            )
            .into(),
        ),
        ("processing_level", "b2".into()),
        ("summary", format!("Gridded data from radar {}.", prefix).into()),
        ("time_coverage_start", iso(product.time_start).into()),
        ("time_coverage_end", iso(product.time_end).into()),
        ("title", spec.title().into()),
        ("uuid", Uuid::new_v4().to_string().into()),
    ];
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)))
}

/// Six significant digits with trailing zeros trimmed.
fn g6(value: f64) -> String {
    if value == 0.0 || !value.is_finite() {
        return format!("{}", value);
    }
    let magnitude = value.abs().log10().floor() as i32;
    let decimals = (5 - magnitude).max(0) as usize;
    let text = format!("{:.*}", decimals, value);
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}
