//! Field normalization applied to a volume before any grid spec runs.

use serde::{Deserialize, Serialize};
use tracing::debug;

use radar_common::{DataType, Field, FieldValues, RadarVolume};

use crate::error::{GriddingError, Result};

/// Which fields a volume keeps and under which names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPolicy {
    /// Dropped when present
    pub obsolete: Vec<String>,
    /// `(alias, canonical)` pairs: the alias moves into the canonical slot
    /// when the canonical field is missing
    pub renames: Vec<(String, String)>,
    /// When set, every field outside this list is dropped
    #[serde(default)]
    pub keep_only: Option<Vec<String>>,
    /// Fields without which the volume is unusable
    pub required: Vec<String>,
    /// Decibel fields gridded in linear units and converted back afterwards
    #[serde(default)]
    pub linear_fields: Vec<String>,
}

impl Default for FieldPolicy {
    fn default() -> Self {
        Self {
            obsolete: vec!["total_power".to_string()],
            renames: vec![(
                "corrected_reflectivity".to_string(),
                "reflectivity".to_string(),
            )],
            keep_only: None,
            required: vec!["reflectivity".to_string()],
            linear_fields: vec!["reflectivity".to_string()],
        }
    }
}

impl FieldPolicy {
    /// Policy of the national archive products: a fixed list of quality
    /// controlled fields.
    pub fn national_archive() -> Self {
        let keep = [
            "air_echo_classification",
            "corrected_differential_phase",
            "corrected_differential_reflectivity",
            "corrected_reflectivity",
            "corrected_specific_differential_phase",
            "corrected_velocity",
            "cross_correlation_ratio",
            "normalized_coherent_power",
            "radar_echo_classification",
            "radar_estimated_rain_rate",
            "reflectivity",
            "signal_to_noise_ratio",
            "spectrum_width",
            "total_power",
        ];
        Self {
            obsolete: Vec::new(),
            keep_only: Some(keep.iter().map(|s| s.to_string()).collect()),
            linear_fields: Vec::new(),
            ..Self::default()
        }
    }
}

/// What normalization changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizationReport {
    pub dropped: Vec<String>,
    pub renamed: Vec<(String, String)>,
    /// Fields now holding linear values
    pub linearized: Vec<String>,
}

/// Apply `policy` to the volume's fields.
///
/// Absent obsolete fields are ignored. Each alias is renamed at most once and
/// an alias is dropped when its canonical field already exists, so the two
/// are never both present. Fails when a required field is missing afterwards.
pub fn normalize(volume: &mut RadarVolume, policy: &FieldPolicy) -> Result<NormalizationReport> {
    let mut report = NormalizationReport::default();

    for name in &policy.obsolete {
        if volume.fields.remove(name).is_some() {
            report.dropped.push(name.clone());
        }
    }

    if let Some(keep) = &policy.keep_only {
        let extra: Vec<String> = volume
            .fields
            .names()
            .filter(|name| !keep.iter().any(|k| k == name))
            .map(str::to_string)
            .collect();
        for name in extra {
            volume.fields.remove(&name);
            report.dropped.push(name);
        }
    }

    for (alias, canonical) in &policy.renames {
        if !volume.fields.contains(alias) {
            continue;
        }
        if volume.fields.contains(canonical) {
            volume.fields.remove(alias);
            report.dropped.push(alias.clone());
        } else if volume.fields.rename(alias, canonical) {
            report.renamed.push((alias.clone(), canonical.clone()));
        }
    }

    for name in &policy.linear_fields {
        if let Some(field) = volume.fields.get_mut(name) {
            to_linear(field);
            report.linearized.push(name.clone());
        }
    }

    let missing: Vec<&str> = policy
        .required
        .iter()
        .map(String::as_str)
        .filter(|name| !volume.fields.contains(name))
        .collect();
    if !missing.is_empty() {
        return Err(GriddingError::Normalization(format!(
            "missing required field(s): {}",
            missing.join(", ")
        )));
    }

    debug!(
        dropped = ?report.dropped,
        renamed = ?report.renamed,
        linearized = ?report.linearized,
        "Normalized volume fields"
    );
    Ok(report)
}

/// Replace decibel values with `10^(dB/10)`.
pub fn to_linear(field: &mut Field) {
    map_float(field, |db| 10f64.powf(db / 10.0));
}

/// Replace linear values with `10*log10(v)`; non-positive values become NaN.
pub fn to_decibels(field: &mut Field) {
    map_float(field, |v| if v > 0.0 { 10.0 * v.log10() } else { f64::NAN });
}

fn map_float(field: &mut Field, f: impl Fn(f64) -> f64) {
    if field.dtype() == DataType::Int16 {
        field.cast(DataType::Float32);
    }
    match &mut field.values {
        FieldValues::Float32(values) => values.iter_mut().for_each(|v| *v = f(*v as f64) as f32),
        FieldValues::Float64(values) => values.iter_mut().for_each(|v| *v = f(*v)),
        FieldValues::Int16(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{synthetic_volume, VolumeFixture};

    fn volume_with(fields: &[&str]) -> RadarVolume {
        synthetic_volume(&VolumeFixture {
            fields: fields.iter().map(|s| s.to_string()).collect(),
            ..VolumeFixture::default()
        })
    }

    #[test]
    fn test_alias_renamed_into_canonical_slot() {
        let mut volume = volume_with(&["corrected_reflectivity", "velocity"]);
        let report = normalize(&mut volume, &FieldPolicy::default()).unwrap();

        assert!(volume.fields.contains("reflectivity"));
        assert!(!volume.fields.contains("corrected_reflectivity"));
        assert_eq!(volume.fields.len(), 2);
        assert_eq!(
            report.renamed,
            vec![(
                "corrected_reflectivity".to_string(),
                "reflectivity".to_string()
            )]
        );
    }

    #[test]
    fn test_alias_dropped_when_canonical_present() {
        let mut volume = volume_with(&["reflectivity", "corrected_reflectivity"]);
        normalize(&mut volume, &FieldPolicy::default()).unwrap();
        assert_eq!(volume.fields.names().collect::<Vec<_>>(), vec!["reflectivity"]);
    }

    #[test]
    fn test_obsolete_fields_dropped_absence_ok() {
        let mut volume = volume_with(&["reflectivity", "total_power"]);
        let report = normalize(&mut volume, &FieldPolicy::default()).unwrap();
        assert_eq!(report.dropped, vec!["total_power".to_string()]);

        let mut volume = volume_with(&["reflectivity"]);
        let report = normalize(&mut volume, &FieldPolicy::default()).unwrap();
        assert!(report.dropped.is_empty());
    }

    #[test]
    fn test_missing_required_field_fails() {
        let mut volume = volume_with(&["velocity"]);
        let err = normalize(&mut volume, &FieldPolicy::default()).unwrap_err();
        assert!(matches!(err, GriddingError::Normalization(msg) if msg.contains("reflectivity")));
    }

    #[test]
    fn test_keep_only_list() {
        let mut volume = volume_with(&["corrected_reflectivity", "raw_noise", "spectrum_width"]);
        normalize(&mut volume, &FieldPolicy::national_archive()).unwrap();
        assert_eq!(
            volume.fields.names().collect::<Vec<_>>(),
            vec!["reflectivity", "spectrum_width"]
        );
    }

    #[test]
    fn test_reflectivity_linearized_by_default() {
        let mut volume = volume_with(&["reflectivity", "velocity"]);
        let report = normalize(&mut volume, &FieldPolicy::default()).unwrap();
        assert_eq!(report.linearized, vec!["reflectivity".to_string()]);

        let field = volume.fields.get("reflectivity").unwrap();
        assert!((field.value(0).unwrap() - 1000.0).abs() < 1e-2); // 30 dBZ
        assert!((volume.fields.get("velocity").unwrap().value(0).unwrap()).abs() < 20.0);

        let report = normalize(&mut volume_with(&["reflectivity"]), &FieldPolicy::national_archive())
            .unwrap();
        assert!(report.linearized.is_empty());
    }

    #[test]
    fn test_linear_mean_of_20_and_40_dbz() {
        let mut field =
            Field::new(FieldValues::Float32(vec![20.0, 40.0, f32::NAN]), vec![3]).unwrap();
        to_linear(&mut field);
        assert!(field.value(2).is_none());

        let mean = (field.value(0).unwrap() + field.value(1).unwrap()) / 2.0;
        let mut averaged = Field::new(FieldValues::Float64(vec![mean, 0.0]), vec![2]).unwrap();
        to_decibels(&mut averaged);
        assert!((averaged.value(0).unwrap() - 37.03).abs() < 0.01);
        assert!(averaged.value(1).is_none());
    }
}
