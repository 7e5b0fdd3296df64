//! Distance-weighted gridding engine.
//!
//! Every grid point takes a weighted average of the gates within its radius
//! of influence. Gates are first placed in Cartesian space with the 4/3 earth
//! model and bucketed into cubes at least one radius wide, so each grid point
//! only inspects the 27 buckets around it.

use std::collections::HashMap;

use tracing::{debug, instrument};

use radar_common::{
    Field, FieldValues, GridProduct, GridSpec, RadarVolume, Roi, WeightingFunction,
};

use crate::collab::{GriddingEngine, MaskPolicy};
use crate::error::{GriddingError, Result};
use crate::projection::antenna_to_cartesian;

/// Name of the scratch field holding the radius of influence per cell.
pub const ROI_FIELD: &str = "ROI";

/// Smallest bucket edge in metres.
const MIN_BUCKET: f64 = 250.0;

/// Offset added to Barnes weights so distant gates never weigh exactly zero.
const BARNES_FLOOR: f64 = 1e-5;

/// Gridding engine implementing Barnes, Cressman and nearest-neighbour
/// weighting with constant or beam-spreading radii of influence.
#[derive(Debug, Default, Clone, Copy)]
pub struct BarnesEngine;

impl BarnesEngine {
    pub fn new() -> Self {
        Self
    }
}

/// A gate that passed the mask policy.
#[derive(Debug, Clone, Copy)]
struct Gate {
    x: f64,
    y: f64,
    z: f64,
    /// Flat index into `(nrays, ngates)` field arrays
    index: usize,
}

type BucketKey = (i64, i64, i64);

struct GateIndex {
    gates: Vec<Gate>,
    buckets: HashMap<BucketKey, Vec<usize>>,
    size: f64,
}

impl GateIndex {
    fn new(gates: Vec<Gate>, size: f64) -> Self {
        let mut buckets: HashMap<BucketKey, Vec<usize>> = HashMap::new();
        for (i, gate) in gates.iter().enumerate() {
            buckets
                .entry(key(gate.x, gate.y, gate.z, size))
                .or_default()
                .push(i);
        }
        Self {
            gates,
            buckets,
            size,
        }
    }

    /// Gates within `radius` of `(x, y, z)` with their squared distances.
    fn within(&self, x: f64, y: f64, z: f64, radius: f64, out: &mut Vec<(usize, f64)>) {
        out.clear();
        let r2 = radius * radius;
        let reach = (radius / self.size).ceil() as i64;
        let (kx, ky, kz) = key(x, y, z, self.size);
        for bz in kz - reach..=kz + reach {
            for by in ky - reach..=ky + reach {
                for bx in kx - reach..=kx + reach {
                    let Some(members) = self.buckets.get(&(bx, by, bz)) else {
                        continue;
                    };
                    for &i in members {
                        let g = &self.gates[i];
                        let d2 = (g.x - x).powi(2) + (g.y - y).powi(2) + (g.z - z).powi(2);
                        if d2 < r2 {
                            out.push((g.index, d2));
                        }
                    }
                }
            }
        }
    }
}

fn key(x: f64, y: f64, z: f64, size: f64) -> BucketKey {
    (
        (x / size).floor() as i64,
        (y / size).floor() as i64,
        (z / size).floor() as i64,
    )
}

fn weight(function: WeightingFunction, d2: f64, r2: f64) -> f64 {
    match function {
        WeightingFunction::Barnes => (-d2 / (2.0 * r2)).exp() + BARNES_FLOOR,
        WeightingFunction::Barnes2 => (-d2 / (r2 / 4.0)).exp() + BARNES_FLOOR,
        WeightingFunction::Cressman => (r2 - d2) / (r2 + d2),
        // Nearest is resolved separately
        WeightingFunction::Nearest => 1.0,
    }
}

/// Largest radius of influence anywhere on the grid.
fn max_radius(spec: &GridSpec) -> f64 {
    match spec.roi {
        Roi::Constant { radius } => radius,
        Roi::DistBeam { .. } => {
            let mut max = 0.0_f64;
            for z in [spec.z_limits.0, spec.z_limits.1] {
                for y in [spec.y_limits.0, spec.y_limits.1] {
                    for x in [spec.x_limits.0, spec.x_limits.1] {
                        max = max.max(spec.roi.radius_at(z.abs(), y, x));
                    }
                }
            }
            max
        }
    }
}

/// Gates kept after applying the mask policy.
fn valid_gates(volume: &RadarVolume, mask: &MaskPolicy) -> Result<Vec<Gate>> {
    let ngates = volume.ngates();
    let mask_field = match &mask.exclude_masked {
        Some(name) => Some(volume.fields.get(name).ok_or_else(|| {
            GriddingError::interpolation(format!("mask field '{}' not in volume", name))
        })?),
        None => None,
    };

    let mut gates = Vec::new();
    for ray in 0..volume.nrays() {
        if mask.exclude_transition && volume.is_transition(ray) {
            continue;
        }
        let (az, el) = (volume.azimuth[ray], volume.elevation[ray]);
        for (gate, range) in volume.range.iter().enumerate() {
            let index = ray * ngates + gate;
            if mask_field.is_some_and(|f| f.is_masked(index)) {
                continue;
            }
            let (x, y, z) = antenna_to_cartesian(*range, az, el);
            gates.push(Gate { x, y, z, index });
        }
    }
    Ok(gates)
}

/// Running weighted sum for one field at one grid point.
#[derive(Clone, Copy, Default)]
struct Accumulator {
    sum: f64,
    weight: f64,
    nearest: Option<(f64, f64)>,
}

impl GriddingEngine for BarnesEngine {
    #[instrument(skip_all, fields(spec = %spec.name))]
    fn grid(&self, volume: &RadarVolume, mask: &MaskPolicy, spec: &GridSpec) -> Result<GridProduct> {
        spec.validate()?;

        let expected = volume.nrays() * volume.ngates();
        let sources: Vec<(&str, &Field)> = volume
            .fields
            .iter()
            .filter(|(name, field)| {
                let ok = field.len() == expected;
                if !ok {
                    debug!(field = %name, "Skipping field with unexpected shape");
                }
                ok
            })
            .collect();

        let gates = valid_gates(volume, mask)?;
        if gates.is_empty() {
            return Err(GriddingError::interpolation("no valid gates in volume"));
        }
        debug!(gates = gates.len(), fields = sources.len(), "Gridding volume");

        let index = GateIndex::new(gates, max_radius(spec).max(MIN_BUCKET));

        let (z, y, x) = (spec.z_coords(), spec.y_coords(), spec.x_coords());
        let ncells = z.len() * y.len() * x.len();
        let mut outputs: Vec<Vec<f32>> = vec![vec![f32::NAN; ncells]; sources.len()];
        let mut roi_values = vec![0.0_f32; ncells];
        let mut accs = vec![Accumulator::default(); sources.len()];
        let mut neighbours = Vec::new();

        let mut cell = 0;
        for zv in &z {
            for yv in &y {
                for xv in &x {
                    let radius = spec.roi.radius_at(*zv, *yv, *xv);
                    roi_values[cell] = radius as f32;
                    index.within(*xv, *yv, *zv, radius, &mut neighbours);

                    if !neighbours.is_empty() {
                        accs.iter_mut().for_each(|a| *a = Accumulator::default());
                        let r2 = radius * radius;
                        for &(gate, d2) in &neighbours {
                            let w = weight(spec.weighting, d2, r2);
                            for (acc, (_, field)) in accs.iter_mut().zip(&sources) {
                                let Some(value) = field.value(gate) else {
                                    continue;
                                };
                                acc.sum += w * value;
                                acc.weight += w;
                                if acc.nearest.map_or(true, |(best, _)| d2 < best) {
                                    acc.nearest = Some((d2, value));
                                }
                            }
                        }
                        for (out, acc) in outputs.iter_mut().zip(&accs) {
                            out[cell] = match spec.weighting {
                                WeightingFunction::Nearest => {
                                    acc.nearest.map_or(f32::NAN, |(_, v)| v as f32)
                                }
                                _ if acc.weight > 0.0 => (acc.sum / acc.weight) as f32,
                                _ => f32::NAN,
                            };
                        }
                    }
                    cell += 1;
                }
            }
        }

        let (time_start, time_end) = volume.time_coverage();
        let shape = vec![z.len(), y.len(), x.len()];
        let mut product = GridProduct::new(x, y, z, volume.site, time_start, time_end);
        product.metadata = volume.metadata.clone();

        for ((name, source), values) in sources.iter().zip(outputs) {
            let mut field = Field::new(FieldValues::Float32(values), shape.clone())?;
            field.attributes = source.attributes.clone();
            field.attributes.remove("_FillValue");
            product.fields.insert(*name, field);
        }
        let roi = Field::new(FieldValues::Float32(roi_values), shape)?
            .with_attribute("long_name", "Radius of influence for mapping")
            .with_attribute("units", "m");
        product.fields.insert(ROI_FIELD, roi);

        Ok(product)
    }
}
