//! NetCDF backend: CfRadial and ODIM_H5 volume readers and CF grid writer.
//!
//! Compiled with the `netcdf` feature. Field values are read through the
//! library's type conversion as `f32` and unpacked with `scale_factor` /
//! `add_offset` (CfRadial) or `gain` / `offset` (ODIM); integer storage is
//! restored by post-processing.

use std::path::Path;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use tracing::{debug, instrument, warn};

use radar_common::{
    AttrValue, Attributes, Field, FieldMap, FieldValues, GridProduct, RadarSite, RadarVolume,
};

use crate::collab::{GridWriter, VolumeReader, WriteOptions};
use crate::error::{GriddingError, Result};

/// Ray and gate coordinate variables of a CfRadial file; never fields.
const CFRADIAL_COORDINATES: [&str; 5] = ["time", "range", "azimuth", "elevation", "antenna_transition"];

/// Reads CfRadial 1.x volumes.
#[derive(Debug, Default, Clone, Copy)]
pub struct CfRadialReader;

impl CfRadialReader {
    pub fn new() -> Self {
        Self
    }
}

impl VolumeReader for CfRadialReader {
    #[instrument(skip(self), fields(path = %path.display()))]
    fn read(&self, path: &Path) -> Result<RadarVolume> {
        let file = netcdf::open(path)
            .map_err(|e| GriddingError::read(format!("failed to open {}: {}", path.display(), e)))?;

        let time_var = require(&file, "time")?;
        let offsets: Vec<f64> = values(&time_var)?;
        let units = text_attr(&time_var, "units")
            .ok_or_else(|| GriddingError::read("time variable has no units"))?;
        let epoch = parse_time_units(&units)
            .ok_or_else(|| GriddingError::read(format!("unsupported time units '{}'", units)))?;
        let time = offsets
            .iter()
            .map(|s| epoch + Duration::microseconds((s * 1e6).round() as i64))
            .collect();

        let azimuth = values(&require(&file, "azimuth")?)?;
        let elevation = values(&require(&file, "elevation")?)?;
        let range = values(&require(&file, "range")?)?;
        let site = RadarSite {
            latitude: first(&file, "latitude")?,
            longitude: first(&file, "longitude")?,
            altitude: first(&file, "altitude")?,
        };

        let mut volume = RadarVolume::new(site, time, azimuth, elevation, range)?;
        if let Some(var) = file.variable("antenna_transition") {
            let flags: Vec<f32> = values(&var)?;
            volume.antenna_transition = Some(flags.iter().map(|f| *f != 0.0).collect());
        }

        let (nrays, ngates) = (volume.nrays(), volume.ngates());
        for var in file.variables() {
            let name = var.name();
            let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
            if dims != ["time", "range"] || CFRADIAL_COORDINATES.contains(&name.as_str()) {
                continue;
            }
            let field = read_field(&var, vec![nrays, ngates])?;
            volume.fields.insert(name, field);
        }

        for attr in file.attributes() {
            if let Some(value) = attr.value().ok().and_then(to_attr_value) {
                volume.metadata.insert(attr.name().to_string(), value);
            }
        }

        debug!(rays = nrays, gates = ngates, fields = volume.fields.len(), "Read volume");
        Ok(volume)
    }
}

/// Reads CfRadial or ODIM_H5 volumes depending on the file extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormatReader {
    cfradial: CfRadialReader,
    odim: OdimReader,
}

impl FormatReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// `.h5`, `.hdf` and `.hdf5` files are ODIM_H5; anything else CfRadial.
    pub fn is_odim(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| matches!(e.to_ascii_lowercase().as_str(), "h5" | "hdf" | "hdf5"))
            .unwrap_or(false)
    }
}

impl VolumeReader for FormatReader {
    fn read(&self, path: &Path) -> Result<RadarVolume> {
        if Self::is_odim(path) {
            self.odim.read(path)
        } else {
            self.cfradial.read(path)
        }
    }
}

/// ODIM quantity, field name and units.
const ODIM_QUANTITIES: [(&str, &str, &str); 10] = [
    ("DBZH", "reflectivity", "dBZ"),
    ("TH", "total_power", "dBZ"),
    ("VRADH", "velocity", "m/s"),
    ("WRADH", "spectrum_width", "m/s"),
    ("ZDR", "differential_reflectivity", "dB"),
    ("RHOHV", "cross_correlation_ratio", "ratio"),
    ("PHIDP", "differential_phase", "degrees"),
    ("KDP", "specific_differential_phase", "degrees/km"),
    ("SQIH", "normalized_coherent_power", "ratio"),
    ("SNRH", "signal_to_noise_ratio", "dB"),
];

/// Field name and units for an ODIM quantity. Unknown quantities keep their
/// name and get no units.
pub fn odim_field_name(quantity: &str) -> (String, Option<&'static str>) {
    ODIM_QUANTITIES
        .iter()
        .find(|(q, _, _)| *q == quantity)
        .map(|(_, name, units)| (name.to_string(), Some(*units)))
        .unwrap_or_else(|| (quantity.to_string(), None))
}

/// Packing of one ODIM data array.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OdimPacking {
    pub gain: f64,
    pub offset: f64,
    pub nodata: Option<f64>,
    pub undetect: Option<f64>,
}

impl Default for OdimPacking {
    fn default() -> Self {
        Self {
            gain: 1.0,
            offset: 0.0,
            nodata: None,
            undetect: None,
        }
    }
}

impl OdimPacking {
    /// Physical values; `nodata` and `undetect` become NaN.
    pub fn decode(&self, raw: &[f64]) -> Vec<f32> {
        raw.iter()
            .map(|&v| {
                if Some(v) == self.nodata || Some(v) == self.undetect {
                    f32::NAN
                } else {
                    (v * self.gain + self.offset) as f32
                }
            })
            .collect()
    }
}

/// Acquisition time of each ray of a sweep. Ray `a1gate` is the first
/// acquired; times are spread evenly between `start` and `end`.
pub fn odim_ray_times(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    nrays: usize,
    a1gate: usize,
) -> Vec<DateTime<Utc>> {
    let span = (end - start).num_microseconds().unwrap_or(0).max(0) as f64;
    (0..nrays)
        .map(|ray| {
            let order = (ray + nrays - a1gate % nrays.max(1)) % nrays.max(1);
            start + Duration::microseconds((span * order as f64 / nrays as f64).round() as i64)
        })
        .collect()
}

/// One `datasetN` group: a sweep at a fixed elevation.
#[derive(Debug, Clone)]
pub struct OdimSweep {
    pub elangle: f64,
    pub nrays: usize,
    pub nbins: usize,
    /// Distance to the start of the first bin in m
    pub rstart: f64,
    /// Bin length in m
    pub rscale: f64,
    pub times: Vec<DateTime<Utc>>,
    /// Field name, units and decoded `nrays x nbins` values
    pub fields: Vec<(String, Option<&'static str>, Vec<f32>)>,
}

/// Stack sweeps into one volume. Shorter sweeps are padded with NaN gates.
pub fn assemble_odim(site: RadarSite, sweeps: &[OdimSweep]) -> Result<RadarVolume> {
    let first = sweeps
        .first()
        .ok_or_else(|| GriddingError::read("no dataset groups"))?;
    if let Some(other) = sweeps
        .iter()
        .find(|s| s.rscale != first.rscale || s.rstart != first.rstart)
    {
        return Err(GriddingError::read(format!(
            "sweeps have different gate spacing ({} m from {} m vs {} m from {} m)",
            first.rscale, first.rstart, other.rscale, other.rstart
        )));
    }

    let ngates = sweeps.iter().map(|s| s.nbins).max().unwrap_or(0);
    let nrays: usize = sweeps.iter().map(|s| s.nrays).sum();
    let range = (0..ngates)
        .map(|gate| first.rstart + (gate as f64 + 0.5) * first.rscale)
        .collect();

    let mut time = Vec::with_capacity(nrays);
    let mut azimuth = Vec::with_capacity(nrays);
    let mut elevation = Vec::with_capacity(nrays);
    for sweep in sweeps {
        time.extend_from_slice(&sweep.times);
        azimuth.extend((0..sweep.nrays).map(|ray| (ray as f64 + 0.5) * 360.0 / sweep.nrays as f64));
        elevation.extend(std::iter::repeat(sweep.elangle).take(sweep.nrays));
    }
    let mut volume = RadarVolume::new(site, time, azimuth, elevation, range)?;

    let mut names: Vec<(&str, Option<&'static str>)> = Vec::new();
    for (name, units, _) in sweeps.iter().flat_map(|s| &s.fields) {
        if !names.iter().any(|(n, _)| *n == name.as_str()) {
            names.push((name.as_str(), *units));
        }
    }
    for (name, units) in names {
        let mut data = vec![f32::NAN; nrays * ngates];
        let mut row = 0;
        for sweep in sweeps {
            if let Some((_, _, values)) = sweep.fields.iter().find(|(n, _, _)| n == name) {
                for ray in 0..sweep.nrays {
                    let src = &values[ray * sweep.nbins..(ray + 1) * sweep.nbins];
                    let dst = (row + ray) * ngates;
                    data[dst..dst + sweep.nbins].copy_from_slice(src);
                }
            }
            row += sweep.nrays;
        }
        let mut field = Field::new(FieldValues::Float32(data), vec![nrays, ngates])?;
        if let Some(units) = units {
            field = field.with_attribute("units", units);
        }
        volume.fields.insert(name, field);
    }
    Ok(volume)
}

/// Reads ODIM_H5 polar volumes through the netCDF-4 HDF5 layer.
#[derive(Debug, Default, Clone, Copy)]
pub struct OdimReader;

impl OdimReader {
    pub fn new() -> Self {
        Self
    }
}

impl VolumeReader for OdimReader {
    #[instrument(skip(self), fields(path = %path.display()))]
    fn read(&self, path: &Path) -> Result<RadarVolume> {
        let file = netcdf::open(path)
            .map_err(|e| GriddingError::read(format!("failed to open {}: {}", path.display(), e)))?;

        let what = root_group(&file, "what")?;
        let place = root_group(&file, "where")?;
        let site = RadarSite {
            latitude: group_f64(&place, "lat")?,
            longitude: group_f64(&place, "lon")?,
            altitude: group_f64(&place, "height")?,
        };
        let nominal = odim_time(&what, "date", "time")?;

        let mut datasets: Vec<netcdf::Group> = file
            .groups()
            .map_err(|e| GriddingError::read(e.to_string()))?
            .filter(|g| g.name().starts_with("dataset"))
            .collect();
        datasets.sort_by_key(|g| group_index(&g.name(), "dataset"));

        let mut sweeps = Vec::with_capacity(datasets.len());
        for dataset in &datasets {
            match read_sweep(dataset, nominal)? {
                Some(sweep) => sweeps.push(sweep),
                None => warn!(group = %dataset.name(), "Dataset without data arrays, skipped"),
            }
        }
        let mut volume = assemble_odim(site, &sweeps)?;

        for attr in what.attributes() {
            if let Some(value) = attr.value().ok().and_then(to_attr_value) {
                volume.metadata.insert(attr.name().to_string(), value);
            }
        }
        if let Some(value) = file
            .attribute("Conventions")
            .and_then(|a| a.value().ok())
            .and_then(to_attr_value)
        {
            volume.metadata.insert("Conventions".to_string(), value);
        }

        debug!(
            sweeps = sweeps.len(),
            rays = volume.nrays(),
            gates = volume.ngates(),
            fields = volume.fields.len(),
            "Read ODIM volume"
        );
        Ok(volume)
    }
}

fn root_group<'f>(file: &'f netcdf::File, name: &str) -> Result<netcdf::Group<'f>> {
    file.group(name)
        .map_err(|e| GriddingError::read(e.to_string()))?
        .ok_or_else(|| GriddingError::read(format!("missing group '/{}'", name)))
}

fn group_index(name: &str, prefix: &str) -> usize {
    name.strip_prefix(prefix)
        .and_then(|n| n.parse().ok())
        .unwrap_or(usize::MAX)
}

fn group_attr(group: &netcdf::Group, name: &str) -> Option<netcdf::AttributeValue> {
    group.attribute(name)?.value().ok()
}

fn group_f64(group: &netcdf::Group, name: &str) -> Result<f64> {
    opt_group_f64(group, name).ok_or_else(|| {
        GriddingError::read(format!("missing attribute '{}/{}'", group.name(), name))
    })
}

fn opt_group_f64(group: &netcdf::Group, name: &str) -> Option<f64> {
    f64::try_from(group_attr(group, name)?).ok()
}

fn group_text(group: &netcdf::Group, name: &str) -> Option<String> {
    match group_attr(group, name)? {
        netcdf::AttributeValue::Str(s) => Some(s.trim().to_string()),
        _ => None,
    }
}

/// `YYYYMMDD` + `HHMMSS` attribute pair.
fn odim_time(group: &netcdf::Group, date: &str, time: &str) -> Result<DateTime<Utc>> {
    let (Some(d), Some(t)) = (group_text(group, date), group_text(group, time)) else {
        return Err(GriddingError::read(format!("missing {}/{} attributes", date, time)));
    };
    NaiveDateTime::parse_from_str(&format!("{}{}", d, t), "%Y%m%d%H%M%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| GriddingError::read(format!("invalid time '{} {}': {}", d, t, e)))
}

fn read_sweep(dataset: &netcdf::Group, nominal: DateTime<Utc>) -> Result<Option<OdimSweep>> {
    let place = dataset
        .group("where")
        .ok_or_else(|| GriddingError::read(format!("missing group '{}/where'", dataset.name())))?;
    let elangle = group_f64(&place, "elangle")?;
    let rstart = opt_group_f64(&place, "rstart").unwrap_or(0.0) * 1000.0;
    let rscale = group_f64(&place, "rscale")?;
    let a1gate = opt_group_f64(&place, "a1gate").unwrap_or(0.0).max(0.0) as usize;

    let (start, end) = match dataset.group("what") {
        Some(what) => (
            odim_time(&what, "startdate", "starttime").unwrap_or(nominal),
            odim_time(&what, "enddate", "endtime").unwrap_or(nominal),
        ),
        None => (nominal, nominal),
    };

    let mut data_groups: Vec<netcdf::Group> = dataset
        .groups()
        .filter(|g| g.name().starts_with("data"))
        .collect();
    data_groups.sort_by_key(|g| group_index(&g.name(), "data"));

    let mut shape: Option<(usize, usize)> = None;
    let mut fields = Vec::with_capacity(data_groups.len());
    for group in &data_groups {
        let Some(var) = group.variable("data") else {
            continue;
        };
        let dims: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        let &[nrays, nbins] = dims.as_slice() else {
            return Err(GriddingError::read(format!(
                "{}/{}/data is not two-dimensional",
                dataset.name(),
                group.name()
            )));
        };
        if shape.is_some_and(|s| s != (nrays, nbins)) {
            return Err(GriddingError::read(format!(
                "{} has data arrays of different shapes",
                dataset.name()
            )));
        }
        shape = Some((nrays, nbins));

        let what = group.group("what");
        let quantity = what
            .as_ref()
            .and_then(|w| group_text(w, "quantity"))
            .unwrap_or_else(|| group.name());
        let packing = what
            .as_ref()
            .map(|w| OdimPacking {
                gain: opt_group_f64(w, "gain").unwrap_or(1.0),
                offset: opt_group_f64(w, "offset").unwrap_or(0.0),
                nodata: opt_group_f64(w, "nodata"),
                undetect: opt_group_f64(w, "undetect"),
            })
            .unwrap_or_default();
        let raw: Vec<f64> = values(&var)?;
        let (name, units) = odim_field_name(&quantity);
        fields.push((name, units, packing.decode(&raw)));
    }

    Ok(shape.map(|(nrays, nbins)| OdimSweep {
        elangle,
        nrays,
        nbins,
        rstart,
        rscale,
        times: odim_ray_times(start, end, nrays, a1gate),
        fields,
    }))
}

fn require<'f>(file: &'f netcdf::File, name: &str) -> Result<netcdf::Variable<'f>> {
    file.variable(name)
        .ok_or_else(|| GriddingError::read(format!("missing variable '{}'", name)))
}

fn values<T: netcdf::NcTypeDescriptor + Copy>(var: &netcdf::Variable) -> Result<Vec<T>> {
    var.get_values::<T, _>(..)
        .map_err(|e| GriddingError::read(format!("failed to read '{}': {}", var.name(), e)))
}

fn first(file: &netcdf::File, name: &str) -> Result<f64> {
    values::<f64>(&require(file, name)?)?
        .first()
        .copied()
        .ok_or_else(|| GriddingError::read(format!("variable '{}' is empty", name)))
}

fn has_attr(var: &netcdf::Variable, name: &str) -> bool {
    var.attributes().any(|attr| attr.name() == name)
}

fn f64_attr(var: &netcdf::Variable, name: &str) -> Option<f64> {
    if !has_attr(var, name) {
        return None;
    }
    let attr_value = var.attribute_value(name)?.ok()?;
    f64::try_from(attr_value).ok()
}

fn text_attr(var: &netcdf::Variable, name: &str) -> Option<String> {
    if !has_attr(var, name) {
        return None;
    }
    match var.attribute_value(name)?.ok()? {
        netcdf::AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}

fn read_field(var: &netcdf::Variable, shape: Vec<usize>) -> Result<Field> {
    let raw: Vec<f32> = values(var)?;
    let fill = f64_attr(var, "_FillValue").or_else(|| f64_attr(var, "missing_value"));
    let scale = f64_attr(var, "scale_factor").unwrap_or(1.0);
    let offset = f64_attr(var, "add_offset").unwrap_or(0.0);

    let data = raw
        .into_iter()
        .map(|v| match fill {
            Some(f) if (v as f64 - f).abs() < 1e-6 * f.abs().max(1.0) => f32::NAN,
            _ => (v as f64 * scale + offset) as f32,
        })
        .collect();

    let mut field = Field::new(FieldValues::Float32(data), shape)?;
    for attr in var.attributes() {
        let name = attr.name();
        if matches!(name, "_FillValue" | "missing_value" | "scale_factor" | "add_offset") {
            continue;
        }
        if let Some(value) = attr.value().ok().and_then(to_attr_value) {
            field.attributes.insert(name.to_string(), value);
        }
    }
    Ok(field)
}

fn to_attr_value(value: netcdf::AttributeValue) -> Option<AttrValue> {
    use netcdf::AttributeValue as V;
    Some(match value {
        V::Str(s) => AttrValue::Text(s),
        V::Double(v) => AttrValue::Float(v),
        V::Float(v) => AttrValue::Float(v as f64),
        V::Schar(v) => AttrValue::Int(v as i64),
        V::Uchar(v) => AttrValue::Int(v as i64),
        V::Short(v) => AttrValue::Int(v as i64),
        V::Ushort(v) => AttrValue::Int(v as i64),
        V::Int(v) => AttrValue::Int(v as i64),
        V::Uint(v) => AttrValue::Int(v as i64),
        V::Longlong(v) => AttrValue::Int(v),
        _ => return None,
    })
}

fn from_attr_value(value: &AttrValue) -> netcdf::AttributeValue {
    match value {
        AttrValue::Text(s) => s.clone().into(),
        AttrValue::Float(v) => (*v).into(),
        AttrValue::Int(v) => match i32::try_from(*v) {
            Ok(v) => v.into(),
            Err(_) => (*v).into(),
        },
    }
}

/// Epoch of CF `seconds since ...` units.
pub(crate) fn parse_time_units(units: &str) -> Option<DateTime<Utc>> {
    let reference = units.trim().strip_prefix("seconds since")?.trim();
    let reference = reference.trim_end_matches('Z').replace('T', " ");
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&reference, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn units_since(t: DateTime<Utc>) -> String {
    format!("seconds since {}", t.format("%Y-%m-%dT%H:%M:%SZ"))
}

/// Writes grid products as CF NetCDF-4 files.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetcdfGridWriter;

impl NetcdfGridWriter {
    pub fn new() -> Self {
        Self
    }
}

fn wrap<E: std::fmt::Display>(path: &Path) -> impl Fn(E) -> GriddingError + '_ {
    move |e| GriddingError::write(format!("{}: {}", path.display(), e))
}

fn put_attributes(var: &mut netcdf::VariableMut, attrs: &Attributes, path: &Path) -> Result<()> {
    for (name, value) in attrs {
        if name == "_FillValue" {
            continue;
        }
        var.put_attribute(name, from_attr_value(value)).map_err(wrap(path))?;
    }
    Ok(())
}

fn put_field(
    file: &mut netcdf::FileMut,
    name: &str,
    field: &Field,
    dims: &[&str],
    path: &Path,
) -> Result<()> {
    match &field.values {
        FieldValues::Int16(data) => {
            let mut var = file.add_variable::<i16>(name, dims).map_err(wrap(path))?;
            var.set_fill_value(field.int_fill()).map_err(wrap(path))?;
            put_attributes(&mut var, &field.attributes, path)?;
            var.put_values(data, ..).map_err(wrap(path))?;
        }
        FieldValues::Float32(data) => {
            let mut var = file.add_variable::<f32>(name, dims).map_err(wrap(path))?;
            put_attributes(&mut var, &field.attributes, path)?;
            var.put_values(data, ..).map_err(wrap(path))?;
        }
        FieldValues::Float64(data) => {
            let mut var = file.add_variable::<f64>(name, dims).map_err(wrap(path))?;
            put_attributes(&mut var, &field.attributes, path)?;
            var.put_values(data, ..).map_err(wrap(path))?;
        }
    }
    Ok(())
}

fn put_coordinate(
    file: &mut netcdf::FileMut,
    name: &str,
    dims: &[&str],
    data: &[f64],
    attrs: &[(&str, AttrValue)],
    product: &GridProduct,
    path: &Path,
) -> Result<()> {
    let mut var = file.add_variable::<f64>(name, dims).map_err(wrap(path))?;
    for (key, value) in attrs {
        var.put_attribute(key, from_attr_value(value)).map_err(wrap(path))?;
    }
    if let Some(extra) = product.coordinates.get(name) {
        put_attributes(&mut var, extra, path)?;
    }
    var.put_values(data, ..).map_err(wrap(path))?;
    Ok(())
}

impl GridWriter for NetcdfGridWriter {
    #[instrument(skip(self, product, options), fields(path = %path.display()))]
    fn write(&self, path: &Path, product: &GridProduct, options: &WriteOptions) -> Result<()> {
        let (nz, ny, nx) = product.shape();
        let mut file = netcdf::create(path).map_err(wrap(path))?;
        for (name, len) in [("time", 1), ("z", nz), ("y", ny), ("x", nx)] {
            file.add_dimension(name, len).map_err(wrap(path))?;
        }

        let epoch = product.time_start;
        let units = units_since(epoch);
        let offset_end = (product.time_end - epoch).num_milliseconds() as f64 / 1000.0;

        put_coordinate(
            &mut file,
            "time",
            &["time"],
            &[0.0],
            &[
                ("units", units.as_str().into()),
                ("long_name", "Time of grid".into()),
                ("calendar", "gregorian".into()),
            ],
            product,
            path,
        )?;
        let axes: [(&str, &[f64], &str); 3] = [
            ("x", &product.x, "X distance on the projection plane from the origin"),
            ("y", &product.y, "Y distance on the projection plane from the origin"),
            ("z", &product.z, "Z distance on the projection plane from the origin"),
        ];
        for (name, data, long_name) in axes {
            put_coordinate(
                &mut file,
                name,
                &[name],
                data,
                &[("units", "m".into()), ("long_name", long_name.into())],
                product,
                path,
            )?;
        }
        let origin = [
            ("origin_latitude", product.origin.latitude, "degrees_north"),
            ("origin_longitude", product.origin.longitude, "degrees_east"),
            ("origin_altitude", product.origin.altitude, "m"),
        ];
        for (name, value, units) in origin {
            put_coordinate(
                &mut file,
                name,
                &["time"],
                &[value],
                &[("units", units.into())],
                product,
                path,
            )?;
        }

        if options.arm_time_variables {
            let mut base = file.add_variable::<i32>("base_time", &[]).map_err(wrap(path))?;
            base.put_attribute("units", "seconds since 1970-01-01T00:00:00Z")
                .map_err(wrap(path))?;
            base.put_attribute("long_name", "Base time in Epoch")
                .map_err(wrap(path))?;
            base.put_values(&[epoch.timestamp() as i32], ..)
                .map_err(wrap(path))?;

            let mut offset = file
                .add_variable::<f64>("time_offset", &["time"])
                .map_err(wrap(path))?;
            offset.put_attribute("units", units.as_str()).map_err(wrap(path))?;
            offset.put_attribute("long_name", "Time offset from base_time")
                .map_err(wrap(path))?;
            offset.put_values(&[0.0], ..).map_err(wrap(path))?;
        }

        if options.write_point_lon_lat_alt {
            let (lon, lat) = crate::projection::lonlat_grid(&product.x, &product.y, &product.origin);
            let mut point_lon = Vec::with_capacity(nz * ny * nx);
            let mut point_lat = Vec::with_capacity(nz * ny * nx);
            let mut point_alt = Vec::with_capacity(nz * ny * nx);
            for z in &product.z {
                point_lon.extend_from_slice(&lon);
                point_lat.extend_from_slice(&lat);
                point_alt.extend(std::iter::repeat(product.origin.altitude + z).take(ny * nx));
            }
            let points = [
                ("point_longitude", point_lon, "degrees_east"),
                ("point_latitude", point_lat, "degrees_north"),
                ("point_altitude", point_alt, "m"),
            ];
            for (name, data, units) in points {
                put_coordinate(
                    &mut file,
                    name,
                    &["z", "y", "x"],
                    &data,
                    &[("units", units.into())],
                    product,
                    path,
                )?;
            }
        }

        for (name, field) in product.fields.iter() {
            put_field(&mut file, name, field, &["time", "z", "y", "x"], path)?;
        }

        for (name, value) in &product.metadata {
            file.add_attribute(name, from_attr_value(value))
                .map_err(wrap(path))?;
        }
        debug!(fields = product.fields.len(), coverage_s = offset_end, "Wrote grid");
        Ok(())
    }

    fn append_fields(&self, path: &Path, fields: &FieldMap) -> Result<()> {
        let mut file = netcdf::append(path).map_err(wrap(path))?;
        for (name, field) in fields.iter() {
            put_field(&mut file, name, field, &["y", "x"], path)?;
        }
        Ok(())
    }
}
