//! Typed field arrays and their attribute metadata.
//!
//! Both radar volumes and grid products carry their data as a [`FieldMap`]:
//! an ordered mapping from field name to a [`Field`]. Lookups return
//! `Option`, so a missing field is an ordinary branch for the caller.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RadarError, RadarResult};

/// Fill value used for integer fields that carry no `_FillValue` attribute.
pub const DEFAULT_INT16_FILL: i16 = -9999;

/// A single attribute value (NetCDF-style).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Int(v) => Some(*v as f64),
            AttrValue::Float(v) => Some(*v),
            AttrValue::Text(_) => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Int(v) => write!(f, "{}", v),
            AttrValue::Float(v) => write!(f, "{}", v),
            AttrValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        AttrValue::Int(v as i64)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

/// Attribute set, kept in A-Z order.
pub type Attributes = BTreeMap<String, AttrValue>;

/// Numeric storage precision of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Int16,
    Float32,
    Float64,
}

/// Flat, row-major field values. Floats use NaN for masked values, integers
/// use the owning field's fill value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValues {
    Int16(Vec<i16>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

impl FieldValues {
    pub fn len(&self) -> usize {
        match self {
            FieldValues::Int16(v) => v.len(),
            FieldValues::Float32(v) => v.len(),
            FieldValues::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> DataType {
        match self {
            FieldValues::Int16(_) => DataType::Int16,
            FieldValues::Float32(_) => DataType::Float32,
            FieldValues::Float64(_) => DataType::Float64,
        }
    }

    /// Value at `index` as f64, `None` when masked or out of range.
    pub fn get(&self, index: usize, fill: i16) -> Option<f64> {
        let value = match self {
            FieldValues::Int16(v) => {
                let raw = *v.get(index)?;
                if raw == fill {
                    return None;
                }
                raw as f64
            }
            FieldValues::Float32(v) => *v.get(index)? as f64,
            FieldValues::Float64(v) => *v.get(index)?,
        };
        if value.is_finite() {
            Some(value)
        } else {
            None
        }
    }

    /// Convert to another precision. Masked values stay masked.
    pub fn cast(&self, dtype: DataType, fill: i16) -> FieldValues {
        if self.dtype() == dtype {
            return self.clone();
        }
        let len = self.len();
        match dtype {
            DataType::Int16 => FieldValues::Int16(
                (0..len)
                    .map(|i| match self.get(i, fill) {
                        Some(v) => v.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16,
                        None => fill,
                    })
                    .collect(),
            ),
            DataType::Float32 => FieldValues::Float32(
                (0..len)
                    .map(|i| self.get(i, fill).map(|v| v as f32).unwrap_or(f32::NAN))
                    .collect(),
            ),
            DataType::Float64 => FieldValues::Float64(
                (0..len)
                    .map(|i| self.get(i, fill).unwrap_or(f64::NAN))
                    .collect(),
            ),
        }
    }
}

/// A named array with its shape and attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub values: FieldValues,
    pub shape: Vec<usize>,
    pub attributes: Attributes,
}

impl Field {
    /// Create a field, checking that `values` fills `shape` exactly.
    pub fn new(values: FieldValues, shape: Vec<usize>) -> RadarResult<Self> {
        let expected: usize = shape.iter().product();
        if expected != values.len() {
            return Err(RadarError::ShapeMismatch {
                expected,
                found: values.len(),
            });
        }
        Ok(Self {
            values,
            shape,
            attributes: Attributes::new(),
        })
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn dtype(&self) -> DataType {
        self.values.dtype()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Fill value applied to integer storage.
    pub fn int_fill(&self) -> i16 {
        self.attributes
            .get("_FillValue")
            .and_then(AttrValue::as_f64)
            .filter(|v| v.is_finite() && *v >= i16::MIN as f64 && *v <= i16::MAX as f64)
            .map(|v| v as i16)
            .unwrap_or(DEFAULT_INT16_FILL)
    }

    /// Value at a flat index, `None` when masked.
    pub fn value(&self, index: usize) -> Option<f64> {
        self.values.get(index, self.int_fill())
    }

    pub fn is_masked(&self, index: usize) -> bool {
        self.value(index).is_none()
    }

    /// Change the storage precision in place, keeping `_FillValue` coherent.
    pub fn cast(&mut self, dtype: DataType) {
        if self.dtype() == dtype {
            return;
        }
        let fill = self.int_fill();
        self.values = self.values.cast(dtype, fill);
        match dtype {
            DataType::Int16 => {
                self.attributes
                    .insert("_FillValue".to_string(), AttrValue::Int(fill as i64));
            }
            DataType::Float32 | DataType::Float64 => {
                self.attributes.remove("_FillValue");
            }
        }
    }
}

/// Field name to field mapping with optional-lookup semantics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    fields: BTreeMap<String, Field>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Insert a field, returning any field previously stored under `name`.
    pub fn insert(&mut self, name: impl Into<String>, field: Field) -> Option<Field> {
        self.fields.insert(name.into(), field)
    }

    pub fn remove(&mut self, name: &str) -> Option<Field> {
        self.fields.remove(name)
    }

    /// Move `from` into the `to` slot. Returns false (and changes nothing)
    /// when `from` is absent or `to` is already taken.
    pub fn rename(&mut self, from: &str, to: &str) -> bool {
        if self.fields.contains_key(to) {
            return false;
        }
        match self.fields.remove(from) {
            Some(field) => {
                self.fields.insert(to.to_string(), field);
                true
            }
            None => false,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Field)> {
        self.fields.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
