//! Cell values and column types.
//!
//! Every cell of a table lens holds an untyped [`ColumnValue`]. Columns carry a
//! declared or inferred [`ColumnType`]. Numeric values compare and hash by
//! magnitude, so an `Int32(5)` and an `Int64(5)` are the same distinct key and
//! sort next to each other.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Column data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    /// Milliseconds since the Unix epoch.
    Date,
    /// No declared type and nothing to infer from.
    Object,
}

impl ColumnType {
    /// Widening weight for numeric types: byte < short < int < long < float < double.
    pub fn numeric_weight(self) -> Option<u8> {
        match self {
            ColumnType::Int8 => Some(0),
            ColumnType::Int16 => Some(1),
            ColumnType::Int32 => Some(2),
            ColumnType::Int64 => Some(3),
            ColumnType::Float32 => Some(4),
            ColumnType::Float64 => Some(5),
            _ => None,
        }
    }

    pub fn is_numeric(self) -> bool {
        self.numeric_weight().is_some()
    }

    /// The wider of two numeric types, or `None` if either is not numeric.
    pub fn widen(self, other: ColumnType) -> Option<ColumnType> {
        let a = self.numeric_weight()?;
        let b = other.numeric_weight()?;
        Some(if a >= b { self } else { other })
    }

    /// Combine the types observed in one column. Identical types stay, numeric
    /// types widen, anything else collapses to `String`.
    pub fn merge(self, other: ColumnType) -> ColumnType {
        if self == other || other == ColumnType::Object {
            self
        } else if self == ColumnType::Object {
            other
        } else {
            self.widen(other).unwrap_or(ColumnType::String)
        }
    }
}

/// Column value enum to support multiple types
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum ColumnValue {
    #[default]
    Null,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Date(i64),
}

impl ColumnValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ColumnValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            ColumnValue::Int32(v) => Some(*v),
            _ => None,
        }
    }

    /// Integral value of any integer variant.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ColumnValue::Int8(v) => Some(i64::from(*v)),
            ColumnValue::Int16(v) => Some(i64::from(*v)),
            ColumnValue::Int32(v) => Some(i64::from(*v)),
            ColumnValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric value of any numeric variant.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ColumnValue::Float32(v) => Some(f64::from(*v)),
            ColumnValue::Float64(v) => Some(*v),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            ColumnValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.column_type().is_numeric()
    }

    /// Integer magnitude of a numeric value with no fractional part.
    fn integral(&self) -> Option<i64> {
        self.as_i64().or_else(|| {
            let f = self.as_f64()?;
            (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f as i64)
        })
    }

    /// The type of this value. `Null` reports `Object`.
    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnValue::Null => ColumnType::Object,
            ColumnValue::Bool(_) => ColumnType::Bool,
            ColumnValue::Int8(_) => ColumnType::Int8,
            ColumnValue::Int16(_) => ColumnType::Int16,
            ColumnValue::Int32(_) => ColumnType::Int32,
            ColumnValue::Int64(_) => ColumnType::Int64,
            ColumnValue::Float32(_) => ColumnType::Float32,
            ColumnValue::Float64(_) => ColumnType::Float64,
            ColumnValue::String(_) => ColumnType::String,
            ColumnValue::Date(_) => ColumnType::Date,
        }
    }

    /// The zero value used where a type-appropriate blank is required.
    pub fn default_for(column_type: ColumnType) -> ColumnValue {
        match column_type {
            ColumnType::Bool => ColumnValue::Bool(false),
            ColumnType::Int8 => ColumnValue::Int8(0),
            ColumnType::Int16 => ColumnValue::Int16(0),
            ColumnType::Int32 => ColumnValue::Int32(0),
            ColumnType::Int64 => ColumnValue::Int64(0),
            ColumnType::Float32 => ColumnValue::Float32(0.0),
            ColumnType::Float64 => ColumnValue::Float64(0.0),
            ColumnType::String => ColumnValue::String(String::new()),
            ColumnType::Date | ColumnType::Object => ColumnValue::Null,
        }
    }

    /// Parse a text cell, inferring the narrowest sensible type.
    ///
    /// Empty text becomes `Null`; integers that fit in i32 become `Int32`,
    /// larger ones `Int64`; decimals `Float64`; `true`/`false` become `Bool`.
    pub fn infer(text: &str) -> ColumnValue {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return ColumnValue::Null;
        }
        if let Ok(v) = trimmed.parse::<i64>() {
            return match i32::try_from(v) {
                Ok(small) => ColumnValue::Int32(small),
                Err(_) => ColumnValue::Int64(v),
            };
        }
        if let Ok(v) = trimmed.parse::<f64>() {
            return ColumnValue::Float64(v);
        }
        match trimmed.to_lowercase().as_str() {
            "true" => ColumnValue::Bool(true),
            "false" => ColumnValue::Bool(false),
            _ => ColumnValue::String(text.to_string()),
        }
    }

    /// Natural ordering used by sorting, ranking and comparison operators.
    ///
    /// Nulls sort before everything. Numbers compare by magnitude across
    /// variants. Values of unrelated types order by type, then by their text.
    pub fn compare(&self, other: &ColumnValue) -> Ordering {
        match (self, other) {
            (ColumnValue::Null, ColumnValue::Null) => Ordering::Equal,
            (ColumnValue::Null, _) => Ordering::Less,
            (_, ColumnValue::Null) => Ordering::Greater,
            (ColumnValue::Bool(a), ColumnValue::Bool(b)) => a.cmp(b),
            (ColumnValue::String(a), ColumnValue::String(b)) => a.cmp(b),
            (ColumnValue::Date(a), ColumnValue::Date(b)) => a.cmp(b),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let float = |v: &ColumnValue| v.as_f64().unwrap_or(f64::NAN);
                match (a.as_i64(), b.as_i64()) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(x), None) => compare_int_float(x, float(b)),
                    (None, Some(y)) => compare_int_float(y, float(a)).reverse(),
                    (None, None) => {
                        let (x, y) = (float(a), float(b));
                        if x == y {
                            Ordering::Equal
                        } else {
                            x.total_cmp(&y)
                        }
                    }
                }
            }
            (a, b) => type_rank(a)
                .cmp(&type_rank(b))
                .then_with(|| a.to_string().cmp(&b.to_string())),
        }
    }
}

/// Exact comparison of an integer with a float. NaNs sort past either end
/// by sign, as `total_cmp` puts them.
fn compare_int_float(i: i64, f: f64) -> Ordering {
    // 2^63, the first float above every i64.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if f.is_nan() {
        return (i as f64).total_cmp(&f);
    }
    if f >= LIMIT {
        return Ordering::Less;
    }
    if f < -LIMIT {
        return Ordering::Greater;
    }
    i.cmp(&(f.trunc() as i64)).then_with(|| {
        let fract = f.fract();
        if fract > 0.0 {
            Ordering::Less
        } else if fract < 0.0 {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    })
}

fn type_rank(value: &ColumnValue) -> u8 {
    match value {
        ColumnValue::Null => 0,
        ColumnValue::Bool(_) => 1,
        ColumnValue::Int8(_)
        | ColumnValue::Int16(_)
        | ColumnValue::Int32(_)
        | ColumnValue::Int64(_)
        | ColumnValue::Float32(_)
        | ColumnValue::Float64(_) => 2,
        ColumnValue::Date(_) => 3,
        ColumnValue::String(_) => 4,
    }
}

impl PartialEq for ColumnValue {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for ColumnValue {}

impl PartialOrd for ColumnValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Ord for ColumnValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl Hash for ColumnValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        type_rank(self).hash(state);
        match self {
            ColumnValue::Null => {}
            ColumnValue::Bool(v) => v.hash(state),
            ColumnValue::String(v) => v.hash(state),
            ColumnValue::Date(v) => v.hash(state),
            numeric => {
                // Integral magnitudes hash as i64 so that 5, 5i64 and 5.0 collide.
                match numeric.integral() {
                    Some(v) => v.hash(state),
                    None => numeric.as_f64().unwrap_or(f64::NAN).to_bits().hash(state),
                }
            }
        }
    }
}

impl fmt::Display for ColumnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnValue::Null => Ok(()),
            ColumnValue::Bool(v) => write!(f, "{v}"),
            ColumnValue::Int8(v) => write!(f, "{v}"),
            ColumnValue::Int16(v) => write!(f, "{v}"),
            ColumnValue::Int32(v) => write!(f, "{v}"),
            ColumnValue::Int64(v) => write!(f, "{v}"),
            ColumnValue::Float32(v) => write!(f, "{v}"),
            ColumnValue::Float64(v) => write!(f, "{v}"),
            ColumnValue::String(v) => f.write_str(v),
            ColumnValue::Date(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for ColumnValue {
    fn from(value: &str) -> Self {
        ColumnValue::String(value.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(value: String) -> Self {
        ColumnValue::String(value)
    }
}

impl From<i32> for ColumnValue {
    fn from(value: i32) -> Self {
        ColumnValue::Int32(value)
    }
}

impl From<i64> for ColumnValue {
    fn from(value: i64) -> Self {
        ColumnValue::Int64(value)
    }
}

impl From<f64> for ColumnValue {
    fn from(value: f64) -> Self {
        ColumnValue::Float64(value)
    }
}

impl From<bool> for ColumnValue {
    fn from(value: bool) -> Self {
        ColumnValue::Bool(value)
    }
}

impl<T: Into<ColumnValue>> From<Option<T>> for ColumnValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ColumnValue::Null, Into::into)
    }
}
