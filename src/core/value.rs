//! Attribute values and their comparison rules
//!
//! Snapshot values are heterogeneous: sizes, names, dates, flags and nested
//! records all live side by side under string keys. `AttributeValue` gives
//! them a single representation with an equality relation defined per
//! variant, and a fixed answer for pairs of different variants.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single attribute value as delivered by the search layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Date(DateTime<Utc>),
    String(String),
    Array(Vec<AttributeValue>),
    Record(BTreeMap<String, AttributeValue>),
}

/// Outcome of comparing two present values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    Unequal,
    /// The two values have no common notion of equality
    Incomparable,
}

impl AttributeValue {
    /// Compare two values. Integers and floats compare numerically; every
    /// other pair of different variants is incomparable.
    ///
    /// NaN equals NaN so an unchanged NaN attribute is not reported in every
    /// epoch. An integer equals a float only when the float holds exactly
    /// that integer.
    pub fn compare(&self, other: &AttributeValue) -> Comparison {
        use AttributeValue::*;

        match (self, other) {
            (Bool(a), Bool(b)) => Comparison::from_eq(a == b),
            (Integer(a), Integer(b)) => Comparison::from_eq(a == b),
            (Float(a), Float(b)) => Comparison::from_eq(a == b || (a.is_nan() && b.is_nan())),
            (Integer(a), Float(b)) | (Float(b), Integer(a)) => Comparison::from_eq(float_is_integer(*b, *a)),
            (Date(a), Date(b)) => Comparison::from_eq(a == b),
            (String(a), String(b)) => Comparison::from_eq(a == b),
            (Array(a), Array(b)) => {
                if a.len() != b.len() {
                    return Comparison::Unequal;
                }
                a.iter()
                    .zip(b)
                    .map(|(x, y)| x.compare(y))
                    .fold(Comparison::Equal, Comparison::and)
            }
            (Record(a), Record(b)) => {
                if a.len() != b.len() || a.keys().ne(b.keys()) {
                    return Comparison::Unequal;
                }
                a.values()
                    .zip(b.values())
                    .map(|(x, y)| x.compare(y))
                    .fold(Comparison::Equal, Comparison::and)
            }
            _ => Comparison::Incomparable,
        }
    }

    /// Short name of the variant, used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            AttributeValue::Bool(_) => "bool",
            AttributeValue::Integer(_) => "integer",
            AttributeValue::Float(_) => "float",
            AttributeValue::Date(_) => "date",
            AttributeValue::String(_) => "string",
            AttributeValue::Array(_) => "array",
            AttributeValue::Record(_) => "record",
        }
    }

    /// Convert into a concrete Rust type, if the variant allows it
    pub fn get<T: FromAttributeValue>(&self) -> Option<T> {
        T::from_attribute_value(self)
    }
}

impl Comparison {
    fn from_eq(equal: bool) -> Self {
        if equal {
            Comparison::Equal
        } else {
            Comparison::Unequal
        }
    }

    // Incomparable dominates, then Unequal.
    fn and(self, other: Comparison) -> Comparison {
        match (self, other) {
            (Comparison::Incomparable, _) | (_, Comparison::Incomparable) => Comparison::Incomparable,
            (Comparison::Unequal, _) | (_, Comparison::Unequal) => Comparison::Unequal,
            _ => Comparison::Equal,
        }
    }
}

impl PartialEq for AttributeValue {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Comparison::Equal
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(v) => write!(f, "{}", v),
            AttributeValue::Integer(v) => write!(f, "{}", v),
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::Date(v) => write!(f, "{}", v.to_rfc3339()),
            AttributeValue::String(v) => write!(f, "{:?}", v),
            AttributeValue::Array(_) | AttributeValue::Record(_) => {
                let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

/// Typed extraction from an `AttributeValue`
pub trait FromAttributeValue: Sized {
    fn from_attribute_value(value: &AttributeValue) -> Option<Self>;
}

impl FromAttributeValue for AttributeValue {
    fn from_attribute_value(value: &AttributeValue) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromAttributeValue for bool {
    fn from_attribute_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromAttributeValue for i64 {
    fn from_attribute_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Integer(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromAttributeValue for u64 {
    fn from_attribute_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Integer(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl FromAttributeValue for f64 {
    fn from_attribute_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Float(v) => Some(*v),
            AttributeValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl FromAttributeValue for String {
    fn from_attribute_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::String(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl FromAttributeValue for DateTime<Utc> {
    fn from_attribute_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Date(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromAttributeValue for Vec<AttributeValue> {
    fn from_attribute_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Array(v) => Some(v.clone()),
            _ => None,
        }
    }
}

macro_rules! impl_from_for_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for AttributeValue {
                fn from(value: $ty) -> Self {
                    AttributeValue::$variant(value.into())
                }
            }
        )*
    };
}

impl_from_for_value! {
    bool => Bool,
    i64 => Integer,
    i32 => Integer,
    f64 => Float,
    String => String,
    &str => String,
    DateTime<Utc> => Date,
    Vec<AttributeValue> => Array,
    BTreeMap<String, AttributeValue> => Record,
}

impl From<u64> for AttributeValue {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(v) => AttributeValue::Integer(v),
            Err(_) => AttributeValue::Float(value as f64),
        }
    }
}

// `i64 as f64` rounds above 2^53, so compare in the integer domain instead.
fn float_is_integer(float: f64, integer: i64) -> bool {
    const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;
    float.fract() == 0.0 && (-I64_BOUND..I64_BOUND).contains(&float) && float as i64 == integer
}
