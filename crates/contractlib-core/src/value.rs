//! Snapshot value representation for contract diagnostics and old values.
//!
//! [`Value`] is a closed, owned sum type. Every snapshot is a deep copy: once
//! captured, nothing the caller does to the original can reach it. Arbitrary
//! `serde::Serialize` types are captured through `serde_json` and can be
//! restored with [`Value::restore`].

use std::fmt;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;

/// An owned snapshot of a value.
///
/// Serializes untagged, so capturing a `Value` through serde yields the same
/// `Value` back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Unit,
    Bool(bool),
    I64(i64),
    /// Only used for integers above `i64::MAX`.
    U64(u64),
    F64(f64),
    Str(String),
    Array(Vec<Value>),
    /// Fields in insertion order.
    Map(IndexMap<String, Value>),
}

impl Value {
    /// Takes a deep snapshot of any serializable value.
    pub fn capture<T: Serialize + ?Sized>(value: &T) -> Result<Value, SnapshotError> {
        let json = serde_json::to_value(value).map_err(SnapshotError::Capture)?;
        Ok(Value::from_json(json))
    }

    /// Rebuilds a typed value from this snapshot.
    pub fn restore<T: DeserializeOwned>(&self) -> Result<T, SnapshotError> {
        serde_json::from_value(self.to_json()).map_err(|source| SnapshotError::Restore {
            target: std::any::type_name::<T>(),
            source,
        })
    }

    /// Converts a `serde_json` tree into a snapshot.
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Unit,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::I64(i)
                } else if let Some(u) = n.as_u64() {
                    Value::U64(u)
                } else {
                    Value::F64(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(fields) => Value::Map(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Converts this snapshot into a `serde_json` tree.
    ///
    /// Non-finite floats have no JSON form and become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Unit => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::I64(i) => serde_json::Value::from(*i),
            Value::U64(u) => serde_json::Value::from(*u),
            Value::F64(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Returns a human-readable description of the value's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unit => "Unit",
            Value::Bool(_) => "Bool",
            Value::I64(_) => "I64",
            Value::U64(_) => "U64",
            Value::F64(_) => "F64",
            Value::Str(_) => "Str",
            Value::Array(_) => "Array",
            Value::Map(_) => "Map",
        }
    }
}

/// Renders the value the way failure messages quote it: scalars bare,
/// unit as nothing, compound values as JSON.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::I64(i) => write!(f, "{}", i),
            Value::U64(u) => write!(f, "{}", u),
            Value::F64(v) => write!(f, "{}", v),
            Value::Str(s) => f.write_str(s),
            Value::Array(_) | Value::Map(_) => write!(f, "{}", self.to_json()),
        }
    }
}

macro_rules! value_from_small_int {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::I64(v as i64)
            }
        })*
    };
}

value_from_small_int!(i8, i16, i32, i64, isize, u8, u16, u32);

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        i64::try_from(v).map(Value::I64).unwrap_or(Value::U64(v))
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::from(v as u64)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F64(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<char> for Value {
    fn from(v: char) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Unit
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Unit)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}
