//! Loosely-typed scalars bound into statements and read back out of rows.
//!
//! SQLite columns are dynamically typed, so results are surfaced as a small
//! tagged union that serializes to bare JSON scalars. The same type is used for
//! positional parameters on the way in.

use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// A single scalar cell or parameter.
///
/// JSON `null`, `true`, `5`, `2.5` and `"text"` map to the matching variant.
/// Arrays and objects are rejected, as are integers outside the `i64` range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged, try_from = "serde_json::Value")]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl TryFrom<serde_json::Value> for Value {
    type Error = String;

    fn try_from(json: serde_json::Value) -> Result<Self, Self::Error> {
        match json {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(flag) => Ok(Value::Bool(flag)),
            serde_json::Value::Number(number) => {
                if let Some(int) = number.as_i64() {
                    Ok(Value::Integer(int))
                } else if number.is_u64() {
                    Err(format!("integer {number} does not fit in 64 signed bits"))
                } else {
                    number
                        .as_f64()
                        .map(Value::Real)
                        .ok_or_else(|| format!("unsupported number {number}"))
                }
            }
            serde_json::Value::String(text) => Ok(Value::Text(text)),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                Err("expected a scalar, found an array or object".to_string())
            }
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Bool(flag) => ToSqlOutput::from(*flag),
            Value::Integer(int) => ToSqlOutput::from(*int),
            Value::Real(real) => ToSqlOutput::from(*real),
            Value::Text(text) => ToSqlOutput::Borrowed(ValueRef::Text(text.as_bytes())),
        })
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(int) => Value::Integer(int),
            ValueRef::Real(real) => Value::Real(real),
            // Blobs have no JSON scalar form; they come back as lossy text.
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                Value::Text(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}
