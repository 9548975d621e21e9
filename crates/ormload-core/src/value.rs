//! Runtime values bound to statements and read from result rows.

use std::fmt;
use std::hash::{Hash, Hasher};

use ormload_dialect::SqlTypeCode;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A runtime value.
///
/// Composite values carry one entry per column of a multi-column type
/// (composite identifiers, embedded keys) and bind to several placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 string. Dates and timestamps travel as ISO-8601 text.
    Text(String),
    /// Multi-column value.
    Composite(Vec<Value>),
    /// Binary data.
    Bytes(Vec<u8>),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Composite(parts) => parts.iter().all(Value::is_null),
            _ => false,
        }
    }

    /// Try to get as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Leaf values in column order.
    pub fn flatten(&self) -> Vec<&Value> {
        match self {
            Value::Composite(parts) => parts.iter().flat_map(Value::flatten).collect(),
            other => vec![other],
        }
    }

    /// Number of placeholders this value binds to.
    pub fn column_span(&self) -> usize {
        match self {
            Value::Composite(parts) => parts.iter().map(Value::column_span).sum(),
            _ => 1,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Composite(a), Value::Composite(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Text(s) => s.hash(state),
            Value::Composite(parts) => parts.hash(state),
            Value::Bytes(b) => b.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "'{s}'"),
            Value::Composite(parts) => {
                f.write_str("(")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{part}")?;
                }
                f.write_str(")")
            }
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Mapped type of a property, identifier or parameter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Boolean,
    Integer,
    #[default]
    Long,
    Double,
    String,
    Binary,
    Date,
    Timestamp,
    /// Multi-column type, one entry per column.
    Composite(Vec<ValueType>),
}

impl ValueType {
    /// Number of columns the type occupies.
    pub fn column_span(&self) -> usize {
        match self {
            ValueType::Composite(parts) => parts.iter().map(ValueType::column_span).sum(),
            _ => 1,
        }
    }

    /// JDBC type codes, one per column.
    pub fn sql_types(&self) -> Vec<SqlTypeCode> {
        match self {
            ValueType::Boolean => vec![SqlTypeCode::Boolean],
            ValueType::Integer => vec![SqlTypeCode::Integer],
            ValueType::Long => vec![SqlTypeCode::BigInt],
            ValueType::Double => vec![SqlTypeCode::Double],
            ValueType::String => vec![SqlTypeCode::Varchar],
            ValueType::Binary => vec![SqlTypeCode::VarBinary],
            ValueType::Date => vec![SqlTypeCode::Date],
            ValueType::Timestamp => vec![SqlTypeCode::Timestamp],
            ValueType::Composite(parts) => parts.iter().flat_map(ValueType::sql_types).collect(),
        }
    }

    /// Convert a loosely typed value (from a row or the command line) into
    /// this type's runtime representation.
    pub fn coerce(&self, value: Value) -> Result<Value> {
        if matches!(value, Value::Null) {
            return Ok(Value::Null);
        }
        let mismatch = |value: &Value| {
            Error::illegal_argument(format!("cannot convert {value} to {self:?}"))
        };
        match (self, value) {
            (ValueType::Boolean, Value::Bool(b)) => Ok(Value::Bool(b)),
            (ValueType::Boolean, Value::Int(i)) => Ok(Value::Bool(i != 0)),
            (ValueType::Boolean, Value::Text(s)) => match s.as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(mismatch(&Value::Text(s))),
            },
            (ValueType::Integer | ValueType::Long, Value::Int(i)) => Ok(Value::Int(i)),
            (ValueType::Integer | ValueType::Long, Value::Bool(b)) => Ok(Value::Int(i64::from(b))),
            (ValueType::Integer | ValueType::Long, Value::Text(s)) => s
                .trim()
                .parse()
                .map(Value::Int)
                .map_err(|_| mismatch(&Value::Text(s))),
            (ValueType::Double, Value::Float(x)) => Ok(Value::Float(x)),
            (ValueType::Double, Value::Int(i)) => Ok(Value::Float(i as f64)),
            (ValueType::Double, Value::Text(s)) => s
                .trim()
                .parse()
                .map(Value::Float)
                .map_err(|_| mismatch(&Value::Text(s))),
            (ValueType::String | ValueType::Date | ValueType::Timestamp, Value::Text(s)) => {
                Ok(Value::Text(s))
            }
            (ValueType::String, other @ (Value::Int(_) | Value::Float(_) | Value::Bool(_))) => {
                Ok(Value::Text(other.to_string()))
            }
            (ValueType::Binary, Value::Bytes(b)) => Ok(Value::Bytes(b)),
            (ValueType::Binary, Value::Text(s)) => Ok(Value::Bytes(s.into_bytes())),
            (ValueType::Composite(types), Value::Composite(parts)) if types.len() == parts.len() => {
                types
                    .iter()
                    .zip(parts)
                    .map(|(ty, part)| ty.coerce(part))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Composite)
            }
            (_, other) => Err(mismatch(&other)),
        }
    }
}

/// A value paired with its mapped type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedValue {
    pub value: Value,
    pub ty: ValueType,
}

impl TypedValue {
    pub fn new(value: impl Into<Value>, ty: ValueType) -> Self {
        Self {
            value: value.into(),
            ty,
        }
    }

    /// Number of placeholders the value binds to.
    pub fn column_span(&self) -> usize {
        self.ty.column_span()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_composite_flatten_and_span() {
        let key = Value::Composite(vec![Value::Int(1), Value::Text("a".into())]);
        assert_eq!(key.column_span(), 2);
        assert_eq!(key.flatten(), vec![&Value::Int(1), &Value::Text("a".into())]);
        assert_eq!(Value::Int(3).column_span(), 1);
    }

    #[test]
    fn test_value_hash_and_eq() {
        let mut set = HashSet::new();
        set.insert(Value::Float(1.5));
        set.insert(Value::Float(1.5));
        set.insert(Value::Int(1));
        assert_eq!(set.len(), 2);
        assert_ne!(Value::Int(1), Value::Bool(true));
    }

    #[test]
    fn test_coerce() {
        assert_eq!(
            ValueType::Long.coerce(Value::Text("42".into())).unwrap(),
            Value::Int(42)
        );
        assert_eq!(
            ValueType::Boolean.coerce(Value::Int(0)).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(ValueType::String.coerce(Value::Null).unwrap(), Value::Null);
        assert!(ValueType::Integer.coerce(Value::Text("x".into())).is_err());
    }

    #[test]
    fn test_composite_type() {
        let ty = ValueType::Composite(vec![ValueType::Long, ValueType::String]);
        assert_eq!(ty.column_span(), 2);
        assert_eq!(ty.sql_types(), vec![SqlTypeCode::BigInt, SqlTypeCode::Varchar]);
        let coerced = ty
            .coerce(Value::Composite(vec![Value::Text("7".into()), Value::Text("b".into())]))
            .unwrap();
        assert_eq!(
            coerced,
            Value::Composite(vec![Value::Int(7), Value::Text("b".into())])
        );
    }

    #[test]
    fn test_json_round_trip_shape() {
        let value: Value = serde_json::from_str("[1, \"x\", null]").unwrap();
        assert_eq!(
            value,
            Value::Composite(vec![Value::Int(1), Value::Text("x".into()), Value::Null])
        );
        assert_eq!(serde_json::to_string(&Value::Int(5)).unwrap(), "5");
    }
}
