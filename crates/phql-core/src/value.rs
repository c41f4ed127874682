//! Dynamic SQL values.

use crate::error::{Error, TypeError};
use crate::metadata::DataType;
use serde::{Deserialize, Serialize};

/// A dynamically-typed SQL value.
///
/// Used for bind parameters, record attributes and fetched rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,

    /// Boolean value
    Bool(bool),

    /// 32-bit signed integer
    Int(i32),

    /// 64-bit signed integer
    BigInt(i64),

    /// 64-bit floating point
    Double(f64),

    /// Arbitrary precision decimal (stored as string)
    Decimal(String),

    /// Text string
    Text(String),

    /// Binary data
    Bytes(Vec<u8>),

    /// JSON value
    Json(serde_json::Value),

    /// Array of values, expanded into one placeholder per element
    Array(Vec<Value>),

    /// A raw SQL fragment written verbatim instead of being bound
    Raw(String),

    /// SQL DEFAULT keyword
    Default,
}

impl Value {
    /// Check if this value is NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get the type name of this value.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::Int(_) => "INTEGER",
            Value::BigInt(_) => "BIGINT",
            Value::Double(_) => "DOUBLE",
            Value::Decimal(_) => "DECIMAL",
            Value::Text(_) => "TEXT",
            Value::Bytes(_) => "BLOB",
            Value::Json(_) => "JSON",
            Value::Array(_) => "ARRAY",
            Value::Raw(_) => "RAW",
            Value::Default => "DEFAULT",
        }
    }

    /// Try to convert this value to a bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            Value::Int(v) => Some(*v != 0),
            Value::BigInt(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Try to convert this value to an i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(i64::from(*v)),
            Value::BigInt(v) => Some(*v),
            Value::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Try to convert this value to an f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(f64::from(*v)),
            Value::BigInt(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            Value::Decimal(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Try to get this value as a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Decimal(s) | Value::Raw(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as an array slice.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Whether the value is empty in the loose sense used by input filters
    /// (NULL or an empty string).
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Convert into a plain JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null | Value::Default => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(v) => Json::from(*v),
            Value::BigInt(v) => Json::from(*v),
            Value::Double(v) => serde_json::Number::from_f64(*v).map_or(Json::Null, Json::Number),
            Value::Decimal(s) | Value::Text(s) | Value::Raw(s) => Json::String(s.clone()),
            Value::Bytes(b) => Json::Array(b.iter().map(|byte| Json::from(*byte)).collect()),
            Value::Json(v) => v.clone(),
            Value::Array(items) => Json::Array(items.iter().map(Value::to_json).collect()),
        }
    }

    /// Cast a fetched value to the declared column type.
    ///
    /// Values that cannot be represented in the target type are returned unchanged.
    pub fn cast(self, data_type: DataType) -> Value {
        if self.is_null() {
            return self;
        }
        match data_type {
            DataType::Integer | DataType::BigInteger => match &self {
                Value::Text(s) => s.trim().parse::<i64>().map_or(self, Value::BigInt),
                Value::Double(d) => Value::BigInt(*d as i64),
                Value::Bool(b) => Value::BigInt(i64::from(*b)),
                _ => self,
            },
            DataType::Double | DataType::Float => match &self {
                Value::Text(s) => s.trim().parse::<f64>().map_or(self, Value::Double),
                Value::Int(_) | Value::BigInt(_) | Value::Decimal(_) => {
                    self.as_f64().map_or(self, Value::Double)
                }
                _ => self,
            },
            DataType::Decimal => match &self {
                Value::Text(s) => Value::Decimal(s.clone()),
                Value::Int(v) => Value::Decimal(v.to_string()),
                Value::BigInt(v) => Value::Decimal(v.to_string()),
                Value::Double(v) => Value::Decimal(v.to_string()),
                _ => self,
            },
            DataType::Boolean => match &self {
                Value::Text(s) => match s.as_str() {
                    "1" | "t" | "true" => Value::Bool(true),
                    "0" | "f" | "false" => Value::Bool(false),
                    _ => self,
                },
                _ => self.as_bool().map_or(self, Value::Bool),
            },
            DataType::Char
            | DataType::Varchar
            | DataType::Text
            | DataType::Date
            | DataType::DateTime => match &self {
                Value::Int(v) => Value::Text(v.to_string()),
                Value::BigInt(v) => Value::Text(v.to_string()),
                Value::Double(v) => Value::Text(v.to_string()),
                Value::Decimal(s) => Value::Text(s.clone()),
                _ => self,
            },
            DataType::Blob | DataType::Json => self,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Value::Array(v.into_iter().map(Value::BigInt).collect())
    }
}

impl From<Vec<&str>> for Value {
    fn from(v: Vec<&str>) -> Self {
        Value::Array(v.into_iter().map(Value::from).collect())
    }
}

fn type_error(expected: &'static str, actual: &Value) -> Error {
    Error::Type(TypeError {
        expected,
        actual: actual.type_name().to_string(),
        column: None,
    })
}

impl TryFrom<Value> for bool {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_bool().ok_or_else(|| type_error("bool", &value))
    }
}

impl TryFrom<Value> for i64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_i64().ok_or_else(|| type_error("i64", &value))
    }
}

impl TryFrom<Value> for f64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_f64().ok_or_else(|| type_error("f64", &value))
    }
}

impl TryFrom<Value> for String {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Text(s) | Value::Decimal(s) => Ok(s),
            other => Err(type_error("String", &other)),
        }
    }
}

macro_rules! impl_try_from_nullable {
    ($($ty:ty),*) => {
        $(
            impl TryFrom<Value> for Option<$ty> {
                type Error = Error;

                fn try_from(value: Value) -> Result<Self, Self::Error> {
                    if value.is_null() {
                        Ok(None)
                    } else {
                        <$ty>::try_from(value).map(Some)
                    }
                }
            }
        )*
    };
}

impl_try_from_nullable!(bool, i64, f64, String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(Value::from(5_i64).as_i64(), Some(5));
        assert_eq!(Value::from(true).as_i64(), Some(1));
        assert_eq!(Value::from("abc").as_str(), Some("abc"));
        assert_eq!(Value::Decimal("1.5".into()).as_f64(), Some(1.5));
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }

    #[test]
    fn test_try_from() {
        let n: i64 = Value::Int(7).try_into().unwrap();
        assert_eq!(n, 7);
        let s: Option<String> = Value::Null.try_into().unwrap();
        assert!(s.is_none());
        let err = i64::try_from(Value::Text("x".into())).unwrap_err();
        assert!(matches!(err, Error::Type(_)));
    }

    #[test]
    fn test_to_json() {
        let value = Value::Array(vec![Value::BigInt(1), Value::Text("a".into()), Value::Null]);
        assert_eq!(value.to_json(), serde_json::json!([1, "a", null]));
    }

    #[test]
    fn test_cast_on_hydrate() {
        assert_eq!(
            Value::Text("42".into()).cast(DataType::Integer),
            Value::BigInt(42)
        );
        assert_eq!(
            Value::Text("1.25".into()).cast(DataType::Double),
            Value::Double(1.25)
        );
        assert_eq!(Value::Int(1).cast(DataType::Boolean), Value::Bool(true));
        assert_eq!(
            Value::BigInt(9).cast(DataType::Varchar),
            Value::Text("9".into())
        );
        assert_eq!(Value::Null.cast(DataType::Integer), Value::Null);
        assert_eq!(
            Value::Text("abc".into()).cast(DataType::Integer),
            Value::Text("abc".into())
        );
    }

    #[test]
    fn test_blank() {
        assert!(Value::Null.is_blank());
        assert!(Value::Text(String::new()).is_blank());
        assert!(!Value::BigInt(0).is_blank());
    }
}
