//! Driver-native scalar values.
//!
//! `Value` is what a bound argument list is made of and what a result row
//! carries back. `FromValue` converts a scanned value into a Rust destination.

use crate::error::ConversionError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A scalar understood natively by the backing driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Float value
    Float(f64),
    /// String value
    Text(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// Timestamp without time zone
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Short name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Timestamp(_) => "timestamp",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            Value::Timestamp(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S%.f")),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i8> for Value {
    fn from(value: i8) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<i16> for Value {
    fn from(value: i16) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u16> for Value {
    fn from(value: u16) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float(f64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::Timestamp(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Conversion from a scanned column value into a destination type.
pub trait FromValue: Sized {
    /// Convert the value, failing on type mismatch, overflow or unexpected NULL.
    fn from_value(value: Value) -> Result<Self, ConversionError>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        Ok(value)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Int(i) => Ok(i != 0),
            other => Err(mismatch("bool", &other)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Int(i) => Ok(i),
            Value::Bool(b) => Ok(i64::from(b)),
            Value::Text(s) => s.trim().parse().map_err(|_| ConversionError::TypeMismatch {
                expected: "i64",
                found: "text",
            }),
            other => Err(mismatch("i64", &other)),
        }
    }
}

macro_rules! narrow_int_from_value {
    ($($t:ty),*) => {
        $(
            impl FromValue for $t {
                fn from_value(value: Value) -> Result<Self, ConversionError> {
                    let wide = i64::from_value(value).map_err(|e| match e {
                        ConversionError::UnexpectedNull { .. } => ConversionError::UnexpectedNull {
                            expected: stringify!($t),
                        },
                        other => other,
                    })?;
                    <$t>::try_from(wide).map_err(|_| ConversionError::Overflow {
                        value: wide.to_string(),
                        target: stringify!($t),
                    })
                }
            }
        )*
    };
}

narrow_int_from_value!(i8, i16, i32, u16, u32, u64);

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Float(x) => Ok(x),
            #[allow(clippy::cast_precision_loss)]
            Value::Int(i) => Ok(i as f64),
            Value::Text(s) => s.trim().parse().map_err(|_| ConversionError::TypeMismatch {
                expected: "f64",
                found: "text",
            }),
            other => Err(mismatch("f64", &other)),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        #[allow(clippy::cast_possible_truncation)]
        f64::from_value(value).map(|x| x as f32)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Text(s) => Ok(s),
            Value::Bytes(b) => String::from_utf8(b).map_err(|_| ConversionError::TypeMismatch {
                expected: "String",
                found: "bytes",
            }),
            Value::Null => Err(ConversionError::UnexpectedNull { expected: "String" }),
            other => Ok(other.to_string()),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Bytes(b) => Ok(b),
            Value::Text(s) => Ok(s.into_bytes()),
            other => Err(mismatch("Vec<u8>", &other)),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Timestamp(t) => Ok(t),
            Value::Text(s) => NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f").map_err(
                |_| ConversionError::TypeMismatch {
                    expected: "NaiveDateTime",
                    found: "text",
                },
            ),
            other => Err(mismatch("NaiveDateTime", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

fn mismatch(expected: &'static str, found: &Value) -> ConversionError {
    match found {
        Value::Null => ConversionError::UnexpectedNull { expected },
        other => ConversionError::TypeMismatch {
            expected,
            found: other.type_name(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(42i32), Value::Int(42));
        assert_eq!(Value::from("bob"), Value::Text("bob".to_string()));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(1.5f64)), Value::Float(1.5));
    }

    #[test]
    fn test_display_renders_bytes_as_hex() {
        assert_eq!(Value::Bytes(vec![0xDE, 0xAD]).to_string(), "0xdead");
        assert_eq!(Value::Null.to_string(), "nil");
    }

    #[test]
    fn test_from_value_integers() {
        assert_eq!(i64::from_value(Value::Int(7)).unwrap(), 7);
        assert_eq!(i32::from_value(Value::Text(" 12 ".to_string())).unwrap(), 12);
        assert!(matches!(
            i8::from_value(Value::Int(300)),
            Err(ConversionError::Overflow { target: "i8", .. })
        ));
        assert!(matches!(
            i32::from_value(Value::Null),
            Err(ConversionError::UnexpectedNull { expected: "i32" })
        ));
    }

    #[test]
    fn test_from_value_optional() {
        assert_eq!(Option::<String>::from_value(Value::Null).unwrap(), None);
        assert_eq!(
            Option::<String>::from_value(Value::Text("x".to_string())).unwrap(),
            Some("x".to_string())
        );
    }

    #[test]
    fn test_from_value_mismatch() {
        let err = bool::from_value(Value::Text("yes".to_string())).unwrap_err();
        assert_eq!(
            err,
            ConversionError::TypeMismatch {
                expected: "bool",
                found: "text"
            }
        );
    }

    #[test]
    fn test_string_accepts_numbers() {
        assert_eq!(String::from_value(Value::Int(5)).unwrap(), "5");
    }
}
