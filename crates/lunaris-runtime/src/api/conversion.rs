//! Type conversion between Rust and script values
//!
//! Provides traits and implementations for bidirectional conversion:
//! - `ToLunaris` - Convert Rust types to a script `Value`
//! - `FromLunaris` - Convert a script `Value` to Rust types
//!
//! Containers become tables, so producing a value needs the runtime's
//! [`RefIdAllocator`].
//!
//! # Examples
//!
//! ```
//! use lunaris_runtime::api::conversion::{FromLunaris, ToLunaris};
//! use lunaris_runtime::value::{RefIdAllocator, Value};
//!
//! let ids = RefIdAllocator::new();
//!
//! // Rust to script
//! let number: Value = 42.0_f64.to_lunaris(&ids);
//! let list: Value = vec!["a", "b"].to_lunaris(&ids);
//!
//! // Script to Rust
//! let n: f64 = FromLunaris::from_lunaris(&number).unwrap();
//! let items: Vec<String> = FromLunaris::from_lunaris(&list).unwrap();
//! assert_eq!(n, 42.0);
//! assert_eq!(items, vec!["a".to_string(), "b".to_string()]);
//! ```

use crate::table::{Table, TableRef};
use crate::value::{RefIdAllocator, Value};
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

/// Error type for value conversion failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    /// Type mismatch during conversion
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// Sequence element type mismatch
    #[error("sequence element type mismatch at index {index}: expected {expected}, found {found}")]
    ArrayElementTypeMismatch {
        index: usize,
        expected: String,
        found: String,
    },

    /// Table field type mismatch
    #[error("field type mismatch for key '{key}': expected {expected}, found {found}")]
    ObjectValueTypeMismatch {
        key: String,
        expected: String,
        found: String,
    },

    /// Number that does not fit the integer target
    #[error("number {value} is not representable as {target}")]
    OutOfRange { value: f64, target: &'static str },

    /// Value with no JSON representation
    #[error("cannot convert to JSON: {0}")]
    Json(String),
}

impl ConversionError {
    fn mismatch(expected: &str, value: &Value) -> Self {
        ConversionError::TypeMismatch {
            expected: expected.to_string(),
            found: value.type_name().to_string(),
        }
    }
}

/// Trait for converting script values to Rust types
pub trait FromLunaris: Sized {
    /// # Errors
    ///
    /// Returns `ConversionError` if the value cannot be converted to the target type.
    fn from_lunaris(value: &Value) -> Result<Self, ConversionError>;
}

/// Trait for converting Rust types to script values
pub trait ToLunaris {
    fn to_lunaris(self, ids: &RefIdAllocator) -> Value;
}

// Numbers

impl FromLunaris for f64 {
    fn from_lunaris(value: &Value) -> Result<Self, ConversionError> {
        match value.to_scalar() {
            Value::Number(n) => Ok(n),
            other => Err(ConversionError::mismatch("number", &other)),
        }
    }
}

impl ToLunaris for f64 {
    fn to_lunaris(self, _ids: &RefIdAllocator) -> Value {
        Value::Number(self)
    }
}

impl FromLunaris for i64 {
    fn from_lunaris(value: &Value) -> Result<Self, ConversionError> {
        let n = f64::from_lunaris(value)?;
        if n.fract() != 0.0 || !(-9_007_199_254_740_992.0..=9_007_199_254_740_992.0).contains(&n) {
            return Err(ConversionError::OutOfRange {
                value: n,
                target: "i64",
            });
        }
        Ok(n as i64)
    }
}

impl ToLunaris for i64 {
    fn to_lunaris(self, _ids: &RefIdAllocator) -> Value {
        Value::Number(self as f64)
    }
}

// Strings

impl FromLunaris for String {
    fn from_lunaris(value: &Value) -> Result<Self, ConversionError> {
        match value.to_scalar() {
            Value::String(s) => Ok(s.to_string()),
            other => Err(ConversionError::mismatch("string", &other)),
        }
    }
}

impl ToLunaris for String {
    fn to_lunaris(self, _ids: &RefIdAllocator) -> Value {
        Value::String(Rc::from(self))
    }
}

impl ToLunaris for &str {
    fn to_lunaris(self, _ids: &RefIdAllocator) -> Value {
        Value::String(Rc::from(self))
    }
}

// bool

impl FromLunaris for bool {
    fn from_lunaris(value: &Value) -> Result<Self, ConversionError> {
        match value.to_scalar() {
            Value::Boolean(b) => Ok(b),
            other => Err(ConversionError::mismatch("boolean", &other)),
        }
    }
}

impl ToLunaris for bool {
    fn to_lunaris(self, _ids: &RefIdAllocator) -> Value {
        Value::Boolean(self)
    }
}

// () (nil)

impl FromLunaris for () {
    fn from_lunaris(value: &Value) -> Result<Self, ConversionError> {
        if value.to_scalar().is_nil() {
            Ok(())
        } else {
            Err(ConversionError::mismatch("nil", value))
        }
    }
}

impl ToLunaris for () {
    fn to_lunaris(self, _ids: &RefIdAllocator) -> Value {
        Value::Nil
    }
}

// Pass-through

impl FromLunaris for Value {
    fn from_lunaris(value: &Value) -> Result<Self, ConversionError> {
        Ok(value.clone())
    }
}

impl ToLunaris for Value {
    fn to_lunaris(self, _ids: &RefIdAllocator) -> Value {
        self
    }
}

impl FromLunaris for TableRef {
    fn from_lunaris(value: &Value) -> Result<Self, ConversionError> {
        match value.to_scalar() {
            Value::Table(t) => Ok(t),
            other => Err(ConversionError::mismatch("table", &other)),
        }
    }
}

// Option<T>

impl<T: FromLunaris> FromLunaris for Option<T> {
    fn from_lunaris(value: &Value) -> Result<Self, ConversionError> {
        if value.to_scalar().is_nil() {
            Ok(None)
        } else {
            Ok(Some(T::from_lunaris(value)?))
        }
    }
}

impl<T: ToLunaris> ToLunaris for Option<T> {
    fn to_lunaris(self, ids: &RefIdAllocator) -> Value {
        match self {
            None => Value::Nil,
            Some(v) => v.to_lunaris(ids),
        }
    }
}

// Vec<T> (sequence table 1..=n)

impl<T: FromLunaris> FromLunaris for Vec<T> {
    fn from_lunaris(value: &Value) -> Result<Self, ConversionError> {
        let table = TableRef::from_lunaris(value)?;
        let table = table.borrow();
        let len = table.length();
        let mut result = Vec::with_capacity(len);
        for index in 1..=len {
            match T::from_lunaris(&table.get_int(index as i64)) {
                Ok(converted) => result.push(converted),
                Err(ConversionError::TypeMismatch { expected, found }) => {
                    return Err(ConversionError::ArrayElementTypeMismatch {
                        index,
                        expected,
                        found,
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(result)
    }
}

impl<T: ToLunaris> ToLunaris for Vec<T> {
    fn to_lunaris(self, ids: &RefIdAllocator) -> Value {
        let mut table = Table::new();
        for item in self {
            let value = item.to_lunaris(ids);
            table.append(value);
        }
        Value::Table(TableRef::from_table(table, ids))
    }
}

// HashMap<String, T> (string-keyed table)

impl<T: FromLunaris> FromLunaris for HashMap<String, T> {
    /// Only string keys are read; other keys are ignored
    fn from_lunaris(value: &Value) -> Result<Self, ConversionError> {
        let table = TableRef::from_lunaris(value)?;
        let table = table.borrow();
        let mut result = HashMap::new();
        for (key, item) in table.pairs() {
            let Value::String(key) = key else {
                continue;
            };
            match T::from_lunaris(item) {
                Ok(converted) => {
                    result.insert(key.to_string(), converted);
                }
                Err(ConversionError::TypeMismatch { expected, found }) => {
                    return Err(ConversionError::ObjectValueTypeMismatch {
                        key: key.to_string(),
                        expected,
                        found,
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(result)
    }
}

impl<T: ToLunaris> ToLunaris for HashMap<String, T> {
    fn to_lunaris(self, ids: &RefIdAllocator) -> Value {
        let mut table = Table::new();
        for (key, value) in self {
            let value = value.to_lunaris(ids);
            table.set_str(&key, value);
        }
        Value::Table(TableRef::from_table(table, ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_f64_from_lunaris_wrong_type() {
        let result: Result<f64, _> = FromLunaris::from_lunaris(&Value::from("hello"));
        assert_eq!(
            result.unwrap_err(),
            ConversionError::TypeMismatch {
                expected: "number".to_string(),
                found: "string".to_string()
            }
        );
    }

    #[test]
    fn test_i64_rejects_fractions() {
        assert_eq!(i64::from_lunaris(&Value::from(7.0)).unwrap(), 7);
        assert!(matches!(
            i64::from_lunaris(&Value::from(7.5)),
            Err(ConversionError::OutOfRange { target: "i64", .. })
        ));
    }

    #[test]
    fn test_unit_accepts_nil_and_void() {
        assert!(<()>::from_lunaris(&Value::Nil).is_ok());
        assert!(<()>::from_lunaris(&Value::Void).is_ok());
        assert!(<()>::from_lunaris(&Value::from(1.0)).is_err());
    }

    #[test]
    fn test_option_round_trip() {
        let ids = RefIdAllocator::new();
        assert!(None::<f64>.to_lunaris(&ids).is_nil());
        let value = Some(2.0).to_lunaris(&ids);
        assert_eq!(Option::<f64>::from_lunaris(&value).unwrap(), Some(2.0));
    }

    #[test]
    fn test_vec_element_type_mismatch() {
        let ids = RefIdAllocator::new();
        let value = vec![Value::from(1.0), Value::from("oops")].to_lunaris(&ids);
        let result: Result<Vec<f64>, _> = FromLunaris::from_lunaris(&value);
        assert_eq!(
            result.unwrap_err(),
            ConversionError::ArrayElementTypeMismatch {
                index: 2,
                expected: "number".to_string(),
                found: "string".to_string()
            }
        );
    }

    #[test]
    fn test_hashmap_to_table_and_back() {
        let ids = RefIdAllocator::new();
        let mut map = HashMap::new();
        map.insert("name".to_string(), "Alice".to_string());
        map.insert("city".to_string(), "Oslo".to_string());

        let value = map.clone().to_lunaris(&ids);
        assert!(matches!(value, Value::Table(_)));
        let back: HashMap<String, String> = FromLunaris::from_lunaris(&value).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_hashmap_field_mismatch_names_key() {
        let ids = RefIdAllocator::new();
        let mut map = HashMap::new();
        map.insert("age".to_string(), Value::from(true));
        let value = map.to_lunaris(&ids);
        let result: Result<HashMap<String, f64>, _> = FromLunaris::from_lunaris(&value);
        assert!(matches!(
            result,
            Err(ConversionError::ObjectValueTypeMismatch { key, .. }) if key == "age"
        ));
    }
}
