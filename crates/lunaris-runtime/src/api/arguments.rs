//! Argument view handed to native functions

use crate::error::ScriptError;
use crate::table::TableRef;
use crate::value::{DataType, TypeValidationFlags, UserDataRef, Value};
use std::rc::Rc;

/// Flatten call-site values: the last tuple is spread, earlier ones reduced
/// to their first element
pub fn flatten_args(values: Vec<Value>) -> Vec<Value> {
    let has_tuple = values.iter().any(|v| matches!(v, Value::Tuple(_)));
    if !has_tuple {
        return values;
    }
    match Value::tuple(values) {
        Value::Tuple(items) => items.to_vec(),
        other => vec![other],
    }
}

/// Arguments of one native call
///
/// Out-of-range indices read as `Void`. Indices are zero-based; error
/// messages report them one-based, the way scripts count.
#[derive(Debug, Clone)]
pub struct CallbackArguments {
    values: Rc<[Value]>,
    offset: usize,
    method_call: bool,
}

impl CallbackArguments {
    pub fn new(values: Vec<Value>, method_call: bool) -> Self {
        Self {
            values: flatten_args(values).into(),
            offset: 0,
            method_call,
        }
    }

    pub fn count(&self) -> usize {
        self.values.len() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn get(&self, index: usize) -> Value {
        self.values
            .get(self.offset + index)
            .cloned()
            .unwrap_or(Value::Void)
    }

    /// Visible arguments from `index` on
    pub fn rest(&self, index: usize) -> Vec<Value> {
        self.values
            .iter()
            .skip(self.offset + index)
            .cloned()
            .collect()
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.rest(0)
    }

    /// Whether the call used method syntax (`obj:f(...)`)
    pub fn is_method_call(&self) -> bool {
        self.method_call
    }

    /// View without the receiver when called as a method
    pub fn skip_self(&self) -> CallbackArguments {
        let skip = usize::from(self.method_call && self.count() > 0);
        Self {
            values: Rc::clone(&self.values),
            offset: self.offset + skip,
            method_call: false,
        }
    }

    /// Validate argument `index`, with the standard coercions
    pub fn as_type(
        &self,
        index: usize,
        func_name: &str,
        expected: DataType,
        allow_nil: bool,
    ) -> Result<Value, ScriptError> {
        let mut flags = TypeValidationFlags::AUTO_CONVERT;
        if allow_nil {
            flags |= TypeValidationFlags::ALLOW_NIL;
        }
        self.get(index).check_type(func_name, expected, index, flags)
    }

    pub fn as_string(&self, index: usize, func_name: &str) -> Result<Rc<str>, ScriptError> {
        match self.as_type(index, func_name, DataType::String, false)? {
            Value::String(s) => Ok(s),
            other => Err(self.bad_type(index, func_name, "string", &other)),
        }
    }

    pub fn as_number(&self, index: usize, func_name: &str) -> Result<f64, ScriptError> {
        match self.as_type(index, func_name, DataType::Number, false)? {
            Value::Number(n) => Ok(n),
            other => Err(self.bad_type(index, func_name, "number", &other)),
        }
    }

    /// Number argument, rounded down
    pub fn as_integer(&self, index: usize, func_name: &str) -> Result<i64, ScriptError> {
        Ok(self.as_number(index, func_name)?.floor() as i64)
    }

    /// Number argument, or `default` when nil/absent
    pub fn as_optional_integer(
        &self,
        index: usize,
        func_name: &str,
        default: i64,
    ) -> Result<i64, ScriptError> {
        if self.get(index).is_nil() {
            Ok(default)
        } else {
            self.as_integer(index, func_name)
        }
    }

    pub fn as_table(&self, index: usize, func_name: &str) -> Result<TableRef, ScriptError> {
        match self.as_type(index, func_name, DataType::Table, false)? {
            Value::Table(t) => Ok(t),
            other => Err(self.bad_type(index, func_name, "table", &other)),
        }
    }

    pub fn as_userdata(&self, index: usize, func_name: &str) -> Result<UserDataRef, ScriptError> {
        match self.as_type(index, func_name, DataType::UserData, false)? {
            Value::UserData(u) => Ok(u),
            other => Err(self.bad_type(index, func_name, "userdata", &other)),
        }
    }

    /// Checked downcast of a user data argument's wrapped object
    pub fn as_opaque<T: 'static>(
        &self,
        index: usize,
        func_name: &str,
        allow_nil: bool,
    ) -> Result<Option<Rc<T>>, ScriptError> {
        let value = self.get(index);
        if allow_nil && value.is_nil() {
            return Ok(None);
        }
        let expected = std::any::type_name::<T>();
        match &value {
            Value::UserData(u) => match u.downcast::<T>() {
                Some(object) => Ok(Some(object)),
                None => Err(ScriptError::bad_argument(
                    index + 1,
                    func_name,
                    format!(
                        "userdata<{}> expected, got userdata<{}>",
                        expected,
                        u.descriptor().type_name()
                    ),
                )),
            },
            other => Err(self.bad_type(index, func_name, &format!("userdata<{}>", expected), other)),
        }
    }

    fn bad_type(&self, index: usize, func_name: &str, expected: &str, got: &Value) -> ScriptError {
        ScriptError::bad_argument(
            index + 1,
            func_name,
            format!("{} expected, got {}", expected, got.type_name()),
        )
    }
}
