//! Runtime value representation
//!
//! - Nil, Void, Boolean, Number: immediate values
//! - String: immutable, reference-counted (`Rc<str>`)
//! - Table, Function, NativeFunction, Coroutine, UserData: shared references,
//!   compared by identity
//! - Tuple: transient multi-value used for multiple returns and variadic
//!   argument passing; never stored in a table or a variable
//!
//! Values have no in-place mutators. Anything read out of a table or a local
//! slot is an independent copy of the handle, so containers can only be
//! changed through their own API.

mod number;
mod userdata;

pub use number::{format_number, parse_number};
pub use userdata::{missing_field, UserData, UserDataDescriptor, UserDataRef};

use crate::api::native::NativeFunctionRef;
use crate::closure::ClosureRef;
use crate::coroutine::CoroutineRef;
use crate::error::ScriptError;
use crate::table::TableRef;
use bitflags::bitflags;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Runtime value
#[derive(Clone)]
pub enum Value {
    /// Explicit absence of a value
    Nil,
    /// No value at all (missing argument, empty return)
    Void,
    /// Boolean value
    Boolean(bool),
    /// Floating-point number (64-bit)
    Number(f64),
    /// Immutable string
    String(Rc<str>),
    /// Associative container
    Table(TableRef),
    /// Script closure
    Function(ClosureRef),
    /// Host function exposed to scripts
    NativeFunction(NativeFunctionRef),
    /// Multiple values in flight (returns, varargs)
    Tuple(Rc<[Value]>),
    /// Coroutine handle
    Coroutine(CoroutineRef),
    /// Opaque host object
    UserData(UserDataRef),
}

/// Type tag of a [`Value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Nil,
    Void,
    Boolean,
    Number,
    String,
    Table,
    Function,
    NativeFunction,
    Tuple,
    Thread,
    UserData,
}

impl DataType {
    /// Name as reported by the `type` library function and in error messages
    pub fn name(self) -> &'static str {
        match self {
            DataType::Nil => "nil",
            DataType::Void => "no value",
            DataType::Boolean => "boolean",
            DataType::Number => "number",
            DataType::String => "string",
            DataType::Table => "table",
            DataType::Function | DataType::NativeFunction => "function",
            DataType::Tuple => "tuple",
            DataType::Thread => "thread",
            DataType::UserData => "userdata",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// Options for [`Value::check_type`]
    pub struct TypeValidationFlags: u8 {
        /// Nil and Void are accepted and returned as Nil
        const ALLOW_NIL = 0b01;
        /// Booleans from truthiness, numbers from strings, strings from numbers
        const AUTO_CONVERT = 0b10;
        const DEFAULT = Self::AUTO_CONVERT.bits;
    }
}

/// Per-runtime source of reference ids
///
/// Ids are for debug identity only (display, tracing); equality of shared
/// references never looks at them.
#[derive(Debug, Default)]
pub struct RefIdAllocator {
    last: Cell<u64>,
}

impl RefIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> u64 {
        let id = self.last.get() + 1;
        self.last.set(id);
        id
    }
}

impl Value {
    /// Build a tuple; a trailing tuple is spliced in, earlier ones reduced to scalars
    pub fn tuple(values: Vec<Value>) -> Value {
        let mut flat = Vec::with_capacity(values.len());
        let last = values.len().saturating_sub(1);
        for (i, v) in values.into_iter().enumerate() {
            if let Value::Tuple(items) = &v {
                if i == last {
                    flat.extend(items.iter().cloned());
                } else {
                    flat.push(v.to_scalar());
                }
                continue;
            }
            flat.push(v);
        }
        Value::Tuple(flat.into())
    }

    /// Like [`Value::tuple`], but a single value is returned as itself
    pub fn multiple(values: Vec<Value>) -> Value {
        match Value::tuple(values) {
            Value::Tuple(items) if items.len() == 1 => items[0].clone(),
            other => other,
        }
    }

    pub fn empty_tuple() -> Value {
        Value::Tuple(Rc::from(Vec::new()))
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Value::Nil => DataType::Nil,
            Value::Void => DataType::Void,
            Value::Boolean(_) => DataType::Boolean,
            Value::Number(_) => DataType::Number,
            Value::String(_) => DataType::String,
            Value::Table(_) => DataType::Table,
            Value::Function(_) => DataType::Function,
            Value::NativeFunction(_) => DataType::NativeFunction,
            Value::Tuple(_) => DataType::Tuple,
            Value::Coroutine(_) => DataType::Thread,
            Value::UserData(_) => DataType::UserData,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.data_type().name()
    }

    /// Nil or Void
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil | Value::Void)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::NativeFunction(_))
    }

    /// Collapse a tuple to its first element (Void when empty)
    pub fn to_scalar(&self) -> Value {
        match self {
            Value::Tuple(items) => match items.first() {
                Some(first) => first.to_scalar(),
                None => Value::Void,
            },
            other => other.clone(),
        }
    }

    /// Value suitable for a variable or table slot: scalar, Void becomes Nil
    pub fn to_storable(&self) -> Value {
        match self.to_scalar() {
            Value::Void => Value::Nil,
            v => v,
        }
    }

    /// Element `index` of a tuple; a non-tuple is a one-element tuple
    pub fn tuple_item(&self, index: usize) -> Value {
        match self {
            Value::Tuple(items) => items.get(index).map(Value::to_storable).unwrap_or(Value::Nil),
            other if index == 0 => other.to_storable(),
            _ => Value::Nil,
        }
    }

    /// Spread into individual values (tuples expand, Void contributes nothing)
    pub fn into_values(self) -> Vec<Value> {
        match self {
            Value::Tuple(items) => items.iter().cloned().collect(),
            Value::Void => Vec::new(),
            other => vec![other],
        }
    }

    /// Truthiness: only `false`, Nil and Void are false
    pub fn cast_to_bool(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Nil | Value::Void => false,
            Value::Tuple(_) => self.to_scalar().cast_to_bool(),
            _ => true,
        }
    }

    /// Number passthrough, numeric strings parsed
    pub fn cast_to_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::String(s) => parse_number(s),
            Value::Tuple(_) => self.to_scalar().cast_to_number(),
            _ => None,
        }
    }

    /// String passthrough, numbers formatted
    pub fn cast_to_string(&self) -> Option<Rc<str>> {
        match self {
            Value::String(s) => Some(Rc::clone(s)),
            Value::Number(n) => Some(Rc::from(format_number(*n))),
            Value::Tuple(_) => self.to_scalar().cast_to_string(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_coroutine(&self) -> Option<&CoroutineRef> {
        match self {
            Value::Coroutine(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_userdata(&self) -> Option<&UserDataRef> {
        match self {
            Value::UserData(u) => Some(u),
            _ => None,
        }
    }

    /// Reference id of shared values
    pub fn ref_id(&self) -> Option<u64> {
        match self {
            Value::Table(t) => Some(t.ref_id()),
            Value::Function(c) => Some(c.ref_id()),
            Value::NativeFunction(f) => Some(f.ref_id()),
            Value::Coroutine(c) => Some(c.ref_id()),
            Value::UserData(u) => Some(u.ref_id()),
            _ => None,
        }
    }

    /// Identity comparison for shared values, value comparison otherwise
    pub fn raw_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil | Value::Void, Value::Nil | Value::Void) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::NativeFunction(a), Value::NativeFunction(b)) => a.ptr_eq(b),
            (Value::Coroutine(a), Value::Coroutine(b)) => a.ptr_eq(b),
            (Value::UserData(a), Value::UserData(b)) => a.ptr_eq(b),
            (Value::Tuple(a), Value::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.raw_equals(y))
            }
            _ => false,
        }
    }

    /// Validate (and optionally coerce) a native-function argument.
    ///
    /// `arg_index` is zero-based; messages report it one-based.
    pub fn check_type(
        &self,
        func_name: &str,
        expected: DataType,
        arg_index: usize,
        flags: TypeValidationFlags,
    ) -> Result<Value, ScriptError> {
        let value = self.to_scalar();
        let actual = value.data_type();
        if actual == expected
            || (expected == DataType::Function && actual == DataType::NativeFunction)
        {
            return Ok(value);
        }

        if flags.contains(TypeValidationFlags::ALLOW_NIL) && value.is_nil() {
            return Ok(Value::Nil);
        }

        if flags.contains(TypeValidationFlags::AUTO_CONVERT) {
            match expected {
                DataType::Boolean => return Ok(Value::Boolean(value.cast_to_bool())),
                DataType::Number => {
                    if let Some(n) = value.cast_to_number() {
                        return Ok(Value::Number(n));
                    }
                }
                DataType::String => {
                    if let Some(s) = value.cast_to_string() {
                        return Ok(Value::String(s));
                    }
                }
                _ => {}
            }
        }

        let expected_name = if flags.contains(TypeValidationFlags::ALLOW_NIL) {
            format!("{} or nil", expected.name())
        } else {
            expected.name().to_string()
        };
        let got = if value.is_void() {
            "no value".to_string()
        } else {
            value.type_name().to_string()
        };
        Err(ScriptError::bad_argument(
            arg_index + 1,
            func_name,
            format!("{} expected, got {}", expected_name, got),
        ))
    }
}

/// Equality contract:
/// - Nil and Void are equal to each other
/// - Tables, functions and coroutines compare by identity
/// - User data compares by wrapped object, only when both share a descriptor
/// - Numbers follow IEEE (NaN != NaN)
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::UserData(a), Value::UserData(b)) => a.equals(b),
            _ => self.raw_equals(other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Void => Ok(()),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Table(t) => write!(f, "table: 0x{:08x}", t.ref_id()),
            Value::Function(c) => write!(f, "function: 0x{:08x}", c.ref_id()),
            Value::NativeFunction(n) => write!(f, "function: builtin: 0x{:08x}", n.ref_id()),
            Value::Coroutine(c) => write!(f, "thread: 0x{:08x}", c.ref_id()),
            Value::UserData(u) => write!(f, "userdata: 0x{:08x}", u.ref_id()),
            Value::Tuple(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", parts.join("\t"))
            }
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Void => write!(f, "Void"),
            Value::Boolean(b) => write!(f, "Boolean({})", b),
            Value::Number(n) => write!(f, "Number({})", n),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Table(t) => write!(f, "Table(#{})", t.ref_id()),
            Value::Function(c) => write!(f, "Function(#{})", c.ref_id()),
            Value::NativeFunction(n) => write!(f, "NativeFunction({})", n.name()),
            Value::Tuple(items) => f.debug_tuple("Tuple").field(&&items[..]).finish(),
            Value::Coroutine(c) => write!(f, "Coroutine(#{})", c.ref_id()),
            Value::UserData(u) => write!(f, "UserData({})", u.descriptor().type_name()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::String(s)
    }
}

impl From<TableRef> for Value {
    fn from(t: TableRef) -> Self {
        Value::Table(t)
    }
}

impl From<NativeFunctionRef> for Value {
    fn from(f: NativeFunctionRef) -> Self {
        Value::NativeFunction(f)
    }
}

impl From<CoroutineRef> for Value {
    fn from(c: CoroutineRef) -> Self {
        Value::Coroutine(c)
    }
}
