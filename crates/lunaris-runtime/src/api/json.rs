//! JSON interop
//!
//! Tables whose keys are exactly `1..=n` become arrays, other tables become
//! objects keyed by their string (or number) keys. An empty table is `{}`.
//! JSON `null` maps to nil, so null array elements and object members are
//! dropped on the way in.

use crate::api::conversion::ConversionError;
use crate::table::{Table, TableRef};
use crate::value::{format_number, RefIdAllocator, Value};
use serde_json::{Map, Number};
use std::collections::HashSet;

/// Nesting limit for [`to_json`]
pub const MAX_JSON_DEPTH: usize = 128;

/// Convert a value to JSON
///
/// # Errors
///
/// Fails on functions, coroutines, user data, non-finite numbers, cyclic
/// tables, keys other than strings and numbers, and nesting deeper than
/// [`MAX_JSON_DEPTH`].
pub fn to_json(value: &Value) -> Result<serde_json::Value, ConversionError> {
    let mut visited = HashSet::new();
    value_to_json(&value.to_storable(), &mut visited, 0)
}

/// Convert JSON to a value; arrays and objects become fresh tables
pub fn from_json(json: &serde_json::Value, ids: &RefIdAllocator) -> Value {
    match json {
        serde_json::Value::Null => Value::Nil,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::from(s.as_str()),
        serde_json::Value::Array(items) => {
            let mut table = Table::new();
            for (i, item) in items.iter().enumerate() {
                table.set_int(i as i64 + 1, from_json(item, ids));
            }
            Value::Table(TableRef::from_table(table, ids))
        }
        serde_json::Value::Object(members) => {
            let mut table = Table::new();
            for (key, item) in members {
                table.set_str(key, from_json(item, ids));
            }
            Value::Table(TableRef::from_table(table, ids))
        }
    }
}

fn value_to_json(
    value: &Value,
    visited: &mut HashSet<u64>,
    depth: usize,
) -> Result<serde_json::Value, ConversionError> {
    match value {
        Value::Nil | Value::Void => Ok(serde_json::Value::Null),
        Value::Boolean(b) => Ok(serde_json::Value::Bool(*b)),
        Value::Number(n) => number_to_json(*n),
        Value::String(s) => Ok(serde_json::Value::String(s.to_string())),
        Value::Tuple(_) => value_to_json(&value.to_storable(), visited, depth),
        Value::Table(table) => {
            if depth >= MAX_JSON_DEPTH {
                return Err(ConversionError::Json(format!(
                    "nesting deeper than {}",
                    MAX_JSON_DEPTH
                )));
            }
            if !visited.insert(table.ref_id()) {
                return Err(ConversionError::Json("cyclic table".to_string()));
            }
            let result = table_to_json(table, visited, depth);
            visited.remove(&table.ref_id());
            result
        }
        other => Err(ConversionError::Json(format!("{} value", other.type_name()))),
    }
}

fn number_to_json(n: f64) -> Result<serde_json::Value, ConversionError> {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return Ok(serde_json::Value::Number(Number::from(n as i64)));
    }
    Number::from_f64(n)
        .map(serde_json::Value::Number)
        .ok_or_else(|| ConversionError::Json(format!("non-finite number {}", format_number(n))))
}

fn table_to_json(
    table: &TableRef,
    visited: &mut HashSet<u64>,
    depth: usize,
) -> Result<serde_json::Value, ConversionError> {
    // Snapshot first; no borrow is held while recursing
    let (len, entries): (usize, Vec<(Value, Value)>) = {
        let t = table.borrow();
        (t.length(), t.pairs().map(|(k, v)| (k.clone(), v.clone())).collect())
    };

    if len > 0 && len == entries.len() {
        let mut items = Vec::with_capacity(len);
        for i in 1..=len {
            let item = table.borrow().get_int(i as i64);
            items.push(value_to_json(&item, visited, depth + 1)?);
        }
        return Ok(serde_json::Value::Array(items));
    }

    let mut members = Map::new();
    for (key, item) in entries {
        let key = match key {
            Value::String(s) => s.to_string(),
            Value::Number(n) => format_number(n),
            other => {
                return Err(ConversionError::Json(format!(
                    "{} key in object",
                    other.type_name()
                )))
            }
        };
        members.insert(key, value_to_json(&item, visited, depth + 1)?);
    }
    Ok(serde_json::Value::Object(members))
}
