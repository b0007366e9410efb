//! `table` namespace
//!
//! All functions use raw access; `__index` and `__newindex` are not consulted.

use super::{base, install, LibFn};
use crate::api::arguments::CallbackArguments;
use crate::api::context::ExecutionContext;
use crate::api::native::NativeOutcome;
use crate::error::{RuntimeResult, ScriptError, ScriptErrorKind};
use crate::shared::RuntimeShared;
use crate::table::{Table, TableRef};
use crate::value::Value;
use std::rc::Rc;

const FUNCTIONS: &[(&str, LibFn)] = &[
    ("concat", concat),
    ("insert", insert),
    ("pack", pack),
    ("remove", remove),
    ("unpack", base::unpack),
];

pub fn register(shared: &Rc<RuntimeShared>, namespace: &TableRef) {
    install(shared, namespace, FUNCTIONS);
}

/// `table.concat(t [, sep [, i [, j]]])`
fn concat(_ctx: &mut ExecutionContext<'_>, args: &CallbackArguments) -> RuntimeResult<NativeOutcome> {
    let table = args.as_table(0, "concat")?;
    let separator = if args.get(1).is_nil() {
        Rc::from("")
    } else {
        args.as_string(1, "concat")?
    };
    let first = args.as_optional_integer(2, "concat", 1)?;
    let last = args.as_optional_integer(3, "concat", table.length() as i64)?;

    let table = table.borrow();
    let mut out = String::new();
    for i in first..=last {
        let item = table.get_int(i);
        let text = match &item {
            Value::String(_) | Value::Number(_) => item.cast_to_string(),
            _ => None,
        };
        let Some(text) = text else {
            return Err(ScriptError::new(
                ScriptErrorKind::BadArgument,
                format!("invalid value (at index {}) in table for 'concat'", i),
            )
            .into());
        };
        if i > first {
            out.push_str(&separator);
        }
        out.push_str(&text);
    }
    Ok(Value::from(out).into())
}

/// `table.insert(t, value)` or `table.insert(t, pos, value)`
fn insert(_ctx: &mut ExecutionContext<'_>, args: &CallbackArguments) -> RuntimeResult<NativeOutcome> {
    let table = args.as_table(0, "insert")?;
    let len = table.length();
    match args.count() {
        2 => table.borrow_mut().append(args.get(1).to_storable()),
        3 => {
            let pos = args.as_integer(1, "insert")?;
            if pos < 1 || pos as usize > len + 1 {
                return Err(ScriptError::bad_argument(2, "insert", "position out of bounds").into());
            }
            table.borrow_mut().insert_at(pos as usize, args.get(2).to_storable());
        }
        _ => {
            return Err(ScriptError::user(Value::from("wrong number of arguments to 'insert'")).into())
        }
    }
    Ok(Value::Void.into())
}

/// `table.pack(...)`: sequence of the arguments plus field `n`
fn pack(ctx: &mut ExecutionContext<'_>, args: &CallbackArguments) -> RuntimeResult<NativeOutcome> {
    let mut table = Table::new();
    let values = args.to_vec();
    let count = values.len();
    for (i, value) in values.into_iter().enumerate() {
        table.set_int(i as i64 + 1, value.to_storable());
    }
    table.set_str("n", Value::from(count as f64));
    Ok(Value::Table(TableRef::from_table(table, ctx.shared().ids())).into())
}

/// `table.remove(t [, pos])`: removed element, `pos` defaults to `#t`
fn remove(_ctx: &mut ExecutionContext<'_>, args: &CallbackArguments) -> RuntimeResult<NativeOutcome> {
    let table = args.as_table(0, "remove")?;
    let len = table.length();
    if args.get(1).is_nil() {
        if len == 0 {
            return Ok(Value::Nil.into());
        }
        let removed = table.borrow_mut().remove_at(len);
        return Ok(removed.into());
    }
    let pos = args.as_integer(1, "remove")?;
    if len == 0 && (pos == 0 || pos == 1) {
        let value = table.borrow().get_int(pos);
        return Ok(value.into());
    }
    if pos < 1 || pos as usize > len + 1 {
        return Err(ScriptError::bad_argument(2, "remove", "position out of bounds").into());
    }
    let removed = table.borrow_mut().remove_at(pos as usize);
    Ok(removed.into())
}
