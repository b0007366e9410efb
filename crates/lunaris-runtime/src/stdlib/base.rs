//! Global functions

use super::{install, multiple, native, LibFn};
use crate::api::arguments::CallbackArguments;
use crate::api::context::ExecutionContext;
use crate::api::native::{NativeFunctionRef, NativeOutcome, TailCallRequest};
use crate::error::{RuntimeResult, ScriptError, ScriptErrorKind};
use crate::metamethod::Operator;
use crate::shared::RuntimeShared;
use crate::table::TableRef;
use crate::value::{parse_number, DataType, Value};
use std::rc::Rc;

const FUNCTIONS: &[(&str, LibFn)] = &[
    ("assert", assert),
    ("error", error),
    ("getmetatable", getmetatable),
    ("next", next),
    ("print", print),
    ("rawequal", rawequal),
    ("rawget", rawget),
    ("rawlen", rawlen),
    ("rawset", rawset),
    ("select", select),
    ("setmetatable", setmetatable),
    ("tonumber", tonumber),
    ("tostring", tostring),
    ("type", type_of),
    ("unpack", unpack),
];

pub fn register(shared: &Rc<RuntimeShared>, globals: &TableRef) {
    install(shared, globals, FUNCTIONS);

    // Iterator factories hand out one shared step function
    let next_fn = native(shared, "next", next);
    globals.set_str(
        "pairs",
        NativeFunctionRef::new(
            "pairs",
            move |ctx, args| pairs(ctx, args, next_fn.clone().into()),
            shared.ids(),
        )
        .into(),
    );
    let ipairs_step = native(shared, "ipairs_step", ipairs_step);
    globals.set_str(
        "ipairs",
        NativeFunctionRef::new(
            "ipairs",
            move |_, args| {
                let table = args.as_type(0, "ipairs", DataType::Table, false)?;
                multiple(vec![ipairs_step.clone().into(), table, Value::from(0.0)])
            },
            shared.ids(),
        )
        .into(),
    );

    // Protected calls share their continuations
    let call_ok = native(shared, "pcall_ok", protected_ok);
    let call_failed = native(shared, "pcall_failed", protected_failed);
    let (ok, failed) = (call_ok.clone(), call_failed.clone());
    globals.set_str(
        "pcall",
        NativeFunctionRef::new(
            "pcall",
            move |_, args| {
                let function = args.get(0);
                if function.is_void() {
                    return Err(ScriptError::bad_argument(1, "pcall", "value expected").into());
                }
                Ok(TailCallRequest::new(function, args.rest(1))
                    .with_continuation(ok.clone())
                    .with_error_handler(failed.clone())
                    .into())
            },
            shared.ids(),
        )
        .into(),
    );
    globals.set_str(
        "xpcall",
        NativeFunctionRef::new(
            "xpcall",
            move |_, args| {
                let function = args.get(0);
                let handler = args.as_type(1, "xpcall", DataType::Function, false)?;
                Ok(TailCallRequest::new(function, args.rest(2))
                    .with_continuation(call_ok.clone())
                    .with_error_handler(call_failed.clone())
                    .with_before_unwind(handler)
                    .into())
            },
            shared.ids(),
        )
        .into(),
    );
    globals.set_str("_G", Value::Table(globals.clone()));
}

fn assert(_ctx: &mut ExecutionContext<'_>, args: &CallbackArguments) -> RuntimeResult<NativeOutcome> {
    if args.get(0).cast_to_bool() {
        return multiple(args.to_vec());
    }
    let message = args.get(1);
    if message.is_nil() {
        Err(ScriptError::user(Value::from("assertion failed!")).into())
    } else {
        Err(ScriptError::user(message).into())
    }
}

/// `error(value [, level])`; level 0 suppresses the position prefix
fn error(_ctx: &mut ExecutionContext<'_>, args: &CallbackArguments) -> RuntimeResult<NativeOutcome> {
    let value = args.get(0).to_storable();
    let level = args.as_optional_integer(1, "error", 1)?;
    let err = ScriptError::user(value);
    if level == 0 {
        Err(err.without_location().into())
    } else {
        Err(err.into())
    }
}

fn getmetatable(ctx: &mut ExecutionContext<'_>, args: &CallbackArguments) -> RuntimeResult<NativeOutcome> {
    let Some(meta) = ctx.metatable(&args.get(0)) else {
        return Ok(Value::Nil.into());
    };
    let protected = meta.get_str(Operator::Metatable.name());
    if protected.is_nil() {
        Ok(Value::Table(meta).into())
    } else {
        Ok(protected.into())
    }
}

fn next(_ctx: &mut ExecutionContext<'_>, args: &CallbackArguments) -> RuntimeResult<NativeOutcome> {
    let table = args.as_table(0, "next")?;
    let pair = table.borrow().next_key(&args.get(1));
    match pair {
        Some(pair) if pair.is_nil() => Ok(Value::Nil.into()),
        Some(pair) => multiple(vec![pair.key, pair.value]),
        None => Err(ScriptError::new(ScriptErrorKind::BadArgument, "invalid key to 'next'").into()),
    }
}

fn pairs(
    ctx: &mut ExecutionContext<'_>,
    args: &CallbackArguments,
    next_fn: Value,
) -> RuntimeResult<NativeOutcome> {
    let subject = args.get(0);
    if let Some(handler) = ctx.metamethod(&subject, Operator::Pairs) {
        return Ok(TailCallRequest::new(handler, vec![subject]).into());
    }
    let table = args.as_type(0, "pairs", DataType::Table, false)?;
    multiple(vec![next_fn, table, Value::Nil])
}

fn ipairs_step(ctx: &mut ExecutionContext<'_>, args: &CallbackArguments) -> RuntimeResult<NativeOutcome> {
    let index = args.as_number(1, "ipairs")? + 1.0;
    let value = ctx.index(args.get(0), Value::Number(index))?;
    if value.is_nil() {
        Ok(Value::Nil.into())
    } else {
        multiple(vec![Value::Number(index), value])
    }
}

fn protected_ok(_ctx: &mut ExecutionContext<'_>, args: &CallbackArguments) -> RuntimeResult<NativeOutcome> {
    let mut values = vec![Value::Boolean(true)];
    values.extend(args.to_vec().into_iter().filter(|v| !v.is_void()));
    multiple(values)
}

fn protected_failed(_ctx: &mut ExecutionContext<'_>, args: &CallbackArguments) -> RuntimeResult<NativeOutcome> {
    multiple(vec![Value::Boolean(false), args.get(0).to_storable()])
}

fn print(ctx: &mut ExecutionContext<'_>, args: &CallbackArguments) -> RuntimeResult<NativeOutcome> {
    let mut parts = Vec::with_capacity(args.count());
    for value in args.to_vec() {
        parts.push(ctx.to_display_string(value)?);
    }
    ctx.shared().print(&parts.join("\t"));
    Ok(Value::Void.into())
}

fn rawequal(_ctx: &mut ExecutionContext<'_>, args: &CallbackArguments) -> RuntimeResult<NativeOutcome> {
    Ok(Value::Boolean(args.get(0).raw_equals(&args.get(1))).into())
}

fn rawget(_ctx: &mut ExecutionContext<'_>, args: &CallbackArguments) -> RuntimeResult<NativeOutcome> {
    let table = args.as_table(0, "rawget")?;
    Ok(table.get(&args.get(1).to_storable()).into())
}

fn rawlen(_ctx: &mut ExecutionContext<'_>, args: &CallbackArguments) -> RuntimeResult<NativeOutcome> {
    match args.get(0).to_scalar() {
        Value::Table(t) => Ok(Value::Number(t.length() as f64).into()),
        Value::String(s) => Ok(Value::Number(s.len() as f64).into()),
        _ => Err(ScriptError::bad_argument(1, "rawlen", "table or string expected").into()),
    }
}

fn rawset(_ctx: &mut ExecutionContext<'_>, args: &CallbackArguments) -> RuntimeResult<NativeOutcome> {
    let table = args.as_table(0, "rawset")?;
    table.set(args.get(1).to_storable(), args.get(2).to_storable())?;
    Ok(Value::Table(table).into())
}

fn select(_ctx: &mut ExecutionContext<'_>, args: &CallbackArguments) -> RuntimeResult<NativeOutcome> {
    let rest = args.rest(1);
    if args.get(0).as_str() == Some("#") {
        return Ok(Value::Number(rest.len() as f64).into());
    }
    let n = args.as_integer(0, "select")?;
    let start = if n < 0 {
        let back = n.unsigned_abs() as usize;
        if back > rest.len() {
            return Err(ScriptError::bad_argument(1, "select", "index out of range").into());
        }
        rest.len() - back
    } else if n == 0 {
        return Err(ScriptError::bad_argument(1, "select", "index out of range").into());
    } else {
        (n as usize - 1).min(rest.len())
    };
    multiple(rest[start..].to_vec())
}

fn setmetatable(_ctx: &mut ExecutionContext<'_>, args: &CallbackArguments) -> RuntimeResult<NativeOutcome> {
    let table = args.as_table(0, "setmetatable")?;
    let meta = match args.get(1).to_scalar() {
        Value::Table(t) => Some(t),
        Value::Nil => None,
        _ => return Err(ScriptError::bad_argument(2, "setmetatable", "nil or table expected").into()),
    };
    if table
        .metatable()
        .is_some_and(|current| !current.get_str(Operator::Metatable.name()).is_nil())
    {
        return Err(ScriptError::user(Value::from("cannot change a protected metatable")).into());
    }
    table.set_metatable(meta);
    Ok(Value::Table(table).into())
}

fn tonumber(_ctx: &mut ExecutionContext<'_>, args: &CallbackArguments) -> RuntimeResult<NativeOutcome> {
    let value = args.get(0).to_scalar();
    if args.get(1).is_nil() {
        let n = match &value {
            Value::Number(n) => Some(*n),
            Value::String(s) => parse_number(s),
            Value::Void => return Err(ScriptError::bad_argument(1, "tonumber", "value expected").into()),
            _ => None,
        };
        return Ok(n.map_or(Value::Nil, Value::Number).into());
    }

    let base = args.as_integer(1, "tonumber")?;
    if !(2..=36).contains(&base) {
        return Err(ScriptError::bad_argument(2, "tonumber", "base out of range").into());
    }
    let text = args.as_string(0, "tonumber")?;
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    Ok(match i64::from_str_radix(digits, base as u32) {
        Ok(n) if !digits.starts_with('+') => {
            let n = n as f64;
            Value::Number(if negative { -n } else { n })
        }
        _ => Value::Nil,
    }
    .into())
}

fn tostring(ctx: &mut ExecutionContext<'_>, args: &CallbackArguments) -> RuntimeResult<NativeOutcome> {
    let value = args.get(0);
    if value.is_void() {
        return Err(ScriptError::bad_argument(1, "tostring", "value expected").into());
    }
    Ok(Value::String(ctx.to_display_string(value)?).into())
}

fn type_of(_ctx: &mut ExecutionContext<'_>, args: &CallbackArguments) -> RuntimeResult<NativeOutcome> {
    let value = args.get(0).to_scalar();
    if value.is_void() {
        return Err(ScriptError::bad_argument(1, "type", "value expected").into());
    }
    Ok(Value::from(value.type_name()).into())
}

/// Largest range `unpack` will materialize
const MAX_UNPACK_RESULTS: i64 = 1_000_000;

/// `unpack(t [, i [, j]])`: `t[i], ..., t[j]`, raw access
pub(crate) fn unpack(_ctx: &mut ExecutionContext<'_>, args: &CallbackArguments) -> RuntimeResult<NativeOutcome> {
    let table = args.as_table(0, "unpack")?;
    let first = args.as_optional_integer(1, "unpack", 1)?;
    let last = args.as_optional_integer(2, "unpack", table.length() as i64)?;
    if first > last {
        return Ok(Value::empty_tuple().into());
    }
    let count = last.checked_sub(first).and_then(|n| n.checked_add(1));
    if !count.is_some_and(|n| n <= MAX_UNPACK_RESULTS) {
        return Err(ScriptError::new(ScriptErrorKind::StackOverflow, "too many results to unpack").into());
    }
    let table = table.borrow();
    let values: Vec<Value> = (first..=last).map(|i| table.get_int(i)).collect();
    Ok(Value::Tuple(values.into()).into())
}
