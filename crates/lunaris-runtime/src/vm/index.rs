//! `__index` / `__newindex` chain resolution
//!
//! Chains of table handlers are walked in place; a callable handler ends the
//! walk with a [`PendingCall`] the caller runs as a frame.

use super::{PendingCall, PostReturn, Processor, Resolved};
use crate::error::{RuntimeResult, ScriptError};
use crate::metamethod::{self, Operator};
use crate::value::Value;

/// Longest `__index` / `__newindex` chain before it is reported as a loop
pub(crate) const MAX_INDEX_HOPS: usize = 100;

impl Processor {
    /// `obj[key]` with metamethods
    pub(crate) fn resolve_index(&self, obj: Value, key: Value) -> RuntimeResult<Resolved> {
        let mut obj = obj.to_scalar();
        for _ in 0..MAX_INDEX_HOPS {
            let handler = match &obj {
                Value::Table(table) => {
                    let raw = table.get(&key);
                    if !raw.is_nil() {
                        return Ok(Resolved::Value(raw));
                    }
                    match metamethod::metatable_lookup(&obj, Operator::Index, &self.shared) {
                        Some(handler) => handler,
                        None => return Ok(Resolved::Value(Value::Nil)),
                    }
                }
                Value::UserData(data) => {
                    return Ok(Resolved::Value(data.descriptor().index(data, &key)?))
                }
                other => match metamethod::metatable_lookup(other, Operator::Index, &self.shared) {
                    Some(handler) => handler,
                    None => return Err(ScriptError::index(other).into()),
                },
            };

            if handler.is_callable() {
                return Ok(Resolved::call(handler, vec![obj, key], PostReturn::Scalar));
            }
            obj = handler;
        }
        Err(ScriptError::loop_in_index(false).into())
    }

    /// `obj[key] = value` with metamethods; `Some` when a handler must run
    pub(crate) fn resolve_new_index(
        &self,
        obj: Value,
        key: Value,
        value: Value,
    ) -> RuntimeResult<Option<PendingCall>> {
        let mut obj = obj.to_scalar();
        let value = value.to_storable();
        for _ in 0..MAX_INDEX_HOPS {
            let handler = match &obj {
                Value::Table(table) => {
                    let present = !table.get(&key).is_nil();
                    let handler = if present {
                        None
                    } else {
                        metamethod::metatable_lookup(&obj, Operator::NewIndex, &self.shared)
                    };
                    match handler {
                        Some(handler) => handler,
                        None => {
                            table.set(key, value)?;
                            return Ok(None);
                        }
                    }
                }
                Value::UserData(data) => {
                    data.descriptor().set_index(data, &key, value)?;
                    return Ok(None);
                }
                other => match metamethod::metatable_lookup(other, Operator::NewIndex, &self.shared) {
                    Some(handler) => handler,
                    None => return Err(ScriptError::index(other).into()),
                },
            };

            if handler.is_callable() {
                return Ok(Some(PendingCall {
                    function: handler,
                    args: vec![obj, key, value],
                    then: PostReturn::Discard,
                }));
            }
            obj = handler;
        }
        Err(ScriptError::loop_in_index(true).into())
    }
}
