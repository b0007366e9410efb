//! Operator evaluation with metamethod fallback

use super::{PostReturn, Processor, Resolved};
use crate::error::{RuntimeResult, ScriptError};
use crate::metamethod::{self, Operator};
use crate::value::Value;
use std::rc::Rc;

impl Processor {
    pub(crate) fn eval_arith(&self, op: Operator, a: Value, b: Value) -> RuntimeResult<Resolved> {
        let (a, b) = (a.to_scalar(), b.to_scalar());
        if let (Some(x), Some(y)) = (a.cast_to_number(), b.cast_to_number()) {
            if let Some(n) = op.apply_numeric(x, y) {
                return Ok(Resolved::Value(Value::Number(n)));
            }
        }
        match metamethod::lookup_binary(&a, &b, op, &self.shared) {
            Some(handler) => Ok(Resolved::call(handler, vec![a, b], PostReturn::Scalar)),
            None => Err(ScriptError::arithmetic(op.symbol(), &a, &b).into()),
        }
    }

    pub(crate) fn eval_negate(&self, a: Value) -> RuntimeResult<Resolved> {
        let a = a.to_scalar();
        if let Some(n) = a.cast_to_number() {
            return Ok(Resolved::Value(Value::Number(-n)));
        }
        match metamethod::lookup(&a, Operator::Unm, &self.shared) {
            Some(handler) => Ok(Resolved::call(handler, vec![a.clone(), a], PostReturn::Scalar)),
            None => Err(ScriptError::negate(&a).into()),
        }
    }

    pub(crate) fn eval_concat(&self, a: Value, b: Value) -> RuntimeResult<Resolved> {
        let (a, b) = (a.to_scalar(), b.to_scalar());
        match (a.cast_to_string(), b.cast_to_string()) {
            (Some(x), Some(y)) => {
                let mut joined = String::with_capacity(x.len() + y.len());
                joined.push_str(&x);
                joined.push_str(&y);
                Ok(Resolved::Value(Value::String(Rc::from(joined))))
            }
            (left, _) => match metamethod::lookup_binary(&a, &b, Operator::Concat, &self.shared) {
                Some(handler) => Ok(Resolved::call(handler, vec![a, b], PostReturn::Scalar)),
                None => {
                    let bad = if left.is_none() { &a } else { &b };
                    Err(ScriptError::concat(bad).into())
                }
            },
        }
    }

    pub(crate) fn eval_length(&self, a: Value) -> RuntimeResult<Resolved> {
        let a = a.to_scalar();
        match &a {
            Value::String(s) => Ok(Resolved::Value(Value::Number(s.len() as f64))),
            Value::Table(table) => {
                match metamethod::metatable_lookup(&a, Operator::Len, &self.shared) {
                    Some(handler) => Ok(Resolved::call(handler, vec![a.clone()], PostReturn::Length)),
                    None => Ok(Resolved::Value(Value::Number(table.length() as f64))),
                }
            }
            other => match metamethod::lookup(other, Operator::Len, &self.shared) {
                Some(handler) => Ok(Resolved::call(handler, vec![a.clone()], PostReturn::Length)),
                None => Err(ScriptError::length(other).into()),
            },
        }
    }

    /// Equality never fails; `__eq` only runs between two tables sharing a
    /// metatable or two user data sharing a descriptor
    pub(crate) fn eval_eq(&self, a: Value, b: Value) -> Resolved {
        let (a, b) = (a.to_scalar(), b.to_scalar());
        if a.raw_equals(&b) {
            return Resolved::Value(Value::Boolean(true));
        }
        let handler = match (&a, &b) {
            (Value::Table(x), Value::Table(y)) => match (x.metatable(), y.metatable()) {
                (Some(mx), Some(my)) if mx.ptr_eq(&my) => {
                    Some(mx.get_str(Operator::Eq.name())).filter(|h| !h.is_nil())
                }
                _ => None,
            },
            (Value::UserData(x), Value::UserData(y)) if x.same_descriptor(y) => {
                if x.equals(y) {
                    return Resolved::Value(Value::Boolean(true));
                }
                metamethod::lookup(&a, Operator::Eq, &self.shared)
            }
            _ => None,
        };
        match handler {
            Some(handler) => Resolved::call(handler, vec![a, b], PostReturn::ToBool),
            None => Resolved::Value(Value::Boolean(false)),
        }
    }

    pub(crate) fn eval_less(&self, a: Value, b: Value) -> RuntimeResult<Resolved> {
        let (a, b) = (a.to_scalar(), b.to_scalar());
        match (&a, &b) {
            (Value::Number(x), Value::Number(y)) => Ok(Resolved::Value(Value::Boolean(x < y))),
            (Value::String(x), Value::String(y)) => Ok(Resolved::Value(Value::Boolean(x < y))),
            _ => match metamethod::lookup_binary(&a, &b, Operator::Lt, &self.shared) {
                Some(handler) => Ok(Resolved::call(handler, vec![a, b], PostReturn::ToBool)),
                None => Err(ScriptError::comparison(&a, &b).into()),
            },
        }
    }

    /// `a <= b`, falling back to `not (b < a)` when only `__lt` exists
    pub(crate) fn eval_less_eq(&self, a: Value, b: Value) -> RuntimeResult<Resolved> {
        let (a, b) = (a.to_scalar(), b.to_scalar());
        match (&a, &b) {
            (Value::Number(x), Value::Number(y)) => Ok(Resolved::Value(Value::Boolean(x <= y))),
            (Value::String(x), Value::String(y)) => Ok(Resolved::Value(Value::Boolean(x <= y))),
            _ => {
                if let Some(handler) = metamethod::lookup_binary(&a, &b, Operator::Le, &self.shared) {
                    return Ok(Resolved::call(handler, vec![a, b], PostReturn::ToBool));
                }
                match metamethod::lookup_binary(&b, &a, Operator::Lt, &self.shared) {
                    Some(handler) => Ok(Resolved::call(handler, vec![b, a], PostReturn::NegateBool)),
                    None => Err(ScriptError::comparison(&a, &b).into()),
                }
            }
        }
    }

    /// `tostring` semantics: `__tostring` when present, display form otherwise
    pub(crate) fn eval_tostring(&self, a: Value) -> Resolved {
        let a = a.to_scalar();
        match metamethod::lookup(&a, Operator::ToString, &self.shared) {
            Some(handler) => Resolved::call(handler, vec![a], PostReturn::Scalar),
            None => Resolved::Value(Value::from(a.to_string())),
        }
    }
}
