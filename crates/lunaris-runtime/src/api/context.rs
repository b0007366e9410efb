//! Execution context handed to native functions
//!
//! The context is the only way a native function re-enters script code. Its
//! operations run metamethods in a nested loop on the calling processor, so
//! they can never yield: a native that wants to yield or call something that
//! may yield returns a [`NativeOutcome`](crate::api::native::NativeOutcome)
//! instead.

use crate::api::arguments::CallbackArguments;
use crate::api::native::{NativeFunctionRef, NativeOutcome};
use crate::bytecode::SourceLocation;
use crate::coroutine::CoroutineRef;
use crate::error::{RuntimeResult, ScriptError, ScriptErrorKind};
use crate::metamethod::{self, Operator};
use crate::shared::RuntimeShared;
use crate::table::TableRef;
use crate::value::Value;
use crate::vm::Processor;
use std::rc::Rc;

pub struct ExecutionContext<'a> {
    processor: &'a mut Processor,
    location: Option<SourceLocation>,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(processor: &'a mut Processor, location: Option<SourceLocation>) -> Self {
        Self {
            processor,
            location,
        }
    }

    pub fn shared(&self) -> &Rc<RuntimeShared> {
        self.processor.shared()
    }

    pub fn globals(&self) -> TableRef {
        self.shared().globals().clone()
    }

    pub fn new_table(&self) -> TableRef {
        self.shared().new_table()
    }

    /// Wrap a closure as a native function value owned by this runtime
    pub fn native<F>(&self, name: &str, callback: F) -> NativeFunctionRef
    where
        F: Fn(&mut ExecutionContext<'_>, &CallbackArguments) -> RuntimeResult<NativeOutcome>
            + 'static,
    {
        NativeFunctionRef::new(name, callback, self.shared().ids())
    }

    /// Location of the script call that invoked the running native function
    pub fn calling_location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }

    /// Call a function (or callable value) to completion
    pub fn call(&mut self, function: Value, args: Vec<Value>) -> RuntimeResult<Value> {
        self.processor.call(function, args)
    }

    /// `obj[key]`, running `__index` handlers
    pub fn index(&mut self, obj: Value, key: Value) -> RuntimeResult<Value> {
        let resolved = self.processor.resolve_index(obj, key)?;
        self.processor.complete(resolved)
    }

    /// `obj[key] = value`, running `__newindex` handlers
    pub fn set_index(&mut self, obj: Value, key: Value, value: Value) -> RuntimeResult<()> {
        if let Some(pending) = self.processor.resolve_new_index(obj, key, value)? {
            self.processor.call(pending.function, pending.args)?;
        }
        Ok(())
    }

    /// `#value`, running `__len`
    pub fn len(&mut self, value: Value) -> RuntimeResult<Value> {
        let resolved = self.processor.eval_length(value)?;
        self.processor.complete(resolved)
    }

    /// `a == b`, running `__eq`
    pub fn equals(&mut self, a: Value, b: Value) -> RuntimeResult<bool> {
        let resolved = self.processor.eval_eq(a, b);
        Ok(self.processor.complete(resolved)?.cast_to_bool())
    }

    /// `a < b`, running `__lt`
    pub fn less_than(&mut self, a: Value, b: Value) -> RuntimeResult<bool> {
        let resolved = self.processor.eval_less(a, b)?;
        Ok(self.processor.complete(resolved)?.cast_to_bool())
    }

    /// `tostring` semantics, running `__tostring`
    pub fn to_display_string(&mut self, value: Value) -> RuntimeResult<Rc<str>> {
        let resolved = self.processor.eval_tostring(value);
        match self.processor.complete(resolved)?.to_scalar() {
            Value::String(s) => Ok(s),
            _ => Err(ScriptError::new(
                ScriptErrorKind::User,
                "'__tostring' must return a string",
            )
            .into()),
        }
    }

    /// Metatable hook for `op` on `value` (metatable, then descriptor)
    pub fn metamethod(&self, value: &Value, op: Operator) -> Option<Value> {
        metamethod::lookup(value, op, self.shared())
    }

    pub fn metatable(&self, value: &Value) -> Option<TableRef> {
        metamethod::metatable_of(value, self.shared())
    }

    /// Coroutine whose processor runs this native function
    pub fn current_coroutine(&self) -> Option<CoroutineRef> {
        self.shared().current_coroutine()
    }

    pub fn create_coroutine(&self, function: Value) -> CoroutineRef {
        CoroutineRef::new(self.shared(), function)
    }

    /// Resume another coroutine; it runs on its own processor
    pub fn resume(&mut self, coroutine: &CoroutineRef, args: Vec<Value>) -> RuntimeResult<Value> {
        coroutine.resume(args)
    }

    /// Whether returning `NativeOutcome::Yield` is allowed here
    pub fn is_yieldable(&self) -> bool {
        self.processor.is_yieldable()
    }
}
