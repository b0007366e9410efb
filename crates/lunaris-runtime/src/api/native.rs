//! Native function contract and builder
//!
//! A native function is a Rust closure scripts can call. It receives the
//! [`ExecutionContext`] of the calling processor and a [`CallbackArguments`]
//! view, and answers with a [`NativeOutcome`]:
//!
//! - `Return(value)`: the call's result (a tuple for several values)
//! - `TailCall(request)`: call another function in this call's place
//! - `Yield(value)`: suspend the running coroutine
//!
//! # Examples
//!
//! ```
//! use lunaris_runtime::api::native::NativeFunctionBuilder;
//! use lunaris_runtime::value::{RefIdAllocator, Value};
//!
//! let ids = RefIdAllocator::new();
//! let double = NativeFunctionBuilder::new("double")
//!     .with_description("Multiply a number by two")
//!     .with_arity(1)
//!     .with_implementation(|_ctx, args| {
//!         let n = args.as_number(0, "double")?;
//!         Ok(Value::Number(n * 2.0).into())
//!     })
//!     .build(&ids)
//!     .unwrap();
//!
//! assert_eq!(double.name(), "double");
//! assert_eq!(double.arity(), Some(1));
//! ```

use crate::api::arguments::CallbackArguments;
use crate::api::context::ExecutionContext;
use crate::error::RuntimeResult;
use crate::value::{RefIdAllocator, Value};
use std::fmt;
use std::rc::Rc;

/// Signature of a native function body
pub type NativeCallback =
    dyn Fn(&mut ExecutionContext<'_>, &CallbackArguments) -> RuntimeResult<NativeOutcome>;

/// What a native function hands back to the processor
#[derive(Debug)]
pub enum NativeOutcome {
    Return(Value),
    TailCall(TailCallRequest),
    Yield(Value),
}

impl From<Value> for NativeOutcome {
    fn from(value: Value) -> Self {
        NativeOutcome::Return(value)
    }
}

impl From<TailCallRequest> for NativeOutcome {
    fn from(request: TailCallRequest) -> Self {
        NativeOutcome::TailCall(request)
    }
}

/// A call the processor makes in place of the native function's own return
///
/// The call runs without growing the native call chain: its result becomes
/// the native function's result, optionally passed through `continuation`.
/// `error_handler` catches script errors raised by the call (its result is
/// returned instead), and `before_unwind` sees the error message before any
/// frame is popped.
#[derive(Debug)]
pub struct TailCallRequest {
    pub function: Value,
    pub args: Vec<Value>,
    pub continuation: Option<NativeFunctionRef>,
    pub error_handler: Option<NativeFunctionRef>,
    pub before_unwind: Option<Value>,
}

impl TailCallRequest {
    pub fn new(function: Value, args: Vec<Value>) -> Self {
        Self {
            function,
            args,
            continuation: None,
            error_handler: None,
            before_unwind: None,
        }
    }

    pub fn with_continuation(mut self, continuation: NativeFunctionRef) -> Self {
        self.continuation = Some(continuation);
        self
    }

    pub fn with_error_handler(mut self, handler: NativeFunctionRef) -> Self {
        self.error_handler = Some(handler);
        self
    }

    pub fn with_before_unwind(mut self, decorator: Value) -> Self {
        self.before_unwind = Some(decorator);
        self
    }
}

/// A host function exposed to scripts
pub struct NativeFunction {
    name: Rc<str>,
    description: Option<String>,
    arity: Option<usize>,
    callback: Box<NativeCallback>,
    ref_id: u64,
}

impl NativeFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Declared argument count; informational only, never enforced
    pub fn arity(&self) -> Option<usize> {
        self.arity
    }

    pub(crate) fn invoke(
        &self,
        ctx: &mut ExecutionContext<'_>,
        args: &CallbackArguments,
    ) -> RuntimeResult<NativeOutcome> {
        (self.callback)(ctx, args)
    }
}

/// Shared handle to a [`NativeFunction`]
#[derive(Clone)]
pub struct NativeFunctionRef(Rc<NativeFunction>);

impl NativeFunctionRef {
    /// Wrap a callback with no metadata
    pub fn new<F>(name: &str, callback: F, ids: &RefIdAllocator) -> Self
    where
        F: Fn(&mut ExecutionContext<'_>, &CallbackArguments) -> RuntimeResult<NativeOutcome>
            + 'static,
    {
        NativeFunctionRef(Rc::new(NativeFunction {
            name: Rc::from(name),
            description: None,
            arity: None,
            callback: Box::new(callback),
            ref_id: ids.next_id(),
        }))
    }

    pub fn ref_id(&self) -> u64 {
        self.0.ref_id
    }

    pub fn ptr_eq(&self, other: &NativeFunctionRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl std::ops::Deref for NativeFunctionRef {
    type Target = NativeFunction;

    fn deref(&self) -> &NativeFunction {
        &self.0
    }
}

impl fmt::Debug for NativeFunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunctionRef({} #{})", self.name(), self.ref_id())
    }
}

/// Builder for native functions with tooling metadata
pub struct NativeFunctionBuilder {
    name: String,
    description: Option<String>,
    arity: Option<usize>,
    implementation: Option<Box<NativeCallback>>,
}

impl NativeFunctionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            arity: None,
            implementation: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declare the expected argument count (introspection only)
    pub fn with_arity(mut self, arity: usize) -> Self {
        self.arity = Some(arity);
        self
    }

    /// Declare that any argument count is accepted
    pub fn variadic(mut self) -> Self {
        self.arity = None;
        self
    }

    pub fn with_implementation<F>(mut self, implementation: F) -> Self
    where
        F: Fn(&mut ExecutionContext<'_>, &CallbackArguments) -> RuntimeResult<NativeOutcome>
            + 'static,
    {
        self.implementation = Some(Box::new(implementation));
        self
    }

    pub fn build(self, ids: &RefIdAllocator) -> Result<NativeFunctionRef, BuildError> {
        let callback = self
            .implementation
            .ok_or_else(|| BuildError::MissingImplementation(self.name.clone()))?;
        Ok(NativeFunctionRef(Rc::new(NativeFunction {
            name: Rc::from(self.name),
            description: self.description,
            arity: self.arity,
            callback,
            ref_id: ids.next_id(),
        })))
    }
}

/// Errors that can occur when building a native function
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("native function '{0}' missing implementation")]
    MissingImplementation(String),
}
