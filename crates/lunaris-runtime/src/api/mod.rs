//! Public embedding API
//!
//! - [`Runtime`]: loading bytecode, calling functions, globals, coroutines
//! - Native functions: [`NativeFunctionRef`], [`NativeFunctionBuilder`] and the
//!   [`ExecutionContext`] they run with
//! - Value conversion between Rust and script types, plus JSON interop
//!
//! # Examples
//!
//! ```
//! use lunaris_runtime::api::{NativeOutcome, Runtime};
//! use lunaris_runtime::value::Value;
//!
//! let runtime = Runtime::new();
//! let double = runtime.native("double", |_ctx, args| {
//!     let n = args.as_number(0, "double")?;
//!     Ok(NativeOutcome::Return(Value::from(n * 2.0)))
//! });
//! runtime.register(None, double).unwrap();
//!
//! let result = runtime.call_global("double", vec![Value::from(21.0)]).unwrap();
//! assert_eq!(result, Value::from(42.0));
//! ```

pub mod arguments;
pub mod context;
pub mod conversion;
pub mod json;
pub mod native;
pub mod runtime;

pub use arguments::CallbackArguments;
pub use context::ExecutionContext;
pub use conversion::{ConversionError, FromLunaris, ToLunaris};
pub use native::{
    BuildError, NativeFunctionBuilder, NativeFunctionRef, NativeOutcome, TailCallRequest,
};
pub use runtime::Runtime;
