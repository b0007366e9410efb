//! Lunaris Runtime - embeddable bytecode runtime for a Lua-style language
//!
//! This library provides:
//! - Values, tables and metatable dispatch
//! - A bytecode processor with tail calls, protected calls and coroutines
//! - The core library (`base`, `table`, `coroutine`)
//! - An embedding API for hosts and native functions

/// Lunaris runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod api;
pub mod bytecode;
pub mod closure;
pub mod coroutine;
pub mod error;
pub mod metamethod;
pub mod shared;
pub mod stdlib;
pub mod symbol;
pub mod table;
pub mod value;
pub mod vm;

// Re-export commonly used types
pub use api::{CallbackArguments, ExecutionContext, NativeOutcome, Runtime};
pub use bytecode::{ByteCode, ByteCodeBuilder, OpCode};
pub use coroutine::{CoroutineRef, CoroutineState};
pub use error::{ContractViolation, RuntimeError, RuntimeResult, ScriptError, ScriptErrorKind};
pub use lunaris_config::RuntimeConfig;
pub use table::{Table, TableRef};
pub use value::{DataType, Value};
pub use vm::Processor;
