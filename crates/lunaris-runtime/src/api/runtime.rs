//! Embedding API
//!
//! A [`Runtime`] owns the shared state (globals, type metatables, reference
//! ids) and the main coroutine. State persists across loads and calls.
//!
//! # Examples
//!
//! ```
//! use lunaris_runtime::api::Runtime;
//! use lunaris_runtime::bytecode::{ByteCodeBuilder, OpCode};
//!
//! let runtime = Runtime::new();
//!
//! // return 1 + 2
//! let mut b = ByteCodeBuilder::new("main");
//! b.begin_fn(0);
//! b.literal(1.0);
//! b.literal(2.0);
//! b.op(OpCode::Add);
//! b.ret(1);
//!
//! let chunk = runtime.load(b.build()).unwrap();
//! let result = runtime.call_function(&chunk, vec![]).unwrap();
//! assert_eq!(result.as_number(), Some(3.0));
//!
//! runtime.set_global("answer", 42.0);
//! let answer: f64 = runtime.get_global("answer").unwrap();
//! assert_eq!(answer, 42.0);
//! ```

use crate::api::arguments::CallbackArguments;
use crate::api::context::ExecutionContext;
use crate::api::conversion::{FromLunaris, ToLunaris};
use crate::api::native::{NativeFunctionRef, NativeOutcome};
use crate::bytecode::{self, ByteCode};
use crate::closure::{new_cell, ClosureRef};
use crate::coroutine::CoroutineRef;
use crate::error::{ContractViolation, RuntimeResult, ScriptError, ScriptErrorKind};
use crate::shared::{CancellationToken, RuntimeShared};
use crate::stdlib::{self, CoreModules};
use crate::symbol::ENV_NAME;
use crate::table::TableRef;
use crate::value::{DataType, UserDataDescriptor, UserDataRef, Value};
use lunaris_config::RuntimeConfig;
use std::rc::Rc;
use tracing::debug;

/// Runtime instance managing execution state
pub struct Runtime {
    shared: Rc<RuntimeShared>,
    main: CoroutineRef,
}

impl Runtime {
    /// Runtime with the default configuration and every core module
    pub fn new() -> Self {
        Self::with_config(&RuntimeConfig::default())
    }

    pub fn with_config(config: &RuntimeConfig) -> Self {
        let shared = Rc::new(RuntimeShared::new(config.clone()));
        let main = CoroutineRef::main(&shared);
        let modules = CoreModules::from(&config.modules);
        stdlib::register_core_modules(&shared, modules);
        debug!(
            max_call_depth = config.max_call_depth,
            auto_yield = ?config.auto_yield,
            modules = ?modules,
            "runtime created"
        );
        Self { shared, main }
    }

    pub fn shared(&self) -> &Rc<RuntimeShared> {
        &self.shared
    }

    pub fn globals(&self) -> TableRef {
        self.shared.globals().clone()
    }

    pub fn new_table(&self) -> TableRef {
        self.shared.new_table()
    }

    pub fn main_coroutine(&self) -> &CoroutineRef {
        &self.main
    }

    /// Validate a chunk and bind it to the global environment
    ///
    /// Returns the chunk's root closure (entry point 0).
    pub fn load(&self, code: ByteCode) -> RuntimeResult<Value> {
        self.load_with_env(code, Value::Table(self.globals()))
    }

    /// Validate a chunk and bind it to a custom `_ENV`
    pub fn load_with_env(&self, code: ByteCode, env: Value) -> RuntimeResult<Value> {
        bytecode::validate(&code)?;
        debug!(chunk = %code.name, instructions = code.len(), "bytecode loaded");
        let name = Rc::clone(&code.name);
        let closure = ClosureRef::new(
            Rc::new(code),
            0,
            vec![new_cell(env)],
            vec![Rc::from(ENV_NAME)],
            Some(name),
            self.shared.ids(),
        );
        Ok(Value::Function(closure))
    }

    /// Call a function on the main coroutine
    ///
    /// Fails with [`ContractViolation::Reentrancy`] when the main coroutine
    /// is already running; native functions call back through their
    /// [`ExecutionContext`] instead.
    pub fn call_function(&self, function: &Value, args: Vec<Value>) -> RuntimeResult<Value> {
        let mut processor = self
            .main
            .processor()
            .try_borrow_mut()
            .map_err(|_| ContractViolation::Reentrancy)?;
        self.shared.push_coroutine(self.main.clone());
        let result = processor.call(function.clone(), args);
        self.shared.pop_coroutine();
        result
    }

    /// Call the global function `name`
    pub fn call_global(&self, name: &str, args: Vec<Value>) -> RuntimeResult<Value> {
        let function = self.shared.globals().get_str(name);
        self.call_function(&function, args)
    }

    /// New coroutine over a callable value
    pub fn create_coroutine(&self, function: Value) -> RuntimeResult<CoroutineRef> {
        if !function.is_callable() {
            return Err(ScriptError::new(
                ScriptErrorKind::Call,
                format!("cannot create a coroutine from a {} value", function.type_name()),
            )
            .into());
        }
        Ok(CoroutineRef::new(&self.shared, function))
    }

    /// New coroutine that runs a host callback to completion on first resume
    pub fn create_native_coroutine(&self, callback: NativeFunctionRef) -> CoroutineRef {
        CoroutineRef::from_native(&self.shared, callback)
    }

    pub fn resume(&self, coroutine: &CoroutineRef, args: Vec<Value>) -> RuntimeResult<Value> {
        coroutine.resume(args)
    }

    /// Wrap a closure as a native function of this runtime
    pub fn native<F>(&self, name: &str, callback: F) -> NativeFunctionRef
    where
        F: Fn(&mut ExecutionContext<'_>, &CallbackArguments) -> RuntimeResult<NativeOutcome>
            + 'static,
    {
        NativeFunctionRef::new(name, callback, self.shared.ids())
    }

    /// Publish a native function as a global (`None`) or as a field of the
    /// global table `namespace`, created on demand
    pub fn register(&self, namespace: Option<&str>, function: NativeFunctionRef) -> RuntimeResult<()> {
        let globals = self.shared.globals();
        let target = match namespace {
            None => globals.clone(),
            Some(ns) => match globals.get_str(ns) {
                Value::Table(t) => t,
                Value::Nil | Value::Void => {
                    let t = self.shared.new_table();
                    globals.set_str(ns, Value::Table(t.clone()));
                    t
                }
                other => {
                    return Err(ScriptError::new(
                        ScriptErrorKind::Index,
                        format!("cannot register into global '{}' ({} value)", ns, other.type_name()),
                    )
                    .into())
                }
            },
        };
        debug!(namespace = ?namespace, name = function.name(), "native function registered");
        let name = function.name().to_string();
        target.set_str(&name, Value::NativeFunction(function));
        Ok(())
    }

    pub fn get_global<T: FromLunaris>(&self, name: &str) -> RuntimeResult<T> {
        Ok(T::from_lunaris(&self.shared.globals().get_str(name))?)
    }

    pub fn set_global<T: ToLunaris>(&self, name: &str, value: T) {
        let value = value.to_lunaris(self.shared.ids());
        self.shared.globals().set_str(name, value);
    }

    /// Wrap a host object for scripts
    pub fn new_userdata<T: 'static>(&self, descriptor: Rc<dyn UserDataDescriptor>, object: T) -> Value {
        Value::UserData(UserDataRef::new(descriptor, Rc::new(object), self.shared.ids().next_id()))
    }

    /// Metatable shared by every value of a non-table type
    pub fn set_type_metatable(&self, data_type: DataType, metatable: Option<TableRef>) {
        self.shared.set_type_metatable(data_type, metatable);
    }

    /// Token that stops every coroutine of this runtime at the next instruction
    pub fn cancellation(&self) -> CancellationToken {
        self.shared.cancellation().clone()
    }

    /// Redirect the `print` library function
    pub fn set_print_hook(&self, hook: impl Fn(&str) + 'static) {
        self.shared.set_print_hook(Box::new(hook));
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime").field("shared", &self.shared).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::ByteCodeBuilder;
    use lunaris_config::ModuleSet;
    use pretty_assertions::assert_eq;

    fn returns_literal(value: f64) -> ByteCode {
        let mut b = ByteCodeBuilder::new("chunk");
        b.begin_fn(0);
        b.literal(value);
        b.ret(1);
        b.build()
    }

    #[test]
    fn test_load_and_call() {
        let runtime = Runtime::new();
        let chunk = runtime.load(returns_literal(7.0)).unwrap();
        assert_eq!(runtime.call_function(&chunk, vec![]).unwrap(), Value::from(7.0));
    }

    #[test]
    fn test_load_rejects_invalid_bytecode() {
        let runtime = Runtime::new();
        let err = runtime.load(ByteCode::new("empty", vec![])).unwrap_err();
        assert!(matches!(err, crate::error::RuntimeError::Internal(_)));
    }

    #[test]
    fn test_register_into_namespace() {
        let runtime = Runtime::new();
        let f = runtime.native("hello", |_, _| Ok(Value::from("hi").into()));
        runtime.register(Some("host"), f).unwrap();

        let host = runtime.globals().get_str("host");
        let table = host.as_table().unwrap();
        assert!(matches!(table.get_str("hello"), Value::NativeFunction(_)));
    }

    #[test]
    fn test_register_into_non_table_fails() {
        let runtime = Runtime::new();
        runtime.set_global("host", 1.0);
        let f = runtime.native("hello", |_, _| Ok(Value::Nil.into()));
        assert!(runtime.register(Some("host"), f).is_err());
    }

    #[test]
    fn test_modules_follow_config() {
        let config = RuntimeConfig {
            modules: ModuleSet::none(),
            ..RuntimeConfig::default()
        };
        let runtime = Runtime::with_config(&config);
        assert!(runtime.globals().get_str("print").is_nil());

        let runtime = Runtime::new();
        assert!(runtime.globals().get_str("print").is_callable());
        assert!(runtime.globals().get_str("coroutine").as_table().is_some());
    }

    #[test]
    fn test_create_coroutine_requires_callable() {
        let runtime = Runtime::new();
        assert!(runtime.create_coroutine(Value::from(1.0)).is_err());
    }

    #[test]
    fn test_globals_round_trip_through_conversion() {
        let runtime = Runtime::new();
        runtime.set_global("names", vec!["a", "b"]);
        let names: Vec<String> = runtime.get_global("names").unwrap();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }
}
