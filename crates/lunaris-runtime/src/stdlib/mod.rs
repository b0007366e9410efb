//! Core library modules
//!
//! Which modules a runtime gets is chosen by [`CoreModules`], built from the
//! `[modules]` section of the runtime configuration.

pub mod base;
pub mod coroutine;
pub mod table;

use crate::api::arguments::CallbackArguments;
use crate::api::context::ExecutionContext;
use crate::api::native::{NativeFunctionRef, NativeOutcome};
use crate::error::RuntimeResult;
use crate::shared::RuntimeShared;
use crate::table::TableRef;
use crate::value::Value;
use bitflags::bitflags;
use lunaris_config::ModuleSet;
use std::rc::Rc;
use tracing::debug;

bitflags! {
    /// Core library modules to register
    pub struct CoreModules: u8 {
        /// Global functions (`print`, `pcall`, `setmetatable`, ...)
        const BASE = 0b001;
        /// The `table` namespace
        const TABLE = 0b010;
        /// The `coroutine` namespace
        const COROUTINE = 0b100;
        const ALL = Self::BASE.bits | Self::TABLE.bits | Self::COROUTINE.bits;
    }
}

impl From<&ModuleSet> for CoreModules {
    fn from(set: &ModuleSet) -> Self {
        let mut modules = CoreModules::empty();
        modules.set(CoreModules::BASE, set.base);
        modules.set(CoreModules::TABLE, set.table);
        modules.set(CoreModules::COROUTINE, set.coroutine);
        modules
    }
}

/// Plain library function
pub(crate) type LibFn =
    fn(&mut ExecutionContext<'_>, &CallbackArguments) -> RuntimeResult<NativeOutcome>;

pub fn register_core_modules(shared: &Rc<RuntimeShared>, modules: CoreModules) {
    let globals = shared.globals();
    if modules.contains(CoreModules::BASE) {
        base::register(shared, globals);
    }
    if modules.contains(CoreModules::TABLE) {
        let namespace = shared.new_table();
        table::register(shared, &namespace);
        globals.set_str("table", Value::Table(namespace));
    }
    if modules.contains(CoreModules::COROUTINE) {
        let namespace = shared.new_table();
        coroutine::register(shared, &namespace);
        globals.set_str("coroutine", Value::Table(namespace));
    }
    debug!(modules = ?modules, "core modules registered");
}

/// Store each function under its name in `target`
pub(crate) fn install(shared: &RuntimeShared, target: &TableRef, functions: &[(&str, LibFn)]) {
    for &(name, function) in functions {
        target.set_str(name, native(shared, name, function).into());
    }
}

pub(crate) fn native(shared: &RuntimeShared, name: &str, function: LibFn) -> NativeFunctionRef {
    NativeFunctionRef::new(name, function, shared.ids())
}

/// Several return values
pub(crate) fn multiple(values: Vec<Value>) -> RuntimeResult<NativeOutcome> {
    Ok(Value::tuple(values).into())
}
