//! Resolved runtime settings
//!
//! [`RuntimeConfig`] is the flattened, fully-defaulted view of the layered
//! configuration files. It is what `lunaris_runtime::Runtime::with_config`
//! consumes.

use crate::global::GlobalConfig;
use crate::project::ProjectConfig;

/// Default maximum call-frame depth
pub const DEFAULT_MAX_CALL_DEPTH: usize = 100_000;

/// Default maximum re-entrant processor nesting
pub const DEFAULT_MAX_NATIVE_NESTING: usize = 200;

/// Default initial value stack capacity
pub const DEFAULT_STACK_CAPACITY: usize = 1024;

/// Which core library modules get registered in a new runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleSet {
    pub base: bool,
    pub table: bool,
    pub coroutine: bool,
}

impl Default for ModuleSet {
    fn default() -> Self {
        Self {
            base: true,
            table: true,
            coroutine: true,
        }
    }
}

impl ModuleSet {
    /// No modules at all (bare runtime)
    pub fn none() -> Self {
        Self {
            base: false,
            table: false,
            coroutine: false,
        }
    }
}

/// Effective runtime settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Maximum number of call frames per processor
    pub max_call_depth: usize,
    /// Maximum re-entrant processor nesting
    pub max_native_nesting: usize,
    /// Initial value stack capacity
    pub stack_capacity: usize,
    /// Default auto-yield instruction budget for new coroutines
    pub auto_yield: Option<u64>,
    /// Core library modules
    pub modules: ModuleSet,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_native_nesting: DEFAULT_MAX_NATIVE_NESTING,
            stack_capacity: DEFAULT_STACK_CAPACITY,
            auto_yield: None,
            modules: ModuleSet::default(),
        }
    }
}

impl RuntimeConfig {
    /// Resolve effective settings: project > global > built-in default
    pub fn resolve(global: &GlobalConfig, project: &ProjectConfig) -> Self {
        let mut config = Self::default();

        for vm in [global.vm.as_ref(), project.vm.as_ref()].into_iter().flatten() {
            if let Some(depth) = vm.max_call_depth {
                config.max_call_depth = depth;
            }
            if let Some(nesting) = vm.max_native_nesting {
                config.max_native_nesting = nesting;
            }
            if let Some(capacity) = vm.stack_capacity {
                config.stack_capacity = capacity;
            }
        }

        for co in [global.coroutines.as_ref(), project.coroutines.as_ref()]
            .into_iter()
            .flatten()
        {
            if let Some(budget) = co.auto_yield {
                config.auto_yield = (budget > 0).then_some(budget);
            }
        }

        if let Some(modules) = &project.modules {
            config.modules.base = modules.base.unwrap_or(true);
            config.modules.table = modules.table.unwrap_or(true);
            config.modules.coroutine = modules.coroutine.unwrap_or(true);
        }

        config
    }
}
