//! Project Configuration (lunaris.toml)
//!
//! Handles per-project runtime settings stored in `lunaris.toml`.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound accepted for `vm.max_call_depth`
pub const CALL_DEPTH_LIMIT: usize = 10_000_000;

/// Upper bound accepted for `vm.max_native_nesting`
pub const NATIVE_NESTING_LIMIT: usize = 10_000;

/// Project configuration from lunaris.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Processor limits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vm: Option<VmConfig>,

    /// Coroutine scheduling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coroutines: Option<CoroutineConfig>,

    /// Core library modules to register
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modules: Option<ModulesConfig>,
}

/// Processor limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct VmConfig {
    /// Maximum number of call frames per processor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_call_depth: Option<usize>,

    /// Maximum re-entrant processor nesting (native -> script -> native ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_native_nesting: Option<usize>,

    /// Initial value stack capacity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_capacity: Option<usize>,
}

/// Coroutine scheduling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct CoroutineConfig {
    /// Instruction budget after which a coroutine is force-suspended (0 disables)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_yield: Option<u64>,
}

/// Core library modules
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ModulesConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub coroutine: Option<bool>,
}

impl ProjectConfig {
    /// Load project configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the project configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(vm) = &self.vm {
            vm.validate()?;
        }
        Ok(())
    }

    /// Merge another project config into this one
    /// Other config takes precedence for non-None values
    pub fn merge(&mut self, other: &ProjectConfig) {
        if let Some(vm) = &other.vm {
            self.vm.get_or_insert_with(Default::default).merge(vm);
        }
        if let Some(co) = &other.coroutines {
            let target = self.coroutines.get_or_insert_with(Default::default);
            if co.auto_yield.is_some() {
                target.auto_yield = co.auto_yield;
            }
        }
        if let Some(modules) = &other.modules {
            let target = self.modules.get_or_insert_with(Default::default);
            if modules.base.is_some() {
                target.base = modules.base;
            }
            if modules.table.is_some() {
                target.table = modules.table;
            }
            if modules.coroutine.is_some() {
                target.coroutine = modules.coroutine;
            }
        }
    }
}

impl VmConfig {
    /// Validate processor limits
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(depth) = self.max_call_depth {
            validate_range("vm.max_call_depth", depth, 1, CALL_DEPTH_LIMIT)?;
        }
        if let Some(nesting) = self.max_native_nesting {
            validate_range("vm.max_native_nesting", nesting, 1, NATIVE_NESTING_LIMIT)?;
        }
        Ok(())
    }

    pub fn merge(&mut self, other: &VmConfig) {
        if other.max_call_depth.is_some() {
            self.max_call_depth = other.max_call_depth;
        }
        if other.max_native_nesting.is_some() {
            self.max_native_nesting = other.max_native_nesting;
        }
        if other.stack_capacity.is_some() {
            self.stack_capacity = other.stack_capacity;
        }
    }
}

fn validate_range(field: &str, value: usize, min: usize, max: usize) -> ConfigResult<()> {
    if value < min || value > max {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("must be between {} and {}, got {}", min, max, value),
        });
    }
    Ok(())
}
