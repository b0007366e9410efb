//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::global::GlobalConfig;
use crate::project::{CoroutineConfig, ModulesConfig, ProjectConfig, VmConfig};
use crate::runtime::RuntimeConfig;
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// Name of the project configuration file
pub const PROJECT_FILE: &str = "lunaris.toml";

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.lunaris/config.toml) - lowest priority
/// 2. Project config (./lunaris.toml) - overrides global
/// 3. Environment variables (LUNARIS_*) - overrides project
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone)]
pub struct Config {
    /// Project configuration (env overrides already applied)
    pub project: ProjectConfig,

    /// Global configuration
    pub global: GlobalConfig,

    /// Project root directory (where lunaris.toml was found)
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Use an explicit global config file instead of ~/.lunaris/config.toml
    pub fn with_global_config_path(path: impl Into<PathBuf>) -> Self {
        Self {
            global_config_path: Some(path.into()),
        }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find lunaris.toml, then loads and merges
    /// global config if it exists.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project_config) = self.find_project_config(start_dir)?;
        let global_config = self.load_global_config()?;
        let project_config = self.apply_env_overrides(project_config)?;

        Ok(Config {
            project: project_config,
            global: global_config,
            project_root,
        })
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project_config = ProjectConfig::load_from_file(config_path)?;
        let global_config = self.load_global_config()?;
        let project_config = self.apply_env_overrides(project_config)?;

        let project_root = config_path.parent().map(|p| p.to_path_buf());

        Ok(Config {
            project: project_config,
            global: global_config,
            project_root,
        })
    }

    /// Find project configuration by walking up directory tree
    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, ProjectConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(PROJECT_FILE);

            if config_path.exists() {
                let project_config = ProjectConfig::load_from_file(&config_path)?;
                return Ok((Some(current), project_config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, ProjectConfig::default())),
            }
        }
    }

    /// Load global configuration; a missing file or home directory yields defaults
    fn load_global_config(&mut self) -> ConfigResult<GlobalConfig> {
        let path = match &self.global_config_path {
            Some(path) => path.clone(),
            None => match GlobalConfig::global_config_path() {
                Ok(path) => {
                    self.global_config_path = Some(path.clone());
                    path
                }
                Err(ConfigError::HomeNotFound) => return Ok(GlobalConfig::default()),
                Err(e) => return Err(e),
            },
        };

        if !path.exists() {
            return Ok(GlobalConfig::default());
        }

        GlobalConfig::load_from_file(&path)
    }

    /// Apply environment variable overrides to project config
    ///
    /// Recognised variables:
    /// - `LUNARIS_MAX_CALL_DEPTH=<n>`
    /// - `LUNARIS_MAX_NATIVE_NESTING=<n>`
    /// - `LUNARIS_AUTO_YIELD=<n>` (0 disables)
    /// - `LUNARIS_MODULES=base,table,coroutine`
    fn apply_env_overrides(&self, mut config: ProjectConfig) -> ConfigResult<ProjectConfig> {
        if let Some(depth) = env_number::<usize>("LUNARIS_MAX_CALL_DEPTH")? {
            config
                .vm
                .get_or_insert_with(VmConfig::default)
                .max_call_depth = Some(depth);
        }

        if let Some(nesting) = env_number::<usize>("LUNARIS_MAX_NATIVE_NESTING")? {
            config
                .vm
                .get_or_insert_with(VmConfig::default)
                .max_native_nesting = Some(nesting);
        }

        if let Some(budget) = env_number::<u64>("LUNARIS_AUTO_YIELD")? {
            config
                .coroutines
                .get_or_insert_with(CoroutineConfig::default)
                .auto_yield = Some(budget);
        }

        if let Ok(list) = env::var("LUNARIS_MODULES") {
            let mut modules = ModulesConfig {
                base: Some(false),
                table: Some(false),
                coroutine: Some(false),
            };
            for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                match name.to_lowercase().as_str() {
                    "base" => modules.base = Some(true),
                    "table" => modules.table = Some(true),
                    "coroutine" => modules.coroutine = Some(true),
                    other => {
                        return Err(ConfigError::InvalidValue {
                            field: "LUNARIS_MODULES".to_string(),
                            reason: format!("unknown module '{}'", other),
                        })
                    }
                }
            }
            config.modules = Some(modules);
        }

        config.validate()?;
        Ok(config)
    }

    /// Get the global configuration directory (~/.lunaris)
    pub fn global_config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".lunaris"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> ConfigResult<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                field: name.to_string(),
                reason: format!("expected a non-negative integer, got '{}'", raw),
            }),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Resolve the effective runtime settings
    pub fn runtime(&self) -> RuntimeConfig {
        RuntimeConfig::resolve(&self.global, &self.project)
    }

    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Check if this is a project (has lunaris.toml)
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }
}
