//! Global Configuration (~/.lunaris/config.toml)
//!
//! Handles user-level defaults stored in `~/.lunaris/config.toml`.

use crate::project::{CoroutineConfig, VmConfig};
use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global user configuration from ~/.lunaris/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Default processor limits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vm: Option<VmConfig>,

    /// Default coroutine scheduling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coroutines: Option<CoroutineConfig>,
}

impl GlobalConfig {
    /// Load global configuration from a file
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

    /// Validate the global configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(vm) = &self.vm {
            vm.validate()?;
        }
        Ok(())
    }

    /// Get the global config file path (~/.lunaris/config.toml)
    pub fn global_config_path() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".lunaris").join("config.toml"))
    }

    /// Merge another global config into this one
    /// Other config takes precedence for non-None values
    pub fn merge(&mut self, other: &GlobalConfig) {
        if let Some(vm) = &other.vm {
            self.vm.get_or_insert_with(Default::default).merge(vm);
        }
        if other.coroutines.is_some() {
            self.coroutines = other.coroutines.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_global_config() {
        let toml = r#"
[vm]
max_native_nesting = 50

[coroutines]
auto_yield = 250
"#;

        let config: GlobalConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.vm.unwrap().max_native_nesting, Some(50));
    }

    #[test]
    fn test_global_rejects_modules_section() {
        let toml = r#"
[modules]
base = false
"#;
        assert!(toml::from_str::<GlobalConfig>(toml).is_err());
    }

    #[test]
    fn test_invalid_nesting_value() {
        let config = GlobalConfig {
            vm: Some(VmConfig {
                max_native_nesting: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_merge_configs() {
        let mut base = GlobalConfig::default();
        let other = GlobalConfig {
            coroutines: Some(CoroutineConfig {
                auto_yield: Some(10),
            }),
            ..Default::default()
        };

        base.merge(&other);
        assert_eq!(base.coroutines.unwrap().auto_yield, Some(10));
    }
}
