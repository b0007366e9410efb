//! Lunaris Configuration System
//!
//! Provides configuration management for embedders of the Lunaris runtime:
//! - Project configuration (lunaris.toml)
//! - Global user configuration (~/.lunaris/config.toml)
//! - Configuration precedence and merging
//! - The resolved [`RuntimeConfig`] handed to the runtime
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Global config (~/.lunaris/config.toml)
//! 3. Project config (./lunaris.toml)
//! 4. Environment variables (LUNARIS_*)
//!
//! # Example
//!
//! ```no_run
//! use lunaris_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! let runtime_config = config.runtime();
//! assert!(runtime_config.max_call_depth > 0);
//! ```

pub mod global;
pub mod loader;
pub mod project;
pub mod runtime;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use global::GlobalConfig;
pub use loader::{Config, ConfigLoader};
pub use project::ProjectConfig;
pub use runtime::{ModuleSet, RuntimeConfig};
