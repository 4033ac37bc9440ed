//! Configuration module
//!
//! - types.rs: `BridgeConfig` and logging settings
//! - io.rs: Configuration loading and saving
//! - validation.rs: Configuration validation
//! - paths.rs: Configuration file paths

mod io;
mod paths;
mod types;
mod validation;

pub use types::{BridgeConfig, LogConfig, DEFAULT_RECONNECT_INTERVAL};

pub use io::{apply_env_overrides, load_config, load_config_from, load_config_from_path, save_config};
pub use paths::{config_path, CONFIG_PATH_ENV};
pub use validation::{validate_config, ConfigValidationResult, ValidationIssue};
