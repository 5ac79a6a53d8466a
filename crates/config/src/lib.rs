//! Configuration loading, validation, and env substitution.
//!
//! Config files: `selfbot.toml`, `selfbot.yaml`, `selfbot.yml`, or `selfbot.json`
//! Searched in `./` then the user config directory.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-default}` substitution in the raw file.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{
        clear_config_dir, clear_data_dir, config_dir, data_dir, discover_and_load,
        find_or_default_config_path, load_config, save_config, set_config_dir, set_data_dir,
    },
    schema::{
        MiddlewareConfig, PluginsConfig, RateLimitConfig, RuntimeConfig, SchedulerConfig,
        SelfbotConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate_config},
};
