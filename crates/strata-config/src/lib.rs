//! Configuration system for the Strata session service.
//!
//! Provides TOML-based configuration with:
//! - Session cookie and lifetime settings (`[session]`)
//! - In-process cache tier sizing (`[cache]`)
//! - Durable store location (`[store]`)
//! - Server bind address and logging (`[server]`, `[logging]`)
//! - Config file layering (XDG user config + project-local overrides)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigLayer, ConfigSource, LoadedConfig, load_config, load_config_file,
    load_config_with_options, user_config_dir, user_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
