//! Configuration management for enrichbox
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use enrichbox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `ENRICHBOX__<section>__<key>`
//!
//! Examples:
//! - `ENRICHBOX__SERVER__BIND_ADDR=0.0.0.0:6666`
//! - `ENRICHBOX__DISPATCH__DEFAULT_TIMEOUT=45s`
//! - `ENRICHBOX__SERVER__MAX_PAYLOAD_BYTES=50MB`
//!
//! Module secrets use `ENRICHBOX_SECRET__<module>__<key>` and land in the
//! module's default options.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/enrichbox.toml`.
//! This can be overridden using the `ENRICHBOX_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::{ByteSize, HumanDuration};
pub use models::{Config, DispatchConfig, ModuleSettings, ServerConfig, TelemetryConfig};
pub use validation::ValidationError;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`ENRICHBOX__*`, `ENRICHBOX_SECRET__*`)
    /// 2. TOML file (default: `config/enrichbox.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or
    /// validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// `.env` and the environment still apply, secrets included.
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_path(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Names of configured modules missing from `known`
    pub fn unknown_modules<'a>(
        &'a self,
        known: impl Fn(&str) -> bool + 'a,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.modules
            .keys()
            .map(String::as_str)
            .filter(move |name| !known(*name))
    }
}
