use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::{Path, PathBuf};

const CONFIG_ENV_VAR: &str = "ENRICHBOX_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/enrichbox.toml";
const ENV_PREFIX: &str = "ENRICHBOX";
const ENV_SEPARATOR: &str = "__";
const SECRET_PREFIX: &str = "ENRICHBOX_SECRET__";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    load_env_file(None);
    read(config_path())
}

/// Same layering as [`load`] with an explicit TOML path
pub fn load_from_path(config_path: PathBuf) -> Result<Config, ConfigError> {
    load_env_file(None);
    read(config_path)
}

/// Export a `.env` file into the process environment.
///
/// `None` searches the working directory and its parents. Variables already
/// set win over the file. A missing file is fine.
pub fn load_env_file(path: Option<&Path>) {
    let result = match path {
        Some(path) => dotenvy::from_path(path),
        None => dotenvy::dotenv().map(|_| ()),
    };
    if let Err(err) = result {
        if !err.not_found() {
            tracing::warn!(error = %err, "Failed to read .env file");
        }
    }
}

fn read(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut config = load_from_sources(config_path)?;
    load_secrets(&mut config, env::vars());
    Ok(config)
}

/// Path of the TOML file, `ENRICHBOX_CONFIG` or the default location
pub fn config_path() -> PathBuf {
    env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Copy module secrets into `modules.<module>.config.<key>`.
///
/// `ENRICHBOX_SECRET__VIRUSTOTAL__APIKEY=...` becomes
/// `modules.virustotal.config.apikey`. Secrets never come from files.
pub fn load_secrets(config: &mut Config, vars: impl IntoIterator<Item = (String, String)>) {
    for (name, value) in vars {
        let Some(rest) = name.strip_prefix(SECRET_PREFIX) else {
            continue;
        };
        let Some((module, key)) = rest.split_once(ENV_SEPARATOR) else {
            tracing::warn!(variable = %name, "Ignoring malformed secret variable");
            continue;
        };
        if module.is_empty() || key.is_empty() {
            tracing::warn!(variable = %name, "Ignoring malformed secret variable");
            continue;
        }

        config
            .modules
            .entry(module.to_lowercase())
            .or_default()
            .config
            .insert(key.to_lowercase(), value);
    }
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // ENRICHBOX__SERVER__BIND_ADDR -> server.bind_addr
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
