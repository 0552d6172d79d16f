use crate::handlers::ConfigBag;
use crate::humanize::{ByteSize, HumanDuration};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Per-module overrides keyed by module name
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleSettings>,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Request body cap, measured after gzip decompression
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: ByteSize,
    /// Queries processed concurrently across all modules
    #[serde(default = "default_max_concurrent_queries")]
    pub max_concurrent_queries: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_payload_bytes: default_max_payload_bytes(),
            max_concurrent_queries: default_max_concurrent_queries(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6666))
}

fn default_max_payload_bytes() -> ByteSize {
    ByteSize::mib(25)
}

fn default_max_concurrent_queries() -> usize {
    64
}

/// Execution budgets applied by the dispatcher
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchConfig {
    /// Budget for modules calling external services
    #[serde(default = "default_timeout")]
    pub default_timeout: HumanDuration,
    /// Budget for modules that run locally
    #[serde(default = "default_local_timeout")]
    pub local_timeout: HumanDuration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_timeout: default_timeout(),
            local_timeout: default_local_timeout(),
        }
    }
}

fn default_timeout() -> HumanDuration {
    HumanDuration::secs(30)
}

fn default_local_timeout() -> HumanDuration {
    HumanDuration::secs(10)
}

/// Operator settings for one module
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModuleSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub timeout: Option<HumanDuration>,
    /// Default option values; request values override them
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

impl Default for ModuleSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            timeout: None,
            config: BTreeMap::new(),
        }
    }
}

impl ModuleSettings {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from)
    }

    pub fn defaults(&self) -> ConfigBag {
        ConfigBag::from(self.config.clone())
    }
}

fn default_enabled() -> bool {
    true
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive, `RUST_LOG` takes precedence
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}
