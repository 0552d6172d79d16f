use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::{Config, ModuleSettings};
use crate::handlers::ModuleDescriptor;

/// Operator policy consulted while validating a query: execution budgets and
/// per-module settings. Read-only after startup.
#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    pub default_timeout: Duration,
    pub local_timeout: Duration,
    modules: BTreeMap<String, ModuleSettings>,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl DispatchPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_timeout: config.dispatch.default_timeout.into(),
            local_timeout: config.dispatch.local_timeout.into(),
            modules: config.modules.clone(),
        }
    }

    pub fn with_module(mut self, name: impl Into<String>, settings: ModuleSettings) -> Self {
        self.modules.insert(name.into(), settings);
        self
    }

    pub fn settings(&self, module: &str) -> Option<&ModuleSettings> {
        self.modules.get(module)
    }

    pub fn is_enabled(&self, module: &str) -> bool {
        self.settings(module).is_none_or(|settings| settings.enabled)
    }

    /// Budget for `descriptor`: configured override, then the descriptor's
    /// own timeout, then the class default.
    pub fn timeout_for(&self, descriptor: &ModuleDescriptor) -> Duration {
        self.settings(&descriptor.name)
            .and_then(ModuleSettings::timeout)
            .or(descriptor.timeout)
            .unwrap_or(if descriptor.makes_external_call {
                self.default_timeout
            } else {
                self.local_timeout
            })
    }
}
