use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::traits::ModuleHandler;

/// Static capability metadata of a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub name: String,
    pub description: String,
    /// At least one of these must be present in a query
    pub required_input_fields: BTreeSet<String>,
    /// Recognised option names; empty means the module takes any options
    pub accepts_config: BTreeSet<String>,
    /// Options taken only from operator settings, never from a query
    pub operator_config: BTreeSet<String>,
    pub makes_external_call: bool,
    /// Module-specific budget, overrides the class default
    pub timeout: Option<Duration>,
    /// Module needs an operator prompt before it runs
    pub request_on_query: bool,
}

impl ModuleDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            required_input_fields: BTreeSet::new(),
            accepts_config: BTreeSet::new(),
            operator_config: BTreeSet::new(),
            makes_external_call: false,
            timeout: None,
            request_on_query: false,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn inputs<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_input_fields
            .extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn config<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accepts_config.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn operator_config<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.operator_config.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn external(mut self) -> Self {
        self.makes_external_call = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn request_on_query(mut self) -> Self {
        self.request_on_query = true;
        self
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown module: {0}")]
    UnknownModule(String),
    #[error("module already registered: {0}")]
    DuplicateModule(String),
}

/// A registered module: descriptor plus the handler serving it
#[derive(Clone)]
pub struct RegisteredModule {
    pub descriptor: Arc<ModuleDescriptor>,
    pub handler: Arc<dyn ModuleHandler>,
}

/// Registry mapping module names to handlers.
///
/// Populated once at startup, then shared read-only behind an `Arc`.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, RegisteredModule>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        descriptor: ModuleDescriptor,
        handler: Arc<dyn ModuleHandler>,
    ) -> Result<(), RegistryError> {
        if self.modules.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateModule(descriptor.name));
        }

        tracing::debug!(module = %descriptor.name, "Registered module");
        self.modules.insert(
            descriptor.name.clone(),
            RegisteredModule {
                descriptor: Arc::new(descriptor),
                handler,
            },
        );
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<&RegisteredModule, RegistryError> {
        self.modules
            .get(name)
            .ok_or_else(|| RegistryError::UnknownModule(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Descriptors in name order. Each call starts a fresh iteration.
    pub fn list(&self) -> impl Iterator<Item = &ModuleDescriptor> + '_ {
        self.modules.values().map(|module| module.descriptor.as_ref())
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Registry with the built-in modules
    pub fn with_builtins() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for (descriptor, handler) in super::builtin::all() {
            registry.register(descriptor, handler)?;
        }
        Ok(registry)
    }
}
