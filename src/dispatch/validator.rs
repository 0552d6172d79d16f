use std::time::Duration;

use tracing::{debug, warn};

use super::error::DispatchError;
use super::policy::DispatchPolicy;
use super::request::QueryRequest;
use crate::handlers::{ConfigBag, Fields, ModuleRegistry, RegisteredModule};

/// A query that passed validation and is ready for a handler.
#[derive(Clone)]
pub struct ValidatedRequest {
    pub module: RegisteredModule,
    pub fields: Fields,
    pub config: ConfigBag,
    pub timeout: Duration,
}

impl ValidatedRequest {
    pub fn name(&self) -> &str {
        &self.module.descriptor.name
    }
}

/// Check `request` against the registry and operator policy.
///
/// Checks run in order and stop at the first failure: module named and
/// registered, module enabled, at least one input field present. Options are
/// then layered over the operator defaults and filtered to the module's
/// accepted keys. Unknown option keys are dropped, never rejected. Operator-only
/// keys are only ever taken from the defaults.
pub fn validate(
    request: QueryRequest,
    registry: &ModuleRegistry,
    policy: &DispatchPolicy,
) -> Result<ValidatedRequest, DispatchError> {
    let QueryRequest {
        module,
        mut config,
        fields,
    } = request;

    let name = module.ok_or(DispatchError::MissingModule)?;
    let module = registry
        .resolve(&name)
        .map_err(|_| DispatchError::UnknownModule(name.clone()))?
        .clone();
    let descriptor = &module.descriptor;

    if !policy.is_enabled(&name) {
        return Err(DispatchError::ModuleDisabled(name));
    }

    let has_input = descriptor
        .required_input_fields
        .iter()
        .any(|field| fields.contains(field));
    if !has_input {
        return Err(DispatchError::missing_parameter(
            name,
            descriptor.required_input_fields.iter().cloned(),
        ));
    }

    let ignored = config.retain_keys(|key| !descriptor.operator_config.contains(key));
    if !ignored.is_empty() {
        warn!(module = %name, ?ignored, "Ignored operator-only config keys in query");
    }

    let defaults = policy
        .settings(&name)
        .map(|settings| settings.defaults())
        .unwrap_or_default();
    let mut config = defaults.merged_with(config);
    if !descriptor.accepts_config.is_empty() || !descriptor.operator_config.is_empty() {
        let dropped = config.retain_keys(|key| {
            descriptor.accepts_config.contains(key) || descriptor.operator_config.contains(key)
        });
        if !dropped.is_empty() {
            debug!(module = %name, ?dropped, "Dropped unrecognised config keys");
        }
    }

    let timeout = policy.timeout_for(descriptor);

    Ok(ValidatedRequest {
        module,
        fields,
        config,
        timeout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModuleSettings;
    use crate::handlers::{
        HandlerError, HandlerOutput, ModuleDescriptor, ModuleHandler,
    };
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    struct Noop;

    #[async_trait]
    impl ModuleHandler for Noop {
        async fn run(&self, _: Fields, _: ConfigBag) -> Result<HandlerOutput, HandlerError> {
            Ok(HandlerOutput::values("ok"))
        }
    }

    fn registry() -> ModuleRegistry {
        let mut registry = ModuleRegistry::new();
        registry
            .register(
                ModuleDescriptor::new("lookup")
                    .inputs(["domain", "hostname"])
                    .config(["apikey", "nameserver"])
                    .external(),
                Arc::new(Noop),
            )
            .unwrap();
        registry
            .register(ModuleDescriptor::new("open").inputs(["text"]), Arc::new(Noop))
            .unwrap();
        registry
            .register(
                ModuleDescriptor::new("fetch")
                    .inputs(["link"])
                    .operator_config(["archivepath"]),
                Arc::new(Noop),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_missing_module() {
        let request = QueryRequest::default().field("domain", "circl.lu");
        let err = validate(request, &registry(), &DispatchPolicy::default()).err().unwrap();
        assert!(matches!(err, DispatchError::MissingModule));
    }

    #[test]
    fn test_unknown_module() {
        let request = QueryRequest::new("nonexistent").field("domain", "circl.lu");
        let err = validate(request, &registry(), &DispatchPolicy::default()).err().unwrap();
        assert_eq!(err.to_string(), "unknown module: nonexistent");
    }

    #[test]
    fn test_disabled_module() {
        let policy = DispatchPolicy::default().with_module(
            "lookup",
            ModuleSettings {
                enabled: false,
                ..ModuleSettings::default()
            },
        );
        let request = QueryRequest::new("lookup").field("domain", "circl.lu");
        let err = validate(request, &registry(), &policy).err().unwrap();
        assert!(matches!(err, DispatchError::ModuleDisabled(name) if name == "lookup"));
    }

    #[test]
    fn test_missing_parameter() {
        let request = QueryRequest::new("lookup").field("ip-src", "8.8.8.8");
        let err = validate(request, &registry(), &DispatchPolicy::default()).err().unwrap();
        match err {
            DispatchError::MissingParameter { module, expected } => {
                assert_eq!(module, "lookup");
                assert_eq!(expected, vec!["domain", "hostname"]);
            }
            other => panic!("expected MissingParameter, got {other:?}"),
        }
    }

    #[test]
    fn test_config_merge_and_filter() {
        let policy = DispatchPolicy::default().with_module(
            "lookup",
            ModuleSettings {
                config: BTreeMap::from([
                    ("apikey".to_string(), "operator-key".to_string()),
                    ("nameserver".to_string(), "1.1.1.1".to_string()),
                ]),
                ..ModuleSettings::default()
            },
        );
        let request = QueryRequest::new("lookup")
            .field("domain", "circl.lu")
            .option("nameserver", "8.8.8.8")
            .option("verbose", "true");

        let validated = validate(request, &registry(), &policy).unwrap();
        assert_eq!(validated.config.get("apikey"), Some("operator-key"));
        assert_eq!(validated.config.get("nameserver"), Some("8.8.8.8"));
        assert!(!validated.config.contains("verbose"));
        assert_eq!(validated.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_empty_allow_list_keeps_options() {
        let request = QueryRequest::new("open")
            .field("text", "hello")
            .option("anything", "goes");

        let validated = validate(request, &registry(), &DispatchPolicy::default()).unwrap();
        assert_eq!(validated.config.get("anything"), Some("goes"));
        assert_eq!(validated.name(), "open");
        assert_eq!(validated.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_query_cannot_set_operator_options() {
        let request = QueryRequest::new("fetch")
            .field("link", "https://circl.lu")
            .option("archivepath", "/etc")
            .option("verbose", "true");

        let validated = validate(request.clone(), &registry(), &DispatchPolicy::default()).unwrap();
        assert!(validated.config.is_empty());

        let policy = DispatchPolicy::default().with_module(
            "fetch",
            ModuleSettings {
                config: BTreeMap::from([(
                    "archivepath".to_string(),
                    "/var/cache/enrichbox".to_string(),
                )]),
                ..ModuleSettings::default()
            },
        );
        let validated = validate(request, &registry(), &policy).unwrap();
        assert_eq!(validated.config.get("archivepath"), Some("/var/cache/enrichbox"));
        assert_eq!(validated.config.len(), 1);
    }
}
