use serde::Deserialize;

use crate::handlers::{ConfigBag, Fields};

/// Inbound query: `{"module": name, <field>: value, ..., "config": {...}}`.
///
/// Everything besides `module` and `config` is an indicator field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRequest {
    #[serde(default, deserialize_with = "module_name")]
    pub module: Option<String>,
    #[serde(default)]
    pub config: ConfigBag,
    #[serde(flatten)]
    pub fields: Fields,
}

impl QueryRequest {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: Some(module.into()),
            ..Self::default()
        }
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<crate::handlers::Value>) -> Self {
        self.fields.insert(key, value);
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key, value);
        self
    }
}

/// Non-string and blank module names count as absent.
fn module_name<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(name) if !name.trim().is_empty() => Some(name.trim().to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fields_are_flattened() {
        let request: QueryRequest = serde_json::from_value(json!({
            "module": "dns",
            "hostname": "www.circl.lu",
            "config": {"nameserver": "8.8.8.8"}
        }))
        .unwrap();

        assert_eq!(request.module.as_deref(), Some("dns"));
        assert_eq!(request.fields.len(), 1);
        assert_eq!(request.fields.str("hostname"), Some("www.circl.lu"));
        assert_eq!(request.config.get("nameserver"), Some("8.8.8.8"));
    }

    #[test]
    fn test_missing_and_blank_module() {
        let request: QueryRequest =
            serde_json::from_value(json!({"hostname": "circl.lu"})).unwrap();
        assert!(request.module.is_none());

        let request: QueryRequest =
            serde_json::from_value(json!({"module": "  ", "hostname": "circl.lu"})).unwrap();
        assert!(request.module.is_none());

        let request: QueryRequest = serde_json::from_value(json!({"module": 42})).unwrap();
        assert!(request.module.is_none());
    }

    #[test]
    fn test_null_config() {
        let request: QueryRequest =
            serde_json::from_value(json!({"module": "dns", "config": null})).unwrap();
        assert!(request.config.is_empty());
        assert!(request.fields.is_empty());
    }

    #[test]
    fn test_non_object_config_is_empty() {
        let request: QueryRequest = serde_json::from_value(json!({
            "module": "dns",
            "hostname": "circl.lu",
            "config": "not-a-map"
        }))
        .unwrap();
        assert!(request.config.is_empty());
        assert_eq!(request.fields.len(), 1);
        assert!(!request.fields.contains("config"));
    }
}
