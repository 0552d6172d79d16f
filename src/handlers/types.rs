use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Result value produced by a module.
///
/// Closed over the shapes handlers actually return: a module can answer with
/// a string, a number, a boolean, a list or a nested mapping. There is no
/// null; absent data is expressed by leaving `data` unset on the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a decoded JSON value, dropping nulls.
    ///
    /// Returns `None` for a bare `null`; nulls nested inside arrays or
    /// objects are skipped.
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(Value::Bool(b)),
            serde_json::Value::Number(n) => Some(Value::Number(n)),
            serde_json::Value::String(s) => Some(Value::String(s)),
            serde_json::Value::Array(items) => Some(Value::List(
                items.into_iter().filter_map(Value::from_json).collect(),
            )),
            serde_json::Value::Object(map) => Some(Value::Map(
                map.into_iter()
                    .filter_map(|(k, v)| Value::from_json(v).map(|v| (k, v)))
                    .collect(),
            )),
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value.into())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::List(values.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            other => match serde_json::to_string(other) {
                Ok(json) => f.write_str(&json),
                Err(_) => Err(fmt::Error),
            },
        }
    }
}

/// Indicator fields of a query, keyed by attribute type
/// (`ip-dst`, `domain`, `md5`, `attachment`, ...).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(BTreeMap<String, Value>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String value of `key`, ignoring blank strings.
    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// First non-blank string among `keys`, together with the key that matched.
    pub fn first_str<'a>(&'a self, keys: &[&'a str]) -> Option<(&'a str, &'a str)> {
        keys.iter().find_map(|key| self.str(key).map(|value| (*key, value)))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for Fields {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
        Ok(Fields(
            raw.into_iter()
                .filter_map(|(k, v)| Value::from_json(v).map(|v| (k, v)))
                .collect(),
        ))
    }
}

/// Per-module option bag (API keys, custom endpoints, nameservers).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigBag(BTreeMap<String, String>);

impl ConfigBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Option value, ignoring blank strings.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keep only the keys accepted by `allowed`, returning the dropped ones.
    pub fn retain_keys(&mut self, allowed: impl Fn(&str) -> bool) -> Vec<String> {
        let dropped: Vec<String> = self
            .0
            .keys()
            .filter(|key| !allowed(key))
            .cloned()
            .collect();
        for key in &dropped {
            self.0.remove(key);
        }
        dropped
    }

    /// Layer `overrides` on top of `self`.
    pub fn merged_with(mut self, overrides: ConfigBag) -> Self {
        self.0.extend(overrides.0);
        self
    }
}

impl From<BTreeMap<String, String>> for ConfigBag {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl<'de> Deserialize<'de> for ConfigBag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Anything but an object (null, a string, a list) carries no options.
        let serde_json::Value::Object(raw) = serde_json::Value::deserialize(deserializer)? else {
            return Ok(ConfigBag::default());
        };
        let options = raw
            .into_iter()
            .filter_map(|(key, value)| match value {
                serde_json::Value::String(s) => Some((key, s)),
                serde_json::Value::Number(n) => Some((key, n.to_string())),
                serde_json::Value::Bool(b) => Some((key, b.to_string())),
                _ => None,
            })
            .collect();
        Ok(ConfigBag(options))
    }
}

/// Successful module output: `values` always, `data` when the module returns
/// a secondary payload (typically base64 content).
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerOutput {
    pub values: Value,
    pub data: Option<Value>,
}

impl HandlerOutput {
    pub fn values(values: impl Into<Value>) -> Self {
        Self {
            values: values.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_from_json_drops_nulls() {
        assert_eq!(Value::from_json(json!(null)), None);

        let value = Value::from_json(json!({"a": null, "b": [1, null, "x"]})).unwrap();
        let Value::Map(map) = value else {
            panic!("expected map");
        };
        assert!(!map.contains_key("a"));
        assert_eq!(map["b"], Value::List(vec![Value::from(1), Value::from("x")]));
    }

    #[test]
    fn test_value_serializes_untagged() {
        let value = Value::from(vec!["149.13.33.14"]);
        assert_eq!(serde_json::to_value(&value).unwrap(), json!(["149.13.33.14"]));
        assert_eq!(serde_json::to_value(Value::from(true)).unwrap(), json!(true));
    }

    #[test]
    fn test_fields_deserialize_skips_null() {
        let fields: Fields =
            serde_json::from_value(json!({"domain": "circl.lu", "ip-src": null})).unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.str("domain"), Some("circl.lu"));
        assert!(!fields.contains("ip-src"));
    }

    #[test]
    fn test_fields_first_str_skips_blank() {
        let fields = Fields::new().with("hostname", "  ").with("domain", "circl.lu");
        assert_eq!(
            fields.first_str(&["hostname", "domain"]),
            Some(("domain", "circl.lu"))
        );
    }

    #[test]
    fn test_config_bag_coerces_scalars() {
        let bag: ConfigBag = serde_json::from_value(
            json!({"apikey": "k", "port": 53, "verbose": true, "nested": {"x": 1}}),
        )
        .unwrap();
        assert_eq!(bag.get("apikey"), Some("k"));
        assert_eq!(bag.get("port"), Some("53"));
        assert_eq!(bag.get("verbose"), Some("true"));
        assert!(!bag.contains("nested"));
    }

    #[test]
    fn test_config_bag_null_is_empty() {
        let bag: ConfigBag = serde_json::from_value(json!(null)).unwrap();
        assert!(bag.is_empty());
    }

    #[test]
    fn test_config_bag_non_object_is_empty() {
        for raw in [json!("not-a-map"), json!([1, 2]), json!(42), json!(true)] {
            let bag: ConfigBag = serde_json::from_value(raw.clone()).unwrap();
            assert!(bag.is_empty(), "{raw}");
        }
    }

    #[test]
    fn test_config_bag_merge_and_retain() {
        let defaults = ConfigBag::new()
            .with("nameserver", "1.1.1.1")
            .with("timeout", "5");
        let merged = defaults.merged_with(ConfigBag::new().with("nameserver", "8.8.8.8"));
        assert_eq!(merged.get("nameserver"), Some("8.8.8.8"));

        let mut merged = merged;
        let dropped = merged.retain_keys(|key| key == "nameserver");
        assert_eq!(dropped, vec!["timeout".to_string()]);
        assert_eq!(merged.len(), 1);
    }
}
