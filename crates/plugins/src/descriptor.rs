//! Declarative config schema per plugin kind and its resolution into a typed
//! [`PluginConfig`].

use std::collections::BTreeMap;

use {
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
    tracing::debug,
};

use crate::{
    error::{Error, Result},
    plugin::Capability,
};

/// Scalar type of one config field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Bool,
    String,
    Number,
    /// Single choice from `options`.
    Enum,
    /// Any subset of `options`.
    Array,
}

/// A typed config value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Number(f64),
    String(String),
    Choices(Vec<String>),
}

impl ConfigValue {
    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::String(s) => Value::String(s.clone()),
            Self::Choices(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub default: ConfigValue,
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl ConfigField {
    pub fn bool(name: &str, default: bool, description: &str) -> Self {
        Self::build(name, FieldType::Bool, ConfigValue::Bool(default), description, &[])
    }

    pub fn string(name: &str, default: &str, description: &str) -> Self {
        Self::build(
            name,
            FieldType::String,
            ConfigValue::String(default.to_string()),
            description,
            &[],
        )
    }

    pub fn number(name: &str, default: f64, description: &str) -> Self {
        Self::build(name, FieldType::Number, ConfigValue::Number(default), description, &[])
    }

    pub fn choice(name: &str, options: &[&str], default: &str, description: &str) -> Self {
        Self::build(
            name,
            FieldType::Enum,
            ConfigValue::String(default.to_string()),
            description,
            options,
        )
    }

    pub fn choices(name: &str, options: &[&str], default: &[&str], description: &str) -> Self {
        Self::build(
            name,
            FieldType::Array,
            ConfigValue::Choices(default.iter().map(|s| s.to_string()).collect()),
            description,
            options,
        )
    }

    fn build(
        name: &str,
        field_type: FieldType,
        default: ConfigValue,
        description: &str,
        options: &[&str],
    ) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            default,
            description: description.to_string(),
            options: options.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn allows(&self, option: &str) -> bool {
        self.options.is_empty() || self.options.iter().any(|o| o == option)
    }

    fn coerce(&self, plugin: &str, value: &Value) -> Result<ConfigValue> {
        let mismatch = |expected: &str| {
            Error::invalid_config(plugin, &self.name, format!("expected {expected}, got {value}"))
        };
        match self.field_type {
            FieldType::Bool => value.as_bool().map(ConfigValue::Bool).ok_or_else(|| mismatch("a boolean")),
            FieldType::Number => value.as_f64().map(ConfigValue::Number).ok_or_else(|| mismatch("a number")),
            FieldType::String => value
                .as_str()
                .map(|s| ConfigValue::String(s.to_string()))
                .ok_or_else(|| mismatch("a string")),
            FieldType::Enum => {
                let choice = value.as_str().ok_or_else(|| mismatch("a string"))?;
                if !self.allows(choice) {
                    return Err(Error::invalid_config(
                        plugin,
                        &self.name,
                        format!("{choice:?} is not one of {:?}", self.options),
                    ));
                }
                Ok(ConfigValue::String(choice.to_string()))
            },
            FieldType::Array => {
                let items = value.as_array().ok_or_else(|| mismatch("a list"))?;
                let mut choices = Vec::with_capacity(items.len());
                for item in items {
                    let choice = item.as_str().ok_or_else(|| mismatch("a list of strings"))?;
                    if !self.allows(choice) {
                        return Err(Error::invalid_config(
                            plugin,
                            &self.name,
                            format!("{choice:?} is not one of {:?}", self.options),
                        ));
                    }
                    choices.push(choice.to_string());
                }
                Ok(ConfigValue::Choices(choices))
            },
        }
    }
}

/// Immutable metadata registered alongside a plugin factory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginDescriptor {
    pub name: String,
    pub capability: Capability,
    pub description: String,
    pub fields: Vec<ConfigField>,
}

impl PluginDescriptor {
    pub fn new(name: &str, capability: Capability) -> Self {
        Self {
            name: name.to_string(),
            capability,
            description: String::new(),
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    #[must_use]
    pub fn field(mut self, field: ConfigField) -> Self {
        self.fields.push(field);
        self
    }

    /// Default value of every declared field, as a raw config map.
    pub fn defaults(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.default.to_json()))
            .collect()
    }

    /// Validate a raw key→value map against the declared fields.
    ///
    /// Every declared field is present in the result. Missing or null raw
    /// values take the default; unknown keys are ignored.
    pub fn resolve(&self, raw: &Map<String, Value>) -> Result<PluginConfig> {
        for key in raw.keys() {
            if !self.fields.iter().any(|f| &f.name == key) {
                debug!(plugin = %self.name, key = %key, "ignoring unknown config key");
            }
        }

        let mut values = BTreeMap::new();
        for field in &self.fields {
            let value = match raw.get(&field.name) {
                None | Some(Value::Null) => field.default.clone(),
                Some(value) => field.coerce(&self.name, value)?,
            };
            values.insert(field.name.clone(), value);
        }
        Ok(PluginConfig {
            plugin: self.name.clone(),
            values,
        })
    }
}

/// Validated config handed to [`crate::Plugin::init`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginConfig {
    plugin: String,
    values: BTreeMap<String, ConfigValue>,
}

impl PluginConfig {
    fn get(&self, name: &str) -> Result<&ConfigValue> {
        self.values
            .get(name)
            .ok_or_else(|| Error::invalid_config(&self.plugin, name, "no such field"))
    }

    fn wrong_type(&self, name: &str, expected: &str) -> Error {
        Error::invalid_config(&self.plugin, name, format!("field is not {expected}"))
    }

    pub fn bool(&self, name: &str) -> Result<bool> {
        match self.get(name)? {
            ConfigValue::Bool(b) => Ok(*b),
            _ => Err(self.wrong_type(name, "a boolean")),
        }
    }

    pub fn number(&self, name: &str) -> Result<f64> {
        match self.get(name)? {
            ConfigValue::Number(n) => Ok(*n),
            _ => Err(self.wrong_type(name, "a number")),
        }
    }

    /// A non-negative number truncated to `usize`.
    pub fn usize(&self, name: &str) -> Result<usize> {
        let n = self.number(name)?;
        if n < 0.0 || !n.is_finite() {
            return Err(self.wrong_type(name, "a non-negative number"));
        }
        Ok(n as usize)
    }

    pub fn str(&self, name: &str) -> Result<&str> {
        match self.get(name)? {
            ConfigValue::String(s) => Ok(s),
            _ => Err(self.wrong_type(name, "a string")),
        }
    }

    /// Single-choice field.
    pub fn choice(&self, name: &str) -> Result<&str> {
        self.str(name)
    }

    /// Multi-choice field.
    pub fn choices(&self, name: &str) -> Result<&[String]> {
        match self.get(name)? {
            ConfigValue::Choices(items) => Ok(items),
            _ => Err(self.wrong_type(name, "a list")),
        }
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn descriptor() -> PluginDescriptor {
        PluginDescriptor::new("tts", Capability::Consumer)
            .field(ConfigField::string("voice", "zh-CN-XiaoxiaoNeural", "voice"))
            .field(ConfigField::number("queue_size", 100.0, "queue capacity"))
            .field(ConfigField::bool("enabled_sound", true, "sound"))
            .field(ConfigField::choice("player", &["auto", "mpv"], "auto", "player"))
            .field(ConfigField::choices("types", &["Chat", "Gift"], &["Chat", "Gift"], "kinds"))
    }

    fn raw(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn missing_fields_take_defaults() {
        let cfg = descriptor().resolve(&Map::new()).unwrap();
        assert_eq!(cfg.str("voice").unwrap(), "zh-CN-XiaoxiaoNeural");
        assert_eq!(cfg.usize("queue_size").unwrap(), 100);
        assert!(cfg.bool("enabled_sound").unwrap());
        assert_eq!(cfg.choice("player").unwrap(), "auto");
        assert_eq!(cfg.choices("types").unwrap(), ["Chat", "Gift"]);
    }

    #[test]
    fn raw_values_override_defaults() {
        let cfg = descriptor()
            .resolve(&raw(json!({
                "queue_size": 5,
                "player": "mpv",
                "types": ["Gift"],
                "voice": null,
                "unknown": 1
            })))
            .unwrap();
        assert_eq!(cfg.usize("queue_size").unwrap(), 5);
        assert_eq!(cfg.choice("player").unwrap(), "mpv");
        assert_eq!(cfg.choices("types").unwrap(), ["Gift"]);
        assert_eq!(cfg.str("voice").unwrap(), "zh-CN-XiaoxiaoNeural");
    }

    #[test]
    fn wrong_type_is_invalid_config() {
        let err = descriptor()
            .resolve(&raw(json!({"queue_size": "lots"})))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { ref field, .. } if field == "queue_size"));
    }

    #[test]
    fn option_outside_allowed_set_is_rejected() {
        let err = descriptor()
            .resolve(&raw(json!({"types": ["Chat", "Dance"]})))
            .unwrap_err();
        assert!(err.to_string().contains("Dance"));
        assert!(descriptor().resolve(&raw(json!({"player": "vlc"}))).is_err());
    }

    #[test]
    fn unknown_field_access_errors() {
        let cfg = descriptor().resolve(&Map::new()).unwrap();
        assert!(cfg.bool("nope").is_err());
        assert!(cfg.bool("voice").is_err());
    }

    #[test]
    fn defaults_round_into_resolve() {
        let d = descriptor();
        let cfg = d.resolve(&d.defaults()).unwrap();
        assert_eq!(cfg, d.resolve(&Map::new()).unwrap());
    }
}
