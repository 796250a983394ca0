use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

use crate::{PROVIDER_BASE_URL, PROVIDER_DEFAULT_MODEL};

/// What the widget knows about the saved key. Never carries the raw secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub masked_key: Option<String>,
    pub is_valid: bool,
    pub last_updated: Option<String>,
    pub instance_id: Option<String>,
}

impl CredentialRecord {
    pub fn has_saved_key(&self) -> bool {
        self.masked_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }
}

/// JSON document stored in the settings instance `value` column.
///
/// Only `apiKey` and `enabled` are interpreted, and both tolerate any JSON
/// shape. Everything else (`baseUrl`, `requestTimeout` and friends, plus
/// keys nobody here knows about) belongs to the host's settings schema and
/// is carried through verbatim in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialValue {
    #[serde(default, deserialize_with = "lenient_string")]
    pub api_key: String,
    #[serde(default = "default_enabled", deserialize_with = "lenient_enabled")]
    pub enabled: bool,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Default for CredentialValue {
    fn default() -> Self {
        let mut value = Self {
            api_key: String::new(),
            enabled: default_enabled(),
            fields: Map::new(),
        };
        value.fill_placeholders();
        value
    }
}

impl CredentialValue {
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Accepts either the JSON-encoded string the backend stores or an
    /// already-decoded object. Anything else yields `None`.
    pub fn from_stored(value: &Value) -> Option<Self> {
        match value {
            Value::String(raw) => {
                let parsed = serde_json::from_str::<Value>(raw).ok()?;
                Self::from_stored(&parsed)
            }
            Value::Object(_) => {
                let mut parsed: Self = serde_json::from_value(value.clone()).ok()?;
                parsed.fill_placeholders();
                Some(parsed)
            }
            _ => None,
        }
    }

    /// Adds schema defaults for absent placeholder fields. Present ones are
    /// left alone whatever their shape.
    fn fill_placeholders(&mut self) {
        let defaults = [
            ("baseUrl", json!(PROVIDER_BASE_URL)),
            ("defaultModel", json!(PROVIDER_DEFAULT_MODEL)),
            ("modelPreferences", json!({})),
            ("requestTimeout", json!(30)),
            ("maxRetries", json!(3)),
        ];
        for (key, default) in defaults {
            self.fields.entry(key).or_insert(default);
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        _ => String::new(),
    })
}

fn lenient_enabled<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(flag) => flag,
        Value::String(s) => !matches!(s.trim().to_ascii_lowercase().as_str(), "false" | "0" | "no"),
        Value::Number(n) => n.as_f64() != Some(0.0),
        _ => default_enabled(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_value_matches_host_schema() {
        let value = serde_json::to_value(CredentialValue::default()).expect("serialize");
        assert_eq!(
            value,
            json!({
                "apiKey": "",
                "enabled": true,
                "baseUrl": "https://openrouter.ai/api/v1",
                "defaultModel": "openai/gpt-3.5-turbo",
                "modelPreferences": {},
                "requestTimeout": 30,
                "maxRetries": 3
            })
        );
    }

    #[test]
    fn from_stored_accepts_json_string_and_object() {
        let object = json!({"apiKey": "sk-or-****abcd", "enabled": false});
        let encoded = Value::String(object.to_string());

        let a = CredentialValue::from_stored(&object).expect("object");
        let b = CredentialValue::from_stored(&encoded).expect("string");
        assert_eq!(a, b);
        assert_eq!(a.api_key, "sk-or-****abcd");
        assert!(!a.enabled);
        assert_eq!(a.fields["maxRetries"], 3);
    }

    #[test]
    fn from_stored_rejects_scalars() {
        assert!(CredentialValue::from_stored(&json!(42)).is_none());
        assert!(CredentialValue::from_stored(&json!("not json")).is_none());
    }

    #[test]
    fn odd_placeholder_shapes_keep_the_key() {
        let stored = json!({
            "apiKey": "sk-or-v1****wxyz",
            "modelPreferences": null,
            "requestTimeout": "30",
            "maxRetries": -1
        });
        let value = CredentialValue::from_stored(&stored).expect("parse");
        assert_eq!(value.api_key, "sk-or-v1****wxyz");
        assert!(value.enabled);

        let back = serde_json::to_value(&value).expect("serialize");
        assert_eq!(back["modelPreferences"], Value::Null);
        assert_eq!(back["requestTimeout"], "30");
        assert_eq!(back["maxRetries"], -1);
        assert_eq!(back["baseUrl"], "https://openrouter.ai/api/v1");
    }

    #[test]
    fn non_string_key_and_enabled_fall_back() {
        let stored = json!({"apiKey": null, "enabled": "false"});
        let value = CredentialValue::from_stored(&stored).expect("parse");
        assert!(value.api_key.is_empty());
        assert!(!value.enabled);

        let stored = json!({"apiKey": 7, "enabled": null});
        let value = CredentialValue::from_stored(&stored).expect("parse");
        assert!(value.api_key.is_empty());
        assert!(value.enabled);
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let stored = json!({"apiKey": "", "customFlag": "keep-me"});
        let value = CredentialValue::from_stored(&stored).expect("parse");
        let back = serde_json::to_value(&value).expect("serialize");
        assert_eq!(back["customFlag"], "keep-me");
    }

    #[test]
    fn has_saved_key_ignores_blank_mask() {
        let mut record = CredentialRecord::default();
        assert!(!record.has_saved_key());
        record.masked_key = Some("  ".to_string());
        assert!(!record.has_saved_key());
        record.masked_key = Some("sk-or-v1…abcd".to_string());
        assert!(record.has_saved_key());
    }
}
