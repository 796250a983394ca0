use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{CredentialValue, SETTINGS_DEFINITION_ID, SETTINGS_INSTANCE_NAME};

/// Scope spellings the backend has been seen to store, in lookup order.
pub const SCOPE_LOOKUP_ORDER: [&str; 2] = ["user", "USER"];

/// One server-persisted settings row as returned by the instance collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsInstance {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub definition_id: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Body of a settings write. `id` present means update in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsWrite {
    pub definition_id: String,
    pub name: String,
    pub value: String,
    pub scope: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub default_value: CredentialValue,
    pub allowed_scopes: Vec<String>,
    pub validation: Value,
    pub is_multiple: bool,
    pub tags: Vec<String>,
}

impl Default for SettingsDefinition {
    fn default() -> Self {
        Self {
            id: SETTINGS_DEFINITION_ID.to_string(),
            name: SETTINGS_INSTANCE_NAME.to_string(),
            description: "Configure OpenRouter API key for accessing various AI models from \
                          multiple providers"
                .to_string(),
            category: "LLM Servers".to_string(),
            kind: "object".to_string(),
            default_value: CredentialValue::default(),
            allowed_scopes: vec!["user".to_string()],
            validation: Value::Object(Default::default()),
            is_multiple: false,
            tags: [
                SETTINGS_DEFINITION_ID,
                "OpenRouter",
                "API Keys",
                "AI Models",
                "settings",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
        }
    }
}
