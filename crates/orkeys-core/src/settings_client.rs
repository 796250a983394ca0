use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use orkeys_providers::{HostApi, SETTINGS_INSTANCES_PATH};
use orkeys_types::{CredentialValue, SettingsInstance, SettingsWrite, SCOPE_LOOKUP_ORDER};

use crate::config::SettingsConfig;
use crate::error::{KeysError, Result};

/// Reads and writes the single settings instance for
/// (definition, user scope, current user).
pub struct SettingsClient {
    api: Option<Arc<dyn HostApi>>,
    definition_id: String,
    instance_name: String,
    scope: String,
    user_id: String,
    instance_id: RwLock<Option<String>>,
}

impl SettingsClient {
    pub fn new(
        api: Option<Arc<dyn HostApi>>,
        config: &SettingsConfig,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            api,
            definition_id: config.definition_id.clone(),
            instance_name: config.instance_name.clone(),
            scope: config.scope.clone(),
            user_id: user_id.into(),
            instance_id: RwLock::new(None),
        }
    }

    pub async fn instance_id(&self) -> Option<String> {
        self.instance_id.read().await.clone()
    }

    fn api(&self) -> Result<&Arc<dyn HostApi>> {
        self.api.as_ref().ok_or(KeysError::ServiceUnavailable("API"))
    }

    /// Configured scope first, then the remaining known spellings.
    fn scope_candidates(&self) -> Vec<&str> {
        let mut scopes = vec![self.scope.as_str()];
        for scope in SCOPE_LOOKUP_ORDER {
            if !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }
        scopes
    }

    /// First matching instance, or `None`. Malformed payloads count as
    /// not found; transport failures are errors.
    pub async fn load(&self) -> Result<Option<SettingsInstance>> {
        let api = self.api()?;

        for scope in self.scope_candidates() {
            let query = [
                ("definition_id", self.definition_id.as_str()),
                ("scope", scope),
                ("user_id", self.user_id.as_str()),
            ];
            let payload = api.get(SETTINGS_INSTANCES_PATH, &query).await?;
            if let Some(instance) = first_instance(&payload, &self.definition_id) {
                tracing::debug!(
                    scope,
                    instance_id = instance.id.as_str(),
                    "settings instance found"
                );
                *self.instance_id.write().await = Some(instance.id.clone());
                return Ok(Some(instance));
            }
        }

        tracing::debug!(
            definition_id = self.definition_id.as_str(),
            "no settings instance found"
        );
        Ok(None)
    }

    /// Writes `value`, updating in place when an instance id is known.
    ///
    /// Returns the id of the written instance. Once the write itself has
    /// succeeded nothing here fails: an id that cannot be resolved yet is
    /// `None`, and the next successful `load` picks it up.
    pub async fn save(&self, value: &CredentialValue) -> Result<Option<String>> {
        let api = self.api()?;
        let known_id = self.instance_id().await;

        let write = SettingsWrite {
            definition_id: self.definition_id.clone(),
            name: self.instance_name.clone(),
            value: serde_json::to_string(value)?,
            scope: self.scope.clone(),
            user_id: self.user_id.clone(),
            id: known_id.clone(),
        };
        let response = api
            .post(SETTINGS_INSTANCES_PATH, serde_json::to_value(&write)?)
            .await?;

        if let Some(id) = response_id(&response).or(known_id) {
            *self.instance_id.write().await = Some(id.clone());
            return Ok(Some(id));
        }
        match self.load().await {
            Ok(found) => {
                if found.is_none() {
                    tracing::warn!("saved settings instance not found on re-lookup");
                }
                Ok(found.map(|instance| instance.id))
            }
            Err(err) => {
                tracing::warn!("settings instance id unresolved after save: {err}");
                Ok(None)
            }
        }
    }
}

fn first_instance(payload: &Value, definition_id: &str) -> Option<SettingsInstance> {
    match payload {
        Value::Array(items) => items
            .iter()
            .find_map(|item| instance_from_object(item, definition_id)),
        Value::Object(map) => match map.get("data") {
            Some(data) if !map.contains_key("id") => first_instance(data, definition_id),
            _ => instance_from_object(payload, definition_id),
        },
        _ => None,
    }
}

fn instance_from_object(value: &Value, definition_id: &str) -> Option<SettingsInstance> {
    let obj = value.as_object()?;
    let id = id_string(obj.get("id")?)?;
    let field = |name: &str| obj.get(name).and_then(|v| v.as_str()).map(str::to_string);

    let instance_definition = field("definition_id");
    if instance_definition
        .as_deref()
        .is_some_and(|found| found != definition_id)
    {
        return None;
    }

    Some(SettingsInstance {
        id,
        name: field("name"),
        definition_id: instance_definition,
        scope: field("scope"),
        user_id: field("user_id"),
        value: obj.get("value").cloned().unwrap_or(Value::Null),
        updated_at: field("updated_at"),
    })
}

fn response_id(response: &Value) -> Option<String> {
    response
        .get("id")
        .or_else(|| response.get("data").and_then(|d| d.get("id")))
        .and_then(id_string)
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
