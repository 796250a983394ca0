use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::fs;

use orkeys_types::{
    DEFAULT_SERVER_ID, PROVIDER_BASE_URL, PROVIDER_DEFAULT_MODEL, PROVIDER_ID, PROVIDER_LABEL,
    SETTINGS_DEFINITION_ID, SETTINGS_INSTANCE_NAME,
};

use crate::validator::{KeyValidator, DEFAULT_KEY_PREFIX, DEFAULT_MIN_KEY_SUFFIX};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub base_url: String,
    pub user_id: Option<String>,
    pub api_token: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8005".to_string(),
            user_id: None,
            api_token: None,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    pub definition_id: String,
    pub instance_name: String,
    pub scope: String,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            definition_id: SETTINGS_DEFINITION_ID.to_string(),
            instance_name: SETTINGS_INSTANCE_NAME.to_string(),
            scope: "user".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    pub id: String,
    pub label: String,
    pub server_id: String,
    pub base_url: String,
    pub default_model: String,
    pub key_prefix: String,
    pub min_key_suffix: usize,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            id: PROVIDER_ID.to_string(),
            label: PROVIDER_LABEL.to_string(),
            server_id: DEFAULT_SERVER_ID.to_string(),
            base_url: PROVIDER_BASE_URL.to_string(),
            default_model: PROVIDER_DEFAULT_MODEL.to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            min_key_suffix: DEFAULT_MIN_KEY_SUFFIX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            dir: None,
        }
    }
}

/// Presentation options the host exposes for the widget module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetSection {
    pub title: String,
    pub description: String,
    pub show_advanced_options: bool,
    pub enable_key_validation: bool,
    pub notice_secs: u64,
}

impl Default for WidgetSection {
    fn default() -> Self {
        Self {
            title: "OpenRouter API Keys".to_string(),
            description: "Manage your OpenRouter API keys securely".to_string(),
            show_advanced_options: false,
            enable_key_validation: true,
            notice_secs: 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetConfig {
    pub host: HostConfig,
    pub settings: SettingsConfig,
    pub provider: ProviderSection,
    pub cache: CacheConfig,
    pub widget: WidgetSection,
}

impl WidgetConfig {
    pub fn validator(&self) -> KeyValidator {
        KeyValidator::new(self.provider.key_prefix.clone(), self.provider.min_key_suffix)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    pub fn notice_duration(&self) -> Duration {
        Duration::from_secs(self.widget.notice_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.host.request_timeout_secs.max(1))
    }
}

/// Merges configuration layers, lowest precedence first:
/// defaults, global file, project file, environment, CLI overrides.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    global_path: PathBuf,
    project_path: Option<PathBuf>,
    cli: Value,
}

impl ConfigStore {
    pub async fn new(
        project_path: Option<&Path>,
        cli_overrides: Option<Value>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            global_path: resolve_global_config_path(),
            project_path: project_path.map(Path::to_path_buf),
            cli: cli_overrides.unwrap_or_else(empty_object),
        })
    }

    /// File `patch_file` writes: the project file when one is in use.
    pub fn writable_path(&self) -> &Path {
        self.project_path.as_deref().unwrap_or(&self.global_path)
    }

    pub async fn get_effective_value(&self) -> anyhow::Result<Value> {
        let mut merged = serde_json::to_value(WidgetConfig::default())?;
        deep_merge(&mut merged, &read_json_file(&self.global_path).await?);
        if let Some(project) = &self.project_path {
            deep_merge(&mut merged, &read_json_file(project).await?);
        }
        deep_merge(&mut merged, &env_layer());
        deep_merge(&mut merged, &self.cli);
        Ok(merged)
    }

    pub async fn load(&self) -> anyhow::Result<WidgetConfig> {
        let merged = self.get_effective_value().await?;
        Ok(serde_json::from_value(merged)?)
    }

    /// Persists `patch` into [`Self::writable_path`]. The host API token is
    /// never written.
    pub async fn patch_file(&self, patch: Value) -> anyhow::Result<WidgetConfig> {
        let path = self.writable_path();
        let mut current = read_json_file(path).await?;
        deep_merge(&mut current, &patch);
        write_json_file(path, &current).await?;
        self.load().await
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

async fn read_json_file(path: &Path) -> anyhow::Result<Value> {
    if !path.exists() {
        return Ok(empty_object());
    }
    let raw = fs::read_to_string(path).await?;
    match serde_json::from_str::<Value>(&raw) {
        Ok(value) if value.is_object() => Ok(value),
        Ok(_) | Err(_) => {
            tracing::warn!("ignoring unreadable config file {}", path.display());
            Ok(empty_object())
        }
    }
}

async fn write_json_file(path: &Path, value: &Value) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut to_write = value.clone();
    strip_persisted_secrets(&mut to_write);
    let raw = serde_json::to_string_pretty(&to_write)?;
    fs::write(path, raw).await?;
    Ok(())
}

fn strip_persisted_secrets(value: &mut Value) {
    let Some(host) = value.get_mut("host").and_then(|v| v.as_object_mut()) else {
        return;
    };
    host.remove("api_token");
    host.remove("apiToken");
}

fn resolve_global_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("ORKEYS_GLOBAL_CONFIG") {
        return PathBuf::from(path);
    }
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("orkeys").join("config.json");
    }
    PathBuf::from(".orkeys/config.json")
}

fn env_layer() -> Value {
    let mut root = empty_object();

    if let Some(url) = env_non_empty("ORKEYS_HOST_URL") {
        deep_merge(&mut root, &json!({ "host": { "base_url": url } }));
    }
    if let Some(user) = env_non_empty("ORKEYS_USER_ID") {
        deep_merge(&mut root, &json!({ "host": { "user_id": user } }));
    }
    if let Some(token) = env_non_empty("ORKEYS_API_TOKEN") {
        deep_merge(&mut root, &json!({ "host": { "api_token": token } }));
    }
    let ttl = env_non_empty("ORKEYS_CACHE_TTL_SECS").and_then(|v| v.parse::<u64>().ok());
    if let Some(ttl) = ttl {
        deep_merge(&mut root, &json!({ "cache": { "ttl_secs": ttl } }));
    }
    if let Some(dir) = env_non_empty("ORKEYS_CACHE_DIR") {
        deep_merge(&mut root, &json!({ "cache": { "dir": dir } }));
    }
    let validation = env_non_empty("ORKEYS_KEY_VALIDATION").and_then(|v| parse_bool_like(&v));
    if let Some(enabled) = validation {
        deep_merge(
            &mut root,
            &json!({ "widget": { "enable_key_validation": enabled } }),
        );
    }

    root
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub fn parse_bool_like(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn deep_merge(base: &mut Value, overlay: &Value) {
    if overlay.is_null() {
        return;
    }
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                if value.is_null() {
                    continue;
                }
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base_value, overlay_value) => {
            *base_value = overlay_value.clone();
        }
    }
}
