#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use orkeys_core::{
    HostServices, KeyWidget, ListenerId, ThemeListener, ThemeService, WidgetConfig,
    SETTINGS_DEFINITIONS_PATH,
};
use orkeys_providers::{
    CacheStorage, HostApi, ManualClock, MemoryCacheStorage, MODEL_CACHE_KEY,
    PROVIDER_MODELS_PATH, SETTINGS_INSTANCES_PATH,
};
use orkeys_types::Theme;

pub const USER_ID: &str = "user-42";
pub const VALID_KEY: &str = "sk-or-v1-0123456789abcdef0123456789";
pub const OTHER_VALID_KEY: &str = "sk-or-v1-fedcba9876543210fedcba9876";

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: &'static str,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

/// In-memory host backend. Stores settings rows and hands back the key
/// masked, the way the real settings collection does.
pub struct FakeHost {
    rows: Mutex<Vec<Value>>,
    next_id: AtomicU64,
    models_response: Mutex<Value>,
    pub calls: Mutex<Vec<Call>>,
    pub fail_posts: AtomicBool,
    pub fail_gets: AtomicBool,
    /// Instance writes answer without an id.
    pub anonymous_writes: AtomicBool,
    /// A successful instance write makes every later GET fail.
    pub fail_gets_after_write: AtomicBool,
    pub stored_scope: Mutex<String>,
    delay: Mutex<Option<Duration>>,
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            models_response: Mutex::new(json!({"models": sample_models()})),
            calls: Mutex::new(Vec::new()),
            fail_posts: AtomicBool::new(false),
            fail_gets: AtomicBool::new(false),
            anonymous_writes: AtomicBool::new(false),
            fail_gets_after_write: AtomicBool::new(false),
            stored_scope: Mutex::new("user".to_string()),
            delay: Mutex::new(None),
        })
    }

    /// Seeds a saved key as if written by an earlier session.
    pub fn with_saved_key(self: Arc<Self>, key: &str) -> Arc<Self> {
        self.with_saved_value(json!({"apiKey": key, "enabled": true, "customFlag": "kept"}))
    }

    /// Seeds a saved row holding `value` verbatim.
    pub fn with_saved_value(self: Arc<Self>, value: Value) -> Arc<Self> {
        let id = format!("inst-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let scope = self.stored_scope.lock().expect("scope").clone();
        self.rows.lock().expect("rows").push(json!({
            "id": id,
            "definition_id": "openrouter_api_keys_settings",
            "name": "OpenRouter API Keys Settings",
            "scope": scope,
            "user_id": USER_ID,
            "value": value.to_string(),
            "updated_at": "2026-01-01T00:00:00Z",
        }));
        self
    }

    pub fn set_models_response(&self, response: Value) {
        *self.models_response.lock().expect("models") = response;
    }

    /// Makes every call suspend for `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().expect("delay") = Some(delay);
    }

    pub fn calls_to(&self, method: &str, path: &str) -> Vec<Call> {
        self.calls
            .lock()
            .expect("calls")
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .cloned()
            .collect()
    }

    pub fn model_fetches(&self) -> usize {
        self.calls_to("GET", PROVIDER_MODELS_PATH).len()
    }

    pub fn instance_writes(&self) -> Vec<Call> {
        self.calls_to("POST", SETTINGS_INSTANCES_PATH)
    }

    pub fn definition_registrations(&self) -> usize {
        self.calls_to("POST", SETTINGS_DEFINITIONS_PATH).len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().expect("rows").len()
    }

    /// Raw key as stored server-side, for assertions only.
    pub fn stored_key(&self) -> Option<String> {
        let rows = self.rows.lock().expect("rows");
        let raw = rows.first()?.get("value")?.as_str()?.to_string();
        let value: Value = serde_json::from_str(&raw).ok()?;
        value.get("apiKey")?.as_str().map(str::to_string)
    }

    pub fn stored_value(&self) -> Option<Value> {
        let rows = self.rows.lock().expect("rows");
        let raw = rows.first()?.get("value")?.as_str()?.to_string();
        serde_json::from_str(&raw).ok()
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().expect("delay");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn record(
        &self,
        method: &'static str,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) {
        self.calls.lock().expect("calls").push(Call {
            method,
            path: path.to_string(),
            query: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body,
        });
    }

    fn masked_rows(&self, query: &[(&str, &str)]) -> Value {
        let param = |name: &str| {
            query
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
                .unwrap_or_default()
        };
        let rows = self.rows.lock().expect("rows");
        let matching: Vec<Value> = rows
            .iter()
            .filter(|row| {
                row["definition_id"] == param("definition_id").as_str()
                    && row["scope"] == param("scope").as_str()
                    && row["user_id"] == param("user_id").as_str()
            })
            .map(|row| {
                let mut row = row.clone();
                let mut value: Value =
                    serde_json::from_str(row["value"].as_str().unwrap_or("{}")).unwrap_or_default();
                if let Some(key) = value.get("apiKey").and_then(|k| k.as_str()) {
                    if !key.is_empty() {
                        let tail = &key[key.len().saturating_sub(4)..];
                        value["apiKey"] = json!(format!("sk-or-v1****{tail}"));
                    }
                }
                row["value"] = json!(value.to_string());
                row
            })
            .collect();
        Value::Array(matching)
    }
}

#[async_trait]
impl HostApi for FakeHost {
    async fn get(&self, path: &str, query: &[(&str, &str)]) -> anyhow::Result<Value> {
        self.record("GET", path, query, None);
        self.pause().await;
        if self.fail_gets.load(Ordering::SeqCst) {
            anyhow::bail!("GET {path} failed with status 503 Service Unavailable");
        }
        match path {
            SETTINGS_INSTANCES_PATH => Ok(self.masked_rows(query)),
            PROVIDER_MODELS_PATH => Ok(self.models_response.lock().expect("models").clone()),
            "/api/v1/auth/me" => Ok(json!({"id": USER_ID})),
            other => anyhow::bail!("GET {other} failed with status 404 Not Found"),
        }
    }

    async fn post(&self, path: &str, body: Value) -> anyhow::Result<Value> {
        self.record("POST", path, &[], Some(body.clone()));
        self.pause().await;
        if self.fail_posts.load(Ordering::SeqCst) {
            anyhow::bail!("POST {path} failed with status 500 Internal Server Error");
        }
        match path {
            SETTINGS_INSTANCES_PATH => {
                let mut rows = self.rows.lock().expect("rows");
                let id = match body.get("id").and_then(|v| v.as_str()) {
                    Some(id) => {
                        let row = rows
                            .iter_mut()
                            .find(|row| row["id"] == id)
                            .ok_or_else(|| anyhow::anyhow!("POST {path} failed with status 404"))?;
                        row["value"] = body["value"].clone();
                        row["updated_at"] = json!("2026-02-02T00:00:00Z");
                        id.to_string()
                    }
                    None => {
                        let id = format!("inst-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
                        let mut row = body.clone();
                        row["id"] = json!(id);
                        row["updated_at"] = json!("2026-02-02T00:00:00Z");
                        rows.push(row);
                        id
                    }
                };
                if self.fail_gets_after_write.load(Ordering::SeqCst) {
                    self.fail_gets.store(true, Ordering::SeqCst);
                }
                if self.anonymous_writes.load(Ordering::SeqCst) {
                    return Ok(json!({"status": "ok"}));
                }
                Ok(json!({"id": id}))
            }
            SETTINGS_DEFINITIONS_PATH => Ok(json!({"id": body["id"].clone()})),
            other => anyhow::bail!("POST {other} failed with status 404 Not Found"),
        }
    }
}

pub fn sample_models() -> Value {
    json!([
        {"id": "openai/gpt-4o", "name": "GPT-4o", "context_length": 128000,
         "pricing": {"prompt": "0.0000025", "completion": "0.00001"}},
        {"id": "anthropic/claude-3.5-sonnet", "name": "Claude 3.5 Sonnet",
         "context_length": 200000},
        {"id": "meta-llama/llama-3-8b-instruct", "name": "Llama 3 8B Instruct", "owned_by": "Meta"}
    ])
}

#[derive(Default)]
pub struct FakeTheme {
    current: Mutex<Theme>,
    listeners: Mutex<HashMap<u64, ThemeListener>>,
    next: AtomicU64,
}

impl FakeTheme {
    pub fn new(theme: Theme) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(theme),
            ..Self::default()
        })
    }

    pub fn set(&self, theme: Theme) {
        *self.current.lock().expect("theme") = theme;
        for listener in self.listeners.lock().expect("listeners").values() {
            listener(theme);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().expect("listeners").len()
    }
}

impl ThemeService for FakeTheme {
    fn current_theme(&self) -> Theme {
        *self.current.lock().expect("theme")
    }

    fn add_listener(&self, listener: ThemeListener) -> ListenerId {
        let id = self.next.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().expect("listeners").insert(id, listener);
        ListenerId(id)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.lock().expect("listeners").remove(&id.0);
    }
}

pub struct Harness {
    pub host: Arc<FakeHost>,
    pub clock: Arc<ManualClock>,
    pub storage: Arc<MemoryCacheStorage>,
    pub widget: KeyWidget,
}

impl Harness {
    pub fn new(host: Arc<FakeHost>) -> Self {
        Self::with_services(host.clone(), HostServices::new(USER_ID).with_api(host))
    }

    pub fn with_services(host: Arc<FakeHost>, services: HostServices) -> Self {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let storage = Arc::new(MemoryCacheStorage::default());
        let widget = KeyWidget::new(
            WidgetConfig::default(),
            services,
            storage.clone(),
            clock.clone(),
        );
        Self {
            host,
            clock,
            storage,
            widget,
        }
    }

    pub async fn started(host: Arc<FakeHost>) -> Self {
        let harness = Self::new(host);
        harness.widget.initialize().await;
        harness
    }

    pub fn cache_is_populated(&self) -> bool {
        self.storage
            .get(MODEL_CACHE_KEY)
            .expect("storage")
            .is_some()
    }
}
