//! Capabilities the host application may or may not provide.
//!
//! Every call site branches on presence: an absent capability has a defined
//! fallback instead of failing the widget.

use std::sync::Arc;

use async_trait::async_trait;

use orkeys_providers::HostApi;
use orkeys_types::{SettingsDefinition, Theme};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

pub type ThemeListener = Box<dyn Fn(Theme) + Send + Sync>;

pub trait ThemeService: Send + Sync {
    fn current_theme(&self) -> Theme;
    fn add_listener(&self, listener: ThemeListener) -> ListenerId;
    fn remove_listener(&self, id: ListenerId);
}

#[async_trait]
pub trait SettingsService: Send + Sync {
    /// Makes the definition known to the host. Hosts without dynamic
    /// registration return an error, which callers treat as non-fatal.
    async fn register_definition(&self, definition: &SettingsDefinition) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct HostServices {
    pub user_id: String,
    pub api: Option<Arc<dyn HostApi>>,
    pub theme: Option<Arc<dyn ThemeService>>,
    pub settings: Option<Arc<dyn SettingsService>>,
}

impl HostServices {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            api: None,
            theme: None,
            settings: None,
        }
    }

    pub fn with_api(mut self, api: Arc<dyn HostApi>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn with_theme(mut self, theme: Arc<dyn ThemeService>) -> Self {
        self.theme = Some(theme);
        self
    }

    pub fn with_settings(mut self, settings: Arc<dyn SettingsService>) -> Self {
        self.settings = Some(settings);
        self
    }
}

/// Registers the definition by posting it to the host's definitions
/// collection through the API capability.
pub struct ApiSettingsService {
    api: Arc<dyn HostApi>,
}

pub const SETTINGS_DEFINITIONS_PATH: &str = "/api/v1/settings/definitions";

impl ApiSettingsService {
    pub fn new(api: Arc<dyn HostApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl SettingsService for ApiSettingsService {
    async fn register_definition(&self, definition: &SettingsDefinition) -> anyhow::Result<()> {
        let body = serde_json::to_value(definition)?;
        self.api.post(SETTINGS_DEFINITIONS_PATH, body).await?;
        Ok(())
    }
}
