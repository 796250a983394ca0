use serde::Serialize;
use tokio::sync::broadcast;

use orkeys_types::{ModelTestResult, Theme};

/// Notifications the widget publishes for the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WidgetEvent {
    KeyUpdated { masked_key: Option<String> },
    KeyValidated { valid: bool, error: Option<String> },
    KeyRemoved,
    ModelsLoaded { count: usize },
    ModelTested { result: ModelTestResult },
    ThemeChanged { theme: Theme },
}

impl WidgetEvent {
    /// Message name on the host's message channel.
    pub fn message_name(&self) -> &'static str {
        match self {
            WidgetEvent::KeyUpdated { .. } | WidgetEvent::KeyRemoved => "openrouter_key_updated",
            WidgetEvent::KeyValidated { .. } => "openrouter_key_validated",
            WidgetEvent::ModelsLoaded { .. } => "openrouter_models_loaded",
            WidgetEvent::ModelTested { .. } => "openrouter_model_tested",
            WidgetEvent::ThemeChanged { .. } => "theme_changed",
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<WidgetEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WidgetEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: WidgetEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
