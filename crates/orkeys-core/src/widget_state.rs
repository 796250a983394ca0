use serde::Serialize;
use zeroize::Zeroizing;

use orkeys_types::{
    CredentialRecord, CredentialValue, ModelRecord, ModelTestResult, TestHistory, Theme,
};

pub const SAVE_FAILED_MESSAGE: &str = "Failed to save API key. Please try again.";
pub const REMOVE_FAILED_MESSAGE: &str = "Failed to remove API key. Please try again.";
pub const TAB_GUARD_MESSAGE: &str = "Please save a valid API key before testing models";
pub const NO_MODEL_SELECTED_MESSAGE: &str = "Please select a model to test";
pub const NOTHING_TO_REMOVE_MESSAGE: &str = "No API key is saved";
pub const SAVED_NOTICE: &str = "API key saved successfully";
pub const REMOVED_NOTICE: &str = "API key removed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initializing,
    Loading,
    Idle,
    Editing,
    Saving,
    Removing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tab {
    #[default]
    Credential,
    ModelTesting,
}

impl Tab {
    pub const ALL: [Tab; 2] = [Tab::Credential, Tab::ModelTesting];

    fn index(self) -> usize {
        match self {
            Tab::Credential => 0,
            Tab::ModelTesting => 1,
        }
    }
}

/// Keyboard keys that move focus across the tab strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabKey {
    Left,
    Right,
    Home,
    End,
}

impl TabKey {
    /// Tab reached from `from`. Left and Right wrap around.
    pub fn target(self, from: Tab) -> Tab {
        let count = Tab::ALL.len();
        let index = match self {
            TabKey::Left => (from.index() + count - 1) % count,
            TabKey::Right => (from.index() + 1) % count,
            TabKey::Home => 0,
            TabKey::End => count - 1,
        };
        Tab::ALL[index]
    }
}

/// What happened to a requested action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "message", rename_all = "snake_case")]
pub enum ActionOutcome {
    Completed,
    /// Same kind of action already in flight, or its result went stale.
    Skipped,
    /// Refused locally before any network call.
    Rejected(String),
    Failed(String),
}

impl ActionOutcome {
    pub fn message(&self) -> Option<&str> {
        match self {
            ActionOutcome::Rejected(msg) | ActionOutcome::Failed(msg) => Some(msg),
            ActionOutcome::Completed | ActionOutcome::Skipped => None,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Notice {
    pub message: String,
    pub shown_at_ms: i64,
}

pub(crate) struct WidgetState {
    pub phase: Phase,
    pub active_tab: Tab,
    pub credential: CredentialRecord,
    /// Stored value minus the key, so unknown fields survive a rewrite.
    pub stored_template: CredentialValue,
    pub pending_key: Zeroizing<String>,
    pub saved_fingerprint: String,
    pub has_unsaved_changes: bool,
    pub validation_error: Option<String>,
    pub save_error: Option<String>,
    pub notice: Option<Notice>,
    pub is_saving: bool,
    pub is_removing: bool,
    /// Bumped whenever the saved credential changes; in-flight model work
    /// started under an older generation is discarded.
    pub generation: u64,
    pub models: Vec<ModelRecord>,
    pub models_loaded: bool,
    pub models_loading: bool,
    pub model_search: String,
    pub selected_model: Option<String>,
    pub is_testing: bool,
    pub test_history: TestHistory,
    pub tab_error: Option<String>,
}

impl WidgetState {
    pub fn new(empty_fingerprint: String) -> Self {
        Self {
            phase: Phase::Initializing,
            active_tab: Tab::Credential,
            credential: CredentialRecord::default(),
            stored_template: CredentialValue::default(),
            pending_key: Zeroizing::new(String::new()),
            saved_fingerprint: empty_fingerprint,
            has_unsaved_changes: false,
            validation_error: None,
            save_error: None,
            notice: None,
            is_saving: false,
            is_removing: false,
            generation: 0,
            models: Vec::new(),
            models_loaded: false,
            models_loading: false,
            model_search: String::new(),
            selected_model: None,
            is_testing: false,
            test_history: TestHistory::default(),
            tab_error: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.is_saving || self.is_removing
    }

    /// Phase once no action is running.
    pub fn resting_phase(&self) -> Phase {
        if self.has_unsaved_changes {
            Phase::Editing
        } else {
            Phase::Idle
        }
    }

    pub fn clear_pending(&mut self) {
        // Dropping the old buffer wipes it.
        self.pending_key = Zeroizing::new(String::new());
        self.has_unsaved_changes = false;
    }

    /// Drops everything derived from the previous credential.
    pub fn invalidate_models(&mut self) {
        self.generation += 1;
        self.models.clear();
        self.models_loaded = false;
        self.selected_model = None;
        self.test_history.clear();
        self.tab_error = None;
    }
}

/// Owned, render-ready view of the widget. Never carries the raw key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WidgetSnapshot {
    pub phase: Phase,
    pub active_tab: Tab,
    pub theme: Theme,
    pub title: String,
    pub description: String,
    pub show_advanced_options: bool,
    pub credential: CredentialRecord,
    pub has_pending_input: bool,
    pub has_unsaved_changes: bool,
    pub validation_error: Option<String>,
    pub save_error: Option<String>,
    pub notice: Option<String>,
    pub is_saving: bool,
    pub is_removing: bool,
    pub model_testing_enabled: bool,
    /// Models matching `model_search`.
    pub models: Vec<ModelRecord>,
    pub total_models: usize,
    pub model_search: String,
    pub models_loading: bool,
    pub selected_model: Option<String>,
    pub is_testing: bool,
    pub test_results: Vec<ModelTestResult>,
    pub tab_error: Option<String>,
}
