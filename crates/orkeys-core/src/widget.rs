//! Credential widget state machine.
//!
//! Every action takes `&self`, so the widget can be shared behind an `Arc`
//! and driven from concurrent tasks. State locks are released before any
//! host call; in-flight flags turn a repeated action into
//! [`ActionOutcome::Skipped`] instead of a second request.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};
use tracing::Level;
use zeroize::{Zeroize, Zeroizing};

use orkeys_observability::{
    emit_event, looks_masked, mask_secret, redact_text, short_hash, ObservabilityEvent,
    ProcessKind,
};
use orkeys_providers::{CacheStorage, Clock, ModelCache, ProviderService, ProviderTarget};
use orkeys_types::{
    CredentialRecord, CredentialValue, ModelTestResult, SettingsDefinition, SettingsInstance,
    Theme,
};

use crate::config::WidgetConfig;
use crate::error::{KeysError, Result};
use crate::event_bus::{EventBus, WidgetEvent};
use crate::host::{HostServices, ListenerId};
use crate::settings_client::SettingsClient;
use crate::validator::KeyValidator;
use crate::widget_state::*;

const COMPONENT: &str = "key_widget";

pub struct KeyWidget {
    config: WidgetConfig,
    services: HostServices,
    settings: SettingsClient,
    provider: ProviderService,
    validator: Option<KeyValidator>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    process: ProcessKind,
    state: Arc<RwLock<WidgetState>>,
    theme: Arc<Mutex<Theme>>,
    theme_listener: Mutex<Option<ListenerId>>,
}

/// Credential as read back from a settings instance.
struct LoadedCredential {
    record: CredentialRecord,
    template: CredentialValue,
    fingerprint: String,
}

impl KeyWidget {
    pub fn new(
        config: WidgetConfig,
        services: HostServices,
        storage: Arc<dyn CacheStorage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let settings = SettingsClient::new(
            services.api.clone(),
            &config.settings,
            services.user_id.clone(),
        );
        let target = ProviderTarget {
            provider: config.provider.id.clone(),
            label: config.provider.label.clone(),
            settings_id: config.settings.definition_id.clone(),
            server_id: config.provider.server_id.clone(),
            user_id: services.user_id.clone(),
        };
        let cache = ModelCache::new(storage, clock.clone());
        let provider = ProviderService::new(services.api.clone(), cache, target)
            .with_cache_ttl(config.cache_ttl());
        let validator = config
            .widget
            .enable_key_validation
            .then(|| config.validator());

        Self {
            config,
            services,
            settings,
            provider,
            validator,
            events: EventBus::new(),
            clock,
            process: ProcessKind::Host,
            state: Arc::new(RwLock::new(WidgetState::new(short_hash("")))),
            theme: Arc::new(Mutex::new(Theme::default())),
            theme_listener: Mutex::new(None),
        }
    }

    pub fn with_process(mut self, process: ProcessKind) -> Self {
        self.process = process;
        self
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<WidgetEvent> {
        self.events.subscribe()
    }

    pub fn current_theme(&self) -> Theme {
        *self.theme.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &WidgetConfig {
        &self.config
    }

    /// Wires host capabilities, then loads the saved credential. Nothing
    /// here fails the widget; missing capabilities are logged and skipped.
    pub async fn initialize(&self) {
        self.state.write().await.phase = Phase::Initializing;
        self.wire_theme();
        self.register_definition().await;
        self.load().await;
    }

    fn wire_theme(&self) {
        let Some(theme_service) = &self.services.theme else {
            tracing::debug!("theme service not available; using default theme");
            return;
        };
        *self.theme.lock().unwrap_or_else(PoisonError::into_inner) = theme_service.current_theme();

        let mut listener = self
            .theme_listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if listener.is_some() {
            return;
        }
        let slot = self.theme.clone();
        let events = self.events.clone();
        let id = theme_service.add_listener(Box::new(move |theme| {
            *slot.lock().unwrap_or_else(PoisonError::into_inner) = theme;
            events.publish(WidgetEvent::ThemeChanged { theme });
        }));
        *listener = Some(id);
    }

    async fn register_definition(&self) {
        let Some(settings_service) = &self.services.settings else {
            tracing::warn!("settings service not available; skipping definition registration");
            return;
        };
        let definition = SettingsDefinition {
            id: self.config.settings.definition_id.clone(),
            name: self.config.settings.instance_name.clone(),
            ..SettingsDefinition::default()
        };
        if let Err(err) = settings_service.register_definition(&definition).await {
            tracing::warn!("settings definition registration failed: {err:#}");
        }
    }

    /// Reads the saved credential. Not-found and failures both leave an
    /// empty credential.
    pub async fn load(&self) {
        self.state.write().await.phase = Phase::Loading;

        let loaded = match self.settings.load().await {
            Ok(Some(instance)) => Some(read_instance(&instance)),
            Ok(None) => None,
            Err(err) => {
                tracing::warn!("loading saved API key failed: {}", err);
                None
            }
        };

        let known_id = self.settings.instance_id().await;
        let mut state = self.state.write().await;
        match loaded {
            Some(loaded) => {
                state.credential = loaded.record;
                state.stored_template = loaded.template;
                state.saved_fingerprint = loaded.fingerprint;
            }
            None => {
                state.credential = CredentialRecord {
                    instance_id: known_id,
                    ..CredentialRecord::default()
                };
                state.stored_template = CredentialValue::default();
                state.saved_fingerprint = short_hash("");
            }
        }
        state.phase = state.resting_phase();
        tracing::debug!(
            has_key = state.credential.has_saved_key(),
            "credential state loaded"
        );
    }

    /// Replaces the pending input. Validation runs at save time only.
    pub async fn set_pending_key(&self, value: &str) {
        let mut state = self.state.write().await;
        state.pending_key = Zeroizing::new(value.to_string());
        state.validation_error = None;
        // An empty buffer is "nothing typed" whether or not a key is saved.
        state.has_unsaved_changes =
            !value.is_empty() && short_hash(value) != state.saved_fingerprint;
        if !state.is_busy() {
            state.phase = state.resting_phase();
        }
    }

    /// Persists the pending input. An empty input clears the saved key.
    pub async fn save(&self) -> ActionOutcome {
        let (candidate, template) = {
            let mut state = self.state.write().await;
            if state.is_busy() {
                return ActionOutcome::Skipped;
            }
            let candidate = state.pending_key.clone();
            if !candidate.is_empty() {
                if let Some(validator) = &self.validator {
                    let outcome = validator.validate(&candidate, false);
                    if !outcome.valid {
                        let message = outcome.error.unwrap_or_default();
                        state.validation_error = Some(message.clone());
                        state.phase = Phase::Idle;
                        drop(state);
                        self.events.publish(WidgetEvent::KeyValidated {
                            valid: false,
                            error: Some(message.clone()),
                        });
                        return ActionOutcome::Rejected(message);
                    }
                }
            }
            state.is_saving = true;
            state.phase = Phase::Saving;
            state.save_error = None;
            state.validation_error = None;
            (candidate, state.stored_template.clone())
        };

        if !candidate.is_empty() {
            self.events.publish(WidgetEvent::KeyValidated {
                valid: true,
                error: None,
            });
        }

        let result = self.write_credential(&candidate, template).await;

        let mut state = self.state.write().await;
        state.is_saving = false;
        match result {
            Ok(loaded) => {
                let changed = loaded.fingerprint != state.saved_fingerprint;
                let masked_key = loaded.record.masked_key.clone();
                self.apply_saved(&mut state, loaded, SAVED_NOTICE, changed);
                let instance_id = state.credential.instance_id.clone();
                drop(state);

                emit_event(
                    Level::INFO,
                    self.process,
                    ObservabilityEvent {
                        event: "credential.saved",
                        component: COMPONENT,
                        user_id: Some(self.services.user_id.as_str()),
                        instance_id: instance_id.as_deref(),
                        provider_id: Some(self.config.provider.id.as_str()),
                        status: Some(if changed { "changed" } else { "unchanged" }),
                        ..ObservabilityEvent::default()
                    },
                );
                self.events.publish(WidgetEvent::KeyUpdated { masked_key });
                ActionOutcome::Completed
            }
            Err(err) => {
                let message = action_error_message(&err, SAVE_FAILED_MESSAGE);
                state.save_error = Some(message.clone());
                state.phase = state.resting_phase();
                drop(state);
                self.log_action_failure("credential.save_failed", &err);
                ActionOutcome::Failed(message)
            }
        }
    }

    /// Writes an empty key. The settings instance itself is kept.
    pub async fn remove(&self) -> ActionOutcome {
        let template = {
            let mut state = self.state.write().await;
            if state.is_busy() {
                return ActionOutcome::Skipped;
            }
            if !state.credential.has_saved_key() {
                return ActionOutcome::Rejected(NOTHING_TO_REMOVE_MESSAGE.to_string());
            }
            state.is_removing = true;
            state.phase = Phase::Removing;
            state.save_error = None;
            state.stored_template.clone()
        };

        let result = self.write_credential("", template).await;

        let mut state = self.state.write().await;
        state.is_removing = false;
        match result {
            Ok(mut loaded) => {
                loaded.record = CredentialRecord {
                    instance_id: loaded.record.instance_id,
                    last_updated: loaded.record.last_updated,
                    ..CredentialRecord::default()
                };
                self.apply_saved(&mut state, loaded, REMOVED_NOTICE, true);
                state.active_tab = Tab::Credential;
                let instance_id = state.credential.instance_id.clone();
                drop(state);

                emit_event(
                    Level::INFO,
                    self.process,
                    ObservabilityEvent {
                        event: "credential.removed",
                        component: COMPONENT,
                        user_id: Some(self.services.user_id.as_str()),
                        instance_id: instance_id.as_deref(),
                        provider_id: Some(self.config.provider.id.as_str()),
                        ..ObservabilityEvent::default()
                    },
                );
                self.events.publish(WidgetEvent::KeyRemoved);
                ActionOutcome::Completed
            }
            Err(err) => {
                let message = action_error_message(&err, REMOVE_FAILED_MESSAGE);
                state.save_error = Some(message.clone());
                state.phase = state.resting_phase();
                drop(state);
                self.log_action_failure("credential.remove_failed", &err);
                ActionOutcome::Failed(message)
            }
        }
    }

    fn apply_saved(
        &self,
        state: &mut WidgetState,
        loaded: LoadedCredential,
        notice: &str,
        changed: bool,
    ) {
        state.credential = loaded.record;
        state.stored_template = loaded.template;
        state.saved_fingerprint = loaded.fingerprint;
        state.clear_pending();
        state.save_error = None;
        state.notice = Some(Notice {
            message: notice.to_string(),
            shown_at_ms: self.clock.now_ms(),
        });
        if changed {
            state.invalidate_models();
            self.provider.clear_cache();
        }
        state.phase = Phase::Idle;
    }

    async fn write_credential(
        &self,
        raw: &str,
        template: CredentialValue,
    ) -> Result<LoadedCredential> {
        let mut value = template;
        value.api_key = raw.to_string();
        value.enabled = true;
        let saved = self.settings.save(&value).await;
        value.api_key.zeroize();
        let instance_id = saved?;

        let mut template = value;
        let record = match self.settings.load().await {
            Ok(Some(instance)) => {
                let reloaded = read_instance(&instance);
                template = reloaded.template;
                reloaded.record
            }
            Ok(None) => self.fallback_record(raw, instance_id),
            Err(err) => {
                tracing::warn!("re-reading saved API key failed: {}", err);
                self.fallback_record(raw, instance_id)
            }
        };

        Ok(LoadedCredential {
            record,
            template,
            fingerprint: short_hash(raw),
        })
    }

    /// Record for a write that could not be read back.
    fn fallback_record(&self, raw: &str, instance_id: Option<String>) -> CredentialRecord {
        let has_key = !raw.is_empty();
        let updated = DateTime::<Utc>::from_timestamp_millis(self.clock.now_ms())
            .map(|at| at.to_rfc3339());
        CredentialRecord {
            masked_key: has_key.then(|| mask_secret(raw)),
            is_valid: has_key,
            last_updated: updated,
            instance_id,
        }
    }

    fn log_action_failure(&self, event: &str, err: &KeysError) {
        let detail = err.to_string();
        tracing::error!("{event}: {}", redact_text(&detail));
        emit_event(
            Level::ERROR,
            self.process,
            ObservabilityEvent {
                event,
                component: COMPONENT,
                user_id: Some(self.services.user_id.as_str()),
                provider_id: Some(self.config.provider.id.as_str()),
                status: Some("failed"),
                detail: Some(detail.as_str()),
                ..ObservabilityEvent::default()
            },
        );
    }

    pub async fn select_tab(&self, tab: Tab) -> ActionOutcome {
        let needs_models = {
            let mut state = self.state.write().await;
            match tab {
                Tab::Credential => {
                    state.active_tab = Tab::Credential;
                    return ActionOutcome::Completed;
                }
                Tab::ModelTesting => {
                    if !state.credential.has_saved_key() {
                        state.tab_error = Some(TAB_GUARD_MESSAGE.to_string());
                        return ActionOutcome::Rejected(TAB_GUARD_MESSAGE.to_string());
                    }
                    state.active_tab = Tab::ModelTesting;
                    !state.models_loaded
                }
            }
        };

        if needs_models {
            // Fetch failures land in the tab error; the tab switch still stands.
            self.load_models(false).await;
        }
        ActionOutcome::Completed
    }

    pub async fn navigate_tab(&self, key: TabKey) -> ActionOutcome {
        let current = self.state.read().await.active_tab;
        let target = key.target(current);
        if target == current {
            return ActionOutcome::Completed;
        }
        self.select_tab(target).await
    }

    /// Fetches the model list for the model-testing tab.
    pub async fn load_models(&self, force_refresh: bool) -> ActionOutcome {
        let generation = {
            let mut state = self.state.write().await;
            if state.models_loading {
                return ActionOutcome::Skipped;
            }
            if !state.credential.has_saved_key() {
                state.tab_error = Some(TAB_GUARD_MESSAGE.to_string());
                return ActionOutcome::Rejected(TAB_GUARD_MESSAGE.to_string());
            }
            state.models_loading = true;
            state.tab_error = None;
            state.generation
        };

        let result = self.provider.fetch_models(force_refresh).await;

        let mut state = self.state.write().await;
        state.models_loading = false;
        if state.generation != generation {
            tracing::debug!("discarding model list fetched for a replaced credential");
            return ActionOutcome::Skipped;
        }
        match result {
            Ok(models) => {
                let count = models.len();
                let selection_listed = state
                    .selected_model
                    .as_ref()
                    .is_some_and(|selected| models.iter().any(|m| &m.id == selected));
                if !selection_listed {
                    state.selected_model = None;
                }
                state.models = models;
                state.models_loaded = true;
                drop(state);
                self.events.publish(WidgetEvent::ModelsLoaded { count });
                ActionOutcome::Completed
            }
            Err(err) => {
                let message = KeysError::from(err).user_message();
                tracing::error!("loading models failed: {message}");
                state.tab_error = Some(message.clone());
                ActionOutcome::Failed(message)
            }
        }
    }

    /// Manual refresh: drops the cache and always goes to the host.
    pub async fn refresh_models(&self) -> ActionOutcome {
        if self.state.read().await.models_loading {
            return ActionOutcome::Skipped;
        }
        self.provider.clear_cache();
        self.load_models(true).await
    }

    /// Selects the model to test. A blank id clears the selection.
    pub async fn select_model(&self, model_id: &str) {
        let trimmed = model_id.trim();
        self.state.write().await.selected_model =
            (!trimmed.is_empty()).then(|| trimmed.to_string());
    }

    pub async fn set_model_search(&self, query: &str) {
        self.state.write().await.model_search = query.to_string();
    }

    pub async fn test_selected_model(&self) -> ActionOutcome {
        let (generation, model_id, model_name, known) = {
            let mut state = self.state.write().await;
            if state.is_testing || state.models_loading {
                return ActionOutcome::Skipped;
            }
            let Some(model_id) = state.selected_model.clone() else {
                return ActionOutcome::Rejected(NO_MODEL_SELECTED_MESSAGE.to_string());
            };
            state.is_testing = true;
            state.tab_error = None;
            let model_name = state
                .models
                .iter()
                .find(|m| m.id == model_id)
                .map(|m| m.name.clone());
            let known = state.models_loaded.then(|| state.models.clone());
            (state.generation, model_id, model_name, known)
        };

        let result = self
            .provider
            .test_model_availability(&model_id, known.as_deref())
            .await;

        let mut state = self.state.write().await;
        state.is_testing = false;
        if state.generation != generation {
            tracing::debug!(
                model_id = model_id.as_str(),
                "discarding stale availability result"
            );
            return ActionOutcome::Skipped;
        }
        let (record, outcome) = match result {
            Ok(record) => (record, ActionOutcome::Completed),
            Err(err) => {
                let message = KeysError::from(err).user_message();
                tracing::error!(model_id = model_id.as_str(), "model test failed: {message}");
                state.tab_error = Some(message.clone());
                (
                    ModelTestResult::unknown(&model_id, model_name.as_deref(), &message),
                    ActionOutcome::Failed(message),
                )
            }
        };
        state.test_history.push(record.clone());
        drop(state);

        emit_event(
            Level::INFO,
            self.process,
            ObservabilityEvent {
                event: "model.tested",
                component: COMPONENT,
                user_id: Some(self.services.user_id.as_str()),
                provider_id: Some(self.config.provider.id.as_str()),
                model_id: Some(record.model_id.as_str()),
                status: Some(record.status.as_str()),
                ..ObservabilityEvent::default()
            },
        );
        self.events.publish(WidgetEvent::ModelTested { result: record });
        outcome
    }

    pub async fn clear_test_results(&self) {
        self.state.write().await.test_history.clear();
    }

    /// Unsubscribes from theme changes. Safe to call more than once.
    pub fn teardown(&self) {
        let id = self
            .theme_listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let (Some(id), Some(theme_service)) = (id, &self.services.theme) {
            theme_service.remove_listener(id);
        }
    }

    pub async fn snapshot(&self) -> WidgetSnapshot {
        let notice_ttl_ms = duration_ms(self.config.notice_duration());
        let now = self.clock.now_ms();
        let state = self.state.read().await;

        let notice = state
            .notice
            .as_ref()
            .filter(|n| now - n.shown_at_ms < notice_ttl_ms)
            .map(|n| n.message.clone());
        let models = state
            .models
            .iter()
            .filter(|m| m.matches_search(&state.model_search))
            .cloned()
            .collect();

        WidgetSnapshot {
            phase: state.phase,
            active_tab: state.active_tab,
            theme: self.current_theme(),
            title: self.config.widget.title.clone(),
            description: self.config.widget.description.clone(),
            show_advanced_options: self.config.widget.show_advanced_options,
            credential: state.credential.clone(),
            has_pending_input: !state.pending_key.is_empty(),
            has_unsaved_changes: state.has_unsaved_changes,
            validation_error: state.validation_error.clone(),
            save_error: state.save_error.clone(),
            notice,
            is_saving: state.is_saving,
            is_removing: state.is_removing,
            model_testing_enabled: state.credential.has_saved_key(),
            models,
            total_models: state.models.len(),
            model_search: state.model_search.clone(),
            models_loading: state.models_loading,
            selected_model: state.selected_model.clone(),
            is_testing: state.is_testing,
            test_results: state.test_history.to_vec(),
            tab_error: state.tab_error.clone(),
        }
    }
}

impl Drop for KeyWidget {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn read_instance(instance: &SettingsInstance) -> LoadedCredential {
    let mut template = CredentialValue::from_stored(&instance.value).unwrap_or_default();
    let stored = template.api_key.trim().to_string();
    let masked_key = if stored.is_empty() {
        None
    } else if looks_masked(&stored) {
        Some(stored.clone())
    } else {
        Some(mask_secret(&stored))
    };
    let fingerprint = short_hash(&stored);
    template.api_key.zeroize();

    LoadedCredential {
        record: CredentialRecord {
            is_valid: masked_key.is_some(),
            masked_key,
            last_updated: instance.updated_at.clone(),
            instance_id: Some(instance.id.clone()),
        },
        template,
        fingerprint,
    }
}

/// Missing capabilities are explained; anything else gets the generic text.
fn action_error_message(err: &KeysError, generic: &str) -> String {
    match err {
        KeysError::ServiceUnavailable(_) => err.user_message(),
        _ => generic.to_string(),
    }
}

fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
