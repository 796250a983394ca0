use std::sync::Arc;
use std::time::Duration;

use orkeys_types::{ModelRecord, ModelTestResult, TestStatus};

use crate::api::{HostApi, PROVIDER_MODELS_PATH};
use crate::cache::{ModelCache, DEFAULT_MODEL_CACHE_TTL};
use crate::error::{ProviderError, Result};
use crate::normalize::{extract_model_list, normalize_models};

/// Identifies whose catalog is requested from the host's models endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderTarget {
    pub provider: String,
    pub label: String,
    pub settings_id: String,
    pub server_id: String,
    pub user_id: String,
}

#[derive(Clone)]
pub struct ProviderService {
    api: Option<Arc<dyn HostApi>>,
    cache: ModelCache,
    target: ProviderTarget,
    cache_ttl: Duration,
}

impl ProviderService {
    pub fn new(api: Option<Arc<dyn HostApi>>, cache: ModelCache, target: ProviderTarget) -> Self {
        Self {
            api,
            cache,
            target,
            cache_ttl: DEFAULT_MODEL_CACHE_TTL,
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Models reachable with the saved key. Served from the cache unless
    /// `force_refresh` is set; a successful fetch replaces the cache entry.
    pub async fn fetch_models(&self, force_refresh: bool) -> Result<Vec<ModelRecord>> {
        if !force_refresh {
            if let Some(entry) = self.cache.read(Some(self.cache_ttl)) {
                tracing::debug!(count = entry.models.len(), "serving models from cache");
                return Ok(entry.models);
            }
        }

        let api = self
            .api
            .as_ref()
            .ok_or(ProviderError::ServiceUnavailable("API"))?;

        let query = [
            ("provider", self.target.provider.as_str()),
            ("settings_id", self.target.settings_id.as_str()),
            ("server_id", self.target.server_id.as_str()),
            ("user_id", self.target.user_id.as_str()),
        ];
        let payload = api.get(PROVIDER_MODELS_PATH, &query).await?;

        let raw = extract_model_list(&payload).ok_or_else(|| {
            ProviderError::MalformedResponse(
                "expected an array, `models`, or `data.models`".to_string(),
            )
        })?;
        let models = normalize_models(raw, &self.target.label);
        if models.is_empty() {
            return Err(ProviderError::NoModels {
                provider: self.target.label.clone(),
            });
        }

        tracing::info!(
            provider = self.target.provider.as_str(),
            count = models.len(),
            dropped = raw.len() - models.len(),
            "fetched provider models"
        );
        self.cache.write(&models);
        Ok(models)
    }

    /// Checks whether `model_id` is in the working set, matching by id and
    /// then by display name. A miss clears the cache so the next fetch goes
    /// back to the provider. Fetch failures are returned to the caller.
    pub async fn test_model_availability(
        &self,
        model_id: &str,
        known_models: Option<&[ModelRecord]>,
    ) -> Result<ModelTestResult> {
        let fetched;
        let models = match known_models {
            Some(models) => models,
            None => {
                fetched = self.fetch_models(false).await?;
                fetched.as_slice()
            }
        };

        let wanted = model_id.trim();
        let found = models
            .iter()
            .find(|m| m.id == wanted)
            .or_else(|| models.iter().find(|m| m.name.eq_ignore_ascii_case(wanted)));

        match found {
            Some(model) => {
                let mut result = ModelTestResult::new(
                    &model.id,
                    &model.name,
                    TestStatus::Available,
                    format!("Model '{}' is available for your account", model.name),
                );
                if let Some(context) = model.format_context_length() {
                    result = result.with_details(format!("Context length: {context}"));
                }
                Ok(result)
            }
            None => {
                self.cache.clear();
                tracing::info!(model_id = wanted, "model not listed; model cache cleared");
                Ok(ModelTestResult::new(
                    wanted,
                    wanted,
                    TestStatus::Unavailable,
                    format!(
                        "Model '{}' is not available for your current {} account",
                        wanted, self.target.label
                    ),
                ))
            }
        }
    }
}
