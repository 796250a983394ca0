use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A model reachable with the saved key, after normalisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub id: String,
    pub name: String,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<ModelPricing>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ModelRecord {
    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.trim().to_ascii_lowercase();
        if needle.is_empty() {
            return true;
        }
        [&self.id, &self.name, &self.provider]
            .iter()
            .any(|field| field.to_ascii_lowercase().contains(&needle))
    }

    pub fn format_context_length(&self) -> Option<String> {
        let tokens = self.context_length?;
        Some(if tokens >= 1_000_000 && tokens % 1_000_000 == 0 {
            format!("{}M tokens", tokens / 1_000_000)
        } else if tokens >= 1_000 {
            format!("{}K tokens", tokens / 1_000)
        } else {
            format!("{tokens} tokens")
        })
    }
}

/// Per-token prices as published by the provider. Either side may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<f64>,
}

impl ModelPricing {
    pub fn is_empty(&self) -> bool {
        self.prompt.is_none() && self.completion.is_none()
    }

    pub fn format_prompt(&self) -> Option<String> {
        self.prompt.map(format_per_million)
    }

    pub fn format_completion(&self) -> Option<String> {
        self.completion.map(format_per_million)
    }
}

fn format_per_million(per_token: f64) -> String {
    let per_million = per_token * 1_000_000.0;
    if per_million == 0.0 {
        "free".to_string()
    } else if per_million < 0.01 {
        format!("${per_million:.4} / 1M tokens")
    } else {
        format!("${per_million:.2} / 1M tokens")
    }
}
