use std::collections::HashSet;

use serde_json::{Map, Value};

use orkeys_types::{ModelPricing, ModelRecord};

const UNKNOWN_MODEL_NAME: &str = "Unknown model";

const ID_FIELDS: [&str; 3] = ["id", "model", "name"];
const NAME_FIELDS: [&str; 2] = ["name", "id"];
const PROVIDER_FIELDS: [&str; 3] = ["provider", "owned_by", "owner"];
const PROMPT_PRICE_FIELDS: [&str; 3] = ["prompt", "input", "prompt_price"];
const COMPLETION_PRICE_FIELDS: [&str; 3] = ["completion", "output", "completion_price"];

/// Fields consumed into dedicated record attributes rather than metadata.
const CONSUMED_FIELDS: [&str; 10] = [
    "id",
    "model",
    "name",
    "provider",
    "owned_by",
    "owner",
    "pricing",
    "context_length",
    "contextLength",
    "context_window",
];

/// Picks the model array out of a provider payload. Shapes are tried in
/// priority order: bare array, `models`, `data.models`.
pub fn extract_model_list(payload: &Value) -> Option<&Vec<Value>> {
    if let Some(list) = payload.as_array() {
        return Some(list);
    }
    if let Some(list) = payload.get("models").and_then(|v| v.as_array()) {
        return Some(list);
    }
    payload
        .get("data")
        .and_then(|v| v.get("models"))
        .and_then(|v| v.as_array())
}

/// Normalises every entry, dropping those without an id and keeping the
/// first occurrence of a duplicated id.
pub fn normalize_models(raw: &[Value], provider_label: &str) -> Vec<ModelRecord> {
    let mut seen = HashSet::new();
    raw.iter()
        .filter_map(|entry| normalize_model(entry, provider_label))
        .filter(|model| seen.insert(model.id.clone()))
        .collect()
}

pub fn normalize_model(raw: &Value, provider_label: &str) -> Option<ModelRecord> {
    let obj = raw.as_object()?;

    let id = first_string(obj, &ID_FIELDS)?;
    let name = first_string(obj, &NAME_FIELDS).unwrap_or_else(|| UNKNOWN_MODEL_NAME.to_string());
    let provider =
        first_string(obj, &PROVIDER_FIELDS).unwrap_or_else(|| provider_label.to_string());

    let metadata = obj
        .iter()
        .filter(|(key, _)| !CONSUMED_FIELDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect::<Map<String, Value>>();

    Some(ModelRecord {
        id,
        name,
        provider,
        context_length: context_length(raw),
        pricing: pricing(raw),
        metadata,
    })
}

/// First field holding a non-blank string or a number, as text.
fn first_string(obj: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| match obj.get(*field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn context_length(raw: &Value) -> Option<u64> {
    raw.get("context_length")
        .and_then(as_u64_like)
        .or_else(|| raw.get("contextLength").and_then(as_u64_like))
        .or_else(|| raw.get("context_window").and_then(as_u64_like))
        .or_else(|| {
            raw.get("top_provider")
                .and_then(|v| v.get("context_length"))
                .and_then(as_u64_like)
        })
        .or_else(|| {
            raw.get("limit")
                .and_then(|v| v.get("context"))
                .and_then(as_u64_like)
        })
        .or_else(|| {
            raw.get("metadata")
                .and_then(|v| v.get("context_length"))
                .and_then(as_u64_like)
        })
        .filter(|tokens| *tokens > 0)
}

fn pricing(raw: &Value) -> Option<ModelPricing> {
    let pricing = raw.get("pricing")?.as_object()?;
    let pick = |fields: &[&str]| {
        fields
            .iter()
            .find_map(|field| pricing.get(*field).and_then(as_f64_like))
    };
    let normalized = ModelPricing {
        prompt: pick(&PROMPT_PRICE_FIELDS),
        completion: pick(&COMPLETION_PRICE_FIELDS),
    };
    (!normalized.is_empty()).then_some(normalized)
}

fn as_u64_like(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn as_f64_like(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|f| f.is_finite() && *f >= 0.0)
}
