use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use orkeys_observability::redact_text;

pub const SETTINGS_INSTANCES_PATH: &str = "/api/v1/settings/instances";
pub const PROVIDER_MODELS_PATH: &str = "/api/v1/ai/providers/models";
pub const CURRENT_USER_PATH: &str = "/api/v1/auth/me";

/// The host application's authenticated API client.
///
/// Paths are host-relative; query pairs are appended URL-encoded. Any
/// transport or status failure is an error, and a single attempt is made.
#[async_trait]
pub trait HostApi: Send + Sync {
    async fn get(&self, path: &str, query: &[(&str, &str)]) -> anyhow::Result<Value>;
    async fn post(&self, path: &str, body: Value) -> anyhow::Result<Value>;

    async fn current_user_id(&self) -> anyhow::Result<String> {
        let value = self.get(CURRENT_USER_PATH, &[]).await?;
        value
            .get("id")
            .or_else(|| value.get("data").and_then(|d| d.get("id")))
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("current user response did not include an id"))
    }
}

/// `HostApi` over HTTP with an optional bearer token.
pub struct HttpHostApi {
    base_url: String,
    token: Option<String>,
    client: Client,
}

impl HttpHostApi {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: normalize_base(base_url),
            token: token.filter(|t| !t.trim().is_empty()),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn read_json(response: reqwest::Response) -> anyhow::Result<Value> {
        let status = response.status();
        let url = response.url().to_string();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::debug!(
                "request to {} failed ({}): {}",
                url,
                status,
                body_excerpt(&body, 500)
            );
            let detail = extract_error_detail(&body)
                .map(|detail| redact_text(&detail))
                .unwrap_or_else(|| body_excerpt(&body, 200));
            anyhow::bail!("request failed with status {}: {}", status, detail);
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|err| {
            anyhow::anyhow!(
                "failed to parse response from {}: {} (body: {})",
                url,
                err,
                body_excerpt(&body, 200)
            )
        })
    }
}

#[async_trait]
impl HostApi for HttpHostApi {
    async fn get(&self, path: &str, query: &[(&str, &str)]) -> anyhow::Result<Value> {
        let mut req = self.client.get(self.url(path)).query(query);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let response = req.send().await?;
        Self::read_json(response).await
    }

    async fn post(&self, path: &str, body: Value) -> anyhow::Result<Value> {
        let mut req = self.client.post(self.url(path)).json(&body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let response = req.send().await?;
        Self::read_json(response).await
    }
}

fn normalize_base(input: &str) -> String {
    input.trim().trim_end_matches('/').to_string()
}

fn truncate_for_error(input: &str, max_len: usize) -> String {
    if input.len() <= max_len {
        return input.to_string();
    }
    let mut end = max_len;
    while !input.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &input[..end])
}

/// Redacted, truncated body for logs and error messages.
fn body_excerpt(body: &str, max_len: usize) -> String {
    truncate_for_error(&redact_text(body), max_len)
}

fn extract_error_detail(body: &str) -> Option<String> {
    let value = serde_json::from_str::<Value>(body).ok()?;
    value
        .get("detail")
        .and_then(|v| v.as_str())
        .or_else(|| {
            value
                .get("error")
                .and_then(|v| v.get("message"))
                .and_then(|v| v.as_str())
        })
        .or_else(|| value.get("message").and_then(|v| v.as_str()))
        .map(|s| s.to_string())
}
