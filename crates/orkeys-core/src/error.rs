use orkeys_providers::ProviderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeysError {
    #[error("{0} service not available")]
    ServiceUnavailable(&'static str),

    #[error("Request failed: {0}")]
    Transport(#[from] anyhow::Error),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

const SERVICE_HINT: &str = "Please reload the page or contact your administrator.";

impl KeysError {
    /// Message suitable for an inline UI error slot.
    pub fn user_message(&self) -> String {
        match self {
            KeysError::ServiceUnavailable(name)
            | KeysError::Provider(ProviderError::ServiceUnavailable(name)) => {
                format!("{name} service not available. {SERVICE_HINT}")
            }
            KeysError::Provider(err) => err.to_string(),
            other => other.to_string(),
        }
    }
}

// Host bridges expect errors as plain strings.
impl serde::Serialize for KeysError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, KeysError>;
