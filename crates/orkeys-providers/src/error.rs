use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{0} service not available")]
    ServiceUnavailable(&'static str),

    #[error("no models returned by {provider}; check the API key or try again later")]
    NoModels { provider: String },

    #[error("unexpected models response: {0}")]
    MalformedResponse(String),

    #[error("model request failed: {0}")]
    Transport(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ProviderError>;
