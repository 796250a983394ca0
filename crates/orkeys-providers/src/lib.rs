pub mod api;
pub mod cache;
pub mod clock;
pub mod error;
pub mod normalize;
pub mod service;

pub use api::*;
pub use cache::*;
pub use clock::*;
pub use error::ProviderError;
pub use normalize::{extract_model_list, normalize_model, normalize_models};
pub use service::*;
