pub mod availability;
pub mod credential;
pub mod model;
pub mod settings;
pub mod theme;

pub use availability::*;
pub use credential::*;
pub use model::*;
pub use settings::*;
pub use theme::*;

pub const PROVIDER_ID: &str = "openrouter";
pub const PROVIDER_LABEL: &str = "OpenRouter";
pub const PROVIDER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const PROVIDER_DEFAULT_MODEL: &str = "openai/gpt-3.5-turbo";
pub const SETTINGS_DEFINITION_ID: &str = "openrouter_api_keys_settings";
pub const SETTINGS_INSTANCE_NAME: &str = "OpenRouter API Keys Settings";
pub const DEFAULT_SERVER_ID: &str = "openrouter_default_server";
