pub mod config;
pub mod error;
pub mod event_bus;
pub mod host;
pub mod settings_client;
pub mod validator;
pub mod widget;
pub mod widget_state;

pub use config::*;
pub use error::{KeysError, Result};
pub use event_bus::*;
pub use host::*;
pub use settings_client::*;
pub use validator::*;
pub use widget::*;
pub use widget_state::{
    ActionOutcome, Phase, Tab, TabKey, WidgetSnapshot, NOTHING_TO_REMOVE_MESSAGE,
    NO_MODEL_SELECTED_MESSAGE, REMOVED_NOTICE, REMOVE_FAILED_MESSAGE, SAVED_NOTICE,
    SAVE_FAILED_MESSAGE, TAB_GUARD_MESSAGE,
};
