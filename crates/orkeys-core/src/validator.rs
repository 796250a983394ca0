use serde::Serialize;

pub const DEFAULT_KEY_PREFIX: &str = "sk-or-";
pub const DEFAULT_MIN_KEY_SUFFIX: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationOutcome {
    fn ok() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(message.into()),
        }
    }
}

/// Format rules for a provider key. Pure and cheap enough to run per keystroke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValidator {
    prefix: String,
    min_suffix: usize,
}

impl Default for KeyValidator {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX, DEFAULT_MIN_KEY_SUFFIX)
    }
}

impl KeyValidator {
    pub fn new(prefix: impl Into<String>, min_suffix: usize) -> Self {
        Self {
            prefix: prefix.into(),
            min_suffix,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn min_length(&self) -> usize {
        self.prefix.chars().count() + self.min_suffix
    }

    /// Rules apply in order and stop at the first failure. An exactly empty
    /// candidate passes when `allow_empty` is set (clearing the key).
    pub fn validate(&self, candidate: &str, allow_empty: bool) -> ValidationOutcome {
        if candidate.trim().is_empty() {
            if allow_empty && candidate.is_empty() {
                return ValidationOutcome::ok();
            }
            return ValidationOutcome::fail("API key cannot be empty");
        }
        if !candidate.starts_with(&self.prefix) {
            return ValidationOutcome::fail(format!("API key must start with '{}'", self.prefix));
        }
        if candidate.chars().count() < self.min_length() {
            return ValidationOutcome::fail("API key is too short");
        }
        if candidate.contains([' ', '\n', '\t']) {
            return ValidationOutcome::fail("API key contains invalid characters");
        }
        ValidationOutcome::ok()
    }
}
