use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const TEST_HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Available,
    Unavailable,
    Unknown,
}

impl TestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TestStatus::Available => "available",
            TestStatus::Unavailable => "unavailable",
            TestStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTestResult {
    pub id: Uuid,
    pub model_id: String,
    pub model_name: String,
    pub status: TestStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ModelTestResult {
    pub fn new(
        model_id: impl Into<String>,
        model_name: impl Into<String>,
        status: TestStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            model_id: model_id.into(),
            model_name: model_name.into(),
            status,
            message: message.into(),
            details: None,
            timestamp: Utc::now(),
        }
    }

    /// Result recorded when the check itself could not complete.
    pub fn unknown(model_id: &str, model_name: Option<&str>, error: impl ToString) -> Self {
        let mut result = Self::new(
            model_id,
            model_name.unwrap_or(model_id),
            TestStatus::Unknown,
            "Could not verify model availability",
        );
        result.details = Some(error.to_string());
        result
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Most-recent-first history of availability checks, capped at
/// [`TEST_HISTORY_LIMIT`] entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestHistory {
    entries: VecDeque<ModelTestResult>,
}

impl TestHistory {
    pub fn push(&mut self, result: ModelTestResult) {
        self.entries.push_front(result);
        self.entries.truncate(TEST_HISTORY_LIMIT);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_vec(&self) -> Vec<ModelTestResult> {
        self.entries.iter().cloned().collect()
    }
}
