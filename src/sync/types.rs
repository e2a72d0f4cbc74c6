//! Result events streamed to listeners, one per pipeline step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Step labels as shown in the log stream.
pub mod step {
    pub const LOGIN: &str = "Login";
    pub const EMPLOYEES: &str = "Get All Employees";
    pub const DEVICES: &str = "Get Devices";
    pub const DEVICE_LOGS: &str = "Device Logs";
    pub const EXTERNAL_API: &str = "External API";
    pub const SYSTEM: &str = "System";
}

/// Outcome of one pipeline step. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub timestamp: DateTime<Utc>,
    pub api: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl SyncResult {
    pub fn success(api: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            api: api.to_string(),
            success: true,
            error: None,
            message: None,
            data: None,
        }
    }

    pub fn failure(api: &str, timestamp: DateTime<Utc>, error: impl ToString) -> Self {
        Self {
            timestamp,
            api: api.to_string(),
            success: false,
            error: Some(error.to_string()),
            message: None,
            data: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Vendor credentials supplied when starting a sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}
