//! Persisted document types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::de::{lenient_timestamp, loose_opt_string, loose_string};

/// Whole persisted document: `{auth, config, devices}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub auth: AuthInfo,
    #[serde(default)]
    pub config: SyncConfig,
    #[serde(default)]
    pub devices: Vec<Device>,
}

/// Vendor credentials and the current JWT.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthInfo {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, with = "lenient_timestamp")]
    pub token_generated_at: Option<DateTime<Utc>>,
    #[serde(default, with = "lenient_timestamp")]
    pub last_login: Option<DateTime<Utc>>,
}

impl AuthInfo {
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

/// Sync schedule settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    #[serde(default)]
    pub sync_period: SyncPeriod,
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default, with = "lenient_timestamp")]
    pub last_sync_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_running: bool,
}

/// A terminal known to the agent.
///
/// Only `company_id` is user-editable; everything else comes from the
/// vendor's terminal list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(deserialize_with = "loose_string::deserialize")]
    pub id: String,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default, deserialize_with = "loose_opt_string::deserialize")]
    pub company_id: Option<String>,
    #[serde(default, with = "lenient_timestamp")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl Device {
    /// Minimal record carrying only an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            serial_number: None,
            name: None,
            ip_address: None,
            company_id: None,
            last_seen: None,
        }
    }
}

/// Interval between sync cycles. Persisted as the strings `"5"`, `"10"`
/// and `"30"` (minutes).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SyncPeriod {
    #[default]
    FiveMinutes,
    TenMinutes,
    ThirtyMinutes,
}

impl SyncPeriod {
    pub const ALL: [SyncPeriod; 3] = [
        SyncPeriod::FiveMinutes,
        SyncPeriod::TenMinutes,
        SyncPeriod::ThirtyMinutes,
    ];

    /// Strict parse of a period label.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "5" => Some(Self::FiveMinutes),
            "10" => Some(Self::TenMinutes),
            "30" => Some(Self::ThirtyMinutes),
            _ => None,
        }
    }

    /// Parse a period label, falling back to five minutes.
    pub fn from_label_or_default(label: &str) -> Self {
        Self::from_label(label).unwrap_or_else(|| {
            log::warn!("[sync] Unknown sync period {:?}, using 5 minutes", label);
            Self::default()
        })
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::FiveMinutes => "5",
            Self::TenMinutes => "10",
            Self::ThirtyMinutes => "30",
        }
    }

    pub fn minutes(self) -> u64 {
        match self {
            Self::FiveMinutes => 5,
            Self::TenMinutes => 10,
            Self::ThirtyMinutes => 30,
        }
    }

    pub fn interval(self) -> Duration {
        Duration::from_secs(self.minutes() * 60)
    }
}

impl Serialize for SyncPeriod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for SyncPeriod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Ok(match crate::de::value_to_string(raw) {
            Some(label) => Self::from_label_or_default(&label),
            None => Self::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_labels() {
        for period in SyncPeriod::ALL {
            assert_eq!(SyncPeriod::from_label(period.label()), Some(period));
        }
        assert_eq!(SyncPeriod::from_label("15"), None);
        assert_eq!(SyncPeriod::from_label_or_default("15"), SyncPeriod::FiveMinutes);
        assert_eq!(SyncPeriod::ThirtyMinutes.interval(), Duration::from_secs(1800));
    }

    #[test]
    fn period_accepts_numbers_and_unknowns() {
        let p: SyncPeriod = serde_json::from_str("10").unwrap();
        assert_eq!(p, SyncPeriod::TenMinutes);
        let p: SyncPeriod = serde_json::from_str("\"45\"").unwrap();
        assert_eq!(p, SyncPeriod::FiveMinutes);
        assert_eq!(serde_json::to_string(&SyncPeriod::TenMinutes).unwrap(), "\"10\"");
    }

    #[test]
    fn legacy_document_loads() {
        let json = r#"{
            "auth": {"username": "admin", "password": "pw", "token": "abc",
                     "tokenGeneratedAt": "garbage", "lastLogin": null},
            "config": {"syncPeriod": "10", "serverUrl": "http://10.0.0.5:90",
                       "lastSyncTime": "2024-05-01T10:00:00.000Z", "isRunning": true},
            "devices": [{"id": 3, "companyId": 12}, {"id": "4", "serialNumber": "CQZ7"}]
        }"#;
        let doc: StoreDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.auth.token.as_deref(), Some("abc"));
        assert!(doc.auth.token_generated_at.is_none());
        assert_eq!(doc.config.sync_period, SyncPeriod::TenMinutes);
        assert!(doc.config.last_sync_time.is_some());
        assert_eq!(doc.devices[0].id, "3");
        assert_eq!(doc.devices[0].company_id.as_deref(), Some("12"));
        assert_eq!(doc.devices[1].serial_number.as_deref(), Some("CQZ7"));
    }

    #[test]
    fn empty_document_uses_defaults() {
        let doc: StoreDocument = serde_json::from_str("{}").unwrap();
        assert_eq!(doc, StoreDocument::default());
        assert!(!doc.auth.has_credentials());
    }
}
