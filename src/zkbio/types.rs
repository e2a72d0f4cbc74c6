//! ZKBio Time wire types and the normalized records forwarded downstream.

use serde::{Deserialize, Serialize};

use crate::de::{loose_opt_string, loose_string};

/// Paged list envelope used by every vendor list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

/// Response of `POST /jwt-api-token-auth/`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub token: Option<String>,
}

/// Entry of `GET /personnel/api/employees/`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEmployee {
    #[serde(default, deserialize_with = "loose_opt_string::deserialize")]
    pub emp_code: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Entry of `GET /iclock/api/terminals/`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTerminal {
    #[serde(deserialize_with = "loose_string::deserialize")]
    pub id: String,
    #[serde(default)]
    pub sn: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

/// Entry of `GET /iclock/api/transactions/`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTransaction {
    #[serde(default)]
    pub punch_time: Option<String>,
    #[serde(default)]
    pub terminal_sn: Option<String>,
    #[serde(default, deserialize_with = "loose_opt_string::deserialize")]
    pub emp_code: Option<String>,
    #[serde(default, deserialize_with = "loose_opt_string::deserialize")]
    pub emp: Option<String>,
    #[serde(default)]
    pub upload_time: Option<String>,
}

/// Employee as forwarded downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub user_id: Option<String>,
    pub username: String,
}

/// Attendance punch as forwarded downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceLog {
    pub timestamp: Option<String>,
    pub device_serial: Option<String>,
    pub user_id: Option<String>,
    pub company_id: Option<String>,
    pub created_at: Option<String>,
}

/// Body posted to the downstream ingestion endpoint.
#[derive(Debug, Serialize)]
pub struct IngestPayload<'a> {
    pub logs: &'a [AttendanceLog],
    pub users: &'a [Employee],
    pub key: &'a str,
}
