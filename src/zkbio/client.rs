//! ZKBio Time HTTP client.
//!
//! Reads the server URL and JWT from the store on every call, so a settings
//! change applies to the next request. Failures are classified into
//! [`SyncError`] variants carrying user-facing messages.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::types::*;
use crate::config::{HttpConfig, IngestConfig};
use crate::error::{Result, SyncError};
use crate::reconcile;
use crate::store::{AuthInfo, Device, Store};
use crate::sync::{step, SyncBackend, SyncResult};

/// Tokens are valid for seven days; renew a day early so no request runs
/// with a token expiring mid-flight.
pub const TOKEN_RENEWAL_DAYS: f64 = 6.0;

const TODAY_PAGE_SIZE: u32 = 1000;
const ALL_PAGE_SIZE: u32 = 10_000_000;
const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// True when the stored token is missing, has no issue time, or is at least
/// [`TOKEN_RENEWAL_DAYS`] old.
pub fn should_renew_token(auth: &AuthInfo, now: DateTime<Utc>) -> bool {
    if auth.token.is_none() {
        return true;
    }
    let Some(generated_at) = auth.token_generated_at else {
        return true;
    };
    let elapsed_days = (now - generated_at).num_milliseconds() as f64 / MILLIS_PER_DAY;
    elapsed_days >= TOKEN_RENEWAL_DAYS
}

/// Client for the vendor API and the downstream ingestion endpoint.
#[derive(Debug, Clone)]
pub struct ZkBioClient {
    http: reqwest::Client,
    store: Store,
    ingest: IngestConfig,
}

impl ZkBioClient {
    pub fn new(store: Store, http: &HttpConfig, ingest: IngestConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(http.timeout_secs))
            .build()
            .map_err(|e| SyncError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http: client,
            store,
            ingest,
        })
    }

    /// Exchange credentials for a JWT and persist both.
    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        if username.is_empty() || password.is_empty() {
            log::error!("[zkbio] Login failed: missing username or password");
            return Err(SyncError::Config("Username or password is missing".to_string()));
        }
        let base = self.base_url()?;
        let url = format!("{}/jwt-api-token-auth/", base);

        log::info!("[zkbio] Logging in to {} as {}", base, username);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .map_err(|e| transport_error(e, &base))?;

        let status = response.status();
        match status {
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                log::warn!("[zkbio] Login rejected ({})", status);
                return Err(SyncError::Auth("Incorrect username or password".to_string()));
            }
            StatusCode::NOT_FOUND => {
                return Err(SyncError::NotFound(format!(
                    "API endpoint not found at {}. Please check your server URL.",
                    url
                )));
            }
            s if !s.is_success() => {
                return Err(SyncError::Remote(format!(
                    "Login failed with status code {}",
                    s.as_u16()
                )));
            }
            _ => {}
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Remote(format!("Invalid response from server: {}", e)))?;
        let token = match body.token {
            Some(token) if !token.is_empty() => token,
            _ => {
                log::error!("[zkbio] Login response is missing the token");
                return Err(SyncError::Auth(
                    "Invalid response from server (missing token)".to_string(),
                ));
            }
        };

        self.store
            .save_auth_info(username, password, Some(token.clone()))?;
        log::info!("[zkbio] Login successful, token stored");
        Ok(token)
    }

    /// Fetch all employees as `{user_id, username}` records.
    pub async fn get_all_employees(&self) -> Result<Vec<Employee>> {
        let page: Page<RawEmployee> = self.get_json("/personnel/api/employees/").await?;
        let employees = transform_employees(page.data);
        log::info!("[zkbio] Fetched {} employees", employees.len());
        Ok(employees)
    }

    /// Fetch terminals, merge them into the stored devices and persist the
    /// result. Returns the merged list.
    pub async fn get_devices(&self) -> Result<Vec<Device>> {
        let page: Page<RawTerminal> = self.get_json("/iclock/api/terminals/").await?;
        let now = Utc::now();
        let remote: Vec<Device> = page
            .data
            .into_iter()
            .map(|t| terminal_to_device(t, now))
            .collect();
        log::info!("[zkbio] Fetched {} terminals", remote.len());

        // Merge under the store lock so a concurrent company id edit is kept.
        self.store.update(|doc| {
            doc.devices = reconcile::merge(remote, &doc.devices);
            doc.devices.clone()
        })
    }

    /// Today's punches (UTC date).
    pub async fn get_device_logs_of_today(&self) -> Result<Vec<AttendanceLog>> {
        let today = Utc::now().format("%Y-%m-%d");
        let path = format!(
            "/iclock/api/transactions/?page_size={}&start_time={}",
            TODAY_PAGE_SIZE, today
        );
        self.fetch_logs(&path).await
    }

    /// Every punch the server holds.
    pub async fn get_device_logs_all(&self) -> Result<Vec<AttendanceLog>> {
        let path = format!("/iclock/api/transactions/?page_size={}", ALL_PAGE_SIZE);
        self.fetch_logs(&path).await
    }

    /// Post logs and employees to the downstream ingestion endpoint.
    pub async fn send_to_external_api(
        &self,
        logs: &[AttendanceLog],
        employees: &[Employee],
    ) -> Result<Value> {
        let url = self.ingest.url.as_deref().filter(|u| !u.trim().is_empty()).ok_or_else(|| {
            SyncError::Config("Downstream ingestion URL is not configured".to_string())
        })?;
        let key = self.ingest.key.as_deref().filter(|k| !k.is_empty()).ok_or_else(|| {
            SyncError::Config("Downstream ingestion key is not configured".to_string())
        })?;

        let payload = IngestPayload {
            logs,
            users: employees,
            key,
        };
        let response = self
            .http
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport_error(e, url))?;

        let status = response.status();
        if !status.is_success() {
            log::error!("[zkbio] Failed to send data to external API: {}", status);
            return Err(SyncError::Remote(format!(
                "HTTP error! status: {}",
                status.as_u16()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SyncError::Remote(e.to_string()))?;
        log::info!(
            "[zkbio] Forwarded {} logs and {} users downstream",
            logs.len(),
            employees.len()
        );
        Ok(serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    /// One sync cycle: renew the token if due, fetch employees, devices and
    /// today's logs, then forward when both employees and logs succeeded.
    ///
    /// A failed renewal aborts with a single `Login` result. Every other step
    /// records exactly one result whatever its outcome.
    pub async fn run_sync_sequence(&self) -> Vec<SyncResult> {
        let auth = self.store.auth();
        if should_renew_token(&auth, Utc::now()) {
            log::info!("[zkbio] Token due for renewal");
            if let Err(e) = self.login(&auth.username, &auth.password).await {
                log::error!("[zkbio] Failed to renew token before sync: {}", e);
                return vec![SyncResult::failure(step::LOGIN, Utc::now(), e)];
            }
        }

        let timestamp = Utc::now();
        let mut results = Vec::with_capacity(4);

        let employees = self.get_all_employees().await;
        results.push(step_result(step::EMPLOYEES, timestamp, &employees));

        let devices = self.get_devices().await;
        results.push(step_result(step::DEVICES, timestamp, &devices));

        let logs = self.get_device_logs_of_today().await;
        results.push(step_result(step::DEVICE_LOGS, timestamp, &logs));

        if let (Ok(employees), Ok(logs)) = (&employees, &logs) {
            let forwarded = match self.send_to_external_api(logs, employees).await {
                Ok(data) => SyncResult::success(step::EXTERNAL_API, timestamp)
                    .with_message("Data sent successfully to external API")
                    .with_data(data),
                Err(e) => SyncResult::failure(step::EXTERNAL_API, timestamp, e),
            };
            results.push(forwarded);
        }

        results
    }

    async fn fetch_logs(&self, path: &str) -> Result<Vec<AttendanceLog>> {
        let page: Page<RawTransaction> = self.get_json(path).await?;
        let logs = transform_logs(page.data, &self.store.devices());
        log::info!("[zkbio] Fetched {} attendance logs", logs.len());
        Ok(logs)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let base = self.base_url()?;
        let token = self
            .store
            .auth()
            .token
            .ok_or_else(|| SyncError::Auth("Not logged in".to_string()))?;

        let response = self
            .http
            .get(format!("{}{}", base, path))
            .header(AUTHORIZATION, format!("JWT {}", token))
            .send()
            .await
            .map_err(|e| transport_error(e, &base))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(SyncError::Auth(
                "Token rejected by server (401)".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(SyncError::Remote(format!(
                "Request failed with status code {}",
                status.as_u16()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| SyncError::Remote(format!("Invalid response from {}: {}", path, e)))
    }

    fn base_url(&self) -> Result<String> {
        self.store
            .config()
            .server_url
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                SyncError::Config(
                    "Invalid server URL. Please check your server settings.".to_string(),
                )
            })
    }
}

#[async_trait]
impl SyncBackend for ZkBioClient {
    async fn login(&self, username: &str, password: &str) -> Result<String> {
        ZkBioClient::login(self, username, password).await
    }

    async fn run_sync_sequence(&self) -> Vec<SyncResult> {
        ZkBioClient::run_sync_sequence(self).await
    }
}

fn transport_error(e: reqwest::Error, target: &str) -> SyncError {
    if e.is_connect() || e.is_timeout() {
        log::warn!("[zkbio] Cannot reach {}: {}", target, e);
        SyncError::Connection(format!(
            "Cannot connect to server at {}. Please check your server settings and network connection.",
            target
        ))
    } else {
        SyncError::Remote(e.to_string())
    }
}

fn step_result<T>(api: &str, timestamp: DateTime<Utc>, outcome: &Result<Vec<T>>) -> SyncResult {
    match outcome {
        Ok(items) => SyncResult::success(api, timestamp).with_data(json!({ "count": items.len() })),
        Err(e) => SyncResult::failure(api, timestamp, e),
    }
}

fn transform_employees(raw: Vec<RawEmployee>) -> Vec<Employee> {
    raw.into_iter()
        .map(|e| {
            let first = e.first_name.unwrap_or_default();
            let last = e.last_name.unwrap_or_default();
            Employee {
                user_id: e.emp_code,
                username: format!("{} {}", first, last).trim().to_string(),
            }
        })
        .collect()
}

fn terminal_to_device(t: RawTerminal, now: DateTime<Utc>) -> Device {
    Device {
        id: t.id,
        name: t.alias.filter(|a| !a.is_empty()).or_else(|| t.sn.clone()),
        serial_number: t.sn,
        ip_address: t.ip_address,
        company_id: None,
        last_seen: Some(now),
    }
}

/// Resolve each punch's company through the terminal it came from, falling
/// back to the employee field the vendor sent.
fn transform_logs(raw: Vec<RawTransaction>, devices: &[Device]) -> Vec<AttendanceLog> {
    let companies: HashMap<&str, &str> = devices
        .iter()
        .filter_map(|d| {
            let company = d.company_id.as_deref().filter(|c| !c.is_empty())?;
            Some((d.serial_number.as_deref()?, company))
        })
        .collect();

    raw.into_iter()
        .map(|tx| {
            let company_id = tx
                .terminal_sn
                .as_deref()
                .and_then(|sn| companies.get(sn))
                .map(|c| c.to_string())
                .or(tx.emp);
            AttendanceLog {
                timestamp: tx.punch_time,
                device_serial: tx.terminal_sn,
                user_id: tx.emp_code,
                company_id,
                created_at: tx.upload_time,
            }
        })
        .collect()
}
