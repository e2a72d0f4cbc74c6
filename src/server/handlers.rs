//! JSON route handlers. Every body carries `success`; failures add `error`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::app::App;
use crate::de::value_to_string;
use crate::error::SyncError;

pub type ApiResult = Result<Json<Value>, ApiError>;

/// A [`SyncError`] rendered as a `{success: false, error, kind}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: SyncError,
}

impl ApiError {
    fn bad_request(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: SyncError::Config(message.to_string()),
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(error: SyncError) -> Self {
        let status = match error {
            SyncError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        Self { status, error }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            log::error!("[server] {}", self.error);
        }
        let body = json!({
            "success": false,
            "error": self.error.to_string(),
            "kind": self.error.kind(),
        });
        (self.status, Json(body)).into_response()
    }
}

/// `{success: true}` merged with the fields of `value`.
fn ok_with<T: Serialize>(value: T) -> ApiResult {
    let mut body = serde_json::to_value(value)
        .map_err(|e| ApiError::from(SyncError::Store(e.to_string())))?;
    match body.as_object_mut() {
        Some(map) => {
            map.insert("success".to_string(), Value::Bool(true));
        }
        None => body = json!({ "success": true, "data": body }),
    }
    Ok(Json(body))
}

/// Distinguishes an absent field (`None`) from an explicit `null`.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

pub async fn start_sync(State(app): State<App>) -> ApiResult {
    app.start_sync_from_store().await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn stop_sync(State(app): State<App>) -> ApiResult {
    let message = app.stop_sync().await?;
    Ok(Json(json!({ "success": true, "message": message })))
}

pub async fn sync_status(State(app): State<App>) -> ApiResult {
    let config = app.get_config();
    ok_with(json!({
        "isRunning": config.is_running,
        "lastSyncTime": config.last_sync_time,
    }))
}

pub async fn get_credentials(State(app): State<App>) -> ApiResult {
    ok_with(app.get_saved_credentials())
}

#[derive(Debug, Deserialize)]
pub struct CredentialsBody {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

pub async fn save_credentials(
    State(app): State<App>,
    Json(body): Json<CredentialsBody>,
) -> ApiResult {
    app.save_credentials(&body.username, &body.password)?;
    Ok(Json(json!({
        "success": true,
        "message": "Credentials saved successfully",
    })))
}

pub async fn get_sync_period(State(app): State<App>) -> ApiResult {
    ok_with(json!({ "syncPeriod": app.get_config().sync_period }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPeriodBody {
    #[serde(default)]
    sync_period: Option<Value>,
}

pub async fn save_sync_period(
    State(app): State<App>,
    Json(body): Json<SyncPeriodBody>,
) -> ApiResult {
    let label = body
        .sync_period
        .and_then(value_to_string)
        .ok_or_else(|| ApiError::bad_request("Sync period is required"))?;
    let period = app.save_sync_period(&label)?;
    ok_with(json!({ "syncPeriod": period }))
}

pub async fn get_server(State(app): State<App>) -> ApiResult {
    ok_with(json!({ "url": app.get_config().server_url }))
}

#[derive(Debug, Deserialize)]
pub struct ServerBody {
    #[serde(default)]
    url: String,
}

pub async fn save_server(State(app): State<App>, Json(body): Json<ServerBody>) -> ApiResult {
    let url = app.save_server_url(&body.url)?;
    Ok(Json(json!({
        "success": true,
        "message": "Server URL updated successfully",
        "url": url,
    })))
}

pub async fn get_config(State(app): State<App>) -> ApiResult {
    let config = app.get_config();
    let credentials = app.get_saved_credentials();
    ok_with(json!({
        "syncPeriod": config.sync_period,
        "serverUrl": config.server_url,
        "lastSyncTime": config.last_sync_time,
        "isRunning": config.is_running,
        "username": credentials.username,
        "hasCredentials": credentials.has_credentials,
    }))
}

pub async fn get_devices(State(app): State<App>) -> ApiResult {
    let devices = app.get_devices().await?;
    ok_with(json!({ "devices": devices }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyBody {
    #[serde(default, deserialize_with = "present")]
    company_id: Option<Value>,
}

pub async fn update_device_company(
    State(app): State<App>,
    Path(device_id): Path<String>,
    Json(body): Json<CompanyBody>,
) -> ApiResult {
    let company_id = body
        .company_id
        .ok_or_else(|| ApiError::bad_request("Device ID and Company ID are required"))?;
    let device = app.update_device_company_id(&device_id, value_to_string(company_id))?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Company ID updated for device {}", device.id),
        "deviceId": device.id,
        "companyId": device.company_id,
    })))
}

pub async fn sync_all_logs(State(app): State<App>) -> ApiResult {
    let logs = app.sync_all_logs().await?;
    Ok(Json(json!({
        "success": true,
        "message": "Successfully retrieved all device logs",
        "data": logs,
    })))
}
