//! Tauri command handlers.
//!
//! Thin wrappers over [`App`]; the frontend receives sync results as
//! `sync-log` events rather than through these calls.

use serde::Serialize;
use tauri::State;

use crate::app::{App, ConfigView, SavedCredentials};
use crate::store::Device;
use crate::sync::Credentials;
use crate::zkbio::AttendanceLog;

/// Outcome of start/stop, shaped for the frontend log panel.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Start the recurring sync
#[tauri::command]
pub async fn start_sync(
    app: State<'_, App>,
    period: String,
    credentials: Credentials,
) -> Result<CommandResult, String> {
    log::info!("[sync::cmd] start_sync every {} minutes", period);
    Ok(match app.start_sync(&period, credentials).await {
        Ok(()) => CommandResult {
            success: true,
            message: Some("Sync started".to_string()),
            error: None,
        },
        Err(e) => CommandResult {
            success: false,
            message: None,
            error: Some(e.to_string()),
        },
    })
}

/// Stop the recurring sync
#[tauri::command]
pub async fn stop_sync(app: State<'_, App>) -> Result<CommandResult, String> {
    log::info!("[sync::cmd] stop_sync");
    Ok(match app.stop_sync().await {
        Ok(message) => CommandResult {
            success: true,
            message: Some(message.to_string()),
            error: None,
        },
        Err(e) => CommandResult {
            success: false,
            message: Some(e.to_string()),
            error: None,
        },
    })
}

#[tauri::command]
pub async fn get_sync_status(app: State<'_, App>) -> Result<bool, String> {
    Ok(app.is_running())
}

#[tauri::command]
pub async fn get_config(app: State<'_, App>) -> Result<ConfigView, String> {
    Ok(app.get_config())
}

#[tauri::command]
pub async fn get_saved_credentials(app: State<'_, App>) -> Result<SavedCredentials, String> {
    Ok(app.get_saved_credentials())
}

#[tauri::command]
pub async fn save_credentials(
    app: State<'_, App>,
    username: String,
    password: String,
) -> Result<(), String> {
    app.save_credentials(&username, &password)
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn save_server_url(app: State<'_, App>, url: String) -> Result<String, String> {
    app.save_server_url(&url).map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn save_sync_period(app: State<'_, App>, period: String) -> Result<String, String> {
    app.save_sync_period(&period)
        .map(|p| p.label().to_string())
        .map_err(|e| e.to_string())
}

/// Fetch terminals from the server, merged with stored company ids
#[tauri::command]
pub async fn get_devices(app: State<'_, App>) -> Result<Vec<Device>, String> {
    log::info!("[sync::cmd] get_devices");
    app.get_devices().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn update_device_company_id(
    app: State<'_, App>,
    device_id: serde_json::Value,
    company_id: Option<serde_json::Value>,
) -> Result<Device, String> {
    let device_id = crate::de::value_to_string(device_id)
        .ok_or_else(|| "Device ID is required".to_string())?;
    log::info!("[sync::cmd] update_device_company_id {}", device_id);
    app.update_device_company_id(&device_id, company_id.and_then(crate::de::value_to_string))
        .map_err(|e| e.to_string())
}

/// Fetch every attendance log on the server
#[tauri::command]
pub async fn sync_all_logs(app: State<'_, App>) -> Result<Vec<AttendanceLog>, String> {
    log::info!("[sync::cmd] sync_all_logs");
    app.sync_all_logs().await.map_err(|e| e.to_string())
}
