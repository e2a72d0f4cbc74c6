//! Application facade shared by the HTTP server and the desktop commands.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::config::AppConfig;
use crate::de::lenient_timestamp;
use crate::error::{Result, SyncError};
use crate::store::{Device, Store, SyncPeriod};
use crate::sync::{Credentials, SyncBackend, SyncOrchestrator, SyncResult};
use crate::zkbio::{AttendanceLog, ZkBioClient};

/// Sync settings plus the live running state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigView {
    pub sync_period: SyncPeriod,
    pub server_url: Option<String>,
    #[serde(default, with = "lenient_timestamp")]
    pub last_sync_time: Option<DateTime<Utc>>,
    pub is_running: bool,
}

/// Stored credentials, for pre-filling the settings form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedCredentials {
    pub username: String,
    pub password: String,
    pub has_credentials: bool,
    #[serde(default, with = "lenient_timestamp")]
    pub last_login: Option<DateTime<Utc>>,
}

/// One store, one client, one orchestrator; built once at startup.
#[derive(Clone)]
pub struct App {
    store: Store,
    client: Arc<ZkBioClient>,
    sync: Arc<SyncOrchestrator>,
}

impl App {
    pub fn new(config: &AppConfig, store: Store) -> Result<Self> {
        if store.config().server_url.is_none() {
            if let Some(url) = &config.default_server_url {
                log::info!("[app] Using default server URL {}", url);
                store.save_server_url(url)?;
            }
        }
        let client = Arc::new(ZkBioClient::new(
            store.clone(),
            &config.http,
            config.ingest.clone(),
        )?);
        Ok(Self::with_backend(store, client.clone(), client))
    }

    /// Build with a custom sync backend; the client still serves the
    /// on-demand device and log queries.
    pub fn with_backend(
        store: Store,
        client: Arc<ZkBioClient>,
        backend: Arc<dyn SyncBackend>,
    ) -> Self {
        let sync = Arc::new(SyncOrchestrator::new(store.clone(), backend));
        Self {
            store,
            client,
            sync,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncResult> {
        self.sync.subscribe()
    }

    /// Start syncing with explicit credentials. Unknown periods fall back to
    /// five minutes.
    pub async fn start_sync(&self, period: &str, credentials: Credentials) -> Result<()> {
        let period = SyncPeriod::from_label_or_default(period);
        self.sync.start_sync(period, &credentials).await
    }

    /// Start syncing with the settings saved in the store.
    pub async fn start_sync_from_store(&self) -> Result<()> {
        let doc = self.store.snapshot();
        let has_server = doc
            .config
            .server_url
            .as_deref()
            .is_some_and(|u| !u.trim().is_empty());
        if !doc.auth.has_credentials() || !has_server {
            return Err(SyncError::Config(
                "Missing required configuration or credentials".to_string(),
            ));
        }
        let credentials = Credentials::new(doc.auth.username, doc.auth.password);
        self.sync
            .start_sync(doc.config.sync_period, &credentials)
            .await
    }

    pub async fn stop_sync(&self) -> Result<&'static str> {
        self.sync.stop_sync().await
    }

    pub fn is_running(&self) -> bool {
        self.sync.is_running()
    }

    pub async fn initialize_from_store(&self) {
        self.sync.initialize_from_store().await;
    }

    pub fn get_config(&self) -> ConfigView {
        let is_running = self.sync.is_running();
        let config = self.store.config();
        ConfigView {
            sync_period: config.sync_period,
            server_url: config.server_url,
            last_sync_time: config.last_sync_time,
            is_running,
        }
    }

    pub fn get_saved_credentials(&self) -> SavedCredentials {
        let auth = self.store.auth();
        SavedCredentials {
            has_credentials: auth.has_credentials(),
            username: auth.username,
            password: auth.password,
            last_login: auth.last_login,
        }
    }

    pub fn save_credentials(&self, username: &str, password: &str) -> Result<()> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(SyncError::Config(
                "Username and password are required".to_string(),
            ));
        }
        self.store.save_credentials(username, password)?;
        Ok(())
    }

    /// Validate and save the vendor server URL (stored without a trailing
    /// slash).
    pub fn save_server_url(&self, url: &str) -> Result<String> {
        let url = url.trim().trim_end_matches('/');
        if url.is_empty() {
            return Err(SyncError::Config("Server URL is required".to_string()));
        }
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| SyncError::Config(format!("Invalid server URL {}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SyncError::Config(format!(
                "Invalid server URL {}: expected http or https",
                url
            )));
        }
        self.store.save_server_url(url)?;
        Ok(url.to_string())
    }

    /// Save the sync period used by the next start.
    pub fn save_sync_period(&self, period: &str) -> Result<SyncPeriod> {
        let period = SyncPeriod::from_label(period).ok_or_else(|| {
            SyncError::Config(format!(
                "Unsupported sync period {:?}; expected 5, 10 or 30",
                period
            ))
        })?;
        self.store.save_sync_period(period)?;
        Ok(period)
    }

    /// Fetch terminals from the server, merged with stored company ids.
    pub async fn get_devices(&self) -> Result<Vec<Device>> {
        self.client.get_devices().await
    }

    /// Assign a company id to a device. A blank company id clears it.
    pub fn update_device_company_id(
        &self,
        device_id: &str,
        company_id: Option<String>,
    ) -> Result<Device> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Err(SyncError::Config("Device ID is required".to_string()));
        }
        let company_id = company_id
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        self.store.update_device_company_id(device_id, company_id)
    }

    /// Every attendance log on the server.
    pub async fn sync_all_logs(&self) -> Result<Vec<AttendanceLog>> {
        self.client.get_device_logs_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> App {
        App::new(&AppConfig::default(), Store::in_memory()).unwrap()
    }

    #[test]
    fn default_server_url_only_fills_gaps() {
        let config = AppConfig {
            default_server_url: Some("http://10.0.0.9:90".into()),
            ..Default::default()
        };
        let app = App::new(&config, Store::in_memory()).unwrap();
        assert_eq!(app.get_config().server_url.as_deref(), Some("http://10.0.0.9:90"));

        let store = Store::in_memory();
        store.save_server_url("http://saved:90").unwrap();
        let app = App::new(&config, store).unwrap();
        assert_eq!(app.get_config().server_url.as_deref(), Some("http://saved:90"));
    }

    #[test]
    fn server_url_is_validated_and_normalized() {
        let app = app();
        assert_eq!(app.save_server_url(" http://10.0.0.1:90/ ").unwrap(), "http://10.0.0.1:90");
        assert_eq!(app.store().config().server_url.as_deref(), Some("http://10.0.0.1:90"));

        assert!(matches!(app.save_server_url(""), Err(SyncError::Config(_))));
        assert!(matches!(app.save_server_url("not a url"), Err(SyncError::Config(_))));
        assert!(matches!(app.save_server_url("ftp://host"), Err(SyncError::Config(_))));
    }

    #[test]
    fn sync_period_must_be_known() {
        let app = app();
        assert_eq!(app.save_sync_period("30").unwrap(), SyncPeriod::ThirtyMinutes);
        assert!(matches!(app.save_sync_period("7"), Err(SyncError::Config(_))));
        assert_eq!(app.get_config().sync_period, SyncPeriod::ThirtyMinutes);
    }

    #[test]
    fn credentials_round_trip() {
        let app = app();
        assert!(!app.get_saved_credentials().has_credentials);
        assert!(app.save_credentials("admin", "").is_err());

        app.save_credentials(" admin ", "pw").unwrap();
        let saved = app.get_saved_credentials();
        assert_eq!(saved.username, "admin");
        assert_eq!(saved.password, "pw");
        assert!(saved.has_credentials);
    }

    #[test]
    fn company_id_updates_are_idempotent() {
        let app = app();
        let first = app.update_device_company_id("12", Some(" ACME ".into())).unwrap();
        let before = app.store().devices();
        let second = app.update_device_company_id("12", Some("ACME".into())).unwrap();

        assert_eq!(first, second);
        assert_eq!(before, app.store().devices());
        assert_eq!(first.company_id.as_deref(), Some("ACME"));

        let cleared = app.update_device_company_id("12", Some("  ".into())).unwrap();
        assert_eq!(cleared.company_id, None);
        assert!(app.update_device_company_id(" ", None).is_err());
    }

    #[tokio::test]
    async fn start_from_store_requires_settings() {
        let app = app();
        app.save_credentials("admin", "pw").unwrap();
        let err = app.start_sync_from_store().await.unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
        assert!(!app.is_running());
    }
}
