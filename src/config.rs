//! Process configuration.
//!
//! User-editable settings (credentials, sync period, server URL) live in the
//! store. This is the deployment side: where the store lives, how the HTTP
//! surface binds, and where results are forwarded. Layers, later wins:
//!
//! 1. Compiled defaults
//! 2. `~/.config/hrmx-sync/config.toml`
//! 3. `./hrmx-sync.toml`
//! 4. `HRMX_*` environment variables (`HRMX_INGEST__KEY` sets `ingest.key`)

use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

const APP_DIR: &str = "hrmx-sync";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory holding `db.json`. Defaults to the platform data dir.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Vendor server URL used until the user saves one.
    #[serde(default)]
    pub default_server_url: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            default_server_url: None,
            log_level: default_log_level(),
            http: HttpConfig::default(),
            server: ServerConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}

impl AppConfig {
    /// Path of the persisted document.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join(APP_DIR)))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("db.json")
    }
}

/// Outbound HTTP settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout for vendor and downstream calls.
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// Local HTTP + websocket surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
        }
    }
}

/// Downstream ingestion endpoint. Both values must be supplied; there are no
/// built-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestConfig {
    pub url: Option<String>,
    pub key: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load configuration from the standard locations.
pub fn load_config() -> Result<AppConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(AppConfig::default()))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join(APP_DIR).join("config.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("hrmx-sync.toml"))
        .merge(Env::prefixed("HRMX_").split("__"))
        .extract()
}
