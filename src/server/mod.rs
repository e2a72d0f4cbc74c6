//! Local HTTP + websocket surface.
//!
//! Routes (all JSON):
//! - POST /api/sync/start, POST /api/sync/stop, GET /api/sync/status
//! - GET|POST /api/settings/credentials, /api/settings/syncperiod, /api/settings/server
//! - GET /api/settings/config
//! - GET /api/devices, POST /api/devices/{device_id}/company
//! - POST /api/sync-all-logs
//! - GET /ws (result stream)

pub mod handlers;
pub mod ws;

use axum::{
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;

use crate::app::App;
use crate::config::ServerConfig;

pub fn router(app: App) -> Router {
    Router::new()
        .route("/api/sync/start", post(handlers::start_sync))
        .route("/api/sync/stop", post(handlers::stop_sync))
        .route("/api/sync/status", get(handlers::sync_status))
        .route(
            "/api/settings/credentials",
            get(handlers::get_credentials).post(handlers::save_credentials),
        )
        .route(
            "/api/settings/syncperiod",
            get(handlers::get_sync_period).post(handlers::save_sync_period),
        )
        .route(
            "/api/settings/server",
            get(handlers::get_server).post(handlers::save_server),
        )
        .route("/api/settings/config", get(handlers::get_config))
        .route("/api/devices", get(handlers::get_devices))
        .route(
            "/api/devices/{device_id}/company",
            post(handlers::update_device_company),
        )
        .route("/api/sync-all-logs", post(handlers::sync_all_logs))
        .route("/ws", get(ws::ws_handler))
        .with_state(app)
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(
    config: &ServerConfig,
    app: App,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("[server] Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(app))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
