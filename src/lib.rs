pub mod app;
pub mod config;
mod de;
pub mod error;
pub mod reconcile;
pub mod server;
pub mod store;
pub mod sync;
pub mod zkbio;

#[cfg(feature = "desktop")]
mod commands;

#[cfg(not(feature = "desktop"))]
use tokio_util::sync::CancellationToken;

use crate::app::App;
use crate::store::Store;

/// Headless agent: HTTP + websocket surface, runs until Ctrl-C.
#[cfg(not(feature = "desktop"))]
pub fn run() {
    if let Err(e) = run_headless() {
        log::error!("[app] {}", e);
        eprintln!("hrmx-sync: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "desktop"))]
fn run_headless() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_config()?;
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_str()),
    )
    .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let store = Store::open(config.store_path())?;
        log::info!("[app] Store at {}", config.store_path().display());
        let app = App::new(&config, store)?;

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::warn!("[app] Failed to listen for Ctrl-C: {}", e);
                return;
            }
            log::info!("[app] Shutting down");
            signal.cancel();
        });

        let resume = app.clone();
        tokio::spawn(async move { resume.initialize_from_store().await });

        // isRunning stays persisted, so an active sync resumes on next start.
        server::serve(&config.server, app, shutdown).await?;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use tauri::{Emitter, Manager};

    tauri::Builder::default()
        .invoke_handler(tauri::generate_handler![
            commands::start_sync,
            commands::stop_sync,
            commands::get_sync_status,
            commands::get_config,
            commands::get_saved_credentials,
            commands::save_credentials,
            commands::save_server_url,
            commands::save_sync_period,
            commands::get_devices,
            commands::update_device_company_id,
            commands::sync_all_logs,
        ])
        .setup(|app| {
            app.handle().plugin(
                tauri_plugin_log::Builder::default()
                    .level(if cfg!(debug_assertions) {
                        log::LevelFilter::Debug
                    } else {
                        log::LevelFilter::Info
                    })
                    .build(),
            )?;

            let config = config::load_config()?;
            let path = match &config.data_dir {
                Some(dir) => dir.join("db.json"),
                None => app.path().app_data_dir()?.join("db.json"),
            };
            log::info!("[app] Store at {}", path.display());
            let state = App::new(&config, Store::open(path)?)?;
            app.manage(state.clone());

            // Forward every sync result to the webview.
            let handle = app.handle().clone();
            let mut results = state.subscribe();
            tauri::async_runtime::spawn(async move {
                use tokio::sync::broadcast::error::RecvError;
                loop {
                    match results.recv().await {
                        Ok(result) => {
                            if let Err(e) = handle.emit("sync-log", &result) {
                                log::warn!("[app] Failed to emit sync-log: {}", e);
                            }
                        }
                        Err(RecvError::Lagged(n)) => {
                            log::warn!("[app] Dropped {} sync results", n);
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            });

            let resume = state.clone();
            tauri::async_runtime::spawn(async move { resume.initialize_from_store().await });

            let server_config = config.server.clone();
            tauri::async_runtime::spawn(async move {
                let shutdown = tokio_util::sync::CancellationToken::new();
                if let Err(e) = server::serve(&server_config, state, shutdown).await {
                    log::error!("[server] {}", e);
                }
            });
            Ok(())
        })
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
