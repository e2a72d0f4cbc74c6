//! Websocket stream of sync results.
//!
//! Server -> client only; each frame is one `SyncResult` as JSON:
//! ```json
//! {"timestamp": "...", "api": "Get Devices", "success": true, "data": {"count": 3}}
//! ```

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::app::App;
use crate::sync::SyncResult;

/// Upgrade and start streaming. The subscription is taken before the
/// upgrade so nothing emitted during the handshake is lost.
pub async fn ws_handler(ws: WebSocketUpgrade, State(app): State<App>) -> Response {
    let results = app.subscribe();
    ws.on_upgrade(move |socket| stream_results(socket, results))
}

async fn stream_results(socket: WebSocket, mut results: broadcast::Receiver<SyncResult>) {
    let (mut sender, mut receiver) = socket.split();
    log::debug!("[server] Websocket client connected");

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Pings are answered by the protocol layer; text is ignored.
                Some(Ok(_)) => {}
            },
            result = results.recv() => match result {
                Ok(result) => {
                    let text = match serde_json::to_string(&result) {
                        Ok(text) => text,
                        Err(e) => {
                            log::warn!("[server] Could not encode result: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("[server] Websocket client lagging, dropped {} results", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    log::debug!("[server] Websocket client disconnected");
}
