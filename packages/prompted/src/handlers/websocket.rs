use std::sync::Arc;

use axum::{
    extract::{State, WebSocketUpgrade, ws::WebSocket},
    response::Response,
};
use prompt_hub::Connection;
use tracing::{debug, info, warn};

use crate::{AppState, WsConnection};

/// Observer websocket: sends the current status, then joins the hub
pub async fn websocket_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| register_observer(state, socket))
}

async fn register_observer(state: AppState, socket: WebSocket) {
    let conn = Arc::new(WsConnection::new(socket));

    // The snapshot goes out before the connection is registered, so it always
    // arrives ahead of any broadcast.
    match state.tracker.status().to_message().to_json() {
        Ok(payload) => {
            if let Err(e) = conn.send(&payload).await {
                debug!("observer left before the initial status: {e}");
                return;
            }
        }
        Err(e) => warn!("failed to encode initial status: {e}"),
    }

    match state.hub.add(conn).await {
        Ok(id) => {
            state.metrics.connection_opened();
            info!(%id, "observer connected");
        }
        Err(e) => warn!("observer rejected: {e}"),
    }
}
