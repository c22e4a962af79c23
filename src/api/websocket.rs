use crate::clock::SharedClock;
use crate::relay::RelayHub;
use crate::subscription::ConnectionManager;
use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
    routing::get,
    Router,
};
use std::sync::Arc;
use tracing::info;

/// Shared application state for WebSocket handler
#[derive(Clone)]
pub struct WsAppState {
    pub hub: Arc<RelayHub>,
    pub clock: SharedClock,
}

/// GET /ws - WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<WsAppState>>) -> Response {
    info!("WebSocket upgrade request received");
    ws.on_upgrade(move |socket| async move {
        ConnectionManager::new(Arc::clone(&state.hub), Arc::clone(&state.clock))
            .handle(socket)
            .await
    })
}

/// Create WebSocket router
pub fn create_ws_router(state: Arc<WsAppState>) -> Router {
    Router::new().route("/ws", get(ws_handler)).with_state(state)
}
