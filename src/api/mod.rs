// HTTP and WebSocket APIs

mod ingestion;
pub mod websocket;

pub use ingestion::{create_router, AppState};
pub use websocket::{create_ws_router, ws_handler, WsAppState};

use crate::clock::SharedClock;
use crate::relay::RelayHub;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Full relay surface: ingest, health and socket routes behind permissive CORS.
pub fn create_app(hub: Arc<RelayHub>, clock: SharedClock) -> Router {
    let api = create_router(AppState {
        hub: Arc::clone(&hub),
    });
    let ws = create_ws_router(Arc::new(WsAppState { hub, clock }));
    api.merge(ws).layer(CorsLayer::permissive())
}
