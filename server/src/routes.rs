use axum::{routing::get, Router};

use crate::presence::snapshot::get_presence;
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Build the axum Router: the WebSocket endpoint at `socket_path`,
/// a read-only presence snapshot, and a health check.
pub fn build_router(state: AppState, socket_path: &str) -> Router {
    let ws_routes = Router::new().route(socket_path, get(ws_handler::ws_upgrade));

    let api_routes = Router::new().route("/api/presence", get(get_presence));

    let health = Router::new().route("/health", get(health_check));

    Router::new()
        .merge(ws_routes)
        .merge(api_routes)
        .merge(health)
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
