pub mod broadcast;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod ids;
pub mod lifecycle;
pub mod registry;
pub mod sanitize;
pub mod session;
pub mod state;
pub mod supervisor;
pub mod time;
pub mod traffic;

pub use config::RelayConfig;
pub use state::AppState;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

/// Assemble the relay's router: the WebSocket upgrade endpoint plus the
/// `/health` side channel (spec §6). Mirrors the teacher's `build_router`
/// shape, minus the dashboard/static-file serving this relay has no use for.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(connection::ws_handler))
        .route("/health", get(health::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
