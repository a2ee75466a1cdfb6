use std::env;

use tracing::info;
use tracing_subscriber::EnvFilter;

use relay_server::{lifecycle, state::AppState, supervisor, RelayConfig};

#[tokio::main]
async fn main() {
    let log_level = env::var("RELAY_LOG").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let config = RelayConfig::from_env();
    let state = AppState::new(config.clone());

    tokio::spawn(supervisor::run_liveness_probe(state.clone()));
    tokio::spawn(supervisor::run_expiry_sweep(state.clone()));

    let router = relay_server::build_router(state.clone());
    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind");
    info!(addr = %bind_addr, "relay listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(state))
        .await
        .expect("server error");
    info!("relay shut down gracefully");
}

/// Waits for SIGTERM or Ctrl-C, then closes every live session with a
/// `session:ended { reason: "server-shutdown" }` frame so peers see a clean
/// close rather than an abrupt TCP reset.
async fn shutdown_signal(state: AppState) {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }

    for (code, _) in state.registry.snapshot().await {
        lifecycle::terminate_session(&state, &code, "server-shutdown").await;
    }
}
