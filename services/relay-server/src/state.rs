use crate::config::RelayConfig;
use crate::connection::ConnectionRegistry;
use crate::registry::SessionRegistry;
use crate::traffic::TrafficMeter;

/// Shared, cheaply-cloneable process state handed to every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub config: RelayConfig,
    pub registry: SessionRegistry,
    pub traffic: std::sync::Arc<TrafficMeter>,
    pub connections: ConnectionRegistry,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Self {
        let traffic = std::sync::Arc::new(TrafficMeter::new(config.traffic_window_s));
        Self {
            config,
            registry: SessionRegistry::new(),
            traffic,
            connections: ConnectionRegistry::new(),
        }
    }
}
