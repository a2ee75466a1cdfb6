use std::env;
use tracing::warn;

/// Minimum and maximum permitted location-update cadence, in milliseconds.
pub const MIN_INTERVAL_MS: u64 = 5_000;
pub const MAX_INTERVAL_MS: u64 = 120_000;

/// Floor for the traffic meter's trailing window, in seconds.
pub const MIN_TRAFFIC_WINDOW_S: u64 = 60;

/// Runtime configuration, loaded once from the environment at startup.
///
/// Parsing failures for optional settings fall back to the documented
/// default and log a warning; `SERVER_PORT`/`MISSION_SERVER_PORT` is the
/// only setting whose presence is required to be well-formed if set at all
/// (mirrors the teacher's `expect`-on-required-config style for
/// `DATABASE_URL`).
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    pub port: u16,
    pub session_code_length: usize,
    pub location_interval_ms: u64,
    pub max_client_routes: usize,
    pub max_route_points: usize,
    pub traffic_window_s: u64,
    pub session_ttl_ms: u64,
    pub host_resume_grace_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: 4000,
            session_code_length: 6,
            location_interval_ms: 10_000,
            max_client_routes: 8,
            max_route_points: 80,
            traffic_window_s: 900,
            session_ttl_ms: 6 * 60 * 60 * 1000,
            host_resume_grace_ms: 15 * 60 * 1000,
        }
    }
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, raw, "failed to parse env var, using default");
            default
        }),
        Err(_) => default,
    }
}

impl RelayConfig {
    /// Load configuration from the environment, applying the same clamps
    /// the dispatcher re-applies at runtime (cadence, traffic window).
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = env::var("SERVER_PORT")
            .or_else(|_| env::var("MISSION_SERVER_PORT"))
            .ok()
            .map(|raw| {
                raw.parse()
                    .unwrap_or_else(|_| panic!("invalid SERVER_PORT/MISSION_SERVER_PORT: {raw}"))
            })
            .unwrap_or(defaults.port);

        let location_interval_ms = parsed_env("LOCATION_INTERVAL_MS", defaults.location_interval_ms)
            .clamp(MIN_INTERVAL_MS, MAX_INTERVAL_MS);

        let traffic_window_s =
            parsed_env("TRAFFIC_WINDOW_S", defaults.traffic_window_s).max(MIN_TRAFFIC_WINDOW_S);

        Self {
            port,
            session_code_length: parsed_env("SESSION_CODE_LENGTH", defaults.session_code_length),
            location_interval_ms,
            max_client_routes: parsed_env("MAX_CLIENT_ROUTES", defaults.max_client_routes),
            max_route_points: parsed_env("MAX_ROUTE_POINTS", defaults.max_route_points),
            traffic_window_s,
            session_ttl_ms: parsed_env("SESSION_TTL_MS", defaults.session_ttl_ms),
            host_resume_grace_ms: parsed_env("HOST_RESUME_GRACE_MS", defaults.host_resume_grace_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.session_code_length, 6);
        assert_eq!(cfg.location_interval_ms, 10_000);
        assert_eq!(cfg.max_client_routes, 8);
        assert_eq!(cfg.max_route_points, 80);
        assert_eq!(cfg.traffic_window_s, 900);
        assert_eq!(cfg.session_ttl_ms, 6 * 60 * 60 * 1000);
        assert_eq!(cfg.host_resume_grace_ms, 15 * 60 * 1000);
    }
}
