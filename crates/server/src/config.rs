use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub http_addr: String,
    /// Delay between two reads of the command record.
    pub poll_interval: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8080".to_string(),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        let mut cfg = BridgeConfig::default();

        if let Ok(v) = env::var("BRIDGE_HTTP_ADDR") {
            if !v.is_empty() {
                cfg.http_addr = v;
            }
        }
        if let Ok(v) = env::var("BRIDGE_POLL_INTERVAL_MS") {
            match v.parse::<u64>() {
                Ok(ms) if ms > 0 => cfg.poll_interval = Duration::from_millis(ms),
                _ => tracing::warn!(value = %v, "Ignoring invalid BRIDGE_POLL_INTERVAL_MS"),
            }
        }

        cfg
    }
}
