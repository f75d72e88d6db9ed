use std::env;
use std::time::Duration;

use firebridge_core::{COMMANDS_PATH, RESPONSE_PATH};

#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    pub database_url: String,
    pub auth_token: Option<String>,
    /// Database namespace, needed when talking to the local emulator.
    pub namespace: Option<String>,
    pub commands_path: String,
    pub response_path: String,
    pub timeout: Duration,
}

impl Default for FirebaseConfig {
    fn default() -> Self {
        Self {
            database_url: "http://127.0.0.1:9000".to_string(),
            auth_token: None,
            namespace: None,
            commands_path: COMMANDS_PATH.to_string(),
            response_path: RESPONSE_PATH.to_string(),
            timeout: Duration::from_millis(5000),
        }
    }
}

impl FirebaseConfig {
    pub fn from_env() -> Self {
        let mut cfg = FirebaseConfig::default();

        if let Ok(v) = env::var("FIREBASE_DATABASE_URL") {
            if !v.is_empty() {
                cfg.database_url = v;
            }
        }
        if let Ok(v) = env::var("FIREBASE_AUTH_TOKEN") {
            if !v.is_empty() {
                cfg.auth_token = Some(v);
            }
        }
        if let Ok(v) = env::var("FIREBASE_NAMESPACE") {
            if !v.is_empty() {
                cfg.namespace = Some(v);
            }
        }
        if let Ok(v) = env::var("FIREBASE_COMMANDS_PATH") {
            if !v.is_empty() {
                cfg.commands_path = v;
            }
        }
        if let Ok(v) = env::var("FIREBASE_RESPONSE_PATH") {
            if !v.is_empty() {
                cfg.response_path = v;
            }
        }
        if let Ok(v) = env::var("FIREBASE_TIMEOUT_MS") {
            if let Ok(ms) = v.parse::<u64>() {
                cfg.timeout = Duration::from_millis(ms);
            }
        }

        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_the_emulator() {
        let cfg = FirebaseConfig::default();
        assert_eq!(cfg.database_url, "http://127.0.0.1:9000");
        assert_eq!(cfg.commands_path, "commands");
        assert_eq!(cfg.response_path, "response");
        assert!(cfg.auth_token.is_none());
    }
}
