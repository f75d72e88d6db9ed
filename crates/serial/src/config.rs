use std::env;
use std::time::Duration;

/// Bounded-retry policy for reading a reply line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for ReadPolicy {
    fn default() -> Self {
        Self { attempts: 5, interval: Duration::from_millis(100) }
    }
}

#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Explicit port path; skips probing when set.
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Substrings matched against each port's description while probing.
    pub descriptor_patterns: Vec<String>,
    /// Pause after every write so the board can act and answer.
    pub settle: Duration,
    /// Pause after opening; most boards reset when the port opens.
    pub open_settle: Duration,
    pub read: ReadPolicy,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 9600,
            descriptor_patterns: vec!["Arduino".to_string(), "USB".to_string()],
            settle: Duration::from_secs(1),
            open_settle: Duration::from_secs(2),
            read: ReadPolicy::default(),
        }
    }
}

impl SerialConfig {
    pub fn from_env() -> Self {
        let mut cfg = SerialConfig::default();

        if let Ok(v) = env::var("SERIAL_PORT") {
            if !v.is_empty() {
                cfg.port = Some(v);
            }
        }
        if let Ok(v) = env::var("SERIAL_BAUD") {
            if let Ok(b) = v.parse::<u32>() {
                cfg.baud_rate = b;
            }
        }
        if let Ok(v) = env::var("SERIAL_DESCRIPTOR_PATTERNS") {
            let patterns = parse_patterns(&v);
            if !patterns.is_empty() {
                cfg.descriptor_patterns = patterns;
            }
        }
        if let Ok(v) = env::var("SERIAL_SETTLE_MS") {
            if let Ok(ms) = v.parse::<u64>() {
                cfg.settle = Duration::from_millis(ms);
            }
        }
        if let Ok(v) = env::var("SERIAL_OPEN_SETTLE_MS") {
            if let Ok(ms) = v.parse::<u64>() {
                cfg.open_settle = Duration::from_millis(ms);
            }
        }
        if let Ok(v) = env::var("SERIAL_READ_ATTEMPTS") {
            if let Ok(n) = v.parse::<u32>() {
                cfg.read.attempts = n;
            }
        }
        if let Ok(v) = env::var("SERIAL_READ_INTERVAL_MS") {
            if let Ok(ms) = v.parse::<u64>() {
                cfg.read.interval = Duration::from_millis(ms);
            }
        }

        cfg
    }
}

fn parse_patterns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}
