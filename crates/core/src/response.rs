//! The `response` record and the texts written into it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const LED_ON: &str = "LED is ON";
pub const LED_OFF: &str = "LED is OFF";
pub const TEMP_READ_ERROR: &str = "Error reading temperature";
pub const TEMP_INVALID: &str = "Error: Invalid temperature data";
pub const UNKNOWN_COMMAND: &str = "Error: Unknown command. Please send 'temp', 'on', or 'off'.";

/// Keys to merge into the response record. Absent keys are left untouched remotely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub led: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseUpdate {
    pub fn temp(text: impl Into<String>) -> Self {
        Self { temp: Some(text.into()), ..Default::default() }
    }

    pub fn led(text: impl Into<String>) -> Self {
        Self { led: Some(text.into()), ..Default::default() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { error: Some(text.into()), ..Default::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.temp.is_none() && self.led.is_none() && self.error.is_none()
    }

    /// Apply this update on top of `record`, leaving unrelated keys alone.
    pub fn merge_into(&self, record: &mut ResponseRecord) {
        if let Some(v) = &self.temp { record.temp = Some(v.clone()); }
        if let Some(v) = &self.led { record.led = Some(v.clone()); }
        if let Some(v) = &self.error { record.error = Some(v.clone()); }
    }
}

/// Full view of the response record as read back from the store.
pub type ResponseRecord = ResponseUpdate;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemperatureError {
    #[error("empty reading")]
    Empty,
    #[error("not a number: {0:?}")]
    NotNumeric(String),
}

/// Parse a temperature line sent by the board, e.g. `"23.5"`.
///
/// Any float literal is accepted, including `nan` and `inf`.
pub fn parse_temperature(raw: &str) -> Result<f64, TemperatureError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(TemperatureError::Empty);
    }
    trimmed
        .parse()
        .map_err(|_| TemperatureError::NotNumeric(trimmed.to_string()))
}

/// `Current Temperature: {v}°C`; whole values keep one decimal (`23.0`).
pub fn temperature_message(value: f64) -> String {
    format!("Current Temperature: {}°C", format_reading(value))
}

fn format_reading(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else if value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}
