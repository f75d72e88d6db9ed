use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use firebridge_core::Command;

use crate::reconciler::Dispatch;

#[derive(Debug, Deserialize, Serialize)]
pub struct CommandPayload {
    pub command: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeSource {
    Poll,
    Api,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutcomeRecord {
    pub at: DateTime<Utc>,
    pub source: OutcomeSource,
    #[serde(flatten)]
    pub dispatch: Dispatch,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub at: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BridgeStatus {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    pub last_executed: Option<Command>,
    pub last_outcome: Option<OutcomeRecord>,
    pub last_error: Option<ErrorRecord>,
}
