use async_trait::async_trait;
use firebridge_core::{CommandRecord, ResponseRecord, ResponseUpdate};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Http(reqwest::Error),
    #[error("store returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected record shape: {0}")]
    Decode(#[from] serde_json::Error),
}

// The request URL carries the auth token as a query parameter; never keep it in the error
impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Http(err.without_url())
    }
}

/// Remote key-value state shared between the bridge and whoever issues commands.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Current command record, `None` when nothing has been written yet.
    async fn get_command(&self) -> Result<Option<CommandRecord>, StoreError>;

    async fn set_command(&self, record: &CommandRecord) -> Result<(), StoreError>;

    /// Merge the present keys of `update` into the response record.
    async fn update_response(&self, update: &ResponseUpdate) -> Result<(), StoreError>;

    async fn get_response(&self) -> Result<ResponseRecord, StoreError>;
}
