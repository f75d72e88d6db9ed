//! In-memory store and board used by the unit tests.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use firebridge_core::{CommandRecord, ResponseRecord, ResponseUpdate};
use firebridge_firebase::{StateStore, StoreError};
use firebridge_serial::{DeviceLink, LinkError, ReadPolicy};

#[derive(Default)]
struct StoreState {
    command: Option<CommandRecord>,
    response: ResponseRecord,
    updates: Vec<ResponseUpdate>,
    fail_reads: bool,
    fail_writes: bool,
    malformed: bool,
}

#[derive(Clone, Default)]
pub struct FakeStore {
    state: Arc<Mutex<StoreState>>,
}

fn unavailable() -> StoreError {
    StoreError::Status { status: 503, body: "unavailable".into() }
}

impl FakeStore {
    pub fn with_command(raw: &str) -> Self {
        let store = Self::default();
        store.set(CommandRecord::new(raw));
        store
    }

    pub fn set(&self, record: CommandRecord) {
        self.state.lock().unwrap().command = Some(record);
    }

    pub fn command(&self) -> Option<CommandRecord> {
        self.state.lock().unwrap().command.clone()
    }

    pub fn updates(&self) -> Vec<ResponseUpdate> {
        self.state.lock().unwrap().updates.clone()
    }

    pub fn response(&self) -> ResponseRecord {
        self.state.lock().unwrap().response.clone()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().unwrap().fail_reads = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }

    /// Serve `{"command": 5}` instead of the stored record.
    pub fn set_malformed(&self, malformed: bool) {
        self.state.lock().unwrap().malformed = malformed;
    }
}

#[async_trait]
impl StateStore for FakeStore {
    async fn get_command(&self) -> Result<Option<CommandRecord>, StoreError> {
        let state = self.state.lock().unwrap();
        if state.fail_reads {
            return Err(unavailable());
        }
        if state.malformed {
            return Ok(Some(serde_json::from_str::<CommandRecord>(r#"{"command": 5}"#)?));
        }
        Ok(state.command.clone())
    }

    async fn set_command(&self, record: &CommandRecord) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(unavailable());
        }
        state.command = Some(record.clone());
        Ok(())
    }

    async fn update_response(&self, update: &ResponseUpdate) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(unavailable());
        }
        update.merge_into(&mut state.response);
        state.updates.push(update.clone());
        Ok(())
    }

    async fn get_response(&self) -> Result<ResponseRecord, StoreError> {
        let state = self.state.lock().unwrap();
        if state.fail_reads {
            return Err(unavailable());
        }
        Ok(state.response.clone())
    }
}

#[derive(Default)]
struct DeviceState {
    sent: Vec<u8>,
    replies: VecDeque<Option<String>>,
    // unsolicited lines waiting in the input buffer
    stale: VecDeque<String>,
    discards: usize,
    read_policies: Vec<ReadPolicy>,
    fail_sends: bool,
    fail_reads: bool,
}

#[derive(Clone, Default)]
pub struct FakeDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl FakeDevice {
    pub fn with_replies<'a>(replies: impl IntoIterator<Item = Option<&'a str>>) -> Self {
        let device = Self::default();
        device.state.lock().unwrap().replies = replies.into_iter().map(|r| r.map(str::to_string)).collect();
        device
    }

    pub fn sent(&self) -> Vec<u8> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn push_stale(&self, line: &str) {
        self.state.lock().unwrap().stale.push_back(line.to_string());
    }

    pub fn discards(&self) -> usize {
        self.state.lock().unwrap().discards
    }

    pub fn read_policies(&self) -> Vec<ReadPolicy> {
        self.state.lock().unwrap().read_policies.clone()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.state.lock().unwrap().fail_sends = fail;
    }

    pub fn fail_reads(&self) {
        self.state.lock().unwrap().fail_reads = true;
    }
}

#[async_trait]
impl DeviceLink for FakeDevice {
    async fn send(&mut self, byte: u8) -> Result<(), LinkError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_sends {
            return Err(LinkError::Io(io::Error::from(io::ErrorKind::BrokenPipe)));
        }
        state.sent.push(byte);
        Ok(())
    }

    async fn discard_input(&mut self) -> Result<usize, LinkError> {
        let mut state = self.state.lock().unwrap();
        state.discards += 1;
        let dropped = state.stale.drain(..).map(|l| l.len() + 1).sum();
        Ok(dropped)
    }

    async fn read_line(&mut self, policy: ReadPolicy) -> Result<Option<String>, LinkError> {
        let mut state = self.state.lock().unwrap();
        state.read_policies.push(policy);
        if state.fail_reads {
            return Err(LinkError::Closed);
        }
        if let Some(line) = state.stale.pop_front() {
            return Ok(Some(line));
        }
        Ok(state.replies.pop_front().flatten())
    }

    fn port_name(&self) -> &str {
        "fake0"
    }
}
