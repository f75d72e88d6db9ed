//! Poll, compare, dispatch, report.
//!
//! The reconciler keeps the board in line with the remote command record and
//! writes each outcome back into the response record. A command is sent to the
//! board once per change of the observed value; repeated observations of the
//! same value are skipped.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use firebridge_core::{
    parse_temperature, temperature_message, Command, ResponseUpdate, LED_OFF, LED_ON, TEMP_INVALID, TEMP_READ_ERROR,
    UNKNOWN_COMMAND,
};
use firebridge_firebase::{StateStore, StoreError};
use firebridge_serial::{DeviceLink, LinkError, ReadPolicy};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("device not connected; cannot dispatch '{0}'")]
    Disconnected(Command),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Link(#[from] LinkError),
}

/// What a single dispatch did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dispatch {
    pub command: Command,
    /// Byte written to the board, if any.
    pub sent: Option<char>,
    pub response: ResponseUpdate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No command record, or an empty one.
    Idle,
    /// Same command as the last one applied.
    Unchanged(Command),
    Applied(Dispatch),
}

pub struct Reconciler<S, D> {
    store: S,
    device: Option<D>,
    read_policy: ReadPolicy,
    last_executed: Option<Command>,
}

impl<S, D> Reconciler<S, D>
where
    S: StateStore,
    D: DeviceLink,
{
    /// `device` is `None` when no board could be opened; device commands are then refused.
    pub fn new(store: S, device: Option<D>, read_policy: ReadPolicy) -> Self {
        Self { store, device, read_policy, last_executed: None }
    }

    pub fn is_connected(&self) -> bool {
        self.device.is_some()
    }

    pub fn port_name(&self) -> Option<&str> {
        self.device.as_ref().map(|d| d.port_name())
    }

    pub fn last_executed(&self) -> Option<&Command> {
        self.last_executed.as_ref()
    }

    pub async fn tick(&mut self) -> Result<TickOutcome, ReconcileError> {
        let command = match self.store.get_command().await?.and_then(|record| record.parsed()) {
            Some(command) => command,
            None => return Ok(TickOutcome::Idle),
        };
        if self.last_executed.as_ref() == Some(&command) {
            return Ok(TickOutcome::Unchanged(command));
        }
        self.apply(command).await.map(TickOutcome::Applied)
    }

    /// Dispatch `command` regardless of what was applied before.
    ///
    /// The command is recorded as applied as soon as the board has been
    /// written to, before the response is stored, so a failed response write
    /// never leads to the byte being sent twice.
    pub async fn apply(&mut self, command: Command) -> Result<Dispatch, ReconcileError> {
        let policy = self.read_policy;
        let response = match &command {
            Command::Unknown(raw) => {
                info!(command = %raw, "Unknown command");
                ResponseUpdate::error(UNKNOWN_COMMAND)
            }
            Command::Temp => {
                let device = self.connected_device(&command)?;
                device.discard_input().await?;
                device.send(b'T').await?;
                let reply = match device.read_line(policy).await {
                    Ok(reply) => reply,
                    Err(err) => {
                        warn!(error = %err, "Temperature reply could not be read");
                        None
                    }
                };
                temperature_response(reply.as_deref())
            }
            Command::On => {
                self.connected_device(&command)?.send(b'1').await?;
                ResponseUpdate::led(LED_ON)
            }
            Command::Off => {
                self.connected_device(&command)?.send(b'0').await?;
                ResponseUpdate::led(LED_OFF)
            }
        };

        self.last_executed = Some(command.clone());
        self.store.update_response(&response).await?;
        info!(%command, ?response, "Command applied");

        Ok(Dispatch {
            sent: command.wire_byte().map(char::from),
            command,
            response,
        })
    }

    fn connected_device(&mut self, command: &Command) -> Result<&mut D, ReconcileError> {
        self.device
            .as_mut()
            .ok_or_else(|| ReconcileError::Disconnected(command.clone()))
    }
}

fn temperature_response(reply: Option<&str>) -> ResponseUpdate {
    match reply {
        None | Some("") => ResponseUpdate::temp(TEMP_READ_ERROR),
        Some(raw) => match parse_temperature(raw) {
            Ok(value) => ResponseUpdate::temp(temperature_message(value)),
            Err(err) => {
                debug!(error = %err, "Rejected temperature reply");
                ResponseUpdate::temp(TEMP_INVALID)
            }
        },
    }
}
