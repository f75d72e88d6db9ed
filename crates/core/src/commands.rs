use serde::{Deserialize, Serialize};
use std::fmt;

/// An instruction read from the remote command record.
///
/// Known values are matched case-insensitively; anything else is kept verbatim
/// so it can be compared against later observations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Temp,
    On,
    Off,
    Unknown(String),
}

impl Command {
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("temp") {
            Command::Temp
        } else if raw.eq_ignore_ascii_case("on") {
            Command::On
        } else if raw.eq_ignore_ascii_case("off") {
            Command::Off
        } else {
            Command::Unknown(raw.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Command::Temp => "temp",
            Command::On => "on",
            Command::Off => "off",
            Command::Unknown(raw) => raw,
        }
    }

    /// Byte written to the serial line for this command.
    pub fn wire_byte(&self) -> Option<u8> {
        match self {
            Command::Temp => Some(b'T'),
            Command::On => Some(b'1'),
            Command::Off => Some(b'0'),
            Command::Unknown(_) => None,
        }
    }

    pub fn needs_device(&self) -> bool {
        self.wire_byte().is_some()
    }
}

impl Serialize for Command {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of the `commands` record: `{ "command": "<value>" }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl CommandRecord {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: Some(command.into()) }
    }

    /// The parsed command, or `None` when the field is missing or empty.
    pub fn parsed(&self) -> Option<Command> {
        match self.command.as_deref() {
            Some(raw) if !raw.is_empty() => Some(Command::parse(raw)),
            _ => None,
        }
    }
}
