//! Actuator commands carried in message payloads.

use std::fmt;

/// A recognized actuator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Payload `1`, written as the byte `'1'`.
    Assert,
    /// Payload `0`, written as the byte `'0'`.
    Deassert,
}

impl Command {
    /// Parse a raw payload. Only the exact payloads `1` and `0` are commands.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        match payload {
            b"1" => Some(Command::Assert),
            b"0" => Some(Command::Deassert),
            _ => None,
        }
    }

    /// Byte written to the serial device.
    pub fn byte(self) -> u8 {
        match self {
            Command::Assert => b'1',
            Command::Deassert => b'0',
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Assert => write!(f, "assert"),
            Command::Deassert => write!(f, "deassert"),
        }
    }
}
