//! Serialized command dispatch to the serial device.
//!
//! Every recognized command runs one open → write → close transaction. The
//! device sits behind an async mutex whose owned guard travels into the
//! blocking pool with the transaction, so at most one transaction is in
//! flight and the guard is released however the transaction ends.

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::command::Command;
use crate::device::{SerialDevice, SerialLink};

/// Result of a single dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The command byte was written.
    Written(Command),
    /// The payload is not a command; the device was not touched.
    Ignored,
    /// The device could not be opened; nothing was written.
    OpenFailed(String),
    /// The device opened but the write failed.
    WriteFailed(String),
    /// The transaction task did not complete.
    Aborted(String),
}

/// Applies commands to a serial device one transaction at a time.
pub struct CommandDispatcher<D> {
    device: Arc<Mutex<D>>,
}

impl<D> Clone for CommandDispatcher<D> {
    fn clone(&self) -> Self {
        Self {
            device: Arc::clone(&self.device),
        }
    }
}

impl<D: SerialDevice> CommandDispatcher<D> {
    pub fn new(device: D) -> Self {
        Self {
            device: Arc::new(Mutex::new(device)),
        }
    }

    /// Apply a raw payload to the device.
    ///
    /// Only the exact payloads `1` and `0` cause device I/O. Failures are
    /// logged and reported in the outcome, never escalated.
    pub async fn dispatch(&self, payload: &[u8]) -> DispatchOutcome {
        let Some(command) = Command::from_payload(payload) else {
            debug!(payload = %String::from_utf8_lossy(payload), "Ignoring unrecognized payload");
            return DispatchOutcome::Ignored;
        };

        let device = Arc::clone(&self.device).lock_owned().await;

        match tokio::task::spawn_blocking(move || transact(device, command)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(command = %command, error = %e, "Serial transaction aborted");
                DispatchOutcome::Aborted(e.to_string())
            }
        }
    }
}

fn transact<D: SerialDevice>(mut device: OwnedMutexGuard<D>, command: Command) -> DispatchOutcome {
    let mut link = match device.open() {
        Ok(link) => link,
        Err(e) => {
            error!(port = %device.name(), error = %e, "Failed to open serial connection");
            return DispatchOutcome::OpenFailed(e.to_string());
        }
    };

    let written = link.write_byte(command.byte());

    if let Err(e) = link.close() {
        warn!(port = %device.name(), error = %e, "Failed to close serial connection");
    }

    match written {
        Ok(()) => {
            info!(port = %device.name(), command = %command, "Serial command written");
            DispatchOutcome::Written(command)
        }
        Err(e) => {
            error!(
                port = %device.name(),
                command = %command,
                error = %e,
                "Failed to write serial command"
            );
            DispatchOutcome::WriteFailed(e.to_string())
        }
    }
}
