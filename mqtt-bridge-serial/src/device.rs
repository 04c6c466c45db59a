//! Serial device access.
//!
//! A [`SerialDevice`] knows how to open the port; each open yields a
//! [`SerialLink`] that lives for exactly one transaction.

use std::io::Write;
use std::time::Duration;

use thiserror::Error;
use tokio_serial::{DataBits, Parity, SerialPort, StopBits};

use crate::config::SerialConfig;

/// Serial device errors.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Failed to open {port}: {reason}")]
    Open { port: String, reason: String },
    #[error("Write failed: {0}")]
    Write(String),
    #[error("Close failed: {0}")]
    Close(String),
}

/// A serial device that can be opened for a single transaction.
pub trait SerialDevice: Send + Sync + 'static {
    type Link: SerialLink;

    /// Port name, for logging.
    fn name(&self) -> &str;

    fn open(&mut self) -> Result<Self::Link, DeviceError>;
}

/// An open connection to a serial device.
pub trait SerialLink: Send {
    fn write_byte(&mut self, byte: u8) -> Result<(), DeviceError>;

    /// Flush and release the port.
    fn close(self) -> Result<(), DeviceError>;
}

/// A tty (or COM port) opened 8N1 at the configured baud rate.
#[derive(Debug, Clone)]
pub struct TtyDevice {
    port: String,
    baud_rate: u32,
    timeout: Duration,
}

impl TtyDevice {
    pub fn new(port: impl Into<String>, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            timeout,
        }
    }

    pub fn from_config(config: &SerialConfig) -> Self {
        Self::new(&config.port, config.baud_rate, config.timeout())
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

impl SerialDevice for TtyDevice {
    type Link = TtyLink;

    fn name(&self) -> &str {
        &self.port
    }

    fn open(&mut self) -> Result<TtyLink, DeviceError> {
        let port = tokio_serial::new(&self.port, self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(self.timeout)
            .open()
            .map_err(|e| DeviceError::Open {
                port: self.port.clone(),
                reason: e.to_string(),
            })?;

        Ok(TtyLink { port })
    }
}

/// Open tty handle; dropping it closes the port.
pub struct TtyLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink for TtyLink {
    fn write_byte(&mut self, byte: u8) -> Result<(), DeviceError> {
        self.port
            .write_all(&[byte])
            .map_err(|e| DeviceError::Write(e.to_string()))
    }

    fn close(mut self) -> Result<(), DeviceError> {
        self.port
            .flush()
            .map_err(|e| DeviceError::Close(e.to_string()))
    }
}
