//! MQTT bridge for a serial-controlled actuator.
//!
//! This bridge subscribes to a topic and turns each message into a single
//! byte written to a serial device.
//!
//! # Payloads
//!
//! ```text
//! "1"  -> writes '1' (assert)
//! "0"  -> writes '0' (deassert)
//! else -> ignored, the device is not opened
//! ```
//!
//! Each command is its own open → write → close transaction, and
//! transactions never overlap.

pub mod command;
pub mod config;
pub mod device;
pub mod dispatcher;
pub mod router;
