//! BLE GATT protocol for WiFi provisioning.
//!
//! # GATT Service Structure
//!
//! ```text
//! Service: WiFi Provisioning (5a67d678-6361-4f32-8396-54c6926c8fa1)
//! ├── SSID (Read, Write) - Network name, staged until a command
//! ├── Password (Write) - Network password, staged until a command
//! ├── Command (Write) - One-byte opcode, see [`Command`]
//! └── Pairing Status (Read, Notify) - 0x00 not paired, 0x01 paired
//! ```
//!
//! # Components
//!
//! - [`command`] - Command opcodes
//! - [`staging`] - Fixed-capacity buffers for staged values
//! - [`handler`] - Write decoding, read encoding, pairing notifications

mod command;
mod handler;
mod staging;

pub use command::{Command, UnknownCommand};
pub use handler::{
    GattHandler, GattHandles, PairingNotificationState, WriteOutcome, PAIRING_STATUS_NOT_PAIRED,
    PAIRING_STATUS_PAIRED,
};
pub use staging::{BoundedBuf, PendingCredentials};
