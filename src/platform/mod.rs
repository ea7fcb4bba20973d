//! Interfaces to the hardware the provisioning core drives.
//!
//! The core never talks to a radio directly. It is generic over these
//! traits so the same code runs on the ESP32 and against the host
//! simulation in [`sim`].
//!
//! # Components
//!
//! - [`WifiDriver`] - station-mode WiFi radio (request/poll, never blocking)
//! - [`BleTransport`] - BLE stack hosting the provisioning GATT service
//! - [`PairingProvider`] - BLE security manager state
//! - [`Clock`] - monotonic millisecond clock
//! - [`sim`] - in-process simulations of all of the above
//! - `esp32` - ESP-IDF / NimBLE adapters (`esp32` feature)

pub mod sim;

#[cfg(feature = "esp32")]
pub mod esp32;

use crate::gatt::GattHandles;
use crate::provisioning::WifiLinkStatus;
use std::fmt;
use std::time::Instant;

/// Identifier of a connected BLE peer (connection handle).
pub type PeerId = u16;

/// Station-mode WiFi driver.
///
/// `connect` only starts an attempt; its outcome is observed through
/// subsequent `status` calls.
pub trait WifiDriver {
    /// Current link status.
    fn status(&mut self) -> WifiLinkStatus;

    /// Start connecting to a network.
    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), DriverError>;

    /// Drop the current connection or abort a pending attempt.
    fn disconnect(&mut self) -> Result<(), DriverError>;

    /// Signal strength of the current connection in dBm (0 if not connected).
    fn rssi(&self) -> i32;
}

/// BLE stack hosting the provisioning service.
pub trait BleTransport {
    /// Register the provisioning service and its four characteristics.
    ///
    /// Returns the handles the stack will use in write/read events. The
    /// client configuration descriptor of a characteristic lives at its
    /// handle + 1.
    fn register_service(&mut self, device_name: &str) -> Result<GattHandles, DriverError>;

    /// Start advertising the provisioning service.
    fn start_advertising(&mut self) -> Result<(), DriverError>;

    /// Stop advertising.
    fn stop_advertising(&mut self) -> Result<(), DriverError>;

    /// Drop the connection to `peer`.
    fn disconnect_peer(&mut self, peer: PeerId) -> Result<(), DriverError>;

    /// Push a notification for the characteristic at `handle`.
    fn notify(&mut self, handle: u16, value: &[u8]) -> Result<(), DriverError>;

    /// Update the value the stack serves for reads of `handle`.
    ///
    /// Only needed by stacks that answer reads themselves instead of
    /// routing them through [`crate::Provisioner::handle_gatt_read`].
    fn set_value(&mut self, _handle: u16, _value: &[u8]) {}

    /// Advance the stack and take the next pending event, if any.
    fn poll_event(&mut self) -> Option<BleEvent>;
}

/// BLE pairing (security manager) state.
pub trait PairingProvider {
    /// State of the current pairing procedure.
    fn status(&self) -> PairingStatus;

    /// Whether the link to `peer` is encrypted.
    fn is_link_encrypted(&self, peer: PeerId) -> bool;
}

/// Monotonic millisecond clock.
pub trait Clock {
    /// Milliseconds since an arbitrary fixed origin.
    fn now_ms(&self) -> u64;
}

/// [`Clock`] backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose origin is now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// State reported by the BLE security manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingStatus {
    /// No pairing in progress.
    Idle,
    /// Pairing started.
    Started,
    /// Pairing finished successfully.
    Complete,
    /// Pairing failed.
    Failed,
}

/// Events produced by a [`BleTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BleEvent {
    /// A peer connected.
    Connected(PeerId),
    /// A connection attempt ended with a non-success status code.
    ConnectFailed(u8),
    /// The peer disconnected.
    Disconnected(PeerId),
    /// A client wrote to a characteristic or descriptor.
    Write { handle: u16, data: Vec<u8> },
    /// The pairing procedure changed state.
    Pairing(PairingStatus),
}

/// Error reported by a WiFi or BLE driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The driver rejected an argument (SSID or password it cannot use).
    InvalidArgument(String),
    /// The driver call failed.
    Failed(String),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Self::Failed(msg) => write!(f, "driver error: {}", msg),
        }
    }
}

impl std::error::Error for DriverError {}
