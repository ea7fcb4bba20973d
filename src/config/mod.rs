//! Provisioning configuration and protocol constants.
//!
//! This module holds the limits shared by the credential store, the GATT
//! handler and the state machine, the UUIDs of the provisioning service, and
//! the runtime [`ProvisioningConfig`].
//!
//! # Example
//!
//! ```
//! use pico_wifi_provisioning::config::{ProvisioningConfig, CONNECT_TIMEOUT_MS};
//! use std::time::Duration;
//!
//! let config = ProvisioningConfig::default()
//!     .with_device_name("Kitchen-Sensor")
//!     .with_allow_provisioning_when_connected(true);
//!
//! assert_eq!(config.device_name, "Kitchen-Sensor");
//! assert_eq!(config.connect_timeout, Duration::from_millis(CONNECT_TIMEOUT_MS));
//! ```

use std::time::Duration;

/// Maximum number of stored networks.
pub const MAX_NETWORKS: usize = 5;

/// Maximum SSID length per IEEE 802.11 standard.
pub const MAX_SSID_LEN: usize = 32;

/// Maximum password length for WPA2.
pub const MAX_PASSWORD_LEN: usize = 64;

/// WiFi connection attempt timeout in milliseconds.
pub const CONNECT_TIMEOUT_MS: u64 = 15_000;

/// Key of the persisted credential document.
///
/// Short enough to be a valid NVS key (15 bytes max).
pub const CREDENTIALS_KEY: &str = "wifi_config";

/// Largest credential document accepted on load.
pub const MAX_CREDENTIALS_DOC_SIZE: usize = 2048;

/// Largest number of BLE events handled by one event loop tick.
///
/// Events beyond this stay queued for the following ticks.
pub const MAX_BLE_EVENTS_PER_TICK: usize = 8;

/// BLE advertisement name used when none is configured.
pub const DEFAULT_DEVICE_NAME: &str = "PicoW";

/// UUID of the WiFi provisioning GATT service.
pub const SERVICE_UUID: &str = "5a67d678-6361-4f32-8396-54c6926c8fa1";

/// UUID for SSID characteristic.
pub const SSID_CHAR_UUID: &str = "5a67d678-6361-4f32-8396-54c6926c8fa2";

/// UUID for Password characteristic.
pub const PASSWORD_CHAR_UUID: &str = "5a67d678-6361-4f32-8396-54c6926c8fa3";

/// UUID for Command characteristic.
pub const COMMAND_CHAR_UUID: &str = "5a67d678-6361-4f32-8396-54c6926c8fa4";

/// UUID for Pairing Status characteristic.
pub const PAIRING_STATUS_CHAR_UUID: &str = "5a67d678-6361-4f32-8396-54c6926c8fa5";

/// Runtime configuration for a [`crate::Provisioner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningConfig {
    /// Name advertised over BLE.
    pub device_name: String,
    /// Skip the "already connected" advisory when a peer connects while WiFi is up.
    ///
    /// The BLE teardown performed before each connection attempt still happens.
    pub allow_provisioning_when_connected: bool,
    /// How long a connection attempt may stay in `Connecting`.
    pub connect_timeout: Duration,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            allow_provisioning_when_connected: false,
            connect_timeout: Duration::from_millis(CONNECT_TIMEOUT_MS),
        }
    }
}

impl ProvisioningConfig {
    /// Set the advertised device name.
    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    /// Allow provisioning while WiFi is already connected.
    pub fn with_allow_provisioning_when_connected(mut self, allow: bool) -> Self {
        self.allow_provisioning_when_connected = allow;
        self
    }

    /// Override the connection attempt timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Connection timeout in whole milliseconds.
    pub fn connect_timeout_ms(&self) -> u64 {
        self.connect_timeout.as_millis() as u64
    }
}
