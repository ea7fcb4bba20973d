//! BLE WiFi provisioning library.
//!
//! A device advertises a GATT service over BLE; a phone writes an SSID,
//! a password and a command, and the device stores the network and/or
//! connects to it. Everything except the ESP32 adapters in
//! [`platform`] is platform-independent and tested on the host.

pub mod config;
pub mod credentials;
pub mod gatt;
pub mod platform;
pub mod provisioner;
pub mod provisioning;
pub mod storage;

// Re-export commonly used items
pub use config::ProvisioningConfig;
pub use credentials::{CredentialError, CredentialStore, NetworkCredential};
pub use gatt::{Command, GattHandler, GattHandles};
pub use platform::{BleEvent, BleTransport, Clock, PairingProvider, WifiDriver};
pub use provisioner::{Provisioner, ProvisioningError};
pub use provisioning::{
    ProvisioningEvent, ProvisioningListener, ProvisioningStatus, WifiLinkStatus,
};
pub use storage::{FileStore, MemoryStore, PersistentStore};
