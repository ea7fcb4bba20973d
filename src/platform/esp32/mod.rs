//! ESP32 adapters (ESP-IDF WiFi, NVS and NimBLE).
//!
//! # Usage
//!
//! ```ignore
//! use pico_wifi_provisioning::platform::esp32::{EspWifiDriver, NimbleTransport, NvsStore};
//!
//! let ble = NimbleTransport::new();
//! let pairing = ble.pairing();
//! let wifi = EspWifiDriver::new(peripherals.modem, sysloop, Some(nvs.clone()))?;
//! let store = NvsStore::new(nvs)?;
//! let mut provisioner = Provisioner::new(config, wifi, ble, pairing, store);
//! ```

mod ble;
mod nvs;
mod wifi;

pub use ble::{NimblePairing, NimbleTransport, NIMBLE_HANDLES};
pub use nvs::{NvsStore, NVS_NAMESPACE};
pub use wifi::EspWifiDriver;

use super::DriverError;

fn esp_error(e: esp_idf_sys::EspError) -> DriverError {
    DriverError::Failed(format!("{:?}", e))
}

fn nimble_error(e: esp32_nimble::BLEError) -> DriverError {
    DriverError::Failed(format!("{:?}", e))
}
