//! WiFi provisioning firmware binary.

#[cfg(feature = "esp32")]
fn main() {
    // Link ESP-IDF patches (must be first!)
    esp_idf_sys::link_patches();

    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use log::{error, info};
    use pico_wifi_provisioning::platform::esp32::{EspWifiDriver, NimbleTransport, NvsStore};
    use pico_wifi_provisioning::{
        ProvisioningConfig, ProvisioningListener, ProvisioningStatus, Provisioner, WifiLinkStatus,
    };
    use std::time::Duration;

    /// Tick period of the main loop.
    const TICK_INTERVAL: Duration = Duration::from_millis(50);

    struct LogListener;

    impl ProvisioningListener for LogListener {
        fn on_status_changed(&mut self, status: ProvisioningStatus) {
            info!("Provisioning status: {} ({})", status, status.code());
        }

        fn on_wifi_status_changed(&mut self, status: WifiLinkStatus) {
            info!("WiFi status: {}", status);
        }

        fn on_ble_connection_changed(&mut self, connected: bool) {
            info!("BLE {}", if connected { "connected" } else { "disconnected" });
        }
    }

    esp_idf_svc::log::EspLogger::initialize_default();
    info!("=== WiFi provisioning starting ===");

    let peripherals = match Peripherals::take() {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to take peripherals: {:?}", e);
            return;
        }
    };
    let sysloop = match EspSystemEventLoop::take() {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to take system event loop: {:?}", e);
            return;
        }
    };
    let nvs = match EspDefaultNvsPartition::take() {
        Ok(n) => n,
        Err(e) => {
            error!("Failed to take NVS partition: {:?}", e);
            return;
        }
    };

    let wifi = match EspWifiDriver::new(peripherals.modem, sysloop, Some(nvs.clone())) {
        Ok(w) => w,
        Err(e) => {
            error!("WiFi init failed: {:?}", e);
            return;
        }
    };
    let store = match NvsStore::new(nvs) {
        Ok(s) => s,
        Err(e) => {
            error!("NVS init failed: {:?}", e);
            return;
        }
    };
    let ble = NimbleTransport::new();
    let pairing = ble.pairing();

    let mut provisioner =
        Provisioner::new(ProvisioningConfig::default(), wifi, ble, pairing, store);
    provisioner.set_listener(LogListener);

    if let Err(e) = provisioner.begin() {
        error!("Provisioning service failed to start: {}", e);
        return;
    }

    if provisioner.network_count() > 0 {
        info!("Connecting to stored network");
        provisioner.connect_to_stored_networks();
    }

    info!("Entering main loop...");
    loop {
        provisioner.tick();
        std::thread::sleep(TICK_INTERVAL);
    }
}

#[cfg(not(feature = "esp32"))]
fn main() {
    println!("This binary requires the 'esp32' feature.");
    println!("Use 'cargo run --bin host-provisioner' for a host session.");
}
