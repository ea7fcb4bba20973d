//! Host-based provisioning session for development and testing.
//!
//! Runs the provisioning service against the simulated radios and plays a
//! phone writing credentials over BLE. Credentials are stored under
//! `~/.pico-wifi-provisioning/` (override with the first argument).
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin host-provisioner -- [STORE_DIR] [SSID] [PASSWORD]
//! ```

use log::{error, info};
use pico_wifi_provisioning::platform::sim::{SimBle, SimPairing, SimWifi, SIM_HANDLES};
use pico_wifi_provisioning::platform::{BleEvent, PairingStatus};
use pico_wifi_provisioning::{
    Command, FileStore, ProvisioningConfig, ProvisioningEvent, ProvisioningStatus, Provisioner,
};
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

/// Peer id used for the simulated phone.
const PHONE: u16 = 1;

/// Upper bound on ticks before giving up.
const MAX_TICKS: u32 = 200;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("=== WiFi provisioning host session starting ===");

    let mut args = std::env::args().skip(1);
    let root = match args.next().map(PathBuf::from) {
        Some(root) => root,
        None => match FileStore::default_root() {
            Ok(root) => root,
            Err(e) => {
                error!("Cannot locate credential directory: {}", e);
                std::process::exit(1);
            }
        },
    };
    let ssid = args.next().unwrap_or_else(|| "HomeNet".to_string());
    let password = args.next().unwrap_or_else(|| "correct-horse".to_string());

    let store = match FileStore::new(root.clone()) {
        Ok(store) => store,
        Err(e) => {
            error!("Cannot open credential directory {:?}: {}", root, e);
            std::process::exit(1);
        }
    };
    info!("Credentials stored in {:?}", store.root());

    let wifi = SimWifi::with_networks(&[(ssid.as_str(), password.as_str())]);
    let ble = SimBle::new();
    let pairing = SimPairing::new();

    let mut provisioner = Provisioner::new(
        ProvisioningConfig::default().with_device_name("PicoW-Host"),
        wifi,
        ble.clone(),
        pairing.clone(),
        store,
    );
    let (tx, rx) = mpsc::channel();
    provisioner.set_listener(tx);

    if let Err(e) = provisioner.begin() {
        error!("Failed to start provisioning: {}", e);
        std::process::exit(1);
    }
    info!(
        "{} stored network(s) after startup",
        provisioner.network_count()
    );

    // Phone connects, pairs, subscribes and provisions
    ble.push_event(BleEvent::Connected(PHONE));
    pairing.pair();
    ble.push_event(BleEvent::Pairing(PairingStatus::Complete));
    ble.push_write(SIM_HANDLES.pairing_status + 1, &[0x01, 0x00]);
    ble.push_write(SIM_HANDLES.ssid, ssid.as_bytes());
    ble.push_write(SIM_HANDLES.password, password.as_bytes());
    ble.push_write(SIM_HANDLES.command, &[Command::SaveNetwork.opcode()]);
    ble.push_write(SIM_HANDLES.command, &[Command::Connect.opcode()]);

    for _ in 0..MAX_TICKS {
        provisioner.tick();

        for event in rx.try_iter() {
            match event {
                ProvisioningEvent::StatusChanged(status) => info!("Status: {}", status),
                ProvisioningEvent::WifiStatusChanged(link) => info!("WiFi: {}", link),
                ProvisioningEvent::BleConnectionChanged(connected) => {
                    info!("BLE connected: {}", connected)
                }
            }
        }

        match provisioner.status() {
            ProvisioningStatus::Connected => {
                info!("Provisioned; RSSI {} dBm", provisioner.rssi());
                break;
            }
            ProvisioningStatus::Failed => {
                error!("Provisioning failed");
                break;
            }
            _ => std::thread::sleep(Duration::from_millis(50)),
        }
    }

    for (handle, value) in ble.take_notifications() {
        info!("Notification 0x{:04X}: {:02X?}", handle, value);
    }
    info!(
        "Session finished with {} stored network(s)",
        provisioner.network_count()
    );
}
