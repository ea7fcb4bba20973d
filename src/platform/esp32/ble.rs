//! NimBLE GATT server hosting the provisioning service.
//!
//! NimBLE reports writes, connections and pairing from its own task. The
//! callbacks only queue [`BleEvent`]s; the provisioner drains the queue
//! from its tick, so no provisioning logic runs inside the BLE stack.
//!
//! esp32-nimble does not expose attribute handles, so the transport hands
//! out fixed ones with the usual layout (client configuration descriptor
//! at characteristic handle + 1). Subscriptions arrive as descriptor
//! writes on that layout.

use super::nimble_error;
use crate::gatt::GattHandles;
use crate::platform::{
    BleEvent, BleTransport, DriverError, PairingProvider, PairingStatus, PeerId,
};
use esp32_nimble::utilities::mutex::Mutex as NimbleMutex;
use esp32_nimble::utilities::BleUuid;
use esp32_nimble::{
    enums::{AuthReq, SecurityIOCap},
    uuid128, BLEAdvertisementData, BLECharacteristic, BLEDevice, NimbleProperties, NimbleSub,
};
use log::{debug, info, warn};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

// UUIDs of `crate::config` in NimBLE form
const SERVICE_UUID: BleUuid = uuid128!("5a67d678-6361-4f32-8396-54c6926c8fa1");
const SSID_CHAR_UUID: BleUuid = uuid128!("5a67d678-6361-4f32-8396-54c6926c8fa2");
const PASSWORD_CHAR_UUID: BleUuid = uuid128!("5a67d678-6361-4f32-8396-54c6926c8fa3");
const COMMAND_CHAR_UUID: BleUuid = uuid128!("5a67d678-6361-4f32-8396-54c6926c8fa4");
const PAIRING_STATUS_CHAR_UUID: BleUuid = uuid128!("5a67d678-6361-4f32-8396-54c6926c8fa5");

/// Handles handed out for the provisioning characteristics.
pub const NIMBLE_HANDLES: GattHandles = GattHandles {
    ssid: 0x0001,
    password: 0x0003,
    command: 0x0005,
    pairing_status: 0x0007,
};

type EventQueue = Arc<Mutex<VecDeque<BleEvent>>>;

fn push(queue: &EventQueue, event: BleEvent) {
    match queue.lock() {
        Ok(mut q) => q.push_back(event),
        Err(_) => warn!("BLE event queue poisoned; dropping {:?}", event),
    }
}

#[derive(Debug)]
struct SecurityState {
    status: PairingStatus,
    encrypted: HashSet<PeerId>,
}

/// Pairing state as reported by the NimBLE security manager.
#[derive(Clone)]
pub struct NimblePairing {
    state: Arc<Mutex<SecurityState>>,
}

impl PairingProvider for NimblePairing {
    fn status(&self) -> PairingStatus {
        self.state
            .lock()
            .map(|s| s.status)
            .unwrap_or(PairingStatus::Idle)
    }

    fn is_link_encrypted(&self, peer: PeerId) -> bool {
        self.state
            .lock()
            .map(|s| s.encrypted.contains(&peer))
            .unwrap_or(false)
    }
}

/// [`BleTransport`] over the esp32-nimble GATT server.
pub struct NimbleTransport {
    events: EventQueue,
    security: Arc<Mutex<SecurityState>>,
    pairing_char: Option<Arc<NimbleMutex<BLECharacteristic>>>,
    ssid_char: Option<Arc<NimbleMutex<BLECharacteristic>>>,
    device_name: String,
}

impl NimbleTransport {
    /// Create a transport; the BLE device is taken on registration.
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            security: Arc::new(Mutex::new(SecurityState {
                status: PairingStatus::Idle,
                encrypted: HashSet::new(),
            })),
            pairing_char: None,
            ssid_char: None,
            device_name: String::new(),
        }
    }

    /// Pairing provider fed by this transport's security callbacks.
    pub fn pairing(&self) -> NimblePairing {
        NimblePairing {
            state: self.security.clone(),
        }
    }
}

impl Default for NimbleTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl BleTransport for NimbleTransport {
    fn register_service(&mut self, device_name: &str) -> Result<GattHandles, DriverError> {
        let device = BLEDevice::take();
        BLEDevice::set_device_name(device_name).map_err(nimble_error)?;
        device
            .security()
            .set_auth(AuthReq::Bond | AuthReq::Mitm | AuthReq::Sc)
            .set_io_cap(SecurityIOCap::NoInputNoOutput);

        let server = device.get_server();

        let events = self.events.clone();
        let security = self.security.clone();
        server.on_connect(move |_server, desc| {
            let peer = desc.conn_handle();
            if let Ok(mut s) = security.lock() {
                s.status = PairingStatus::Idle;
                s.encrypted.remove(&peer);
            }
            push(&events, BleEvent::Connected(peer));
        });

        let events = self.events.clone();
        let security = self.security.clone();
        server.on_disconnect(move |desc, reason| {
            let peer = desc.conn_handle();
            if let Err(e) = reason {
                debug!("BLE peer {} disconnected: {:?}", peer, e);
            }
            if let Ok(mut s) = security.lock() {
                s.status = PairingStatus::Idle;
                s.encrypted.remove(&peer);
            }
            push(&events, BleEvent::Disconnected(peer));
        });

        let events = self.events.clone();
        let security = self.security.clone();
        server.on_authentication_complete(move |_server, desc, result| {
            let peer = desc.conn_handle();
            let status = match result {
                Ok(()) => PairingStatus::Complete,
                Err(e) => {
                    warn!("BLE pairing with {} failed: {:?}", peer, e);
                    PairingStatus::Failed
                }
            };
            if let Ok(mut s) = security.lock() {
                s.status = status;
                if desc.encrypted() {
                    s.encrypted.insert(peer);
                } else {
                    s.encrypted.remove(&peer);
                }
            }
            push(&events, BleEvent::Pairing(status));
        });

        let service = server.create_service(SERVICE_UUID);

        let ssid_char = service.lock().create_characteristic(
            SSID_CHAR_UUID,
            NimbleProperties::READ | NimbleProperties::WRITE,
        );
        let events = self.events.clone();
        ssid_char.lock().on_write(move |args| {
            push(
                &events,
                BleEvent::Write {
                    handle: NIMBLE_HANDLES.ssid,
                    data: args.recv_data().to_vec(),
                },
            );
        });

        let password_char = service
            .lock()
            .create_characteristic(PASSWORD_CHAR_UUID, NimbleProperties::WRITE);
        let events = self.events.clone();
        password_char.lock().on_write(move |args| {
            push(
                &events,
                BleEvent::Write {
                    handle: NIMBLE_HANDLES.password,
                    data: args.recv_data().to_vec(),
                },
            );
        });

        let command_char = service
            .lock()
            .create_characteristic(COMMAND_CHAR_UUID, NimbleProperties::WRITE);
        let events = self.events.clone();
        command_char.lock().on_write(move |args| {
            push(
                &events,
                BleEvent::Write {
                    handle: NIMBLE_HANDLES.command,
                    data: args.recv_data().to_vec(),
                },
            );
        });

        let pairing_char = service.lock().create_characteristic(
            PAIRING_STATUS_CHAR_UUID,
            NimbleProperties::READ | NimbleProperties::NOTIFY,
        );
        let events = self.events.clone();
        pairing_char.lock().on_subscribe(move |_char, _desc, sub| {
            let value: [u8; 2] = if sub.contains(NimbleSub::NOTIFY) {
                [0x01, 0x00]
            } else {
                [0x00, 0x00]
            };
            push(
                &events,
                BleEvent::Write {
                    handle: NIMBLE_HANDLES.pairing_status + 1,
                    data: value.to_vec(),
                },
            );
        });
        pairing_char.lock().set_value(&[0x00]);

        self.ssid_char = Some(ssid_char);
        self.pairing_char = Some(pairing_char);
        self.device_name = device_name.to_string();
        info!("Provisioning service registered as {}", device_name);
        Ok(NIMBLE_HANDLES)
    }

    fn start_advertising(&mut self) -> Result<(), DriverError> {
        if self.pairing_char.is_none() {
            return Err(DriverError::Failed("service not registered".into()));
        }
        let advertising = BLEDevice::take().get_advertising();
        advertising
            .lock()
            .set_data(
                BLEAdvertisementData::new()
                    .name(&self.device_name)
                    .add_service_uuid(SERVICE_UUID),
            )
            .map_err(nimble_error)?;
        advertising.lock().start().map_err(nimble_error)?;
        info!("BLE advertising started");
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), DriverError> {
        BLEDevice::take()
            .get_advertising()
            .lock()
            .stop()
            .map_err(nimble_error)?;
        info!("BLE advertising stopped");
        Ok(())
    }

    fn disconnect_peer(&mut self, peer: PeerId) -> Result<(), DriverError> {
        BLEDevice::take()
            .get_server()
            .disconnect(peer)
            .map_err(nimble_error)
    }

    fn notify(&mut self, handle: u16, value: &[u8]) -> Result<(), DriverError> {
        if handle != NIMBLE_HANDLES.pairing_status {
            return Err(DriverError::InvalidArgument(format!(
                "handle 0x{:04X} does not notify",
                handle
            )));
        }
        let pairing_char = self
            .pairing_char
            .as_ref()
            .ok_or_else(|| DriverError::Failed("service not registered".into()))?;
        pairing_char.lock().set_value(value).notify();
        Ok(())
    }

    fn set_value(&mut self, handle: u16, value: &[u8]) {
        let characteristic = if handle == NIMBLE_HANDLES.ssid {
            self.ssid_char.as_ref()
        } else if handle == NIMBLE_HANDLES.pairing_status {
            self.pairing_char.as_ref()
        } else {
            None
        };
        if let Some(characteristic) = characteristic {
            characteristic.lock().set_value(value);
        }
    }

    fn poll_event(&mut self) -> Option<BleEvent> {
        self.events.lock().ok()?.pop_front()
    }
}
