//! In-process simulations of the provisioning hardware.
//!
//! Each simulation is a cheap handle over shared state: clone it, hand one
//! copy to the [`crate::Provisioner`], and keep the other to script events
//! and inspect what the core asked the hardware to do. Single-threaded only.

use super::{
    BleEvent, BleTransport, Clock, DriverError, PairingProvider, PairingStatus, PeerId, WifiDriver,
};
use crate::gatt::GattHandles;
use crate::provisioning::WifiLinkStatus;
use log::debug;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

/// Characteristic handles assigned by [`SimBle`].
pub const SIM_HANDLES: GattHandles = GattHandles {
    ssid: 0x0010,
    password: 0x0012,
    command: 0x0014,
    pairing_status: 0x0016,
};

/// Status polls an automatic [`SimWifi`] takes to resolve an attempt.
const AUTO_RESOLVE_POLLS: u32 = 3;

#[derive(Debug)]
struct WifiState {
    status: WifiLinkStatus,
    rssi: i32,
    connects: Vec<(String, String)>,
    disconnects: usize,
    fail_connect: bool,
    /// Known access points; `None` means attempts are resolved by the test.
    networks: Option<Vec<(String, String)>>,
    pending: Option<(String, String)>,
    polls_since_connect: u32,
}

/// Simulated WiFi driver.
///
/// In manual mode (the default) the link status only changes through
/// [`SimWifi::set_status`]. With [`SimWifi::with_networks`] attempts
/// resolve on their own after a few status polls.
#[derive(Debug, Clone)]
pub struct SimWifi {
    state: Rc<RefCell<WifiState>>,
}

impl SimWifi {
    /// Driver whose link status is scripted by the caller.
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(WifiState {
                status: WifiLinkStatus::Idle,
                rssi: 0,
                connects: Vec::new(),
                disconnects: 0,
                fail_connect: false,
                networks: None,
                pending: None,
                polls_since_connect: 0,
            })),
        }
    }

    /// Driver that knows the given `(ssid, password)` access points.
    pub fn with_networks(networks: &[(&str, &str)]) -> Self {
        let sim = Self::new();
        sim.state.borrow_mut().networks = Some(
            networks
                .iter()
                .map(|(s, p)| (s.to_string(), p.to_string()))
                .collect(),
        );
        sim
    }

    /// Force the reported link status.
    pub fn set_status(&self, status: WifiLinkStatus) {
        self.state.borrow_mut().status = status;
    }

    /// Set the reported signal strength.
    pub fn set_rssi(&self, rssi: i32) {
        self.state.borrow_mut().rssi = rssi;
    }

    /// Make `connect` calls fail.
    pub fn set_fail_connect(&self, fail: bool) {
        self.state.borrow_mut().fail_connect = fail;
    }

    /// Every `(ssid, password)` passed to `connect`, in order.
    pub fn connect_calls(&self) -> Vec<(String, String)> {
        self.state.borrow().connects.clone()
    }

    /// Number of `disconnect` calls.
    pub fn disconnect_calls(&self) -> usize {
        self.state.borrow().disconnects
    }

    /// Status as last set, without advancing an automatic attempt.
    pub fn current_status(&self) -> WifiLinkStatus {
        self.state.borrow().status
    }
}

impl Default for SimWifi {
    fn default() -> Self {
        Self::new()
    }
}

impl WifiDriver for SimWifi {
    fn status(&mut self) -> WifiLinkStatus {
        let mut state = self.state.borrow_mut();
        if state.pending.is_some() && state.networks.is_some() {
            state.polls_since_connect += 1;
            if state.polls_since_connect >= AUTO_RESOLVE_POLLS {
                let (ssid, password) = state.pending.take().unwrap_or_default();
                let known = state
                    .networks
                    .as_ref()
                    .and_then(|nets| nets.iter().find(|(s, _)| *s == ssid).map(|(_, p)| p.clone()));
                let resolved = match known {
                    Some(expected) if expected == password => WifiLinkStatus::Connected,
                    Some(_) => WifiLinkStatus::ConnectFailed,
                    None => WifiLinkStatus::NoSsidAvail,
                };
                if resolved == WifiLinkStatus::Connected {
                    state.rssi = -55;
                }
                state.status = resolved;
                debug!("Simulated WiFi attempt to {} resolved: {}", ssid, state.status);
            }
        }
        state.status
    }

    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), DriverError> {
        let mut state = self.state.borrow_mut();
        if state.fail_connect {
            return Err(DriverError::Failed("simulated connect failure".into()));
        }
        state.connects.push((ssid.to_string(), password.to_string()));
        state.status = WifiLinkStatus::Idle;
        state.pending = Some((ssid.to_string(), password.to_string()));
        state.polls_since_connect = 0;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), DriverError> {
        let mut state = self.state.borrow_mut();
        state.disconnects += 1;
        state.pending = None;
        state.rssi = 0;
        state.status = WifiLinkStatus::Disconnected;
        Ok(())
    }

    fn rssi(&self) -> i32 {
        self.state.borrow().rssi
    }
}

#[derive(Debug, Default)]
struct BleState {
    device_name: Option<String>,
    advertising: bool,
    fail_register: bool,
    disconnected_peers: Vec<PeerId>,
    notifications: Vec<(u16, Vec<u8>)>,
    values: HashMap<u16, Vec<u8>>,
    events: VecDeque<BleEvent>,
}

/// Simulated BLE stack.
///
/// Events queued with [`SimBle::push_event`] are delivered by the next
/// provisioner tick.
#[derive(Debug, Clone, Default)]
pub struct SimBle {
    state: Rc<RefCell<BleState>>,
}

impl SimBle {
    /// Create an idle stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make service registration fail.
    pub fn set_fail_register(&self, fail: bool) {
        self.state.borrow_mut().fail_register = fail;
    }

    /// Queue an event for the next poll.
    pub fn push_event(&self, event: BleEvent) {
        self.state.borrow_mut().events.push_back(event);
    }

    /// Queue a client write to `handle`.
    pub fn push_write(&self, handle: u16, data: &[u8]) {
        self.push_event(BleEvent::Write {
            handle,
            data: data.to_vec(),
        });
    }

    /// Name the service was registered under, if registered.
    pub fn device_name(&self) -> Option<String> {
        self.state.borrow().device_name.clone()
    }

    /// Whether the stack is advertising.
    pub fn is_advertising(&self) -> bool {
        self.state.borrow().advertising
    }

    /// Peers the core asked to disconnect.
    pub fn disconnected_peers(&self) -> Vec<PeerId> {
        self.state.borrow().disconnected_peers.clone()
    }

    /// Notifications pushed so far as `(handle, value)`.
    pub fn notifications(&self) -> Vec<(u16, Vec<u8>)> {
        self.state.borrow().notifications.clone()
    }

    /// Value the stack would serve for a read of `handle`.
    pub fn value(&self, handle: u16) -> Option<Vec<u8>> {
        self.state.borrow().values.get(&handle).cloned()
    }

    /// Drain the recorded notifications.
    pub fn take_notifications(&self) -> Vec<(u16, Vec<u8>)> {
        std::mem::take(&mut self.state.borrow_mut().notifications)
    }
}

impl BleTransport for SimBle {
    fn register_service(&mut self, device_name: &str) -> Result<GattHandles, DriverError> {
        let mut state = self.state.borrow_mut();
        if state.fail_register {
            return Err(DriverError::Failed("simulated registration failure".into()));
        }
        state.device_name = Some(device_name.to_string());
        Ok(SIM_HANDLES)
    }

    fn start_advertising(&mut self) -> Result<(), DriverError> {
        self.state.borrow_mut().advertising = true;
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), DriverError> {
        self.state.borrow_mut().advertising = false;
        Ok(())
    }

    fn disconnect_peer(&mut self, peer: PeerId) -> Result<(), DriverError> {
        self.state.borrow_mut().disconnected_peers.push(peer);
        Ok(())
    }

    fn notify(&mut self, handle: u16, value: &[u8]) -> Result<(), DriverError> {
        self.state
            .borrow_mut()
            .notifications
            .push((handle, value.to_vec()));
        Ok(())
    }

    fn set_value(&mut self, handle: u16, value: &[u8]) {
        self.state.borrow_mut().values.insert(handle, value.to_vec());
    }

    fn poll_event(&mut self) -> Option<BleEvent> {
        self.state.borrow_mut().events.pop_front()
    }
}

#[derive(Debug)]
struct PairingState {
    status: PairingStatus,
    encrypted: bool,
}

/// Simulated security manager.
#[derive(Debug, Clone)]
pub struct SimPairing {
    state: Rc<RefCell<PairingState>>,
}

impl SimPairing {
    /// Security manager with no pairing and an unencrypted link.
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(PairingState {
                status: PairingStatus::Idle,
                encrypted: false,
            })),
        }
    }

    /// Set the reported pairing status.
    pub fn set_status(&self, status: PairingStatus) {
        self.state.borrow_mut().status = status;
    }

    /// Set whether links report as encrypted.
    pub fn set_encrypted(&self, encrypted: bool) {
        self.state.borrow_mut().encrypted = encrypted;
    }

    /// Mark pairing complete on an encrypted link.
    pub fn pair(&self) {
        self.set_status(PairingStatus::Complete);
        self.set_encrypted(true);
    }
}

impl Default for SimPairing {
    fn default() -> Self {
        Self::new()
    }
}

impl PairingProvider for SimPairing {
    fn status(&self) -> PairingStatus {
        self.state.borrow().status
    }

    fn is_link_encrypted(&self, _peer: PeerId) -> bool {
        self.state.borrow().encrypted
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Rc<Cell<u64>>,
}

impl ManualClock {
    /// Clock starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward.
    pub fn advance(&self, ms: u64) {
        self.now_ms.set(self.now_ms.get() + ms);
    }

    /// Jump to an absolute time.
    pub fn set(&self, ms: u64) {
        self.now_ms.set(ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.get()
    }
}
