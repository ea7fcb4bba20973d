//! Event coordinator tying the provisioning pieces together.
//!
//! A [`Provisioner`] owns the WiFi driver, the BLE transport, the pairing
//! provider, the credential store and the state machine. The host calls
//! [`Provisioner::begin`] once and then [`Provisioner::tick`] from its main
//! loop; everything else happens inside the tick.
//!
//! # Example
//!
//! ```
//! use pico_wifi_provisioning::platform::sim::{SimBle, SimPairing, SimWifi};
//! use pico_wifi_provisioning::storage::MemoryStore;
//! use pico_wifi_provisioning::{ProvisioningConfig, ProvisioningStatus, Provisioner};
//!
//! let mut provisioner = Provisioner::new(
//!     ProvisioningConfig::default(),
//!     SimWifi::new(),
//!     SimBle::new(),
//!     SimPairing::new(),
//!     MemoryStore::new(),
//! );
//! provisioner.begin().unwrap();
//! provisioner.tick();
//! assert_eq!(provisioner.status(), ProvisioningStatus::Idle);
//! ```

use crate::config::{ProvisioningConfig, MAX_BLE_EVENTS_PER_TICK};
use crate::credentials::{CredentialError, CredentialStore, NetworkCredential};
use crate::gatt::{Command, GattHandler};
use crate::platform::{
    BleEvent, BleTransport, Clock, DriverError, PairingProvider, PairingStatus, PeerId,
    SystemClock, WifiDriver,
};
use crate::provisioning::{
    ProvisioningListener, ProvisioningStateMachine, ProvisioningStatus, WifiLinkStatus,
};
use crate::storage::PersistentStore;
use log::{debug, info, warn};
use std::fmt;
use zeroize::Zeroizing;

/// Errors from [`Provisioner::begin`].
#[derive(Debug)]
pub enum ProvisioningError {
    /// The BLE stack refused to register or advertise the service.
    Ble(DriverError),
}

impl fmt::Display for ProvisioningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ble(e) => write!(f, "BLE setup failed: {}", e),
        }
    }
}

impl std::error::Error for ProvisioningError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Ble(e) => Some(e),
        }
    }
}

impl From<DriverError> for ProvisioningError {
    fn from(e: DriverError) -> Self {
        Self::Ble(e)
    }
}

/// BLE WiFi provisioning service.
pub struct Provisioner<W, B, P, S, C = SystemClock>
where
    W: WifiDriver,
    B: BleTransport,
    P: PairingProvider,
    S: PersistentStore,
    C: Clock,
{
    config: ProvisioningConfig,
    wifi: W,
    ble: B,
    pairing: P,
    clock: C,
    store: CredentialStore<S>,
    gatt: GattHandler,
    machine: ProvisioningStateMachine,
    connected_peer: Option<PeerId>,
    /// Last link status handed to the listener.
    last_reported_link: WifiLinkStatus,
    /// Last link status checked for link loss.
    last_observed_link: WifiLinkStatus,
}

impl<W, B, P, S> Provisioner<W, B, P, S, SystemClock>
where
    W: WifiDriver,
    B: BleTransport,
    P: PairingProvider,
    S: PersistentStore,
{
    /// Create a provisioner driven by the system clock.
    pub fn new(config: ProvisioningConfig, wifi: W, ble: B, pairing: P, backend: S) -> Self {
        Self::with_clock(config, wifi, ble, pairing, backend, SystemClock::new())
    }
}

impl<W, B, P, S, C> Provisioner<W, B, P, S, C>
where
    W: WifiDriver,
    B: BleTransport,
    P: PairingProvider,
    S: PersistentStore,
    C: Clock,
{
    /// Create a provisioner driven by `clock`.
    ///
    /// Nothing touches the hardware or the backend until [`Self::begin`].
    pub fn with_clock(
        config: ProvisioningConfig,
        wifi: W,
        ble: B,
        pairing: P,
        backend: S,
        clock: C,
    ) -> Self {
        let machine = ProvisioningStateMachine::new(config.connect_timeout_ms());
        Self {
            config,
            wifi,
            ble,
            pairing,
            clock,
            store: CredentialStore::new(backend),
            gatt: GattHandler::new(),
            machine,
            connected_peer: None,
            last_reported_link: WifiLinkStatus::NoShield,
            last_observed_link: WifiLinkStatus::NoShield,
        }
    }

    /// Load stored networks, register the GATT service and start advertising.
    ///
    /// A missing or unreadable credential document is not an error; the
    /// store simply starts empty.
    pub fn begin(&mut self) -> Result<(), ProvisioningError> {
        match self.store.load() {
            Ok(count) => info!("Loaded {} stored network(s)", count),
            Err(CredentialError::NotFound) => debug!("No stored networks"),
            Err(e) => warn!("Failed to load stored networks: {}", e),
        }

        let handles = self.ble.register_service(&self.config.device_name)?;
        self.gatt.attach(handles);
        self.gatt.notify_pairing_status(false, &mut self.ble);
        self.sync_read_values();

        self.ble.start_advertising()?;
        info!(
            "BLE provisioning service started as {}",
            self.config.device_name
        );

        self.machine.begin();
        Ok(())
    }

    /// Run one iteration of the event loop.
    ///
    /// Handles up to [`MAX_BLE_EVENTS_PER_TICK`] pending BLE events, then
    /// advances a connection attempt, reports link status changes and reacts
    /// to link loss.
    pub fn tick(&mut self) {
        for _ in 0..MAX_BLE_EVENTS_PER_TICK {
            match self.ble.poll_event() {
                Some(event) => self.handle_ble_event(event),
                None => break,
            }
        }

        let link = self.wifi.status();
        let now_ms = self.clock.now_ms();
        self.machine.poll_attempt(link, &mut self.wifi, now_ms);

        if link != self.last_reported_link {
            debug!("WiFi link status: {} -> {}", self.last_reported_link, link);
            self.machine.emit_wifi_status(link);
            self.last_reported_link = link;
        }

        if link != self.last_observed_link {
            if link.is_link_down() {
                self.machine.on_link_lost();
            }
            self.last_observed_link = link;
        }
    }

    /// Dispatch one BLE event.
    pub fn handle_ble_event(&mut self, event: BleEvent) {
        match event {
            BleEvent::Connected(peer) => self.on_peer_connected(peer),
            BleEvent::ConnectFailed(code) => self.on_peer_connect_failed(code),
            BleEvent::Disconnected(peer) => self.on_peer_disconnected(peer),
            BleEvent::Write { handle, data } => self.handle_gatt_write(handle, &data),
            BleEvent::Pairing(status) => self.on_pairing_status(status),
        }
    }

    /// Handle a client write.
    ///
    /// A command runs before a subscription on the same write is applied.
    /// Enabling pairing notifications pushes the current pairing state.
    pub fn handle_gatt_write(&mut self, handle: u16, data: &[u8]) {
        let outcome = self.gatt.on_write(handle, data);
        if let Some(command) = outcome.command {
            self.process_command(command);
        }
        if outcome.pairing_subscription == Some(true) {
            let paired = self.is_paired();
            self.gatt.notify_pairing_status(paired, &mut self.ble);
        }
        self.sync_read_values();
    }

    /// Serve a client read into `buf`, returning the value length.
    ///
    /// An empty `buf` asks only for the length.
    pub fn handle_gatt_read(&self, handle: u16, buf: &mut [u8]) -> usize {
        self.gatt.on_read(handle, buf, self.is_paired())
    }

    /// Whether the connected peer finished pairing over an encrypted link.
    pub fn is_paired(&self) -> bool {
        match self.connected_peer {
            Some(peer) => {
                self.pairing.status() == PairingStatus::Complete
                    && self.pairing.is_link_encrypted(peer)
            }
            None => false,
        }
    }

    /// Store a network, replacing the password if the SSID is known.
    pub fn save_network(&mut self, ssid: &str, password: &str) -> Result<(), CredentialError> {
        self.store.save(ssid, password)?;
        info!("Saved network: {}", ssid);
        Ok(())
    }

    /// Start connecting to `ssid`.
    ///
    /// Returns whether an attempt was started. The outcome is reported
    /// later through the status.
    pub fn connect_to_network(&mut self, ssid: &str, password: &str) -> bool {
        let now_ms = self.clock.now_ms();
        let peer = self.connected_peer;
        self.machine
            .start_attempt(ssid, password, &mut self.wifi, &mut self.ble, peer, now_ms)
    }

    /// Start connecting to the first enabled stored network.
    ///
    /// Refused while an attempt is running or a link is up. Only one
    /// network is tried; the others are not fallbacks.
    pub fn connect_to_stored_networks(&mut self) -> bool {
        if matches!(
            self.machine.status(),
            ProvisioningStatus::Connecting | ProvisioningStatus::Connected
        ) {
            info!(
                "Not connecting to stored networks: already {}",
                self.machine.status()
            );
            return false;
        }

        let candidate = self.store.connect_candidates().next().map(|network| {
            (
                Zeroizing::new(network.ssid().to_string()),
                Zeroizing::new(network.password().to_string()),
            )
        });
        match candidate {
            Some((ssid, password)) => self.connect_to_network(&ssid, &password),
            None => {
                info!("No stored networks to connect to");
                false
            }
        }
    }

    /// Remove every stored network.
    pub fn clear_networks(&mut self) {
        self.store.clear();
        info!("Cleared stored networks");
    }

    /// Drop the WiFi link and return to `Idle`.
    pub fn disconnect(&mut self) {
        info!("Disconnecting from WiFi");
        self.machine.disconnect(&mut self.wifi);
    }

    /// Number of stored networks.
    pub fn network_count(&self) -> usize {
        self.store.count()
    }

    /// Stored networks in insertion order.
    pub fn stored_networks(&self) -> &[NetworkCredential] {
        self.store.networks()
    }

    /// Current provisioning status.
    pub fn status(&self) -> ProvisioningStatus {
        self.machine.status()
    }

    /// Link status seen by the last tick.
    pub fn wifi_status(&self) -> WifiLinkStatus {
        self.last_observed_link
    }

    /// Signal strength of the current WiFi link in dBm.
    pub fn rssi(&self) -> i32 {
        self.wifi.rssi()
    }

    /// Install the listener, replacing any previous one.
    pub fn set_listener<L: ProvisioningListener + 'static>(&mut self, listener: L) {
        self.machine.set_listener(Box::new(listener));
    }

    /// Allow BLE provisioning while a WiFi link is up.
    pub fn allow_provisioning_when_connected(&mut self, allow: bool) {
        self.config.allow_provisioning_when_connected = allow;
    }

    /// Peer currently connected over BLE.
    pub fn connected_peer(&self) -> Option<PeerId> {
        self.connected_peer
    }

    /// Runtime configuration.
    pub fn config(&self) -> &ProvisioningConfig {
        &self.config
    }

    /// GATT handler holding staged values and subscription state.
    pub fn gatt(&self) -> &GattHandler {
        &self.gatt
    }

    /// Credential store.
    pub fn store(&self) -> &CredentialStore<S> {
        &self.store
    }

    /// WiFi driver.
    pub fn wifi(&self) -> &W {
        &self.wifi
    }

    /// BLE transport.
    pub fn ble(&self) -> &B {
        &self.ble
    }

    fn process_command(&mut self, command: Command) {
        match command {
            Command::SaveNetwork => self.save_staged(),
            Command::Connect => self.connect_staged(),
            Command::ClearNetworks => self.clear_networks(),
            Command::Disconnect => self.disconnect(),
            Command::GetStatus | Command::StartScan | Command::GetScanResults => {
                info!("Command {} not implemented", command);
            }
        }
    }

    fn save_staged(&mut self) {
        let pending = self.gatt.pending();
        if pending.ssid.is_empty() {
            warn!("Save requested without an SSID");
            return;
        }

        match (pending.ssid.as_str(), pending.password.as_str()) {
            (Some(ssid), Some(password)) => match self.store.save(ssid, password) {
                Ok(()) => info!("Saved network: {}", ssid),
                Err(e) => warn!("Failed to save network {}: {}", ssid, e),
            },
            _ => warn!("Staged credentials are not valid UTF-8"),
        }
        self.gatt.pending_mut().clear();
    }

    fn connect_staged(&mut self) {
        if self.gatt.pending().ssid.is_empty() {
            self.connect_to_stored_networks();
            return;
        }

        let pending = self.gatt.pending();
        let (ssid, password) = match (pending.ssid.as_str(), pending.password.as_str()) {
            (Some(ssid), Some(password)) => (
                Zeroizing::new(ssid.to_string()),
                Zeroizing::new(password.to_string()),
            ),
            _ => {
                warn!("Staged credentials are not valid UTF-8");
                return;
            }
        };

        if self.connect_to_network(&ssid, &password) {
            self.gatt.pending_mut().clear();
        }
    }

    fn on_peer_connected(&mut self, peer: PeerId) {
        info!("BLE peer {} connected", peer);
        self.connected_peer = Some(peer);
        if self.machine.status() == ProvisioningStatus::Connected
            && !self.config.allow_provisioning_when_connected
        {
            info!("Already connected to WiFi; further BLE provisioning may be restricted");
        }
        self.machine.emit_ble_connection(true);
    }

    fn on_peer_connect_failed(&mut self, code: u8) {
        warn!("BLE connection attempt failed with status {}", code);
        self.connected_peer = None;
        self.machine.emit_ble_connection(false);
    }

    fn on_peer_disconnected(&mut self, peer: PeerId) {
        info!("BLE peer {} disconnected", peer);
        self.gatt.notify_pairing_status(false, &mut self.ble);
        self.connected_peer = None;
        self.gatt.reset_subscription();
        self.sync_read_values();
        self.machine.emit_ble_connection(false);
    }

    fn on_pairing_status(&mut self, status: PairingStatus) {
        debug!("Pairing status: {:?}", status);
        match status {
            PairingStatus::Complete => {
                info!("BLE pairing complete");
                self.gatt.notify_pairing_status(true, &mut self.ble);
            }
            PairingStatus::Failed => {
                warn!("BLE pairing failed");
                self.gatt.notify_pairing_status(false, &mut self.ble);
            }
            PairingStatus::Idle => self.gatt.notify_pairing_status(false, &mut self.ble),
            PairingStatus::Started => {}
        }
        self.sync_read_values();
    }

    /// Mirror readable values into stacks that serve reads themselves.
    fn sync_read_values(&mut self) {
        let Some(handles) = self.gatt.handles() else {
            return;
        };
        let paired = self.is_paired();
        self.ble
            .set_value(handles.ssid, self.gatt.pending().ssid.as_bytes());
        self.ble
            .set_value(handles.pairing_status, &[u8::from(paired)]);
    }
}

impl<W, B, P, S, C> fmt::Debug for Provisioner<W, B, P, S, C>
where
    W: WifiDriver,
    B: BleTransport,
    P: PairingProvider,
    S: PersistentStore,
    C: Clock,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provisioner")
            .field("config", &self.config)
            .field("status", &self.machine.status())
            .field("connected_peer", &self.connected_peer)
            .field("networks", &self.store.count())
            .field("last_reported_link", &self.last_reported_link)
            .field("last_observed_link", &self.last_observed_link)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CONNECT_TIMEOUT_MS, CREDENTIALS_KEY};
    use crate::gatt::{PAIRING_STATUS_NOT_PAIRED, PAIRING_STATUS_PAIRED};
    use crate::platform::sim::{ManualClock, SimBle, SimPairing, SimWifi, SIM_HANDLES};
    use crate::provisioning::ProvisioningEvent;
    use crate::storage::MemoryStore;
    use std::sync::mpsc::{self, Receiver};

    type SimProvisioner = Provisioner<SimWifi, SimBle, SimPairing, MemoryStore, ManualClock>;

    struct Harness {
        provisioner: SimProvisioner,
        wifi: SimWifi,
        ble: SimBle,
        pairing: SimPairing,
        clock: ManualClock,
        events: Receiver<ProvisioningEvent>,
    }

    fn harness_with(backend: MemoryStore) -> Harness {
        let wifi = SimWifi::new();
        let ble = SimBle::new();
        let pairing = SimPairing::new();
        let clock = ManualClock::new();
        let mut provisioner = Provisioner::with_clock(
            ProvisioningConfig::default(),
            wifi.clone(),
            ble.clone(),
            pairing.clone(),
            backend,
            clock.clone(),
        );
        let (tx, events) = mpsc::channel();
        provisioner.set_listener(tx);
        provisioner.begin().unwrap();
        // Drop the begin() announcements
        events.try_iter().for_each(drop);
        Harness {
            provisioner,
            wifi,
            ble,
            pairing,
            clock,
            events,
        }
    }

    fn harness() -> Harness {
        harness_with(MemoryStore::new())
    }

    impl Harness {
        fn write(&mut self, handle: u16, data: &[u8]) {
            self.ble.push_write(handle, data);
            self.provisioner.tick();
        }

        fn command(&mut self, command: Command) {
            self.write(SIM_HANDLES.command, &[command.opcode()]);
        }

        fn stage(&mut self, ssid: &str, password: &str) {
            self.write(SIM_HANDLES.ssid, ssid.as_bytes());
            self.write(SIM_HANDLES.password, password.as_bytes());
        }

        fn events(&self) -> Vec<ProvisioningEvent> {
            self.events.try_iter().collect()
        }

        fn statuses(&self) -> Vec<ProvisioningStatus> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    ProvisioningEvent::StatusChanged(s) => Some(s),
                    _ => None,
                })
                .collect()
        }
    }

    // ==================== Startup Tests ====================

    #[test]
    fn test_begin_registers_and_advertises() {
        let wifi = SimWifi::new();
        let ble = SimBle::new();
        let mut provisioner = Provisioner::with_clock(
            ProvisioningConfig::default().with_device_name("Sensor-1"),
            wifi,
            ble.clone(),
            SimPairing::new(),
            MemoryStore::new(),
            ManualClock::new(),
        );
        let (tx, rx) = mpsc::channel();
        provisioner.set_listener(tx);

        provisioner.begin().unwrap();

        assert_eq!(ble.device_name().as_deref(), Some("Sensor-1"));
        assert!(ble.is_advertising());
        assert_eq!(provisioner.gatt().handles(), Some(SIM_HANDLES));
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                ProvisioningEvent::StatusChanged(ProvisioningStatus::Started),
                ProvisioningEvent::StatusChanged(ProvisioningStatus::Idle),
            ]
        );
    }

    #[test]
    fn test_begin_loads_stored_networks() {
        let mut backend = MemoryStore::new();
        backend.insert_raw(
            CREDENTIALS_KEY,
            r#"{"networks":[{"ssid":"Home","password":"secret","enabled":true}]}"#,
        );
        let h = harness_with(backend);
        assert_eq!(h.provisioner.network_count(), 1);
        assert_eq!(h.provisioner.stored_networks()[0].ssid(), "Home");
    }

    #[test]
    fn test_begin_survives_unreadable_store() {
        let mut backend = MemoryStore::new();
        backend.insert_raw(CREDENTIALS_KEY, "not json");
        let h = harness_with(backend);
        assert_eq!(h.provisioner.network_count(), 0);
        assert_eq!(h.provisioner.status(), ProvisioningStatus::Idle);
    }

    #[test]
    fn test_begin_fails_when_registration_fails() {
        let ble = SimBle::new();
        ble.set_fail_register(true);
        let mut provisioner = Provisioner::new(
            ProvisioningConfig::default(),
            SimWifi::new(),
            ble.clone(),
            SimPairing::new(),
            MemoryStore::new(),
        );
        let err = provisioner.begin().unwrap_err();
        assert!(matches!(err, ProvisioningError::Ble(_)));
        assert!(!ble.is_advertising());
    }

    // ==================== Command Tests ====================

    #[test]
    fn test_save_command_stores_and_clears_staging() {
        let mut h = harness();
        h.stage("HomeNet", "secret123");
        h.command(Command::SaveNetwork);

        assert_eq!(h.provisioner.network_count(), 1);
        let saved = &h.provisioner.stored_networks()[0];
        assert_eq!(saved.ssid(), "HomeNet");
        assert_eq!(saved.password(), "secret123");
        assert!(h.provisioner.gatt().pending().ssid.is_empty());
        assert!(h.provisioner.gatt().pending().password.is_empty());
        assert!(h.provisioner.store().backend().get_raw(CREDENTIALS_KEY).is_some());
    }

    #[test]
    fn test_save_command_without_ssid_does_nothing() {
        let mut h = harness();
        h.command(Command::SaveNetwork);
        assert_eq!(h.provisioner.network_count(), 0);
        assert_eq!(h.provisioner.store().backend().write_count(), 0);
    }

    #[test]
    fn test_save_command_existing_ssid_updates_password() {
        let mut h = harness();
        h.stage("HomeNet", "old");
        h.command(Command::SaveNetwork);
        h.stage("HomeNet", "new");
        h.command(Command::SaveNetwork);
        assert_eq!(h.provisioner.network_count(), 1);
        assert_eq!(h.provisioner.stored_networks()[0].password(), "new");
    }

    #[test]
    fn test_save_command_overlong_multibyte_ssid() {
        let mut h = harness();
        let prefix = "ü".repeat(15);
        h.stage(&format!("{}xüü", prefix), "secret123");
        h.command(Command::SaveNetwork);

        assert_eq!(h.provisioner.network_count(), 1);
        assert_eq!(h.provisioner.stored_networks()[0].ssid(), format!("{}x", prefix));
    }

    #[test]
    fn test_connect_command_with_staged_credentials() {
        let mut h = harness();
        h.ble.push_event(BleEvent::Connected(3));
        h.stage("HomeNet", "secret123");
        h.command(Command::Connect);

        assert_eq!(h.provisioner.status(), ProvisioningStatus::Connecting);
        assert_eq!(
            h.wifi.connect_calls(),
            vec![("HomeNet".to_string(), "secret123".to_string())]
        );
        assert_eq!(h.ble.disconnected_peers(), vec![3]);
        assert!(!h.ble.is_advertising());
        assert!(h.provisioner.gatt().pending().ssid.is_empty());
        // Connecting does not save
        assert_eq!(h.provisioner.network_count(), 0);
    }

    #[test]
    fn test_connect_command_falls_back_to_stored() {
        let mut h = harness();
        h.provisioner.save_network("First", "one").unwrap();
        h.provisioner.save_network("Second", "two").unwrap();
        h.command(Command::Connect);
        assert_eq!(
            h.wifi.connect_calls(),
            vec![("First".to_string(), "one".to_string())]
        );
    }

    #[test]
    fn test_connect_command_without_anything_is_noop() {
        let mut h = harness();
        h.command(Command::Connect);
        assert!(h.wifi.connect_calls().is_empty());
        assert_eq!(h.provisioner.status(), ProvisioningStatus::Idle);
    }

    #[test]
    fn test_clear_command() {
        let mut h = harness();
        h.provisioner.save_network("Home", "pw").unwrap();
        h.command(Command::ClearNetworks);
        assert_eq!(h.provisioner.network_count(), 0);
        assert!(h.provisioner.store().backend().get_raw(CREDENTIALS_KEY).is_none());
    }

    #[test]
    fn test_disconnect_command() {
        let mut h = harness();
        h.wifi.set_status(WifiLinkStatus::Connected);
        h.command(Command::Disconnect);
        assert_eq!(h.wifi.disconnect_calls(), 1);
        assert_eq!(h.provisioner.status(), ProvisioningStatus::Idle);
    }

    #[test]
    fn test_reserved_and_unknown_commands_change_nothing() {
        let mut h = harness();
        h.stage("HomeNet", "pw");
        for opcode in [0x04u8, 0x06, 0x07, 0xFF] {
            h.write(SIM_HANDLES.command, &[opcode]);
        }
        assert_eq!(h.provisioner.status(), ProvisioningStatus::Idle);
        assert!(h.wifi.connect_calls().is_empty());
        assert_eq!(h.provisioner.network_count(), 0);
        assert_eq!(
            h.provisioner.gatt().pending().ssid.as_str(),
            Some("HomeNet")
        );
        assert!(h.statuses().is_empty());
    }

    #[test]
    fn test_get_status_command_is_not_implemented() {
        let mut h = harness();
        h.command(Command::GetStatus);
        assert_eq!(h.provisioner.status(), ProvisioningStatus::Idle);
        assert!(h.ble.notifications().is_empty());
    }

    // ==================== Read Tests ====================

    #[test]
    fn test_ssid_read_zero_capacity_reports_length() {
        let mut h = harness();
        h.write(SIM_HANDLES.ssid, b"HomeNet");
        let mut empty: [u8; 0] = [];
        assert_eq!(h.provisioner.handle_gatt_read(SIM_HANDLES.ssid, &mut empty), 7);

        let mut buf = [0u8; 32];
        let n = h.provisioner.handle_gatt_read(SIM_HANDLES.ssid, &mut buf);
        assert_eq!(&buf[..n], b"HomeNet");
    }

    #[test]
    fn test_pairing_read_requires_connected_peer() {
        let mut h = harness();
        h.pairing.pair();
        let mut buf = [0xEEu8; 1];
        h.provisioner.handle_gatt_read(SIM_HANDLES.pairing_status, &mut buf);
        assert_eq!(buf[0], PAIRING_STATUS_NOT_PAIRED);

        h.ble.push_event(BleEvent::Connected(1));
        h.provisioner.tick();
        h.provisioner.handle_gatt_read(SIM_HANDLES.pairing_status, &mut buf);
        assert_eq!(buf[0], PAIRING_STATUS_PAIRED);

        h.pairing.set_encrypted(false);
        h.provisioner.handle_gatt_read(SIM_HANDLES.pairing_status, &mut buf);
        assert_eq!(buf[0], PAIRING_STATUS_NOT_PAIRED);
    }

    #[test]
    fn test_read_values_mirrored_into_stack() {
        let mut h = harness();
        assert_eq!(h.ble.value(SIM_HANDLES.ssid), Some(Vec::new()));
        assert_eq!(h.ble.value(SIM_HANDLES.pairing_status), Some(vec![0]));

        h.write(SIM_HANDLES.ssid, b"HomeNet");
        assert_eq!(h.ble.value(SIM_HANDLES.ssid), Some(b"HomeNet".to_vec()));

        h.ble.push_event(BleEvent::Connected(2));
        h.pairing.pair();
        h.ble.push_event(BleEvent::Pairing(PairingStatus::Complete));
        h.provisioner.tick();
        assert_eq!(h.ble.value(SIM_HANDLES.pairing_status), Some(vec![1]));
    }

    // ==================== Pairing Notification Tests ====================

    #[test]
    fn test_subscription_sends_exactly_one_notification() {
        let mut h = harness();
        h.ble.push_event(BleEvent::Connected(1));
        h.pairing.pair();
        h.write(SIM_HANDLES.pairing_status + 1, &[0x01, 0x00]);

        assert_eq!(
            h.ble.notifications(),
            vec![(SIM_HANDLES.pairing_status, vec![PAIRING_STATUS_PAIRED])]
        );
    }

    #[test]
    fn test_unsubscribe_sends_nothing() {
        let mut h = harness();
        h.write(SIM_HANDLES.pairing_status + 1, &[0x00, 0x00]);
        assert!(h.ble.notifications().is_empty());
    }

    #[test]
    fn test_pairing_events_notify_subscriber() {
        let mut h = harness();
        h.ble.push_event(BleEvent::Connected(1));
        h.write(SIM_HANDLES.pairing_status + 1, &[0x01, 0x00]);
        h.ble.take_notifications();

        h.ble.push_event(BleEvent::Pairing(PairingStatus::Started));
        h.provisioner.tick();
        assert!(h.ble.notifications().is_empty());

        h.pairing.pair();
        h.ble.push_event(BleEvent::Pairing(PairingStatus::Complete));
        h.provisioner.tick();
        assert_eq!(
            h.ble.take_notifications(),
            vec![(SIM_HANDLES.pairing_status, vec![PAIRING_STATUS_PAIRED])]
        );

        h.ble.push_event(BleEvent::Pairing(PairingStatus::Failed));
        h.provisioner.tick();
        assert_eq!(
            h.ble.take_notifications(),
            vec![(SIM_HANDLES.pairing_status, vec![PAIRING_STATUS_NOT_PAIRED])]
        );
    }

    #[test]
    fn test_disconnect_notifies_then_resets_subscription() {
        let mut h = harness();
        h.ble.push_event(BleEvent::Connected(1));
        h.write(SIM_HANDLES.pairing_status + 1, &[0x01, 0x00]);
        h.ble.take_notifications();

        h.ble.push_event(BleEvent::Disconnected(1));
        h.provisioner.tick();
        assert_eq!(
            h.ble.take_notifications(),
            vec![(SIM_HANDLES.pairing_status, vec![PAIRING_STATUS_NOT_PAIRED])]
        );
        assert!(!h.provisioner.gatt().pairing_state().subscribed);
        assert_eq!(h.provisioner.connected_peer(), None);

        h.ble.push_event(BleEvent::Pairing(PairingStatus::Complete));
        h.provisioner.tick();
        assert!(h.ble.notifications().is_empty());
    }

    // ==================== BLE Connection Tests ====================

    #[test]
    fn test_ble_connection_events_reach_listener() {
        let mut h = harness();
        h.ble.push_event(BleEvent::Connected(4));
        h.provisioner.tick();
        assert_eq!(h.provisioner.connected_peer(), Some(4));

        h.ble.push_event(BleEvent::ConnectFailed(0x3E));
        h.provisioner.tick();
        assert_eq!(h.provisioner.connected_peer(), None);

        let ble_events: Vec<_> = h
            .events()
            .into_iter()
            .filter(|e| matches!(e, ProvisioningEvent::BleConnectionChanged(_)))
            .collect();
        assert_eq!(
            ble_events,
            vec![
                ProvisioningEvent::BleConnectionChanged(true),
                ProvisioningEvent::BleConnectionChanged(false),
            ]
        );
    }

    // ==================== Tick Tests ====================

    #[test]
    fn test_first_tick_reports_link_status_once() {
        let mut h = harness();
        h.provisioner.tick();
        h.provisioner.tick();
        assert_eq!(
            h.events(),
            vec![ProvisioningEvent::WifiStatusChanged(WifiLinkStatus::Idle)]
        );
        assert_eq!(h.provisioner.wifi_status(), WifiLinkStatus::Idle);
    }

    #[test]
    fn test_connect_then_connected_single_status_change() {
        let mut h = harness();
        h.provisioner.tick();
        h.events();

        assert!(h.provisioner.connect_to_network("Home", "secret"));
        h.provisioner.tick();
        h.wifi.set_status(WifiLinkStatus::Connected);
        h.provisioner.tick();
        h.provisioner.tick();

        assert_eq!(
            h.statuses(),
            vec![ProvisioningStatus::Connecting, ProvisioningStatus::Connected]
        );
    }

    #[test]
    fn test_connect_timeout_fails_and_disconnects() {
        let mut h = harness();
        assert!(h.provisioner.connect_to_network("Home", "secret"));

        h.clock.advance(CONNECT_TIMEOUT_MS);
        h.provisioner.tick();
        assert_eq!(h.provisioner.status(), ProvisioningStatus::Connecting);

        h.clock.advance(1);
        h.provisioner.tick();
        assert_eq!(h.provisioner.status(), ProvisioningStatus::Failed);
        assert_eq!(h.wifi.disconnect_calls(), 1);
    }

    #[test]
    fn test_connect_failure_status() {
        let mut h = harness();
        h.provisioner.connect_to_network("Home", "wrong");
        h.wifi.set_status(WifiLinkStatus::ConnectFailed);
        h.provisioner.tick();
        assert_eq!(h.provisioner.status(), ProvisioningStatus::Failed);
    }

    #[test]
    fn test_link_loss_returns_to_idle() {
        let mut h = harness();
        h.provisioner.connect_to_network("Home", "secret");
        h.wifi.set_status(WifiLinkStatus::Connected);
        h.provisioner.tick();
        assert_eq!(h.provisioner.status(), ProvisioningStatus::Connected);
        h.events();

        h.wifi.set_status(WifiLinkStatus::ConnectionLost);
        h.provisioner.tick();
        assert_eq!(h.provisioner.status(), ProvisioningStatus::Idle);
        assert_eq!(
            h.events(),
            vec![
                ProvisioningEvent::WifiStatusChanged(WifiLinkStatus::ConnectionLost),
                ProvisioningEvent::StatusChanged(ProvisioningStatus::Idle),
            ]
        );
    }

    #[test]
    fn test_tick_handles_bounded_number_of_ble_events() {
        let mut h = harness();
        let queued = MAX_BLE_EVENTS_PER_TICK + 2;
        for peer in 0..queued {
            h.ble.push_event(BleEvent::Connected(peer as PeerId));
        }
        let ble_changes = |events: Vec<ProvisioningEvent>| {
            events
                .into_iter()
                .filter(|e| matches!(e, ProvisioningEvent::BleConnectionChanged(true)))
                .count()
        };

        h.provisioner.tick();
        assert_eq!(ble_changes(h.events()), MAX_BLE_EVENTS_PER_TICK);
        assert_eq!(
            h.provisioner.connected_peer(),
            Some((MAX_BLE_EVENTS_PER_TICK - 1) as PeerId)
        );

        h.provisioner.tick();
        assert_eq!(ble_changes(h.events()), queued - MAX_BLE_EVENTS_PER_TICK);
        assert_eq!(h.provisioner.connected_peer(), Some((queued - 1) as PeerId));

        h.provisioner.tick();
        assert!(h.events().is_empty());
    }

    #[test]
    fn test_auto_wifi_end_to_end() {
        let wifi = SimWifi::with_networks(&[("Home", "secret")]);
        let ble = SimBle::new();
        let mut provisioner = Provisioner::with_clock(
            ProvisioningConfig::default(),
            wifi.clone(),
            ble.clone(),
            SimPairing::new(),
            MemoryStore::new(),
            ManualClock::new(),
        );
        provisioner.begin().unwrap();

        ble.push_write(SIM_HANDLES.ssid, b"Home");
        ble.push_write(SIM_HANDLES.password, b"secret");
        ble.push_write(SIM_HANDLES.command, &[Command::SaveNetwork.opcode()]);
        ble.push_write(SIM_HANDLES.command, &[Command::Connect.opcode()]);
        for _ in 0..5 {
            provisioner.tick();
        }

        assert_eq!(provisioner.status(), ProvisioningStatus::Connected);
        assert_eq!(provisioner.network_count(), 1);
        assert!(provisioner.rssi() < 0);
    }

    // ==================== API Tests ====================

    #[test]
    fn test_connect_to_stored_refused_while_busy() {
        let mut h = harness();
        h.provisioner.save_network("Home", "secret").unwrap();
        assert!(h.provisioner.connect_to_stored_networks());
        assert!(!h.provisioner.connect_to_stored_networks());
        assert_eq!(h.wifi.connect_calls().len(), 1);
    }

    #[test]
    fn test_connect_to_stored_with_empty_store() {
        let mut h = harness();
        assert!(!h.provisioner.connect_to_stored_networks());
    }

    #[test]
    fn test_connect_to_network_rejects_empty_ssid() {
        let mut h = harness();
        assert!(!h.provisioner.connect_to_network("", "pw"));
        assert_eq!(h.provisioner.status(), ProvisioningStatus::Idle);
        assert!(h.statuses().is_empty());
    }

    #[test]
    fn test_save_network_full_store() {
        let mut h = harness();
        for i in 0..crate::config::MAX_NETWORKS {
            h.provisioner
                .save_network(&format!("Net{}", i), "pw")
                .unwrap();
        }
        let err = h.provisioner.save_network("OneMore", "pw").unwrap_err();
        assert!(matches!(err, CredentialError::StoreFull { .. }));
    }

    #[test]
    fn test_allow_provisioning_when_connected() {
        let mut h = harness();
        assert!(!h.provisioner.config().allow_provisioning_when_connected);
        h.provisioner.allow_provisioning_when_connected(true);
        assert!(h.provisioner.config().allow_provisioning_when_connected);
    }

    #[test]
    fn test_rssi_passthrough() {
        let h = harness();
        h.wifi.set_rssi(-61);
        assert_eq!(h.provisioner.rssi(), -61);
    }
}
