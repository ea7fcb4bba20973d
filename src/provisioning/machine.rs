//! Provisioning state machine.
//!
//! ```text
//!            begin()
//!   Started ────────► Idle ◄──────────────────────────┐
//!                      │ start_attempt                 │ disconnect / link lost
//!                      ▼                               │
//!                 Connecting ──── link Connected ──► Connected
//!                      │
//!                      │ link failure, timeout, driver error
//!                      ▼
//!                   Failed
//! ```
//!
//! `Complete` exists for wire compatibility and is never entered.

use super::{ProvisioningListener, ProvisioningStatus, WifiLinkStatus};
use crate::credentials;
use crate::platform::{BleTransport, PeerId, WifiDriver};
use log::{debug, info, warn};

/// A connection attempt in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionAttempt {
    /// Clock reading when the attempt started.
    pub started_at_ms: u64,
}

impl ConnectionAttempt {
    /// Milliseconds since the attempt started.
    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.started_at_ms)
    }
}

/// Tracks the provisioning status and drives connection attempts.
pub struct ProvisioningStateMachine {
    status: ProvisioningStatus,
    attempt: Option<ConnectionAttempt>,
    timeout_ms: u64,
    listener: Option<Box<dyn ProvisioningListener>>,
}

impl ProvisioningStateMachine {
    /// Create a machine in `Idle` that gives up on attempts after `timeout_ms`.
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            status: ProvisioningStatus::Idle,
            attempt: None,
            timeout_ms,
            listener: None,
        }
    }

    /// Current status.
    pub fn status(&self) -> ProvisioningStatus {
        self.status
    }

    /// The attempt in progress, if `Connecting`.
    pub fn attempt(&self) -> Option<ConnectionAttempt> {
        self.attempt
    }

    /// Attempt timeout in milliseconds.
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Install the listener, replacing any previous one.
    pub fn set_listener(&mut self, listener: Box<dyn ProvisioningListener>) {
        self.listener = Some(listener);
    }

    /// Announce that the service started, then settle in `Idle`.
    pub fn begin(&mut self) {
        self.set_status(ProvisioningStatus::Started);
        self.set_status(ProvisioningStatus::Idle);
    }

    /// Start connecting to `ssid`.
    ///
    /// Returns `false` without any change if the credentials are invalid.
    /// Otherwise enters `Connecting`, stops advertising, drops the BLE peer
    /// and asks the driver to connect. A driver error ends in `Failed`.
    /// Calling this while `Connecting` restarts the attempt.
    pub fn start_attempt<W, B>(
        &mut self,
        ssid: &str,
        password: &str,
        wifi: &mut W,
        ble: &mut B,
        peer: Option<PeerId>,
        now_ms: u64,
    ) -> bool
    where
        W: WifiDriver,
        B: BleTransport,
    {
        if let Err(e) = credentials::validate(ssid, password) {
            warn!("Not connecting: {}", e);
            return false;
        }

        info!("Connecting to WiFi network: {}", ssid);
        self.set_status(ProvisioningStatus::Connecting);

        if let Err(e) = ble.stop_advertising() {
            warn!("Failed to stop advertising: {}", e);
        }
        if let Some(peer) = peer {
            if let Err(e) = ble.disconnect_peer(peer) {
                warn!("Failed to disconnect BLE peer {}: {}", peer, e);
            }
        }

        let current = wifi.status();
        if !matches!(current, WifiLinkStatus::Disconnected | WifiLinkStatus::Idle) {
            debug!("Dropping current WiFi link ({}) first", current);
            if let Err(e) = wifi.disconnect() {
                warn!("WiFi disconnect failed: {}", e);
            }
        }

        if let Err(e) = wifi.connect(ssid, password) {
            warn!("WiFi connect to {} failed: {}", ssid, e);
            self.set_status(ProvisioningStatus::Failed);
            return false;
        }

        self.attempt = Some(ConnectionAttempt {
            started_at_ms: now_ms,
        });
        true
    }

    /// Advance an attempt in progress with the latest link status.
    ///
    /// Success wins over failure, and failure over the timeout. A timed
    /// out attempt is aborted at the driver.
    pub fn poll_attempt<W: WifiDriver>(&mut self, link: WifiLinkStatus, wifi: &mut W, now_ms: u64) {
        if self.status != ProvisioningStatus::Connecting {
            return;
        }
        let Some(attempt) = self.attempt else {
            return;
        };

        if link == WifiLinkStatus::Connected {
            info!("WiFi connected");
            self.set_status(ProvisioningStatus::Connected);
        } else if link.is_failure() {
            warn!("WiFi connection failed: {}", link);
            self.set_status(ProvisioningStatus::Failed);
        } else if attempt.elapsed_ms(now_ms) > self.timeout_ms {
            warn!("WiFi connection timed out after {} ms", attempt.elapsed_ms(now_ms));
            self.set_status(ProvisioningStatus::Failed);
            if let Err(e) = wifi.disconnect() {
                warn!("WiFi disconnect failed: {}", e);
            }
        }
    }

    /// Drop the WiFi link and return to `Idle`.
    pub fn disconnect<W: WifiDriver>(&mut self, wifi: &mut W) {
        if let Err(e) = wifi.disconnect() {
            warn!("WiFi disconnect failed: {}", e);
        }
        self.set_status(ProvisioningStatus::Idle);
    }

    /// React to the WiFi link going down.
    pub fn on_link_lost(&mut self) {
        if self.status == ProvisioningStatus::Connected {
            info!("WiFi connection lost");
            self.set_status(ProvisioningStatus::Idle);
        }
    }

    /// Report a raw link status change to the listener.
    pub fn emit_wifi_status(&mut self, link: WifiLinkStatus) {
        if let Some(listener) = self.listener.as_mut() {
            listener.on_wifi_status_changed(link);
        }
    }

    /// Report a BLE connection change to the listener.
    pub fn emit_ble_connection(&mut self, connected: bool) {
        if let Some(listener) = self.listener.as_mut() {
            listener.on_ble_connection_changed(connected);
        }
    }

    fn set_status(&mut self, status: ProvisioningStatus) {
        if self.status == status {
            return;
        }
        debug!("Provisioning status: {} -> {}", self.status, status);
        self.status = status;
        if status != ProvisioningStatus::Connecting {
            self.attempt = None;
        }
        if let Some(listener) = self.listener.as_mut() {
            listener.on_status_changed(status);
        }
    }
}

impl std::fmt::Debug for ProvisioningStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningStateMachine")
            .field("status", &self.status)
            .field("attempt", &self.attempt)
            .field("timeout_ms", &self.timeout_ms)
            .field("listener", &self.listener.is_some())
            .finish()
    }
}
