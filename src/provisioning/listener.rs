//! Host-facing notifications.

use super::{ProvisioningStatus, WifiLinkStatus};
use std::sync::mpsc::Sender;

/// Receives state changes from a [`crate::Provisioner`].
///
/// Each method is called once per actual change. All methods default to
/// doing nothing.
pub trait ProvisioningListener {
    /// Provisioning status changed.
    fn on_status_changed(&mut self, _status: ProvisioningStatus) {}

    /// Raw WiFi link status changed.
    fn on_wifi_status_changed(&mut self, _status: WifiLinkStatus) {}

    /// A BLE peer connected (`true`) or went away (`false`).
    fn on_ble_connection_changed(&mut self, _connected: bool) {}
}

/// A state change, as delivered through a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningEvent {
    StatusChanged(ProvisioningStatus),
    WifiStatusChanged(WifiLinkStatus),
    BleConnectionChanged(bool),
}

/// Forwards every change into a channel the host drains.
///
/// A closed receiver is ignored.
impl ProvisioningListener for Sender<ProvisioningEvent> {
    fn on_status_changed(&mut self, status: ProvisioningStatus) {
        let _ = self.send(ProvisioningEvent::StatusChanged(status));
    }

    fn on_wifi_status_changed(&mut self, status: WifiLinkStatus) {
        let _ = self.send(ProvisioningEvent::WifiStatusChanged(status));
    }

    fn on_ble_connection_changed(&mut self, connected: bool) {
        let _ = self.send(ProvisioningEvent::BleConnectionChanged(connected));
    }
}
