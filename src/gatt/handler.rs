//! Decoding of characteristic writes and encoding of reads.
//!
//! The handler only stages values, recognizes commands and tracks the
//! pairing-status subscription. Executing commands is left to the caller,
//! which owns the credential store and the state machine.

use super::command::Command;
use super::staging::PendingCredentials;
use crate::platform::BleTransport;
use log::{debug, info, warn};

/// Pairing status value: not paired.
pub const PAIRING_STATUS_NOT_PAIRED: u8 = 0x00;

/// Pairing status value: paired.
pub const PAIRING_STATUS_PAIRED: u8 = 0x01;

/// Client configuration value enabling notifications.
const CCCD_NOTIFY: u16 = 0x0001;

/// Client configuration value disabling notifications.
const CCCD_DISABLED: u16 = 0x0000;

/// Attribute handles of the four provisioning characteristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GattHandles {
    /// SSID (read, write).
    pub ssid: u16,
    /// Password (write).
    pub password: u16,
    /// Command (write).
    pub command: u16,
    /// Pairing status (read, notify).
    pub pairing_status: u16,
}

/// What a write asks the caller to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Command written to the Command characteristic.
    pub command: Option<Command>,
    /// New pairing-status subscription state, for descriptor writes.
    pub pairing_subscription: Option<bool>,
}

/// Whether the client wants pairing notifications, and what it was last told.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PairingNotificationState {
    /// Client enabled notifications on the pairing status characteristic.
    pub subscribed: bool,
    /// Last pairing state pushed or requested.
    pub last_paired: bool,
}

/// GATT protocol handler for the provisioning service.
#[derive(Debug, Default)]
pub struct GattHandler {
    handles: Option<GattHandles>,
    pending: PendingCredentials,
    pairing: PairingNotificationState,
}

impl GattHandler {
    /// Create a handler with no registered service.
    ///
    /// Every write and read is ignored until [`GattHandler::attach`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the handler to the handles assigned at registration.
    pub fn attach(&mut self, handles: GattHandles) {
        debug!("GATT handles: {:?}", handles);
        self.handles = Some(handles);
    }

    /// Handles in use, if registered.
    pub fn handles(&self) -> Option<GattHandles> {
        self.handles
    }

    /// Values staged by the client.
    pub fn pending(&self) -> &PendingCredentials {
        &self.pending
    }

    /// Mutable access to the staged values.
    pub fn pending_mut(&mut self) -> &mut PendingCredentials {
        &mut self.pending
    }

    /// Current pairing notification state.
    pub fn pairing_state(&self) -> PairingNotificationState {
        self.pairing
    }

    /// Handle a client write to `handle`.
    ///
    /// SSID and password writes are staged (truncated to their limits).
    /// The first byte of a Command write is decoded; extra bytes are
    /// ignored. Any 2-byte write is also treated as a client configuration
    /// write for the characteristic at `handle - 1`.
    pub fn on_write(&mut self, handle: u16, data: &[u8]) -> WriteOutcome {
        let mut outcome = WriteOutcome::default();
        let Some(handles) = self.handles else {
            debug!("Ignoring write to 0x{:04X}: service not registered", handle);
            return outcome;
        };

        if handle == handles.ssid {
            if self.pending.ssid.set(data) {
                warn!("SSID write longer than {} bytes truncated", self.pending.ssid.capacity());
            }
            info!(
                "Received SSID: {}",
                String::from_utf8_lossy(self.pending.ssid.as_bytes())
            );
        } else if handle == handles.password {
            if self.pending.password.set(data) {
                warn!(
                    "Password write longer than {} bytes truncated",
                    self.pending.password.capacity()
                );
            }
            info!("Received password ({} bytes)", self.pending.password.len());
        } else if handle == handles.command {
            if let Some(&opcode) = data.first() {
                match Command::try_from(opcode) {
                    Ok(command) => {
                        info!("Received command: {}", command);
                        outcome.command = Some(command);
                    }
                    Err(e) => warn!("Ignoring {}", e),
                }
            }
        }

        if data.len() == 2 {
            let value = u16::from_le_bytes([data[0], data[1]]);
            if handle.wrapping_sub(1) == handles.pairing_status {
                match value {
                    CCCD_NOTIFY => {
                        self.pairing.subscribed = true;
                        outcome.pairing_subscription = Some(true);
                        info!("Pairing status notifications enabled by client");
                    }
                    CCCD_DISABLED => {
                        self.pairing.subscribed = false;
                        outcome.pairing_subscription = Some(false);
                        info!("Pairing status notifications disabled by client");
                    }
                    other => debug!("Ignoring pairing status CCCD value 0x{:04X}", other),
                }
            }
        }

        outcome
    }

    /// Handle a client read of `handle` into `buf`.
    ///
    /// An empty `buf` asks only for the value length. SSID reads copy as
    /// much of the staged SSID as fits. Returns 0 for handles this service
    /// does not serve.
    pub fn on_read(&self, handle: u16, buf: &mut [u8], paired: bool) -> usize {
        let Some(handles) = self.handles else {
            return 0;
        };

        if handle == handles.ssid {
            let value = self.pending.ssid.as_bytes();
            if buf.is_empty() {
                return value.len();
            }
            let len = value.len().min(buf.len());
            buf[..len].copy_from_slice(&value[..len]);
            len
        } else if handle == handles.pairing_status {
            if buf.is_empty() {
                return 1;
            }
            buf[0] = pairing_status_value(paired);
            1
        } else {
            0
        }
    }

    /// Push the pairing state to a subscribed client.
    ///
    /// Does nothing if the client has not enabled notifications.
    pub fn notify_pairing_status<B: BleTransport>(&mut self, paired: bool, ble: &mut B) {
        self.pairing.last_paired = paired;
        let Some(handles) = self.handles else {
            return;
        };
        if !self.pairing.subscribed {
            debug!("Pairing status {} not sent: no subscriber", paired);
            return;
        }

        let value = pairing_status_value(paired);
        match ble.notify(handles.pairing_status, &[value]) {
            Ok(()) => info!("Sent pairing status update: {}", value),
            Err(e) => warn!("Failed to send pairing status: {}", e),
        }
    }

    /// Forget the subscription of a client that went away.
    pub fn reset_subscription(&mut self) {
        self.pairing.subscribed = false;
    }
}

fn pairing_status_value(paired: bool) -> u8 {
    if paired {
        PAIRING_STATUS_PAIRED
    } else {
        PAIRING_STATUS_NOT_PAIRED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::sim::{SimBle, SIM_HANDLES};

    fn attached() -> GattHandler {
        let mut handler = GattHandler::new();
        handler.attach(SIM_HANDLES);
        handler
    }

    // ==================== Write Tests ====================

    #[test]
    fn test_writes_ignored_before_attach() {
        let mut handler = GattHandler::new();
        let outcome = handler.on_write(SIM_HANDLES.command, &[0x02]);
        assert_eq!(outcome, WriteOutcome::default());
        assert!(handler.pending().ssid.is_empty());
    }

    #[test]
    fn test_stage_ssid_and_password() {
        let mut handler = attached();
        handler.on_write(SIM_HANDLES.ssid, b"HomeNet");
        handler.on_write(SIM_HANDLES.password, b"secret123");
        assert_eq!(handler.pending().ssid.as_str(), Some("HomeNet"));
        assert_eq!(handler.pending().password.as_str(), Some("secret123"));
    }

    #[test]
    fn test_oversized_writes_truncated() {
        let mut handler = attached();
        handler.on_write(SIM_HANDLES.ssid, &[b's'; 40]);
        handler.on_write(SIM_HANDLES.password, &[b'p'; 80]);
        assert_eq!(handler.pending().ssid.len(), 32);
        assert_eq!(handler.pending().password.len(), 64);
    }

    #[test]
    fn test_command_uses_first_byte() {
        let mut handler = attached();
        let outcome = handler.on_write(SIM_HANDLES.command, &[0x01, 0xAA, 0xBB]);
        assert_eq!(outcome.command, Some(Command::SaveNetwork));
    }

    #[test]
    fn test_empty_command_write() {
        let mut handler = attached();
        let outcome = handler.on_write(SIM_HANDLES.command, &[]);
        assert_eq!(outcome.command, None);
    }

    #[test]
    fn test_unknown_opcode_ignored() {
        let mut handler = attached();
        let outcome = handler.on_write(SIM_HANDLES.command, &[0xFF]);
        assert_eq!(outcome, WriteOutcome::default());
    }

    #[test]
    fn test_unknown_handle_ignored() {
        let mut handler = attached();
        let outcome = handler.on_write(0x0100, b"whatever");
        assert_eq!(outcome, WriteOutcome::default());
        assert!(handler.pending().ssid.is_empty());
        assert!(handler.pending().password.is_empty());
    }

    // ==================== Subscription Tests ====================

    #[test]
    fn test_pairing_subscribe_and_unsubscribe() {
        let mut handler = attached();
        let cccd = SIM_HANDLES.pairing_status + 1;

        let outcome = handler.on_write(cccd, &[0x01, 0x00]);
        assert_eq!(outcome.pairing_subscription, Some(true));
        assert!(handler.pairing_state().subscribed);

        let outcome = handler.on_write(cccd, &[0x00, 0x00]);
        assert_eq!(outcome.pairing_subscription, Some(false));
        assert!(!handler.pairing_state().subscribed);
    }

    #[test]
    fn test_other_cccd_values_ignored() {
        let mut handler = attached();
        let outcome = handler.on_write(SIM_HANDLES.pairing_status + 1, &[0x02, 0x00]);
        assert_eq!(outcome.pairing_subscription, None);
        assert!(!handler.pairing_state().subscribed);
    }

    #[test]
    fn test_two_byte_write_to_other_handle_is_not_subscription() {
        let mut handler = attached();
        let outcome = handler.on_write(SIM_HANDLES.ssid, &[0x01, 0x00]);
        assert_eq!(outcome.pairing_subscription, None);
        // Still staged as an SSID; the value ends at the NUL
        assert_eq!(handler.pending().ssid.as_bytes(), &[0x01]);
    }

    #[test]
    fn test_two_byte_command_write_also_checked_as_cccd() {
        let mut handler = GattHandler::new();
        // Command handle directly follows the pairing status handle
        handler.attach(GattHandles {
            ssid: 1,
            password: 2,
            pairing_status: 3,
            command: 4,
        });
        let outcome = handler.on_write(4, &[0x01, 0x00]);
        assert_eq!(outcome.command, Some(Command::SaveNetwork));
        assert_eq!(outcome.pairing_subscription, Some(true));
    }

    // ==================== Read Tests ====================

    #[test]
    fn test_read_ssid_peek_leaves_buffer_untouched() {
        let mut handler = attached();
        handler.on_write(SIM_HANDLES.ssid, b"HomeNet");
        let mut buf: [u8; 0] = [];
        assert_eq!(handler.on_read(SIM_HANDLES.ssid, &mut buf, false), 7);
    }

    #[test]
    fn test_read_ssid_copies_value() {
        let mut handler = attached();
        handler.on_write(SIM_HANDLES.ssid, b"HomeNet");
        let mut buf = [0xEEu8; 16];
        let n = handler.on_read(SIM_HANDLES.ssid, &mut buf, false);
        assert_eq!(&buf[..n], b"HomeNet");
        assert_eq!(buf[n], 0xEE);
    }

    #[test]
    fn test_read_ssid_truncates_to_buffer() {
        let mut handler = attached();
        handler.on_write(SIM_HANDLES.ssid, b"HomeNet");
        let mut buf = [0u8; 4];
        assert_eq!(handler.on_read(SIM_HANDLES.ssid, &mut buf, false), 4);
        assert_eq!(&buf, b"Home");
    }

    #[test]
    fn test_read_pairing_status() {
        let handler = attached();
        let mut buf = [0xEEu8; 4];
        assert_eq!(handler.on_read(SIM_HANDLES.pairing_status, &mut buf, true), 1);
        assert_eq!(buf[0], PAIRING_STATUS_PAIRED);
        assert_eq!(handler.on_read(SIM_HANDLES.pairing_status, &mut buf, false), 1);
        assert_eq!(buf[0], PAIRING_STATUS_NOT_PAIRED);
        assert_eq!(handler.on_read(SIM_HANDLES.pairing_status, &mut [], false), 1);
    }

    #[test]
    fn test_read_unhandled() {
        let handler = attached();
        let mut buf = [0u8; 4];
        assert_eq!(handler.on_read(SIM_HANDLES.password, &mut buf, true), 0);
        assert_eq!(handler.on_read(SIM_HANDLES.command, &mut buf, true), 0);
        assert_eq!(handler.on_read(0x0200, &mut buf, true), 0);
    }

    // ==================== Notification Tests ====================

    #[test]
    fn test_notify_requires_subscription() {
        let mut handler = attached();
        let ble = SimBle::new();
        let mut transport = ble.clone();

        handler.notify_pairing_status(true, &mut transport);
        assert!(ble.notifications().is_empty());
        assert!(handler.pairing_state().last_paired);

        handler.on_write(SIM_HANDLES.pairing_status + 1, &[0x01, 0x00]);
        handler.notify_pairing_status(true, &mut transport);
        assert_eq!(
            ble.notifications(),
            vec![(SIM_HANDLES.pairing_status, vec![PAIRING_STATUS_PAIRED])]
        );
    }

    #[test]
    fn test_reset_subscription_stops_notifications() {
        let mut handler = attached();
        let ble = SimBle::new();
        let mut transport = ble.clone();
        handler.on_write(SIM_HANDLES.pairing_status + 1, &[0x01, 0x00]);
        handler.reset_subscription();
        handler.notify_pairing_status(false, &mut transport);
        assert!(ble.notifications().is_empty());
    }
}
