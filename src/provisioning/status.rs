//! Provisioning and WiFi link status values.

use std::fmt;

/// State of the provisioning process.
///
/// Wire codes match the values hosts already expect (`Complete` = 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningStatus {
    /// Waiting for credentials or a command.
    Idle,
    /// Service just started (announced once, then back to `Idle`).
    Started,
    /// Reserved; no transition leads here.
    Complete,
    /// Last connection attempt failed or timed out.
    Failed,
    /// Connection attempt in progress.
    Connecting,
    /// Connected to a WiFi network.
    Connected,
}

impl ProvisioningStatus {
    /// Numeric code of this status.
    pub fn code(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Started => 1,
            Self::Complete => 2,
            Self::Failed => 3,
            Self::Connecting => 4,
            Self::Connected => 5,
        }
    }

    /// Name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Started => "started",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for ProvisioningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Raw link status reported by the WiFi driver.
///
/// Codes follow the classic `wl_status_t` numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiLinkStatus {
    /// No WiFi hardware (also the "nothing observed yet" value).
    NoShield,
    /// Driver idle, between attempts.
    Idle,
    /// Requested SSID not found.
    NoSsidAvail,
    /// Scan finished.
    ScanCompleted,
    /// Associated and configured.
    Connected,
    /// Connection attempt failed (e.g. wrong password).
    ConnectFailed,
    /// Established connection was lost.
    ConnectionLost,
    /// Not connected.
    Disconnected,
}

/// 802.11 / ESP-IDF station disconnect reason codes.
pub mod disconnect_reason {
    /// The station left on request.
    pub const ASSOC_LEAVE: u16 = 8;
    /// The four-way key handshake timed out.
    pub const FOUR_WAY_HANDSHAKE_TIMEOUT: u16 = 15;
    /// No access point with the configured SSID.
    pub const NO_AP_FOUND: u16 = 201;
    /// Authentication with the access point failed.
    pub const AUTH_FAIL: u16 = 202;
    /// Association with the access point failed.
    pub const ASSOC_FAIL: u16 = 203;
    /// The key handshake timed out, usually a wrong password.
    pub const HANDSHAKE_TIMEOUT: u16 = 204;
    /// No access point with a compatible security mode.
    pub const NO_AP_FOUND_W_COMPATIBLE_SECURITY: u16 = 210;
    /// No access point above the configured auth mode threshold.
    pub const NO_AP_FOUND_IN_AUTHMODE_THRESHOLD: u16 = 211;
    /// No access point above the configured RSSI threshold.
    pub const NO_AP_FOUND_IN_RSSI_THRESHOLD: u16 = 212;
}

impl WifiLinkStatus {
    /// Link status for a station disconnect seen during a connection attempt.
    ///
    /// Returns `None` for no reason (`0`) and for a disconnect the station
    /// requested itself, neither of which ends the attempt.
    pub fn from_disconnect_reason(reason: u16) -> Option<Self> {
        use disconnect_reason::*;
        match reason {
            0 | ASSOC_LEAVE => None,
            NO_AP_FOUND
            | NO_AP_FOUND_W_COMPATIBLE_SECURITY
            | NO_AP_FOUND_IN_AUTHMODE_THRESHOLD
            | NO_AP_FOUND_IN_RSSI_THRESHOLD => Some(Self::NoSsidAvail),
            _ => Some(Self::ConnectFailed),
        }
    }

    /// Numeric code of this status.
    pub fn code(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::NoSsidAvail => 1,
            Self::ScanCompleted => 2,
            Self::Connected => 3,
            Self::ConnectFailed => 4,
            Self::ConnectionLost => 5,
            Self::Disconnected => 6,
            Self::NoShield => 255,
        }
    }

    /// Whether this status ends a connection attempt unsuccessfully.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::ConnectFailed | Self::NoSsidAvail)
    }

    /// Whether this status means an established link went away.
    pub fn is_link_down(self) -> bool {
        matches!(self, Self::Disconnected | Self::ConnectionLost)
    }

    /// Name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoShield => "no_shield",
            Self::Idle => "idle",
            Self::NoSsidAvail => "no_ssid_avail",
            Self::ScanCompleted => "scan_completed",
            Self::Connected => "connected",
            Self::ConnectFailed => "connect_failed",
            Self::ConnectionLost => "connection_lost",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for WifiLinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provisioning_codes() {
        assert_eq!(ProvisioningStatus::Idle.code(), 0);
        assert_eq!(ProvisioningStatus::Complete.code(), 2);
        assert_eq!(ProvisioningStatus::Connected.code(), 5);
    }

    #[test]
    fn test_link_classification() {
        assert!(WifiLinkStatus::ConnectFailed.is_failure());
        assert!(WifiLinkStatus::NoSsidAvail.is_failure());
        assert!(!WifiLinkStatus::Disconnected.is_failure());
        assert!(WifiLinkStatus::Disconnected.is_link_down());
        assert!(WifiLinkStatus::ConnectionLost.is_link_down());
        assert!(!WifiLinkStatus::Idle.is_link_down());
    }

    #[test]
    fn test_disconnect_reason_mapping() {
        use disconnect_reason::*;
        assert_eq!(
            WifiLinkStatus::from_disconnect_reason(NO_AP_FOUND),
            Some(WifiLinkStatus::NoSsidAvail)
        );
        assert_eq!(
            WifiLinkStatus::from_disconnect_reason(NO_AP_FOUND_W_COMPATIBLE_SECURITY),
            Some(WifiLinkStatus::NoSsidAvail)
        );
        for reason in [AUTH_FAIL, ASSOC_FAIL, HANDSHAKE_TIMEOUT, FOUR_WAY_HANDSHAKE_TIMEOUT] {
            let status = WifiLinkStatus::from_disconnect_reason(reason);
            assert_eq!(status, Some(WifiLinkStatus::ConnectFailed));
            assert!(status.unwrap().is_failure());
        }
        assert_eq!(WifiLinkStatus::from_disconnect_reason(0), None);
        assert_eq!(WifiLinkStatus::from_disconnect_reason(ASSOC_LEAVE), None);
    }

    #[test]
    fn test_link_display() {
        assert_eq!(WifiLinkStatus::Connected.to_string(), "connected (3)");
        assert_eq!(WifiLinkStatus::NoShield.to_string(), "no_shield (255)");
    }
}
