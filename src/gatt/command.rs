//! Command opcodes written to the Command characteristic.
//!
//! # Example
//!
//! ```
//! use pico_wifi_provisioning::gatt::Command;
//!
//! assert_eq!(Command::try_from(0x02), Ok(Command::Connect));
//! assert_eq!(Command::Connect.opcode(), 0x02);
//! assert!(Command::try_from(0xFF).is_err());
//! ```

use std::fmt;

/// Single-byte commands understood by the provisioning service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Store the staged SSID/password.
    SaveNetwork,
    /// Connect to the staged SSID, or to stored networks if none is staged.
    Connect,
    /// Erase all stored networks.
    ClearNetworks,
    /// Reserved.
    GetStatus,
    /// Drop the WiFi connection and return to idle.
    Disconnect,
    /// Reserved.
    StartScan,
    /// Reserved.
    GetScanResults,
}

impl Command {
    /// Wire value of this command.
    pub fn opcode(self) -> u8 {
        match self {
            Self::SaveNetwork => 0x01,
            Self::Connect => 0x02,
            Self::ClearNetworks => 0x03,
            Self::GetStatus => 0x04,
            Self::Disconnect => 0x05,
            Self::StartScan => 0x06,
            Self::GetScanResults => 0x07,
        }
    }

    /// Name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SaveNetwork => "save_network",
            Self::Connect => "connect",
            Self::ClearNetworks => "clear_networks",
            Self::GetStatus => "get_status",
            Self::Disconnect => "disconnect",
            Self::StartScan => "start_scan",
            Self::GetScanResults => "get_scan_results",
        }
    }
}

impl TryFrom<u8> for Command {
    type Error = UnknownCommand;

    fn try_from(opcode: u8) -> Result<Self, Self::Error> {
        match opcode {
            0x01 => Ok(Self::SaveNetwork),
            0x02 => Ok(Self::Connect),
            0x03 => Ok(Self::ClearNetworks),
            0x04 => Ok(Self::GetStatus),
            0x05 => Ok(Self::Disconnect),
            0x06 => Ok(Self::StartScan),
            0x07 => Ok(Self::GetScanResults),
            other => Err(UnknownCommand(other)),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.as_str(), self.opcode())
    }
}

/// An opcode outside the command table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownCommand(pub u8);

impl fmt::Display for UnknownCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown command: 0x{:02X}", self.0)
    }
}

impl std::error::Error for UnknownCommand {}
