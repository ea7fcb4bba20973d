//! Stored network credentials and their validation.

use crate::config::{MAX_PASSWORD_LEN, MAX_SSID_LEN};
use crate::storage::StorageError;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Credentials for one WiFi network.
///
/// The SSID is the identity key inside a [`super::CredentialStore`]
/// (case-sensitive, exact match). The password is zeroed on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct NetworkCredential {
    ssid: String,
    password: String,
    enabled: bool,
}

impl NetworkCredential {
    /// Create an enabled credential.
    ///
    /// Returns an error if the SSID is empty or either field exceeds its limit.
    pub fn new(ssid: &str, password: &str) -> Result<Self, CredentialError> {
        validate(ssid, password)?;
        Ok(Self {
            ssid: ssid.to_string(),
            password: password.to_string(),
            enabled: true,
        })
    }

    /// Network SSID.
    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    /// Network password (empty for open networks).
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Whether this network is used for connection attempts.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Check if this is an open network (no password).
    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }

    /// Replace the password and re-enable the entry.
    pub(crate) fn update_password(&mut self, password: &str) {
        self.password.zeroize();
        self.password.push_str(password);
        self.enabled = true;
    }

    pub(crate) fn to_record(&self) -> CredentialRecordRef<'_> {
        CredentialRecordRef {
            ssid: &self.ssid,
            password: &self.password,
            enabled: self.enabled,
        }
    }

    /// Build a credential from a stored record.
    ///
    /// Returns `None` for records without an SSID. Missing passwords load as
    /// empty, a missing `enabled` flag loads as `true`, and overlong fields
    /// are cut to their byte limit.
    pub(crate) fn from_record(record: &CredentialRecord) -> Option<Self> {
        let ssid = record.ssid.as_deref().filter(|s| !s.is_empty())?;
        Some(Self {
            ssid: truncate_utf8(ssid, MAX_SSID_LEN).to_string(),
            password: truncate_utf8(record.password.as_deref().unwrap_or(""), MAX_PASSWORD_LEN)
                .to_string(),
            enabled: record.enabled.unwrap_or(true),
        })
    }
}

impl fmt::Debug for NetworkCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkCredential")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Validate an SSID/password pair against the protocol limits.
pub fn validate(ssid: &str, password: &str) -> Result<(), CredentialError> {
    if ssid.is_empty() {
        return Err(CredentialError::SsidEmpty);
    }
    if ssid.len() > MAX_SSID_LEN {
        return Err(CredentialError::SsidTooLong {
            len: ssid.len(),
            max: MAX_SSID_LEN,
        });
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(CredentialError::PasswordTooLong {
            len: password.len(),
            max: MAX_PASSWORD_LEN,
        });
    }
    Ok(())
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a char.
fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Serialized form of a credential.
#[derive(Serialize)]
pub(crate) struct CredentialRecordRef<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
    pub enabled: bool,
}

/// Deserialized form of a credential. Every field is optional.
#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
pub(crate) struct CredentialRecord {
    #[serde(default)]
    pub ssid: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// Errors returned by credential operations.
#[derive(Debug)]
pub enum CredentialError {
    /// SSID is empty.
    SsidEmpty,
    /// SSID exceeds maximum length.
    SsidTooLong { len: usize, max: usize },
    /// Password exceeds maximum length.
    PasswordTooLong { len: usize, max: usize },
    /// All slots are taken by other networks.
    StoreFull { max: usize },
    /// No credential document is stored.
    NotFound,
    /// Stored document exceeds the size limit.
    TooLarge { len: usize, max: usize },
    /// Stored document is not valid JSON.
    Parse(serde_json::Error),
    /// Backing store failed.
    Storage(StorageError),
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SsidEmpty => write!(f, "SSID cannot be empty"),
            Self::SsidTooLong { len, max } => {
                write!(f, "SSID too long: {} bytes (max {})", len, max)
            }
            Self::PasswordTooLong { len, max } => {
                write!(f, "password too long: {} bytes (max {})", len, max)
            }
            Self::StoreFull { max } => write!(f, "credential store full ({} networks)", max),
            Self::NotFound => write!(f, "no stored credentials"),
            Self::TooLarge { len, max } => {
                write!(f, "credential document too large: {} bytes (max {})", len, max)
            }
            Self::Parse(e) => write!(f, "invalid credential document: {}", e),
            Self::Storage(e) => write!(f, "storage error: {}", e),
        }
    }
}

impl std::error::Error for CredentialError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(e) => Some(e),
            Self::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for CredentialError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::TooLarge { len, max } => Self::TooLarge { len, max },
            other => Self::Storage(other),
        }
    }
}

impl From<serde_json::Error> for CredentialError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e)
    }
}
