//! Fixed-capacity buffers staging values written over GATT.
//!
//! Values written to the SSID and Password characteristics are held here
//! until a command commits them. Nothing here allocates.

use crate::config::{MAX_PASSWORD_LEN, MAX_SSID_LEN};
use zeroize::Zeroize;

/// Byte buffer holding at most `N` bytes.
///
/// Longer writes are truncated, without splitting a UTF-8 character that
/// straddles the limit. The value is read with C-string semantics:
/// it ends at the first NUL byte, so zero padding is not part of it.
pub struct BoundedBuf<const N: usize> {
    bytes: [u8; N],
    len: usize,
}

impl<const N: usize> BoundedBuf<N> {
    /// Create an empty buffer.
    pub const fn new() -> Self {
        Self {
            bytes: [0u8; N],
            len: 0,
        }
    }

    /// Replace the contents with `data`, truncated to `N` bytes.
    ///
    /// Returns `true` if `data` had to be truncated.
    pub fn set(&mut self, data: &[u8]) -> bool {
        self.bytes.zeroize();
        let len = if data.len() > N {
            truncated_len(data, N)
        } else {
            data.len()
        };
        self.bytes[..len].copy_from_slice(&data[..len]);
        self.len = len;
        data.len() > N
    }

    /// The current value, up to the first NUL byte.
    pub fn as_bytes(&self) -> &[u8] {
        let written = &self.bytes[..self.len];
        let end = written.iter().position(|&b| b == 0).unwrap_or(self.len);
        &written[..end]
    }

    /// The current value as UTF-8, if valid.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(self.as_bytes()).ok()
    }

    /// Check if the value is empty.
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Length of the value in bytes.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Capacity in bytes.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Zero the contents.
    pub fn clear(&mut self) {
        self.bytes.zeroize();
        self.len = 0;
    }
}

/// Length of `data` cut to `max` bytes, backed off to the start of a
/// multibyte character that the cut would split.
fn truncated_len(data: &[u8], max: usize) -> usize {
    match std::str::from_utf8(&data[..max]) {
        // Incomplete character at the end of the prefix
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        _ => max,
    }
}

impl<const N: usize> Default for BoundedBuf<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Zeroize for BoundedBuf<N> {
    fn zeroize(&mut self) {
        self.clear();
    }
}

impl<const N: usize> Drop for BoundedBuf<N> {
    fn drop(&mut self) {
        self.clear();
    }
}

/// SSID and password received over GATT but not yet committed.
#[derive(Default)]
pub struct PendingCredentials {
    /// Last SSID written by the client.
    pub ssid: BoundedBuf<MAX_SSID_LEN>,
    /// Last password written by the client.
    pub password: BoundedBuf<MAX_PASSWORD_LEN>,
}

impl PendingCredentials {
    /// Create empty staging buffers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear both buffers, zeroing the password.
    pub fn clear(&mut self) {
        self.ssid.clear();
        self.password.clear();
    }
}

impl std::fmt::Debug for PendingCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCredentials")
            .field("ssid", &String::from_utf8_lossy(self.ssid.as_bytes()))
            .field("password_len", &self.password.len())
            .finish()
    }
}
