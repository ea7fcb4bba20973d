//! Key/value persistence for provisioning data.
//!
//! The credential store writes one document under a single key. Backends:
//!
//! - [`FileStore`] - one file per key on the host filesystem
//! - [`MemoryStore`] - in-memory map with failure injection
//! - `NvsStore` - ESP32 Non-Volatile Storage (`esp32` feature, see [`crate::platform`])

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// A flat key/value store for small binary records.
///
/// Modelled on the NVS raw blob API: reads copy into a caller-provided
/// buffer and report values that do not fit instead of truncating them.
pub trait PersistentStore {
    /// Check whether a value is stored under `key`.
    fn exists(&self, key: &str) -> bool;

    /// Read the value stored under `key` into `buf`.
    ///
    /// Returns `Ok(None)` if nothing is stored and
    /// [`StorageError::TooLarge`] if the value does not fit in `buf`.
    fn read<'a>(&self, key: &str, buf: &'a mut [u8]) -> Result<Option<&'a [u8]>, StorageError>;

    /// Replace the value stored under `key`.
    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Remove the value stored under `key`. Removing a missing key succeeds.
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

/// Errors reported by storage backends.
#[derive(Debug)]
pub enum StorageError {
    /// Stored value is larger than the read buffer.
    TooLarge { len: usize, max: usize },
    /// Filesystem I/O error.
    Io(std::io::Error),
    /// Backend-specific failure (NVS error code, injected failure).
    Backend(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooLarge { len, max } => {
                write!(f, "stored value too large: {} bytes (max {})", len, max)
            }
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Backend(msg) => write!(f, "storage backend error: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
