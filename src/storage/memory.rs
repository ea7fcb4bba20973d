//! In-memory storage backend.
//!
//! Used by the host simulation and tests. Reads and writes can be made to
//! fail on demand to exercise persistence error paths.

use super::{PersistentStore, StorageError};
use std::collections::HashMap;

/// `HashMap`-backed [`PersistentStore`] with failure injection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, Vec<u8>>,
    fail_reads: bool,
    fail_writes: bool,
    write_count: usize,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent read fail.
    pub fn set_fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    /// Make every subsequent write fail. Existing values are left untouched.
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Store raw bytes directly, bypassing failure injection.
    pub fn insert_raw(&mut self, key: &str, bytes: impl Into<Vec<u8>>) {
        self.entries.insert(key.to_string(), bytes.into());
    }

    /// Raw bytes stored under `key`.
    pub fn get_raw(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Number of successful writes.
    pub fn write_count(&self) -> usize {
        self.write_count
    }
}

impl PersistentStore for MemoryStore {
    fn exists(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn read<'a>(&self, key: &str, buf: &'a mut [u8]) -> Result<Option<&'a [u8]>, StorageError> {
        if self.fail_reads {
            return Err(StorageError::Backend("injected read failure".into()));
        }
        let Some(value) = self.entries.get(key) else {
            return Ok(None);
        };
        if value.len() > buf.len() {
            return Err(StorageError::TooLarge {
                len: value.len(),
                max: buf.len(),
            });
        }
        buf[..value.len()].copy_from_slice(value);
        Ok(Some(&buf[..value.len()]))
    }

    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::Backend("injected write failure".into()));
        }
        self.entries.insert(key.to_string(), bytes.to_vec());
        self.write_count += 1;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}
