//! NVS-backed [`PersistentStore`].
//!
//! Values are stored as raw blobs in their own namespace so that clearing
//! credentials never touches other application data.

use crate::storage::{PersistentStore, StorageError};
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use esp_idf_sys::EspError;
use log::debug;

/// NVS namespace for provisioning data.
pub const NVS_NAMESPACE: &str = "wifi_prov";

/// [`PersistentStore`] over an ESP-IDF NVS namespace.
pub struct NvsStore {
    nvs: EspNvs<NvsDefault>,
}

impl NvsStore {
    /// Open (creating if needed) the provisioning namespace.
    pub fn new(partition: EspDefaultNvsPartition) -> Result<Self, EspError> {
        let nvs = EspNvs::new(partition, NVS_NAMESPACE, true)?;
        Ok(Self { nvs })
    }
}

fn nvs_error(e: EspError) -> StorageError {
    StorageError::Backend(format!("{:?}", e))
}

impl PersistentStore for NvsStore {
    fn exists(&self, key: &str) -> bool {
        matches!(self.nvs.contains(key), Ok(true))
    }

    fn read<'a>(&self, key: &str, buf: &'a mut [u8]) -> Result<Option<&'a [u8]>, StorageError> {
        if let Ok(Some(len)) = self.nvs.blob_len(key) {
            if len > buf.len() {
                return Err(StorageError::TooLarge {
                    len,
                    max: buf.len(),
                });
            }
        }
        self.nvs.get_raw(key, buf).map_err(nvs_error)
    }

    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.nvs.set_raw(key, bytes).map_err(nvs_error)?;
        debug!("NVS: wrote {} bytes to {}", bytes.len(), key);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.nvs.remove(key).map_err(nvs_error)?;
        Ok(())
    }
}
