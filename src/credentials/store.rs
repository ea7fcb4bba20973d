//! Bounded, persisted collection of network credentials.
//!
//! Insertion order is attempt-priority order. Every mutation is written
//! through to the backing [`PersistentStore`] before the call returns.

use super::network::{
    validate, CredentialError, CredentialRecord, CredentialRecordRef, NetworkCredential,
};
use crate::config::{CREDENTIALS_KEY, MAX_CREDENTIALS_DOC_SIZE, MAX_NETWORKS};
use crate::storage::PersistentStore;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

#[derive(Serialize)]
struct DocumentRef<'a> {
    networks: Vec<CredentialRecordRef<'a>>,
}

/// Entries are kept as raw values so one malformed entry does not reject
/// the whole document.
#[derive(Deserialize)]
struct Document {
    #[serde(default)]
    networks: Vec<serde_json::Value>,
}

/// Credential store holding at most [`MAX_NETWORKS`] networks.
pub struct CredentialStore<S: PersistentStore> {
    backend: S,
    networks: Vec<NetworkCredential>,
}

impl<S: PersistentStore> CredentialStore<S> {
    /// Create an empty store over `backend` without loading anything.
    pub fn new(backend: S) -> Self {
        Self {
            backend,
            networks: Vec::with_capacity(MAX_NETWORKS),
        }
    }

    /// Create a store and load any persisted credentials.
    ///
    /// A missing or corrupt document yields an empty store.
    pub fn open(backend: S) -> Self {
        let mut store = Self::new(backend);
        if let Err(e) = store.load() {
            debug!("Starting with empty credential store: {}", e);
        }
        store
    }

    /// Save credentials for a network.
    ///
    /// An existing entry with the same SSID gets the new password and is
    /// re-enabled. Otherwise a new entry is appended if there is room.
    /// Rejected input leaves the store untouched, including a change whose
    /// document would exceed [`MAX_CREDENTIALS_DOC_SIZE`] and so could not
    /// be loaded back. If the write-through fails the in-memory change is
    /// kept and the storage error is returned.
    pub fn save(&mut self, ssid: &str, password: &str) -> Result<(), CredentialError> {
        validate(ssid, password)?;

        let mut networks = self.networks.clone();
        if let Some(existing) = networks.iter_mut().find(|n| n.ssid() == ssid) {
            existing.update_password(password);
        } else if networks.len() < MAX_NETWORKS {
            networks.push(NetworkCredential::new(ssid, password)?);
        } else {
            warn!("Cannot save network {}: store full", ssid);
            return Err(CredentialError::StoreFull { max: MAX_NETWORKS });
        }

        let bytes = match encode(&networks) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Cannot save network {}: {}", ssid, e);
                return Err(e);
            }
        };

        if networks.len() > self.networks.len() {
            debug!("Added stored network: {}", ssid);
        } else {
            debug!("Updated stored network: {}", ssid);
        }
        self.networks = networks;
        self.write(&bytes)
    }

    /// Enabled networks in priority order.
    pub fn connect_candidates(&self) -> impl Iterator<Item = &NetworkCredential> {
        self.networks.iter().filter(|n| n.enabled())
    }

    /// Remove every network and the persisted document.
    ///
    /// Always succeeds; a failure to remove the document is only logged.
    pub fn clear(&mut self) {
        self.networks.clear();
        if self.backend.exists(CREDENTIALS_KEY) {
            if let Err(e) = self.backend.remove(CREDENTIALS_KEY) {
                warn!("Failed to remove credential document: {}", e);
            }
        }
        info!("All stored networks cleared");
    }

    /// Number of stored networks.
    pub fn count(&self) -> usize {
        self.networks.len()
    }

    /// Check if no further distinct network can be added.
    pub fn is_full(&self) -> bool {
        self.networks.len() >= MAX_NETWORKS
    }

    /// All stored networks in priority order, enabled or not.
    pub fn networks(&self) -> &[NetworkCredential] {
        &self.networks
    }

    /// Look up a network by exact SSID.
    pub fn find(&self, ssid: &str) -> Option<&NetworkCredential> {
        self.networks.iter().find(|n| n.ssid() == ssid)
    }

    /// Replace the in-memory networks with the persisted document.
    ///
    /// On any error the store is left empty. Entries without an SSID are
    /// skipped, and entries beyond [`MAX_NETWORKS`] are ignored.
    /// Returns the number of networks loaded.
    pub fn load(&mut self) -> Result<usize, CredentialError> {
        self.networks.clear();

        let mut buf = [0u8; MAX_CREDENTIALS_DOC_SIZE];
        let bytes = match self.backend.read(CREDENTIALS_KEY, &mut buf) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                info!("No WiFi configuration stored");
                return Err(CredentialError::NotFound);
            }
            Err(e) => {
                warn!("Failed to read WiFi configuration: {}", e);
                return Err(e.into());
            }
        };

        let document: Document = match serde_json::from_slice(bytes) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Failed to parse WiFi configuration: {}", e);
                return Err(e.into());
            }
        };

        for entry in document.networks {
            if self.networks.len() >= MAX_NETWORKS {
                break;
            }
            let credential = serde_json::from_value::<CredentialRecord>(entry)
                .ok()
                .and_then(|record| NetworkCredential::from_record(&record));
            match credential {
                Some(credential) => self.networks.push(credential),
                None => debug!("Skipping malformed stored network entry"),
            }
        }

        info!("Loaded {} WiFi networks from storage", self.networks.len());
        Ok(self.networks.len())
    }

    /// Write the full store to the backing store.
    ///
    /// Fails with [`CredentialError::TooLarge`] without writing if the
    /// document exceeds [`MAX_CREDENTIALS_DOC_SIZE`].
    pub fn persist(&mut self) -> Result<(), CredentialError> {
        let bytes = encode(&self.networks)?;
        self.write(&bytes)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), CredentialError> {
        if let Err(e) = self.backend.write(CREDENTIALS_KEY, bytes) {
            warn!("Failed to write WiFi configuration: {}", e);
            return Err(e.into());
        }
        info!("WiFi networks saved ({} entries)", self.networks.len());
        Ok(())
    }

    /// Shared access to the backing store.
    pub fn backend(&self) -> &S {
        &self.backend
    }

    /// Exclusive access to the backing store.
    pub fn backend_mut(&mut self) -> &mut S {
        &mut self.backend
    }
}

/// Serialize `networks` as the stored document.
///
/// The document must fit the buffer [`CredentialStore::load`] reads into.
fn encode(networks: &[NetworkCredential]) -> Result<Zeroizing<Vec<u8>>, CredentialError> {
    let document = DocumentRef {
        networks: networks.iter().map(NetworkCredential::to_record).collect(),
    };
    let bytes = Zeroizing::new(serde_json::to_vec(&document)?);
    if bytes.len() > MAX_CREDENTIALS_DOC_SIZE {
        return Err(CredentialError::TooLarge {
            len: bytes.len(),
            max: MAX_CREDENTIALS_DOC_SIZE,
        });
    }
    Ok(bytes)
}
