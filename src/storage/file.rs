//! File-backed storage for host (development) builds.
//!
//! Each key is stored as `<root>/<key>.json`. Uses `~/.pico-wifi-provisioning`
//! by default. Writes go through a temporary file and a rename so a failed
//! write never leaves a truncated document behind.

use super::{PersistentStore, StorageError};
use log::debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Store rooted at a directory on the host filesystem.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Get the default storage directory.
    ///
    /// Returns `~/.pico-wifi-provisioning`
    pub fn default_root() -> io::Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))?;
        Ok(PathBuf::from(home).join(".pico-wifi-provisioning"))
    }

    /// Root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path used for `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", key))
    }

    fn temp_path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json.tmp", key))
    }
}

impl PersistentStore for FileStore {
    fn exists(&self, key: &str) -> bool {
        self.path_for(key).is_file()
    }

    fn read<'a>(&self, key: &str, buf: &'a mut [u8]) -> Result<Option<&'a [u8]>, StorageError> {
        let path = self.path_for(key);
        let len = match fs::metadata(&path) {
            Ok(meta) => meta.len() as usize,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No file found at {:?}", path);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        if len > buf.len() {
            return Err(StorageError::TooLarge {
                len,
                max: buf.len(),
            });
        }

        let data = fs::read(&path)?;
        // The file may have changed between metadata() and read()
        if data.len() > buf.len() {
            return Err(StorageError::TooLarge {
                len: data.len(),
                max: buf.len(),
            });
        }
        buf[..data.len()].copy_from_slice(&data);
        Ok(Some(&buf[..data.len()]))
    }

    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let tmp = self.temp_path_for(key);
        if let Err(e) = fs::write(&tmp, bytes) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        fs::rename(&tmp, &path)?;
        debug!("Wrote {} bytes to {:?}", bytes.len(), path);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
