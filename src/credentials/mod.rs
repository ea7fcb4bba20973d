//! Network credential storage.
//!
//! # Components
//!
//! - [`network`] - A single network's credentials and validation
//! - [`store`] - Bounded, write-through credential store
//!
//! The persisted document looks like:
//!
//! ```text
//! {"networks":[{"ssid":"Home","password":"secret","enabled":true}]}
//! ```

mod network;
mod store;

pub use network::{validate, CredentialError, NetworkCredential};
pub use store::CredentialStore;
