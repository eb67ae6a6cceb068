//! Credential handling.
//!
//! - [`CredentialStore`] - credential pair, device id and preferences
//! - [`crypto`] - AES-256-GCM sealing used by the file backend

pub mod credentials;
pub mod crypto;

pub use credentials::{CredentialKind, CredentialStore, Credentials};
