//! Nexus Crypto - encrypted secret storage
//!
//! This crate provides:
//! - ChaCha20-Poly1305 authenticated encryption
//! - A per-home key file, created on first use
//! - The secret vault backing `nexus::secure`

pub mod cipher;
pub mod keyfile;
pub mod vault;

pub use cipher::CipherError;
pub use keyfile::{KeyFile, KeyFileError, KEY_FILE_NAME};
pub use vault::{SecureVault, VaultError, VaultRecord, VAULT_FILE_NAME};
