//! Secure vault - encrypted secret storage
//!
//! Secrets live in one JSON file mapping name -> hex(nonce || ciphertext || tag).
//! Every mutation loads the whole file, changes one entry and writes the
//! whole file back through a temp file + rename, so readers see either the
//! old or the new vault, never half of one. There is no locking: concurrent
//! writers are last-writer-wins.
//!
//! Master key is wrapped in `Zeroizing<>` so it's automatically
//! scrubbed from memory on drop. No lingering key material.

use crate::cipher::{self, CipherError, KEY_SIZE};
use crate::keyfile::{KeyFile, KeyFileError};
use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};
use zeroize::Zeroizing;

pub const VAULT_FILE_NAME: &str = "vault.enc";

/// secret name -> hex(nonce || ciphertext || tag)
pub type VaultRecord = BTreeMap<String, String>;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Encryption error: {0}")]
    Encrypt(CipherError),
    #[error("Decryption error: {0}")]
    Decrypt(CipherError),
    #[error("Vault file is corrupt: {0}")]
    Corrupt(#[source] serde_json::Error),
    #[error("Key error: {0}")]
    Key(#[from] KeyFileError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct SecureVault {
    dir: PathBuf,
    key_file: KeyFile,
    master_key: Mutex<Option<Zeroizing<[u8; KEY_SIZE]>>>,
}

impl SecureVault {
    /// Vault rooted at `dir`. Nothing touches the disk until first use.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            key_file: KeyFile::in_dir(&dir),
            dir,
            master_key: Mutex::new(None),
        }
    }

    pub fn vault_path(&self) -> PathBuf {
        self.dir.join(VAULT_FILE_NAME)
    }

    pub fn key_path(&self) -> &Path {
        self.key_file.path()
    }

    /// Encrypt `secret` under `name`, replacing any previous entry
    pub fn store(&self, name: &str, secret: &str) -> Result<(), VaultError> {
        let key = self.master_key()?;
        let encoded = cipher::encrypt_hex(&key[..], secret.as_bytes()).map_err(VaultError::Encrypt)?;

        let mut record = self.load()?;
        record.insert(name.to_string(), encoded);
        self.save(&record)?;

        info!(secret = name, "stored secret");
        Ok(())
    }

    /// Decrypt `name`.
    ///
    /// `None` both when the secret is unknown and when it cannot be
    /// decrypted (tampered entry, foreign key, corrupt vault file).
    /// Use [`SecureVault::reveal`] to tell those apart.
    pub fn retrieve(&self, name: &str) -> Option<String> {
        match self.reveal(name) {
            Ok(secret) => secret.map(|s| s.expose_secret().clone()),
            Err(e) => {
                debug!(secret = name, error = %e, "secret unreadable");
                None
            }
        }
    }

    /// Decrypt `name`, separating "missing" (`Ok(None)`) from "unreadable" (`Err`)
    pub fn reveal(&self, name: &str) -> Result<Option<SecretString>, VaultError> {
        let record = self.load()?;
        let Some(encoded) = record.get(name) else {
            return Ok(None);
        };

        let key = self.master_key()?;
        let plaintext = cipher::decrypt_hex(&key[..], encoded).map_err(VaultError::Decrypt)?;
        let text = String::from_utf8(plaintext.to_vec())
            .map_err(|_| VaultError::Decrypt(CipherError::DecryptionFailed))?;
        Ok(Some(SecretString::new(text)))
    }

    /// Stored secret names, sorted
    pub fn list_keys(&self) -> Result<Vec<String>, VaultError> {
        Ok(self.load()?.into_keys().collect())
    }

    /// Remove `name`. Returns whether it existed.
    pub fn delete(&self, name: &str) -> Result<bool, VaultError> {
        let mut record = self.load()?;
        if record.remove(name).is_none() {
            return Ok(false);
        }
        self.save(&record)?;
        info!(secret = name, "deleted secret");
        Ok(true)
    }

    fn master_key(&self) -> Result<Zeroizing<[u8; KEY_SIZE]>, VaultError> {
        let mut slot = self
            .master_key
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(key) = slot.as_ref() {
            return Ok(key.clone());
        }
        let key = self.key_file.load_or_create()?;
        *slot = Some(key.clone());
        Ok(key)
    }

    fn load(&self) -> Result<VaultRecord, VaultError> {
        match fs::read(self.vault_path()) {
            Ok(data) => serde_json::from_slice(&data).map_err(VaultError::Corrupt),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(VaultRecord::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, record: &VaultRecord) -> Result<(), VaultError> {
        fs::create_dir_all(&self.dir)?;
        let data = serde_json::to_vec_pretty(record).map_err(VaultError::Corrupt)?;

        // NamedTempFile is created 0600 on unix
        let mut staging = NamedTempFile::new_in(&self.dir)?;
        staging.write_all(&data)?;
        staging.as_file().sync_all()?;
        staging
            .persist(self.vault_path())
            .map_err(|e| VaultError::Io(e.error))?;
        Ok(())
    }
}
