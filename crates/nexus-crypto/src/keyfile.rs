//! On-disk vault key
//!
//! The key is 32 raw bytes in a file readable only by the owner. It is
//! generated on first access and reused for the lifetime of the directory.
//! There is no passphrase and no rotation: confidentiality of the vault
//! rests on the permissions of this file.

use crate::cipher::{self, CipherError, KEY_SIZE};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;
use zeroize::Zeroizing;

pub const KEY_FILE_NAME: &str = "vault.key";

#[derive(Error, Debug)]
pub enum KeyFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Key file has {0} bytes, expected {KEY_SIZE}")]
    InvalidLength(usize),

    #[error("Key generation failed: {0}")]
    Generation(#[from] CipherError),
}

pub struct KeyFile {
    path: PathBuf,
}

impl KeyFile {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(KEY_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the key, generating it if this directory has none yet.
    ///
    /// Creation uses `create_new`, so two hosts racing on a fresh directory
    /// end up sharing whichever key landed first.
    pub fn load_or_create(&self) -> Result<Zeroizing<[u8; KEY_SIZE]>, KeyFileError> {
        match self.load() {
            Err(KeyFileError::Io(e)) if e.kind() == ErrorKind::NotFound => {}
            other => return other,
        }

        match self.create() {
            Err(KeyFileError::Io(e)) if e.kind() == ErrorKind::AlreadyExists => self.load(),
            other => other,
        }
    }

    pub fn load(&self) -> Result<Zeroizing<[u8; KEY_SIZE]>, KeyFileError> {
        let bytes = Zeroizing::new(fs::read(&self.path)?);
        if bytes.len() != KEY_SIZE {
            return Err(KeyFileError::InvalidLength(bytes.len()));
        }
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        key.copy_from_slice(&bytes);
        Ok(key)
    }

    fn create(&self) -> Result<Zeroizing<[u8; KEY_SIZE]>, KeyFileError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let key = cipher::generate_key()?;

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&self.path)?;
        file.write_all(&key[..])?;
        file.sync_all()?;

        info!(path = %self.path.display(), "generated vault key");
        Ok(key)
    }
}
