//! ChaCha20-Poly1305 sealing for vault entries. A sealed value is
//! `nonce || ciphertext || tag`, hex-encoded when it is written to disk.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;
use zeroize::Zeroizing;

/// 256-bit key (32 bytes)
pub const KEY_SIZE: usize = 32;
/// 96-bit nonce (12 bytes)
pub const NONCE_SIZE: usize = 12;

#[derive(Error, Debug)]
pub enum CipherError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed - data may be corrupted or tampered")]
    DecryptionFailed,

    #[error("Invalid key size: expected {KEY_SIZE}, got {0}")]
    InvalidKeySize(usize),

    #[error("System random source unavailable")]
    RandomUnavailable,

    #[error("Ciphertext is not valid hex")]
    InvalidEncoding,
}

/// Generate a cryptographically secure random key
pub fn generate_key() -> Result<Zeroizing<[u8; KEY_SIZE]>, CipherError> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    SystemRandom::new()
        .fill(&mut key[..])
        .map_err(|_| CipherError::RandomUnavailable)?;
    Ok(key)
}

/// Generate a fresh random nonce. Never reused: one per encryption.
pub fn generate_nonce() -> Result<[u8; NONCE_SIZE], CipherError> {
    let mut nonce = [0u8; NONCE_SIZE];
    SystemRandom::new()
        .fill(&mut nonce)
        .map_err(|_| CipherError::RandomUnavailable)?;
    Ok(nonce)
}

fn cipher_for(key: &[u8]) -> Result<ChaCha20Poly1305, CipherError> {
    ChaCha20Poly1305::new_from_slice(key).map_err(|_| CipherError::InvalidKeySize(key.len()))
}

/// Seal `plaintext` under `key` with a fresh nonce prepended.
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
    let cipher = cipher_for(key)?;
    let nonce = generate_nonce()?;
    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CipherError::EncryptionFailed)?;
    Ok([nonce.as_slice(), sealed.as_slice()].concat())
}

/// Open a value produced by [`encrypt`]. A wrong key, truncated input or
/// tampered bytes all fail the same way.
pub fn decrypt(key: &[u8], sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>, CipherError> {
    let cipher = cipher_for(key)?;
    if sealed.len() < NONCE_SIZE {
        return Err(CipherError::DecryptionFailed);
    }
    let (nonce, body) = sealed.split_at(NONCE_SIZE);
    cipher
        .decrypt(Nonce::from_slice(nonce), body)
        .map(Zeroizing::new)
        .map_err(|_| CipherError::DecryptionFailed)
}

/// `encrypt`, hex-encoded for storage in the vault file
pub fn encrypt_hex(key: &[u8], plaintext: &[u8]) -> Result<String, CipherError> {
    encrypt(key, plaintext).map(hex::encode)
}

/// Inverse of `encrypt_hex`
pub fn decrypt_hex(key: &[u8], encoded: &str) -> Result<Zeroizing<Vec<u8>>, CipherError> {
    let raw = hex::decode(encoded).map_err(|_| CipherError::InvalidEncoding)?;
    decrypt(key, &raw)
}
