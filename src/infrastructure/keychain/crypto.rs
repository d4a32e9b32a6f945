//! Key derivation and authenticated encryption for the keychain file.

use crate::errors::{Result, SshbookError};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::prelude::{Engine, BASE64_STANDARD};
use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, KeyInit, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

pub const KEY_LEN: usize = 32;
pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;

/// Symmetric key derived from the keychain password
pub type Key = Zeroizing<[u8; KEY_LEN]>;

/// Argon2id cost parameters, stored next to the salt so they can change
/// without breaking existing keychains.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        // 19 MiB, 2 passes, 1 lane
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// A ciphertext with its nonce, both base64 encoded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sealed {
    pub nonce: String,
    pub ciphertext: String,
}

pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive the encryption key from a password with Argon2id
pub fn derive_key(password: &str, salt: &[u8], kdf: &KdfParams) -> Result<Key> {
    let params = Params::new(kdf.memory_kib, kdf.iterations, kdf.parallelism, Some(KEY_LEN))
        .map_err(|e| SshbookError::Corrupt(format!("invalid key derivation parameters: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut *key)
        .map_err(|e| SshbookError::Corrupt(format!("key derivation failed: {}", e)))?;

    Ok(key)
}

fn cipher(key: &Key) -> Result<ChaCha20Poly1305> {
    ChaCha20Poly1305::new_from_slice(&key[..])
        .map_err(|_| SshbookError::Corrupt("invalid key length".to_string()))
}

/// Encrypt `plaintext` under a fresh random nonce
pub fn seal(key: &Key, plaintext: &[u8]) -> Result<Sealed> {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher(key)?
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| SshbookError::Corrupt("encryption failed".to_string()))?;

    Ok(Sealed {
        nonce: BASE64_STANDARD.encode(nonce),
        ciphertext: BASE64_STANDARD.encode(ciphertext),
    })
}

/// Decrypt and authenticate a sealed blob.
///
/// Fails with `DecryptFailure` when the key is wrong or the data was
/// tampered with, and with `Corrupt` when the blob is not even well formed.
pub fn open(key: &Key, sealed: &Sealed) -> Result<Zeroizing<Vec<u8>>> {
    let nonce = BASE64_STANDARD
        .decode(&sealed.nonce)
        .map_err(|e| SshbookError::Corrupt(format!("bad nonce encoding: {}", e)))?;
    if nonce.len() != NONCE_LEN {
        return Err(SshbookError::Corrupt(format!("nonce must be {} bytes", NONCE_LEN)));
    }

    let ciphertext = BASE64_STANDARD
        .decode(&sealed.ciphertext)
        .map_err(|e| SshbookError::Corrupt(format!("bad ciphertext encoding: {}", e)))?;

    cipher(key)?
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
        .map(Zeroizing::new)
        .map_err(|_| SshbookError::DecryptFailure)
}
