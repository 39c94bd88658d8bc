//! Passphrase-based authenticated encryption for export containers.
//!
//! Container wire format:
//!   [ MAGIC (8) | salt (16) | nonce (12) | ciphertext + tag (16) ]
//!
//! Key: scrypt (N = 2^15, r = 8, p = 1) over the passphrase and salt, 32 bytes.
//! Cipher: AES-256-GCM with `MAGIC` as associated data.
//!
//! Keys and plaintexts live in [`Zeroizing`] buffers and are wiped on every
//! exit path. This is best effort: copies made inside the cipher or the
//! allocator are out of reach.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

use crate::domain::{AppError, Passphrase, MIN_PASSPHRASE_CHARS};

/// Container header; also bound into every ciphertext as associated data.
pub const MAGIC: &[u8; 8] = b"IMEXPV1\x00";
pub const SALT_SIZE: usize = 16;
pub const NONCE_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;
pub const KEY_SIZE: usize = 32;

/// Smallest well-formed container (empty plaintext).
pub const MIN_CONTAINER_LEN: usize = MAGIC.len() + SALT_SIZE + NONCE_SIZE + TAG_SIZE;

const SCRYPT_LOG_N: u8 = 15;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Passphrase must be at least {MIN_PASSPHRASE_CHARS} characters")]
    WeakPassphrase,

    #[error("Encrypted payload is malformed")]
    Malformed,

    #[error("Invalid encrypted package header")]
    BadHeader,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Encryption failed")]
    Encrypt,

    #[error("Decryption failed; passphrase or ciphertext is invalid")]
    Authentication,
}

impl From<CryptoError> for AppError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::WeakPassphrase | CryptoError::Malformed => Self::invalid(err.to_string()),
            CryptoError::BadHeader | CryptoError::Authentication => Self::Crypto {
                message: err.to_string(),
            },
            CryptoError::KeyDerivation(_) | CryptoError::Encrypt => Self::internal(err.to_string()),
        }
    }
}

/// Overwrites a buffer with zeros.
pub fn secure_erase(buffer: &mut [u8]) {
    buffer.zeroize();
}

/// Derives the 32-byte container key from a passphrase and salt.
///
/// # Errors
/// Returns error if the scrypt parameters are rejected.
pub fn derive_key(
    passphrase: &Passphrase,
    salt: &[u8; SALT_SIZE],
) -> Result<Zeroizing<[u8; KEY_SIZE]>, CryptoError> {
    let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_SIZE)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    scrypt::scrypt(passphrase.expose().as_bytes(), salt, &params, &mut *key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

fn cipher_for(key: &[u8; KEY_SIZE]) -> Result<Aes256Gcm, CryptoError> {
    Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}

/// Encrypts `plaintext` into a self-describing container.
///
/// # Errors
/// Returns error on a short passphrase or a cipher failure.
pub fn encrypt_bytes(plaintext: &[u8], passphrase: &Passphrase) -> Result<Vec<u8>, CryptoError> {
    if !passphrase.is_strong_enough() {
        return Err(CryptoError::WeakPassphrase);
    }

    let mut salt = [0u8; SALT_SIZE];
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut nonce);

    let key = derive_key(passphrase, &salt)?;
    let ciphertext = cipher_for(&key)?
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: MAGIC,
            },
        )
        .map_err(|_| CryptoError::Encrypt)?;

    let mut out = Vec::with_capacity(MAGIC.len() + SALT_SIZE + NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypts a container produced by [`encrypt_bytes`].
///
/// Any authentication failure is final; no partial plaintext is returned.
///
/// # Errors
/// Returns error if the container is truncated, has a foreign header, or
/// fails authentication.
pub fn decrypt_bytes(
    payload: &[u8],
    passphrase: &Passphrase,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if payload.len() < MIN_CONTAINER_LEN {
        return Err(CryptoError::Malformed);
    }
    let (header, rest) = payload.split_at(MAGIC.len());
    if header != MAGIC {
        return Err(CryptoError::BadHeader);
    }
    let (salt, rest) = rest.split_at(SALT_SIZE);
    let (nonce, ciphertext) = rest.split_at(NONCE_SIZE);

    let mut salt_buf = [0u8; SALT_SIZE];
    salt_buf.copy_from_slice(salt);

    let key = derive_key(passphrase, &salt_buf)?;
    let plaintext = cipher_for(&key)?
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: MAGIC,
            },
        )
        .map_err(|_| CryptoError::Authentication)?;

    Ok(Zeroizing::new(plaintext))
}
