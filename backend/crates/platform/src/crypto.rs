//! Cryptographic Utilities
//!
//! Random material, encoding helpers and [`SecretCipher`], the
//! authenticated cipher used to keep small secrets (TOTP seeds) encrypted at
//! rest under a server-held key.

use base64::{Engine, engine::general_purpose};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::{RngCore, rngs::OsRng};
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

/// ChaCha20-Poly1305 nonce length (96 bits)
pub const NONCE_LEN: usize = 12;

/// Poly1305 authentication tag length
pub const TAG_LEN: usize = 16;

/// Required key length for [`SecretCipher`]
pub const KEY_LEN: usize = 32;

/// Generate cryptographically secure random bytes
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Random bytes rendered as unpadded URL-safe base64 (opaque tokens, ids)
pub fn random_token(len: usize) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(random_bytes(len))
}

/// Encode bytes as base64
pub fn to_base64(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

/// Decode base64 to bytes
pub fn from_base64(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    general_purpose::STANDARD.decode(s)
}

/// Constant-time comparison to prevent timing attacks
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

// ============================================================================
// Secret Cipher
// ============================================================================

/// Errors from [`SecretCipher`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    /// Sealed value is not valid base64 or is shorter than nonce + tag
    #[error("Sealed secret is malformed")]
    Malformed,

    /// Authentication tag did not verify (wrong key or tampered data)
    #[error("Sealed secret failed authentication")]
    Authentication,

    /// Encryption failed
    #[error("Secret encryption failed")]
    Encryption,
}

/// Authenticated encryption for secrets stored in the database
///
/// Sealed format: `base64(nonce || ciphertext || tag)` with a fresh random
/// nonce per call, so sealing the same plaintext twice yields different
/// values.
///
/// ## Examples
/// ```rust
/// use platform::crypto::SecretCipher;
///
/// let cipher = SecretCipher::new(&[7u8; 32]);
/// let sealed = cipher.seal(b"JBSWY3DPEHPK3PXP").unwrap();
/// assert_eq!(&cipher.open(&sealed).unwrap()[..], b"JBSWY3DPEHPK3PXP");
/// ```
pub struct SecretCipher {
    cipher: ChaCha20Poly1305,
}

impl SecretCipher {
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
        }
    }

    /// Encrypt and authenticate `plaintext`
    pub fn seal(&self, plaintext: &[u8]) -> Result<String, CipherError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CipherError::Encryption)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(to_base64(&sealed))
    }

    /// Verify and decrypt a value produced by [`SecretCipher::seal`]
    ///
    /// The plaintext is wiped from memory when the returned buffer drops.
    pub fn open(&self, sealed: &str) -> Result<Zeroizing<Vec<u8>>, CipherError> {
        let raw = from_base64(sealed).map_err(|_| CipherError::Malformed)?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::Malformed);
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| CipherError::Authentication)
    }
}

impl fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretCipher")
            .field("key", &"[REDACTED]")
            .finish()
    }
}
