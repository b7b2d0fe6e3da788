//! Two-factor backup codes
//!
//! Human-typed recovery codes shaped `XXXX-XXXX`, drawn from an alphabet
//! without look-alike characters (no `0 O 1 I`). Only their Argon2id hashes
//! are stored; the plaintext leaves the server exactly once.

use rand::Rng;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const GROUP_LEN: usize = 4;

/// Plaintext backup code
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct BackupCode(String);

impl BackupCode {
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let mut group = || -> String {
            (0..GROUP_LEN)
                .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
                .collect()
        };
        let first = group();
        let second = group();
        Self(format!("{first}-{second}"))
    }

    pub fn generate_set(count: usize) -> Vec<Self> {
        (0..count).map(|_| Self::generate()).collect()
    }

    /// Canonical form of user input: uppercase, whitespace dropped, the
    /// hyphen restored if it was left out. `None` if it cannot be a code.
    pub fn normalize(input: &str) -> Option<Self> {
        let compact: String = input
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if compact.len() != GROUP_LEN * 2 || !compact.bytes().all(|b| ALPHABET.contains(&b)) {
            return None;
        }
        let (first, second) = compact.split_at(GROUP_LEN);
        Some(Self(format!("{first}-{second}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0.clone()
    }
}

impl fmt::Debug for BackupCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BackupCode([REDACTED])")
    }
}
