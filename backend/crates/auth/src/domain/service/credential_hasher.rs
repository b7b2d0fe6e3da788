//! Credential hashing
//!
//! One place that knows the pepper. Account passwords and backup codes go
//! through the same Argon2id path.

use crate::domain::value_object::backup_code::BackupCode;
use crate::domain::value_object::user_password::{RawPassword, UserPassword};
use crate::error::AuthResult;

#[derive(Clone, Default)]
pub struct CredentialHasher {
    pepper: Option<Vec<u8>>,
}

impl CredentialHasher {
    pub fn new(pepper: Option<Vec<u8>>) -> Self {
        Self { pepper }
    }

    fn pepper(&self) -> Option<&[u8]> {
        self.pepper.as_deref()
    }

    /// Salted Argon2id hash; hashing the same input twice gives two
    /// different, equally valid, hashes
    pub fn hash(&self, plaintext: &RawPassword) -> AuthResult<UserPassword> {
        Ok(UserPassword::from_raw(plaintext, self.pepper())?)
    }

    pub fn verify(&self, plaintext: &RawPassword, hash: &UserPassword) -> bool {
        hash.verify(plaintext, self.pepper())
    }

    pub fn hash_backup_code(&self, code: &BackupCode) -> AuthResult<String> {
        let hash = self.hash(&RawPassword::unchecked(code.as_str()))?;
        Ok(hash.as_phc_string().to_string())
    }

    /// `false` for a mismatch and for a stored value that is not a PHC hash
    pub fn verify_backup_code(&self, code: &BackupCode, stored_hash: &str) -> bool {
        UserPassword::from_phc_string(stored_hash)
            .map(|hash| self.verify(&RawPassword::unchecked(code.as_str()), &hash))
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for CredentialHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHasher")
            .field("pepper", &self.pepper.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
