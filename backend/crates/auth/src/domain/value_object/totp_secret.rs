//! TOTP Secret Value Object
//!
//! RFC 6238 seed for authenticator apps: SHA1, 6 digits, 30 second step,
//! one step of skew either side. Stored only encrypted (see
//! `TwoFactorService`); this type holds the plaintext in memory.

use chrono::Utc;
use kernel::error::app_error::{AppError, AppResult};
use std::fmt;
use totp_rs::{Algorithm, Secret, TOTP};
use zeroize::{Zeroize, ZeroizeOnDrop};

const TOTP_DIGITS: usize = 6;
const TOTP_STEP: u64 = 30;
const TOTP_SKEW: u8 = 1;

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct TotpSecret {
    /// Base32 (RFC 4648, no padding)
    secret_base32: String,
}

impl TotpSecret {
    /// New random 160-bit seed
    pub fn generate() -> Self {
        Self {
            secret_base32: Secret::generate_secret().to_encoded().to_string(),
        }
    }

    /// From base32 text, e.g. a decrypted stored seed
    pub fn from_base32(secret: impl Into<String>) -> AppResult<Self> {
        let secret_base32 = secret.into();
        Secret::Encoded(secret_base32.clone())
            .to_bytes()
            .map_err(|e| AppError::internal(format!("Invalid TOTP secret: {e}")))?;
        Ok(Self { secret_base32 })
    }

    pub fn as_base32(&self) -> &str {
        &self.secret_base32
    }

    fn seed(&self) -> AppResult<Vec<u8>> {
        Secret::Encoded(self.secret_base32.clone())
            .to_bytes()
            .map_err(|e| AppError::internal(format!("Invalid TOTP secret: {e}")))
    }

    /// Code generator only; issuer and account name never enter the code
    fn verifier(&self) -> AppResult<TOTP> {
        Ok(TOTP::new_unchecked(
            Algorithm::SHA1,
            TOTP_DIGITS,
            TOTP_SKEW,
            TOTP_STEP,
            self.seed()?,
            None,
            String::new(),
        ))
    }

    /// Unchecked so a `:` in the account name is percent-encoded into the
    /// label instead of rejected. Issuers are validated with the config.
    fn provisioning(&self, issuer: &str, account_name: &str) -> AppResult<TOTP> {
        Ok(TOTP::new_unchecked(
            Algorithm::SHA1,
            TOTP_DIGITS,
            TOTP_SKEW,
            TOTP_STEP,
            self.seed()?,
            Some(issuer.to_string()),
            account_name.to_string(),
        ))
    }

    /// Check `code` against the current step ± skew
    ///
    /// Anything that is not exactly six ASCII digits is rejected up front.
    pub fn verify(&self, code: &str) -> AppResult<bool> {
        let now = u64::try_from(Utc::now().timestamp())
            .map_err(|_| AppError::internal("System clock is before the Unix epoch"))?;
        self.verify_at(code, now)
    }

    /// Check `code` as if the clock read `unix_time`
    pub fn verify_at(&self, code: &str, unix_time: u64) -> AppResult<bool> {
        let code = code.trim();
        if code.len() != TOTP_DIGITS || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(false);
        }
        Ok(self.verifier()?.check(code, unix_time))
    }

    /// `otpauth://totp/...` provisioning URI
    pub fn otpauth_url(&self, issuer: &str, account_name: &str) -> AppResult<String> {
        Ok(self.provisioning(issuer, account_name)?.get_url())
    }

    /// Provisioning URI rendered as a base64 PNG QR code
    pub fn qr_code_base64(&self, issuer: &str, account_name: &str) -> AppResult<String> {
        self.provisioning(issuer, account_name)?
            .get_qr_base64()
            .map_err(|e| AppError::internal(format!("Failed to generate QR code: {e}")))
    }

    #[cfg(test)]
    pub fn generate_at(&self, unix_time: u64) -> String {
        self.verifier()
            .map(|totp| totp.generate(unix_time))
            .unwrap()
    }

    #[cfg(test)]
    pub fn generate_current(&self) -> String {
        self.generate_at(Utc::now().timestamp() as u64)
    }
}

impl fmt::Debug for TotpSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TotpSecret")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}
