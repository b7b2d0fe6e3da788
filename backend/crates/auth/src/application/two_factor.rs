//! Two-Factor Service
//!
//! Disabled → PendingSetup → Enabled → Disabled, plus the backup code
//! regeneration self-loop on Enabled. Every transition is a compare-and-swap
//! on the full two-factor state read at the start of the operation.
//!
//! The TOTP seed is sealed with `SecretCipher` under the server key before it
//! is stored; backup codes are stored as Argon2id hashes.

use std::sync::Arc;

use chrono::Utc;
use platform::crypto::SecretCipher;

use crate::application::audit::{AuditEvent, AuditLog, AuditSink};
use crate::application::config::AuthConfig;
use crate::domain::entity::user::{TwoFactorPhase, TwoFactorState, User};
use crate::domain::repository::UserRepository;
use crate::domain::service::CredentialHasher;
use crate::domain::value_object::{
    backup_code::BackupCode, totp_secret::TotpSecret, user_id::UserId,
    user_password::RawPassword,
};
use crate::error::{AuthError, AuthResult};

/// Returned once by setup; none of it can be retrieved again
#[derive(Debug, Clone)]
pub struct TwoFactorSetupOutput {
    /// Base32 seed for manual entry
    pub secret: String,
    pub otpauth_url: String,
    /// PNG, base64
    pub qr_code_base64: String,
    pub backup_codes: Vec<String>,
}

/// Which second factor satisfied a check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondFactor {
    Totp,
    /// A backup code was consumed; `remaining` unused codes are left
    BackupCode { remaining: usize },
}

impl SecondFactor {
    pub fn label(&self) -> &'static str {
        match self {
            SecondFactor::Totp => "totp",
            SecondFactor::BackupCode { .. } => "backup_code",
        }
    }
}

pub struct TwoFactorService<U, S>
where
    U: UserRepository,
    S: AuditSink + Send + Sync + 'static,
{
    user_repo: Arc<U>,
    config: Arc<AuthConfig>,
    hasher: CredentialHasher,
    cipher: SecretCipher,
    audit: AuditLog<S>,
}

impl<U, S> TwoFactorService<U, S>
where
    U: UserRepository,
    S: AuditSink + Send + Sync + 'static,
{
    pub fn new(
        user_repo: Arc<U>,
        config: Arc<AuthConfig>,
        hasher: CredentialHasher,
        audit: AuditLog<S>,
    ) -> Self {
        let cipher = SecretCipher::new(&config.two_factor_key);
        Self {
            user_repo,
            config,
            hasher,
            cipher,
            audit,
        }
    }

    /// Disabled|PendingSetup → PendingSetup with a fresh seed and codes
    pub async fn setup(&self, user_id: &UserId) -> AuthResult<TwoFactorSetupOutput> {
        let user = self.load(user_id).await?;
        if user.two_factor_phase() == TwoFactorPhase::Enabled {
            return Err(AuthError::TwoFactorAlreadyEnabled);
        }

        let secret = TotpSecret::generate();
        let issuer = &self.config.totp_issuer;
        let account = user.email.as_str();
        let otpauth_url = secret.otpauth_url(issuer, account)?;
        let qr_code_base64 = secret.qr_code_base64(issuer, account)?;

        let sealed = self.cipher.seal(secret.as_base32().as_bytes())?;
        let (codes, hashes) = self.new_backup_codes()?;

        let pending = TwoFactorState::pending(sealed, hashes);
        self.swap_two_factor(&user, &pending).await?;

        tracing::info!(user_id = %user_id, "Two-factor setup started");

        Ok(TwoFactorSetupOutput {
            secret: secret.as_base32().to_string(),
            otpauth_url,
            qr_code_base64,
            backup_codes: codes.into_iter().map(BackupCode::into_string).collect(),
        })
    }

    /// PendingSetup → Enabled on a correct TOTP code
    pub async fn verify(&self, user_id: &UserId, code: &str) -> AuthResult<()> {
        let user = self.load(user_id).await?;
        match user.two_factor_phase() {
            TwoFactorPhase::Enabled => return Err(AuthError::TwoFactorAlreadyEnabled),
            TwoFactorPhase::Disabled => return Err(AuthError::TwoFactorNotSetup),
            TwoFactorPhase::PendingSetup => {}
        }

        if !self.verify_totp(&user, code)? {
            return Err(AuthError::InvalidTwoFactorCode);
        }

        let enabled = user.two_factor.enable(Utc::now());
        self.swap_two_factor(&user, &enabled).await?;

        tracing::info!(user_id = %user_id, "Two-factor authentication enabled");
        self.audit.record(AuditEvent::TwoFactorEnabled { user_id: *user_id });
        Ok(())
    }

    /// Second factor at login: TOTP first, then a backup code.
    ///
    /// A matching backup code is removed atomically before this returns;
    /// a code someone else consumed first counts as invalid. A seed that
    /// cannot be opened does not block the backup codes.
    pub async fn check_login(&self, user: &User, code: &str) -> AuthResult<SecondFactor> {
        if self.totp_matches(user, code) {
            return Ok(SecondFactor::Totp);
        }
        match self.consume_backup_code(user, code).await? {
            Some(remaining) => Ok(SecondFactor::BackupCode { remaining }),
            None => Err(AuthError::InvalidTwoFactorCode),
        }
    }

    /// Enabled → Disabled; needs the password and a TOTP or backup code
    pub async fn disable(&self, user_id: &UserId, password: &str, code: &str) -> AuthResult<()> {
        let user = self.load(user_id).await?;
        if user.two_factor_phase() != TwoFactorPhase::Enabled {
            return Err(AuthError::TwoFactorNotEnabled);
        }

        if !self
            .hasher
            .verify(&RawPassword::unchecked(password), &user.password_hash)
        {
            return Err(AuthError::InvalidCredentials);
        }

        // Disabling drops every backup code, so a matching one is checked but
        // not consumed; the swap below fails if it was used meanwhile
        let factor = if self.totp_matches(&user, code) {
            "totp"
        } else if self.matching_backup_code(&user, code).is_some() {
            "backup_code"
        } else {
            return Err(AuthError::InvalidTwoFactorCode);
        };

        self.swap_two_factor(&user, &TwoFactorState::default())
            .await?;

        tracing::info!(
            user_id = %user_id,
            second_factor = factor,
            "Two-factor authentication disabled"
        );
        self.audit.record(AuditEvent::TwoFactorDisabled { user_id: *user_id });
        Ok(())
    }

    /// Enabled → Enabled with a new set of codes. TOTP only.
    pub async fn regenerate_backup_codes(
        &self,
        user_id: &UserId,
        totp_code: &str,
    ) -> AuthResult<Vec<String>> {
        let user = self.load(user_id).await?;
        if user.two_factor_phase() != TwoFactorPhase::Enabled {
            return Err(AuthError::TwoFactorNotEnabled);
        }
        if !self.verify_totp(&user, totp_code)? {
            return Err(AuthError::InvalidTwoFactorCode);
        }

        let (codes, hashes) = self.new_backup_codes()?;
        let next = user.two_factor.with_backup_codes(hashes);
        self.swap_two_factor(&user, &next).await?;

        tracing::info!(user_id = %user_id, count = codes.len(), "Backup codes regenerated");
        self.audit
            .record(AuditEvent::BackupCodesRegenerated { user_id: *user_id });

        Ok(codes.into_iter().map(BackupCode::into_string).collect())
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    async fn load(&self, user_id: &UserId) -> AuthResult<User> {
        self.user_repo
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    fn open_secret(&self, user: &User) -> AuthResult<Option<TotpSecret>> {
        let Some(sealed) = user.two_factor.encrypted_secret.as_deref() else {
            return Ok(None);
        };
        let plaintext = self.cipher.open(sealed)?;
        let base32 = std::str::from_utf8(&plaintext)
            .map_err(|_| AuthError::Internal("two-factor secret is not UTF-8".into()))?;
        Ok(Some(TotpSecret::from_base32(base32)?))
    }

    fn verify_totp(&self, user: &User, code: &str) -> AuthResult<bool> {
        match self.open_secret(user)? {
            Some(secret) => Ok(secret.verify(code)?),
            None => Ok(false),
        }
    }

    /// TOTP check that treats a broken seed as a mismatch
    fn totp_matches(&self, user: &User, code: &str) -> bool {
        match self.verify_totp(user, code) {
            Ok(matched) => matched,
            Err(e) => {
                tracing::error!(user_id = %user.user_id, error = %e, "TOTP check failed");
                false
            }
        }
    }

    /// Stored hash matching `code`, if any
    fn matching_backup_code<'a>(&self, user: &'a User, code: &str) -> Option<&'a str> {
        let code = BackupCode::normalize(code)?;
        user.two_factor
            .backup_codes
            .iter()
            .find(|hash| self.hasher.verify_backup_code(&code, hash))
            .map(String::as_str)
    }

    /// `Some(remaining)` if `code` matched a stored hash and this call removed it
    async fn consume_backup_code(&self, user: &User, code: &str) -> AuthResult<Option<usize>> {
        let Some(hash) = self.matching_backup_code(user, code) else {
            return Ok(None);
        };

        let Some(remaining) = self
            .user_repo
            .remove_backup_code(&user.user_id, hash)
            .await?
        else {
            tracing::warn!(user_id = %user.user_id, "Backup code already consumed");
            return Ok(None);
        };

        tracing::info!(user_id = %user.user_id, remaining, "Backup code used");
        self.audit.record(AuditEvent::BackupCodeUsed {
            user_id: user.user_id,
            remaining,
        });
        Ok(Some(remaining))
    }

    fn new_backup_codes(&self) -> AuthResult<(Vec<BackupCode>, Vec<String>)> {
        let codes = BackupCode::generate_set(self.config.backup_code_count);
        let hashes = codes
            .iter()
            .map(|code| self.hasher.hash_backup_code(code))
            .collect::<AuthResult<Vec<_>>>()?;
        Ok((codes, hashes))
    }

    /// CAS from the state `user` was loaded with; a lost race is reported
    /// from the state that won
    async fn swap_two_factor(&self, user: &User, next: &TwoFactorState) -> AuthResult<()> {
        if self
            .user_repo
            .compare_and_swap_two_factor(&user.user_id, &user.two_factor, next)
            .await?
        {
            return Ok(());
        }

        let current = self.load(&user.user_id).await?;
        Err(match current.two_factor_phase() {
            TwoFactorPhase::Enabled if !user.two_factor.enabled => AuthError::TwoFactorAlreadyEnabled,
            TwoFactorPhase::Disabled if user.two_factor.enabled => AuthError::TwoFactorNotEnabled,
            _ => AuthError::InvariantViolation(
                "Two-factor settings changed concurrently, please retry".into(),
            ),
        })
    }
}
