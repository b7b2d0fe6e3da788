//! Sign In Use Case
//!
//! Password, account status, then the second factor if enrolled. A
//! successful sign in starts a new refresh family, which kills every refresh
//! token issued before it.

use std::sync::Arc;

use chrono::Utc;

use crate::application::audit::{AuditEvent, AuditLog, AuditSink};
use crate::application::token_service::{TokenPair, TokenService};
use crate::application::two_factor::{SecondFactor, TwoFactorService};
use crate::domain::entity::user::{TwoFactorPhase, User};
use crate::domain::repository::UserRepository;
use crate::domain::service::CredentialHasher;
use crate::domain::value_object::{
    email::Email, refresh_family::RefreshFamily, user_name::UserName,
    user_password::RawPassword,
};
use crate::error::{AuthError, AuthResult};

pub struct SignInInput {
    /// Email, or user name when there is no `@`
    pub identifier: String,
    pub password: String,
    /// TOTP or backup code, when 2FA is enabled
    pub totp_code: Option<String>,
}

#[derive(Debug)]
pub struct SignInOutput {
    pub user: User,
    pub tokens: TokenPair,
    pub second_factor: Option<SecondFactor>,
}

pub struct SignInUseCase<U, S>
where
    U: UserRepository,
    S: AuditSink + Send + Sync + 'static,
{
    user_repo: Arc<U>,
    tokens: Arc<TokenService<U, S>>,
    two_factor: Arc<TwoFactorService<U, S>>,
    hasher: CredentialHasher,
    audit: AuditLog<S>,
}

impl<U, S> SignInUseCase<U, S>
where
    U: UserRepository,
    S: AuditSink + Send + Sync + 'static,
{
    pub fn new(
        user_repo: Arc<U>,
        tokens: Arc<TokenService<U, S>>,
        two_factor: Arc<TwoFactorService<U, S>>,
        hasher: CredentialHasher,
        audit: AuditLog<S>,
    ) -> Self {
        Self {
            user_repo,
            tokens,
            two_factor,
            hasher,
            audit,
        }
    }

    pub async fn execute(&self, input: SignInInput) -> AuthResult<SignInOutput> {
        let Some(mut user) = self.find_user(&input.identifier).await? else {
            tracing::warn!("Sign in with unknown identifier");
            self.audit.record(AuditEvent::LoginFailed {
                user_id: None,
                reason: "unknown_identifier",
            });
            return Err(AuthError::InvalidCredentials);
        };

        let raw_password = RawPassword::unchecked(input.password);
        if !self.hasher.verify(&raw_password, &user.password_hash) {
            tracing::warn!(user_id = %user.user_id, "Sign in with wrong password");
            self.fail(&user, "bad_password");
            return Err(AuthError::InvalidCredentials);
        }

        // After the password check so status does not leak to guessers
        if !user.can_login() {
            self.fail(&user, "account_disabled");
            return Err(AuthError::AccountDisabled);
        }

        let second_factor = if user.two_factor_phase() == TwoFactorPhase::Enabled {
            let Some(code) = input.totp_code.as_deref().filter(|c| !c.trim().is_empty()) else {
                return Err(AuthError::TwoFactorRequired);
            };
            match self.two_factor.check_login(&user, code).await {
                Ok(factor) => Some(factor),
                Err(e) => {
                    self.fail(&user, "bad_second_factor");
                    return Err(e);
                }
            }
        } else {
            None
        };

        if user.password_hash.needs_rehash() {
            self.upgrade_hash(&mut user, &raw_password).await;
        }

        let tokens = match self.finish(&mut user).await {
            Ok(tokens) => tokens,
            Err(e) => {
                if let Some(SecondFactor::BackupCode { remaining }) = second_factor {
                    tracing::warn!(
                        user_id = %user.user_id,
                        remaining,
                        "Backup code spent on a sign in that did not complete"
                    );
                }
                return Err(e);
            }
        };

        tracing::info!(
            user_id = %user.user_id,
            second_factor = second_factor.as_ref().map(SecondFactor::label),
            "User signed in"
        );
        self.audit.record(AuditEvent::LoginSucceeded {
            user_id: user.user_id,
            second_factor: second_factor.as_ref().map(SecondFactor::label),
        });

        Ok(SignInOutput {
            user,
            tokens,
            second_factor,
        })
    }

    async fn finish(&self, user: &mut User) -> AuthResult<TokenPair> {
        let now = Utc::now();
        self.user_repo.record_login(&user.user_id, now).await?;
        user.record_login(now);

        self.tokens.issue_pair(user).await
    }

    async fn find_user(&self, identifier: &str) -> AuthResult<Option<User>> {
        let identifier = identifier.trim();
        if identifier.contains('@') {
            match Email::new(identifier) {
                Ok(email) => self.user_repo.find_by_email(&email).await,
                Err(_) => Ok(None),
            }
        } else {
            match UserName::new(identifier) {
                Ok(user_name) => self.user_repo.find_by_user_name(&user_name).await,
                Err(_) => Ok(None),
            }
        }
    }

    fn fail(&self, user: &User, reason: &'static str) {
        self.audit.record(AuditEvent::LoginFailed {
            user_id: Some(user.user_id),
            reason,
        });
    }

    /// Re-hash under current parameters; failure only costs the upgrade
    async fn upgrade_hash(&self, user: &mut User, raw_password: &RawPassword) {
        let password_hash = match self.hasher.hash(raw_password) {
            Ok(hash) => hash,
            Err(e) => {
                tracing::warn!(user_id = %user.user_id, error = %e, "Password rehash failed");
                return;
            }
        };
        // issue_pair replaces the family right after, so rotating here is free
        let family = RefreshFamily::generate();
        match self
            .user_repo
            .update_password(&user.user_id, &password_hash, &family)
            .await
        {
            Ok(()) => {
                tracing::info!(user_id = %user.user_id, "Password hash upgraded");
                user.set_password_hash(password_hash);
                user.set_refresh_family(family);
            }
            Err(e) => {
                tracing::warn!(user_id = %user.user_id, error = %e, "Password rehash not stored");
            }
        }
    }
}
