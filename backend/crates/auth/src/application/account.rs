//! Account Use Case
//!
//! Self-service changes: password and profile.

use std::sync::Arc;

use crate::application::audit::{AuditEvent, AuditLog, AuditSink};
use crate::domain::entity::user::{ProfilePatch, User};
use crate::domain::repository::UserRepository;
use crate::domain::service::CredentialHasher;
use crate::domain::value_object::{
    refresh_family::RefreshFamily, user_id::UserId, user_password::RawPassword,
};
use crate::error::{AuthError, AuthResult};

pub struct AccountUseCase<U, S>
where
    U: UserRepository,
    S: AuditSink + Send + Sync + 'static,
{
    user_repo: Arc<U>,
    hasher: CredentialHasher,
    audit: AuditLog<S>,
}

impl<U, S> AccountUseCase<U, S>
where
    U: UserRepository,
    S: AuditSink + Send + Sync + 'static,
{
    pub fn new(user_repo: Arc<U>, hasher: CredentialHasher, audit: AuditLog<S>) -> Self {
        Self {
            user_repo,
            hasher,
            audit,
        }
    }

    /// New hash and new refresh family in one write: every other session
    /// has to sign in again
    pub async fn change_password(
        &self,
        user_id: &UserId,
        current_password: &str,
        new_password: String,
    ) -> AuthResult<()> {
        let user = self.load(user_id).await?;

        if !self
            .hasher
            .verify(&RawPassword::unchecked(current_password), &user.password_hash)
        {
            tracing::warn!(user_id = %user_id, "Password change with wrong current password");
            return Err(AuthError::InvalidCredentials);
        }

        let new_password = RawPassword::new(new_password)?;
        let password_hash = self.hasher.hash(&new_password)?;

        self.user_repo
            .update_password(user_id, &password_hash, &RefreshFamily::generate())
            .await?;

        tracing::info!(user_id = %user_id, "Password changed");
        self.audit.record(AuditEvent::PasswordChanged { user_id: *user_id });
        Ok(())
    }

    pub async fn update_profile(&self, user_id: &UserId, patch: ProfilePatch) -> AuthResult<User> {
        let mut user = self.load(user_id).await?;
        if patch.is_empty() {
            return Ok(user);
        }

        if let Some(email) = &patch.email
            && email != &user.email
            && self.user_repo.exists_by_email(email).await?
        {
            return Err(AuthError::DuplicateIdentity { field: "email" });
        }
        if let Some(user_name) = &patch.user_name
            && user_name.canonical() != user.user_name.canonical()
            && self.user_repo.exists_by_user_name(user_name).await?
        {
            return Err(AuthError::DuplicateIdentity { field: "user_name" });
        }

        self.user_repo.update_profile(user_id, &patch).await?;
        user.apply_profile(&patch);

        tracing::info!(user_id = %user_id, "Profile updated");
        Ok(user)
    }

    async fn load(&self, user_id: &UserId) -> AuthResult<User> {
        self.user_repo
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }
}
