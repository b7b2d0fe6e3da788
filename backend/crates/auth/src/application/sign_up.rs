//! Sign Up Use Case
//!
//! Creates a new account at the baseline role.

use std::sync::Arc;

use crate::application::audit::{AuditEvent, AuditLog, AuditSink};
use crate::domain::entity::user::User;
use crate::domain::repository::UserRepository;
use crate::domain::service::CredentialHasher;
use crate::domain::value_object::{
    email::Email, user_name::UserName, user_password::RawPassword,
};
use crate::error::{AuthError, AuthResult};

pub struct SignUpInput {
    pub email: String,
    pub user_name: String,
    pub password: String,
}

pub struct SignUpUseCase<U, S>
where
    U: UserRepository,
    S: AuditSink + Send + Sync + 'static,
{
    user_repo: Arc<U>,
    hasher: CredentialHasher,
    audit: AuditLog<S>,
}

impl<U, S> SignUpUseCase<U, S>
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

    pub async fn execute(&self, input: SignUpInput) -> AuthResult<User> {
        let email = Email::new(input.email)?;
        let user_name = UserName::new(&input.user_name)?;
        let raw_password = RawPassword::new(input.password)?;

        // Friendly early answer; the store's unique constraints are authoritative
        if self.user_repo.exists_by_email(&email).await? {
            return Err(AuthError::DuplicateIdentity { field: "email" });
        }
        if self.user_repo.exists_by_user_name(&user_name).await? {
            return Err(AuthError::DuplicateIdentity { field: "user_name" });
        }

        let password_hash = self.hasher.hash(&raw_password)?;
        let user = User::new(email, user_name, password_hash);

        self.user_repo.create(&user).await?;

        tracing::info!(
            user_id = %user.user_id,
            user_name = %user.user_name,
            "User signed up"
        );
        self.audit.record(AuditEvent::UserRegistered {
            user_id: user.user_id,
        });

        Ok(user)
    }
}
