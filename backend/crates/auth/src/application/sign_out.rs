//! Sign Out Use Case
//!
//! Revokes the refresh family of the bearer. Access tokens already issued
//! stay valid until they expire.

use std::sync::Arc;

use crate::application::audit::{AuditEvent, AuditLog, AuditSink};
use crate::application::auth_gate::AuthGate;
use crate::application::token_service::TokenService;
use crate::domain::repository::UserRepository;
use crate::domain::value_object::user_id::UserId;
use crate::error::AuthResult;

pub struct SignOutUseCase<U, S>
where
    U: UserRepository,
    S: AuditSink + Send + Sync + 'static,
{
    gate: Arc<AuthGate<U, S>>,
    tokens: Arc<TokenService<U, S>>,
    audit: AuditLog<S>,
}

impl<U, S> SignOutUseCase<U, S>
where
    U: UserRepository,
    S: AuditSink + Send + Sync + 'static,
{
    pub fn new(
        gate: Arc<AuthGate<U, S>>,
        tokens: Arc<TokenService<U, S>>,
        audit: AuditLog<S>,
    ) -> Self {
        Self {
            gate,
            tokens,
            audit,
        }
    }

    pub async fn execute(&self, access_token: &str) -> AuthResult<UserId> {
        let user = self.gate.require_user(Some(access_token)).await?;
        self.tokens.revoke(&user.user_id).await?;

        tracing::info!(user_id = %user.user_id, "User signed out");
        self.audit.record(AuditEvent::LoggedOut {
            user_id: user.user_id,
        });

        Ok(user.user_id)
    }
}
