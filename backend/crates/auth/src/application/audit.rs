//! Audit trail
//!
//! Security events are handed to an [`AuditSink`] through [`AuditLog`],
//! which is fire-and-forget: `record` returns `()`, the write runs on its
//! own task, and a failed write is logged and dropped. Nothing an audit
//! sink does can fail or delay the operation that produced the event.

use std::sync::Arc;

use thiserror::Error;

use crate::domain::value_object::{user_id::UserId, user_role::UserRole};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEvent {
    UserRegistered { user_id: UserId },
    LoginSucceeded { user_id: UserId, second_factor: Option<&'static str> },
    LoginFailed { user_id: Option<UserId>, reason: &'static str },
    TokenReuseDetected { user_id: UserId },
    LoggedOut { user_id: UserId },
    TwoFactorEnabled { user_id: UserId },
    TwoFactorDisabled { user_id: UserId },
    BackupCodeUsed { user_id: UserId, remaining: usize },
    BackupCodesRegenerated { user_id: UserId },
    PasswordChanged { user_id: UserId },
    RoleChanged { actor: UserId, target: UserId, from: UserRole, to: UserRole },
    StatusChanged { actor: UserId, target: UserId, is_active: bool },
    PermissionsChanged { actor: UserId, target: UserId },
    UserDeleted { actor: UserId, target: UserId },
}

impl AuditEvent {
    pub fn name(&self) -> &'static str {
        use AuditEvent::*;
        match self {
            UserRegistered { .. } => "user_registered",
            LoginSucceeded { .. } => "login_succeeded",
            LoginFailed { .. } => "login_failed",
            TokenReuseDetected { .. } => "token_reuse_detected",
            LoggedOut { .. } => "logged_out",
            TwoFactorEnabled { .. } => "two_factor_enabled",
            TwoFactorDisabled { .. } => "two_factor_disabled",
            BackupCodeUsed { .. } => "backup_code_used",
            BackupCodesRegenerated { .. } => "backup_codes_regenerated",
            PasswordChanged { .. } => "password_changed",
            RoleChanged { .. } => "role_changed",
            StatusChanged { .. } => "status_changed",
            PermissionsChanged { .. } => "permissions_changed",
            UserDeleted { .. } => "user_deleted",
        }
    }

    /// The account the event is about
    pub fn subject(&self) -> Option<UserId> {
        use AuditEvent::*;
        match self {
            UserRegistered { user_id }
            | LoginSucceeded { user_id, .. }
            | TokenReuseDetected { user_id }
            | LoggedOut { user_id }
            | TwoFactorEnabled { user_id }
            | TwoFactorDisabled { user_id }
            | BackupCodeUsed { user_id, .. }
            | BackupCodesRegenerated { user_id }
            | PasswordChanged { user_id } => Some(*user_id),
            LoginFailed { user_id, .. } => *user_id,
            RoleChanged { target, .. }
            | StatusChanged { target, .. }
            | PermissionsChanged { target, .. }
            | UserDeleted { target, .. } => Some(*target),
        }
    }
}

#[derive(Debug, Error)]
#[error("audit write failed: {0}")]
pub struct AuditError(pub String);

#[trait_variant::make(AuditSink: Send)]
pub trait LocalAuditSink {
    async fn write(&self, event: AuditEvent) -> Result<(), AuditError>;
}

// ============================================================================
// Best-effort wrapper
// ============================================================================

pub struct AuditLog<S> {
    sink: Arc<S>,
}

impl<S> Clone for AuditLog<S> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<S> AuditLog<S>
where
    S: AuditSink + Send + Sync + 'static,
{
    pub fn new(sink: Arc<S>) -> Self {
        Self { sink }
    }

    /// Best-effort: never blocks on the sink, never reports its failure
    pub fn record(&self, event: AuditEvent) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(event = event.name(), "No runtime, audit event dropped");
            return;
        };

        let sink = Arc::clone(&self.sink);
        runtime.spawn(async move {
            let name = event.name();
            if let Err(e) = AuditSink::write(sink.as_ref(), event).await {
                tracing::warn!(event = name, error = %e, "Audit write failed");
            }
        });
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// Emits each event as a structured `tracing` record on target `audit`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    async fn write(&self, event: AuditEvent) -> Result<(), AuditError> {
        let subject = event.subject().map(|id| id.to_string());
        tracing::info!(
            target: "audit",
            event = event.name(),
            subject = subject.as_deref().unwrap_or("-"),
            detail = ?event,
            "audit"
        );
        Ok(())
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    async fn write(&self, _event: AuditEvent) -> Result<(), AuditError> {
        Ok(())
    }
}
