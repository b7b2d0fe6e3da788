//! User Administration
//!
//! Role, status, permission overrides and deletion of other accounts.
//! The acting user must hold `manage:users`; role changes also need
//! `manage:roles`. Superadmin accounts can only be touched by a superadmin,
//! and there is always at least one active superadmin left.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::application::audit::{AuditEvent, AuditLog, AuditSink};
use crate::domain::entity::user::User;
use crate::domain::repository::UserRepository;
use crate::domain::service::PermissionResolver;
use crate::domain::value_object::{
    permission::Permission, refresh_family::RefreshFamily, user_id::UserId,
    user_role::UserRole,
};
use crate::error::{AuthError, AuthResult};

pub struct UserAdminUseCase<U, S>
where
    U: UserRepository,
    S: AuditSink + Send + Sync + 'static,
{
    user_repo: Arc<U>,
    resolver: Arc<PermissionResolver>,
    audit: AuditLog<S>,
}

impl<U, S> UserAdminUseCase<U, S>
where
    U: UserRepository,
    S: AuditSink + Send + Sync + 'static,
{
    pub fn new(user_repo: Arc<U>, resolver: Arc<PermissionResolver>, audit: AuditLog<S>) -> Self {
        Self {
            user_repo,
            resolver,
            audit,
        }
    }

    pub async fn update_user_role(
        &self,
        actor: &User,
        target_id: &UserId,
        role: UserRole,
    ) -> AuthResult<User> {
        self.require(actor, &[Permission::ManageUsers, Permission::ManageRoles])?;
        let mut target = self.load(target_id).await?;

        if role.is_super_admin() || target.user_role.is_super_admin() {
            self.require_super_admin(actor)?;
        }
        if target.user_role == role {
            return Ok(target);
        }
        if target.user_role.is_super_admin() && target.is_active {
            self.ensure_not_last_super_admin("demote").await?;
        }

        let from = target.user_role;
        self.user_repo.update_role(target_id, role).await?;
        target.set_role(role);

        tracing::info!(
            actor = %actor.user_id,
            target_user = %target_id,
            from = %from,
            to = %role,
            "User role changed"
        );
        self.audit.record(AuditEvent::RoleChanged {
            actor: actor.user_id,
            target: *target_id,
            from,
            to: role,
        });
        Ok(target)
    }

    /// Deactivation revokes the target's refresh family in the same write
    pub async fn update_user_status(
        &self,
        actor: &User,
        target_id: &UserId,
        is_active: bool,
    ) -> AuthResult<User> {
        self.require(actor, &[Permission::ManageUsers])?;
        if actor.user_id == *target_id {
            return Err(AuthError::InvariantViolation(
                "Cannot change your own account status".into(),
            ));
        }

        let mut target = self.load(target_id).await?;
        if target.user_role.is_super_admin() {
            self.require_super_admin(actor)?;
        }
        if target.is_active == is_active {
            return Ok(target);
        }

        let family = if is_active {
            None
        } else {
            if target.user_role.is_super_admin() {
                self.ensure_not_last_super_admin("deactivate").await?;
            }
            Some(RefreshFamily::generate())
        };

        self.user_repo
            .update_status(target_id, is_active, family.as_ref())
            .await?;
        target.set_active(is_active);
        if let Some(family) = family {
            target.set_refresh_family(family);
        }

        tracing::info!(
            actor = %actor.user_id,
            target_user = %target_id,
            is_active,
            "User status changed"
        );
        self.audit.record(AuditEvent::StatusChanged {
            actor: actor.user_id,
            target: *target_id,
            is_active,
        });
        Ok(target)
    }

    /// Replace both override sets. Tags are stored as given; tags outside the
    /// catalog are kept but never resolve. The actor cannot grant anything
    /// they do not hold themselves.
    pub async fn update_user_permissions(
        &self,
        actor: &User,
        target_id: &UserId,
        extra: BTreeSet<String>,
        denied: BTreeSet<String>,
    ) -> AuthResult<User> {
        self.require(actor, &[Permission::ManageUsers])?;
        let mut target = self.load(target_id).await?;
        if target.user_role.is_super_admin() {
            self.require_super_admin(actor)?;
        }

        let unknown: Vec<&str> = extra
            .iter()
            .chain(denied.iter())
            .filter(|tag| Permission::parse(tag).is_none())
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            tracing::warn!(
                target_user = %target_id,
                unknown = ?unknown,
                "Unknown permission tags stored; they grant and deny nothing"
            );
        }

        let granted: Vec<Permission> = extra.iter().filter_map(|tag| Permission::parse(tag)).collect();
        self.require(actor, &granted)?;

        self.user_repo
            .update_permissions(target_id, &extra, &denied)
            .await?;
        target.set_permission_overrides(extra, denied);

        tracing::info!(actor = %actor.user_id, target_user = %target_id, "User permissions changed");
        self.audit.record(AuditEvent::PermissionsChanged {
            actor: actor.user_id,
            target: *target_id,
        });
        Ok(target)
    }

    pub async fn delete_user(&self, actor: &User, target_id: &UserId) -> AuthResult<()> {
        self.require(actor, &[Permission::ManageUsers])?;
        if actor.user_id == *target_id {
            return Err(AuthError::InvariantViolation(
                "Cannot delete your own account".into(),
            ));
        }

        let target = self.load(target_id).await?;
        if target.user_role.is_super_admin() {
            self.require_super_admin(actor)?;
            if target.is_active {
                self.ensure_not_last_super_admin("delete").await?;
            }
        }

        if !self.user_repo.delete(target_id).await? {
            return Err(AuthError::UserNotFound);
        }

        tracing::info!(actor = %actor.user_id, target_user = %target_id, "User deleted");
        self.audit.record(AuditEvent::UserDeleted {
            actor: actor.user_id,
            target: *target_id,
        });
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Rules
    // ------------------------------------------------------------------------

    fn require(&self, actor: &User, required: &[Permission]) -> AuthResult<()> {
        let missing = self.resolver.missing_permissions(actor, required);
        if missing.is_empty() {
            return Ok(());
        }
        let required = missing
            .iter()
            .map(Permission::tag)
            .collect::<Vec<_>>()
            .join(", ");
        tracing::warn!(actor = %actor.user_id, required = %required, "Admin action denied");
        Err(AuthError::PermissionDenied { required })
    }

    fn require_super_admin(&self, actor: &User) -> AuthResult<()> {
        if actor.user_role.is_super_admin() {
            Ok(())
        } else {
            Err(AuthError::permission_denied(format!(
                "role:{}",
                UserRole::SuperAdmin.code()
            )))
        }
    }

    async fn ensure_not_last_super_admin(&self, action: &str) -> AuthResult<()> {
        let active = self
            .user_repo
            .count_active_with_role(UserRole::SuperAdmin)
            .await?;
        if active <= 1 {
            return Err(AuthError::InvariantViolation(format!(
                "Cannot {action} the last active superadmin"
            )));
        }
        Ok(())
    }

    async fn load(&self, user_id: &UserId) -> AuthResult<User> {
        self.user_repo
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }
}
