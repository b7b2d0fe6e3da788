//! Auth Gate
//!
//! Bearer token → loaded user → permission check. The user is always loaded
//! fresh from the store, so role changes and suspensions take effect on the
//! next request rather than when the access token expires.

use std::sync::Arc;

use crate::application::audit::AuditSink;
use crate::application::token_service::TokenService;
use crate::domain::entity::user::User;
use crate::domain::repository::UserRepository;
use crate::domain::service::PermissionResolver;
use crate::domain::value_object::{permission::Permission, user_role::UserRole};
use crate::error::{AuthError, AuthResult};

pub struct AuthGate<U, S>
where
    U: UserRepository,
    S: AuditSink + Send + Sync + 'static,
{
    user_repo: Arc<U>,
    tokens: Arc<TokenService<U, S>>,
    resolver: Arc<PermissionResolver>,
}

impl<U, S> AuthGate<U, S>
where
    U: UserRepository,
    S: AuditSink + Send + Sync + 'static,
{
    pub fn new(
        user_repo: Arc<U>,
        tokens: Arc<TokenService<U, S>>,
        resolver: Arc<PermissionResolver>,
    ) -> Self {
        Self {
            user_repo,
            tokens,
            resolver,
        }
    }

    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    /// `Ok(None)` without a token; a token that is present must be good
    pub async fn authenticate(&self, bearer: Option<&str>) -> AuthResult<Option<User>> {
        let Some(token) = bearer.map(str::trim).filter(|t| !t.is_empty()) else {
            return Ok(None);
        };

        let claims = self.tokens.verify_access(token)?;
        let user = self
            .user_repo
            .find_by_id(&claims.user_id)
            .await?
            .ok_or(AuthError::TokenInvalidOrExpired)?;

        if !user.can_login() {
            tracing::debug!(user_id = %user.user_id, "Token presented for disabled account");
            return Err(AuthError::AccountDisabled);
        }

        Ok(Some(user))
    }

    pub async fn require_user(&self, bearer: Option<&str>) -> AuthResult<User> {
        self.authenticate(bearer)
            .await?
            .ok_or(AuthError::AuthenticationRequired)
    }

    pub async fn require_permission(
        &self,
        bearer: Option<&str>,
        permission: Permission,
    ) -> AuthResult<User> {
        let user = self.require_user(bearer).await?;
        self.authorize_permission(&user, permission)?;
        Ok(user)
    }

    pub async fn require_any_permission(
        &self,
        bearer: Option<&str>,
        required: &[Permission],
    ) -> AuthResult<User> {
        let user = self.require_user(bearer).await?;
        self.authorize_any_permission(&user, required)?;
        Ok(user)
    }

    pub async fn require_all_permissions(
        &self,
        bearer: Option<&str>,
        required: &[Permission],
    ) -> AuthResult<User> {
        let user = self.require_user(bearer).await?;
        self.authorize_all_permissions(&user, required)?;
        Ok(user)
    }

    pub async fn require_role(&self, bearer: Option<&str>, role: UserRole) -> AuthResult<User> {
        let user = self.require_user(bearer).await?;
        self.authorize_role(&user, role)?;
        Ok(user)
    }

    // ------------------------------------------------------------------------
    // Checks on an already loaded user
    // ------------------------------------------------------------------------

    pub fn authorize_permission(&self, user: &User, permission: Permission) -> AuthResult<()> {
        if self.resolver.has_permission(user, permission) {
            return Ok(());
        }
        Err(self.denied(user, permission.tag()))
    }

    pub fn authorize_any_permission(&self, user: &User, required: &[Permission]) -> AuthResult<()> {
        if self.resolver.has_any_permission(user, required) {
            return Ok(());
        }
        Err(self.denied(user, &join_tags(required, " | ")))
    }

    pub fn authorize_all_permissions(&self, user: &User, required: &[Permission]) -> AuthResult<()> {
        let missing = self.resolver.missing_permissions(user, required);
        if missing.is_empty() {
            return Ok(());
        }
        Err(self.denied(user, &join_tags(&missing, ", ")))
    }

    pub fn authorize_role(&self, user: &User, role: UserRole) -> AuthResult<()> {
        if self.resolver.has_role(user, role) {
            return Ok(());
        }
        Err(self.denied(user, &format!("role:{}", role.code())))
    }

    fn denied(&self, user: &User, required: &str) -> AuthError {
        tracing::warn!(user_id = %user.user_id, required, "Permission denied");
        AuthError::permission_denied(required)
    }
}

fn join_tags(permissions: &[Permission], separator: &str) -> String {
    permissions
        .iter()
        .map(Permission::tag)
        .collect::<Vec<_>>()
        .join(separator)
}
