//! In-memory user store
//!
//! Same contract as the Postgres store: each method takes the write lock for
//! its whole read-modify-write, so compare-and-swap and backup code removal
//! are atomic across tasks. Used by tests and local runs without a database.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::entity::user::{ProfilePatch, TwoFactorState, User};
use crate::domain::repository::UserRepository;
use crate::domain::value_object::{
    email::Email, refresh_family::RefreshFamily, user_id::UserId, user_name::UserName,
    user_password::UserPassword, user_role::UserRole,
};
use crate::error::{AuthError, AuthResult};

#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<UserId, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

/// Unique email / user name among every user except `skip`
fn check_unique(
    users: &HashMap<UserId, User>,
    skip: Option<&UserId>,
    email: Option<&Email>,
    user_name: Option<&UserName>,
) -> AuthResult<()> {
    for other in users.values().filter(|u| Some(&u.user_id) != skip) {
        if email.is_some_and(|e| e == &other.email) {
            return Err(AuthError::DuplicateIdentity { field: "email" });
        }
        if user_name.is_some_and(|n| n.canonical() == other.user_name.canonical()) {
            return Err(AuthError::DuplicateIdentity { field: "user_name" });
        }
    }
    Ok(())
}

/// Apply `f` to an existing user; a missing user is `UserNotFound`
async fn modify<F>(repo: &InMemoryUserRepository, user_id: &UserId, f: F) -> AuthResult<()>
where
    F: FnOnce(&mut User),
{
    let mut users = repo.users.write().await;
    let user = users.get_mut(user_id).ok_or(AuthError::UserNotFound)?;
    f(user);
    Ok(())
}

impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: &User) -> AuthResult<()> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.user_id) {
            return Err(AuthError::DuplicateIdentity { field: "user_id" });
        }
        check_unique(&users, None, Some(&user.email), Some(&user.user_name))?;
        users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn find_by_id(&self, user_id: &UserId) -> AuthResult<Option<User>> {
        Ok(self.users.read().await.get(user_id).cloned())
    }

    async fn find_by_email(&self, email: &Email) -> AuthResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| &u.email == email).cloned())
    }

    async fn find_by_user_name(&self, user_name: &UserName) -> AuthResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.user_name.canonical() == user_name.canonical())
            .cloned())
    }

    async fn exists_by_email(&self, email: &Email) -> AuthResult<bool> {
        Ok(self.find_by_email(email).await?.is_some())
    }

    async fn exists_by_user_name(&self, user_name: &UserName) -> AuthResult<bool> {
        Ok(self.find_by_user_name(user_name).await?.is_some())
    }

    async fn count_active_with_role(&self, role: UserRole) -> AuthResult<u64> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .filter(|u| u.is_active && u.user_role == role)
            .count() as u64)
    }

    async fn set_refresh_family(
        &self,
        user_id: &UserId,
        family: &RefreshFamily,
    ) -> AuthResult<()> {
        modify(self, user_id, |user| user.set_refresh_family(family.clone())).await
    }

    async fn compare_and_swap_refresh_family(
        &self,
        user_id: &UserId,
        expected: &RefreshFamily,
        new: &RefreshFamily,
    ) -> AuthResult<bool> {
        let mut users = self.users.write().await;
        match users.get_mut(user_id) {
            Some(user) if &user.refresh_token_family == expected => {
                user.set_refresh_family(new.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn compare_and_swap_two_factor(
        &self,
        user_id: &UserId,
        expected: &TwoFactorState,
        new: &TwoFactorState,
    ) -> AuthResult<bool> {
        let mut users = self.users.write().await;
        match users.get_mut(user_id) {
            Some(user) if &user.two_factor == expected => {
                user.set_two_factor(new.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove_backup_code(
        &self,
        user_id: &UserId,
        code_hash: &str,
    ) -> AuthResult<Option<usize>> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(user_id) else {
            return Ok(None);
        };
        let Some(index) = user
            .two_factor
            .backup_codes
            .iter()
            .position(|h| h == code_hash)
        else {
            return Ok(None);
        };

        let mut state = user.two_factor.clone();
        state.backup_codes.remove(index);
        let remaining = state.backup_codes.len();
        user.set_two_factor(state);
        Ok(Some(remaining))
    }

    async fn update_password(
        &self,
        user_id: &UserId,
        password_hash: &UserPassword,
        family: &RefreshFamily,
    ) -> AuthResult<()> {
        modify(self, user_id, |user| {
            user.set_password_hash(password_hash.clone());
            user.set_refresh_family(family.clone());
        })
        .await
    }

    async fn update_profile(&self, user_id: &UserId, patch: &ProfilePatch) -> AuthResult<()> {
        let mut users = self.users.write().await;
        check_unique(
            &users,
            Some(user_id),
            patch.email.as_ref(),
            patch.user_name.as_ref(),
        )?;
        let user = users.get_mut(user_id).ok_or(AuthError::UserNotFound)?;
        user.apply_profile(patch);
        Ok(())
    }

    async fn update_role(&self, user_id: &UserId, role: UserRole) -> AuthResult<()> {
        modify(self, user_id, |user| user.set_role(role)).await
    }

    async fn update_status(
        &self,
        user_id: &UserId,
        is_active: bool,
        family: Option<&RefreshFamily>,
    ) -> AuthResult<()> {
        modify(self, user_id, |user| {
            user.set_active(is_active);
            if let Some(family) = family {
                user.set_refresh_family(family.clone());
            }
        })
        .await
    }

    async fn update_permissions(
        &self,
        user_id: &UserId,
        extra: &BTreeSet<String>,
        denied: &BTreeSet<String>,
    ) -> AuthResult<()> {
        modify(self, user_id, |user| {
            user.set_permission_overrides(extra.clone(), denied.clone())
        })
        .await
    }

    async fn record_login(&self, user_id: &UserId, at: DateTime<Utc>) -> AuthResult<()> {
        modify(self, user_id, |user| user.record_login(at)).await
    }

    async fn delete(&self, user_id: &UserId) -> AuthResult<bool> {
        Ok(self.users.write().await.remove(user_id).is_some())
    }
}
