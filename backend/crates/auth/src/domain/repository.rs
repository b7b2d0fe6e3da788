//! Repository Traits
//!
//! Persistence interface for user records. Every mutating method is a single
//! atomic write in the implementation; the compare-and-swap methods are how
//! concurrent rotations and 2FA transitions are resolved.

use std::collections::BTreeSet;

use crate::domain::entity::user::{ProfilePatch, TwoFactorState, User};
use crate::domain::value_object::{
    email::Email, refresh_family::RefreshFamily, user_id::UserId, user_name::UserName,
    user_password::UserPassword, user_role::UserRole,
};
use crate::error::AuthResult;
use chrono::{DateTime, Utc};

#[trait_variant::make(UserRepository: Send)]
pub trait LocalUserRepository {
    /// Insert a new user; unique violations surface as `DuplicateIdentity`
    async fn create(&self, user: &User) -> AuthResult<()>;

    async fn find_by_id(&self, user_id: &UserId) -> AuthResult<Option<User>>;

    async fn find_by_email(&self, email: &Email) -> AuthResult<Option<User>>;

    /// Lookup by canonical (lowercase) user name
    async fn find_by_user_name(&self, user_name: &UserName) -> AuthResult<Option<User>>;

    async fn exists_by_email(&self, email: &Email) -> AuthResult<bool>;

    async fn exists_by_user_name(&self, user_name: &UserName) -> AuthResult<bool>;

    /// Active users currently holding `role`
    async fn count_active_with_role(&self, role: UserRole) -> AuthResult<u64>;

    // ------------------------------------------------------------------------
    // Refresh family
    // ------------------------------------------------------------------------

    /// Unconditional overwrite (login, logout, revocation)
    async fn set_refresh_family(&self, user_id: &UserId, family: &RefreshFamily)
    -> AuthResult<()>;

    /// Replace the family only if it still equals `expected`.
    ///
    /// Returns `false` when another writer got there first (or the user is
    /// gone); the caller must then treat its token as reused.
    async fn compare_and_swap_refresh_family(
        &self,
        user_id: &UserId,
        expected: &RefreshFamily,
        new: &RefreshFamily,
    ) -> AuthResult<bool>;

    // ------------------------------------------------------------------------
    // Two-factor
    // ------------------------------------------------------------------------

    /// Replace the 2FA state only if it still equals `expected`
    async fn compare_and_swap_two_factor(
        &self,
        user_id: &UserId,
        expected: &TwoFactorState,
        new: &TwoFactorState,
    ) -> AuthResult<bool>;

    /// Remove one stored backup code hash.
    ///
    /// `Some(codes left)` exactly once per hash, no matter how many callers
    /// race; `None` when the hash is not stored.
    async fn remove_backup_code(
        &self,
        user_id: &UserId,
        code_hash: &str,
    ) -> AuthResult<Option<usize>>;

    // ------------------------------------------------------------------------
    // Account updates
    // ------------------------------------------------------------------------

    /// New password hash and new family in one write
    async fn update_password(
        &self,
        user_id: &UserId,
        password_hash: &UserPassword,
        family: &RefreshFamily,
    ) -> AuthResult<()>;

    async fn update_profile(&self, user_id: &UserId, patch: &ProfilePatch) -> AuthResult<()>;

    async fn update_role(&self, user_id: &UserId, role: UserRole) -> AuthResult<()>;

    /// Set `is_active`; `family` (if any) is written in the same statement
    async fn update_status(
        &self,
        user_id: &UserId,
        is_active: bool,
        family: Option<&RefreshFamily>,
    ) -> AuthResult<()>;

    async fn update_permissions(
        &self,
        user_id: &UserId,
        extra: &BTreeSet<String>,
        denied: &BTreeSet<String>,
    ) -> AuthResult<()>;

    async fn record_login(&self, user_id: &UserId, at: DateTime<Utc>) -> AuthResult<()>;

    /// `false` if there was nothing to delete
    async fn delete(&self, user_id: &UserId) -> AuthResult<bool>;
}
