//! PostgreSQL Repository Implementation
//!
//! One row per user in `users`. Compare-and-swap operations put the expected
//! value in the `WHERE` clause and report success through `rows_affected`;
//! under READ COMMITTED a racing update re-checks the predicate after the
//! winner commits, so exactly one of them matches.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgQueryResult;
use uuid::Uuid;

use crate::domain::entity::user::{ProfilePatch, TwoFactorState, User};
use crate::domain::repository::UserRepository;
use crate::domain::value_object::{
    email::Email, refresh_family::RefreshFamily, user_id::UserId, user_name::UserName,
    user_password::UserPassword, user_role::UserRole,
};
use crate::error::{AuthError, AuthResult};

const USER_COLUMNS: &str = r#"
    user_id,
    email,
    user_name,
    password_hash,
    user_role,
    extra_permissions,
    denied_permissions,
    is_active,
    refresh_token_family,
    two_factor_enabled,
    two_factor_secret,
    two_factor_backup_codes,
    two_factor_verified_at,
    last_login_at,
    created_at,
    updated_at
"#;

/// PostgreSQL-backed user repository
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, column: &str, value: &str) -> AuthResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        row.map(UserRow::into_user).transpose()
    }
}

/// Unique violations name the identity that collided; everything else is a
/// plain database error
fn map_write_error(err: sqlx::Error) -> AuthError {
    if let sqlx::Error::Database(db) = &err
        && db.is_unique_violation()
    {
        let field = match db.constraint() {
            Some("users_email_key") => "email",
            Some("users_user_name_canonical_key") => "user_name",
            _ => "user_id",
        };
        return AuthError::DuplicateIdentity { field };
    }
    AuthError::Database(err)
}

fn expect_row(result: PgQueryResult) -> AuthResult<()> {
    if result.rows_affected() == 0 {
        return Err(AuthError::UserNotFound);
    }
    Ok(())
}

fn tags(set: &BTreeSet<String>) -> Vec<String> {
    set.iter().cloned().collect()
}

// ============================================================================
// User Repository Implementation
// ============================================================================

impl UserRepository for PgUserRepository {
    async fn create(&self, user: &User) -> AuthResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (
                user_id,
                email,
                user_name,
                user_name_canonical,
                password_hash,
                user_role,
                extra_permissions,
                denied_permissions,
                is_active,
                refresh_token_family,
                two_factor_enabled,
                two_factor_secret,
                two_factor_backup_codes,
                two_factor_verified_at,
                last_login_at,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(user.user_id.as_uuid())
        .bind(user.email.as_str())
        .bind(user.user_name.original())
        .bind(user.user_name.canonical())
        .bind(user.password_hash.as_phc_string())
        .bind(user.user_role.ordinal())
        .bind(tags(&user.extra_permissions))
        .bind(tags(&user.denied_permissions))
        .bind(user.is_active)
        .bind(user.refresh_token_family.as_str())
        .bind(user.two_factor.enabled)
        .bind(user.two_factor.encrypted_secret.as_deref())
        .bind(&user.two_factor.backup_codes)
        .bind(user.two_factor.verified_at)
        .bind(user.last_login_at)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(())
    }

    async fn find_by_id(&self, user_id: &UserId) -> AuthResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(UserRow::into_user).transpose()
    }

    async fn find_by_email(&self, email: &Email) -> AuthResult<Option<User>> {
        self.find_one("email", email.as_str()).await
    }

    async fn find_by_user_name(&self, user_name: &UserName) -> AuthResult<Option<User>> {
        self.find_one("user_name_canonical", user_name.canonical())
            .await
    }

    async fn exists_by_email(&self, email: &Email) -> AuthResult<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
                .bind(email.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    async fn exists_by_user_name(&self, user_name: &UserName) -> AuthResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE user_name_canonical = $1)",
        )
        .bind(user_name.canonical())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn count_active_with_role(&self, role: UserRole) -> AuthResult<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users WHERE is_active AND user_role = $1",
        )
        .bind(role.ordinal())
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }

    async fn set_refresh_family(
        &self,
        user_id: &UserId,
        family: &RefreshFamily,
    ) -> AuthResult<()> {
        let result = sqlx::query(
            "UPDATE users SET refresh_token_family = $2, updated_at = now() WHERE user_id = $1",
        )
        .bind(user_id.as_uuid())
        .bind(family.as_str())
        .execute(&self.pool)
        .await?;

        expect_row(result)
    }

    async fn compare_and_swap_refresh_family(
        &self,
        user_id: &UserId,
        expected: &RefreshFamily,
        new: &RefreshFamily,
    ) -> AuthResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET refresh_token_family = $3, updated_at = now()
            WHERE user_id = $1 AND refresh_token_family = $2
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(expected.as_str())
        .bind(new.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn compare_and_swap_two_factor(
        &self,
        user_id: &UserId,
        expected: &TwoFactorState,
        new: &TwoFactorState,
    ) -> AuthResult<bool> {
        // The sealed secret is unique per setup, so flag + secret + codes
        // identify a state without comparing timestamps
        let result = sqlx::query(
            r#"
            UPDATE users SET
                two_factor_enabled = $5,
                two_factor_secret = $6,
                two_factor_backup_codes = $7,
                two_factor_verified_at = $8,
                updated_at = now()
            WHERE user_id = $1
              AND two_factor_enabled = $2
              AND two_factor_secret IS NOT DISTINCT FROM $3
              AND two_factor_backup_codes = $4
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(expected.enabled)
        .bind(expected.encrypted_secret.as_deref())
        .bind(&expected.backup_codes)
        .bind(new.enabled)
        .bind(new.encrypted_secret.as_deref())
        .bind(&new.backup_codes)
        .bind(new.verified_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn remove_backup_code(
        &self,
        user_id: &UserId,
        code_hash: &str,
    ) -> AuthResult<Option<usize>> {
        let remaining = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE users SET
                two_factor_backup_codes = array_remove(two_factor_backup_codes, $2),
                updated_at = now()
            WHERE user_id = $1 AND $2 = ANY(two_factor_backup_codes)
            RETURNING cardinality(two_factor_backup_codes)
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(code_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(remaining.map(|n| n.max(0) as usize))
    }

    async fn update_password(
        &self,
        user_id: &UserId,
        password_hash: &UserPassword,
        family: &RefreshFamily,
    ) -> AuthResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                password_hash = $2,
                refresh_token_family = $3,
                updated_at = now()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(password_hash.as_phc_string())
        .bind(family.as_str())
        .execute(&self.pool)
        .await?;

        expect_row(result)
    }

    async fn update_profile(&self, user_id: &UserId, patch: &ProfilePatch) -> AuthResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                email = COALESCE($2, email),
                user_name = COALESCE($3, user_name),
                user_name_canonical = COALESCE($4, user_name_canonical),
                updated_at = now()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(patch.email.as_ref().map(Email::as_str))
        .bind(patch.user_name.as_ref().map(UserName::original))
        .bind(patch.user_name.as_ref().map(UserName::canonical))
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        expect_row(result)
    }

    async fn update_role(&self, user_id: &UserId, role: UserRole) -> AuthResult<()> {
        let result =
            sqlx::query("UPDATE users SET user_role = $2, updated_at = now() WHERE user_id = $1")
                .bind(user_id.as_uuid())
                .bind(role.ordinal())
                .execute(&self.pool)
                .await?;

        expect_row(result)
    }

    async fn update_status(
        &self,
        user_id: &UserId,
        is_active: bool,
        family: Option<&RefreshFamily>,
    ) -> AuthResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                is_active = $2,
                refresh_token_family = COALESCE($3, refresh_token_family),
                updated_at = now()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(is_active)
        .bind(family.map(RefreshFamily::as_str))
        .execute(&self.pool)
        .await?;

        expect_row(result)
    }

    async fn update_permissions(
        &self,
        user_id: &UserId,
        extra: &BTreeSet<String>,
        denied: &BTreeSet<String>,
    ) -> AuthResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                extra_permissions = $2,
                denied_permissions = $3,
                updated_at = now()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(tags(extra))
        .bind(tags(denied))
        .execute(&self.pool)
        .await?;

        expect_row(result)
    }

    async fn record_login(&self, user_id: &UserId, at: DateTime<Utc>) -> AuthResult<()> {
        let result = sqlx::query(
            "UPDATE users SET last_login_at = $2, updated_at = $2 WHERE user_id = $1",
        )
        .bind(user_id.as_uuid())
        .bind(at)
        .execute(&self.pool)
        .await?;

        expect_row(result)
    }

    async fn delete(&self, user_id: &UserId) -> AuthResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}

// ============================================================================
// Row Types
// ============================================================================

#[derive(sqlx::FromRow)]
struct UserRow {
    user_id: Uuid,
    email: String,
    user_name: String,
    password_hash: String,
    user_role: i16,
    extra_permissions: Vec<String>,
    denied_permissions: Vec<String>,
    is_active: bool,
    refresh_token_family: String,
    two_factor_enabled: bool,
    two_factor_secret: Option<String>,
    two_factor_backup_codes: Vec<String>,
    two_factor_verified_at: Option<DateTime<Utc>>,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self) -> AuthResult<User> {
        let user_role = UserRole::from_ordinal(self.user_role).ok_or_else(|| {
            AuthError::Internal(format!("Invalid user_role: {}", self.user_role))
        })?;
        let password_hash = UserPassword::from_phc_string(self.password_hash)
            .map_err(|e| AuthError::Internal(format!("Invalid password_hash: {e}")))?;

        Ok(User {
            user_id: UserId::from_uuid(self.user_id),
            email: Email::from_db(self.email),
            user_name: UserName::from_db(self.user_name),
            password_hash,
            user_role,
            extra_permissions: self.extra_permissions.into_iter().collect(),
            denied_permissions: self.denied_permissions.into_iter().collect(),
            is_active: self.is_active,
            refresh_token_family: RefreshFamily::from_db(self.refresh_token_family),
            two_factor: TwoFactorState {
                enabled: self.two_factor_enabled,
                encrypted_secret: self.two_factor_secret,
                backup_codes: self.two_factor_backup_codes,
                verified_at: self.two_factor_verified_at,
            },
            last_login_at: self.last_login_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
