//! Token Service
//!
//! HS256 access/refresh pairs. Access tokens are stateless. Refresh tokens
//! are only valid while their `family` claim equals the family stored on the
//! user; every successful refresh moves the stored family forward, and any
//! mismatch (replay of a rotated token, or a lost rotation race) revokes the
//! whole lineage.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::audit::{AuditEvent, AuditLog, AuditSink};
use crate::application::config::AuthConfig;
use crate::domain::entity::user::User;
use crate::domain::repository::UserRepository;
use crate::domain::value_object::{
    refresh_family::RefreshFamily, user_id::UserId, user_role::UserRole,
};
use crate::error::{AuthError, AuthResult};

pub const ACCESS_TOKEN_TYPE: &str = "access";
pub const REFRESH_TOKEN_TYPE: &str = "refresh";

// ============================================================================
// Claims
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccessTokenClaims {
    sub: String,
    role: String,
    #[serde(rename = "type")]
    token_type: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RefreshTokenClaims {
    sub: String,
    family: String,
    #[serde(rename = "type")]
    token_type: String,
    iat: i64,
    exp: i64,
    jti: String,
}

/// What a verified access token says about its bearer
///
/// `role` is a snapshot from issue time; authorization reloads the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessClaims {
    pub user_id: UserId,
    pub role: UserRole,
    pub issued_at: i64,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

// ============================================================================
// Service
// ============================================================================

pub struct TokenService<U, S>
where
    U: UserRepository,
    S: AuditSink + Send + Sync + 'static,
{
    user_repo: Arc<U>,
    config: Arc<AuthConfig>,
    audit: AuditLog<S>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl<U, S> TokenService<U, S>
where
    U: UserRepository,
    S: AuditSink + Send + Sync + 'static,
{
    pub fn new(user_repo: Arc<U>, config: Arc<AuthConfig>, audit: AuditLog<S>) -> Self {
        let encoding_key = EncodingKey::from_secret(&config.jwt_secret);
        let decoding_key = DecodingKey::from_secret(&config.jwt_secret);
        Self {
            user_repo,
            config,
            audit,
            encoding_key,
            decoding_key,
        }
    }

    /// Start a new lineage for `user` (login)
    pub async fn issue_pair(&self, user: &User) -> AuthResult<TokenPair> {
        let family = RefreshFamily::generate();
        self.user_repo
            .set_refresh_family(&user.user_id, &family)
            .await?;
        self.mint_pair(&user.user_id, user.user_role, &family)
    }

    pub fn verify_access(&self, token: &str) -> AuthResult<AccessClaims> {
        let claims: AccessTokenClaims = self.decode_claims(token)?;
        if claims.token_type != ACCESS_TOKEN_TYPE {
            return Err(AuthError::TokenInvalidOrExpired);
        }

        let user_id = claims
            .sub
            .parse::<UserId>()
            .map_err(|_| AuthError::TokenInvalidOrExpired)?;
        let role = UserRole::from_code(&claims.role).ok_or(AuthError::TokenInvalidOrExpired)?;

        Ok(AccessClaims {
            user_id,
            role,
            issued_at: claims.iat,
            expires_at: claims.exp,
        })
    }

    /// Rotate: exchange a refresh token for a new pair on a new family
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        let claims: RefreshTokenClaims = self.decode_claims(refresh_token)?;
        if claims.token_type != REFRESH_TOKEN_TYPE {
            return Err(AuthError::TokenInvalidOrExpired);
        }
        let user_id = claims
            .sub
            .parse::<UserId>()
            .map_err(|_| AuthError::TokenInvalidOrExpired)?;

        let user = self
            .user_repo
            .find_by_id(&user_id)
            .await?
            .ok_or(AuthError::TokenInvalidOrExpired)?;

        if !user.can_login() {
            return Err(AuthError::AccountDisabled);
        }

        if !user.refresh_token_family.matches(&claims.family) {
            return Err(self.revoke_after_reuse(&user_id).await);
        }

        let next = RefreshFamily::generate();
        let rotated = self
            .user_repo
            .compare_and_swap_refresh_family(&user_id, &user.refresh_token_family, &next)
            .await?;

        // Someone rotated this family between our read and write
        if !rotated {
            return Err(self.revoke_after_reuse(&user_id).await);
        }

        tracing::info!(user_id = %user_id, "Refresh token rotated");
        self.mint_pair(&user_id, user.user_role, &next)
    }

    /// Kill every outstanding refresh token of the user
    pub async fn revoke(&self, user_id: &UserId) -> AuthResult<()> {
        self.user_repo
            .set_refresh_family(user_id, &RefreshFamily::generate())
            .await
    }

    /// Reuse branch: revoke, audit, and produce the error to return
    async fn revoke_after_reuse(&self, user_id: &UserId) -> AuthError {
        tracing::warn!(user_id = %user_id, "Refresh token reuse detected, revoking sessions");
        self.audit.record(AuditEvent::TokenReuseDetected { user_id: *user_id });

        match self.revoke(user_id).await {
            Ok(()) => AuthError::TokenRevoked,
            Err(e) => e,
        }
    }

    fn mint_pair(
        &self,
        user_id: &UserId,
        role: UserRole,
        family: &RefreshFamily,
    ) -> AuthResult<TokenPair> {
        let now = Utc::now().timestamp();
        let access_exp = expires_at(now, self.config.access_token_ttl);
        let refresh_exp = expires_at(now, self.config.refresh_token_ttl);

        let access = AccessTokenClaims {
            sub: user_id.to_string(),
            role: role.code().to_string(),
            token_type: ACCESS_TOKEN_TYPE.to_string(),
            iat: now,
            exp: access_exp,
        };
        let refresh = RefreshTokenClaims {
            sub: user_id.to_string(),
            family: family.as_str().to_string(),
            token_type: REFRESH_TOKEN_TYPE.to_string(),
            iat: now,
            exp: refresh_exp,
            jti: Uuid::new_v4().to_string(),
        };

        Ok(TokenPair {
            access_token: self.encode_claims(&access)?,
            refresh_token: self.encode_claims(&refresh)?,
            token_type: "Bearer",
            expires_in: self.config.access_token_ttl.as_secs(),
        })
    }

    fn encode_claims<T: Serialize>(&self, claims: &T) -> AuthResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Token encoding failed: {e}")))
    }

    fn decode_claims<T: for<'de> Deserialize<'de>>(&self, token: &str) -> AuthResult<T> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        decode::<T>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Token rejected");
                AuthError::TokenInvalidOrExpired
            })
    }
}

/// `now + ttl` in Unix seconds, clamped instead of overflowing
fn expires_at(now: i64, ttl: Duration) -> i64 {
    now.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::audit::NoopAuditSink;
    use crate::domain::value_object::{
        email::Email, user_name::UserName, user_password::RawPassword,
        user_password::UserPassword,
    };
    use crate::infra::memory::InMemoryUserRepository;

    async fn setup() -> (TokenService<InMemoryUserRepository, NoopAuditSink>, Arc<InMemoryUserRepository>, User) {
        let repo = Arc::new(InMemoryUserRepository::new());
        let user = User::new(
            Email::new("t@x.com").unwrap(),
            UserName::new("tester").unwrap(),
            UserPassword::from_raw(&RawPassword::unchecked("password123"), None).unwrap(),
        );
        repo.create(&user).await.unwrap();

        let service = TokenService::new(
            repo.clone(),
            Arc::new(AuthConfig::development()),
            AuditLog::new(Arc::new(NoopAuditSink)),
        );
        (service, repo, user)
    }

    #[tokio::test]
    async fn test_access_token_roundtrip() {
        let (service, _, user) = setup().await;
        let pair = service.issue_pair(&user).await.unwrap();

        let claims = service.verify_access(&pair.access_token).unwrap();
        assert_eq!(claims.user_id, user.user_id);
        assert_eq!(claims.role, UserRole::Viewer);
        assert_eq!(claims.expires_at - claims.issued_at, 15 * 60);
        assert_eq!(pair.expires_in, 900);
    }

    #[test]
    fn test_expiry_clamps_huge_ttl() {
        assert_eq!(expires_at(1_000, Duration::from_secs(60)), 1_060);
        assert_eq!(expires_at(1_000, Duration::from_secs(u64::MAX)), i64::MAX);
        assert_eq!(expires_at(1_000, Duration::from_secs(i64::MAX as u64)), i64::MAX);
    }

    #[tokio::test]
    async fn test_refresh_token_is_not_an_access_token() {
        let (service, _, user) = setup().await;
        let pair = service.issue_pair(&user).await.unwrap();

        assert!(matches!(
            service.verify_access(&pair.refresh_token),
            Err(AuthError::TokenInvalidOrExpired)
        ));
        assert!(matches!(
            service.refresh(&pair.access_token).await,
            Err(AuthError::TokenInvalidOrExpired)
        ));
    }

    #[tokio::test]
    async fn test_expired_and_tampered_tokens_rejected() {
        let (service, _, user) = setup().await;
        let now = Utc::now().timestamp();
        let expired = service
            .encode_claims(&AccessTokenClaims {
                sub: user.user_id.to_string(),
                role: "viewer".into(),
                token_type: ACCESS_TOKEN_TYPE.into(),
                iat: now - 120,
                exp: now - 60,
            })
            .unwrap();
        assert!(matches!(
            service.verify_access(&expired),
            Err(AuthError::TokenInvalidOrExpired)
        ));

        let pair = service.issue_pair(&user).await.unwrap();
        let mut tampered = pair.access_token.clone();
        tampered.push('x');
        assert!(service.verify_access(&tampered).is_err());
        assert!(service.verify_access("not.a.jwt").is_err());
    }

    #[tokio::test]
    async fn test_other_secret_rejected() {
        let (service, repo, user) = setup().await;
        let other = TokenService::new(
            repo,
            Arc::new(AuthConfig::development()),
            AuditLog::new(Arc::new(NoopAuditSink)),
        );
        let pair = other.issue_pair(&user).await.unwrap();
        assert!(service.verify_access(&pair.access_token).is_err());
    }

    #[tokio::test]
    async fn test_unknown_role_in_token_rejected() {
        let (service, _, user) = setup().await;
        let now = Utc::now().timestamp();
        let token = service
            .encode_claims(&AccessTokenClaims {
                sub: user.user_id.to_string(),
                role: "root".into(),
                token_type: ACCESS_TOKEN_TYPE.into(),
                iat: now,
                exp: now + 60,
            })
            .unwrap();
        assert!(matches!(
            service.verify_access(&token),
            Err(AuthError::TokenInvalidOrExpired)
        ));
    }

    #[tokio::test]
    async fn test_refresh_rotates_family() {
        let (service, repo, user) = setup().await;
        let pair = service.issue_pair(&user).await.unwrap();
        let before = repo.find_by_id(&user.user_id).await.unwrap().unwrap();

        let next = service.refresh(&pair.refresh_token).await.unwrap();
        let after = repo.find_by_id(&user.user_id).await.unwrap().unwrap();

        assert_ne!(before.refresh_token_family, after.refresh_token_family);
        assert_ne!(next.refresh_token, pair.refresh_token);
        assert!(service.verify_access(&next.access_token).is_ok());
    }

    #[tokio::test]
    async fn test_refresh_for_missing_or_inactive_user() {
        let (service, repo, user) = setup().await;
        let pair = service.issue_pair(&user).await.unwrap();

        repo.update_status(&user.user_id, false, None).await.unwrap();
        assert!(matches!(
            service.refresh(&pair.refresh_token).await,
            Err(AuthError::AccountDisabled)
        ));

        repo.delete(&user.user_id).await.unwrap();
        assert!(matches!(
            service.refresh(&pair.refresh_token).await,
            Err(AuthError::TokenInvalidOrExpired)
        ));
    }

    #[tokio::test]
    async fn test_revoke_kills_outstanding_refresh_tokens() {
        let (service, _, user) = setup().await;
        let pair = service.issue_pair(&user).await.unwrap();

        service.revoke(&user.user_id).await.unwrap();
        assert!(matches!(
            service.refresh(&pair.refresh_token).await,
            Err(AuthError::TokenRevoked)
        ));
    }
}
