//! HTTP Handlers

use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use std::sync::Arc;

use crate::application::audit::{AuditLog, AuditSink};
use crate::application::config::AuthConfig;
use crate::application::{
    AccountUseCase, AuthGate, SignInInput, SignInUseCase, SignOutUseCase, SignUpInput,
    SignUpUseCase, TokenPair, TokenService, TwoFactorService, UserAdminUseCase,
};
use crate::domain::entity::user::User;
use crate::domain::repository::UserRepository;
use crate::domain::service::{CredentialHasher, PermissionResolver, RolePermissionTable};
use crate::domain::value_object::user_id::UserId;
use crate::error::{AuthError, AuthResult};
use crate::presentation::dto::{
    BackupCodesResponse, ChangePasswordRequest, LoginRequest, LoginResponse, RefreshRequest,
    RegisterRequest, TwoFactorCodeRequest, TwoFactorDisableRequest, TwoFactorSetupResponse,
    UpdatePermissionsRequest, UpdateProfileRequest, UpdateRoleRequest, UpdateStatusRequest,
    UserResponse,
};
use crate::presentation::middleware::CurrentUser;

/// Shared state for auth handlers: every service built once over one store
pub struct AuthAppState<R, S>
where
    R: UserRepository + Send + Sync + 'static,
    S: AuditSink + Send + Sync + 'static,
{
    pub config: Arc<AuthConfig>,
    pub gate: Arc<AuthGate<R, S>>,
    pub tokens: Arc<TokenService<R, S>>,
    pub two_factor: Arc<TwoFactorService<R, S>>,
    pub sign_up: Arc<SignUpUseCase<R, S>>,
    pub sign_in: Arc<SignInUseCase<R, S>>,
    pub sign_out: Arc<SignOutUseCase<R, S>>,
    pub account: Arc<AccountUseCase<R, S>>,
    pub admin: Arc<UserAdminUseCase<R, S>>,
}

impl<R, S> AuthAppState<R, S>
where
    R: UserRepository + Send + Sync + 'static,
    S: AuditSink + Send + Sync + 'static,
{
    pub fn new(repo: Arc<R>, config: AuthConfig, sink: Arc<S>) -> Self {
        Self::with_role_table(repo, config, sink, RolePermissionTable::standard())
    }

    pub fn with_role_table(
        repo: Arc<R>,
        config: AuthConfig,
        sink: Arc<S>,
        table: RolePermissionTable,
    ) -> Self {
        let config = Arc::new(config);
        let audit = AuditLog::new(sink);
        let hasher = CredentialHasher::new(config.password_pepper.clone());
        let resolver = Arc::new(PermissionResolver::new(table));

        let tokens = Arc::new(TokenService::new(
            repo.clone(),
            config.clone(),
            audit.clone(),
        ));
        let two_factor = Arc::new(TwoFactorService::new(
            repo.clone(),
            config.clone(),
            hasher.clone(),
            audit.clone(),
        ));
        let gate = Arc::new(AuthGate::new(repo.clone(), tokens.clone(), resolver.clone()));

        Self {
            sign_up: Arc::new(SignUpUseCase::new(repo.clone(), hasher.clone(), audit.clone())),
            sign_in: Arc::new(SignInUseCase::new(
                repo.clone(),
                tokens.clone(),
                two_factor.clone(),
                hasher.clone(),
                audit.clone(),
            )),
            sign_out: Arc::new(SignOutUseCase::new(gate.clone(), tokens.clone(), audit.clone())),
            account: Arc::new(AccountUseCase::new(repo.clone(), hasher, audit.clone())),
            admin: Arc::new(UserAdminUseCase::new(repo, resolver, audit)),
            config,
            gate,
            tokens,
            two_factor,
        }
    }

    fn user_response(&self, user: &User) -> UserResponse {
        UserResponse::from_user(user, self.gate.resolver())
    }
}

impl<R, S> Clone for AuthAppState<R, S>
where
    R: UserRepository + Send + Sync + 'static,
    S: AuditSink + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            gate: self.gate.clone(),
            tokens: self.tokens.clone(),
            two_factor: self.two_factor.clone(),
            sign_up: self.sign_up.clone(),
            sign_in: self.sign_in.clone(),
            sign_out: self.sign_out.clone(),
            account: self.account.clone(),
            admin: self.admin.clone(),
        }
    }
}

fn parse_user_id(raw: &str) -> AuthResult<UserId> {
    UserId::parse_str(raw).ok_or_else(|| AuthError::Validation("Invalid user id".into()))
}

// ============================================================================
// Registration / Sign In
// ============================================================================

/// POST /register
pub async fn register<R, S>(
    State(state): State<AuthAppState<R, S>>,
    Json(req): Json<RegisterRequest>,
) -> AuthResult<impl IntoResponse>
where
    R: UserRepository + Send + Sync + 'static,
    S: AuditSink + Send + Sync + 'static,
{
    let input = SignUpInput {
        email: req.email,
        user_name: req.user_name,
        password: req.password,
    };

    let user = state.sign_up.execute(input).await?;

    Ok((StatusCode::CREATED, Json(state.user_response(&user))))
}

/// POST /login
pub async fn login<R, S>(
    State(state): State<AuthAppState<R, S>>,
    Json(req): Json<LoginRequest>,
) -> AuthResult<Json<LoginResponse>>
where
    R: UserRepository + Send + Sync + 'static,
    S: AuditSink + Send + Sync + 'static,
{
    let input = SignInInput {
        identifier: req.identifier,
        password: req.password,
        totp_code: req.totp_code,
    };

    let output = state.sign_in.execute(input).await?;
    let user = state.user_response(&output.user);

    Ok(Json(LoginResponse::new(output.tokens, user, output.second_factor)))
}

/// POST /refresh
pub async fn refresh<R, S>(
    State(state): State<AuthAppState<R, S>>,
    Json(req): Json<RefreshRequest>,
) -> AuthResult<Json<TokenPair>>
where
    R: UserRepository + Send + Sync + 'static,
    S: AuditSink + Send + Sync + 'static,
{
    let pair = state.tokens.refresh(&req.refresh_token).await?;
    Ok(Json(pair))
}

/// POST /logout
pub async fn logout<R, S>(
    State(state): State<AuthAppState<R, S>>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> AuthResult<StatusCode>
where
    R: UserRepository + Send + Sync + 'static,
    S: AuditSink + Send + Sync + 'static,
{
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(AuthError::AuthenticationRequired)?;
    state.sign_out.execute(bearer.token()).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Current User
// ============================================================================

/// GET /me
pub async fn me<R, S>(
    State(state): State<AuthAppState<R, S>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Json<UserResponse>
where
    R: UserRepository + Send + Sync + 'static,
    S: AuditSink + Send + Sync + 'static,
{
    Json(state.user_response(&user))
}

/// PATCH /me
pub async fn update_me<R, S>(
    State(state): State<AuthAppState<R, S>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> AuthResult<Json<UserResponse>>
where
    R: UserRepository + Send + Sync + 'static,
    S: AuditSink + Send + Sync + 'static,
{
    let patch = req.into_patch()?;
    let user = state.account.update_profile(&user.user_id, patch).await?;
    Ok(Json(state.user_response(&user)))
}

/// POST /me/password
pub async fn change_password<R, S>(
    State(state): State<AuthAppState<R, S>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<ChangePasswordRequest>,
) -> AuthResult<StatusCode>
where
    R: UserRepository + Send + Sync + 'static,
    S: AuditSink + Send + Sync + 'static,
{
    state
        .account
        .change_password(&user.user_id, &req.current_password, req.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Two-Factor
// ============================================================================

/// POST /2fa/setup
pub async fn two_factor_setup<R, S>(
    State(state): State<AuthAppState<R, S>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> AuthResult<Json<TwoFactorSetupResponse>>
where
    R: UserRepository + Send + Sync + 'static,
    S: AuditSink + Send + Sync + 'static,
{
    let output = state.two_factor.setup(&user.user_id).await?;
    Ok(Json(output.into()))
}

/// POST /2fa/verify
pub async fn two_factor_verify<R, S>(
    State(state): State<AuthAppState<R, S>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<TwoFactorCodeRequest>,
) -> AuthResult<StatusCode>
where
    R: UserRepository + Send + Sync + 'static,
    S: AuditSink + Send + Sync + 'static,
{
    state.two_factor.verify(&user.user_id, &req.code).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /2fa/disable
pub async fn two_factor_disable<R, S>(
    State(state): State<AuthAppState<R, S>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<TwoFactorDisableRequest>,
) -> AuthResult<StatusCode>
where
    R: UserRepository + Send + Sync + 'static,
    S: AuditSink + Send + Sync + 'static,
{
    state
        .two_factor
        .disable(&user.user_id, &req.password, &req.code)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /2fa/backup-codes
pub async fn regenerate_backup_codes<R, S>(
    State(state): State<AuthAppState<R, S>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<TwoFactorCodeRequest>,
) -> AuthResult<Json<BackupCodesResponse>>
where
    R: UserRepository + Send + Sync + 'static,
    S: AuditSink + Send + Sync + 'static,
{
    let backup_codes = state
        .two_factor
        .regenerate_backup_codes(&user.user_id, &req.code)
        .await?;
    Ok(Json(BackupCodesResponse { backup_codes }))
}

// ============================================================================
// Administration
// ============================================================================

/// PATCH /users/{id}/role
pub async fn update_user_role<R, S>(
    State(state): State<AuthAppState<R, S>>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(req): Json<UpdateRoleRequest>,
) -> AuthResult<Json<UserResponse>>
where
    R: UserRepository + Send + Sync + 'static,
    S: AuditSink + Send + Sync + 'static,
{
    let target = parse_user_id(&id)?;
    let role = req.role()?;
    let user = state.admin.update_user_role(&actor, &target, role).await?;
    Ok(Json(state.user_response(&user)))
}

/// PATCH /users/{id}/status
pub async fn update_user_status<R, S>(
    State(state): State<AuthAppState<R, S>>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> AuthResult<Json<UserResponse>>
where
    R: UserRepository + Send + Sync + 'static,
    S: AuditSink + Send + Sync + 'static,
{
    let target = parse_user_id(&id)?;
    let user = state
        .admin
        .update_user_status(&actor, &target, req.is_active)
        .await?;
    Ok(Json(state.user_response(&user)))
}

/// PATCH /users/{id}/permissions
pub async fn update_user_permissions<R, S>(
    State(state): State<AuthAppState<R, S>>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(req): Json<UpdatePermissionsRequest>,
) -> AuthResult<Json<UserResponse>>
where
    R: UserRepository + Send + Sync + 'static,
    S: AuditSink + Send + Sync + 'static,
{
    let target = parse_user_id(&id)?;
    let user = state
        .admin
        .update_user_permissions(&actor, &target, req.extra_permissions, req.denied_permissions)
        .await?;
    Ok(Json(state.user_response(&user)))
}

/// DELETE /users/{id}
pub async fn delete_user<R, S>(
    State(state): State<AuthAppState<R, S>>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> AuthResult<StatusCode>
where
    R: UserRepository + Send + Sync + 'static,
    S: AuditSink + Send + Sync + 'static,
{
    let target = parse_user_id(&id)?;
    state.admin.delete_user(&actor, &target).await?;
    Ok(StatusCode::NO_CONTENT)
}
