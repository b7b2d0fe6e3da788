//! Auth Error Types
//!
//! Every expected outcome of the auth core is a variant here. Conversion to
//! `kernel::error::AppError` happens at the HTTP edge; store and internal
//! failures are logged in full and rendered as a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use platform::crypto::CipherError;
use thiserror::Error;

use crate::domain::value_object::user_name::UserNameError;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown identifier or wrong password; deliberately indistinguishable
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is disabled")]
    AccountDisabled,

    /// Password was right, a second factor is needed
    #[error("Two-factor authentication required")]
    TwoFactorRequired,

    #[error("Invalid two-factor authentication code")]
    InvalidTwoFactorCode,

    #[error("Two-factor authentication has not been set up")]
    TwoFactorNotSetup,

    #[error("Two-factor authentication is not enabled")]
    TwoFactorNotEnabled,

    #[error("Two-factor authentication is already enabled")]
    TwoFactorAlreadyEnabled,

    #[error("Token is invalid or expired")]
    TokenInvalidOrExpired,

    /// Refresh token reuse detected; every session of the user is dead
    #[error("Session has been revoked")]
    TokenRevoked,

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Missing required permission: {required}")]
    PermissionDenied { required: String },

    #[error("{field} is already taken")]
    DuplicateIdentity { field: &'static str },

    /// A business rule would be broken (last superadmin, self-deactivation, ...)
    #[error("{0}")]
    InvariantViolation(String),

    #[error("User not found")]
    UserNotFound,

    #[error("{0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn permission_denied(required: impl Into<String>) -> Self {
        AuthError::PermissionDenied {
            required: required.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.kind().status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn kind(&self) -> ErrorKind {
        use AuthError::*;
        match self {
            InvalidCredentials
            | TwoFactorRequired
            | InvalidTwoFactorCode
            | TokenInvalidOrExpired
            | TokenRevoked
            | AuthenticationRequired => ErrorKind::Unauthorized,
            AccountDisabled | PermissionDenied { .. } => ErrorKind::Forbidden,
            TwoFactorNotSetup | TwoFactorNotEnabled => ErrorKind::UnprocessableEntity,
            TwoFactorAlreadyEnabled | DuplicateIdentity { .. } | InvariantViolation(_) => {
                ErrorKind::Conflict
            }
            UserNotFound => ErrorKind::NotFound,
            Validation(_) => ErrorKind::BadRequest,
            Config(_) | Database(_) | Internal(_) => ErrorKind::InternalServerError,
        }
    }

    /// Machine readable code for clients
    pub fn code(&self) -> &'static str {
        use AuthError::*;
        match self {
            InvalidCredentials => "INVALID_CREDENTIALS",
            AccountDisabled => "ACCOUNT_DISABLED",
            TwoFactorRequired => "TWO_FACTOR_REQUIRED",
            InvalidTwoFactorCode => "INVALID_TWO_FACTOR_CODE",
            TwoFactorNotSetup => "TWO_FACTOR_NOT_SETUP",
            TwoFactorNotEnabled => "TWO_FACTOR_NOT_ENABLED",
            TwoFactorAlreadyEnabled => "TWO_FACTOR_ALREADY_ENABLED",
            TokenInvalidOrExpired => "TOKEN_INVALID_OR_EXPIRED",
            TokenRevoked => "TOKEN_REVOKED",
            AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            PermissionDenied { .. } => "PERMISSION_DENIED",
            DuplicateIdentity { .. } => "DUPLICATE_IDENTITY",
            InvariantViolation(_) => "INVARIANT_VIOLATION",
            UserNotFound => "USER_NOT_FOUND",
            Validation(_) => "VALIDATION_FAILED",
            Config(_) | Database(_) | Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn to_app_error(&self) -> AppError {
        use AuthError::*;
        let err = match self {
            Config(_) | Database(_) | Internal(_) => {
                AppError::new(self.kind(), "Internal server error")
            }
            _ => AppError::new(self.kind(), self.to_string()),
        }
        .with_code(self.code());

        match self {
            TokenRevoked | TokenInvalidOrExpired => err.with_action("Please sign in again"),
            TwoFactorRequired => err.with_action("Enter the code from your authenticator app"),
            _ => err,
        }
    }

    fn log(&self) {
        match self {
            AuthError::Database(e) => {
                tracing::error!(error = %e, "Auth database error");
            }
            AuthError::Internal(msg) | AuthError::Config(msg) => {
                tracing::error!(detail = %msg, "Auth internal error");
            }
            AuthError::InvalidCredentials | AuthError::InvalidTwoFactorCode => {
                tracing::warn!(code = self.code(), "Rejected authentication attempt");
            }
            AuthError::TokenRevoked => {
                tracing::warn!("Revoked session presented");
            }
            _ => {
                tracing::debug!(error = %self, "Auth error");
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        self.log();
        self.to_app_error().into_response()
    }
}

/// Value-object validation errors arrive as `AppError`s
impl From<AppError> for AuthError {
    fn from(err: AppError) -> Self {
        match err.kind() {
            ErrorKind::BadRequest | ErrorKind::UnprocessableEntity => {
                AuthError::Validation(err.message().to_string())
            }
            _ => AuthError::Internal(err.to_string()),
        }
    }
}

impl From<UserNameError> for AuthError {
    fn from(err: UserNameError) -> Self {
        AuthError::Validation(err.to_string())
    }
}

impl From<CipherError> for AuthError {
    fn from(err: CipherError) -> Self {
        AuthError::Internal(format!("two-factor secret: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AuthError::InvalidCredentials.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::TokenRevoked.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::AccountDisabled.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            AuthError::permission_denied("manage:users").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthError::DuplicateIdentity { field: "email" }.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(AuthError::UserNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AuthError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_two_factor_required_distinct_from_bad_credentials() {
        let required = AuthError::TwoFactorRequired.to_app_error();
        let invalid = AuthError::InvalidCredentials.to_app_error();
        assert_eq!(required.status_code(), invalid.status_code());
        assert_ne!(required.code(), invalid.code());
        assert_eq!(required.code(), Some("TWO_FACTOR_REQUIRED"));
    }

    #[test]
    fn test_internal_detail_not_exposed() {
        let app = AuthError::Internal("pool exhausted at 10.0.0.3".into()).to_app_error();
        assert_eq!(app.message(), "Internal server error");
        assert!(app.is_server_error());
    }

    #[test]
    fn test_permission_denied_names_requirement() {
        let app = AuthError::permission_denied("delete:books").to_app_error();
        assert!(app.message().contains("delete:books"));
    }

    #[test]
    fn test_from_app_error() {
        let err: AuthError = AppError::bad_request("Invalid email format").into();
        assert!(matches!(err, AuthError::Validation(m) if m == "Invalid email format"));
    }
}
