//! API DTOs (Data Transfer Objects)

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::token_service::TokenPair;
use crate::application::two_factor::{SecondFactor, TwoFactorSetupOutput};
use crate::domain::entity::user::{ProfilePatch, User};
use crate::domain::service::PermissionResolver;
use crate::domain::value_object::{email::Email, user_name::UserName, user_role::UserRole};
use crate::error::{AuthError, AuthResult};

// ============================================================================
// Registration / Sign In
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub user_name: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Email, or user name
    #[serde(alias = "email")]
    pub identifier: String,
    pub password: String,
    /// TOTP or backup code if 2FA is enabled
    pub totp_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: UserResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub second_factor: Option<&'static str>,
    /// Set when a backup code was spent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_codes_remaining: Option<usize>,
}

impl LoginResponse {
    pub fn new(
        tokens: TokenPair,
        user: UserResponse,
        second_factor: Option<SecondFactor>,
    ) -> Self {
        let backup_codes_remaining = match second_factor {
            Some(SecondFactor::BackupCode { remaining }) => Some(remaining),
            _ => None,
        };
        Self {
            tokens,
            user,
            second_factor: second_factor.as_ref().map(SecondFactor::label),
            backup_codes_remaining,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

// ============================================================================
// Current User
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub user_id: String,
    pub email: String,
    pub user_name: String,
    pub role: UserRole,
    /// Effective permissions after overrides
    pub permissions: Vec<&'static str>,
    pub is_active: bool,
    pub two_factor_enabled: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserResponse {
    pub fn from_user(user: &User, resolver: &PermissionResolver) -> Self {
        Self {
            user_id: user.user_id.to_string(),
            email: user.email.as_str().to_string(),
            user_name: user.user_name.original().to_string(),
            role: user.user_role,
            permissions: resolver
                .effective_permissions(user)
                .iter()
                .map(|p| p.tag())
                .collect(),
            is_active: user.is_active,
            two_factor_enabled: user.two_factor.enabled,
            last_login_at: user.last_login_at,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub email: Option<String>,
    pub user_name: Option<String>,
}

impl UpdateProfileRequest {
    pub fn into_patch(self) -> AuthResult<ProfilePatch> {
        Ok(ProfilePatch {
            email: self.email.map(Email::new).transpose()?,
            user_name: self.user_name.map(UserName::new).transpose()?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

// ============================================================================
// Two-Factor
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorSetupResponse {
    /// Base32 secret for manual entry
    pub secret: String,
    /// otpauth:// URL
    pub otpauth_url: String,
    /// QR code as base64-encoded PNG
    pub qr_code: String,
    /// Shown once
    pub backup_codes: Vec<String>,
}

impl From<TwoFactorSetupOutput> for TwoFactorSetupResponse {
    fn from(output: TwoFactorSetupOutput) -> Self {
        Self {
            secret: output.secret,
            otpauth_url: output.otpauth_url,
            qr_code: output.qr_code_base64,
            backup_codes: output.backup_codes,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorCodeRequest {
    pub code: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorDisableRequest {
    pub password: String,
    /// TOTP or backup code
    pub code: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupCodesResponse {
    pub backup_codes: Vec<String>,
}

// ============================================================================
// Administration
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoleRequest {
    pub role: String,
}

impl UpdateRoleRequest {
    pub fn role(&self) -> AuthResult<UserRole> {
        UserRole::from_code(self.role.trim())
            .ok_or_else(|| AuthError::Validation(format!("Unknown role: {}", self.role)))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePermissionsRequest {
    #[serde(default)]
    pub extra_permissions: BTreeSet<String>,
    #[serde(default)]
    pub denied_permissions: BTreeSet<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_request_accepts_email_alias() {
        let req: LoginRequest =
            serde_json::from_str(r#"{"email":"a@x.com","password":"pw"}"#).unwrap();
        assert_eq!(req.identifier, "a@x.com");
        assert!(req.totp_code.is_none());

        let req: LoginRequest = serde_json::from_str(
            r#"{"identifier":"alice","password":"pw","totpCode":"123456"}"#,
        )
        .unwrap();
        assert_eq!(req.totp_code.as_deref(), Some("123456"));
    }

    #[test]
    fn test_login_response_shape() {
        let tokens = TokenPair {
            access_token: "a".into(),
            refresh_token: "r".into(),
            token_type: "Bearer",
            expires_in: 900,
        };
        let user = UserResponse {
            user_id: "id".into(),
            email: "a@x.com".into(),
            user_name: "alice".into(),
            role: UserRole::Viewer,
            permissions: vec!["read:content"],
            is_active: true,
            two_factor_enabled: false,
            last_login_at: None,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(LoginResponse::new(
            tokens,
            user,
            Some(SecondFactor::BackupCode { remaining: 7 }),
        ))
        .unwrap();

        assert_eq!(json["accessToken"], "a");
        assert_eq!(json["expiresIn"], 900);
        assert_eq!(json["user"]["role"], "viewer");
        assert_eq!(json["secondFactor"], "backup_code");
        assert_eq!(json["backupCodesRemaining"], 7);
    }

    #[test]
    fn test_update_role_request() {
        let req = UpdateRoleRequest {
            role: "editor".into(),
        };
        assert_eq!(req.role().unwrap(), UserRole::Editor);
        let req = UpdateRoleRequest { role: "root".into() };
        assert!(matches!(req.role(), Err(AuthError::Validation(_))));
    }

    #[test]
    fn test_profile_patch_validation() {
        let req = UpdateProfileRequest {
            email: Some("not-an-email".into()),
            user_name: None,
        };
        assert!(matches!(req.into_patch(), Err(AuthError::Validation(_))));
        assert!(UpdateProfileRequest::default().into_patch().unwrap().is_empty());
    }
}
