//! Application Configuration
//!
//! Secrets and lifetimes for the auth core. Both keys are required; a
//! process that cannot build an [`AuthConfig`] must not start.

use std::time::Duration;

use platform::crypto::{KEY_LEN, from_base64, random_bytes};

use crate::error::{AuthError, AuthResult};

/// Minimum JWT signing secret length in bytes
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Upper bound for either token lifetime
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(365 * 24 * 3600);

#[derive(Clone)]
pub struct AuthConfig {
    /// HS256 signing secret
    pub jwt_secret: Vec<u8>,
    /// Key for sealing TOTP seeds at rest; independent of any user secret
    pub two_factor_key: [u8; KEY_LEN],
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    /// Issuer label shown in authenticator apps
    pub totp_issuer: String,
    pub backup_code_count: usize,
    /// Application-wide secret mixed into password hashes
    pub password_pepper: Option<Vec<u8>>,
}

impl AuthConfig {
    pub const DEFAULT_ACCESS_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);
    pub const DEFAULT_REFRESH_TOKEN_TTL: Duration = Duration::from_secs(7 * 24 * 3600);
    pub const DEFAULT_TOTP_ISSUER: &'static str = "Platform";
    pub const DEFAULT_BACKUP_CODE_COUNT: usize = 8;

    /// Config with defaults for everything but the two keys
    pub fn new(jwt_secret: impl Into<Vec<u8>>, two_factor_key: [u8; KEY_LEN]) -> AuthResult<Self> {
        let jwt_secret = jwt_secret.into();
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(AuthError::Config(format!(
                "JWT secret must be at least {MIN_JWT_SECRET_LEN} bytes (got {})",
                jwt_secret.len()
            )));
        }

        Ok(Self {
            jwt_secret,
            two_factor_key,
            access_token_ttl: Self::DEFAULT_ACCESS_TOKEN_TTL,
            refresh_token_ttl: Self::DEFAULT_REFRESH_TOKEN_TTL,
            totp_issuer: Self::DEFAULT_TOTP_ISSUER.to_string(),
            backup_code_count: Self::DEFAULT_BACKUP_CODE_COUNT,
            password_pepper: None,
        })
    }

    /// Read from the process environment
    ///
    /// Required: `JWT_SECRET`, `TWO_FACTOR_ENCRYPTION_KEY` (base64 of 32
    /// bytes). Optional: `ACCESS_TOKEN_TTL_SECS`, `REFRESH_TOKEN_TTL_SECS`,
    /// `TOTP_ISSUER`, `PASSWORD_PEPPER`.
    pub fn from_env() -> AuthResult<Self> {
        let jwt_secret = required_env("JWT_SECRET")?;
        let two_factor_key = parse_key(&required_env("TWO_FACTOR_ENCRYPTION_KEY")?)?;

        let mut config = Self::new(jwt_secret.into_bytes(), two_factor_key)?;

        if let Some(secs) = optional_env("ACCESS_TOKEN_TTL_SECS") {
            config.access_token_ttl = parse_ttl("ACCESS_TOKEN_TTL_SECS", &secs)?;
        }
        if let Some(secs) = optional_env("REFRESH_TOKEN_TTL_SECS") {
            config.refresh_token_ttl = parse_ttl("REFRESH_TOKEN_TTL_SECS", &secs)?;
        }
        if let Some(issuer) = optional_env("TOTP_ISSUER") {
            config.set_totp_issuer(issuer)?;
        }
        config.password_pepper = optional_env("PASSWORD_PEPPER").map(String::into_bytes);

        Ok(config)
    }

    /// Random keys, for local runs and tests
    pub fn development() -> Self {
        let mut two_factor_key = [0u8; KEY_LEN];
        two_factor_key.copy_from_slice(&random_bytes(KEY_LEN));

        Self {
            jwt_secret: random_bytes(64),
            two_factor_key,
            access_token_ttl: Self::DEFAULT_ACCESS_TOKEN_TTL,
            refresh_token_ttl: Self::DEFAULT_REFRESH_TOKEN_TTL,
            totp_issuer: Self::DEFAULT_TOTP_ISSUER.to_string(),
            backup_code_count: Self::DEFAULT_BACKUP_CODE_COUNT,
            password_pepper: None,
        }
    }

    /// Issuers end up in the `otpauth://` label, where `:` separates issuer
    /// from account
    pub fn set_totp_issuer(&mut self, issuer: impl Into<String>) -> AuthResult<()> {
        let issuer = issuer.into().trim().to_string();
        if issuer.is_empty() || issuer.contains(':') {
            return Err(AuthError::Config(
                "TOTP_ISSUER must be non-empty and must not contain ':'".into(),
            ));
        }
        self.totp_issuer = issuer;
        Ok(())
    }

    pub fn pepper(&self) -> Option<&[u8]> {
        self.password_pepper.as_deref()
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"[REDACTED]")
            .field("two_factor_key", &"[REDACTED]")
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("totp_issuer", &self.totp_issuer)
            .field("backup_code_count", &self.backup_code_count)
            .field("password_pepper", &self.password_pepper.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn required_env(name: &str) -> AuthResult<String> {
    optional_env(name).ok_or_else(|| AuthError::Config(format!("{name} must be set")))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_key(encoded: &str) -> AuthResult<[u8; KEY_LEN]> {
    let bytes = from_base64(encoded.trim())
        .map_err(|_| AuthError::Config("TWO_FACTOR_ENCRYPTION_KEY must be base64".into()))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        AuthError::Config(format!(
            "TWO_FACTOR_ENCRYPTION_KEY must decode to {KEY_LEN} bytes (got {})",
            bytes.len()
        ))
    })
}

fn parse_ttl(name: &str, value: &str) -> AuthResult<Duration> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 && secs <= MAX_TOKEN_TTL.as_secs() => Ok(Duration::from_secs(secs)),
        _ => Err(AuthError::Config(format!(
            "{name} must be between 1 and {} seconds",
            MAX_TOKEN_TTL.as_secs()
        ))),
    }
}
