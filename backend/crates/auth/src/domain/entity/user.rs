//! User Entity
//!
//! The full account record: identity, credentials, role and overrides,
//! refresh family and two-factor state. Security-sensitive fields are only
//! changed through dedicated setters or repository operations, never through
//! [`ProfilePatch`].

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::domain::value_object::{
    email::Email, refresh_family::RefreshFamily, user_id::UserId, user_name::UserName,
    user_password::UserPassword, user_role::UserRole,
};

#[derive(Debug, Clone)]
pub struct User {
    pub user_id: UserId,
    pub email: Email,
    pub user_name: UserName,
    pub password_hash: UserPassword,
    pub user_role: UserRole,
    /// Raw grant tags; unknown tags are kept but never resolve
    pub extra_permissions: BTreeSet<String>,
    /// Raw denial tags; applied after every grant
    pub denied_permissions: BTreeSet<String>,
    pub is_active: bool,
    pub refresh_token_family: RefreshFamily,
    pub two_factor: TwoFactorState,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// New active account at the baseline role with 2FA off
    pub fn new(email: Email, user_name: UserName, password_hash: UserPassword) -> Self {
        let now = Utc::now();

        Self {
            user_id: UserId::new(),
            email,
            user_name,
            password_hash,
            user_role: UserRole::default(),
            extra_permissions: BTreeSet::new(),
            denied_permissions: BTreeSet::new(),
            is_active: true,
            refresh_token_family: RefreshFamily::generate(),
            two_factor: TwoFactorState::default(),
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn can_login(&self) -> bool {
        self.is_active
    }

    pub fn two_factor_phase(&self) -> TwoFactorPhase {
        self.two_factor.phase()
    }

    pub fn set_role(&mut self, role: UserRole) {
        self.user_role = role;
        self.touch();
    }

    pub fn set_active(&mut self, is_active: bool) {
        self.is_active = is_active;
        self.touch();
    }

    pub fn set_permission_overrides(&mut self, extra: BTreeSet<String>, denied: BTreeSet<String>) {
        self.extra_permissions = extra;
        self.denied_permissions = denied;
        self.touch();
    }

    pub fn set_password_hash(&mut self, password_hash: UserPassword) {
        self.password_hash = password_hash;
        self.touch();
    }

    pub fn set_email(&mut self, email: Email) {
        self.email = email;
        self.touch();
    }

    pub fn set_user_name(&mut self, user_name: UserName) {
        self.user_name = user_name;
        self.touch();
    }

    pub fn set_refresh_family(&mut self, family: RefreshFamily) {
        self.refresh_token_family = family;
        self.touch();
    }

    pub fn set_two_factor(&mut self, state: TwoFactorState) {
        self.two_factor = state;
        self.touch();
    }

    pub fn record_login(&mut self, at: DateTime<Utc>) {
        self.last_login_at = Some(at);
        self.updated_at = at;
    }

    /// Apply the fields a user may change about themselves
    pub fn apply_profile(&mut self, patch: &ProfilePatch) {
        if let Some(email) = &patch.email {
            self.set_email(email.clone());
        }
        if let Some(user_name) = &patch.user_name {
            self.set_user_name(user_name.clone());
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// ============================================================================
// Two-factor state
// ============================================================================

/// Derived enrollment phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwoFactorPhase {
    Disabled,
    /// Secret stored, waiting for the first correct code
    PendingSetup,
    Enabled,
}

/// Persisted two-factor fields
///
/// Compared as a whole by the repository's compare-and-swap, so every
/// transition is checked against the exact state it started from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TwoFactorState {
    pub enabled: bool,
    /// `SecretCipher`-sealed base32 seed
    pub encrypted_secret: Option<String>,
    /// Argon2id hashes of unused backup codes, in issue order
    pub backup_codes: Vec<String>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl TwoFactorState {
    pub fn phase(&self) -> TwoFactorPhase {
        match (self.enabled, self.encrypted_secret.is_some()) {
            (true, _) => TwoFactorPhase::Enabled,
            (false, true) => TwoFactorPhase::PendingSetup,
            (false, false) => TwoFactorPhase::Disabled,
        }
    }

    pub fn pending(encrypted_secret: String, backup_codes: Vec<String>) -> Self {
        Self {
            enabled: false,
            encrypted_secret: Some(encrypted_secret),
            backup_codes,
            verified_at: None,
        }
    }

    /// Same secret and codes, now enforced
    pub fn enable(&self, at: DateTime<Utc>) -> Self {
        Self {
            enabled: true,
            verified_at: Some(at),
            ..self.clone()
        }
    }

    pub fn with_backup_codes(&self, backup_codes: Vec<String>) -> Self {
        Self {
            backup_codes,
            ..self.clone()
        }
    }
}

// ============================================================================
// Profile patch
// ============================================================================

/// Self-service profile update; only the fields listed here can change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfilePatch {
    pub email: Option<Email>,
    pub user_name: Option<UserName>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.user_name.is_none()
    }
}
