//! Refresh token family
//!
//! The one generation marker stored per user. Every refresh token carries
//! the family it was minted under and is only honoured while that value is
//! still the stored one; writing a fresh value kills the whole lineage.

use platform::crypto::{constant_time_eq, random_token};
use std::fmt;

/// Random bytes per family (256 bits)
const FAMILY_BYTES: usize = 32;

#[derive(Clone, PartialEq, Eq)]
pub struct RefreshFamily(String);

impl RefreshFamily {
    /// Fresh, unguessable family
    pub fn generate() -> Self {
        Self(random_token(FAMILY_BYTES))
    }

    pub fn from_db(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time comparison with the family claimed by a token
    pub fn matches(&self, claimed: &str) -> bool {
        constant_time_eq(self.0.as_bytes(), claimed.as_bytes())
    }
}

impl fmt::Debug for RefreshFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(6).collect();
        write!(f, "RefreshFamily({prefix}…)")
    }
}
