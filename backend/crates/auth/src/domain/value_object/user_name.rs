//! User Name Value Object
//!
//! Public handle of an account. Case is preserved for display; uniqueness is
//! on the lowercase canonical form.
//!
//! ## Rules (after NFKC + trim)
//! - 3..=30 characters, ASCII `a-z 0-9 _ . - +`
//! - starts and ends with a letter, digit or `_`
//! - no `..`, at least one letter or digit
//! - not a reserved word

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

pub const USER_NAME_MIN_LENGTH: usize = 3;
pub const USER_NAME_MAX_LENGTH: usize = 30;

const ALLOWED_SPECIAL_CHARS: &[char] = &['_', '.', '-', '+'];

/// Names that collide with routes or imply authority
const RESERVED_WORDS: &[&str] = &[
    "admin",
    "administrator",
    "superadmin",
    "moderator",
    "root",
    "system",
    "staff",
    "support",
    "api",
    "auth",
    "login",
    "logout",
    "register",
    "refresh",
    "me",
    "users",
    "settings",
    "null",
    "undefined",
    "anonymous",
    "official",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UserNameError {
    #[error("User name cannot be empty")]
    Empty,

    #[error("User name is too short ({length} chars, minimum {min})")]
    TooShort { length: usize, min: usize },

    #[error("User name is too long ({length} chars, maximum {max})")]
    TooLong { length: usize, max: usize },

    #[error("Invalid character '{ch}' at position {position}. Only a-z, 0-9, _, ., -, + are allowed")]
    InvalidCharacter { ch: char, position: usize },

    #[error("User name must start and end with a-z, 0-9, or _")]
    InvalidBoundary,

    #[error("User name cannot contain consecutive dots (..)")]
    ConsecutiveDots,

    #[error("User name must contain at least one letter or digit")]
    NoAlphanumeric,

    #[error("'{0}' is a reserved user name")]
    Reserved(String),
}

/// Validated user name
///
/// `original` keeps the caller's casing, `canonical` is the lowercase key.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserName {
    original: String,
    canonical: String,
}

impl UserName {
    pub fn new(input: impl AsRef<str>) -> Result<Self, UserNameError> {
        let original: String = input.as_ref().nfkc().collect::<String>().trim().to_string();
        let canonical = original.to_lowercase();
        validate(&canonical)?;
        Ok(Self {
            original,
            canonical,
        })
    }

    /// Rebuild from the stored display form
    pub fn from_db(original: impl Into<String>) -> Self {
        let original = original.into();
        let canonical = original.to_lowercase();
        Self {
            original,
            canonical,
        }
    }

    #[inline]
    pub fn original(&self) -> &str {
        &self.original
    }

    #[inline]
    pub fn canonical(&self) -> &str {
        &self.canonical
    }
}

fn validate(canonical: &str) -> Result<(), UserNameError> {
    if canonical.is_empty() {
        return Err(UserNameError::Empty);
    }

    let length = canonical.chars().count();
    if length < USER_NAME_MIN_LENGTH {
        return Err(UserNameError::TooShort {
            length,
            min: USER_NAME_MIN_LENGTH,
        });
    }
    if length > USER_NAME_MAX_LENGTH {
        return Err(UserNameError::TooLong {
            length,
            max: USER_NAME_MAX_LENGTH,
        });
    }

    if let Some((position, ch)) = canonical
        .chars()
        .enumerate()
        .find(|(_, c)| !(c.is_ascii_lowercase() || c.is_ascii_digit() || ALLOWED_SPECIAL_CHARS.contains(c)))
    {
        return Err(UserNameError::InvalidCharacter { ch, position });
    }

    let boundary_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
    if !boundary_ok(canonical.chars().next()) || !boundary_ok(canonical.chars().last()) {
        return Err(UserNameError::InvalidBoundary);
    }

    if canonical.contains("..") {
        return Err(UserNameError::ConsecutiveDots);
    }

    if !canonical.chars().any(|c| c.is_ascii_alphanumeric()) {
        return Err(UserNameError::NoAlphanumeric);
    }

    if RESERVED_WORDS.contains(&canonical) {
        return Err(UserNameError::Reserved(canonical.to_string()));
    }

    Ok(())
}

impl TryFrom<String> for UserName {
    type Error = UserNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        UserName::new(value)
    }
}

impl From<UserName> for String {
    fn from(name: UserName) -> Self {
        name.original
    }
}

impl fmt::Display for UserName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl fmt::Debug for UserName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserName({:?})", self.original)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["alice", "bob_99", "j.doe", "a-b+c", "_x_"] {
            assert!(UserName::new(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_case_preserved_canonical_lowercase() {
        let name = UserName::new("  Alice ").unwrap();
        assert_eq!(name.original(), "Alice");
        assert_eq!(name.canonical(), "alice");
        assert_eq!(name.to_string(), "Alice");
    }

    #[test]
    fn test_nfkc_fullwidth_folds_to_ascii() {
        let name = UserName::new("ａｌｉｃｅ").unwrap();
        assert_eq!(name.canonical(), "alice");
    }

    #[test]
    fn test_length_limits() {
        assert!(matches!(UserName::new("ab"), Err(UserNameError::TooShort { .. })));
        assert!(matches!(
            UserName::new("a".repeat(USER_NAME_MAX_LENGTH + 1)),
            Err(UserNameError::TooLong { .. })
        ));
        assert!(matches!(UserName::new("   "), Err(UserNameError::Empty)));
    }

    #[test]
    fn test_invalid_shapes() {
        assert!(matches!(
            UserName::new("ali ce"),
            Err(UserNameError::InvalidCharacter { ch: ' ', position: 3 })
        ));
        assert!(matches!(UserName::new(".alice"), Err(UserNameError::InvalidBoundary)));
        assert!(matches!(UserName::new("alice-"), Err(UserNameError::InvalidBoundary)));
        assert!(matches!(UserName::new("a..b"), Err(UserNameError::ConsecutiveDots)));
        assert!(matches!(UserName::new("___"), Err(UserNameError::NoAlphanumeric)));
    }

    #[test]
    fn test_reserved() {
        assert!(matches!(UserName::new("Admin"), Err(UserNameError::Reserved(w)) if w == "admin"));
    }
}
