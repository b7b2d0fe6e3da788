use serde::{Deserialize, Serialize};
use std::fmt;

/// Account role, totally ordered from least to most privileged.
///
/// The ordinal drives [`UserRole::at_least`]; what a role may actually do is
/// decided by the role permission table, not by this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum UserRole {
    #[default]
    Viewer = 0,
    Contributor = 1,
    Editor = 2,
    Moderator = 3,
    Admin = 4,
    SuperAdmin = 5,
}

impl UserRole {
    /// Every role, lowest first
    pub const ALL: [UserRole; 6] = [
        UserRole::Viewer,
        UserRole::Contributor,
        UserRole::Editor,
        UserRole::Moderator,
        UserRole::Admin,
        UserRole::SuperAdmin,
    ];

    /// Highest role; the only one allowed to hand out itself
    pub const TOP: UserRole = UserRole::SuperAdmin;

    #[inline]
    pub const fn ordinal(&self) -> i16 {
        *self as i16
    }

    #[inline]
    pub const fn code(&self) -> &'static str {
        use UserRole::*;
        match self {
            Viewer => "viewer",
            Contributor => "contributor",
            Editor => "editor",
            Moderator => "moderator",
            Admin => "admin",
            SuperAdmin => "superadmin",
        }
    }

    /// `None` for anything outside the fixed list
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.code() == code)
    }

    pub fn from_ordinal(ordinal: i16) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.ordinal() == ordinal)
    }

    #[inline]
    pub fn at_least(&self, required: UserRole) -> bool {
        self.ordinal() >= required.ordinal()
    }

    #[inline]
    pub const fn is_super_admin(&self) -> bool {
        matches!(self, UserRole::SuperAdmin)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
