//! Permission catalog
//!
//! Flat `category:resource` tags. The catalog is closed: user overrides are
//! stored as raw strings and only tags that [`Permission::parse`] recognizes
//! take part in resolution.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

macro_rules! permissions {
    ($( $variant:ident => $tag:literal ),+ $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Permission {
            $( $variant, )+
        }

        impl Permission {
            /// Full catalog in declaration order
            pub const ALL: &'static [Permission] = &[ $( Permission::$variant, )+ ];

            pub const fn tag(&self) -> &'static str {
                match self {
                    $( Permission::$variant => $tag, )+
                }
            }

            /// `None` for tags outside the catalog (never an error)
            pub fn parse(tag: &str) -> Option<Self> {
                match tag {
                    $( $tag => Some(Permission::$variant), )+
                    _ => None,
                }
            }
        }
    };
}

permissions! {
    // read
    ReadContent => "read:content",
    ReadEvents => "read:events",
    ReadBooks => "read:books",
    ReadGeography => "read:geography",
    ReadUsers => "read:users",
    ReadAdmin => "read:admin",
    // write
    WriteContent => "write:content",
    WriteEvents => "write:events",
    WriteBooks => "write:books",
    WriteGeography => "write:geography",
    // edit
    EditContent => "edit:content",
    EditEvents => "edit:events",
    EditBooks => "edit:books",
    EditGeography => "edit:geography",
    // delete
    DeleteContent => "delete:content",
    DeleteEvents => "delete:events",
    DeleteBooks => "delete:books",
    DeleteGeography => "delete:geography",
    // admin level
    ManageUsers => "manage:users",
    ManageRoles => "manage:roles",
    ModerateContent => "moderate:content",
    ImportData => "import:data",
    // system level
    SystemSettings => "system:settings",
    SystemAudit => "system:audit",
}

impl Permission {
    /// Part before the colon (`read`, `manage`, `system`, ...)
    pub fn category(&self) -> &'static str {
        self.tag().split_once(':').map_or("", |(category, _)| category)
    }

    /// Every permission in `category`
    pub fn in_category(category: &str) -> impl Iterator<Item = Permission> + '_ {
        Self::ALL
            .iter()
            .copied()
            .filter(move |p| p.category() == category)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Error for [`FromStr`]; carries the rejected tag
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown permission: {0}")]
pub struct UnknownPermission(pub String);

impl FromStr for Permission {
    type Err = UnknownPermission;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::parse(s).ok_or_else(|| UnknownPermission(s.to_string()))
    }
}

impl Serialize for Permission {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

impl<'de> Deserialize<'de> for Permission {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        tag.parse().map_err(serde::de::Error::custom)
    }
}
