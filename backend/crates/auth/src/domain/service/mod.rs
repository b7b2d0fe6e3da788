//! Domain Services
//!
//! Stateless logic over domain types: hashing and permission resolution.

pub mod credential_hasher;
pub mod permission_resolver;

pub use credential_hasher::CredentialHasher;
pub use permission_resolver::{PermissionResolver, RolePermissionTable};
