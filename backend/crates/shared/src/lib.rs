//! Shared Kernel
//!
//! The small vocabulary every backend crate agrees on:
//! - [`error::app_error::AppError`] and the [`error::kind::ErrorKind`] classification
//! - typed identifiers ([`id::Id`])
//!
//! Anything domain specific (roles, permissions, tokens) lives in the
//! owning crate, not here.

pub mod error {
    pub mod app_error;
    pub mod conversions;
    pub mod kind;
}
pub mod id;
