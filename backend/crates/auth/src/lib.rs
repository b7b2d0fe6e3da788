//! Auth (Authentication & Authorization) Backend Module
//!
//! Clean Architecture structure:
//! - `domain/` - Entities, value objects, repository trait, hashing and permission resolution
//! - `application/` - Use cases, token service, two-factor service, auth gate
//! - `infra/` - Postgres and in-memory user stores
//! - `presentation/` - HTTP handlers, DTOs, router, bearer middleware
//!
//! ## Features
//! - Registration and sign in by email or user name + password
//! - JWT access tokens and rotating refresh tokens with reuse detection
//! - TOTP 2FA with encrypted seeds and single-use backup codes
//! - Role-based permissions with per-user grants and denials
//!
//! ## Security Model
//! - Passwords and backup codes hashed with Argon2id
//! - One refresh family per user; replaying a rotated token revokes them all
//! - Authorization always checks a freshly loaded user

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

#[cfg(test)]
mod tests;

// Re-exports for convenience
pub use application::audit::{AuditSink, NoopAuditSink, TracingAuditSink};
pub use application::config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use infra::{memory::InMemoryUserRepository, postgres::PgUserRepository};
pub use presentation::router::auth_router;

// Re-export kernel error types for unified error handling
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};

pub mod models {
    pub use crate::domain::entity::*;
    pub use crate::domain::value_object::*;
    pub use crate::presentation::dto::*;
}
