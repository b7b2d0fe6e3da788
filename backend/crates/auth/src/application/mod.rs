//! Application Layer
//!
//! Use cases and application services.

pub mod account;
pub mod audit;
pub mod auth_gate;
pub mod config;
pub mod sign_in;
pub mod sign_out;
pub mod sign_up;
pub mod token_service;
pub mod two_factor;
pub mod user_admin;

// Re-exports
pub use account::AccountUseCase;
pub use audit::{AuditEvent, AuditLog, AuditSink, NoopAuditSink, TracingAuditSink};
pub use auth_gate::AuthGate;
pub use config::AuthConfig;
pub use sign_in::{SignInInput, SignInOutput, SignInUseCase};
pub use sign_out::SignOutUseCase;
pub use sign_up::{SignUpInput, SignUpUseCase};
pub use token_service::{AccessClaims, TokenPair, TokenService};
pub use two_factor::{SecondFactor, TwoFactorService, TwoFactorSetupOutput};
pub use user_admin::UserAdminUseCase;
