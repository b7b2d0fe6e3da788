//! Entities

pub mod user;

pub use user::{ProfilePatch, TwoFactorPhase, TwoFactorState, User};
