//! Platform Crate - Technical Infrastructure
//!
//! Security primitives shared by the backend:
//! - Random bytes, base64, constant-time comparison
//! - Authenticated encryption of secrets at rest (ChaCha20-Poly1305)
//! - Password hashing (Argon2id) and the new-password policy

pub mod crypto;
pub mod password;
