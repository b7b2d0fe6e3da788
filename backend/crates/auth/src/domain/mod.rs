//! Domain Layer
//!
//! Entities, value objects, pure domain services and the repository trait.

pub mod entity;
pub mod repository;
pub mod service;
pub mod value_object;

// Re-exports
pub use entity::user::User;
pub use repository::UserRepository;
