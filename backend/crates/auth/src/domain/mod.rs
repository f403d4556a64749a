//! Domain Layer
//!
//! Contains entities, repository traits and the authorization resolver.

pub mod authorization;
pub mod entity;
pub mod repository;

// Re-exports
pub use entity::{
    Account, Application, Character, Corporation, CsrfFailure, Group, GroupRole, LoginAttempt,
    Role, Session, User, UserRole,
};
pub use repository::{Persistence, SessionRepository};
