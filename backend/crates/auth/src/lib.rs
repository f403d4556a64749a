//! Auth (Authentication and Authorization) Backend Module
//!
//! Clean Architecture structure:
//! - `domain/` - Entities, repository traits, role resolution
//! - `application/` - Use cases and the session controller
//! - `infra/` - MySQL and in-memory stores, file-backed sessions
//! - `presentation/` - HTTP handlers, DTOs, router
//!
//! ## Features
//! - Users with EVE API accounts, characters and corporations
//! - Roles granted directly or through group membership
//! - Login with username + password, every attempt audited
//! - Signed-request authorization for third-party applications
//!
//! ## Security Model
//! - Passwords hashed with bcrypt (cost 10)
//! - Server-side sessions, one-week window, signed cookies
//! - CSRF tokens per session; failures are recorded
//! - Authorization payloads encrypted then MACed with the app secret

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

#[cfg(test)]
mod tests;

// Re-exports for convenience
pub use application::config::AuthConfig;
pub use application::session::SessionController;
pub use error::{AuthError, AuthResult};
pub use infra::{FileSessionStore, MemoryStore, MySqlStore};
pub use presentation::handlers::AuthAppState;
pub use presentation::router::auth_router;

// Re-export kernel error types for unified error handling
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};

// Convenience re-exports
pub mod config {
    pub use crate::application::config::*;
}

pub mod models {
    pub use crate::domain::entity::*;
    pub use crate::presentation::dto::*;
}

pub mod store {
    pub use crate::domain::repository::*;
    pub use crate::infra::*;
}
