//! Application Layer
//!
//! Use cases and application services.

pub mod administration;
pub mod authorize;
pub mod cancel;
pub mod config;
pub mod session;
pub mod sign_in;
pub mod sign_up;

// Re-exports
pub use administration::{AdministrationUseCase, UpdateUserInput};
pub use authorize::{AuthorizeInput, AuthorizeUseCase};
pub use cancel::cancellable;
pub use config::AuthConfig;
pub use session::SessionController;
pub use sign_in::{SignInInput, SignInUseCase};
pub use sign_up::{SignUpInput, SignUpUseCase};
