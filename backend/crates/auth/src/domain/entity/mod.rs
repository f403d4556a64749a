//! Domain Entities

pub mod account;
pub mod application;
pub mod audit;
pub mod character;
pub mod corporation;
pub mod group;
pub mod role;
pub mod session;
pub mod user;

pub use account::Account;
pub use application::Application;
pub use audit::{CsrfFailure, LoginAttempt};
pub use character::Character;
pub use corporation::{ApiCredential, Corporation};
pub use group::Group;
pub use role::{GroupRole, Role, UserRole};
pub use session::Session;
pub use user::User;
