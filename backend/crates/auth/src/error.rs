//! Auth Error Types
//!
//! This module provides auth-specific error variants that integrate
//! with the unified `kernel::error::AppError` system.

use axum::http::StatusCode;
use kernel::error::{app_error::AppError, kind::ErrorKind};
use platform::crypto::CryptoError;
use platform::password::PasswordHashError;
use thiserror::Error;

/// Auth-specific result type alias
pub type AuthResult<T> = Result<T, AuthError>;

/// Auth-specific error variants
#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// No row matches the requested key
    #[error("{entity} {key} not found")]
    NotFound { entity: &'static str, key: String },

    /// Uniqueness or reference violation
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Any other persistence failure
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// The selected store cannot run this operation
    #[error("Operation not supported by this store: {0}")]
    Unsupported(&'static str),

    /// HMAC or authenticated decryption failure
    #[error("Cryptographic check failed: {0}")]
    Crypto(#[from] CryptoError),

    /// Application request signature did not verify
    #[error("Application signature mismatch")]
    SignatureMismatch,

    /// Invalid credentials (unknown user or wrong password)
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// User or application is disabled
    #[error("Account is disabled")]
    AccountDisabled,

    /// CSRF token missing or wrong
    #[error("CSRF token mismatch")]
    CsrfMismatch,

    /// Authenticated user lacks required roles
    #[error("Missing required roles: {}", .0.join(", "))]
    MissingRoles(Vec<String>),

    /// Corrupted session data
    #[error("Session data is corrupted: {0}")]
    SessionCorrupted(String),

    /// Session is older than the validity window
    #[error("Session has expired")]
    SessionExpired,

    /// Session store I/O failure
    #[error("Session store error: {0}")]
    SessionStore(#[from] std::io::Error),

    /// Request-scoped cancellation observed
    #[error("Operation cancelled")]
    Cancelled,

    /// Password hashing failure
    #[error("Password hashing error: {0}")]
    Password(#[from] PasswordHashError),

    /// Invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        AuthError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.kind().status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Get the ErrorKind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Config(_) => ErrorKind::Config,
            AuthError::NotFound { .. } => ErrorKind::NotFound,
            AuthError::Conflict(_) => ErrorKind::Conflict,
            AuthError::Database(_) | AuthError::Unsupported(_) => ErrorKind::Database,
            AuthError::Crypto(_) | AuthError::SignatureMismatch => ErrorKind::Crypto,
            AuthError::InvalidCredentials
            | AuthError::AccountDisabled
            | AuthError::CsrfMismatch
            | AuthError::MissingRoles(_) => ErrorKind::Auth,
            AuthError::SessionCorrupted(_) | AuthError::SessionExpired => ErrorKind::Session,
            AuthError::Cancelled => ErrorKind::Cancelled,
            AuthError::SessionStore(_) | AuthError::Password(_) | AuthError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Convert to AppError, with the step a client should take next
    pub fn to_app_error(&self) -> AppError {
        let err = AppError::new(self.kind(), self.to_string());
        match self {
            AuthError::InvalidCredentials => err.with_action("Check your username and password"),
            AuthError::CsrfMismatch => err.with_action("Reload the login page and try again"),
            AuthError::SessionCorrupted(_) | AuthError::SessionExpired => {
                err.with_action("Log in again")
            }
            AuthError::MissingRoles(_) => err.with_action("Ask an administrator for access"),
            _ => err,
        }
    }

    /// Log the error with appropriate level
    pub(crate) fn log(&self) {
        match self {
            AuthError::Database(e) => {
                tracing::error!(error = %e, "Auth database error");
            }
            AuthError::SessionStore(e) => {
                tracing::error!(error = %e, "Session store error");
            }
            AuthError::Internal(msg) => {
                tracing::error!(message = %msg, "Auth internal error");
            }
            AuthError::InvalidCredentials => {
                tracing::warn!("Invalid login attempt");
            }
            AuthError::CsrfMismatch => {
                tracing::warn!("CSRF token mismatch");
            }
            AuthError::SignatureMismatch => {
                tracing::warn!("Application request signature mismatch");
            }
            _ => {
                tracing::debug!(error = %self, "Auth error");
            }
        }
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AuthError::not_found("row", "requested"),
            sqlx::Error::Database(db_err)
                if db_err.is_unique_violation() || db_err.is_foreign_key_violation() =>
            {
                AuthError::Conflict(db_err.message().to_string())
            }
            _ => AuthError::Database(err),
        }
    }
}

impl From<tokio::task::JoinError> for AuthError {
    fn from(err: tokio::task::JoinError) -> Self {
        AuthError::Internal(format!("Blocking task failed: {}", err))
    }
}
