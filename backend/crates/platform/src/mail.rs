//! Mail Dispatch
//!
//! Outbound mail is an injected collaborator. The server wires a [`Mailer`]
//! into shared state; transports implement the trait.

use thiserror::Error;

/// Mail dispatch errors
#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid recipient address: {0}")]
    InvalidRecipient(String),

    #[error("Mail transport failed: {0}")]
    Transport(String),
}

/// Sends a single plain-text message
pub trait Mailer: Send + Sync {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError>;
}

/// Mailer that writes messages to the log instead of delivering them
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        if !to.contains('@') {
            return Err(MailError::InvalidRecipient(to.to_string()));
        }
        tracing::info!(to, subject, body_len = body.len(), "Mail dispatched to log");
        Ok(())
    }
}
