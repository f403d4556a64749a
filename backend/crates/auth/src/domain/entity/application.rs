//! Application Entity
//!
//! A third-party application that authenticates its users through this
//! service. Requests from the application are signed with HMAC-SHA256 over
//! `"{id}:{callback}"` using the shared secret.

use std::fmt;

use kernel::id::{ApplicationId, UserId};
use platform::crypto::{compute_hmac, random_string, verify_hmac};
use serde::Serialize;
use url::Url;

use crate::error::{AuthError, AuthResult};

/// Length of a generated application secret
pub const SECRET_LEN: usize = 32;

/// Opaque shared secret of an Application
#[derive(Clone, PartialEq, Eq)]
pub struct ApplicationSecret(String);

impl ApplicationSecret {
    /// Generate a fresh alphanumeric secret
    pub fn generate() -> Self {
        Self(random_string(SECRET_LEN))
    }

    /// Wrap a stored secret
    pub fn from_db(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for ApplicationSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApplicationSecret([REDACTED])")
    }
}

/// Application entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: ApplicationId,
    pub name: String,
    pub maintainer_id: UserId,
    #[serde(skip)]
    pub secret: ApplicationSecret,
    /// Absolute URL users are sent back to
    pub callback: String,
    pub active: bool,
}

impl Application {
    /// Create a new application with a generated secret
    pub fn new(
        name: impl Into<String>,
        maintainer_id: UserId,
        callback: impl Into<String>,
    ) -> AuthResult<Self> {
        let app = Self {
            id: ApplicationId::unsaved(),
            name: name.into(),
            maintainer_id,
            secret: ApplicationSecret::generate(),
            callback: callback.into(),
            active: true,
        };
        app.callback_url()?;
        Ok(app)
    }

    /// Parsed callback; relative or malformed URLs are rejected
    pub fn callback_url(&self) -> AuthResult<Url> {
        Url::parse(&self.callback).map_err(|e| {
            AuthError::Config(format!("Invalid callback URL {:?}: {}", self.callback, e))
        })
    }

    fn request_message(&self, callback: &str) -> String {
        format!("{}:{}", self.id, callback)
    }

    /// Signature an application attaches to an authorization request
    pub fn sign_request(&self, callback: &str) -> String {
        compute_hmac(self.request_message(callback).as_bytes(), self.secret.as_bytes())
    }

    /// Constant-time check of a request signature
    pub fn verify_request(&self, callback: &str, auth: &str) -> bool {
        verify_hmac(
            self.request_message(callback).as_bytes(),
            auth,
            self.secret.as_bytes(),
        )
    }
}
