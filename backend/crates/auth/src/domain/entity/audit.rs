//! Audit Records
//!
//! Append-only rows written on every login attempt and every rejected CSRF
//! token. They are never modified after insert.

use chrono::{DateTime, Utc};
use kernel::id::{CsrfFailureId, LoginAttemptId, UserId};
use platform::client::ClientInfo;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginAttempt {
    pub id: LoginAttemptId,
    pub username: String,
    pub remote_addr: String,
    pub user_agent: String,
    pub successful: bool,
    pub timestamp: DateTime<Utc>,
}

impl LoginAttempt {
    pub fn new(username: impl Into<String>, client: &ClientInfo, successful: bool) -> Self {
        Self {
            id: LoginAttemptId::unsaved(),
            username: username.into(),
            remote_addr: client.remote_addr(),
            user_agent: client.user_agent().to_string(),
            successful,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfFailure {
    pub id: CsrfFailureId,
    /// Unsaved id when the request was anonymous
    pub user_id: UserId,
    /// Serialized request line and headers
    pub request: String,
    pub timestamp: DateTime<Utc>,
}

impl CsrfFailure {
    pub fn new(user_id: Option<UserId>, request: impl Into<String>) -> Self {
        Self {
            id: CsrfFailureId::unsaved(),
            user_id: user_id.unwrap_or_default(),
            request: request.into(),
            timestamp: Utc::now(),
        }
    }
}
