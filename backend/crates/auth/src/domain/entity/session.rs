//! Session Entity
//!
//! Server-side session record. The client only holds the signed session id;
//! everything else lives in a string-keyed value bag persisted by the
//! session store.

use chrono::{DateTime, Duration, Utc};
use derive_more::Display;
use kernel::id::UserId;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};

const KEY_CREATED: &str = "created";
const KEY_USER_ID: &str = "userId";
const KEY_LOGIN_REDIRECT: &str = "loginRedirect";
const KEY_SSO_STATE: &str = "ssoState";
const KEY_CSRF_TOKEN: &str = "csrfToken";

/// Redirect target when none was stored
pub const DEFAULT_LOGIN_REDIRECT: &str = "/";

/// Opaque session identifier (32 lowercase hex characters)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
pub struct SessionId(String);

impl SessionId {
    /// Allocate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Accept only ids this process could have generated
    ///
    /// The id doubles as a file name, so anything else is rejected.
    pub fn parse(s: &str) -> Option<Self> {
        let valid = s.len() == 32 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        valid.then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Session record
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: SessionId,
    values: Map<String, Value>,
}

impl Session {
    /// Fresh anonymous session created at `now`
    pub fn new(id: SessionId, now: DateTime<Utc>) -> Self {
        let mut values = Map::new();
        values.insert(KEY_CREATED.to_string(), Value::from(now.timestamp()));
        Self { id, values }
    }

    /// Rebuild a session from its persisted value bag
    pub fn from_values(id: SessionId, values: Map<String, Value>) -> Self {
        Self { id, values }
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    // ===== Value bag =====

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    // ===== Well-known keys =====

    /// Creation time; missing or malformed timestamps mean the record is corrupt
    pub fn created_at(&self) -> AuthResult<DateTime<Utc>> {
        self.values
            .get(KEY_CREATED)
            .and_then(Value::as_i64)
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| {
                AuthError::SessionCorrupted(format!(
                    "session {} has no valid creation timestamp",
                    self.id
                ))
            })
    }

    /// Whether the session is at least `window` old at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>, window: Duration) -> AuthResult<bool> {
        Ok(now - self.created_at()? >= window)
    }

    /// Authenticated user, if any
    pub fn user_id(&self) -> Option<UserId> {
        self.values
            .get(KEY_USER_ID)
            .and_then(Value::as_i64)
            .map(UserId::new)
            .filter(UserId::is_persisted)
    }

    /// Sessions without a user are anonymous ("new")
    pub fn is_new(&self) -> bool {
        self.user_id().is_none()
    }

    pub fn set_user_id(&mut self, user_id: UserId) {
        self.set(KEY_USER_ID, user_id.get());
    }

    /// Stored redirect, `/` when unset or not a string
    pub fn login_redirect(&self) -> &str {
        self.values
            .get(KEY_LOGIN_REDIRECT)
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_LOGIN_REDIRECT)
    }

    pub fn set_login_redirect(&mut self, redirect: impl Into<String>) {
        self.set(KEY_LOGIN_REDIRECT, redirect.into());
    }

    /// Stored SSO state, empty when unset
    pub fn sso_state(&self) -> &str {
        self.values
            .get(KEY_SSO_STATE)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn set_sso_state(&mut self, state: impl Into<String>) {
        self.set(KEY_SSO_STATE, state.into());
    }

    pub fn csrf_token(&self) -> Option<&str> {
        self.values.get(KEY_CSRF_TOKEN).and_then(Value::as_str)
    }

    pub fn set_csrf_token(&mut self, token: impl Into<String>) {
        self.set(KEY_CSRF_TOKEN, token.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(SessionId::generate(), Utc::now())
    }

    #[test]
    fn test_session_id_format() {
        let id = SessionId::generate();
        assert_eq!(id.as_str().len(), 32);
        assert_eq!(SessionId::parse(id.as_str()), Some(id));
    }

    #[test]
    fn test_session_id_rejects_paths() {
        assert!(SessionId::parse("../../etc/passwd").is_none());
        assert!(SessionId::parse("ABCDEF0123456789ABCDEF0123456789").is_none());
        assert!(SessionId::parse("").is_none());
    }

    #[test]
    fn test_defaults() {
        let s = session();
        assert!(s.is_new());
        assert_eq!(s.login_redirect(), "/");
        assert_eq!(s.sso_state(), "");
        assert!(s.csrf_token().is_none());
    }

    #[test]
    fn test_non_string_redirect_falls_back() {
        let mut s = session();
        s.set(KEY_LOGIN_REDIRECT, 42);
        assert_eq!(s.login_redirect(), "/");

        s.set_login_redirect("/authorize?app=1");
        assert_eq!(s.login_redirect(), "/authorize?app=1");
    }

    #[test]
    fn test_user_id() {
        let mut s = session();
        s.set_user_id(UserId::new(3));
        assert_eq!(s.user_id(), Some(UserId::new(3)));
        assert!(!s.is_new());
    }

    #[test]
    fn test_expiry_window() {
        let created = Utc::now();
        let s = Session::new(SessionId::generate(), created);
        let window = Duration::hours(168);

        assert!(!s.is_expired_at(created + Duration::hours(167), window).unwrap());
        assert!(s.is_expired_at(created + window, window).unwrap());
    }

    #[test]
    fn test_malformed_created_is_corrupt() {
        let mut s = session();
        s.set(KEY_CREATED, "yesterday");
        assert!(matches!(s.created_at(), Err(AuthError::SessionCorrupted(_))));

        s.remove(KEY_CREATED);
        assert!(s.is_expired_at(Utc::now(), Duration::hours(1)).is_err());
    }
}
