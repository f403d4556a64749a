//! Session Controller
//!
//! Owns the cookie side of sessions. The `login` cookie carries the signed
//! session id and the `user` cookie the signed user id; everything else is
//! kept server-side in a [`SessionRepository`].
//!
//! A session is logged in when it has a user id and is younger than the
//! configured window (one week), regardless of how long the browser kept
//! the cookie. Anonymous sessions exist so a login redirect, SSO state or
//! CSRF token can be stored before the user authenticates.

use std::sync::Arc;

use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use kernel::id::UserId;
use platform::cookie::CookieSigner;
use platform::crypto::{constant_time_eq, random_string};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::config::{AuthConfig, LOGIN_COOKIE, USER_COOKIE};
use crate::domain::entity::{
    Session, User,
    session::{DEFAULT_LOGIN_REDIRECT, SessionId},
};
use crate::domain::repository::SessionRepository;
use crate::error::{AuthError, AuthResult};

/// Length of CSRF and SSO state tokens
const TOKEN_LEN: usize = 32;

/// Outcome of resolving the `login` cookie
enum Lookup {
    /// No cookie at all
    Absent,
    /// Bad signature, missing record or unreadable record
    Invalid(Option<SessionId>),
    Found(Session),
}

pub struct SessionController<S> {
    store: Arc<S>,
    signer: CookieSigner,
    config: Arc<AuthConfig>,
}

impl<S> SessionController<S>
where
    S: SessionRepository + Send + Sync + 'static,
{
    /// Create a controller with a fresh process-random signing key
    pub fn new(store: Arc<S>, config: Arc<AuthConfig>) -> Self {
        Self {
            store,
            signer: CookieSigner::generate(),
            config,
        }
    }

    // ===== Cookie plumbing =====

    async fn lookup(&self, jar: &CookieJar) -> AuthResult<Lookup> {
        let Some(cookie) = jar.get(LOGIN_COOKIE) else {
            return Ok(Lookup::Absent);
        };
        let Some(id) = self
            .signer
            .unsign(cookie.value())
            .and_then(SessionId::parse)
        else {
            tracing::debug!("Session cookie failed verification");
            return Ok(Lookup::Invalid(None));
        };

        match self.store.load(&id).await {
            Ok(Some(session)) => Ok(Lookup::Found(session)),
            Ok(None) => Ok(Lookup::Invalid(Some(id))),
            Err(e @ AuthError::SessionCorrupted(_)) => {
                tracing::warn!(error = %e, "Discarding corrupted session");
                Ok(Lookup::Invalid(Some(id)))
            }
            Err(e) => Err(e),
        }
    }

    fn issue_cookies(&self, jar: CookieJar, session: &Session) -> CookieJar {
        let jar = jar.add(
            self.config
                .cookie
                .build(LOGIN_COOKIE, self.signer.sign(session.id.as_str())),
        );
        match session.user_id() {
            Some(user_id) => jar.add(
                self.config
                    .cookie
                    .build(USER_COOKIE, self.signer.sign(&user_id.to_string())),
            ),
            None => jar,
        }
    }

    fn clear_cookies(&self, jar: CookieJar) -> CookieJar {
        jar.remove(self.config.cookie.build_removal(LOGIN_COOKIE))
            .remove(self.config.cookie.build_removal(USER_COOKIE))
    }

    async fn discard(&self, jar: CookieJar, id: Option<&SessionId>) -> CookieJar {
        if let Some(id) = id {
            if let Err(e) = self.store.delete(id).await {
                tracing::warn!(error = %e, session_id = %id, "Failed to delete session record");
            }
        }
        self.clear_cookies(jar)
    }

    /// Existing usable session, or a fresh anonymous one (not yet saved)
    async fn load_or_create_at(
        &self,
        jar: CookieJar,
        now: DateTime<Utc>,
    ) -> AuthResult<(CookieJar, Session)> {
        let stale = match self.lookup(&jar).await? {
            Lookup::Found(session) if self.is_live_at(&session, now) => return Ok((jar, session)),
            Lookup::Found(session) => Some(session.id),
            Lookup::Invalid(id) => id,
            Lookup::Absent => None,
        };

        let jar = self.discard(jar, stale.as_ref()).await;
        let session = Session::new(SessionId::generate(), now);
        let jar = self.issue_cookies(jar, &session);
        Ok((jar, session))
    }

    /// Younger than the window at `now`; a malformed timestamp counts as expired
    fn is_live_at(&self, session: &Session, now: DateTime<Utc>) -> bool {
        matches!(
            session.is_expired_at(now, self.config.session_window_chrono()),
            Ok(false)
        )
    }

    /// Existing session without creating one
    ///
    /// Unusable and expired sessions count as absent, so values stored in a
    /// stale session are never read back.
    async fn existing(&self, jar: &CookieJar) -> AuthResult<Option<Session>> {
        match self.lookup(jar).await? {
            Lookup::Found(session) if self.is_live_at(&session, Utc::now()) => Ok(Some(session)),
            Lookup::Found(_) | Lookup::Absent | Lookup::Invalid(_) => Ok(None),
        }
    }

    // ===== Login state =====

    /// Authenticated session at `now`
    ///
    /// Unusable sessions (bad signature, missing or corrupt record, malformed
    /// timestamp, older than the window) are destroyed. Anonymous sessions
    /// are left alone.
    pub async fn authenticated_at(
        &self,
        jar: CookieJar,
        now: DateTime<Utc>,
    ) -> AuthResult<(CookieJar, Option<Session>)> {
        let session = match self.lookup(&jar).await? {
            Lookup::Absent => return Ok((jar, None)),
            Lookup::Invalid(id) => return Ok((self.discard(jar, id.as_ref()).await, None)),
            Lookup::Found(session) => session,
        };

        if session.is_new() {
            return Ok((jar, None));
        }

        match session.is_expired_at(now, self.config.session_window_chrono()) {
            Ok(false) => Ok((jar, Some(session))),
            Ok(true) => {
                tracing::debug!(session_id = %session.id, "Session expired");
                Ok((self.discard(jar, Some(&session.id)).await, None))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Destroying session with malformed timestamp");
                Ok((self.discard(jar, Some(&session.id)).await, None))
            }
        }
    }

    pub async fn is_logged_in_at(
        &self,
        jar: CookieJar,
        now: DateTime<Utc>,
    ) -> AuthResult<(CookieJar, bool)> {
        let (jar, session) = self.authenticated_at(jar, now).await?;
        Ok((jar, session.is_some()))
    }

    pub async fn is_logged_in(&self, jar: CookieJar) -> AuthResult<(CookieJar, bool)> {
        self.is_logged_in_at(jar, Utc::now()).await
    }

    /// Id of the logged-in user, if any
    pub async fn current_user_id(&self, jar: CookieJar) -> AuthResult<(CookieJar, Option<UserId>)> {
        let (jar, session) = self.authenticated_at(jar, Utc::now()).await?;
        Ok((jar, session.and_then(|s| s.user_id())))
    }

    /// Start a fresh session for `user`
    ///
    /// The login redirect of a preceding live session is carried over and
    /// the old record is removed, expired or not.
    pub async fn login(&self, jar: CookieJar, user: &User) -> AuthResult<CookieJar> {
        let now = Utc::now();
        let previous = match self.lookup(&jar).await? {
            Lookup::Found(session) => Some(session),
            Lookup::Absent | Lookup::Invalid(_) => None,
        };

        let mut session = Session::new(SessionId::generate(), now);
        session.set_user_id(user.id);
        session.set_csrf_token(random_string(TOKEN_LEN));
        if let Some(previous) = previous.as_ref().filter(|p| self.is_live_at(p, now)) {
            session.set_login_redirect(previous.login_redirect());
        }
        self.store.save(&session).await?;

        if let Some(previous) = previous {
            if let Err(e) = self.store.delete(&previous.id).await {
                tracing::warn!(error = %e, session_id = %previous.id, "Failed to delete replaced session");
            }
        }

        tracing::info!(user_id = %user.id, session_id = %session.id, "Session started");
        Ok(self.issue_cookies(jar, &session))
    }

    /// Invalidate both cookies and remove the record
    pub async fn destroy(&self, jar: CookieJar) -> CookieJar {
        let id = jar
            .get(LOGIN_COOKIE)
            .and_then(|c| self.signer.unsign(c.value()))
            .and_then(SessionId::parse);
        self.discard(jar, id.as_ref()).await
    }

    // ===== Stored values =====

    pub async fn set_login_redirect(&self, jar: CookieJar, redirect: &str) -> AuthResult<CookieJar> {
        let (jar, mut session) = self.load_or_create_at(jar, Utc::now()).await?;
        session.set_login_redirect(redirect);
        self.store.save(&session).await?;
        Ok(jar)
    }

    /// Stored login redirect, `/` when unset
    pub async fn login_redirect(&self, jar: &CookieJar) -> AuthResult<String> {
        Ok(self
            .existing(jar)
            .await?
            .map(|s| s.login_redirect().to_string())
            .unwrap_or_else(|| DEFAULT_LOGIN_REDIRECT.to_string()))
    }

    pub async fn set_sso_state(&self, jar: CookieJar, state: &str) -> AuthResult<CookieJar> {
        let (jar, mut session) = self.load_or_create_at(jar, Utc::now()).await?;
        session.set_sso_state(state);
        self.store.save(&session).await?;
        Ok(jar)
    }

    /// Stored SSO state, empty when unset
    pub async fn sso_state(&self, jar: &CookieJar) -> AuthResult<String> {
        Ok(self
            .existing(jar)
            .await?
            .map(|s| s.sso_state().to_string())
            .unwrap_or_default())
    }

    /// Issue a new SSO state token and store it in the session
    pub async fn issue_sso_state(&self, jar: CookieJar) -> AuthResult<(CookieJar, String)> {
        let state = random_string(TOKEN_LEN);
        let jar = self.set_sso_state(jar, &state).await?;
        Ok((jar, state))
    }

    /// Compare `state` with the stored value and clear it
    pub async fn verify_sso_state(&self, jar: &CookieJar, state: &str) -> AuthResult<bool> {
        let Some(mut session) = self.existing(jar).await? else {
            return Ok(false);
        };
        let stored = session.sso_state().to_string();
        session.set_sso_state("");
        self.store.save(&session).await?;
        Ok(!stored.is_empty() && constant_time_eq(stored.as_bytes(), state.as_bytes()))
    }

    /// CSRF token of the current session, creating session and token as needed
    pub async fn csrf_token(&self, jar: CookieJar) -> AuthResult<(CookieJar, String)> {
        let (jar, mut session) = self.load_or_create_at(jar, Utc::now()).await?;
        if let Some(token) = session.csrf_token() {
            return Ok((jar, token.to_string()));
        }

        let token = random_string(TOKEN_LEN);
        session.set_csrf_token(token.clone());
        self.store.save(&session).await?;
        Ok((jar, token))
    }

    /// Check a submitted CSRF token
    ///
    /// Passes when there is no session yet or the session never issued a
    /// token; otherwise the tokens must match.
    pub async fn verify_csrf_token(&self, jar: &CookieJar, token: Option<&str>) -> AuthResult<bool> {
        let Some(session) = self.existing(jar).await? else {
            return Ok(true);
        };
        match session.csrf_token() {
            None => Ok(true),
            Some(expected) => Ok(token
                .is_some_and(|t| constant_time_eq(expected.as_bytes(), t.as_bytes()))),
        }
    }

    // ===== Maintenance =====

    /// Remove every session record older than the window
    pub async fn clean_sessions(&self) -> AuthResult<u64> {
        let cutoff = Utc::now() - self.config.session_window_chrono();
        let removed = self.store.clean_expired(cutoff).await?;
        tracing::info!(sessions_deleted = removed, "Session cleanup completed");
        Ok(removed)
    }

    /// Run [`clean_sessions`](Self::clean_sessions) periodically until `shutdown` fires
    pub fn spawn_cleaner(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let period = self.config.session_clean_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately; startup already cleaned
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = self.clean_sessions().await {
                            tracing::warn!(error = %e, "Periodic session cleanup failed");
                        }
                    }
                }
            }
            tracing::debug!("Session cleaner stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::FileSessionStore;
    use chrono::Duration;
    use platform::password::HashedPassword;

    async fn controller() -> (tempfile::TempDir, SessionController<FileSessionStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::open(dir.path()).await.unwrap();
        let config = AuthConfig::development().with_session_dir(dir.path());
        (dir, SessionController::new(Arc::new(store), Arc::new(config)))
    }

    fn user() -> User {
        let mut u = User::new("test1", HashedPassword::from_db("x"), "test1@example.com");
        u.id = UserId::new(1);
        u
    }

    #[tokio::test]
    async fn test_login_then_logged_in() {
        let (_dir, sessions) = controller().await;
        let jar = sessions.login(CookieJar::new(), &user()).await.unwrap();

        assert!(jar.get(LOGIN_COOKIE).is_some());
        assert!(jar.get(USER_COOKIE).is_some());

        let (jar, logged_in) = sessions.is_logged_in(jar).await.unwrap();
        assert!(logged_in);
        let (_, user_id) = sessions.current_user_id(jar).await.unwrap();
        assert_eq!(user_id, Some(UserId::new(1)));
    }

    #[tokio::test]
    async fn test_session_expires_after_window() {
        let (_dir, sessions) = controller().await;
        let jar = sessions.login(CookieJar::new(), &user()).await.unwrap();

        let later = Utc::now() + Duration::hours(168) + Duration::seconds(1);
        let (jar, logged_in) = sessions.is_logged_in_at(jar, later).await.unwrap();
        assert!(!logged_in);
        assert!(jar.get(LOGIN_COOKIE).is_none());
        assert!(jar.get(USER_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_tampered_cookie_is_rejected() {
        let (_dir, sessions) = controller().await;
        let jar = sessions.login(CookieJar::new(), &user()).await.unwrap();

        let forged = format!("{}.AAAA", SessionId::generate());
        let jar = jar.add(axum_extra::extract::cookie::Cookie::new(LOGIN_COOKIE, forged));
        let (_, logged_in) = sessions.is_logged_in(jar).await.unwrap();
        assert!(!logged_in);
    }

    #[tokio::test]
    async fn test_anonymous_session_is_not_logged_in() {
        let (_dir, sessions) = controller().await;
        let jar = sessions
            .set_login_redirect(CookieJar::new(), "/authorize?app=1")
            .await
            .unwrap();

        let (jar, logged_in) = sessions.is_logged_in(jar).await.unwrap();
        assert!(!logged_in);
        // Still there: anonymous sessions are not destroyed
        assert_eq!(sessions.login_redirect(&jar).await.unwrap(), "/authorize?app=1");
    }

    #[tokio::test]
    async fn test_login_carries_redirect_over() {
        let (_dir, sessions) = controller().await;
        let jar = sessions
            .set_login_redirect(CookieJar::new(), "/authorize?app=1")
            .await
            .unwrap();
        let jar = sessions.login(jar, &user()).await.unwrap();

        assert_eq!(sessions.login_redirect(&jar).await.unwrap(), "/authorize?app=1");
    }

    #[tokio::test]
    async fn test_defaults_without_session() {
        let (_dir, sessions) = controller().await;
        let jar = CookieJar::new();
        assert_eq!(sessions.login_redirect(&jar).await.unwrap(), "/");
        assert_eq!(sessions.sso_state(&jar).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_expired_session_values_are_not_read() {
        let (_dir, sessions) = controller().await;
        let stale = Utc::now() - Duration::hours(168) - Duration::seconds(1);
        let (jar, mut session) = sessions
            .load_or_create_at(CookieJar::new(), stale)
            .await
            .unwrap();
        session.set_login_redirect("/authorize?app=1");
        session.set_csrf_token(random_string(TOKEN_LEN));
        session.set_sso_state("old-state");
        sessions.store.save(&session).await.unwrap();

        assert_eq!(sessions.login_redirect(&jar).await.unwrap(), "/");
        assert_eq!(sessions.sso_state(&jar).await.unwrap(), "");
        assert!(sessions.verify_csrf_token(&jar, None).await.unwrap());
        assert!(!sessions.verify_sso_state(&jar, "old-state").await.unwrap());

        let jar = sessions.login(jar, &user()).await.unwrap();
        assert_eq!(sessions.login_redirect(&jar).await.unwrap(), "/");
        assert!(sessions.store.load(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sso_state_round_trip() {
        let (_dir, sessions) = controller().await;
        let (jar, state) = sessions.issue_sso_state(CookieJar::new()).await.unwrap();
        assert_eq!(sessions.sso_state(&jar).await.unwrap(), state);

        assert!(!sessions.verify_sso_state(&jar, "wrong").await.unwrap());
        // The state is single-use
        assert!(!sessions.verify_sso_state(&jar, &state).await.unwrap());
    }

    #[tokio::test]
    async fn test_csrf_token() {
        let (_dir, sessions) = controller().await;
        assert!(sessions.verify_csrf_token(&CookieJar::new(), None).await.unwrap());

        let (jar, token) = sessions.csrf_token(CookieJar::new()).await.unwrap();
        let (jar, again) = sessions.csrf_token(jar).await.unwrap();
        assert_eq!(token, again);

        assert!(sessions.verify_csrf_token(&jar, Some(&token)).await.unwrap());
        assert!(!sessions.verify_csrf_token(&jar, Some("forged")).await.unwrap());
        assert!(!sessions.verify_csrf_token(&jar, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_destroy() {
        let (_dir, sessions) = controller().await;
        let jar = sessions.login(CookieJar::new(), &user()).await.unwrap();
        let jar = sessions.destroy(jar).await;

        let (_, logged_in) = sessions.is_logged_in(jar).await.unwrap();
        assert!(!logged_in);
    }

    #[tokio::test]
    async fn test_clean_sessions_keeps_fresh_records() {
        let (_dir, sessions) = controller().await;
        let jar = sessions.login(CookieJar::new(), &user()).await.unwrap();

        assert_eq!(sessions.clean_sessions().await.unwrap(), 0);
        let (_, logged_in) = sessions.is_logged_in(jar).await.unwrap();
        assert!(logged_in);
    }
}
