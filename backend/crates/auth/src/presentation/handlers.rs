//! HTTP Handlers

use std::sync::Arc;

use axum::Json;
use axum::extract::{OriginalUri, Query, State};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::CookieJar;
use kernel::error::kind::ErrorKind;
use kernel::id::UserId;
use platform::client::ClientInfo;
use platform::mail::Mailer;
use tokio_util::sync::CancellationToken;

use crate::application::cancel::cancellable;
use crate::application::config::AuthConfig;
use crate::application::{
    AuthorizeInput, AuthorizeUseCase, SessionController, SignInInput, SignInUseCase,
};
use crate::domain::entity::CsrfFailure;
use crate::domain::entity::session::DEFAULT_LOGIN_REDIRECT;
use crate::domain::repository::Persistence;
use crate::error::{AuthError, AuthResult};
use crate::infra::FileSessionStore;
use crate::presentation::dto::{ApiResponse, AuthorizeQuery, LoginRequest, SsoQuery};
use crate::presentation::middleware::RequestScope;

const LOGIN_PATH: &str = "/login";

/// Shared state for auth handlers
#[derive(Clone)]
pub struct AuthAppState<R>
where
    R: Persistence,
{
    pub repo: Arc<R>,
    pub sessions: Arc<SessionController<FileSessionStore>>,
    pub config: Arc<AuthConfig>,
    /// Outbound mail, available to handlers that notify users
    pub mailer: Arc<dyn Mailer>,
    /// Root of every request's cancellation scope
    pub shutdown: CancellationToken,
}

impl<R> AuthAppState<R>
where
    R: Persistence,
{
    pub fn new(
        repo: R,
        sessions: Arc<SessionController<FileSessionStore>>,
        config: Arc<AuthConfig>,
        mailer: Arc<dyn Mailer>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            repo: Arc::new(repo),
            sessions,
            config,
            mailer,
            shutdown,
        }
    }
}

/// Logged-in user id; broken sessions are destroyed and count as logged out
///
/// Any other failure is already rendered, logged out, with the jar as given.
async fn login_state<R>(
    state: &AuthAppState<R>,
    jar: CookieJar,
    token: &CancellationToken,
) -> Result<(CookieJar, Option<UserId>), Response>
where
    R: Persistence,
{
    match cancellable(token, state.sessions.current_user_id(jar.clone())).await {
        Ok((jar, user_id)) => Ok((jar, user_id)),
        Err(e) if e.kind() == ErrorKind::Session => {
            tracing::warn!(error = %e, "Recovering from session error");
            Ok((state.sessions.destroy(jar).await, None))
        }
        Err(e) => Err(failure(jar, false, e)),
    }
}

/// Error envelope for a request whose login state is already known
fn failure(jar: CookieJar, logged_in: bool, err: AuthError) -> Response {
    err.log();
    (jar, err.to_app_error().into_response_for(logged_in)).into_response()
}

/// `jar` is the one to send back when `result` failed
fn render(
    jar: CookieJar,
    logged_in: bool,
    result: AuthResult<(CookieJar, ApiResponse)>,
) -> Response {
    match result {
        Ok((jar, body)) => (jar, Json(body)).into_response(),
        Err(e) => failure(jar, logged_in, e),
    }
}

// ============================================================================
// Index
// ============================================================================

/// GET /
pub async fn index<R>(
    State(state): State<AuthAppState<R>>,
    scope: RequestScope,
    jar: CookieJar,
) -> Response
where
    R: Persistence,
{
    match login_state(&state, jar, scope.token()).await {
        Ok((jar, user_id)) => (jar, Json(ApiResponse::ok(user_id.is_some()))).into_response(),
        Err(response) => response,
    }
}

// ============================================================================
// Login
// ============================================================================

/// GET /login
pub async fn login_get<R>(
    State(state): State<AuthAppState<R>>,
    scope: RequestScope,
    jar: CookieJar,
) -> Response
where
    R: Persistence,
{
    let token = scope.token();
    let (jar, user_id) = match login_state(&state, jar, token).await {
        Ok(resolved) => resolved,
        Err(response) => return response,
    };
    let logged_in = user_id.is_some();

    let result: AuthResult<(CookieJar, ApiResponse)> = async {
        if logged_in {
            let redirect = cancellable(token, state.sessions.login_redirect(&jar)).await?;
            return Ok((jar.clone(), ApiResponse::ok(true).with_redirect(redirect)));
        }

        let (jar, csrf_token) = cancellable(token, state.sessions.csrf_token(jar.clone())).await?;
        Ok((jar, ApiResponse::ok(false).with_csrf_token(csrf_token)))
    }
    .await;

    render(jar, logged_in, result)
}

/// POST /login
pub async fn login_post<R>(
    State(state): State<AuthAppState<R>>,
    scope: RequestScope,
    client: ClientInfo,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Response
where
    R: Persistence,
{
    let token = scope.token();
    let (jar, user_id) = match login_state(&state, jar, token).await {
        Ok(resolved) => resolved,
        Err(response) => return response,
    };

    let result: AuthResult<(CookieJar, ApiResponse)> = async {
        let csrf_valid = cancellable(
            token,
            state.sessions.verify_csrf_token(&jar, req.csrf_token.as_deref()),
        )
        .await?;
        if !csrf_valid {
            let request = serde_json::json!({
                "method": "POST",
                "path": LOGIN_PATH,
                "username": req.username,
                "remoteAddr": client.remote_addr(),
                "userAgent": client.user_agent(),
            });
            let record = CsrfFailure::new(user_id, request.to_string());
            if let Err(e) = cancellable(token, state.repo.record_csrf_failure(record)).await {
                tracing::error!(error = %e, "Failed to record CSRF failure");
            }
            return Err(AuthError::CsrfMismatch);
        }

        let input = SignInInput {
            username: req.username,
            password: req.password,
        };
        let user = SignInUseCase::new(state.repo.clone())
            .execute(input, &client, token)
            .await?;

        let jar = cancellable(token, state.sessions.login(jar.clone(), &user)).await?;
        let redirect = cancellable(token, state.sessions.login_redirect(&jar)).await?;
        Ok((jar, ApiResponse::ok(true).with_redirect(redirect)))
    }
    .await;

    render(jar, user_id.is_some(), result)
}

/// GET /logout
pub async fn logout<R>(
    State(state): State<AuthAppState<R>>,
    jar: CookieJar,
) -> (CookieJar, Json<ApiResponse>)
where
    R: Persistence,
{
    let jar = state.sessions.destroy(jar).await;
    (
        jar,
        Json(ApiResponse::ok(false).with_redirect(DEFAULT_LOGIN_REDIRECT)),
    )
}

/// GET /login/sso
///
/// Without `state` a fresh SSO state is issued; with `state` it is checked
/// against the session and consumed.
pub async fn login_sso<R>(
    State(state): State<AuthAppState<R>>,
    scope: RequestScope,
    jar: CookieJar,
    Query(query): Query<SsoQuery>,
) -> Response
where
    R: Persistence,
{
    let token = scope.token();
    let (jar, user_id) = match login_state(&state, jar, token).await {
        Ok(resolved) => resolved,
        Err(response) => return response,
    };
    let logged_in = user_id.is_some();

    let result: AuthResult<(CookieJar, ApiResponse)> = async {
        match query.state {
            None => {
                let (jar, sso_state) =
                    cancellable(token, state.sessions.issue_sso_state(jar.clone())).await?;
                Ok((jar, ApiResponse::ok(logged_in).with_state(sso_state)))
            }
            Some(sso_state) => {
                if !cancellable(token, state.sessions.verify_sso_state(&jar, &sso_state)).await? {
                    return Err(AuthError::CsrfMismatch);
                }
                Ok((jar.clone(), ApiResponse::ok(logged_in)))
            }
        }
    }
    .await;

    render(jar, logged_in, result)
}

// ============================================================================
// Authorize
// ============================================================================

/// GET /authorize
pub async fn authorize<R>(
    State(state): State<AuthAppState<R>>,
    scope: RequestScope,
    OriginalUri(uri): OriginalUri,
    jar: CookieJar,
    Query(query): Query<AuthorizeQuery>,
) -> Response
where
    R: Persistence,
{
    let token = scope.token();
    let (jar, user_id) = match login_state(&state, jar, token).await {
        Ok(resolved) => resolved,
        Err(response) => return response,
    };

    let Some(user_id) = user_id else {
        let redirect = uri.to_string();
        let result = cancellable(token, state.sessions.set_login_redirect(jar.clone(), &redirect))
            .await
            .map(|jar| (jar, ApiResponse::declined(false).with_redirect(LOGIN_PATH)));
        return render(jar, false, result);
    };

    let result: AuthResult<(CookieJar, ApiResponse)> = async {
        if !query.is_complete() {
            return Err(AuthError::SignatureMismatch);
        }

        let input = AuthorizeInput {
            app: query.app,
            callback: query.callback,
            auth: query.auth,
            roles: query.roles,
        };
        let redirect = AuthorizeUseCase::new(state.repo.clone())
            .execute(user_id, input, token)
            .await?;
        Ok((jar.clone(), ApiResponse::ok(true).with_redirect(redirect)))
    }
    .await;

    render(jar, true, result)
}
