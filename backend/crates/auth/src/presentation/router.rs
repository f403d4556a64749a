//! Auth Router

use axum::{Router, middleware, routing::get};

use crate::domain::repository::Persistence;
use crate::presentation::handlers::{self, AuthAppState};
use crate::presentation::middleware::request_scope;

/// Create the Auth router for any persistence implementation
pub fn auth_router<R>(state: AuthAppState<R>) -> Router
where
    R: Persistence,
{
    let shutdown = state.shutdown.clone();

    Router::new()
        .route("/", get(handlers::index::<R>))
        .route(
            "/login",
            get(handlers::login_get::<R>).post(handlers::login_post::<R>),
        )
        .route("/login/sso", get(handlers::login_sso::<R>))
        .route("/logout", get(handlers::logout::<R>))
        .route("/authorize", get(handlers::authorize::<R>))
        .layer(middleware::from_fn_with_state(shutdown, request_scope))
        .with_state(state)
}
