//! Request Scope Middleware
//!
//! Gives each request a cancellation token derived from the process
//! shutdown token. The token is cancelled when the server shuts down or when
//! the request future is dropped (client went away).

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::{FromRequestParts, State};
use axum::http::{Request, request::Parts};
use axum::middleware::Next;
use axum::response::Response;
use tokio_util::sync::CancellationToken;

/// Cancellation scope of the current request
#[derive(Debug, Clone)]
pub struct RequestScope {
    token: CancellationToken,
}

impl RequestScope {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Install a [`RequestScope`] for downstream handlers
pub async fn request_scope(
    State(shutdown): State<CancellationToken>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = shutdown.child_token();
    let _guard = token.clone().drop_guard();

    req.extensions_mut().insert(RequestScope { token });
    next.run(req).await
}

impl<S> FromRequestParts<S> for RequestScope
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Routes mounted without the middleware get an unbounded scope
        Ok(parts
            .extensions
            .get::<RequestScope>()
            .cloned()
            .unwrap_or_else(|| RequestScope {
                token: CancellationToken::new(),
            }))
    }
}
