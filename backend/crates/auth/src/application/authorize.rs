//! Authorize Use Case
//!
//! Third-party applications send logged-in users here with
//! `app`, `callback` and `auth = HMAC("{app}:{callback}", secret)`. On
//! success the user is sent back to the callback with their id and an
//! encrypted payload the application can open with its secret.

use std::sync::Arc;

use kernel::id::{ApplicationId, UserId};
use platform::crypto::encrypt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::application::cancel::cancellable;
use crate::domain::authorization::{effective_roles, missing_roles};
use crate::domain::repository::Persistence;
use crate::error::{AuthError, AuthResult};

/// Authorize input (raw query parameters)
#[derive(Debug, Clone)]
pub struct AuthorizeInput {
    pub app: String,
    pub callback: String,
    pub auth: String,
    /// Comma separated role names the user must hold
    pub roles: Option<String>,
}

/// Data handed to the application, encrypted with its secret
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizationPayload {
    user_id: UserId,
    username: String,
    roles: Vec<String>,
}

fn parse_role_list(roles: Option<&str>) -> Vec<&str> {
    roles
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .collect()
}

/// Authorize use case
pub struct AuthorizeUseCase<R>
where
    R: Persistence,
{
    repo: Arc<R>,
}

impl<R> AuthorizeUseCase<R>
where
    R: Persistence,
{
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Verify the request and build the callback redirect for `user_id`
    pub async fn execute(
        &self,
        user_id: UserId,
        input: AuthorizeInput,
        token: &CancellationToken,
    ) -> AuthResult<String> {
        let app_id: i64 = input
            .app
            .parse()
            .map_err(|_| AuthError::not_found("application", &input.app))?;
        let application =
            cancellable(token, self.repo.load_application(ApplicationId::new(app_id))).await?;

        if !application.active {
            tracing::debug!(application_id = %application.id, "Inactive application");
            return Err(AuthError::AccountDisabled);
        }
        if input.callback != application.callback
            || !application.verify_request(&application.callback, &input.auth)
        {
            return Err(AuthError::SignatureMismatch);
        }

        let user = cancellable(token, self.repo.load_user(user_id)).await?;
        if !user.active {
            return Err(AuthError::AccountDisabled);
        }

        let required = parse_role_list(input.roles.as_deref());
        let missing = missing_roles(&user, &required);
        if !missing.is_empty() {
            return Err(AuthError::MissingRoles(missing));
        }

        let payload = AuthorizationPayload {
            user_id: user.id,
            username: user.username.clone(),
            roles: effective_roles(&user).into_iter().collect(),
        };
        let payload = serde_json::to_vec(&payload)
            .map_err(|e| AuthError::Internal(format!("Failed to encode payload: {}", e)))?;
        let payload = encrypt(&payload, application.secret.as_bytes())?;

        let mut redirect = application.callback_url()?;
        redirect
            .query_pairs_mut()
            .append_pair("user", &user.id.to_string())
            .append_pair("payload", &payload);

        tracing::info!(
            user_id = %user.id,
            application_id = %application.id,
            "Authorization granted"
        );
        Ok(redirect.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_role_list() {
        assert_eq!(parse_role_list(None), Vec::<&str>::new());
        assert_eq!(
            parse_role_list(Some("ping.all, logistics.read,,")),
            vec!["ping.all", "logistics.read"]
        );
    }
}
