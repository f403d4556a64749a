//! Sign In Use Case
//!
//! Checks a username and password and records the attempt. Session
//! creation is left to the caller, which owns the cookies.

use std::sync::Arc;

use platform::client::ClientInfo;
use platform::password::ClearTextPassword;
use tokio_util::sync::CancellationToken;

use crate::application::cancel::cancellable;
use crate::domain::entity::{LoginAttempt, User};
use crate::domain::repository::Persistence;
use crate::error::{AuthError, AuthResult};

/// Sign in input
pub struct SignInInput {
    pub username: String,
    pub password: String,
}

/// Sign in use case
pub struct SignInUseCase<R>
where
    R: Persistence,
{
    repo: Arc<R>,
}

impl<R> SignInUseCase<R>
where
    R: Persistence,
{
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Authenticate and return the hydrated user
    ///
    /// Unknown usernames and wrong passwords are indistinguishable to the
    /// caller. Every attempt is recorded; a failure to record it is logged
    /// and otherwise ignored.
    pub async fn execute(
        &self,
        input: SignInInput,
        client: &ClientInfo,
        token: &CancellationToken,
    ) -> AuthResult<User> {
        let stored = match cancellable(token, self.repo.load_password_for_user(&input.username)).await
        {
            Ok(hash) => Some(hash),
            Err(AuthError::NotFound { .. }) => None,
            Err(e) => return Err(e),
        };

        // bcrypt is slow and cannot be interrupted once started
        let password_valid = match stored {
            Some(hash) => {
                let password = input.password;
                tokio::task::spawn_blocking(move || hash.verify(&ClearTextPassword::new(password)))
                    .await?
            }
            None => false,
        };

        let attempt = LoginAttempt::new(&input.username, client, password_valid);
        if let Err(e) = cancellable(token, self.repo.record_login_attempt(attempt)).await {
            tracing::error!(error = %e, username = %input.username, "Failed to record login attempt");
        }

        if !password_valid {
            return Err(AuthError::InvalidCredentials);
        }

        let user = cancellable(token, self.repo.load_user_by_username(&input.username)).await?;
        if !user.active {
            return Err(AuthError::AccountDisabled);
        }

        tracing::info!(user_id = %user.id, "User signed in");
        Ok(user)
    }
}
