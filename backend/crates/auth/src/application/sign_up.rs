//! Sign Up Use Case
//!
//! Creates a new user with a bcrypt password hash.

use std::sync::Arc;

use platform::password::ClearTextPassword;
use tokio_util::sync::CancellationToken;

use crate::application::cancel::cancellable;
use crate::domain::entity::User;
use crate::domain::repository::Persistence;
use crate::error::{AuthError, AuthResult};

/// Sign up input
pub struct SignUpInput {
    pub username: String,
    pub password: String,
    pub email: String,
}

/// Sign up use case
pub struct SignUpUseCase<R>
where
    R: Persistence,
{
    repo: Arc<R>,
}

impl<R> SignUpUseCase<R>
where
    R: Persistence,
{
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    pub async fn execute(&self, input: SignUpInput, token: &CancellationToken) -> AuthResult<User> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_string();
        if username.is_empty() || email.is_empty() || input.password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        // Check if username or email is taken
        let taken = cancellable(
            token,
            self.repo.query_username_or_email_exists(&username, &email),
        )
        .await?;
        if taken {
            return Err(AuthError::Conflict(format!(
                "Username {} or its email is already registered",
                username
            )));
        }

        let password = ClearTextPassword::new(input.password);
        let hash = tokio::task::spawn_blocking(move || password.hash()).await??;

        let user = cancellable(token, self.repo.save_user(User::new(username, hash, email))).await?;

        tracing::info!(user_id = %user.id, username = %user.username, "User signed up");
        Ok(user)
    }
}
