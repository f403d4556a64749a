//! Administration Use Cases
//!
//! Membership, role binding and application management on top of the
//! aggregate saves of the persistence port.

use std::sync::Arc;

use kernel::id::{CharacterId, GroupId, RoleId, UserId};
use platform::password::ClearTextPassword;
use tokio_util::sync::CancellationToken;

use crate::application::cancel::cancellable;
use crate::domain::entity::{Application, Group, GroupRole, User, UserRole};
use crate::domain::repository::Persistence;
use crate::error::{AuthError, AuthResult};

/// New settings for an existing user
pub struct UpdateUserInput {
    pub email: String,
    /// Must match the stored hash before anything changes
    pub old_password: String,
    /// Empty keeps the current password
    pub new_password: String,
}

/// Administrative operations over users, groups and roles
pub struct AdministrationUseCase<R>
where
    R: Persistence,
{
    repo: Arc<R>,
}

impl<R> AdministrationUseCase<R>
where
    R: Persistence,
{
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Add an active membership; adding an existing member is a no-op
    pub async fn add_user_to_group(
        &self,
        user_id: UserId,
        group_id: GroupId,
        token: &CancellationToken,
    ) -> AuthResult<User> {
        let mut user = cancellable(token, self.repo.load_user(user_id)).await?;
        if user.is_member_of(group_id) {
            return Ok(user);
        }

        let group = cancellable(token, self.repo.load_group(group_id)).await?;
        user.groups.push(group);
        let user = cancellable(token, self.repo.save_user(user)).await?;

        tracing::info!(user_id = %user_id, group_id = %group_id, "User added to group");
        Ok(user)
    }

    /// Change email and optionally password after re-checking the old password
    ///
    /// A changed email has to be verified again.
    pub async fn update_user(
        &self,
        user_id: UserId,
        input: UpdateUserInput,
        token: &CancellationToken,
    ) -> AuthResult<User> {
        let email = input.email.trim().to_string();
        if email.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let mut user = cancellable(token, self.repo.load_user(user_id)).await?;

        let stored = user.password.clone();
        let old_password = ClearTextPassword::new(input.old_password);
        let valid = tokio::task::spawn_blocking(move || stored.verify(&old_password)).await?;
        if !valid {
            tracing::warn!(user_id = %user_id, "Settings change with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        if !user.email.eq_ignore_ascii_case(&email) {
            // Usernames are never empty, so only the email can match
            if cancellable(token, self.repo.query_username_or_email_exists("", &email)).await? {
                return Err(AuthError::Conflict(format!(
                    "Email {} is already registered",
                    email
                )));
            }
            user.email = email;
            user.verified_email = false;
        }

        if !input.new_password.is_empty() {
            let password = ClearTextPassword::new(input.new_password);
            user.password = tokio::task::spawn_blocking(move || password.hash()).await??;
        }

        let user = cancellable(token, self.repo.save_user(user)).await?;
        tracing::info!(user_id = %user_id, "User settings updated");
        Ok(user)
    }

    /// Bind a role directly to a user
    ///
    /// `granted = false` records the binding without conferring the role.
    pub async fn grant_role_to_user(
        &self,
        user_id: UserId,
        role_id: RoleId,
        granted: bool,
        token: &CancellationToken,
    ) -> AuthResult<User> {
        let mut user = cancellable(token, self.repo.load_user(user_id)).await?;
        if user.user_roles.iter().any(|ur| ur.role.id == role_id) {
            return Err(AuthError::Conflict(format!(
                "Role {} is already bound to user {}",
                role_id, user_id
            )));
        }

        let role = cancellable(token, self.repo.load_role(role_id)).await?;
        user.user_roles.push(UserRole::new(user.id, role, granted));
        let user = cancellable(token, self.repo.save_user(user)).await?;

        tracing::info!(user_id = %user_id, role_id = %role_id, granted, "Role bound to user");
        Ok(user)
    }

    /// Bind a role to a group
    pub async fn grant_role_to_group(
        &self,
        group_id: GroupId,
        role_id: RoleId,
        granted: bool,
        token: &CancellationToken,
    ) -> AuthResult<Group> {
        let mut group = cancellable(token, self.repo.load_group(group_id)).await?;
        if group.group_roles.iter().any(|gr| gr.role.id == role_id) {
            return Err(AuthError::Conflict(format!(
                "Role {} is already bound to group {}",
                role_id, group_id
            )));
        }

        let role = cancellable(token, self.repo.load_role(role_id)).await?;
        group.group_roles.push(GroupRole::new(group.id, role, granted));
        let group = cancellable(token, self.repo.save_group(group)).await?;

        tracing::info!(group_id = %group_id, role_id = %role_id, granted, "Role bound to group");
        Ok(group)
    }

    pub async fn set_default_character(
        &self,
        user_id: UserId,
        character_id: CharacterId,
        token: &CancellationToken,
    ) -> AuthResult<User> {
        let mut user = cancellable(token, self.repo.load_user(user_id)).await?;
        if !user.set_default_character(character_id) {
            return Err(AuthError::not_found("character", character_id));
        }
        cancellable(token, self.repo.save_user(user)).await
    }

    /// Register an application maintained by an existing user
    pub async fn register_application(
        &self,
        name: &str,
        maintainer_id: UserId,
        callback: &str,
        token: &CancellationToken,
    ) -> AuthResult<Application> {
        if !cancellable(token, self.repo.query_user_id_exists(maintainer_id)).await? {
            return Err(AuthError::not_found("user", maintainer_id));
        }

        let application = Application::new(name, maintainer_id, callback)?;
        let application = cancellable(token, self.repo.save_application(application)).await?;

        tracing::info!(
            application_id = %application.id,
            maintainer_id = %maintainer_id,
            "Application registered"
        );
        Ok(application)
    }
}
