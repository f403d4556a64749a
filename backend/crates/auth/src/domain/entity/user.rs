//! User Entity
//!
//! Aggregate root of the identity model. A hydrated User carries its
//! Accounts (each with Characters), its direct UserRoles and the Groups it
//! is an active member of.

use kernel::id::{CharacterId, GroupId, UserId};
use platform::password::HashedPassword;
use serde::Serialize;

use crate::domain::entity::{
    account::Account, character::Character, group::Group, role::UserRole,
};

/// User entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    /// Login name (unique, case-insensitive)
    pub username: String,
    /// bcrypt digest; never serialized
    #[serde(skip)]
    pub password: HashedPassword,
    /// Contact address (unique, case-insensitive)
    pub email: String,
    pub verified_email: bool,
    pub active: bool,
    pub accounts: Vec<Account>,
    pub user_roles: Vec<UserRole>,
    /// Groups with an active membership
    pub groups: Vec<Group>,
}

impl User {
    /// Create a new, unsaved user
    pub fn new(
        username: impl Into<String>,
        password: HashedPassword,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id: UserId::unsaved(),
            username: username.into(),
            password,
            email: email.into(),
            verified_email: false,
            active: true,
            accounts: Vec::new(),
            user_roles: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// Total characters across all accounts
    pub fn character_count(&self) -> usize {
        self.accounts.iter().map(Account::character_count).sum()
    }

    /// Iterate over characters of every account
    pub fn characters(&self) -> impl Iterator<Item = &Character> {
        self.accounts.iter().flat_map(|a| a.characters.iter())
    }

    pub fn default_character(&self) -> Option<&Character> {
        self.characters().find(|c| c.default_character)
    }

    /// Mark one character as the default and clear the flag everywhere else
    ///
    /// Returns false (and changes nothing) when the character does not belong
    /// to this user.
    pub fn set_default_character(&mut self, character_id: CharacterId) -> bool {
        if !self.characters().any(|c| c.id == character_id) {
            return false;
        }

        for character in self.accounts.iter_mut().flat_map(|a| a.characters.iter_mut()) {
            character.default_character = character.id == character_id;
        }
        true
    }

    pub fn is_member_of(&self, group_id: GroupId) -> bool {
        self.groups.iter().any(|g| g.id == group_id)
    }
}
