//! Role Entities
//!
//! A [`Role`] is a named permission atom. It reaches a user either directly
//! through a [`UserRole`] binding or through a Group's [`GroupRole`] bindings.

use kernel::id::{GroupId, GroupRoleId, RoleId, UserId, UserRoleId};
use serde::Serialize;

/// Named permission atom
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: RoleId,
    /// Unique name, e.g. `ping.all`
    pub name: String,
    pub active: bool,
    /// Locked roles cannot be removed from any binding
    pub locked: bool,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: RoleId::unsaved(),
            name: name.into(),
            active: true,
            locked: false,
        }
    }

    /// Case-insensitive name comparison
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Binding of a Role to a Group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRole {
    pub id: GroupRoleId,
    pub group_id: GroupId,
    pub role: Role,
    /// Informational only
    pub auto_added: bool,
    pub granted: bool,
}

impl GroupRole {
    pub fn new(group_id: GroupId, role: Role, granted: bool) -> Self {
        Self {
            id: GroupRoleId::unsaved(),
            group_id,
            role,
            auto_added: false,
            granted,
        }
    }

    /// Granted binding of an active role
    pub fn is_effective(&self) -> bool {
        self.granted && self.role.active
    }
}

/// Binding of a Role directly to a User
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRole {
    pub id: UserRoleId,
    pub user_id: UserId,
    pub role: Role,
    /// Informational only
    pub auto_added: bool,
    pub granted: bool,
}

impl UserRole {
    pub fn new(user_id: UserId, role: Role, granted: bool) -> Self {
        Self {
            id: UserRoleId::unsaved(),
            user_id,
            role,
            auto_added: false,
            granted,
        }
    }

    /// Granted binding of an active role
    pub fn is_effective(&self) -> bool {
        self.granted && self.role.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_named_ignores_case() {
        let role = Role::new("Ping.All");
        assert!(role.is_named("ping.all"));
        assert!(!role.is_named("ping"));
    }

    #[test]
    fn test_effective_requires_grant_and_active_role() {
        let mut role = Role::new("logistics.read");
        let binding = UserRole::new(UserId::new(1), role.clone(), true);
        assert!(binding.is_effective());

        role.active = false;
        let binding = UserRole::new(UserId::new(1), role.clone(), true);
        assert!(!binding.is_effective());

        role.active = true;
        let binding = GroupRole::new(GroupId::new(1), role, false);
        assert!(!binding.is_effective());
    }
}
