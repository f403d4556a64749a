//! Group Entity

use kernel::id::GroupId;
use serde::Serialize;

use crate::domain::entity::role::GroupRole;

/// Named set of role bindings; users join through the membership table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub active: bool,
    pub group_roles: Vec<GroupRole>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: GroupId::unsaved(),
            name: name.into(),
            active: true,
            group_roles: Vec::new(),
        }
    }

    /// Whether any binding references a role with this name (case-insensitive)
    pub fn has_role(&self, name: &str) -> bool {
        self.group_roles.iter().any(|gr| gr.role.is_named(name))
    }

    pub fn role_count(&self) -> usize {
        self.group_roles.len()
    }
}
