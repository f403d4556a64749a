//! Authorization Resolver
//!
//! Computes the effective role set of a hydrated user:
//!
//! - direct user roles that are granted and whose role is active
//! - roles of every active group the user is an active member of, where the
//!   group role is granted and its role is active
//!
//! `granted = false` never subtracts; it just does not contribute. Auto-added
//! flags play no part. The result is a pure function of the user value.

use std::collections::BTreeSet;

use crate::domain::entity::User;

/// Role names effectively granted to `user`
pub fn effective_roles(user: &User) -> BTreeSet<String> {
    let direct = user
        .user_roles
        .iter()
        .filter(|ur| ur.is_effective())
        .map(|ur| ur.role.name.clone());

    let inherited = user
        .groups
        .iter()
        .filter(|g| g.active)
        .flat_map(|g| g.group_roles.iter())
        .filter(|gr| gr.is_effective())
        .map(|gr| gr.role.name.clone());

    direct.chain(inherited).collect()
}

pub fn has_role(user: &User, name: &str) -> bool {
    effective_roles(user).contains(name)
}

pub fn has_any_role<S: AsRef<str>>(user: &User, names: &[S]) -> bool {
    let roles = effective_roles(user);
    names.iter().any(|n| roles.contains(n.as_ref()))
}

/// True for an empty `names`
pub fn has_all_roles<S: AsRef<str>>(user: &User, names: &[S]) -> bool {
    let roles = effective_roles(user);
    names.iter().all(|n| roles.contains(n.as_ref()))
}

/// Required names the user does not hold, in input order
pub fn missing_roles<S: AsRef<str>>(user: &User, names: &[S]) -> Vec<String> {
    let roles = effective_roles(user);
    names
        .iter()
        .map(AsRef::as_ref)
        .filter(|n| !roles.contains(*n))
        .map(str::to_string)
        .collect()
}
