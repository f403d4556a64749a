//! Common ID Types
//!
//! Type-safe 64-bit ID wrappers for domain entities.
//!
//! A value of zero or below means the entity has not been persisted yet;
//! the persistence layer assigns positive identifiers on first save.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Generic typed ID wrapper
///
/// Usage:
/// ```
/// use kernel::id::{Id, markers};
/// type UserId = Id<markers::User>;
///
/// let id = UserId::new(3);
/// assert!(id.is_persisted());
/// assert!(!UserId::unsaved().is_persisted());
/// ```
pub struct Id<T> {
    value: i64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    /// Wrap an existing identifier
    pub const fn new(value: i64) -> Self {
        Self {
            value,
            _marker: PhantomData,
        }
    }

    /// Identifier of an entity that has not been saved yet
    pub const fn unsaved() -> Self {
        Self::new(0)
    }

    /// Get the underlying integer
    pub const fn get(&self) -> i64 {
        self.value
    }

    /// Whether the persistence layer has assigned this ID
    pub const fn is_persisted(&self) -> bool {
        self.value > 0
    }
}

// Manual impls: derives would put bounds on the marker type.

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> Default for Id<T> {
    fn default() -> Self {
        Self::unsaved()
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.value)
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T> From<i64> for Id<T> {
    fn from(value: i64) -> Self {
        Self::new(value)
    }
}

impl<T> From<Id<T>> for i64 {
    fn from(id: Id<T>) -> Self {
        id.value
    }
}

impl<T> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.value)
    }
}

impl<'de, T> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        i64::deserialize(deserializer).map(Self::new)
    }
}

/// Marker types for different entity IDs
pub mod markers {
    pub struct User;
    pub struct Account;
    pub struct Character;
    pub struct Corporation;
    pub struct Role;
    pub struct GroupRole;
    pub struct UserRole;
    pub struct Group;
    pub struct Application;
    pub struct LoginAttempt;
    pub struct CsrfFailure;
}

/// Type aliases for common IDs
pub type UserId = Id<markers::User>;
pub type AccountId = Id<markers::Account>;
pub type CharacterId = Id<markers::Character>;
pub type CorporationId = Id<markers::Corporation>;
pub type RoleId = Id<markers::Role>;
pub type GroupRoleId = Id<markers::GroupRole>;
pub type UserRoleId = Id<markers::UserRole>;
pub type GroupId = Id<markers::Group>;
pub type ApplicationId = Id<markers::Application>;
pub type LoginAttemptId = Id<markers::LoginAttempt>;
pub type CsrfFailureId = Id<markers::CsrfFailure>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsaved_ids() {
        assert!(!UserId::unsaved().is_persisted());
        assert!(!UserId::new(-1).is_persisted());
        assert!(UserId::new(1).is_persisted());
        assert_eq!(GroupId::default().get(), 0);
    }

    #[test]
    fn test_id_ordering() {
        let mut ids = vec![RoleId::new(3), RoleId::new(1), RoleId::new(2)];
        ids.sort();
        assert_eq!(ids, vec![RoleId::new(1), RoleId::new(2), RoleId::new(3)]);
    }

    #[test]
    fn test_id_serializes_as_integer() {
        let json = serde_json::to_string(&CharacterId::new(42)).unwrap();
        assert_eq!(json, "42");

        let id: CharacterId = serde_json::from_str("7").unwrap();
        assert_eq!(id.get(), 7);
    }
}
