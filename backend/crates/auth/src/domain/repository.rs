//! Repository Traits
//!
//! The persistence port. Implementations live in the infrastructure layer
//! (`MySqlStore`, `MemoryStore`).
//!
//! Conventions shared by every entity:
//! - `load_all_*` returns rows ordered by id ascending
//! - `load_*` fails with `NotFound` when the id is absent
//! - `save_*` inserts when the id is unsaved, otherwise updates in place,
//!   and returns the entity with assigned ids
//! - `delete_*` cascades to owned rows and is a no-op when the id is absent

use kernel::id::{
    AccountId, ApplicationId, CharacterId, CorporationId, GroupId, GroupRoleId, RoleId,
    UserId, UserRoleId,
};
use platform::password::HashedPassword;
use serde_json::{Map, Value};

use crate::domain::entity::{
    Account, Application, Character, Corporation, CsrfFailure, Group, GroupRole, LoginAttempt,
    Role, Session, User, UserRole, session::SessionId,
};
use crate::error::AuthResult;

/// User aggregate repository
#[trait_variant::make(UserRepository: Send)]
pub trait LocalUserRepository {
    async fn load_all_users(&self) -> AuthResult<Vec<User>>;

    /// Load a fully hydrated user
    async fn load_user(&self, id: UserId) -> AuthResult<User>;

    async fn load_user_by_username(&self, username: &str) -> AuthResult<User>;

    /// Load only the password digest (login path)
    async fn load_password_for_user(&self, username: &str) -> AuthResult<HashedPassword>;

    async fn query_user_id_exists(&self, id: UserId) -> AuthResult<bool>;

    async fn query_username_or_email_exists(&self, username: &str, email: &str)
    -> AuthResult<bool>;

    /// Save the user with its accounts, characters and user roles, and
    /// reconcile group memberships, in one transaction
    async fn save_user(&self, user: User) -> AuthResult<User>;

    /// Delete the user with memberships, user roles, accounts and characters
    async fn delete_user(&self, id: UserId) -> AuthResult<()>;

    /// Groups with an active membership, roles populated
    async fn load_groups_for_user(&self, id: UserId) -> AuthResult<Vec<Group>>;

    /// Groups without an active membership, ordered by name
    async fn load_available_groups_for_user(&self, id: UserId) -> AuthResult<Vec<Group>>;

    async fn remove_user_from_group(&self, user_id: UserId, group_id: GroupId)
    -> AuthResult<User>;

    /// Delete the account with this api key id and strip it from `user`
    async fn remove_api_key_from_user(&self, user: User, api_key_id: i64) -> AuthResult<User>;
}

/// Account repository
#[trait_variant::make(AccountRepository: Send)]
pub trait LocalAccountRepository {
    async fn load_all_accounts(&self) -> AuthResult<Vec<Account>>;

    async fn load_account(&self, id: AccountId) -> AuthResult<Account>;

    async fn load_accounts_for_user(&self, user_id: UserId) -> AuthResult<Vec<Account>>;

    async fn save_account(&self, account: Account) -> AuthResult<Account>;

    async fn delete_account(&self, id: AccountId) -> AuthResult<()>;
}

/// Character repository
#[trait_variant::make(CharacterRepository: Send)]
pub trait LocalCharacterRepository {
    async fn load_all_characters(&self) -> AuthResult<Vec<Character>>;

    async fn load_character(&self, id: CharacterId) -> AuthResult<Character>;

    async fn load_characters_for_account(&self, account_id: AccountId)
    -> AuthResult<Vec<Character>>;

    async fn save_character(&self, character: Character) -> AuthResult<Character>;

    async fn delete_character(&self, id: CharacterId) -> AuthResult<()>;
}

/// Corporation repository
#[trait_variant::make(CorporationRepository: Send)]
pub trait LocalCorporationRepository {
    async fn load_all_corporations(&self) -> AuthResult<Vec<Corporation>>;

    async fn load_corporation(&self, id: CorporationId) -> AuthResult<Corporation>;

    async fn load_corporation_by_eve_id(&self, eve_corporation_id: i64)
    -> AuthResult<Corporation>;

    async fn save_corporation(&self, corporation: Corporation) -> AuthResult<Corporation>;

    /// Fails with `Conflict` while characters still reference it
    async fn delete_corporation(&self, id: CorporationId) -> AuthResult<()>;
}

/// Role repository
#[trait_variant::make(RoleRepository: Send)]
pub trait LocalRoleRepository {
    async fn load_all_roles(&self) -> AuthResult<Vec<Role>>;

    async fn load_role(&self, id: RoleId) -> AuthResult<Role>;

    async fn save_role(&self, role: Role) -> AuthResult<Role>;

    /// Delete the role and every binding referencing it; locked roles are
    /// refused with `Conflict`
    async fn delete_role(&self, id: RoleId) -> AuthResult<()>;
}

/// User-role binding repository
#[trait_variant::make(UserRoleRepository: Send)]
pub trait LocalUserRoleRepository {
    async fn load_all_user_roles(&self) -> AuthResult<Vec<UserRole>>;

    async fn load_user_role(&self, id: UserRoleId) -> AuthResult<UserRole>;

    async fn load_user_roles_for_user(&self, user_id: UserId) -> AuthResult<Vec<UserRole>>;

    /// Roles with no binding to the user, ordered by name
    async fn load_available_user_roles_for_user(&self, user_id: UserId)
    -> AuthResult<Vec<Role>>;

    async fn save_user_role(&self, user_role: UserRole) -> AuthResult<UserRole>;

    async fn delete_user_role(&self, id: UserRoleId) -> AuthResult<()>;

    /// Delete the binding by its own id and return the refreshed user
    async fn remove_user_role_from_user(
        &self,
        user_id: UserId,
        user_role_id: UserRoleId,
    ) -> AuthResult<User>;

    async fn toggle_user_role_granted(&self, id: UserRoleId) -> AuthResult<UserRole>;
}

/// Group repository
#[trait_variant::make(GroupRepository: Send)]
pub trait LocalGroupRepository {
    async fn load_all_groups(&self) -> AuthResult<Vec<Group>>;

    async fn load_group(&self, id: GroupId) -> AuthResult<Group>;

    /// Save the group with its group roles in one transaction
    async fn save_group(&self, group: Group) -> AuthResult<Group>;

    /// Delete the group with its bindings and memberships
    async fn delete_group(&self, id: GroupId) -> AuthResult<()>;
}

/// Group-role binding repository
#[trait_variant::make(GroupRoleRepository: Send)]
pub trait LocalGroupRoleRepository {
    async fn load_all_group_roles(&self) -> AuthResult<Vec<GroupRole>>;

    async fn load_group_role(&self, id: GroupRoleId) -> AuthResult<GroupRole>;

    async fn load_group_roles_for_group(&self, group_id: GroupId) -> AuthResult<Vec<GroupRole>>;

    /// Roles with no binding to the group, ordered by name
    async fn load_available_group_roles_for_group(
        &self,
        group_id: GroupId,
    ) -> AuthResult<Vec<Role>>;

    async fn save_group_role(&self, group_role: GroupRole) -> AuthResult<GroupRole>;

    async fn delete_group_role(&self, id: GroupRoleId) -> AuthResult<()>;

    /// Delete the binding by its own id and return the refreshed group
    async fn remove_group_role_from_group(
        &self,
        group_id: GroupId,
        group_role_id: GroupRoleId,
    ) -> AuthResult<Group>;

    async fn toggle_group_role_granted(&self, id: GroupRoleId) -> AuthResult<GroupRole>;
}

/// Application repository
#[trait_variant::make(ApplicationRepository: Send)]
pub trait LocalApplicationRepository {
    async fn load_all_applications(&self) -> AuthResult<Vec<Application>>;

    async fn load_application(&self, id: ApplicationId) -> AuthResult<Application>;

    async fn save_application(&self, application: Application) -> AuthResult<Application>;

    async fn delete_application(&self, id: ApplicationId) -> AuthResult<()>;
}

/// Append-only audit records
#[trait_variant::make(AuditRepository: Send)]
pub trait LocalAuditRepository {
    async fn record_login_attempt(&self, attempt: LoginAttempt) -> AuthResult<LoginAttempt>;

    async fn record_csrf_failure(&self, failure: CsrfFailure) -> AuthResult<CsrfFailure>;

    /// Attempts for a username, oldest first
    async fn load_login_attempts_for_username(
        &self,
        username: &str,
    ) -> AuthResult<Vec<LoginAttempt>>;
}

/// Escape hatch for administrative tooling
#[trait_variant::make(RawQueryRepository: Send)]
pub trait LocalRawQueryRepository {
    /// Run `sql` with positional arguments; driver errors surface unmodified
    async fn raw_query(&self, sql: &str, args: Vec<Value>)
    -> AuthResult<Vec<Map<String, Value>>>;
}

/// Everything the service needs from a store
pub trait Persistence:
    UserRepository
    + AccountRepository
    + CharacterRepository
    + CorporationRepository
    + RoleRepository
    + UserRoleRepository
    + GroupRepository
    + GroupRoleRepository
    + ApplicationRepository
    + AuditRepository
    + RawQueryRepository
    + Clone
    + Send
    + Sync
    + 'static
{
}

impl<T> Persistence for T where
    T: UserRepository
        + AccountRepository
        + CharacterRepository
        + CorporationRepository
        + RoleRepository
        + UserRoleRepository
        + GroupRepository
        + GroupRoleRepository
        + ApplicationRepository
        + AuditRepository
        + RawQueryRepository
        + Clone
        + Send
        + Sync
        + 'static
{
}

/// Session record store
#[trait_variant::make(SessionRepository: Send)]
pub trait LocalSessionRepository {
    /// `None` when no record exists; unreadable records are `SessionCorrupted`
    async fn load(&self, id: &SessionId) -> AuthResult<Option<Session>>;

    /// Atomically replace the record
    async fn save(&self, session: &Session) -> AuthResult<()>;

    /// Remove the record; absent records are ignored
    async fn delete(&self, id: &SessionId) -> AuthResult<()>;

    /// Remove records created before `cutoff` or without a valid timestamp;
    /// returns how many were removed
    async fn clean_expired(&self, cutoff: chrono::DateTime<chrono::Utc>) -> AuthResult<u64>;
}
