//! In-Memory Repository Implementation
//!
//! Process-local store used when no database is configured, and by tests.
//! Every entity write works on a copy of the tables and swaps it in only
//! when the whole operation succeeded, which gives aggregate saves the same
//! all-or-nothing behavior as a database transaction. Audit rows live apart
//! from the entity tables and are appended in place.
//!
//! Constraint checks mirror the MySQL schema: unique keys (compared
//! case-insensitively, like the default collation) and foreign keys both
//! fail with `Conflict`.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use kernel::id::{
    AccountId, ApplicationId, CharacterId, CorporationId, CsrfFailureId, GroupId, GroupRoleId,
    LoginAttemptId, RoleId, UserId, UserRoleId,
};
use platform::password::HashedPassword;
use serde_json::{Map, Value};

use crate::domain::entity::{
    Account, Application, Character, Corporation, CsrfFailure, Group, GroupRole, LoginAttempt,
    Role, User, UserRole,
};
use crate::domain::repository::{
    AccountRepository, ApplicationRepository, AuditRepository, CharacterRepository,
    CorporationRepository, GroupRepository, GroupRoleRepository, RawQueryRepository,
    RoleRepository, UserRepository, UserRoleRepository,
};
use crate::error::{AuthError, AuthResult};

// ============================================================================
// Tables
// ============================================================================

#[derive(Debug, Clone)]
struct Table<R> {
    rows: BTreeMap<i64, R>,
    last_id: i64,
}

impl<R> Default for Table<R> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            last_id: 0,
        }
    }
}

impl<R> Table<R> {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn get(&self, id: i64) -> Option<&R> {
        self.rows.get(&id)
    }

    fn contains(&self, id: i64) -> bool {
        self.rows.contains_key(&id)
    }

    /// Insert under a fresh id when `id` is unsaved, otherwise replace an
    /// existing row
    fn upsert(&mut self, id: i64, table: &'static str, row: R) -> AuthResult<i64> {
        if id > 0 {
            if !self.contains(id) {
                return Err(AuthError::not_found(table, id));
            }
            self.rows.insert(id, row);
            Ok(id)
        } else {
            let id = self.next_id();
            self.rows.insert(id, row);
            Ok(id)
        }
    }

    fn iter(&self) -> impl Iterator<Item = (i64, &R)> {
        self.rows.iter().map(|(id, row)| (*id, row))
    }

    fn retain(&mut self, mut keep: impl FnMut(&R) -> bool) {
        self.rows.retain(|_, row| keep(row));
    }
}

#[derive(Debug, Clone)]
struct UserRow {
    username: String,
    password: HashedPassword,
    email: String,
    verified_email: bool,
    active: bool,
}

#[derive(Debug, Clone)]
struct AccountRow {
    user_id: i64,
    api_key_id: i64,
    api_vcode: String,
    api_access_mask: i64,
    active: bool,
}

/// Row of `userroles` or `grouproles`
#[derive(Debug, Clone)]
struct BindingRow {
    owner_id: i64,
    role_id: i64,
    auto_added: bool,
    granted: bool,
}

#[derive(Debug, Clone)]
struct GroupRow {
    name: String,
    active: bool,
}

#[derive(Debug, Clone)]
struct MembershipRow {
    user_id: i64,
    group_id: i64,
    active: bool,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    users: Table<UserRow>,
    accounts: Table<AccountRow>,
    characters: Table<Character>,
    corporations: Table<Corporation>,
    roles: Table<Role>,
    user_roles: Table<BindingRow>,
    group_roles: Table<BindingRow>,
    groups: Table<GroupRow>,
    memberships: Table<MembershipRow>,
    applications: Table<Application>,
}

/// Append-only audit rows, outside the copy-on-write entity tables
#[derive(Debug, Default)]
struct AuditLog {
    login_attempts: Table<LoginAttempt>,
    csrf_failures: Table<CsrfFailure>,
}

fn conflict(message: String) -> AuthError {
    AuthError::Conflict(message)
}

fn sort_by_name<T>(items: &mut [T], name: impl Fn(&T) -> (String, i64)) {
    items.sort_by_key(|item| name(item));
}

impl Tables {
    // ===== Hydration =====

    fn role(&self, id: i64) -> AuthResult<Role> {
        self.roles
            .get(id)
            .cloned()
            .ok_or_else(|| AuthError::not_found("role", id))
    }

    fn character(&self, id: i64) -> AuthResult<Character> {
        self.characters
            .get(id)
            .cloned()
            .ok_or_else(|| AuthError::not_found("character", id))
    }

    fn characters_for_account(&self, account_id: i64) -> Vec<Character> {
        self.characters
            .iter()
            .filter(|(_, c)| c.account_id.get() == account_id)
            .map(|(_, c)| c.clone())
            .collect()
    }

    fn account(&self, id: i64) -> AuthResult<Account> {
        let row = self
            .accounts
            .get(id)
            .ok_or_else(|| AuthError::not_found("account", id))?;
        Ok(Account {
            id: AccountId::new(id),
            user_id: UserId::new(row.user_id),
            api_key_id: row.api_key_id,
            api_vcode: row.api_vcode.clone(),
            api_access_mask: row.api_access_mask,
            active: row.active,
            characters: self.characters_for_account(id),
        })
    }

    fn accounts_for_user(&self, user_id: i64) -> AuthResult<Vec<Account>> {
        self.accounts
            .iter()
            .filter(|(_, a)| a.user_id == user_id)
            .map(|(id, _)| self.account(id))
            .collect()
    }

    fn user_role(&self, id: i64) -> AuthResult<UserRole> {
        let row = self
            .user_roles
            .get(id)
            .ok_or_else(|| AuthError::not_found("userrole", id))?;
        Ok(UserRole {
            id: UserRoleId::new(id),
            user_id: UserId::new(row.owner_id),
            role: self.role(row.role_id)?,
            auto_added: row.auto_added,
            granted: row.granted,
        })
    }

    fn user_roles_for_user(&self, user_id: i64) -> AuthResult<Vec<UserRole>> {
        self.user_roles
            .iter()
            .filter(|(_, b)| b.owner_id == user_id)
            .map(|(id, _)| self.user_role(id))
            .collect()
    }

    fn group_role(&self, id: i64) -> AuthResult<GroupRole> {
        let row = self
            .group_roles
            .get(id)
            .ok_or_else(|| AuthError::not_found("grouprole", id))?;
        Ok(GroupRole {
            id: GroupRoleId::new(id),
            group_id: GroupId::new(row.owner_id),
            role: self.role(row.role_id)?,
            auto_added: row.auto_added,
            granted: row.granted,
        })
    }

    fn group_roles_for_group(&self, group_id: i64) -> AuthResult<Vec<GroupRole>> {
        self.group_roles
            .iter()
            .filter(|(_, b)| b.owner_id == group_id)
            .map(|(id, _)| self.group_role(id))
            .collect()
    }

    fn group(&self, id: i64) -> AuthResult<Group> {
        let row = self
            .groups
            .get(id)
            .ok_or_else(|| AuthError::not_found("group", id))?;
        Ok(Group {
            id: GroupId::new(id),
            name: row.name.clone(),
            active: row.active,
            group_roles: self.group_roles_for_group(id)?,
        })
    }

    fn is_active_member(&self, user_id: i64, group_id: i64) -> bool {
        self.memberships
            .iter()
            .any(|(_, m)| m.user_id == user_id && m.group_id == group_id && m.active)
    }

    fn groups_for_user(&self, user_id: i64) -> AuthResult<Vec<Group>> {
        self.groups
            .iter()
            .filter(|(id, _)| self.is_active_member(user_id, *id))
            .map(|(id, _)| self.group(id))
            .collect()
    }

    fn user(&self, id: i64) -> AuthResult<User> {
        let row = self
            .users
            .get(id)
            .ok_or_else(|| AuthError::not_found("user", id))?;
        Ok(User {
            id: UserId::new(id),
            username: row.username.clone(),
            password: row.password.clone(),
            email: row.email.clone(),
            verified_email: row.verified_email,
            active: row.active,
            accounts: self.accounts_for_user(id)?,
            user_roles: self.user_roles_for_user(id)?,
            groups: self.groups_for_user(id)?,
        })
    }

    fn user_id_by_username(&self, username: &str) -> Option<i64> {
        self.users
            .iter()
            .find(|(_, u)| u.username.eq_ignore_ascii_case(username))
            .map(|(id, _)| id)
    }

    // ===== Writes =====

    fn save_character(&mut self, character: Character) -> AuthResult<Character> {
        if !self.accounts.contains(character.account_id.get()) {
            return Err(conflict(format!(
                "character references missing account {}",
                character.account_id
            )));
        }
        if !self.corporations.contains(character.corporation_id.get()) {
            return Err(conflict(format!(
                "character references missing corporation {}",
                character.corporation_id
            )));
        }

        let mut saved = character;
        let id = self
            .characters
            .upsert(saved.id.get(), "character", saved.clone())?;
        saved.id = CharacterId::new(id);
        self.characters.rows.insert(id, saved.clone());
        Ok(saved)
    }

    fn ensure_single_default(&self, account_id: i64) -> AuthResult<()> {
        let defaults = self
            .characters
            .iter()
            .filter(|(_, c)| c.account_id.get() == account_id && c.default_character)
            .count();
        if defaults > 1 {
            return Err(AuthError::Internal(format!(
                "account {} has more than one default character",
                account_id
            )));
        }
        Ok(())
    }

    fn save_account(&mut self, account: Account) -> AuthResult<Account> {
        if !self.users.contains(account.user_id.get()) {
            return Err(conflict(format!(
                "account references missing user {}",
                account.user_id
            )));
        }
        let duplicate = self.accounts.iter().any(|(id, a)| {
            id != account.id.get()
                && a.api_key_id == account.api_key_id
                && a.api_vcode == account.api_vcode
        });
        if duplicate {
            return Err(conflict(format!(
                "api key {} is already attached",
                account.api_key_id
            )));
        }

        let row = AccountRow {
            user_id: account.user_id.get(),
            api_key_id: account.api_key_id,
            api_vcode: account.api_vcode.clone(),
            api_access_mask: account.api_access_mask,
            active: account.active,
        };
        let id = self.accounts.upsert(account.id.get(), "account", row)?;

        for mut character in account.characters {
            character.account_id = AccountId::new(id);
            self.save_character(character)?;
        }
        self.ensure_single_default(id)?;
        self.account(id)
    }

    fn save_binding(
        table: &mut Table<BindingRow>,
        name: &'static str,
        id: i64,
        row: BindingRow,
    ) -> AuthResult<i64> {
        let duplicate = table
            .iter()
            .any(|(other, b)| other != id && b.owner_id == row.owner_id && b.role_id == row.role_id);
        if duplicate {
            return Err(conflict(format!(
                "role {} is already bound to {} {}",
                row.role_id, name, row.owner_id
            )));
        }
        table.upsert(id, name, row)
    }

    fn ensure_role_persisted(&self, role: &Role) -> AuthResult<()> {
        if !role.id.is_persisted() {
            return Err(AuthError::Internal(format!(
                "role {:?} must be saved before it is bound",
                role.name
            )));
        }
        if !self.roles.contains(role.id.get()) {
            return Err(conflict(format!("binding references missing role {}", role.id)));
        }
        Ok(())
    }

    fn save_user_role(&mut self, user_role: UserRole) -> AuthResult<UserRole> {
        self.ensure_role_persisted(&user_role.role)?;
        if !self.users.contains(user_role.user_id.get()) {
            return Err(conflict(format!(
                "user role references missing user {}",
                user_role.user_id
            )));
        }

        let row = BindingRow {
            owner_id: user_role.user_id.get(),
            role_id: user_role.role.id.get(),
            auto_added: user_role.auto_added,
            granted: user_role.granted,
        };
        let id = Self::save_binding(&mut self.user_roles, "userrole", user_role.id.get(), row)?;
        self.user_role(id)
    }

    fn save_group_role(&mut self, group_role: GroupRole) -> AuthResult<GroupRole> {
        self.ensure_role_persisted(&group_role.role)?;
        if !self.groups.contains(group_role.group_id.get()) {
            return Err(conflict(format!(
                "group role references missing group {}",
                group_role.group_id
            )));
        }

        let row = BindingRow {
            owner_id: group_role.group_id.get(),
            role_id: group_role.role.id.get(),
            auto_added: group_role.auto_added,
            granted: group_role.granted,
        };
        let id = Self::save_binding(&mut self.group_roles, "grouprole", group_role.id.get(), row)?;
        self.group_role(id)
    }

    fn reconcile_memberships(&mut self, user_id: i64, groups: &[Group]) -> AuthResult<()> {
        for group in groups {
            let group_id = group.id.get();
            if !group.id.is_persisted() {
                return Err(AuthError::Internal(format!(
                    "group {:?} must be saved before users join it",
                    group.name
                )));
            }
            if !self.groups.contains(group_id) {
                return Err(conflict(format!("membership references missing group {}", group_id)));
            }

            let existing = self
                .memberships
                .iter()
                .find(|(_, m)| m.user_id == user_id && m.group_id == group_id)
                .map(|(id, _)| id);
            match existing {
                Some(id) => {
                    if let Some(m) = self.memberships.rows.get_mut(&id) {
                        m.active = true;
                    }
                }
                None => {
                    let id = self.memberships.next_id();
                    self.memberships.rows.insert(
                        id,
                        MembershipRow {
                            user_id,
                            group_id,
                            active: true,
                        },
                    );
                }
            }
        }

        for m in self.memberships.rows.values_mut() {
            if m.user_id == user_id && m.active && !groups.iter().any(|g| g.id.get() == m.group_id)
            {
                m.active = false;
            }
        }
        Ok(())
    }

    fn save_user(&mut self, user: User) -> AuthResult<User> {
        let duplicate = self.users.iter().any(|(id, u)| {
            id != user.id.get()
                && (u.username.eq_ignore_ascii_case(&user.username)
                    || u.email.eq_ignore_ascii_case(&user.email))
        });
        if duplicate {
            return Err(conflict(format!(
                "username {:?} or email is already taken",
                user.username
            )));
        }

        let row = UserRow {
            username: user.username.clone(),
            password: user.password.clone(),
            email: user.email.clone(),
            verified_email: user.verified_email,
            active: user.active,
        };
        let id = self.users.upsert(user.id.get(), "user", row)?;
        let user_id = UserId::new(id);

        for mut account in user.accounts {
            account.user_id = user_id;
            self.save_account(account)?;
        }
        for mut user_role in user.user_roles {
            user_role.user_id = user_id;
            self.save_user_role(user_role)?;
        }
        self.reconcile_memberships(id, &user.groups)?;

        self.user(id)
    }

    fn delete_account(&mut self, id: i64) {
        self.characters.retain(|c| c.account_id.get() != id);
        self.accounts.rows.remove(&id);
    }

    fn ensure_binding_unlocked(
        &self,
        table: &Table<BindingRow>,
        name: &'static str,
        id: i64,
    ) -> AuthResult<()> {
        let locked = table
            .get(id)
            .and_then(|b| self.roles.get(b.role_id))
            .is_some_and(|r| r.locked);
        if locked {
            return Err(conflict(format!("{} {} references a locked role", name, id)));
        }
        Ok(())
    }
}

// ============================================================================
// Store
// ============================================================================

/// Process-local store implementing the whole persistence port
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    audit: Arc<RwLock<AuditLog>>,
}

fn poisoned() -> AuthError {
    AuthError::Internal("memory store lock poisoned".to_string())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> AuthResult<T>) -> AuthResult<T> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        f(&tables)
    }

    /// Run `f` against a copy and commit it only on success
    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> AuthResult<T>) -> AuthResult<T> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let mut draft = tables.clone();
        let result = f(&mut draft)?;
        *tables = draft;
        Ok(result)
    }

    /// Insert an audit row in place; audit inserts never fail halfway
    fn append<T>(&self, f: impl FnOnce(&mut AuditLog) -> T) -> AuthResult<T> {
        let mut audit = self.audit.write().map_err(|_| poisoned())?;
        Ok(f(&mut audit))
    }

    fn read_audit<T>(&self, f: impl FnOnce(&AuditLog) -> T) -> AuthResult<T> {
        let audit = self.audit.read().map_err(|_| poisoned())?;
        Ok(f(&audit))
    }
}

// ============================================================================
// User Repository Implementation
// ============================================================================

impl UserRepository for MemoryStore {
    async fn load_all_users(&self) -> AuthResult<Vec<User>> {
        self.read(|t| t.users.iter().map(|(id, _)| t.user(id)).collect())
    }

    async fn load_user(&self, id: UserId) -> AuthResult<User> {
        self.read(|t| t.user(id.get()))
    }

    async fn load_user_by_username(&self, username: &str) -> AuthResult<User> {
        self.read(|t| {
            let id = t
                .user_id_by_username(username)
                .ok_or_else(|| AuthError::not_found("user", username))?;
            t.user(id)
        })
    }

    async fn load_password_for_user(&self, username: &str) -> AuthResult<HashedPassword> {
        self.read(|t| {
            t.user_id_by_username(username)
                .and_then(|id| t.users.get(id))
                .map(|u| u.password.clone())
                .ok_or_else(|| AuthError::not_found("user", username))
        })
    }

    async fn query_user_id_exists(&self, id: UserId) -> AuthResult<bool> {
        self.read(|t| Ok(t.users.contains(id.get())))
    }

    async fn query_username_or_email_exists(
        &self,
        username: &str,
        email: &str,
    ) -> AuthResult<bool> {
        self.read(|t| {
            Ok(t.users.iter().any(|(_, u)| {
                u.username.eq_ignore_ascii_case(username) || u.email.eq_ignore_ascii_case(email)
            }))
        })
    }

    async fn save_user(&self, user: User) -> AuthResult<User> {
        let saved = self.write(|t| t.save_user(user))?;
        tracing::debug!(user_id = %saved.id, "User saved");
        Ok(saved)
    }

    async fn delete_user(&self, id: UserId) -> AuthResult<()> {
        let id = id.get();
        self.write(|t| {
            if !t.users.contains(id) {
                return Ok(());
            }
            if t.applications.iter().any(|(_, a)| a.maintainer_id.get() == id) {
                return Err(conflict(format!("user {} still maintains applications", id)));
            }

            let accounts: Vec<i64> = t
                .accounts
                .iter()
                .filter(|(_, a)| a.user_id == id)
                .map(|(account_id, _)| account_id)
                .collect();
            for account_id in accounts {
                t.delete_account(account_id);
            }
            t.user_roles.retain(|b| b.owner_id != id);
            t.memberships.retain(|m| m.user_id != id);
            t.users.rows.remove(&id);
            Ok(())
        })?;

        tracing::info!(user_id = id, "User deleted");
        Ok(())
    }

    async fn load_groups_for_user(&self, id: UserId) -> AuthResult<Vec<Group>> {
        self.read(|t| t.groups_for_user(id.get()))
    }

    async fn load_available_groups_for_user(&self, id: UserId) -> AuthResult<Vec<Group>> {
        self.read(|t| {
            let mut groups = t
                .groups
                .iter()
                .filter(|(group_id, _)| !t.is_active_member(id.get(), *group_id))
                .map(|(group_id, _)| t.group(group_id))
                .collect::<AuthResult<Vec<_>>>()?;
            sort_by_name(&mut groups, |g| (g.name.to_lowercase(), g.id.get()));
            Ok(groups)
        })
    }

    async fn remove_user_from_group(
        &self,
        user_id: UserId,
        group_id: GroupId,
    ) -> AuthResult<User> {
        self.write(|t| {
            t.memberships
                .retain(|m| !(m.user_id == user_id.get() && m.group_id == group_id.get()));
            t.user(user_id.get())
        })
    }

    async fn remove_api_key_from_user(&self, mut user: User, api_key_id: i64) -> AuthResult<User> {
        self.write(|t| {
            let accounts: Vec<i64> = t
                .accounts
                .iter()
                .filter(|(_, a)| a.user_id == user.id.get() && a.api_key_id == api_key_id)
                .map(|(id, _)| id)
                .collect();
            for id in accounts {
                t.delete_account(id);
            }
            Ok(())
        })?;

        user.accounts.retain(|a| a.api_key_id != api_key_id);
        Ok(user)
    }
}

// ============================================================================
// Account / Character Repository Implementations
// ============================================================================

impl AccountRepository for MemoryStore {
    async fn load_all_accounts(&self) -> AuthResult<Vec<Account>> {
        self.read(|t| t.accounts.iter().map(|(id, _)| t.account(id)).collect())
    }

    async fn load_account(&self, id: AccountId) -> AuthResult<Account> {
        self.read(|t| t.account(id.get()))
    }

    async fn load_accounts_for_user(&self, user_id: UserId) -> AuthResult<Vec<Account>> {
        self.read(|t| t.accounts_for_user(user_id.get()))
    }

    async fn save_account(&self, account: Account) -> AuthResult<Account> {
        self.write(|t| t.save_account(account))
    }

    async fn delete_account(&self, id: AccountId) -> AuthResult<()> {
        self.write(|t| {
            t.delete_account(id.get());
            Ok(())
        })
    }
}

impl CharacterRepository for MemoryStore {
    async fn load_all_characters(&self) -> AuthResult<Vec<Character>> {
        self.read(|t| Ok(t.characters.iter().map(|(_, c)| c.clone()).collect()))
    }

    async fn load_character(&self, id: CharacterId) -> AuthResult<Character> {
        self.read(|t| t.character(id.get()))
    }

    async fn load_characters_for_account(
        &self,
        account_id: AccountId,
    ) -> AuthResult<Vec<Character>> {
        self.read(|t| Ok(t.characters_for_account(account_id.get())))
    }

    async fn save_character(&self, character: Character) -> AuthResult<Character> {
        self.write(|t| {
            let saved = t.save_character(character)?;
            t.ensure_single_default(saved.account_id.get())?;
            Ok(saved)
        })
    }

    async fn delete_character(&self, id: CharacterId) -> AuthResult<()> {
        self.write(|t| {
            t.characters.rows.remove(&id.get());
            Ok(())
        })
    }
}

// ============================================================================
// Corporation Repository Implementation
// ============================================================================

impl CorporationRepository for MemoryStore {
    async fn load_all_corporations(&self) -> AuthResult<Vec<Corporation>> {
        self.read(|t| Ok(t.corporations.iter().map(|(_, c)| c.clone()).collect()))
    }

    async fn load_corporation(&self, id: CorporationId) -> AuthResult<Corporation> {
        self.read(|t| {
            t.corporations
                .get(id.get())
                .cloned()
                .ok_or_else(|| AuthError::not_found("corporation", id))
        })
    }

    async fn load_corporation_by_eve_id(&self, eve_corporation_id: i64) -> AuthResult<Corporation> {
        self.read(|t| {
            t.corporations
                .iter()
                .find(|(_, c)| c.eve_corporation_id == eve_corporation_id)
                .map(|(_, c)| c.clone())
                .ok_or_else(|| AuthError::not_found("corporation", eve_corporation_id))
        })
    }

    async fn save_corporation(&self, corporation: Corporation) -> AuthResult<Corporation> {
        self.write(|t| {
            let duplicate = t.corporations.iter().any(|(id, c)| {
                id != corporation.id.get() && c.eve_corporation_id == corporation.eve_corporation_id
            });
            if duplicate {
                return Err(conflict(format!(
                    "corporation {} already exists",
                    corporation.eve_corporation_id
                )));
            }

            let mut saved = corporation;
            let id = t
                .corporations
                .upsert(saved.id.get(), "corporation", saved.clone())?;
            saved.id = CorporationId::new(id);
            t.corporations.rows.insert(id, saved.clone());
            Ok(saved)
        })
    }

    async fn delete_corporation(&self, id: CorporationId) -> AuthResult<()> {
        self.write(|t| {
            if t
                .characters
                .iter()
                .any(|(_, c)| c.corporation_id == id)
            {
                return Err(conflict(format!(
                    "corporation {} is referenced by characters",
                    id
                )));
            }
            t.corporations.rows.remove(&id.get());
            Ok(())
        })
    }
}

// ============================================================================
// Role / Binding Repository Implementations
// ============================================================================

impl RoleRepository for MemoryStore {
    async fn load_all_roles(&self) -> AuthResult<Vec<Role>> {
        self.read(|t| Ok(t.roles.iter().map(|(_, r)| r.clone()).collect()))
    }

    async fn load_role(&self, id: RoleId) -> AuthResult<Role> {
        self.read(|t| t.role(id.get()))
    }

    async fn save_role(&self, role: Role) -> AuthResult<Role> {
        self.write(|t| {
            let duplicate = t
                .roles
                .iter()
                .any(|(id, r)| id != role.id.get() && r.name.eq_ignore_ascii_case(&role.name));
            if duplicate {
                return Err(conflict(format!("role {:?} already exists", role.name)));
            }

            let mut saved = role;
            let id = t.roles.upsert(saved.id.get(), "role", saved.clone())?;
            saved.id = RoleId::new(id);
            t.roles.rows.insert(id, saved.clone());
            Ok(saved)
        })
    }

    async fn delete_role(&self, id: RoleId) -> AuthResult<()> {
        let id = id.get();
        self.write(|t| {
            match t.roles.get(id) {
                None => return Ok(()),
                Some(role) if role.locked => {
                    return Err(conflict(format!("role {} is locked", id)));
                }
                Some(_) => {}
            }
            t.user_roles.retain(|b| b.role_id != id);
            t.group_roles.retain(|b| b.role_id != id);
            t.roles.rows.remove(&id);
            Ok(())
        })
    }
}

impl UserRoleRepository for MemoryStore {
    async fn load_all_user_roles(&self) -> AuthResult<Vec<UserRole>> {
        self.read(|t| t.user_roles.iter().map(|(id, _)| t.user_role(id)).collect())
    }

    async fn load_user_role(&self, id: UserRoleId) -> AuthResult<UserRole> {
        self.read(|t| t.user_role(id.get()))
    }

    async fn load_user_roles_for_user(&self, user_id: UserId) -> AuthResult<Vec<UserRole>> {
        self.read(|t| t.user_roles_for_user(user_id.get()))
    }

    async fn load_available_user_roles_for_user(&self, user_id: UserId) -> AuthResult<Vec<Role>> {
        self.read(|t| {
            let mut roles: Vec<Role> = t
                .roles
                .iter()
                .filter(|(role_id, _)| {
                    !t.user_roles
                        .iter()
                        .any(|(_, b)| b.owner_id == user_id.get() && b.role_id == *role_id)
                })
                .map(|(_, r)| r.clone())
                .collect();
            sort_by_name(&mut roles, |r| (r.name.to_lowercase(), r.id.get()));
            Ok(roles)
        })
    }

    async fn save_user_role(&self, user_role: UserRole) -> AuthResult<UserRole> {
        self.write(|t| t.save_user_role(user_role))
    }

    async fn delete_user_role(&self, id: UserRoleId) -> AuthResult<()> {
        self.write(|t| {
            t.ensure_binding_unlocked(&t.user_roles, "userrole", id.get())?;
            t.user_roles.rows.remove(&id.get());
            Ok(())
        })
    }

    async fn remove_user_role_from_user(
        &self,
        user_id: UserId,
        user_role_id: UserRoleId,
    ) -> AuthResult<User> {
        self.write(|t| {
            t.ensure_binding_unlocked(&t.user_roles, "userrole", user_role_id.get())?;
            if t
                .user_roles
                .get(user_role_id.get())
                .is_some_and(|b| b.owner_id == user_id.get())
            {
                t.user_roles.rows.remove(&user_role_id.get());
            }
            t.user(user_id.get())
        })
    }

    async fn toggle_user_role_granted(&self, id: UserRoleId) -> AuthResult<UserRole> {
        self.write(|t| {
            t.ensure_binding_unlocked(&t.user_roles, "userrole", id.get())?;
            let binding = t
                .user_roles
                .rows
                .get_mut(&id.get())
                .ok_or_else(|| AuthError::not_found("userrole", id))?;
            binding.granted = !binding.granted;
            t.user_role(id.get())
        })
    }
}

impl GroupRoleRepository for MemoryStore {
    async fn load_all_group_roles(&self) -> AuthResult<Vec<GroupRole>> {
        self.read(|t| t.group_roles.iter().map(|(id, _)| t.group_role(id)).collect())
    }

    async fn load_group_role(&self, id: GroupRoleId) -> AuthResult<GroupRole> {
        self.read(|t| t.group_role(id.get()))
    }

    async fn load_group_roles_for_group(&self, group_id: GroupId) -> AuthResult<Vec<GroupRole>> {
        self.read(|t| t.group_roles_for_group(group_id.get()))
    }

    async fn load_available_group_roles_for_group(
        &self,
        group_id: GroupId,
    ) -> AuthResult<Vec<Role>> {
        self.read(|t| {
            let mut roles: Vec<Role> = t
                .roles
                .iter()
                .filter(|(role_id, _)| {
                    !t.group_roles
                        .iter()
                        .any(|(_, b)| b.owner_id == group_id.get() && b.role_id == *role_id)
                })
                .map(|(_, r)| r.clone())
                .collect();
            sort_by_name(&mut roles, |r| (r.name.to_lowercase(), r.id.get()));
            Ok(roles)
        })
    }

    async fn save_group_role(&self, group_role: GroupRole) -> AuthResult<GroupRole> {
        self.write(|t| t.save_group_role(group_role))
    }

    async fn delete_group_role(&self, id: GroupRoleId) -> AuthResult<()> {
        self.write(|t| {
            t.ensure_binding_unlocked(&t.group_roles, "grouprole", id.get())?;
            t.group_roles.rows.remove(&id.get());
            Ok(())
        })
    }

    async fn remove_group_role_from_group(
        &self,
        group_id: GroupId,
        group_role_id: GroupRoleId,
    ) -> AuthResult<Group> {
        self.write(|t| {
            t.ensure_binding_unlocked(&t.group_roles, "grouprole", group_role_id.get())?;
            if t
                .group_roles
                .get(group_role_id.get())
                .is_some_and(|b| b.owner_id == group_id.get())
            {
                t.group_roles.rows.remove(&group_role_id.get());
            }
            t.group(group_id.get())
        })
    }

    async fn toggle_group_role_granted(&self, id: GroupRoleId) -> AuthResult<GroupRole> {
        self.write(|t| {
            t.ensure_binding_unlocked(&t.group_roles, "grouprole", id.get())?;
            let binding = t
                .group_roles
                .rows
                .get_mut(&id.get())
                .ok_or_else(|| AuthError::not_found("grouprole", id))?;
            binding.granted = !binding.granted;
            t.group_role(id.get())
        })
    }
}

// ============================================================================
// Group Repository Implementation
// ============================================================================

impl GroupRepository for MemoryStore {
    async fn load_all_groups(&self) -> AuthResult<Vec<Group>> {
        self.read(|t| t.groups.iter().map(|(id, _)| t.group(id)).collect())
    }

    async fn load_group(&self, id: GroupId) -> AuthResult<Group> {
        self.read(|t| t.group(id.get()))
    }

    async fn save_group(&self, group: Group) -> AuthResult<Group> {
        self.write(|t| {
            let duplicate = t
                .groups
                .iter()
                .any(|(id, g)| id != group.id.get() && g.name.eq_ignore_ascii_case(&group.name));
            if duplicate {
                return Err(conflict(format!("group {:?} already exists", group.name)));
            }

            let row = GroupRow {
                name: group.name.clone(),
                active: group.active,
            };
            let id = t.groups.upsert(group.id.get(), "group", row)?;
            for mut group_role in group.group_roles {
                group_role.group_id = GroupId::new(id);
                t.save_group_role(group_role)?;
            }
            t.group(id)
        })
    }

    async fn delete_group(&self, id: GroupId) -> AuthResult<()> {
        let id = id.get();
        self.write(|t| {
            t.group_roles.retain(|b| b.owner_id != id);
            t.memberships.retain(|m| m.group_id != id);
            t.groups.rows.remove(&id);
            Ok(())
        })
    }
}

// ============================================================================
// Application Repository Implementation
// ============================================================================

impl ApplicationRepository for MemoryStore {
    async fn load_all_applications(&self) -> AuthResult<Vec<Application>> {
        self.read(|t| Ok(t.applications.iter().map(|(_, a)| a.clone()).collect()))
    }

    async fn load_application(&self, id: ApplicationId) -> AuthResult<Application> {
        self.read(|t| {
            t.applications
                .get(id.get())
                .cloned()
                .ok_or_else(|| AuthError::not_found("application", id))
        })
    }

    async fn save_application(&self, application: Application) -> AuthResult<Application> {
        application.callback_url()?;
        self.write(|t| {
            if !t.users.contains(application.maintainer_id.get()) {
                return Err(conflict(format!(
                    "application references missing maintainer {}",
                    application.maintainer_id
                )));
            }

            let mut saved = application;
            let id = t
                .applications
                .upsert(saved.id.get(), "application", saved.clone())?;
            saved.id = ApplicationId::new(id);
            t.applications.rows.insert(id, saved.clone());
            Ok(saved)
        })
    }

    async fn delete_application(&self, id: ApplicationId) -> AuthResult<()> {
        self.write(|t| {
            t.applications.rows.remove(&id.get());
            Ok(())
        })
    }
}

// ============================================================================
// Audit / Raw Query
// ============================================================================

impl AuditRepository for MemoryStore {
    async fn record_login_attempt(&self, attempt: LoginAttempt) -> AuthResult<LoginAttempt> {
        self.append(|a| {
            let mut saved = attempt;
            saved.id = LoginAttemptId::new(a.login_attempts.next_id());
            a.login_attempts.rows.insert(saved.id.get(), saved.clone());
            saved
        })
    }

    async fn record_csrf_failure(&self, failure: CsrfFailure) -> AuthResult<CsrfFailure> {
        self.append(|a| {
            let mut saved = failure;
            saved.id = CsrfFailureId::new(a.csrf_failures.next_id());
            a.csrf_failures.rows.insert(saved.id.get(), saved.clone());
            saved
        })
    }

    async fn load_login_attempts_for_username(
        &self,
        username: &str,
    ) -> AuthResult<Vec<LoginAttempt>> {
        self.read_audit(|a| {
            a.login_attempts
                .iter()
                .filter(|(_, attempt)| attempt.username == username)
                .map(|(_, attempt)| attempt.clone())
                .collect()
        })
    }
}

impl RawQueryRepository for MemoryStore {
    async fn raw_query(&self, _sql: &str, _args: Vec<Value>) -> AuthResult<Vec<Map<String, Value>>> {
        Err(AuthError::Unsupported("raw_query"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel::error::kind::ErrorKind;

    fn user(name: &str) -> User {
        User::new(
            name,
            HashedPassword::from_db("$2b$10$placeholder"),
            format!("{}@example.com", name),
        )
    }

    async fn seeded_corporation(store: &MemoryStore) -> Corporation {
        store
            .save_corporation(Corporation::new("Test Corp", "TEST", 1000, 90000))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_save_assigns_ids_and_round_trips() {
        let store = MemoryStore::new();
        let corp = seeded_corporation(&store).await;

        let mut u = user("test1");
        let mut account = Account::new(UserId::unsaved(), 1, "vcode", 0);
        account
            .characters
            .push(Character::new(AccountId::unsaved(), corp.id, "Pilot", 9001));
        u.accounts.push(account);

        let saved = store.save_user(u).await.unwrap();
        assert!(saved.id.is_persisted());
        assert!(saved.accounts[0].id.is_persisted());
        assert_eq!(saved.accounts[0].characters[0].account_id, saved.accounts[0].id);

        let loaded = store.load_user(saved.id).await.unwrap();
        assert_eq!(loaded, saved);
    }

    #[tokio::test]
    async fn test_username_unique_case_insensitive() {
        let store = MemoryStore::new();
        store.save_user(user("test1")).await.unwrap();

        let mut dup = user("TEST1");
        dup.email = "other@example.com".to_string();
        let err = store.save_user(dup).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(
            store
                .query_username_or_email_exists("Test1", "nobody@example.com")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_failed_save_rolls_back() {
        let store = MemoryStore::new();
        let mut u = user("test1");
        // Unsaved role cannot be bound
        u.user_roles
            .push(UserRole::new(UserId::unsaved(), Role::new("ping.all"), true));

        let err = store.save_user(u).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(store.load_all_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_audit_rows_bypass_entity_tables() {
        let store = MemoryStore::new();
        let client = platform::client::ClientInfo::default();

        // Entity tables stay readable (and unlocked for writes) meanwhile
        let _entities = store.tables.read().unwrap();
        for successful in [false, false, true] {
            store
                .record_login_attempt(LoginAttempt::new("test1", &client, successful))
                .await
                .unwrap();
        }
        store
            .record_login_attempt(LoginAttempt::new("test2", &client, true))
            .await
            .unwrap();
        let failure = store
            .record_csrf_failure(CsrfFailure::new(None, "{}"))
            .await
            .unwrap();
        assert_eq!(failure.id, CsrfFailureId::new(1));

        let attempts = store.load_login_attempts_for_username("test1").await.unwrap();
        let ids: Vec<i64> = attempts.iter().map(|a| a.id.get()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(attempts[2].successful);
    }

    #[tokio::test]
    async fn test_two_default_characters_rejected() {
        let store = MemoryStore::new();
        let corp = seeded_corporation(&store).await;

        let mut u = user("test1");
        let mut account = Account::new(UserId::unsaved(), 1, "vcode", 0);
        for (n, eve_id) in [("A", 1), ("B", 2)] {
            let mut c = Character::new(AccountId::unsaved(), corp.id, n, eve_id);
            c.default_character = true;
            account.characters.push(c);
        }
        u.accounts.push(account);

        assert!(store.save_user(u).await.is_err());
        assert!(store.load_all_characters().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_id_is_not_found() {
        let store = MemoryStore::new();
        let mut role = Role::new("ping.all");
        role.id = RoleId::new(99);
        let err = store.save_role(role).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_locked_role_cannot_be_removed() {
        let store = MemoryStore::new();
        let mut locked = Role::new("admin");
        locked.locked = true;
        let locked = store.save_role(locked).await.unwrap();

        let mut u = user("test1");
        u.user_roles.push(UserRole::new(UserId::unsaved(), locked.clone(), true));
        let u = store.save_user(u).await.unwrap();
        let binding = u.user_roles[0].id;

        for err in [
            store.toggle_user_role_granted(binding).await.unwrap_err(),
            store.delete_user_role(binding).await.unwrap_err(),
            store.delete_role(locked.id).await.unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::Conflict);
        }
        assert_eq!(store.load_user_roles_for_user(u.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_role_cascades_to_bindings() {
        let store = MemoryStore::new();
        let role = store.save_role(Role::new("ping.all")).await.unwrap();
        let mut group = Group::new("Pingers");
        group
            .group_roles
            .push(GroupRole::new(GroupId::unsaved(), role.clone(), true));
        let group = store.save_group(group).await.unwrap();

        store.delete_role(role.id).await.unwrap();
        assert!(store.load_group(group.id).await.unwrap().group_roles.is_empty());
        // Idempotent
        store.delete_role(role.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_membership_reconciliation() {
        let store = MemoryStore::new();
        let first = store.save_group(Group::new("First")).await.unwrap();
        let second = store.save_group(Group::new("Second")).await.unwrap();

        let mut u = user("test1");
        u.groups = vec![first.clone(), second.clone()];
        let mut u = store.save_user(u).await.unwrap();
        assert_eq!(u.groups.len(), 2);

        u.groups.retain(|g| g.id == second.id);
        let u = store.save_user(u).await.unwrap();
        assert_eq!(u.groups.iter().map(|g| g.id).collect::<Vec<_>>(), vec![second.id]);

        let available = store.load_available_groups_for_user(u.id).await.unwrap();
        assert_eq!(available.iter().map(|g| g.id).collect::<Vec<_>>(), vec![first.id]);
    }

    #[tokio::test]
    async fn test_remove_api_key_from_user() {
        let store = MemoryStore::new();
        let corp = seeded_corporation(&store).await;

        let mut u = user("test1");
        for key in [10, 20] {
            let mut account = Account::new(UserId::unsaved(), key, "vcode", 0);
            account
                .characters
                .push(Character::new(AccountId::unsaved(), corp.id, format!("P{}", key), key));
            u.accounts.push(account);
        }
        let u = store.save_user(u).await.unwrap();

        let u = store.remove_api_key_from_user(u, 10).await.unwrap();
        assert_eq!(u.accounts.len(), 1);
        assert_eq!(store.load_accounts_for_user(u.id).await.unwrap().len(), 1);
        assert_eq!(store.load_all_characters().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_corporation_in_use_cannot_be_deleted() {
        let store = MemoryStore::new();
        let corp = seeded_corporation(&store).await;

        let mut u = user("test1");
        let mut account = Account::new(UserId::unsaved(), 1, "vcode", 0);
        account
            .characters
            .push(Character::new(AccountId::unsaved(), corp.id, "Pilot", 1));
        u.accounts.push(account);
        store.save_user(u).await.unwrap();

        let err = store.delete_corporation(corp.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(
            store.load_corporation_by_eve_id(1000).await.unwrap().id,
            corp.id
        );
    }

    #[tokio::test]
    async fn test_raw_query_unsupported() {
        let store = MemoryStore::new();
        let err = store.raw_query("SELECT 1", vec![]).await.unwrap_err();
        assert!(matches!(err, AuthError::Unsupported(_)));
    }
}
