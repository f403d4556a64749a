//! MySQL Repository Implementation
//!
//! Aggregate saves thread one transaction through every nested write, so a
//! failure anywhere rolls the whole aggregate back.

use chrono::{DateTime, NaiveDateTime, Utc};
use kernel::id::{
    AccountId, ApplicationId, CharacterId, CorporationId, CsrfFailureId, GroupId, GroupRoleId,
    LoginAttemptId, RoleId, UserId, UserRoleId,
};
use platform::password::HashedPassword;
use serde_json::{Map, Value};
use sqlx::mysql::MySqlRow;
use sqlx::{Column, MySqlConnection, MySqlPool, Row, TypeInfo, ValueRef};

use crate::domain::entity::{
    Account, Application, Character, Corporation, CsrfFailure, Group, GroupRole, LoginAttempt,
    Role, User, UserRole, application::ApplicationSecret, corporation::ApiCredential,
};
use crate::domain::repository::{
    AccountRepository, ApplicationRepository, AuditRepository, CharacterRepository,
    CorporationRepository, GroupRepository, GroupRoleRepository, RawQueryRepository,
    RoleRepository, UserRepository, UserRoleRepository,
};
use crate::error::{AuthError, AuthResult};

/// MySQL-backed store implementing the whole persistence port
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

// ============================================================================
// Row types
// ============================================================================

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    password: String,
    email: String,
    verifiedemail: bool,
    active: bool,
}

impl UserRow {
    fn into_user(self) -> User {
        User {
            id: UserId::new(self.id),
            username: self.username,
            password: HashedPassword::from_db(self.password),
            email: self.email,
            verified_email: self.verifiedemail,
            active: self.active,
            accounts: Vec::new(),
            user_roles: Vec::new(),
            groups: Vec::new(),
        }
    }
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: i64,
    userid: i64,
    apikeyid: i64,
    apivcode: String,
    apiaccessmask: i64,
    active: bool,
}

impl AccountRow {
    fn into_account(self) -> Account {
        Account {
            id: AccountId::new(self.id),
            user_id: UserId::new(self.userid),
            api_key_id: self.apikeyid,
            api_vcode: self.apivcode,
            api_access_mask: self.apiaccessmask,
            active: self.active,
            characters: Vec::new(),
        }
    }
}

#[derive(sqlx::FromRow)]
struct CharacterRow {
    id: i64,
    accountid: i64,
    corporationid: i64,
    name: String,
    evecharacterid: i64,
    defaultcharacter: bool,
    active: bool,
}

impl CharacterRow {
    fn into_character(self) -> Character {
        Character {
            id: CharacterId::new(self.id),
            account_id: AccountId::new(self.accountid),
            corporation_id: CorporationId::new(self.corporationid),
            name: self.name,
            eve_character_id: self.evecharacterid,
            default_character: self.defaultcharacter,
            active: self.active,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CorporationRow {
    id: i64,
    name: String,
    ticker: String,
    evecorporationid: i64,
    ceo: i64,
    apikeyid: Option<i64>,
    apivcode: Option<String>,
    active: bool,
}

impl CorporationRow {
    fn into_corporation(self) -> Corporation {
        Corporation {
            id: CorporationId::new(self.id),
            name: self.name,
            ticker: self.ticker,
            eve_corporation_id: self.evecorporationid,
            ceo_id: self.ceo,
            api_credential: ApiCredential::from_columns(self.apikeyid, self.apivcode),
            active: self.active,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RoleRow {
    id: i64,
    name: String,
    active: bool,
    locked: bool,
}

impl RoleRow {
    fn into_role(self) -> Role {
        Role {
            id: RoleId::new(self.id),
            name: self.name,
            active: self.active,
            locked: self.locked,
        }
    }
}

/// Shared shape of `userroles` and `grouproles` joined with `roles`
#[derive(sqlx::FromRow)]
struct BindingRow {
    id: i64,
    ownerid: i64,
    autoadded: bool,
    granted: bool,
    roleid: i64,
    rolename: String,
    roleactive: bool,
    rolelocked: bool,
}

impl BindingRow {
    fn role(&self) -> Role {
        Role {
            id: RoleId::new(self.roleid),
            name: self.rolename.clone(),
            active: self.roleactive,
            locked: self.rolelocked,
        }
    }

    fn into_user_role(self) -> UserRole {
        UserRole {
            id: UserRoleId::new(self.id),
            user_id: UserId::new(self.ownerid),
            role: self.role(),
            auto_added: self.autoadded,
            granted: self.granted,
        }
    }

    fn into_group_role(self) -> GroupRole {
        GroupRole {
            id: GroupRoleId::new(self.id),
            group_id: GroupId::new(self.ownerid),
            role: self.role(),
            auto_added: self.autoadded,
            granted: self.granted,
        }
    }
}

#[derive(sqlx::FromRow)]
struct GroupRow {
    id: i64,
    name: String,
    active: bool,
}

#[derive(sqlx::FromRow)]
struct ApplicationRow {
    id: i64,
    name: String,
    maintainerid: i64,
    secret: String,
    callback: String,
    active: bool,
}

impl ApplicationRow {
    fn into_application(self) -> Application {
        Application {
            id: ApplicationId::new(self.id),
            name: self.name,
            maintainer_id: UserId::new(self.maintainerid),
            secret: ApplicationSecret::from_db(self.secret),
            callback: self.callback,
            active: self.active,
        }
    }
}

#[derive(sqlx::FromRow)]
struct LoginAttemptRow {
    id: i64,
    username: String,
    remoteaddr: String,
    useragent: String,
    successful: bool,
    timestamp: DateTime<Utc>,
}

const USER_COLUMNS: &str = "id, username, password, email, verifiedemail, active";
const ACCOUNT_COLUMNS: &str = "id, userid, apikeyid, apivcode, apiaccessmask, active";
const CHARACTER_COLUMNS: &str =
    "id, accountid, corporationid, name, evecharacterid, defaultcharacter, active";
const CORPORATION_COLUMNS: &str =
    "id, name, ticker, evecorporationid, ceo, apikeyid, apivcode, active";
const APPLICATION_COLUMNS: &str = "id, name, maintainerid, secret, callback, active";

const USER_ROLE_SELECT: &str = r#"
    SELECT b.id, b.userid AS ownerid, b.autoadded, b.granted,
           r.id AS roleid, r.name AS rolename, r.active AS roleactive, r.locked AS rolelocked
    FROM userroles b
    JOIN roles r ON r.id = b.roleid
"#;

const GROUP_ROLE_SELECT: &str = r#"
    SELECT b.id, b.groupid AS ownerid, b.autoadded, b.granted,
           r.id AS roleid, r.name AS rolename, r.active AS roleactive, r.locked AS rolelocked
    FROM grouproles b
    JOIN roles r ON r.id = b.roleid
"#;

// ============================================================================
// Connection-level helpers (usable with a pooled connection or a transaction)
// ============================================================================

async fn row_exists(conn: &mut MySqlConnection, table: &str, id: i64) -> AuthResult<bool> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE id = ?", table);
    let count: i64 = sqlx::query_scalar(&sql).bind(id).fetch_one(&mut *conn).await?;
    Ok(count > 0)
}

/// Map "no rows updated" to `NotFound` unless the row exists unchanged
async fn ensure_updated(
    conn: &mut MySqlConnection,
    rows_affected: u64,
    table: &'static str,
    id: i64,
) -> AuthResult<()> {
    if rows_affected == 0 && !row_exists(conn, table, id).await? {
        return Err(AuthError::not_found(table, id));
    }
    Ok(())
}

async fn characters_for_account(
    conn: &mut MySqlConnection,
    account_id: i64,
) -> AuthResult<Vec<Character>> {
    let sql = format!(
        "SELECT {} FROM characters WHERE accountid = ? ORDER BY id",
        CHARACTER_COLUMNS
    );
    let rows = sqlx::query_as::<_, CharacterRow>(&sql)
        .bind(account_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.into_iter().map(CharacterRow::into_character).collect())
}

async fn hydrate_account(conn: &mut MySqlConnection, row: AccountRow) -> AuthResult<Account> {
    let mut account = row.into_account();
    account.characters = characters_for_account(conn, account.id.get()).await?;
    Ok(account)
}

async fn accounts_for_user(conn: &mut MySqlConnection, user_id: i64) -> AuthResult<Vec<Account>> {
    let sql = format!(
        "SELECT {} FROM accounts WHERE userid = ? ORDER BY id",
        ACCOUNT_COLUMNS
    );
    let rows = sqlx::query_as::<_, AccountRow>(&sql)
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;

    let mut accounts = Vec::with_capacity(rows.len());
    for row in rows {
        accounts.push(hydrate_account(conn, row).await?);
    }
    Ok(accounts)
}

async fn user_roles_for_user(
    conn: &mut MySqlConnection,
    user_id: i64,
) -> AuthResult<Vec<UserRole>> {
    let sql = format!("{} WHERE b.userid = ? ORDER BY b.id", USER_ROLE_SELECT);
    let rows = sqlx::query_as::<_, BindingRow>(&sql)
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.into_iter().map(BindingRow::into_user_role).collect())
}

async fn group_roles_for_group(
    conn: &mut MySqlConnection,
    group_id: i64,
) -> AuthResult<Vec<GroupRole>> {
    let sql = format!("{} WHERE b.groupid = ? ORDER BY b.id", GROUP_ROLE_SELECT);
    let rows = sqlx::query_as::<_, BindingRow>(&sql)
        .bind(group_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.into_iter().map(BindingRow::into_group_role).collect())
}

async fn hydrate_groups(conn: &mut MySqlConnection, rows: Vec<GroupRow>) -> AuthResult<Vec<Group>> {
    let mut groups = Vec::with_capacity(rows.len());
    for row in rows {
        groups.push(Group {
            id: GroupId::new(row.id),
            name: row.name,
            active: row.active,
            group_roles: group_roles_for_group(conn, row.id).await?,
        });
    }
    Ok(groups)
}

async fn groups_for_user(conn: &mut MySqlConnection, user_id: i64) -> AuthResult<Vec<Group>> {
    let rows = sqlx::query_as::<_, GroupRow>(
        r#"
        SELECT g.id, g.name, g.active
        FROM `groups` g
        JOIN usergroups ug ON ug.groupid = g.id
        WHERE ug.userid = ? AND ug.active = 1
        ORDER BY g.id
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;
    hydrate_groups(conn, rows).await
}

async fn load_group_in(conn: &mut MySqlConnection, id: i64) -> AuthResult<Group> {
    let row = sqlx::query_as::<_, GroupRow>("SELECT id, name, active FROM `groups` WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AuthError::not_found("group", id))?;
    let mut groups = hydrate_groups(conn, vec![row]).await?;
    groups
        .pop()
        .ok_or_else(|| AuthError::Internal("group hydration lost a row".to_string()))
}

async fn hydrate_user(conn: &mut MySqlConnection, row: UserRow) -> AuthResult<User> {
    let mut user = row.into_user();
    let id = user.id.get();
    user.accounts = accounts_for_user(conn, id).await?;
    user.user_roles = user_roles_for_user(conn, id).await?;
    user.groups = groups_for_user(conn, id).await?;
    Ok(user)
}

async fn load_user_in(conn: &mut MySqlConnection, id: i64) -> AuthResult<User> {
    let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
    let row = sqlx::query_as::<_, UserRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AuthError::not_found("user", id))?;
    hydrate_user(conn, row).await
}

/// Lock flag of the role behind a binding; `None` when the binding is absent
async fn binding_role_locked(
    conn: &mut MySqlConnection,
    table: &'static str,
    binding_id: i64,
) -> AuthResult<Option<bool>> {
    let sql = format!(
        "SELECT r.locked FROM {} b JOIN roles r ON r.id = b.roleid WHERE b.id = ?",
        table
    );
    Ok(sqlx::query_scalar::<_, bool>(&sql)
        .bind(binding_id)
        .fetch_optional(&mut *conn)
        .await?)
}

fn ensure_unlocked(locked: Option<bool>, table: &'static str, id: i64) -> AuthResult<()> {
    match locked {
        Some(true) => Err(AuthError::Conflict(format!(
            "{} {} references a locked role",
            table, id
        ))),
        _ => Ok(()),
    }
}

fn ensure_single_default(account: &Account) -> AuthResult<()> {
    if account.default_character_count() > 1 {
        return Err(AuthError::Internal(format!(
            "account {} has more than one default character",
            account.id
        )));
    }
    Ok(())
}

async fn save_character_in(
    conn: &mut MySqlConnection,
    mut character: Character,
) -> AuthResult<Character> {
    if character.id.is_persisted() {
        let result = sqlx::query(
            r#"
            UPDATE characters SET
                accountid = ?, corporationid = ?, name = ?, evecharacterid = ?,
                defaultcharacter = ?, active = ?
            WHERE id = ?
            "#,
        )
        .bind(character.account_id.get())
        .bind(character.corporation_id.get())
        .bind(&character.name)
        .bind(character.eve_character_id)
        .bind(character.default_character)
        .bind(character.active)
        .bind(character.id.get())
        .execute(&mut *conn)
        .await?;
        ensure_updated(conn, result.rows_affected(), "characters", character.id.get()).await?;
    } else {
        let result = sqlx::query(
            r#"
            INSERT INTO characters (
                accountid, corporationid, name, evecharacterid, defaultcharacter, active
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(character.account_id.get())
        .bind(character.corporation_id.get())
        .bind(&character.name)
        .bind(character.eve_character_id)
        .bind(character.default_character)
        .bind(character.active)
        .execute(&mut *conn)
        .await?;
        character.id = CharacterId::new(result.last_insert_id() as i64);
    }
    Ok(character)
}

async fn save_account_in(conn: &mut MySqlConnection, mut account: Account) -> AuthResult<Account> {
    ensure_single_default(&account)?;

    if account.id.is_persisted() {
        let result = sqlx::query(
            r#"
            UPDATE accounts SET
                userid = ?, apikeyid = ?, apivcode = ?, apiaccessmask = ?, active = ?
            WHERE id = ?
            "#,
        )
        .bind(account.user_id.get())
        .bind(account.api_key_id)
        .bind(&account.api_vcode)
        .bind(account.api_access_mask)
        .bind(account.active)
        .bind(account.id.get())
        .execute(&mut *conn)
        .await?;
        ensure_updated(conn, result.rows_affected(), "accounts", account.id.get()).await?;
    } else {
        let result = sqlx::query(
            r#"
            INSERT INTO accounts (userid, apikeyid, apivcode, apiaccessmask, active)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.user_id.get())
        .bind(account.api_key_id)
        .bind(&account.api_vcode)
        .bind(account.api_access_mask)
        .bind(account.active)
        .execute(&mut *conn)
        .await?;
        account.id = AccountId::new(result.last_insert_id() as i64);
    }

    let characters = std::mem::take(&mut account.characters);
    for mut character in characters {
        character.account_id = account.id;
        account.characters.push(save_character_in(conn, character).await?);
    }
    Ok(account)
}

fn ensure_role_persisted(role: &Role) -> AuthResult<()> {
    if !role.id.is_persisted() {
        return Err(AuthError::Internal(format!(
            "role {:?} must be saved before it is bound",
            role.name
        )));
    }
    Ok(())
}

async fn save_user_role_in(
    conn: &mut MySqlConnection,
    mut user_role: UserRole,
) -> AuthResult<UserRole> {
    ensure_role_persisted(&user_role.role)?;

    if user_role.id.is_persisted() {
        let result = sqlx::query(
            "UPDATE userroles SET userid = ?, roleid = ?, autoadded = ?, granted = ? WHERE id = ?",
        )
        .bind(user_role.user_id.get())
        .bind(user_role.role.id.get())
        .bind(user_role.auto_added)
        .bind(user_role.granted)
        .bind(user_role.id.get())
        .execute(&mut *conn)
        .await?;
        ensure_updated(conn, result.rows_affected(), "userroles", user_role.id.get()).await?;
    } else {
        let result = sqlx::query(
            "INSERT INTO userroles (userid, roleid, autoadded, granted) VALUES (?, ?, ?, ?)",
        )
        .bind(user_role.user_id.get())
        .bind(user_role.role.id.get())
        .bind(user_role.auto_added)
        .bind(user_role.granted)
        .execute(&mut *conn)
        .await?;
        user_role.id = UserRoleId::new(result.last_insert_id() as i64);
    }
    Ok(user_role)
}

async fn save_group_role_in(
    conn: &mut MySqlConnection,
    mut group_role: GroupRole,
) -> AuthResult<GroupRole> {
    ensure_role_persisted(&group_role.role)?;

    if group_role.id.is_persisted() {
        let result = sqlx::query(
            "UPDATE grouproles SET groupid = ?, roleid = ?, autoadded = ?, granted = ? WHERE id = ?",
        )
        .bind(group_role.group_id.get())
        .bind(group_role.role.id.get())
        .bind(group_role.auto_added)
        .bind(group_role.granted)
        .bind(group_role.id.get())
        .execute(&mut *conn)
        .await?;
        ensure_updated(conn, result.rows_affected(), "grouproles", group_role.id.get()).await?;
    } else {
        let result = sqlx::query(
            "INSERT INTO grouproles (groupid, roleid, autoadded, granted) VALUES (?, ?, ?, ?)",
        )
        .bind(group_role.group_id.get())
        .bind(group_role.role.id.get())
        .bind(group_role.auto_added)
        .bind(group_role.granted)
        .execute(&mut *conn)
        .await?;
        group_role.id = GroupRoleId::new(result.last_insert_id() as i64);
    }
    Ok(group_role)
}

/// Activate listed memberships and deactivate every other active one
async fn reconcile_memberships(
    conn: &mut MySqlConnection,
    user_id: i64,
    groups: &[Group],
) -> AuthResult<()> {
    for group in groups {
        if !group.id.is_persisted() {
            return Err(AuthError::Internal(format!(
                "group {:?} must be saved before users join it",
                group.name
            )));
        }
        sqlx::query(
            r#"
            INSERT INTO usergroups (userid, groupid, active) VALUES (?, ?, 1)
            ON DUPLICATE KEY UPDATE active = 1
            "#,
        )
        .bind(user_id)
        .bind(group.id.get())
        .execute(&mut *conn)
        .await?;
    }

    let active: Vec<i64> =
        sqlx::query_scalar("SELECT groupid FROM usergroups WHERE userid = ? AND active = 1")
            .bind(user_id)
            .fetch_all(&mut *conn)
            .await?;

    for group_id in active {
        if !groups.iter().any(|g| g.id.get() == group_id) {
            sqlx::query("UPDATE usergroups SET active = 0 WHERE userid = ? AND groupid = ?")
                .bind(user_id)
                .bind(group_id)
                .execute(&mut *conn)
                .await?;
        }
    }
    Ok(())
}

async fn delete_account_in(conn: &mut MySqlConnection, id: i64) -> AuthResult<()> {
    sqlx::query("DELETE FROM characters WHERE accountid = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM accounts WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

// ============================================================================
// User Repository Implementation
// ============================================================================

impl UserRepository for MySqlStore {
    async fn load_all_users(&self) -> AuthResult<Vec<User>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS);
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .fetch_all(&mut *conn)
            .await?;

        let mut users = Vec::with_capacity(rows.len());
        for row in rows {
            users.push(hydrate_user(&mut conn, row).await?);
        }
        Ok(users)
    }

    async fn load_user(&self, id: UserId) -> AuthResult<User> {
        let mut conn = self.pool.acquire().await?;
        load_user_in(&mut conn, id.get()).await
    }

    async fn load_user_by_username(&self, username: &str) -> AuthResult<User> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(username)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AuthError::not_found("user", username))?;
        hydrate_user(&mut conn, row).await
    }

    async fn load_password_for_user(&self, username: &str) -> AuthResult<HashedPassword> {
        let hash: Option<String> =
            sqlx::query_scalar("SELECT password FROM users WHERE username = ?")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
        hash.map(HashedPassword::from_db)
            .ok_or_else(|| AuthError::not_found("user", username))
    }

    async fn query_user_id_exists(&self, id: UserId) -> AuthResult<bool> {
        let mut conn = self.pool.acquire().await?;
        row_exists(&mut conn, "users", id.get()).await
    }

    async fn query_username_or_email_exists(
        &self,
        username: &str,
        email: &str,
    ) -> AuthResult<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = ? OR email = ?")
                .bind(username)
                .bind(email)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    async fn save_user(&self, mut user: User) -> AuthResult<User> {
        for account in &user.accounts {
            ensure_single_default(account)?;
        }

        let mut tx = self.pool.begin().await?;

        if user.id.is_persisted() {
            let result = sqlx::query(
                r#"
                UPDATE users SET
                    username = ?, password = ?, email = ?, verifiedemail = ?, active = ?
                WHERE id = ?
                "#,
            )
            .bind(&user.username)
            .bind(user.password.as_str())
            .bind(&user.email)
            .bind(user.verified_email)
            .bind(user.active)
            .bind(user.id.get())
            .execute(&mut *tx)
            .await?;
            ensure_updated(&mut tx, result.rows_affected(), "users", user.id.get()).await?;
        } else {
            let result = sqlx::query(
                r#"
                INSERT INTO users (username, password, email, verifiedemail, active)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&user.username)
            .bind(user.password.as_str())
            .bind(&user.email)
            .bind(user.verified_email)
            .bind(user.active)
            .execute(&mut *tx)
            .await?;
            user.id = UserId::new(result.last_insert_id() as i64);
        }

        for mut account in std::mem::take(&mut user.accounts) {
            account.user_id = user.id;
            save_account_in(&mut tx, account).await?;
        }
        for mut user_role in std::mem::take(&mut user.user_roles) {
            user_role.user_id = user.id;
            save_user_role_in(&mut tx, user_role).await?;
        }
        reconcile_memberships(&mut tx, user.id.get(), &user.groups).await?;

        let saved = load_user_in(&mut tx, user.id.get()).await?;
        tx.commit().await?;

        tracing::debug!(user_id = %saved.id, "User saved");
        Ok(saved)
    }

    async fn delete_user(&self, id: UserId) -> AuthResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE c FROM characters c JOIN accounts a ON a.id = c.accountid WHERE a.userid = ?",
        )
        .bind(id.get())
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM accounts WHERE userid = ?")
            .bind(id.get())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM userroles WHERE userid = ?")
            .bind(id.get())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM usergroups WHERE userid = ?")
            .bind(id.get())
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id.get())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        tracing::info!(user_id = %id, deleted, "User deleted");
        Ok(())
    }

    async fn load_groups_for_user(&self, id: UserId) -> AuthResult<Vec<Group>> {
        let mut conn = self.pool.acquire().await?;
        groups_for_user(&mut conn, id.get()).await
    }

    async fn load_available_groups_for_user(&self, id: UserId) -> AuthResult<Vec<Group>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, GroupRow>(
            r#"
            SELECT g.id, g.name, g.active
            FROM `groups` g
            WHERE NOT EXISTS (
                SELECT 1 FROM usergroups ug
                WHERE ug.groupid = g.id AND ug.userid = ? AND ug.active = 1
            )
            ORDER BY g.name, g.id
            "#,
        )
        .bind(id.get())
        .fetch_all(&mut *conn)
        .await?;
        hydrate_groups(&mut conn, rows).await
    }

    async fn remove_user_from_group(
        &self,
        user_id: UserId,
        group_id: GroupId,
    ) -> AuthResult<User> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM usergroups WHERE userid = ? AND groupid = ?")
            .bind(user_id.get())
            .bind(group_id.get())
            .execute(&mut *tx)
            .await?;
        let user = load_user_in(&mut tx, user_id.get()).await?;
        tx.commit().await?;
        Ok(user)
    }

    async fn remove_api_key_from_user(&self, mut user: User, api_key_id: i64) -> AuthResult<User> {
        let mut tx = self.pool.begin().await?;
        let account_ids: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM accounts WHERE userid = ? AND apikeyid = ?")
                .bind(user.id.get())
                .bind(api_key_id)
                .fetch_all(&mut *tx)
                .await?;
        for id in &account_ids {
            delete_account_in(&mut tx, *id).await?;
        }
        tx.commit().await?;

        user.accounts.retain(|a| a.api_key_id != api_key_id);
        Ok(user)
    }
}

// ============================================================================
// Account / Character Repository Implementations
// ============================================================================

impl AccountRepository for MySqlStore {
    async fn load_all_accounts(&self) -> AuthResult<Vec<Account>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!("SELECT {} FROM accounts ORDER BY id", ACCOUNT_COLUMNS);
        let rows = sqlx::query_as::<_, AccountRow>(&sql)
            .fetch_all(&mut *conn)
            .await?;

        let mut accounts = Vec::with_capacity(rows.len());
        for row in rows {
            accounts.push(hydrate_account(&mut conn, row).await?);
        }
        Ok(accounts)
    }

    async fn load_account(&self, id: AccountId) -> AuthResult<Account> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!("SELECT {} FROM accounts WHERE id = ?", ACCOUNT_COLUMNS);
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(id.get())
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AuthError::not_found("account", id))?;
        hydrate_account(&mut conn, row).await
    }

    async fn load_accounts_for_user(&self, user_id: UserId) -> AuthResult<Vec<Account>> {
        let mut conn = self.pool.acquire().await?;
        accounts_for_user(&mut conn, user_id.get()).await
    }

    async fn save_account(&self, account: Account) -> AuthResult<Account> {
        let mut tx = self.pool.begin().await?;
        let saved = save_account_in(&mut tx, account).await?;
        tx.commit().await?;
        Ok(saved)
    }

    async fn delete_account(&self, id: AccountId) -> AuthResult<()> {
        let mut tx = self.pool.begin().await?;
        delete_account_in(&mut tx, id.get()).await?;
        tx.commit().await?;
        Ok(())
    }
}

impl CharacterRepository for MySqlStore {
    async fn load_all_characters(&self) -> AuthResult<Vec<Character>> {
        let sql = format!("SELECT {} FROM characters ORDER BY id", CHARACTER_COLUMNS);
        let rows = sqlx::query_as::<_, CharacterRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(CharacterRow::into_character).collect())
    }

    async fn load_character(&self, id: CharacterId) -> AuthResult<Character> {
        let sql = format!("SELECT {} FROM characters WHERE id = ?", CHARACTER_COLUMNS);
        sqlx::query_as::<_, CharacterRow>(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?
            .map(CharacterRow::into_character)
            .ok_or_else(|| AuthError::not_found("character", id))
    }

    async fn load_characters_for_account(
        &self,
        account_id: AccountId,
    ) -> AuthResult<Vec<Character>> {
        let mut conn = self.pool.acquire().await?;
        characters_for_account(&mut conn, account_id.get()).await
    }

    async fn save_character(&self, character: Character) -> AuthResult<Character> {
        let mut tx = self.pool.begin().await?;

        if character.default_character {
            let others: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM characters WHERE accountid = ? AND defaultcharacter = 1 AND id <> ?",
            )
            .bind(character.account_id.get())
            .bind(character.id.get())
            .fetch_one(&mut *tx)
            .await?;
            if others > 0 {
                return Err(AuthError::Internal(format!(
                    "account {} already has a default character",
                    character.account_id
                )));
            }
        }

        let saved = save_character_in(&mut tx, character).await?;
        tx.commit().await?;
        Ok(saved)
    }

    async fn delete_character(&self, id: CharacterId) -> AuthResult<()> {
        sqlx::query("DELETE FROM characters WHERE id = ?")
            .bind(id.get())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ============================================================================
// Corporation Repository Implementation
// ============================================================================

impl CorporationRepository for MySqlStore {
    async fn load_all_corporations(&self) -> AuthResult<Vec<Corporation>> {
        let sql = format!("SELECT {} FROM corporations ORDER BY id", CORPORATION_COLUMNS);
        let rows = sqlx::query_as::<_, CorporationRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(CorporationRow::into_corporation).collect())
    }

    async fn load_corporation(&self, id: CorporationId) -> AuthResult<Corporation> {
        let sql = format!("SELECT {} FROM corporations WHERE id = ?", CORPORATION_COLUMNS);
        sqlx::query_as::<_, CorporationRow>(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?
            .map(CorporationRow::into_corporation)
            .ok_or_else(|| AuthError::not_found("corporation", id))
    }

    async fn load_corporation_by_eve_id(&self, eve_corporation_id: i64) -> AuthResult<Corporation> {
        let sql = format!(
            "SELECT {} FROM corporations WHERE evecorporationid = ?",
            CORPORATION_COLUMNS
        );
        sqlx::query_as::<_, CorporationRow>(&sql)
            .bind(eve_corporation_id)
            .fetch_optional(&self.pool)
            .await?
            .map(CorporationRow::into_corporation)
            .ok_or_else(|| AuthError::not_found("corporation", eve_corporation_id))
    }

    async fn save_corporation(&self, mut corporation: Corporation) -> AuthResult<Corporation> {
        let (api_key_id, api_vcode) = corporation.api_columns();

        if corporation.id.is_persisted() {
            let mut tx = self.pool.begin().await?;
            let result = sqlx::query(
                r#"
                UPDATE corporations SET
                    name = ?, ticker = ?, evecorporationid = ?, ceo = ?,
                    apikeyid = ?, apivcode = ?, active = ?
                WHERE id = ?
                "#,
            )
            .bind(&corporation.name)
            .bind(&corporation.ticker)
            .bind(corporation.eve_corporation_id)
            .bind(corporation.ceo_id)
            .bind(api_key_id)
            .bind(api_vcode)
            .bind(corporation.active)
            .bind(corporation.id.get())
            .execute(&mut *tx)
            .await?;
            ensure_updated(
                &mut tx,
                result.rows_affected(),
                "corporations",
                corporation.id.get(),
            )
            .await?;
            tx.commit().await?;
        } else {
            let result = sqlx::query(
                r#"
                INSERT INTO corporations (
                    name, ticker, evecorporationid, ceo, apikeyid, apivcode, active
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&corporation.name)
            .bind(&corporation.ticker)
            .bind(corporation.eve_corporation_id)
            .bind(corporation.ceo_id)
            .bind(api_key_id)
            .bind(api_vcode)
            .bind(corporation.active)
            .execute(&self.pool)
            .await?;
            corporation.id = CorporationId::new(result.last_insert_id() as i64);
        }
        Ok(corporation)
    }

    async fn delete_corporation(&self, id: CorporationId) -> AuthResult<()> {
        // Referencing characters make this a foreign key violation (Conflict)
        sqlx::query("DELETE FROM corporations WHERE id = ?")
            .bind(id.get())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ============================================================================
// Role / Binding Repository Implementations
// ============================================================================

impl RoleRepository for MySqlStore {
    async fn load_all_roles(&self) -> AuthResult<Vec<Role>> {
        let rows = sqlx::query_as::<_, RoleRow>("SELECT id, name, active, locked FROM roles ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(RoleRow::into_role).collect())
    }

    async fn load_role(&self, id: RoleId) -> AuthResult<Role> {
        sqlx::query_as::<_, RoleRow>("SELECT id, name, active, locked FROM roles WHERE id = ?")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?
            .map(RoleRow::into_role)
            .ok_or_else(|| AuthError::not_found("role", id))
    }

    async fn save_role(&self, mut role: Role) -> AuthResult<Role> {
        if role.id.is_persisted() {
            let mut tx = self.pool.begin().await?;
            let result =
                sqlx::query("UPDATE roles SET name = ?, active = ?, locked = ? WHERE id = ?")
                    .bind(&role.name)
                    .bind(role.active)
                    .bind(role.locked)
                    .bind(role.id.get())
                    .execute(&mut *tx)
                    .await?;
            ensure_updated(&mut tx, result.rows_affected(), "roles", role.id.get()).await?;
            tx.commit().await?;
        } else {
            let result = sqlx::query("INSERT INTO roles (name, active, locked) VALUES (?, ?, ?)")
                .bind(&role.name)
                .bind(role.active)
                .bind(role.locked)
                .execute(&self.pool)
                .await?;
            role.id = RoleId::new(result.last_insert_id() as i64);
        }
        Ok(role)
    }

    async fn delete_role(&self, id: RoleId) -> AuthResult<()> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<bool> = sqlx::query_scalar("SELECT locked FROM roles WHERE id = ?")
            .bind(id.get())
            .fetch_optional(&mut *tx)
            .await?;
        match locked {
            None => return Ok(()),
            Some(true) => {
                return Err(AuthError::Conflict(format!("role {} is locked", id)));
            }
            Some(false) => {}
        }

        sqlx::query("DELETE FROM userroles WHERE roleid = ?")
            .bind(id.get())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM grouproles WHERE roleid = ?")
            .bind(id.get())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM roles WHERE id = ?")
            .bind(id.get())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

impl UserRoleRepository for MySqlStore {
    async fn load_all_user_roles(&self) -> AuthResult<Vec<UserRole>> {
        let sql = format!("{} ORDER BY b.id", USER_ROLE_SELECT);
        let rows = sqlx::query_as::<_, BindingRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(BindingRow::into_user_role).collect())
    }

    async fn load_user_role(&self, id: UserRoleId) -> AuthResult<UserRole> {
        let sql = format!("{} WHERE b.id = ?", USER_ROLE_SELECT);
        sqlx::query_as::<_, BindingRow>(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?
            .map(BindingRow::into_user_role)
            .ok_or_else(|| AuthError::not_found("userrole", id))
    }

    async fn load_user_roles_for_user(&self, user_id: UserId) -> AuthResult<Vec<UserRole>> {
        let mut conn = self.pool.acquire().await?;
        user_roles_for_user(&mut conn, user_id.get()).await
    }

    async fn load_available_user_roles_for_user(&self, user_id: UserId) -> AuthResult<Vec<Role>> {
        let rows = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT r.id, r.name, r.active, r.locked
            FROM roles r
            WHERE NOT EXISTS (
                SELECT 1 FROM userroles b WHERE b.roleid = r.id AND b.userid = ?
            )
            ORDER BY r.name, r.id
            "#,
        )
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(RoleRow::into_role).collect())
    }

    async fn save_user_role(&self, user_role: UserRole) -> AuthResult<UserRole> {
        let mut conn = self.pool.acquire().await?;
        save_user_role_in(&mut conn, user_role).await
    }

    async fn delete_user_role(&self, id: UserRoleId) -> AuthResult<()> {
        let mut tx = self.pool.begin().await?;
        let locked = binding_role_locked(&mut tx, "userroles", id.get()).await?;
        ensure_unlocked(locked, "userroles", id.get())?;
        sqlx::query("DELETE FROM userroles WHERE id = ?")
            .bind(id.get())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn remove_user_role_from_user(
        &self,
        user_id: UserId,
        user_role_id: UserRoleId,
    ) -> AuthResult<User> {
        let mut tx = self.pool.begin().await?;
        let locked = binding_role_locked(&mut tx, "userroles", user_role_id.get()).await?;
        ensure_unlocked(locked, "userroles", user_role_id.get())?;
        sqlx::query("DELETE FROM userroles WHERE id = ? AND userid = ?")
            .bind(user_role_id.get())
            .bind(user_id.get())
            .execute(&mut *tx)
            .await?;
        let user = load_user_in(&mut tx, user_id.get()).await?;
        tx.commit().await?;
        Ok(user)
    }

    async fn toggle_user_role_granted(&self, id: UserRoleId) -> AuthResult<UserRole> {
        let mut tx = self.pool.begin().await?;
        let locked = binding_role_locked(&mut tx, "userroles", id.get()).await?;
        if locked.is_none() {
            return Err(AuthError::not_found("userrole", id));
        }
        ensure_unlocked(locked, "userroles", id.get())?;

        sqlx::query("UPDATE userroles SET granted = NOT granted WHERE id = ?")
            .bind(id.get())
            .execute(&mut *tx)
            .await?;
        let sql = format!("{} WHERE b.id = ?", USER_ROLE_SELECT);
        let row = sqlx::query_as::<_, BindingRow>(&sql)
            .bind(id.get())
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(row.into_user_role())
    }
}

impl GroupRoleRepository for MySqlStore {
    async fn load_all_group_roles(&self) -> AuthResult<Vec<GroupRole>> {
        let sql = format!("{} ORDER BY b.id", GROUP_ROLE_SELECT);
        let rows = sqlx::query_as::<_, BindingRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(BindingRow::into_group_role).collect())
    }

    async fn load_group_role(&self, id: GroupRoleId) -> AuthResult<GroupRole> {
        let sql = format!("{} WHERE b.id = ?", GROUP_ROLE_SELECT);
        sqlx::query_as::<_, BindingRow>(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?
            .map(BindingRow::into_group_role)
            .ok_or_else(|| AuthError::not_found("grouprole", id))
    }

    async fn load_group_roles_for_group(&self, group_id: GroupId) -> AuthResult<Vec<GroupRole>> {
        let mut conn = self.pool.acquire().await?;
        group_roles_for_group(&mut conn, group_id.get()).await
    }

    async fn load_available_group_roles_for_group(
        &self,
        group_id: GroupId,
    ) -> AuthResult<Vec<Role>> {
        let rows = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT r.id, r.name, r.active, r.locked
            FROM roles r
            WHERE NOT EXISTS (
                SELECT 1 FROM grouproles b WHERE b.roleid = r.id AND b.groupid = ?
            )
            ORDER BY r.name, r.id
            "#,
        )
        .bind(group_id.get())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(RoleRow::into_role).collect())
    }

    async fn save_group_role(&self, group_role: GroupRole) -> AuthResult<GroupRole> {
        let mut conn = self.pool.acquire().await?;
        save_group_role_in(&mut conn, group_role).await
    }

    async fn delete_group_role(&self, id: GroupRoleId) -> AuthResult<()> {
        let mut tx = self.pool.begin().await?;
        let locked = binding_role_locked(&mut tx, "grouproles", id.get()).await?;
        ensure_unlocked(locked, "grouproles", id.get())?;
        sqlx::query("DELETE FROM grouproles WHERE id = ?")
            .bind(id.get())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn remove_group_role_from_group(
        &self,
        group_id: GroupId,
        group_role_id: GroupRoleId,
    ) -> AuthResult<Group> {
        let mut tx = self.pool.begin().await?;
        let locked = binding_role_locked(&mut tx, "grouproles", group_role_id.get()).await?;
        ensure_unlocked(locked, "grouproles", group_role_id.get())?;
        sqlx::query("DELETE FROM grouproles WHERE id = ? AND groupid = ?")
            .bind(group_role_id.get())
            .bind(group_id.get())
            .execute(&mut *tx)
            .await?;
        let group = load_group_in(&mut tx, group_id.get()).await?;
        tx.commit().await?;
        Ok(group)
    }

    async fn toggle_group_role_granted(&self, id: GroupRoleId) -> AuthResult<GroupRole> {
        let mut tx = self.pool.begin().await?;
        let locked = binding_role_locked(&mut tx, "grouproles", id.get()).await?;
        if locked.is_none() {
            return Err(AuthError::not_found("grouprole", id));
        }
        ensure_unlocked(locked, "grouproles", id.get())?;

        sqlx::query("UPDATE grouproles SET granted = NOT granted WHERE id = ?")
            .bind(id.get())
            .execute(&mut *tx)
            .await?;
        let sql = format!("{} WHERE b.id = ?", GROUP_ROLE_SELECT);
        let row = sqlx::query_as::<_, BindingRow>(&sql)
            .bind(id.get())
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(row.into_group_role())
    }
}

// ============================================================================
// Group Repository Implementation
// ============================================================================

impl GroupRepository for MySqlStore {
    async fn load_all_groups(&self) -> AuthResult<Vec<Group>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, GroupRow>("SELECT id, name, active FROM `groups` ORDER BY id")
            .fetch_all(&mut *conn)
            .await?;
        hydrate_groups(&mut conn, rows).await
    }

    async fn load_group(&self, id: GroupId) -> AuthResult<Group> {
        let mut conn = self.pool.acquire().await?;
        load_group_in(&mut conn, id.get()).await
    }

    async fn save_group(&self, mut group: Group) -> AuthResult<Group> {
        let mut tx = self.pool.begin().await?;

        if group.id.is_persisted() {
            let result = sqlx::query("UPDATE `groups` SET name = ?, active = ? WHERE id = ?")
                .bind(&group.name)
                .bind(group.active)
                .bind(group.id.get())
                .execute(&mut *tx)
                .await?;
            ensure_updated(&mut tx, result.rows_affected(), "`groups`", group.id.get()).await?;
        } else {
            let result = sqlx::query("INSERT INTO `groups` (name, active) VALUES (?, ?)")
                .bind(&group.name)
                .bind(group.active)
                .execute(&mut *tx)
                .await?;
            group.id = GroupId::new(result.last_insert_id() as i64);
        }

        for mut group_role in std::mem::take(&mut group.group_roles) {
            group_role.group_id = group.id;
            save_group_role_in(&mut tx, group_role).await?;
        }

        let saved = load_group_in(&mut tx, group.id.get()).await?;
        tx.commit().await?;
        Ok(saved)
    }

    async fn delete_group(&self, id: GroupId) -> AuthResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM grouproles WHERE groupid = ?")
            .bind(id.get())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM usergroups WHERE groupid = ?")
            .bind(id.get())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM `groups` WHERE id = ?")
            .bind(id.get())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

// ============================================================================
// Application Repository Implementation
// ============================================================================

impl ApplicationRepository for MySqlStore {
    async fn load_all_applications(&self) -> AuthResult<Vec<Application>> {
        let sql = format!("SELECT {} FROM applications ORDER BY id", APPLICATION_COLUMNS);
        let rows = sqlx::query_as::<_, ApplicationRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(ApplicationRow::into_application).collect())
    }

    async fn load_application(&self, id: ApplicationId) -> AuthResult<Application> {
        let sql = format!("SELECT {} FROM applications WHERE id = ?", APPLICATION_COLUMNS);
        sqlx::query_as::<_, ApplicationRow>(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?
            .map(ApplicationRow::into_application)
            .ok_or_else(|| AuthError::not_found("application", id))
    }

    async fn save_application(&self, mut application: Application) -> AuthResult<Application> {
        application.callback_url()?;

        if application.id.is_persisted() {
            let mut tx = self.pool.begin().await?;
            let result = sqlx::query(
                r#"
                UPDATE applications SET
                    name = ?, maintainerid = ?, secret = ?, callback = ?, active = ?
                WHERE id = ?
                "#,
            )
            .bind(&application.name)
            .bind(application.maintainer_id.get())
            .bind(application.secret.as_str())
            .bind(&application.callback)
            .bind(application.active)
            .bind(application.id.get())
            .execute(&mut *tx)
            .await?;
            ensure_updated(
                &mut tx,
                result.rows_affected(),
                "applications",
                application.id.get(),
            )
            .await?;
            tx.commit().await?;
        } else {
            let result = sqlx::query(
                r#"
                INSERT INTO applications (name, maintainerid, secret, callback, active)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&application.name)
            .bind(application.maintainer_id.get())
            .bind(application.secret.as_str())
            .bind(&application.callback)
            .bind(application.active)
            .execute(&self.pool)
            .await?;
            application.id = ApplicationId::new(result.last_insert_id() as i64);
        }
        Ok(application)
    }

    async fn delete_application(&self, id: ApplicationId) -> AuthResult<()> {
        sqlx::query("DELETE FROM applications WHERE id = ?")
            .bind(id.get())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ============================================================================
// Audit Repository Implementation
// ============================================================================

impl AuditRepository for MySqlStore {
    async fn record_login_attempt(&self, mut attempt: LoginAttempt) -> AuthResult<LoginAttempt> {
        let result = sqlx::query(
            r#"
            INSERT INTO loginattempts (username, remoteaddr, useragent, successful, timestamp)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&attempt.username)
        .bind(&attempt.remote_addr)
        .bind(&attempt.user_agent)
        .bind(attempt.successful)
        .bind(attempt.timestamp)
        .execute(&self.pool)
        .await?;
        attempt.id = LoginAttemptId::new(result.last_insert_id() as i64);
        Ok(attempt)
    }

    async fn record_csrf_failure(&self, mut failure: CsrfFailure) -> AuthResult<CsrfFailure> {
        let result = sqlx::query(
            "INSERT INTO csrffailures (userid, request, timestamp) VALUES (?, ?, ?)",
        )
        .bind(failure.user_id.get())
        .bind(&failure.request)
        .bind(failure.timestamp)
        .execute(&self.pool)
        .await?;
        failure.id = CsrfFailureId::new(result.last_insert_id() as i64);
        Ok(failure)
    }

    async fn load_login_attempts_for_username(
        &self,
        username: &str,
    ) -> AuthResult<Vec<LoginAttempt>> {
        let rows = sqlx::query_as::<_, LoginAttemptRow>(
            r#"
            SELECT id, username, remoteaddr, useragent, successful, timestamp
            FROM loginattempts
            WHERE username = ?
            ORDER BY id
            "#,
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| LoginAttempt {
                id: LoginAttemptId::new(r.id),
                username: r.username,
                remote_addr: r.remoteaddr,
                user_agent: r.useragent,
                successful: r.successful,
                timestamp: r.timestamp,
            })
            .collect())
    }
}

// ============================================================================
// Raw Query
// ============================================================================

impl RawQueryRepository for MySqlStore {
    async fn raw_query(&self, sql: &str, args: Vec<Value>) -> AuthResult<Vec<Map<String, Value>>> {
        let mut query = sqlx::query(sql);
        for arg in args {
            query = match arg {
                Value::Null => query.bind(None::<String>),
                Value::Bool(b) => query.bind(b),
                Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                    (Some(i), _) => query.bind(i),
                    (None, Some(f)) => query.bind(f),
                    (None, None) => query.bind(n.to_string()),
                },
                Value::String(s) => query.bind(s),
                other => query.bind(other.to_string()),
            };
        }

        // Driver errors are passed through without classification
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(AuthError::Database)?;
        rows.iter().map(row_to_map).collect()
    }
}

fn row_to_map(row: &MySqlRow) -> AuthResult<Map<String, Value>> {
    let mut map = Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), column_value(row, idx)?);
    }
    Ok(map)
}

fn column_value(row: &MySqlRow, idx: usize) -> AuthResult<Value> {
    let raw = row.try_get_raw(idx).map_err(AuthError::Database)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let type_name = raw.type_info().name().to_string();
    let value = match type_name.as_str() {
        "BOOLEAN" => Value::from(row.try_get::<bool, _>(idx).map_err(AuthError::Database)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            Value::from(row.try_get::<i64, _>(idx).map_err(AuthError::Database)?)
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => {
            Value::from(row.try_get::<u64, _>(idx).map_err(AuthError::Database)?)
        }
        "FLOAT" | "DOUBLE" => Value::from(row.try_get::<f64, _>(idx).map_err(AuthError::Database)?),
        "DATETIME" | "TIMESTAMP" => Value::from(
            row.try_get::<NaiveDateTime, _>(idx)
                .map_err(AuthError::Database)?
                .to_string(),
        ),
        _ => match row.try_get::<String, _>(idx) {
            Ok(s) => Value::from(s),
            Err(_) => {
                let bytes = row.try_get::<Vec<u8>, _>(idx).map_err(AuthError::Database)?;
                Value::from(String::from_utf8_lossy(&bytes).into_owned())
            }
        },
    };
    Ok(value)
}
