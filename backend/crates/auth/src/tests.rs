//! Cross-layer scenarios: HTTP router, use cases and stores wired together
//! the way the server wires them.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use kernel::error::kind::ErrorKind;
use kernel::id::{AccountId, GroupId, RoleId, UserId};
use platform::crypto::decrypt;
use platform::mail::LogMailer;
use platform::password::ClearTextPassword;
use serde_json::Value;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use url::Url;

use crate::application::{AdministrationUseCase, SignUpInput, SignUpUseCase, UpdateUserInput};
use crate::domain::authorization::{effective_roles, has_role};
use crate::domain::entity::{Account, Character, Corporation, Group, GroupRole, Role, User, UserRole};
use crate::domain::repository::{
    AccountRepository, AuditRepository, CharacterRepository, CorporationRepository,
    GroupRepository, GroupRoleRepository, RoleRepository, UserRepository, UserRoleRepository,
};
use crate::{AuthAppState, AuthConfig, FileSessionStore, MemoryStore, SessionController, auth_router};

// ===== Harness =====

struct Harness {
    store: MemoryStore,
    app: Router,
    _sessions: TempDir,
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(AuthConfig::development().with_session_dir(dir.path()));
    let session_store = FileSessionStore::open(dir.path()).await.unwrap();
    let sessions = Arc::new(SessionController::new(
        Arc::new(session_store),
        config.clone(),
    ));

    let store = MemoryStore::new();
    let state = AuthAppState::new(
        store.clone(),
        sessions,
        config,
        Arc::new(LogMailer),
        CancellationToken::new(),
    );

    Harness {
        store,
        app: auth_router(state),
        _sessions: dir,
    }
}

async fn seed_user(store: &MemoryStore, username: &str, password: &str) -> User {
    let hash = ClearTextPassword::new(password).hash().unwrap();
    store
        .save_user(User::new(username, hash, format!("{}@example.com", username)))
        .await
        .unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_login(body: Value, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// `name=value` pairs of every cookie set (not removed) by the response
fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter(|pair| !pair.ends_with('='))
        .map(str::to_string)
        .collect()
}

fn cookie_header(cookies: &[String]) -> String {
    cookies.join("; ")
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ===== Login =====

#[tokio::test]
async fn test_login_success() {
    let h = harness().await;
    seed_user(&h.store, "test1", "test1").await;

    let response = h
        .app
        .clone()
        .oneshot(post_login(
            serde_json::json!({"username": "test1", "password": "test1"}),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookies = set_cookies(&response);
    assert!(cookies.iter().any(|c| c.starts_with("login=")));
    assert!(cookies.iter().any(|c| c.starts_with("user=")));

    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["error"], Value::Null);
    assert_eq!(body["loggedIn"], true);
    assert_eq!(body["redirect"], "/");

    let attempts = h.store.load_login_attempts_for_username("test1").await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert!(attempts[0].successful);

    // The cookies identify a logged-in session afterwards
    let response = h
        .app
        .clone()
        .oneshot(get("/", Some(&cookie_header(&cookies))))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["loggedIn"], true);
}

#[tokio::test]
async fn test_login_wrong_password() {
    let h = harness().await;
    seed_user(&h.store, "test1", "test1").await;

    let response = h
        .app
        .clone()
        .oneshot(post_login(
            serde_json::json!({"username": "test1", "password": "wrong"}),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(!set_cookies(&response).iter().any(|c| c.starts_with("login=")));

    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Auth");

    let attempts = h.store.load_login_attempts_for_username("test1").await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert!(!attempts[0].successful);
}

#[tokio::test]
async fn test_login_unknown_user_is_recorded() {
    let h = harness().await;

    let response = h
        .app
        .clone()
        .oneshot(post_login(
            serde_json::json!({"username": "ghost", "password": "boo"}),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let attempts = h.store.load_login_attempts_for_username("ghost").await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert!(!attempts[0].successful);
}

#[tokio::test]
async fn test_login_inactive_user() {
    let h = harness().await;
    let mut user = seed_user(&h.store, "test1", "test1").await;
    user.active = false;
    h.store.save_user(user).await.unwrap();

    let response = h
        .app
        .clone()
        .oneshot(post_login(
            serde_json::json!({"username": "test1", "password": "test1"}),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(!set_cookies(&response).iter().any(|c| c.starts_with("login=")));
}

#[tokio::test]
async fn test_login_csrf_token() {
    let h = harness().await;
    seed_user(&h.store, "test1", "test1").await;

    let response = h.app.clone().oneshot(get("/login", None)).await.unwrap();
    let cookies = cookie_header(&set_cookies(&response));
    let body = json_body(response).await;
    assert_eq!(body["loggedIn"], false);
    let csrf_token = body["csrfToken"].as_str().unwrap().to_string();

    let response = h
        .app
        .clone()
        .oneshot(post_login(
            serde_json::json!({"username": "test1", "password": "test1", "csrfToken": "forged"}),
            Some(&cookies),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    // Rejected before the password was checked
    assert!(h.store.load_login_attempts_for_username("test1").await.unwrap().is_empty());

    let response = h
        .app
        .clone()
        .oneshot(post_login(
            serde_json::json!({"username": "test1", "password": "test1", "csrfToken": csrf_token}),
            Some(&cookies),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["loggedIn"], true);
}

#[tokio::test]
async fn test_logout() {
    let h = harness().await;
    seed_user(&h.store, "test1", "test1").await;

    let response = h
        .app
        .clone()
        .oneshot(post_login(
            serde_json::json!({"username": "test1", "password": "test1"}),
            None,
        ))
        .await
        .unwrap();
    let cookies = cookie_header(&set_cookies(&response));

    let response = h
        .app
        .clone()
        .oneshot(get("/logout", Some(&cookies)))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["loggedIn"], false);
    assert_eq!(body["redirect"], "/");

    // The server-side record is gone even if the browser replays the cookie
    let response = h
        .app
        .clone()
        .oneshot(get("/", Some(&cookies)))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["loggedIn"], false);
}

#[tokio::test]
async fn test_sso_state() {
    let h = harness().await;

    let response = h.app.clone().oneshot(get("/login/sso", None)).await.unwrap();
    let cookies = cookie_header(&set_cookies(&response));
    let state = json_body(response).await["state"]
        .as_str()
        .unwrap()
        .to_string();

    let response = h
        .app
        .clone()
        .oneshot(get(&format!("/login/sso?state={}", state), Some(&cookies)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["success"], true);

    // A state is good for one check only
    let response = h
        .app
        .clone()
        .oneshot(get(&format!("/login/sso?state={}", state), Some(&cookies)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = h
        .app
        .clone()
        .oneshot(get("/login/sso?state=nope", Some(&cookies)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ===== Authorize =====

fn authorize_uri(app_id: i64, callback: &str, auth: &str, roles: Option<&str>) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    query
        .append_pair("app", &app_id.to_string())
        .append_pair("callback", callback)
        .append_pair("auth", auth);
    if let Some(roles) = roles {
        query.append_pair("roles", roles);
    }
    format!("/authorize?{}", query.finish())
}

#[tokio::test]
async fn test_authorize_flow() {
    let h = harness().await;
    let user = seed_user(&h.store, "test1", "test1").await;
    let token = CancellationToken::new();

    let admin = AdministrationUseCase::new(Arc::new(h.store.clone()));
    let app = admin
        .register_application("Fleet Tool", user.id, "https://fleet.example.com/cb", &token)
        .await
        .unwrap();
    let uri = authorize_uri(
        app.id.get(),
        &app.callback,
        &app.sign_request(&app.callback),
        None,
    );

    // Logged out: the request is remembered and the user sent to login
    let response = h.app.clone().oneshot(get(&uri, None)).await.unwrap();
    let cookies = cookie_header(&set_cookies(&response));
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["loggedIn"], false);
    assert_eq!(body["redirect"], "/login");

    let response = h
        .app
        .clone()
        .oneshot(post_login(
            serde_json::json!({"username": "test1", "password": "test1"}),
            Some(&cookies),
        ))
        .await
        .unwrap();
    let cookies = cookie_header(&set_cookies(&response));
    assert_eq!(json_body(response).await["redirect"], uri.as_str());

    let response = h
        .app
        .clone()
        .oneshot(get(&uri, Some(&cookies)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["loggedIn"], true);

    let redirect = Url::parse(body["redirect"].as_str().unwrap()).unwrap();
    assert_eq!(redirect.host_str(), Some("fleet.example.com"));
    let pairs: std::collections::HashMap<_, _> = redirect.query_pairs().into_owned().collect();
    assert_eq!(pairs["user"], user.id.to_string());

    let payload = decrypt(&pairs["payload"], app.secret.as_bytes()).unwrap();
    let payload: Value = serde_json::from_slice(&payload).unwrap();
    assert_eq!(payload["userId"], user.id.get());
    assert_eq!(payload["username"], "test1");
}

#[tokio::test]
async fn test_authorize_rejects_bad_signature_and_missing_roles() {
    let h = harness().await;
    let user = seed_user(&h.store, "test1", "test1").await;
    let token = CancellationToken::new();
    let app = AdministrationUseCase::new(Arc::new(h.store.clone()))
        .register_application("Fleet Tool", user.id, "https://fleet.example.com/cb", &token)
        .await
        .unwrap();

    let response = h
        .app
        .clone()
        .oneshot(post_login(
            serde_json::json!({"username": "test1", "password": "test1"}),
            None,
        ))
        .await
        .unwrap();
    let cookies = cookie_header(&set_cookies(&response));

    let forged = authorize_uri(app.id.get(), &app.callback, "AAAA", None);
    let response = h
        .app
        .clone()
        .oneshot(get(&forged, Some(&cookies)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Crypto");
    assert_eq!(body["success"], false);
    // The failure is reported against the session that made the request
    assert_eq!(body["loggedIn"], true);

    let other_callback = authorize_uri(
        app.id.get(),
        "https://evil.example.com/cb",
        &app.sign_request("https://evil.example.com/cb"),
        None,
    );
    let response = h
        .app
        .clone()
        .oneshot(get(&other_callback, Some(&cookies)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let needs_role = authorize_uri(
        app.id.get(),
        &app.callback,
        &app.sign_request(&app.callback),
        Some("ping.all"),
    );
    let response = h
        .app
        .clone()
        .oneshot(get(&needs_role, Some(&cookies)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Auth");
    assert_eq!(body["loggedIn"], true);
    assert_eq!(body["detail"], "Missing required roles: ping.all");
    assert_eq!(body["action"], "Ask an administrator for access");

    // Still logged in after the rejections
    let response = h.app.clone().oneshot(get("/", Some(&cookies))).await.unwrap();
    assert_eq!(json_body(response).await["loggedIn"], true);
}

#[tokio::test]
async fn test_error_response_when_logged_out() {
    let h = harness().await;
    seed_user(&h.store, "test1", "test1").await;

    let response = h.app.clone().oneshot(get("/login", None)).await.unwrap();
    let cookies = cookie_header(&set_cookies(&response));
    let csrf_token = json_body(response).await["csrfToken"]
        .as_str()
        .unwrap()
        .to_string();

    let response = h
        .app
        .clone()
        .oneshot(post_login(
            serde_json::json!({"username": "test1", "password": "nope", "csrfToken": csrf_token}),
            Some(&cookies),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["loggedIn"], false);
    assert_eq!(body["error"], "Auth");
    assert_eq!(body["action"], "Check your username and password");
}

// ===== Store scenarios =====

/// Roles #1 ping.all, #2 destroy.world (inactive), #3 logistics.read;
/// Group #1 grants ping.all and logistics.read; Group #2 is empty;
/// Users #1..#3, #1 and #3 are members of Group #1 and #3 holds destroy.world
async fn seed_roles_and_groups(store: &MemoryStore) {
    let ping = store.save_role(Role::new("ping.all")).await.unwrap();
    let mut destroy = Role::new("destroy.world");
    destroy.active = false;
    let destroy = store.save_role(destroy).await.unwrap();
    let logistics = store.save_role(Role::new("logistics.read")).await.unwrap();
    assert_eq!(
        (ping.id, destroy.id, logistics.id),
        (RoleId::new(1), RoleId::new(2), RoleId::new(3))
    );

    let mut fleet = store.save_group(Group::new("Fleet")).await.unwrap();
    fleet.group_roles.push(GroupRole::new(fleet.id, ping, true));
    fleet.group_roles.push(GroupRole::new(fleet.id, logistics, true));
    let fleet = store.save_group(fleet).await.unwrap();
    store.save_group(Group::new("Industry")).await.unwrap();

    for n in 1..=3 {
        let mut user = User::new(
            format!("pilot{}", n),
            ClearTextPassword::new("o7").hash().unwrap(),
            format!("pilot{}@example.com", n),
        );
        if n != 2 {
            user.groups.push(fleet.clone());
        }
        let mut user = store.save_user(user).await.unwrap();
        if n == 3 {
            user.user_roles
                .push(UserRole::new(user.id, destroy.clone(), true));
            store.save_user(user).await.unwrap();
        }
    }
}

#[tokio::test]
async fn test_permission_resolution() {
    let store = MemoryStore::new();
    seed_roles_and_groups(&store).await;

    let user = store.load_user(UserId::new(3)).await.unwrap();
    let expected: BTreeSet<String> = ["ping.all", "logistics.read"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(effective_roles(&user), expected);
    assert!(!has_role(&user, "destroy.world"));

    let loner = store.load_user(UserId::new(2)).await.unwrap();
    assert!(effective_roles(&loner).is_empty());
}

#[tokio::test]
async fn test_available_groups() {
    let store = MemoryStore::new();
    seed_roles_and_groups(&store).await;

    let available = store
        .load_available_groups_for_user(UserId::new(1))
        .await
        .unwrap();
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].id, GroupId::new(2));
    assert_eq!(available[0].name, "Industry");
}

#[tokio::test]
async fn test_toggle_user_role_granted_twice_restores() {
    let store = MemoryStore::new();
    seed_roles_and_groups(&store).await;

    let binding = store.load_user_roles_for_user(UserId::new(3)).await.unwrap()[0].clone();
    let once = store.toggle_user_role_granted(binding.id).await.unwrap();
    assert_eq!(once.granted, !binding.granted);
    let twice = store.toggle_user_role_granted(binding.id).await.unwrap();
    assert_eq!(twice.granted, binding.granted);
}

#[tokio::test]
async fn test_cascade_delete_user() {
    let store = MemoryStore::new();
    seed_roles_and_groups(&store).await;
    let corp = store
        .save_corporation(Corporation::new("Test Corp", "TEST", 1000, 90000))
        .await
        .unwrap();

    // Accounts #1..#4, characters #1..#6; user #3 owns accounts #3, #4
    let mut eve_id = 9000;
    for (user_id, accounts) in [(1, 1), (2, 1), (3, 2)] {
        let mut user = store.load_user(UserId::new(user_id)).await.unwrap();
        for _ in 0..accounts {
            let mut account = Account::new(user.id, eve_id, format!("vcode{}", eve_id), 0);
            let per_account = if user_id == 3 { 2 } else { 1 };
            for _ in 0..per_account {
                eve_id += 1;
                account.characters.push(Character::new(
                    AccountId::unsaved(),
                    corp.id,
                    format!("Pilot {}", eve_id),
                    eve_id,
                ));
            }
            user.accounts.push(account);
        }
        store.save_user(user).await.unwrap();
    }

    let doomed = store.load_user(UserId::new(3)).await.unwrap();
    let account_ids: Vec<i64> = doomed.accounts.iter().map(|a| a.id.get()).collect();
    let character_ids: Vec<i64> = doomed.characters().map(|c| c.id.get()).collect();
    assert_eq!(account_ids, vec![3, 4]);
    assert_eq!(character_ids, vec![3, 4, 5, 6]);

    store.delete_user(UserId::new(3)).await.unwrap();

    assert!(!store.query_user_id_exists(UserId::new(3)).await.unwrap());
    assert!(store.load_accounts_for_user(UserId::new(3)).await.unwrap().is_empty());
    assert!(store.load_user_roles_for_user(UserId::new(3)).await.unwrap().is_empty());
    assert!(store.load_groups_for_user(UserId::new(3)).await.unwrap().is_empty());
    for id in character_ids {
        let err = store
            .load_character(kernel::id::CharacterId::new(id))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    // Other users are untouched, deleting again is a no-op
    assert_eq!(store.load_user(UserId::new(1)).await.unwrap().character_count(), 1);
    store.delete_user(UserId::new(3)).await.unwrap();
}

// ===== Administration =====

#[tokio::test]
async fn test_sign_up_and_grant_roles() {
    let store = MemoryStore::new();
    seed_roles_and_groups(&store).await;
    let repo = Arc::new(store.clone());
    let token = CancellationToken::new();

    let user = SignUpUseCase::new(repo.clone())
        .execute(
            SignUpInput {
                username: "newbro".into(),
                password: "fly safe".into(),
                email: "newbro@example.com".into(),
            },
            &token,
        )
        .await
        .unwrap();
    assert!(user.password.verify(&ClearTextPassword::new("fly safe")));

    let err = SignUpUseCase::new(repo.clone())
        .execute(
            SignUpInput {
                username: "NEWBRO".into(),
                password: "x".into(),
                email: "other@example.com".into(),
            },
            &token,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let admin = AdministrationUseCase::new(repo);
    let user = admin
        .add_user_to_group(user.id, GroupId::new(1), &token)
        .await
        .unwrap();
    let user = admin
        .grant_role_to_user(user.id, RoleId::new(2), true, &token)
        .await
        .unwrap();
    assert!(user.is_member_of(GroupId::new(1)));
    assert!(has_role(&user, "ping.all"));
    // destroy.world is bound but inactive
    assert!(!has_role(&user, "destroy.world"));

    let err = admin
        .grant_role_to_user(user.id, RoleId::new(2), true, &token)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let group = admin
        .grant_role_to_group(GroupId::new(2), RoleId::new(1), true, &token)
        .await
        .unwrap();
    assert!(group.has_role("PING.ALL"));
}

#[tokio::test]
async fn test_ungranted_binding_confers_nothing() {
    let store = MemoryStore::new();
    seed_roles_and_groups(&store).await;
    let admin = AdministrationUseCase::new(Arc::new(store.clone()));
    let token = CancellationToken::new();

    let loner = admin
        .grant_role_to_user(UserId::new(2), RoleId::new(1), false, &token)
        .await
        .unwrap();
    assert_eq!(loner.user_roles.len(), 1);
    assert!(!loner.user_roles[0].granted);
    assert!(!effective_roles(&loner).contains("ping.all"));

    let industry = admin
        .grant_role_to_group(GroupId::new(2), RoleId::new(3), false, &token)
        .await
        .unwrap();
    assert!(!industry.group_roles[0].granted);
    let loner = admin
        .add_user_to_group(loner.id, industry.id, &token)
        .await
        .unwrap();
    assert!(effective_roles(&loner).is_empty());

    // Flipping the group binding confers the role
    store
        .toggle_group_role_granted(industry.group_roles[0].id)
        .await
        .unwrap();
    let loner = store.load_user(loner.id).await.unwrap();
    assert!(has_role(&loner, "logistics.read"));
    assert!(!has_role(&loner, "ping.all"));
}

fn settings(email: &str, old_password: &str, new_password: &str) -> UpdateUserInput {
    UpdateUserInput {
        email: email.into(),
        old_password: old_password.into(),
        new_password: new_password.into(),
    }
}

#[tokio::test]
async fn test_update_user() {
    let store = MemoryStore::new();
    let user = seed_user(&store, "test1", "test1").await;
    let admin = AdministrationUseCase::new(Arc::new(store.clone()));
    let token = CancellationToken::new();

    let updated = admin
        .update_user(user.id, settings(" moved@example.com ", "test1", "hunter2"), &token)
        .await
        .unwrap();
    assert_eq!(updated.email, "moved@example.com");
    assert!(!updated.verified_email);

    let stored = store.load_password_for_user("test1").await.unwrap();
    assert!(stored.verify(&ClearTextPassword::new("hunter2")));
    assert!(!stored.verify(&ClearTextPassword::new("test1")));

    // Empty new password keeps the current one
    admin
        .update_user(user.id, settings("moved@example.com", "hunter2", ""), &token)
        .await
        .unwrap();
    let stored = store.load_password_for_user("test1").await.unwrap();
    assert!(stored.verify(&ClearTextPassword::new("hunter2")));
}

#[tokio::test]
async fn test_update_user_wrong_old_password() {
    let store = MemoryStore::new();
    let user = seed_user(&store, "test1", "test1").await;
    let admin = AdministrationUseCase::new(Arc::new(store.clone()));
    let token = CancellationToken::new();

    let err = admin
        .update_user(user.id, settings("moved@example.com", "wrong", "hunter2"), &token)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Auth);

    let unchanged = store.load_user(user.id).await.unwrap();
    assert_eq!(unchanged.email, "test1@example.com");
    assert!(unchanged.password.verify(&ClearTextPassword::new("test1")));
}

#[tokio::test]
async fn test_update_user_duplicate_email() {
    let store = MemoryStore::new();
    let user = seed_user(&store, "test1", "test1").await;
    seed_user(&store, "test2", "test2").await;
    let admin = AdministrationUseCase::new(Arc::new(store.clone()));
    let token = CancellationToken::new();

    let err = admin
        .update_user(user.id, settings("TEST2@example.com", "test1", ""), &token)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(
        store.load_user(user.id).await.unwrap().email,
        "test1@example.com"
    );

    // Keeping one's own address is not a conflict
    admin
        .update_user(user.id, settings("Test1@example.com", "test1", ""), &token)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_cancelled_request_touches_nothing() {
    let store = MemoryStore::new();
    let token = CancellationToken::new();
    token.cancel();

    let err = SignUpUseCase::new(Arc::new(store.clone()))
        .execute(
            SignUpInput {
                username: "newbro".into(),
                password: "fly safe".into(),
                email: "newbro@example.com".into(),
            },
            &token,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(store.load_all_users().await.unwrap().is_empty());
}
