//! End-to-end flows over the in-memory store

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::application::audit::NoopAuditSink;
use crate::application::config::AuthConfig;
use crate::application::{SecondFactor, SignInInput, SignUpInput, TwoFactorSetupOutput};
use crate::domain::entity::user::{ProfilePatch, User};
use crate::domain::repository::UserRepository;
use crate::domain::value_object::{
    email::Email, permission::Permission, totp_secret::TotpSecret, user_role::UserRole,
};
use crate::error::AuthError;
use crate::infra::memory::InMemoryUserRepository;
use crate::presentation::{AuthAppState, router_with_state};

type TestState = AuthAppState<InMemoryUserRepository, NoopAuditSink>;

fn test_state() -> (TestState, Arc<InMemoryUserRepository>) {
    let repo = Arc::new(InMemoryUserRepository::new());
    let state = AuthAppState::new(
        repo.clone(),
        AuthConfig::development(),
        Arc::new(NoopAuditSink),
    );
    (state, repo)
}

async fn register(state: &TestState, email: &str, user_name: &str) -> User {
    state
        .sign_up
        .execute(SignUpInput {
            email: email.into(),
            user_name: user_name.into(),
            password: "password123".into(),
        })
        .await
        .unwrap()
}

fn login_input(identifier: &str, totp_code: Option<&str>) -> SignInInput {
    SignInInput {
        identifier: identifier.into(),
        password: "password123".into(),
        totp_code: totp_code.map(str::to_string),
    }
}

fn current_code(setup: &TwoFactorSetupOutput) -> String {
    TotpSecret::from_base32(setup.secret.clone())
        .unwrap()
        .generate_current()
}

async fn with_role(repo: &InMemoryUserRepository, user: &User, role: UserRole) -> User {
    repo.update_role(&user.user_id, role).await.unwrap();
    repo.find_by_id(&user.user_id).await.unwrap().unwrap()
}

/// Setup plus verify; returns what setup handed out
async fn enable_two_factor(state: &TestState, user: &User) -> TwoFactorSetupOutput {
    let setup = state.two_factor.setup(&user.user_id).await.unwrap();
    let code = current_code(&setup);
    state.two_factor.verify(&user.user_id, &code).await.unwrap();
    setup
}

// ============================================================================
// Registration and sign in
// ============================================================================

#[tokio::test]
async fn test_registered_user_is_viewer_without_admin_access() {
    let (state, _) = test_state();
    let user = register(&state, "a@x.com", "alice").await;

    assert_eq!(user.user_role, UserRole::Viewer);
    assert!(user.is_active);
    assert!(!state.gate.resolver().has_permission(&user, Permission::ReadAdmin));
    assert!(state.gate.resolver().has_permission(&user, Permission::ReadContent));
}

#[tokio::test]
async fn test_duplicate_email_and_user_name_rejected() {
    let (state, _) = test_state();
    register(&state, "a@x.com", "alice").await;

    let by_email = state
        .sign_up
        .execute(SignUpInput {
            email: "A@X.com".into(),
            user_name: "someone".into(),
            password: "password123".into(),
        })
        .await;
    assert!(matches!(by_email, Err(AuthError::DuplicateIdentity { .. })));

    let by_name = state
        .sign_up
        .execute(SignUpInput {
            email: "b@x.com".into(),
            user_name: "Alice".into(),
            password: "password123".into(),
        })
        .await;
    assert!(matches!(by_name, Err(AuthError::DuplicateIdentity { .. })));
}

#[tokio::test]
async fn test_sequential_logins_start_distinct_families() {
    let (state, repo) = test_state();
    let user = register(&state, "a@x.com", "alice").await;

    let first = state.sign_in.execute(login_input("a@x.com", None)).await.unwrap();
    let family_after_first = repo
        .find_by_id(&user.user_id)
        .await
        .unwrap()
        .unwrap()
        .refresh_token_family;

    let second = state.sign_in.execute(login_input("alice", None)).await.unwrap();
    let family_after_second = repo
        .find_by_id(&user.user_id)
        .await
        .unwrap()
        .unwrap()
        .refresh_token_family;

    assert_ne!(family_after_first, family_after_second);
    assert_ne!(first.tokens.refresh_token, second.tokens.refresh_token);
    assert!(second.user.last_login_at.is_some());

    // The first login's refresh token belongs to a dead family
    assert!(matches!(
        state.tokens.refresh(&first.tokens.refresh_token).await,
        Err(AuthError::TokenRevoked)
    ));
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let (state, _) = test_state();
    register(&state, "a@x.com", "alice").await;

    let unknown = state.sign_in.execute(login_input("nobody@x.com", None)).await;
    let wrong = state
        .sign_in
        .execute(SignInInput {
            identifier: "alice".into(),
            password: "password124".into(),
            totp_code: None,
        })
        .await;

    assert!(matches!(unknown, Err(AuthError::InvalidCredentials)));
    assert!(matches!(wrong, Err(AuthError::InvalidCredentials)));
}

#[tokio::test]
async fn test_disabled_account_cannot_login() {
    let (state, repo) = test_state();
    let user = register(&state, "a@x.com", "alice").await;
    repo.update_status(&user.user_id, false, None).await.unwrap();

    assert!(matches!(
        state.sign_in.execute(login_input("a@x.com", None)).await,
        Err(AuthError::AccountDisabled)
    ));
}

// ============================================================================
// Refresh rotation
// ============================================================================

#[tokio::test]
async fn test_replayed_refresh_token_revokes_whole_family() {
    let (state, _) = test_state();
    register(&state, "a@x.com", "alice").await;
    let login = state.sign_in.execute(login_input("a@x.com", None)).await.unwrap();

    let first = login.tokens.refresh_token;
    let second = state.tokens.refresh(&first).await.unwrap().refresh_token;
    let third = state.tokens.refresh(&second).await.unwrap().refresh_token;

    assert!(matches!(
        state.tokens.refresh(&first).await,
        Err(AuthError::TokenRevoked)
    ));
    // The newest token died with the family
    assert!(matches!(
        state.tokens.refresh(&third).await,
        Err(AuthError::TokenRevoked)
    ));
    assert!(state.tokens.refresh(&second).await.is_err());
}

#[tokio::test]
async fn test_concurrent_refresh_has_single_winner() {
    let (state, _) = test_state();
    register(&state, "a@x.com", "alice").await;
    let login = state.sign_in.execute(login_input("a@x.com", None)).await.unwrap();
    let token = login.tokens.refresh_token;

    let (a, b) = tokio::join!(state.tokens.refresh(&token), state.tokens.refresh(&token));

    let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(
        matches!(a, Err(AuthError::TokenRevoked)) || matches!(b, Err(AuthError::TokenRevoked))
    );
}

#[tokio::test]
async fn test_logout_revokes_refresh_tokens() {
    let (state, _) = test_state();
    let user = register(&state, "a@x.com", "alice").await;
    let login = state.sign_in.execute(login_input("a@x.com", None)).await.unwrap();

    let signed_out = state
        .sign_out
        .execute(&login.tokens.access_token)
        .await
        .unwrap();
    assert_eq!(signed_out, user.user_id);

    assert!(matches!(
        state.tokens.refresh(&login.tokens.refresh_token).await,
        Err(AuthError::TokenRevoked)
    ));
}

// ============================================================================
// Two-factor
// ============================================================================

#[tokio::test]
async fn test_two_factor_login_with_backup_code() {
    let (state, repo) = test_state();
    let user = register(&state, "a@x.com", "alice").await;
    let setup = enable_two_factor(&state, &user).await;
    assert_eq!(setup.backup_codes.len(), 8);

    let stored = repo.find_by_id(&user.user_id).await.unwrap().unwrap();
    assert!(stored.two_factor.enabled);
    assert!(stored.two_factor.verified_at.is_some());
    assert_ne!(
        stored.two_factor.encrypted_secret.as_deref(),
        Some(setup.secret.as_str())
    );

    assert!(matches!(
        state.sign_in.execute(login_input("a@x.com", None)).await,
        Err(AuthError::TwoFactorRequired)
    ));
    assert!(matches!(
        state.sign_in.execute(login_input("a@x.com", Some(""))).await,
        Err(AuthError::TwoFactorRequired)
    ));

    let backup = setup.backup_codes[3].to_lowercase();
    let output = state
        .sign_in
        .execute(login_input("a@x.com", Some(&backup)))
        .await
        .unwrap();
    assert_eq!(output.second_factor, Some(SecondFactor::BackupCode { remaining: 7 }));

    let stored = repo.find_by_id(&user.user_id).await.unwrap().unwrap();
    assert_eq!(stored.two_factor.backup_codes.len(), 7);

    // Spent
    assert!(matches!(
        state.sign_in.execute(login_input("a@x.com", Some(&backup))).await,
        Err(AuthError::InvalidTwoFactorCode)
    ));
}

#[tokio::test]
async fn test_two_factor_login_with_totp() {
    let (state, _) = test_state();
    let user = register(&state, "a@x.com", "alice").await;
    let setup = enable_two_factor(&state, &user).await;

    let code = current_code(&setup);
    let output = state
        .sign_in
        .execute(login_input("alice", Some(&code)))
        .await
        .unwrap();
    assert_eq!(output.second_factor, Some(SecondFactor::Totp));

    assert!(matches!(
        state.sign_in.execute(login_input("alice", Some("000000x"))).await,
        Err(AuthError::InvalidTwoFactorCode)
    ));
}

#[tokio::test]
async fn test_two_factor_state_machine() {
    let (state, repo) = test_state();
    let user = register(&state, "a@x.com", "alice").await;
    let id = user.user_id;

    assert!(matches!(
        state.two_factor.verify(&id, "123456").await,
        Err(AuthError::TwoFactorNotSetup)
    ));
    assert!(matches!(
        state.two_factor.disable(&id, "password123", "123456").await,
        Err(AuthError::TwoFactorNotEnabled)
    ));

    // Setup may be restarted while pending; the old seed stops working
    let abandoned = state.two_factor.setup(&id).await.unwrap();
    let setup = state.two_factor.setup(&id).await.unwrap();
    assert_ne!(abandoned.secret, setup.secret);
    let pending = repo.find_by_id(&id).await.unwrap().unwrap();
    assert!(!pending.two_factor.enabled);

    // Pending setup does not gate login
    assert!(state.sign_in.execute(login_input("alice", None)).await.is_ok());

    let code = current_code(&setup);
    state.two_factor.verify(&id, &code).await.unwrap();

    assert!(matches!(
        state.two_factor.setup(&id).await,
        Err(AuthError::TwoFactorAlreadyEnabled)
    ));
    assert!(matches!(
        state.two_factor.verify(&id, &code).await,
        Err(AuthError::TwoFactorAlreadyEnabled)
    ));

    // Regeneration replaces every code and accepts TOTP only
    assert!(matches!(
        state
            .two_factor
            .regenerate_backup_codes(&id, &setup.backup_codes[0])
            .await,
        Err(AuthError::InvalidTwoFactorCode)
    ));
    let fresh = state
        .two_factor
        .regenerate_backup_codes(&id, &code)
        .await
        .unwrap();
    assert_eq!(fresh.len(), 8);
    assert!(matches!(
        state
            .sign_in
            .execute(login_input("alice", Some(&setup.backup_codes[0])))
            .await,
        Err(AuthError::InvalidTwoFactorCode)
    ));

    // Disable needs the password, then a second factor
    assert!(matches!(
        state.two_factor.disable(&id, "password124", &code).await,
        Err(AuthError::InvalidCredentials)
    ));
    state
        .two_factor
        .disable(&id, "password123", &fresh[0])
        .await
        .unwrap();

    let disabled = repo.find_by_id(&id).await.unwrap().unwrap();
    assert!(!disabled.two_factor.enabled);
    assert!(disabled.two_factor.encrypted_secret.is_none());
    assert!(disabled.two_factor.backup_codes.is_empty());
    assert!(state.sign_in.execute(login_input("alice", None)).await.is_ok());
}

#[tokio::test]
async fn test_backup_code_race_has_single_winner() {
    let (state, repo) = test_state();
    let user = register(&state, "a@x.com", "alice").await;
    let setup = enable_two_factor(&state, &user).await;
    let snapshot = repo.find_by_id(&user.user_id).await.unwrap().unwrap();
    let code = &setup.backup_codes[0];

    let (a, b) = tokio::join!(
        state.two_factor.check_login(&snapshot, code),
        state.two_factor.check_login(&snapshot, code)
    );

    let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(
        matches!(a, Err(AuthError::InvalidTwoFactorCode))
            || matches!(b, Err(AuthError::InvalidTwoFactorCode))
    );

    let stored = repo.find_by_id(&user.user_id).await.unwrap().unwrap();
    assert_eq!(stored.two_factor.backup_codes.len(), 7);
}

#[tokio::test]
async fn test_backup_codes_report_what_is_left_in_store() {
    let (state, repo) = test_state();
    let user = register(&state, "a@x.com", "alice").await;
    let setup = enable_two_factor(&state, &user).await;
    let snapshot = repo.find_by_id(&user.user_id).await.unwrap().unwrap();

    let (a, b) = tokio::join!(
        state.two_factor.check_login(&snapshot, &setup.backup_codes[0]),
        state.two_factor.check_login(&snapshot, &setup.backup_codes[1])
    );

    let mut remaining: Vec<usize> = [a.unwrap(), b.unwrap()]
        .into_iter()
        .map(|factor| match factor {
            SecondFactor::BackupCode { remaining } => remaining,
            SecondFactor::Totp => panic!("backup code matched as TOTP"),
        })
        .collect();
    remaining.sort_unstable();
    assert_eq!(remaining, vec![6, 7]);

    let stored = repo.find_by_id(&user.user_id).await.unwrap().unwrap();
    assert_eq!(stored.two_factor.backup_codes.len(), 6);
}

#[tokio::test]
async fn test_backup_code_spent_by_login_or_disable_not_both() {
    let (state, repo) = test_state();
    let user = register(&state, "a@x.com", "alice").await;
    let setup = enable_two_factor(&state, &user).await;
    let code = setup.backup_codes[0].clone();

    let (login, disable) = tokio::join!(
        state.sign_in.execute(login_input("alice", Some(&code))),
        state.two_factor.disable(&user.user_id, "password123", &code)
    );

    let login_spent_code = matches!(
        login,
        Ok(ref output) if matches!(output.second_factor, Some(SecondFactor::BackupCode { .. }))
    );
    assert_ne!(login_spent_code, disable.is_ok());

    let stored = repo.find_by_id(&user.user_id).await.unwrap().unwrap();
    if disable.is_ok() {
        assert!(!stored.two_factor.enabled);
    } else {
        assert!(stored.two_factor.enabled);
        assert_eq!(stored.two_factor.backup_codes.len(), 7);
    }
}

#[tokio::test]
async fn test_failed_disable_spends_no_backup_code() {
    let (state, repo) = test_state();
    let user = register(&state, "a@x.com", "alice").await;
    let setup = enable_two_factor(&state, &user).await;

    assert!(matches!(
        state
            .two_factor
            .disable(&user.user_id, "password124", &setup.backup_codes[0])
            .await,
        Err(AuthError::InvalidCredentials)
    ));
    let stored = repo.find_by_id(&user.user_id).await.unwrap().unwrap();
    assert!(stored.two_factor.enabled);
    assert_eq!(stored.two_factor.backup_codes.len(), 8);
}

#[tokio::test]
async fn test_two_factor_with_colon_in_email() {
    let (state, _) = test_state();
    let user = register(&state, "a:b@x.com", "alice").await;

    let setup = enable_two_factor(&state, &user).await;
    assert!(setup.otpauth_url.contains("a%3Ab%40x.com"));
    assert!(!setup.qr_code_base64.is_empty());

    let output = state
        .sign_in
        .execute(login_input("a:b@x.com", Some(&current_code(&setup))))
        .await
        .unwrap();
    assert_eq!(output.second_factor, Some(SecondFactor::Totp));
}

#[tokio::test]
async fn test_email_change_does_not_lock_out_two_factor_login() {
    let (state, _) = test_state();
    let user = register(&state, "a@x.com", "alice").await;
    let setup = enable_two_factor(&state, &user).await;

    let patch = ProfilePatch {
        email: Some(Email::new("c:d@x.com").unwrap()),
        user_name: None,
    };
    state
        .account
        .update_profile(&user.user_id, patch)
        .await
        .unwrap();

    let output = state
        .sign_in
        .execute(login_input("alice", Some(&current_code(&setup))))
        .await
        .unwrap();
    assert_eq!(output.second_factor, Some(SecondFactor::Totp));

    let output = state
        .sign_in
        .execute(login_input("c:d@x.com", Some(&setup.backup_codes[2])))
        .await
        .unwrap();
    assert_eq!(
        output.second_factor,
        Some(SecondFactor::BackupCode { remaining: 7 })
    );
}

// ============================================================================
// Account
// ============================================================================

#[tokio::test]
async fn test_change_password_revokes_refresh_tokens() {
    let (state, _) = test_state();
    let user = register(&state, "a@x.com", "alice").await;
    let login = state.sign_in.execute(login_input("a@x.com", None)).await.unwrap();

    assert!(matches!(
        state
            .account
            .change_password(&user.user_id, "wrong-password", "new-password-1".into())
            .await,
        Err(AuthError::InvalidCredentials)
    ));

    state
        .account
        .change_password(&user.user_id, "password123", "new-password-1".into())
        .await
        .unwrap();

    assert!(state.tokens.refresh(&login.tokens.refresh_token).await.is_err());
    assert!(matches!(
        state.sign_in.execute(login_input("a@x.com", None)).await,
        Err(AuthError::InvalidCredentials)
    ));
    assert!(
        state
            .sign_in
            .execute(SignInInput {
                identifier: "a@x.com".into(),
                password: "new-password-1".into(),
                totp_code: None,
            })
            .await
            .is_ok()
    );
}

// ============================================================================
// Authorization and administration
// ============================================================================

#[tokio::test]
async fn test_denial_overrides_role_grant() {
    let (state, repo) = test_state();
    let user = register(&state, "a@x.com", "alice").await;
    let admin = with_role(&repo, &user, UserRole::Admin).await;

    let denied = BTreeSet::from(["delete:books".to_string()]);
    repo.update_permissions(&admin.user_id, &BTreeSet::new(), &denied)
        .await
        .unwrap();
    let admin = repo.find_by_id(&admin.user_id).await.unwrap().unwrap();

    let resolver = state.gate.resolver();
    assert!(!resolver.has_permission(&admin, Permission::DeleteBooks));
    assert!(resolver.has_permission(&admin, Permission::DeleteEvents));
    assert!(matches!(
        state.gate.authorize_permission(&admin, Permission::DeleteBooks),
        Err(AuthError::PermissionDenied { .. })
    ));
}

#[tokio::test]
async fn test_gate_reads_current_role_not_token_snapshot() {
    let (state, repo) = test_state();
    let user = register(&state, "a@x.com", "alice").await;
    let login = state.sign_in.execute(login_input("a@x.com", None)).await.unwrap();
    let token = Some(login.tokens.access_token.as_str());

    assert!(matches!(
        state.gate.require_permission(token, Permission::ManageUsers).await,
        Err(AuthError::PermissionDenied { .. })
    ));

    with_role(&repo, &user, UserRole::Admin).await;
    assert!(
        state
            .gate
            .require_permission(token, Permission::ManageUsers)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_last_super_admin_is_protected() {
    let (state, repo) = test_state();
    let root = register(&state, "root@x.com", "rooter").await;
    let root = with_role(&repo, &root, UserRole::SuperAdmin).await;

    // Only superadmin left; cannot demote itself
    assert!(matches!(
        state
            .admin
            .update_user_role(&root, &root.user_id, UserRole::Admin)
            .await,
        Err(AuthError::InvariantViolation(_))
    ));

    let second = register(&state, "second@x.com", "second").await;
    let second = state
        .admin
        .update_user_role(&root, &second.user_id, UserRole::SuperAdmin)
        .await
        .unwrap();
    assert_eq!(second.user_role, UserRole::SuperAdmin);

    // With two, one may go
    state
        .admin
        .update_user_role(&second, &root.user_id, UserRole::Admin)
        .await
        .unwrap();
    assert!(matches!(
        state
            .admin
            .update_user_role(&second, &second.user_id, UserRole::Admin)
            .await,
        Err(AuthError::InvariantViolation(_))
    ));
}

#[tokio::test]
async fn test_admin_limits() {
    let (state, repo) = test_state();
    let admin = register(&state, "admin@x.com", "carol").await;
    let admin = with_role(&repo, &admin, UserRole::Admin).await;
    let root = register(&state, "root@x.com", "rooter").await;
    let root = with_role(&repo, &root, UserRole::SuperAdmin).await;
    let viewer = register(&state, "v@x.com", "viewer1").await;

    // Admins lack manage:roles
    assert!(matches!(
        state
            .admin
            .update_user_role(&admin, &viewer.user_id, UserRole::Editor)
            .await,
        Err(AuthError::PermissionDenied { .. })
    ));
    assert!(matches!(
        state
            .admin
            .update_user_status(&admin, &admin.user_id, false)
            .await,
        Err(AuthError::InvariantViolation(_))
    ));
    assert!(matches!(
        state
            .admin
            .update_user_status(&admin, &root.user_id, false)
            .await,
        Err(AuthError::PermissionDenied { .. })
    ));
    assert!(matches!(
        state.admin.delete_user(&admin, &root.user_id).await,
        Err(AuthError::PermissionDenied { .. })
    ));

    // Cannot grant what the actor does not hold
    let grant = BTreeSet::from(["system:settings".to_string()]);
    assert!(matches!(
        state
            .admin
            .update_user_permissions(&admin, &viewer.user_id, grant, BTreeSet::new())
            .await,
        Err(AuthError::PermissionDenied { .. })
    ));

    // Unknown tags are stored and resolve to nothing
    let grant = BTreeSet::from(["read:users".to_string(), "fly:plane".to_string()]);
    let updated = state
        .admin
        .update_user_permissions(&admin, &viewer.user_id, grant, BTreeSet::new())
        .await
        .unwrap();
    assert!(updated.extra_permissions.contains("fly:plane"));
    assert!(state.gate.resolver().has_permission(&updated, Permission::ReadUsers));
}

#[tokio::test]
async fn test_deactivation_ends_sessions() {
    let (state, repo) = test_state();
    let admin = register(&state, "admin@x.com", "carol").await;
    let admin = with_role(&repo, &admin, UserRole::Admin).await;
    let user = register(&state, "a@x.com", "alice").await;
    let login = state.sign_in.execute(login_input("alice", None)).await.unwrap();

    let updated = state
        .admin
        .update_user_status(&admin, &user.user_id, false)
        .await
        .unwrap();
    assert!(!updated.is_active);

    assert!(matches!(
        state
            .gate
            .require_user(Some(login.tokens.access_token.as_str()))
            .await,
        Err(AuthError::AccountDisabled)
    ));
    assert!(state.tokens.refresh(&login.tokens.refresh_token).await.is_err());

    state
        .admin
        .update_user_status(&admin, &user.user_id, true)
        .await
        .unwrap();
    assert!(state.sign_in.execute(login_input("alice", None)).await.is_ok());
}

#[tokio::test]
async fn test_delete_user() {
    let (state, repo) = test_state();
    let admin = register(&state, "admin@x.com", "carol").await;
    let admin = with_role(&repo, &admin, UserRole::Admin).await;
    let user = register(&state, "a@x.com", "alice").await;

    assert!(matches!(
        state.admin.delete_user(&admin, &admin.user_id).await,
        Err(AuthError::InvariantViolation(_))
    ));

    state.admin.delete_user(&admin, &user.user_id).await.unwrap();
    assert!(repo.find_by_id(&user.user_id).await.unwrap().is_none());
    assert!(matches!(
        state.admin.delete_user(&admin, &user.user_id).await,
        Err(AuthError::UserNotFound)
    ));
}

// ============================================================================
// HTTP
// ============================================================================

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_http_register_login_me_logout() {
    let (state, _) = test_state();
    let app = router_with_state(state);

    let (status, body) = send(
        &app,
        "POST",
        "/register",
        None,
        Some(json!({"email": "a@x.com", "userName": "alice", "password": "password123"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["role"], "viewer");
    assert!(body.get("passwordHash").is_none());

    let (status, body) = send(
        &app,
        "POST",
        "/login",
        None,
        Some(json!({"email": "a@x.com", "password": "password123"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tokenType"], "Bearer");
    let access = body["accessToken"].as_str().unwrap().to_string();
    let refresh = body["refreshToken"].as_str().unwrap().to_string();

    let (status, body) = send(&app, "GET", "/me", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["userName"], "alice");

    let (status, _) = send(
        &app,
        "POST",
        "/refresh",
        None,
        Some(json!({"refreshToken": refresh})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "POST", "/logout", Some(&access), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_http_errors_carry_codes() {
    let (state, _) = test_state();
    let app = router_with_state(state);

    let (status, body) = send(&app, "GET", "/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "AUTHENTICATION_REQUIRED");

    let (status, _) = send(&app, "GET", "/me", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        "POST",
        "/login",
        None,
        Some(json!({"identifier": "ghost", "password": "password123"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_CREDENTIALS");

    let (status, _) = send(&app, "POST", "/logout", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_http_admin_route_forbidden_for_viewer() {
    let (state, _) = test_state();
    let viewer = register(&state, "a@x.com", "alice").await;
    let other = register(&state, "b@x.com", "bob").await;
    let login = state
        .sign_in
        .execute(login_input("alice", None))
        .await
        .unwrap();
    let app = router_with_state(state);

    let (status, body) = send(
        &app,
        "PATCH",
        &format!("/users/{}/status", other.user_id),
        Some(&login.tokens.access_token),
        Some(json!({"isActive": false})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "PERMISSION_DENIED");
    assert_ne!(viewer.user_id, other.user_id);
}
