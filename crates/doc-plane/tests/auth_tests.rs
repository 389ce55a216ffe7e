use std::sync::Arc;
use std::time::Duration;

use doc_plane::{
    AuthService, Clock, CoreError, InMemoryAuditSink, InMemoryUserStore, ManualClock, NoopPersist,
    RegisterRequest, Role, TokenService, UserStore,
};

fn auth_service() -> (AuthService, Arc<InMemoryUserStore>, Arc<ManualClock>) {
    let users = InMemoryUserStore::shared();
    let clock = ManualClock::starting_now();
    let service = AuthService::new(
        users.clone(),
        TokenService::new("test-secret", 3600),
        clock.clone(),
        InMemoryAuditSink::shared(),
        NoopPersist::shared(),
    )
    .with_bcrypt_cost(4);
    (service, users, clock)
}

fn register_request(email: &str) -> RegisterRequest {
    RegisterRequest {
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        phone: "555-0100".to_string(),
        email: email.to_string(),
        password: "correct horse".to_string(),
        role: None,
    }
}

#[test]
fn register_assigns_id_and_defaults_to_viewer() {
    let (service, _, _) = auth_service();
    let user = service.register(register_request("ada@example.com")).expect("register");
    assert_eq!(user.id, 1);
    assert_eq!(user.role, Role::Viewer);
    assert!(user.archived.is_none());
    assert_ne!(user.password_hash, "correct horse");
}

#[test]
fn register_honors_requested_role() {
    let (service, _, _) = auth_service();
    let mut request = register_request("ada@example.com");
    request.role = Some(Role::Editor);
    let user = service.register(request).expect("register");
    assert_eq!(user.role, Role::Editor);
}

#[test]
fn duplicate_email_leaves_existing_record_untouched() {
    let (service, users, _) = auth_service();
    let first = service.register(register_request("ada@example.com")).expect("register");
    let err = service
        .register(register_request("ada@example.com"))
        .expect_err("duplicate");
    assert!(matches!(err, CoreError::DuplicateEmail));
    let (records, _) = users.export();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].password_hash, first.password_hash);
}

#[test]
fn malformed_email_is_rejected() {
    let (service, _, _) = auth_service();
    let err = service
        .register(register_request("not-an-email"))
        .expect_err("validation");
    assert!(matches!(err, CoreError::Validation(_)));
}

#[test]
fn short_password_is_rejected() {
    let (service, _, _) = auth_service();
    let mut request = register_request("ada@example.com");
    request.password = "short".to_string();
    let err = service.register(request).expect_err("validation");
    assert!(matches!(err, CoreError::Validation(_)));
}

#[test]
fn login_issues_token_carrying_user_claims() {
    let (service, _, _) = auth_service();
    let user = service.register(register_request("ada@example.com")).expect("register");
    let token = service.login("ada@example.com", "correct horse").expect("login");
    let claims = service.verify_token(&token).expect("verify");
    assert_eq!(claims.sub, user.id);
    assert_eq!(claims.uuid, user.uuid);
    assert_eq!(claims.role, Role::Viewer);
    assert_eq!(claims.email, "ada@example.com");
    assert_eq!(claims.first_name, "Ada");
}

#[test]
fn wrong_password_and_unknown_email_fail_identically() {
    let (service, _, _) = auth_service();
    service.register(register_request("ada@example.com")).expect("register");
    let wrong_password = service
        .login("ada@example.com", "wrong password")
        .expect_err("wrong password");
    let unknown_email = service
        .login("nobody@example.com", "correct horse")
        .expect_err("unknown email");
    assert!(matches!(wrong_password, CoreError::InvalidCredentials));
    assert!(matches!(unknown_email, CoreError::InvalidCredentials));
}

#[test]
fn expired_token_is_rejected() {
    let (service, _, clock) = auth_service();
    service.register(register_request("ada@example.com")).expect("register");
    let token = service.login("ada@example.com", "correct horse").expect("login");
    service.verify_token(&token).expect("fresh token");
    clock.advance(Duration::from_secs(3601));
    let err = service.verify_token(&token).expect_err("expired");
    assert!(matches!(err, CoreError::Unauthenticated));
}

#[test]
fn garbage_token_is_rejected() {
    let (service, _, _) = auth_service();
    let err = service.verify_token("not.a.token").expect_err("garbage");
    assert!(matches!(err, CoreError::Unauthenticated));
}

#[test]
fn tampered_token_is_rejected() {
    let (service, _, _) = auth_service();
    service.register(register_request("ada@example.com")).expect("register");
    let token = service.login("ada@example.com", "correct horse").expect("login");
    let other = AuthService::new(
        InMemoryUserStore::shared(),
        TokenService::new("different-secret", 3600),
        ManualClock::starting_now(),
        InMemoryAuditSink::shared(),
        NoopPersist::shared(),
    );
    let err = other.verify_token(&token).expect_err("wrong secret");
    assert!(matches!(err, CoreError::Unauthenticated));
}

#[test]
fn archived_user_frees_the_email() {
    let (service, users, clock) = auth_service();
    let user = service.register(register_request("ada@example.com")).expect("register");
    let mut archived = users.get(user.id).expect("user");
    archived.archived = Some(clock.now());
    users.put(archived);
    service
        .register(register_request("ada@example.com"))
        .expect("email reusable after archive");
}
