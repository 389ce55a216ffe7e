use std::sync::Arc;
use std::time::Duration;

use doc_plane::{
    Clock, CoreError, InMemoryUserStore, ManualClock, NoopPersist, PageRequest, Role, User,
    UserPatch, UserService, UserStore,
};
use uuid::Uuid;

fn setup() -> (UserService, Arc<InMemoryUserStore>, Arc<ManualClock>) {
    let users = InMemoryUserStore::shared();
    let clock = ManualClock::starting_now();
    let service = UserService::new(users.clone(), clock.clone(), NoopPersist::shared());
    (service, users, clock)
}

fn seed_user(users: &InMemoryUserStore, clock: &ManualClock, name: &str, email: &str) -> User {
    users.insert(User {
        id: 0,
        uuid: Uuid::new_v4().to_string(),
        created_at: clock.now(),
        updated_at: clock.now(),
        archived: None,
        first_name: name.to_string(),
        last_name: "Doe".to_string(),
        phone: "555-0102".to_string(),
        email: email.to_string(),
        password_hash: "hash".to_string(),
        role: Role::Viewer,
    })
}

#[test]
fn find_by_id_fails_for_missing_users() {
    let (service, _, _) = setup();
    let err = service.find_by_id(42).expect_err("missing");
    assert!(matches!(err, CoreError::NotFound("user")));
}

#[test]
fn update_role_changes_only_the_role() {
    let (service, users, clock) = setup();
    let user = seed_user(&users, &clock, "Alice", "alice@example.com");
    clock.advance(Duration::from_secs(10));
    let updated = service.update_role(user.id, Role::Admin).expect("update");
    assert_eq!(updated.role, Role::Admin);
    assert_eq!(updated.email, "alice@example.com");
    assert!(updated.updated_at > user.updated_at);
}

#[test]
fn update_detail_merges_supplied_fields() {
    let (service, users, clock) = setup();
    let user = seed_user(&users, &clock, "Alice", "alice@example.com");
    let updated = service
        .update_detail(
            user.id,
            UserPatch {
                first_name: Some("Alicia".to_string()),
                phone: Some("555-0199".to_string()),
                ..UserPatch::default()
            },
        )
        .expect("update");
    assert_eq!(updated.first_name, "Alicia");
    assert_eq!(updated.phone, "555-0199");
    assert_eq!(updated.last_name, "Doe");
    assert_eq!(updated.email, "alice@example.com");
}

#[test]
fn update_detail_rejects_an_email_already_in_use() {
    let (service, users, clock) = setup();
    let alice = seed_user(&users, &clock, "Alice", "alice@example.com");
    seed_user(&users, &clock, "Bob", "bob@example.com");
    let err = service
        .update_detail(
            alice.id,
            UserPatch {
                email: Some("bob@example.com".to_string()),
                ..UserPatch::default()
            },
        )
        .expect_err("duplicate email");
    assert!(matches!(err, CoreError::DuplicateEmail));
}

#[test]
fn update_detail_accepts_the_users_own_email() {
    let (service, users, clock) = setup();
    let alice = seed_user(&users, &clock, "Alice", "alice@example.com");
    let updated = service
        .update_detail(
            alice.id,
            UserPatch {
                email: Some("alice@example.com".to_string()),
                first_name: Some("Alicia".to_string()),
                ..UserPatch::default()
            },
        )
        .expect("self email");
    assert_eq!(updated.first_name, "Alicia");
}

#[test]
fn search_matches_names_and_email() {
    let (service, users, clock) = setup();
    seed_user(&users, &clock, "Alice", "alice@example.com");
    seed_user(&users, &clock, "Bob", "bob@widgets.io");
    let by_name = service.find_all(PageRequest::default(), Some("alice"));
    assert_eq!(by_name.total, 1);
    let by_email = service.find_all(PageRequest::default(), Some("widgets"));
    assert_eq!(by_email.total, 1);
    assert_eq!(by_email.data[0].first_name, "Bob");
}

#[test]
fn listing_skips_archived_users() {
    let (service, users, clock) = setup();
    seed_user(&users, &clock, "Alice", "alice@example.com");
    let bob = seed_user(&users, &clock, "Bob", "bob@example.com");
    let mut archived = users.get(bob.id).expect("bob");
    archived.archived = Some(clock.now());
    users.put(archived);
    let page = service.find_all(PageRequest::default(), None);
    assert_eq!(page.total, 1);
    assert_eq!(page.data[0].first_name, "Alice");
}

#[test]
fn summary_never_carries_the_password_hash() {
    let (_, users, clock) = setup();
    let user = seed_user(&users, &clock, "Alice", "alice@example.com");
    let summary = user.summary();
    let rendered = serde_json::to_string(&summary).expect("serialize");
    assert!(!rendered.contains("hash"));
    assert!(!rendered.contains("password"));
}
