use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::bootstrap::Persist;
use crate::clock::Clock;
use crate::error::CoreError;
use crate::repository::{Page, PageRequest};

/// Closed role set. Adding a role forces a review of every authorization
/// site through exhaustive matches.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Editor,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Editor => "editor",
            Role::Viewer => "viewer",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub uuid: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived: Option<DateTime<Utc>>,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: String,
    /// bcrypt hash. Persisted, never exposed through the API surface.
    pub password_hash: String,
    pub role: Role,
}

impl User {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            uuid: self.uuid.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }
}

/// Embeddable view of a user without the credential hash.
#[derive(Clone, Debug, Serialize)]
pub struct UserSummary {
    pub id: i64,
    pub uuid: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct UserPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

pub trait UserStore: Send + Sync {
    /// Assigns the id; the caller fills every other field.
    fn insert(&self, user: User) -> User;
    fn get(&self, id: i64) -> Option<User>;
    /// Non-archived users only; archived identities free their email.
    fn find_by_email(&self, email: &str) -> Option<User>;
    /// Replaces an existing record; a missing id is a no-op returning None.
    fn put(&self, user: User) -> Option<User>;
    fn page(&self, request: &PageRequest, search: Option<&str>) -> Page<User>;
}

struct UserTable {
    records: HashMap<i64, User>,
    next_id: i64,
}

pub struct InMemoryUserStore {
    inner: Mutex<UserTable>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::from_records(Vec::new(), 1)
    }

    pub fn from_records(records: Vec<User>, next_id: i64) -> Self {
        let records: HashMap<i64, User> = records.into_iter().map(|u| (u.id, u)).collect();
        let floor = records.keys().max().map(|id| id + 1).unwrap_or(1);
        Self {
            inner: Mutex::new(UserTable {
                records,
                next_id: next_id.max(floor),
            }),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn export(&self) -> (Vec<User>, i64) {
        let table = self.inner.lock();
        let mut records: Vec<User> = table.records.values().cloned().collect();
        records.sort_by_key(|u| u.id);
        (records, table.next_id)
    }
}

impl Default for InMemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

impl UserStore for InMemoryUserStore {
    fn insert(&self, mut user: User) -> User {
        let mut table = self.inner.lock();
        user.id = table.next_id;
        table.next_id += 1;
        table.records.insert(user.id, user.clone());
        user
    }

    fn get(&self, id: i64) -> Option<User> {
        self.inner.lock().records.get(&id).cloned()
    }

    fn find_by_email(&self, email: &str) -> Option<User> {
        self.inner
            .lock()
            .records
            .values()
            .find(|u| u.archived.is_none() && u.email == email)
            .cloned()
    }

    fn put(&self, user: User) -> Option<User> {
        let mut table = self.inner.lock();
        if !table.records.contains_key(&user.id) {
            return None;
        }
        table.records.insert(user.id, user)
    }

    fn page(&self, request: &PageRequest, search: Option<&str>) -> Page<User> {
        let table = self.inner.lock();
        let needle = search.map(str::to_lowercase);
        let mut matches: Vec<&User> = table
            .records
            .values()
            .filter(|u| u.archived.is_none())
            .filter(|u| match &needle {
                None => true,
                Some(needle) => {
                    u.first_name.to_lowercase().contains(needle)
                        || u.last_name.to_lowercase().contains(needle)
                        || u.email.to_lowercase().contains(needle)
                }
            })
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total = matches.len() as u64;
        let data = matches
            .into_iter()
            .skip(request.offset())
            .take(request.limit())
            .cloned()
            .collect();
        Page { data, total }
    }
}

pub struct UserService {
    users: Arc<dyn UserStore>,
    clock: Arc<dyn Clock>,
    persist: Arc<dyn Persist>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserStore>, clock: Arc<dyn Clock>, persist: Arc<dyn Persist>) -> Self {
        Self {
            users,
            clock,
            persist,
        }
    }

    pub fn find_all(&self, request: PageRequest, search: Option<&str>) -> Page<User> {
        self.users.page(&request, search)
    }

    pub fn find_by_id(&self, id: i64) -> Result<User, CoreError> {
        self.users.get(id).ok_or(CoreError::NotFound("user"))
    }

    /// Field-merge: only supplied fields change.
    pub fn update_detail(&self, id: i64, patch: UserPatch) -> Result<User, CoreError> {
        let mut user = self.find_by_id(id)?;
        if let Some(email) = &patch.email {
            if let Some(existing) = self.users.find_by_email(email) {
                if existing.id != id {
                    return Err(CoreError::DuplicateEmail);
                }
            }
        }
        if let Some(first_name) = patch.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = patch.last_name {
            user.last_name = last_name;
        }
        if let Some(phone) = patch.phone {
            user.phone = phone;
        }
        if let Some(email) = patch.email {
            user.email = email;
        }
        user.updated_at = self.clock.now();
        self.users.put(user.clone());
        self.persist.persist()?;
        Ok(user)
    }

    pub fn update_role(&self, id: i64, role: Role) -> Result<User, CoreError> {
        let mut user = self.find_by_id(id)?;
        user.role = role;
        user.updated_at = self.clock.now();
        self.users.put(user.clone());
        self.persist.persist()?;
        Ok(user)
    }
}
