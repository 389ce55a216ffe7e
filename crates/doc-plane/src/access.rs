use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::user::Role;

bitflags! {
    /// Required-role set for an operation, kept as data so authorization
    /// rules live in one table instead of scattered conditionals.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
    pub struct RoleSet: u8 {
        const ADMIN = 0b001;
        const EDITOR = 0b010;
        const VIEWER = 0b100;
    }
}

impl RoleSet {
    pub const ANY: RoleSet = RoleSet::ADMIN.union(RoleSet::EDITOR).union(RoleSet::VIEWER);
}

impl From<Role> for RoleSet {
    fn from(role: Role) -> Self {
        match role {
            Role::Admin => RoleSet::ADMIN,
            Role::Editor => RoleSet::EDITOR,
            Role::Viewer => RoleSet::VIEWER,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum AccessDecision {
    Allow,
    Deny,
}

/// The authenticated actor, threaded explicitly through every authorization
/// call. There is no ambient "current user".
#[derive(Clone, Copy, Debug)]
pub struct Principal {
    pub id: i64,
    pub role: Role,
}

/// Role gate. Total and side-effect free: an empty required set means no
/// restriction was declared; a missing role is a denial otherwise.
pub fn role_gate(role: Option<Role>, required: RoleSet) -> AccessDecision {
    if required.is_empty() {
        return AccessDecision::Allow;
    }
    match role {
        Some(role) if required.contains(RoleSet::from(role)) => AccessDecision::Allow,
        _ => AccessDecision::Deny,
    }
}

/// Ownership gate applied to mutating operations on owned resources.
pub fn owner_or_admin(role: Role, principal_id: i64, owner_id: Option<i64>) -> AccessDecision {
    if role == Role::Admin || owner_id == Some(principal_id) {
        AccessDecision::Allow
    } else {
        AccessDecision::Deny
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
    ListDocuments,
    UploadDocument,
    DeleteDocument,
    RenameDocument,
    TriggerIngestion,
    ListIngestions,
    GetIngestion,
    UpdateIngestionStatus,
    CancelIngestion,
    ListUsers,
    GetUser,
    UpdateUserRole,
    UpdateUserDetail,
}

#[derive(Clone, Copy, Debug)]
pub struct OperationPolicy {
    pub required: RoleSet,
    pub owner_gated: bool,
}

/// One policy per operation. Exhaustive on purpose: a new action does not
/// compile until it gets a row here.
pub fn policy_for(action: Action) -> OperationPolicy {
    let (required, owner_gated) = match action {
        Action::ListDocuments => (RoleSet::ANY, false),
        Action::UploadDocument => (RoleSet::ADMIN.union(RoleSet::EDITOR), false),
        Action::DeleteDocument => (RoleSet::ADMIN.union(RoleSet::EDITOR), true),
        Action::RenameDocument => (RoleSet::ADMIN.union(RoleSet::EDITOR), true),
        Action::TriggerIngestion => (RoleSet::ADMIN.union(RoleSet::EDITOR), false),
        Action::ListIngestions => (RoleSet::ANY, false),
        Action::GetIngestion => (RoleSet::ANY, false),
        Action::UpdateIngestionStatus => (RoleSet::ADMIN, false),
        Action::CancelIngestion => (RoleSet::ADMIN.union(RoleSet::EDITOR), true),
        Action::ListUsers => (RoleSet::ADMIN, false),
        Action::GetUser => (RoleSet::ADMIN, false),
        Action::UpdateUserRole => (RoleSet::ADMIN, false),
        Action::UpdateUserDetail => (RoleSet::ANY, true),
    };
    OperationPolicy {
        required,
        owner_gated,
    }
}

pub trait AccessEngine: Send + Sync {
    fn check(
        &self,
        principal: Option<&Principal>,
        action: Action,
        owner_id: Option<i64>,
    ) -> AccessDecision;
}

/// Composes the two gates: role gate first, ownership gate where the policy
/// flags it. Never panics, never touches shared state.
pub struct PolicyAccessEngine;

impl PolicyAccessEngine {
    pub fn shared() -> std::sync::Arc<Self> {
        std::sync::Arc::new(PolicyAccessEngine)
    }
}

impl AccessEngine for PolicyAccessEngine {
    fn check(
        &self,
        principal: Option<&Principal>,
        action: Action,
        owner_id: Option<i64>,
    ) -> AccessDecision {
        let policy = policy_for(action);
        if role_gate(principal.map(|p| p.role), policy.required) == AccessDecision::Deny {
            return AccessDecision::Deny;
        }
        if policy.owner_gated {
            let Some(principal) = principal else {
                return AccessDecision::Deny;
            };
            return owner_or_admin(principal.role, principal.id, owner_id);
        }
        AccessDecision::Allow
    }
}
