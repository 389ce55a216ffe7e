use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditSink};
use crate::bootstrap::Persist;
use crate::clock::Clock;
use crate::error::CoreError;
use crate::user::{Role, User, UserStore};

/// bcrypt work factor for stored credentials.
pub const BCRYPT_COST: u32 = 12;

/// Claims carried by every issued token.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub uuid: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signs and verifies HS256 bearer tokens. Expiry is checked against the
/// caller-supplied clock so tests stay deterministic.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_seconds: i64,
}

impl TokenService {
    pub fn new(secret: &str, ttl_seconds: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_seconds,
        }
    }

    pub fn issue(&self, user: &User, now: DateTime<Utc>) -> Result<String, CoreError> {
        let claims = Claims {
            sub: user.id,
            uuid: user.uuid.clone(),
            role: user.role,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            phone: user.phone.clone(),
            email: user.email.clone(),
            iat: now.timestamp(),
            exp: now.timestamp() + self.ttl_seconds,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|err| CoreError::Token(err.to_string()))
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, CoreError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        let data = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|_| CoreError::Unauthenticated)?;
        if data.claims.exp <= now.timestamp() {
            return Err(CoreError::Unauthenticated);
        }
        Ok(data.claims)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: String,
    pub password: String,
    pub role: Option<Role>,
}

/// Registers and authenticates principals. Logout is intentionally absent:
/// tokens are stateless, there is no server-side blacklist, and the contract
/// is that the client discards the token.
pub struct AuthService {
    users: Arc<dyn UserStore>,
    tokens: TokenService,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    persist: Arc<dyn Persist>,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: TokenService,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
        persist: Arc<dyn Persist>,
    ) -> Self {
        Self {
            users,
            tokens,
            clock,
            audit,
            persist,
            bcrypt_cost: BCRYPT_COST,
        }
    }

    /// Lower-cost hashing for tests; production wiring keeps `BCRYPT_COST`.
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    /// Fails with `DuplicateEmail` when a non-archived user holds the email
    /// already; the existing record is left untouched. The raw password
    /// never leaves this function.
    pub fn register(&self, request: RegisterRequest) -> Result<User, CoreError> {
        if !request.email.contains('@') {
            return Err(CoreError::Validation("email is malformed".to_string()));
        }
        if request.password.len() < 8 {
            return Err(CoreError::Validation(
                "password must be at least 8 characters".to_string(),
            ));
        }
        if self.users.find_by_email(&request.email).is_some() {
            return Err(CoreError::DuplicateEmail);
        }
        let password_hash = bcrypt::hash(&request.password, self.bcrypt_cost)
            .map_err(|err| CoreError::Internal(err.to_string()))?;
        let now = self.clock.now();
        let user = User {
            id: 0,
            uuid: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            archived: None,
            first_name: request.first_name,
            last_name: request.last_name,
            phone: request.phone,
            email: request.email,
            password_hash,
            role: request.role.unwrap_or(Role::Viewer),
        };
        let user = self.users.insert(user);
        self.persist.persist()?;
        info!(user = user.id, "registered user");
        self.audit.record(AuditEvent {
            actor_id: Some(user.id),
            action: "auth.register".to_string(),
            detail: user.email.clone(),
        });
        Ok(user)
    }

    /// Unknown email and wrong password are indistinguishable to the caller.
    pub fn login(&self, email: &str, password: &str) -> Result<String, CoreError> {
        let Some(user) = self.users.find_by_email(email) else {
            self.audit.record(AuditEvent {
                actor_id: None,
                action: "auth.login.denied".to_string(),
                detail: email.to_string(),
            });
            return Err(CoreError::InvalidCredentials);
        };
        let verified = bcrypt::verify(password, &user.password_hash).unwrap_or(false);
        if !verified {
            self.audit.record(AuditEvent {
                actor_id: Some(user.id),
                action: "auth.login.denied".to_string(),
                detail: email.to_string(),
            });
            return Err(CoreError::InvalidCredentials);
        }
        let token = self.tokens.issue(&user, self.clock.now())?;
        self.audit.record(AuditEvent {
            actor_id: Some(user.id),
            action: "auth.login".to_string(),
            detail: email.to_string(),
        });
        Ok(token)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, CoreError> {
        self.tokens.verify(token, self.clock.now())
    }
}
