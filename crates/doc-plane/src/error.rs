use thiserror::Error;

use crate::repository::RepositoryError;

/// Failure taxonomy surfaced by every service in this crate. Nothing is
/// retried or suppressed; callers decide how to map each variant.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("authentication required")]
    Unauthenticated,
    #[error("forbidden")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0} already archived")]
    AlreadyArchived(&'static str),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("token error: {0}")]
    Token(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("store error: {0}")]
    Store(String),
}

impl From<RepositoryError> for CoreError {
    fn from(err: RepositoryError) -> Self {
        CoreError::Store(err.to_string())
    }
}
