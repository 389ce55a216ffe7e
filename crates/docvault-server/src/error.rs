use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use doc_plane::CoreError;
use serde::Serialize;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.status.as_str().to_string(),
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::DuplicateEmail | CoreError::AlreadyArchived(_) | CoreError::Validation(_) => {
                AppError::bad_request(message)
            }
            CoreError::InvalidCredentials | CoreError::Unauthenticated => {
                AppError::unauthorized(message)
            }
            CoreError::Forbidden => AppError::forbidden(message),
            CoreError::NotFound(_) => AppError::not_found(message),
            CoreError::Token(_) | CoreError::Internal(_) | CoreError::Store(_) => {
                AppError::internal(message)
            }
        }
    }
}

impl From<doc_plane::RepositoryError> for AppError {
    fn from(err: doc_plane::RepositoryError) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<doc_plane::ConfigError> for AppError {
    fn from(err: doc_plane::ConfigError) -> Self {
        AppError::bad_request(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status.as_str(), self.message)
    }
}

impl std::error::Error for AppError {}
