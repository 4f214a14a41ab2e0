use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors surfaced by the registration service, mapped to HTTP status codes
/// at the API boundary.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid email address")]
    InvalidEmail,
    #[error("password must be at least {0} characters long")]
    WeakPassword(usize),
    #[error("an account with this email already exists")]
    EmailAlreadyRegistered,
    #[error("user not found")]
    UserNotFound,
    #[error("invalid email or activation code")]
    InvalidCode,
    #[error("activation code has expired")]
    CodeExpired,
    #[error("could not allocate a unique activation code")]
    CodeGenerationExhausted,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InvalidEmail | ServiceError::WeakPassword(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ServiceError::EmailAlreadyRegistered => StatusCode::CONFLICT,
            ServiceError::UserNotFound => StatusCode::NOT_FOUND,
            ServiceError::InvalidCode => StatusCode::UNAUTHORIZED,
            ServiceError::CodeExpired => StatusCode::BAD_REQUEST,
            ServiceError::CodeGenerationExhausted | ServiceError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // 5xx details stay in the logs, never in the response body
        let detail = if status.is_server_error() {
            error!(error = %self, "request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
