use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::auth::validation::ValidationErrors;

/// Errors surfaced by the auth handlers.
///
/// Every variant renders as a JSON object with a `message`; validation
/// failures also carry the per-field `errors` map.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation failed")]
    Validation(ValidationErrors),

    /// Wrong email/password pair. Deliberately says nothing about which half was wrong.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// Missing, malformed, expired or otherwise unusable bearer token.
    #[error("unauthenticated")]
    Unauthenticated,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

pub const REGISTER_FAILED: &str = "Failed to register user";
pub const INVALID_CREDENTIALS: &str = "Invalid email or password";
pub const UNAUTHENTICATED: &str = "Unauthenticated.";

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "message": REGISTER_FAILED, "errors": errors }),
            ),
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                json!({ "message": INVALID_CREDENTIALS }),
            ),
            AppError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                json!({ "message": UNAUTHENTICATED }),
            ),
            AppError::Internal(e) => {
                tracing::error!(error = ?e, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "message": "Server Error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
