use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ondam_core::error::{self, ApiError};

/// Internal error type for the HTTP surface, converted to structured
/// JSON responses. Conversation-level failures never reach this — the
/// dispatcher absorbs them into user-visible messages; this covers the
/// webhook plumbing itself.
#[derive(Debug)]
pub enum AppError {
    /// Malformed webhook payload (400)
    Validation { message: String, field: Option<String> },
    /// Signature header missing or wrong (401)
    InvalidSignature,
    /// Database error (500)
    Database(sqlx::Error),
    /// Internal error (500)
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, api_error) = match self {
            AppError::Validation { message, field } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error: error::codes::VALIDATION_FAILED.to_string(),
                    message,
                    field,
                    request_id,
                },
            ),
            AppError::InvalidSignature => (
                StatusCode::UNAUTHORIZED,
                ApiError {
                    error: error::codes::INVALID_SIGNATURE.to_string(),
                    message: "Webhook signature verification failed".to_string(),
                    field: None,
                    request_id,
                },
            ),
            AppError::Database(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::INTERNAL_ERROR.to_string(),
                        message: "An internal error occurred".to_string(),
                        field: None,
                        request_id,
                    },
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::INTERNAL_ERROR.to_string(),
                        message: "An internal error occurred".to_string(),
                        field: None,
                        request_id,
                    },
                )
            }
        };

        (status, Json(api_error)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}
