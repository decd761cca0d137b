// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    AuthError(String),

    // 403 Forbidden (not the owner, quiz not open yet)
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    /// 409 Conflict: another submit already finalized this attempt.
    StaleSubmission { attempt_id: i64 },

    // 410 Gone (quiz window closed)
    Gone(String),

    /// 422: appending `question_count` questions would leave some of them
    /// without a single mark.
    InsufficientBudget {
        remaining_budget: i32,
        question_count: usize,
    },

    /// 422: a reported timer value that cannot be stored.
    InvalidTimerValue(i64),

    // 429 Too Many Requests (daily AI usage)
    TooManyRequests(String),
}

impl AppError {
    /// Short machine-readable kind, echoed in the response body.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InternalServerError(_) => "internal",
            AppError::BadRequest(_) => "bad_request",
            AppError::AuthError(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::StaleSubmission { .. } => "stale_submission",
            AppError::Gone(_) => "gone",
            AppError::InsufficientBudget { .. } => "insufficient_budget",
            AppError::InvalidTimerValue(_) => "invalid_timer_value",
            AppError::TooManyRequests(_) => "too_many_requests",
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, body) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error", "code": code }),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg, "code": code })),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg, "code": code })),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg, "code": code })),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg, "code": code })),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, json!({ "error": msg, "code": code })),
            AppError::StaleSubmission { attempt_id } => (
                StatusCode::CONFLICT,
                json!({
                    "error": "This attempt was already submitted",
                    "code": code,
                    "attempt_id": attempt_id,
                }),
            ),
            AppError::Gone(msg) => (StatusCode::GONE, json!({ "error": msg, "code": code })),
            AppError::InsufficientBudget {
                remaining_budget,
                question_count,
            } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({
                    "error": format!(
                        "Not enough marks: {} remaining for {} new questions. Increase the quiz total marks.",
                        remaining_budget, question_count
                    ),
                    "code": code,
                    "remaining_budget": remaining_budget,
                    "question_count": question_count,
                }),
            ),
            AppError::InvalidTimerValue(value) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({
                    "error": format!("Invalid remaining time: {}", value),
                    "code": code,
                }),
            ),
            AppError::TooManyRequests(msg) => {
                (StatusCode::TOO_MANY_REQUESTS, json!({ "error": msg, "code": code }))
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError::InternalServerError`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
