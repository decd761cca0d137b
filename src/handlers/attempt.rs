// src/handlers/attempt.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use crate::{
    error::AppError,
    models::attempt::{StartOutcome, SubmitAttemptRequest, TimerUpdateRequest},
    services::AttemptService,
    utils::jwt::Claims,
};

/// Starts (or resumes) the caller's attempt at a quiz.
///
/// * 201 with a fresh timer when no attempt was running.
/// * 200 with the untouched running attempt otherwise.
pub async fn start_attempt(
    State(service): State<AttemptService>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;

    let (status, resumed, attempt) = match service.start(student_id, quiz_id).await? {
        StartOutcome::Created(a) => (StatusCode::CREATED, false, a),
        StartOutcome::AlreadyActive(a) => (StatusCode::OK, true, a),
    };

    Ok((
        status,
        Json(json!({
            "attempt_id": attempt.id,
            "quiz_id": attempt.quiz_id,
            "started_at": attempt.started_at,
            "remaining_seconds": attempt.remaining_seconds,
            "total_marks": attempt.total_marks,
            "resumed": resumed,
        })),
    ))
}

/// Reports how much time the client has left. Used for pausing as well.
pub async fn update_timer(
    State(service): State<AttemptService>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
    Json(payload): Json<TimerUpdateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;

    let updated = service
        .update_remaining_time(student_id, quiz_id, payload.remaining_seconds)
        .await?;

    Ok(Json(json!({
        "updated": updated.is_some(),
        "remaining_seconds": updated.map(|a| a.remaining_seconds),
    })))
}

/// Whether the caller has a running attempt, and its remaining time.
pub async fn attempt_status(
    State(service): State<AttemptService>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;
    let status = service.status(student_id, quiz_id).await?;
    Ok(Json(status))
}

pub async fn submit_attempt(
    State(service): State<AttemptService>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
    Json(payload): Json<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;
    let result = service.submit(student_id, quiz_id, &payload.answers).await?;

    Ok(Json(result))
}
