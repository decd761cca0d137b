// src/handlers/result.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{error::AppError, services::ResultService, utils::jwt::Claims};

/// Query parameters for the leaderboard.
#[derive(Debug, Deserialize)]
pub struct LeaderboardParams {
    pub limit: Option<i64>,
}

/// A submitted attempt with its frozen review.
pub async fn get_result(
    State(service): State<ResultService>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let result = service
        .get_result(attempt_id, user_id, claims.is_admin())
        .await?;
    Ok(Json(result))
}

/// The caller's most recent result at a quiz.
pub async fn latest_result(
    State(service): State<ResultService>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;
    let result = service.latest_result(student_id, quiz_id).await?;
    Ok(Json(result))
}

pub async fn my_attempts(
    State(service): State<ResultService>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;
    let attempts = service.list_attempts(student_id).await?;
    Ok(Json(attempts))
}

pub async fn my_mistakes(
    State(service): State<ResultService>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;
    let attempts = service.mistakes(student_id).await?;
    Ok(Json(attempts))
}

/// Public ranking by total score.
pub async fn leaderboard(
    State(service): State<ResultService>,
    Query(params): Query<LeaderboardParams>,
) -> Result<impl IntoResponse, AppError> {
    let entries = service.leaderboard(params.limit).await?;
    Ok(Json(entries))
}
