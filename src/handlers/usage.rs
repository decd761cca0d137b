// src/handlers/usage.rs

use axum::{Extension, Json, extract::State, response::IntoResponse};

use crate::{error::AppError, services::UsageService, utils::jwt::Claims};

/// Today's generated-question usage for the caller.
pub async fn get_usage(
    State(service): State<UsageService>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let report = service.get_usage(user_id).await?;
    Ok(Json(report))
}

/// Spends one generation from today's quota. 429 once the limit is reached.
pub async fn consume_usage(
    State(service): State<UsageService>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let report = service.consume_usage(user_id).await?;
    Ok(Json(report))
}
