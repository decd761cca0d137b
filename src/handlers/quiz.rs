// src/handlers/quiz.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;

use crate::{
    error::AppError,
    models::{
        question::{AllocateMarksRequest, QuestionBatchRequest, QuestionEdit},
        quiz::QuizDraft,
    },
    services::AuthoringService,
    utils::jwt::Claims,
};

/// Quiz metadata and question count.
pub async fn get_quiz(
    State(service): State<AuthoringService>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let summary = service.get_quiz(quiz_id).await?;
    Ok(Json(summary))
}

/// Questions for an open exam, without correct answers.
pub async fn exam_questions(
    State(service): State<AuthoringService>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let questions = service.exam_questions(quiz_id, Utc::now()).await?;
    Ok(Json(questions))
}

/// Creates a quiz owned by the caller.
/// Instructor or admin only.
pub async fn create_quiz(
    State(service): State<AuthoringService>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<QuizDraft>,
) -> Result<impl IntoResponse, AppError> {
    let owner_id = claims.user_id()?;
    let quiz = service.create_quiz(owner_id, &payload).await?;
    Ok((StatusCode::CREATED, Json(quiz)))
}

/// Replaces quiz metadata. Changing the total rebalances all question marks.
pub async fn update_quiz(
    State(service): State<AuthoringService>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
    Json(payload): Json<QuizDraft>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let quiz = service
        .update_quiz(quiz_id, user_id, claims.is_admin(), &payload)
        .await?;
    Ok(Json(quiz))
}

/// Deletes a quiz. Refused with 409 once any attempt has been submitted.
pub async fn delete_quiz(
    State(service): State<AuthoringService>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    service
        .delete_quiz(quiz_id, user_id, claims.is_admin())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Question list with answers, for the quiz's managers.
pub async fn list_questions(
    State(service): State<AuthoringService>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let questions = service
        .managed_questions(quiz_id, user_id, claims.is_admin())
        .await?;
    Ok(Json(questions))
}

/// Adds questions and redistributes the quiz total over all of them.
pub async fn add_questions(
    State(service): State<AuthoringService>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
    Json(payload): Json<QuestionBatchRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let questions = service
        .add_questions(quiz_id, user_id, claims.is_admin(), &payload)
        .await?;
    Ok((StatusCode::CREATED, Json(questions)))
}

/// Saves a generated batch using only the quiz's unused marks.
/// Fails with 422 when the leftover cannot give each question a mark.
pub async fn append_questions(
    State(service): State<AuthoringService>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
    Json(payload): Json<QuestionBatchRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let questions = service
        .append_questions(quiz_id, user_id, claims.is_admin(), &payload)
        .await?;
    Ok((StatusCode::CREATED, Json(questions)))
}

pub async fn allocate_marks(
    State(service): State<AuthoringService>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
    Json(payload): Json<AllocateMarksRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let questions = service
        .allocate_marks(quiz_id, user_id, claims.is_admin(), &payload)
        .await?;
    Ok(Json(questions))
}

/// Edits a question's text, options or answer. Marks are left alone.
pub async fn update_question(
    State(service): State<AuthoringService>,
    Extension(claims): Extension<Claims>,
    Path(question_id): Path<i64>,
    Json(payload): Json<QuestionEdit>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let question = service
        .update_question(question_id, user_id, claims.is_admin(), &payload)
        .await?;
    Ok(Json(question))
}

/// Deletes an unanswered question; the remaining ones share its marks.
/// Returns the remaining questions.
pub async fn delete_question(
    State(service): State<AuthoringService>,
    Extension(claims): Extension<Claims>,
    Path(question_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let remaining = service
        .delete_question(question_id, user_id, claims.is_admin())
        .await?;
    Ok(Json(remaining))
}
