// src/services/authoring.rs

//! Instructor-side operations on quizzes and their question banks.
//!
//! Every mutation checks ownership first. Mark allocation itself happens in
//! the store, inside the same transaction as the writes it governs.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    models::{
        question::{
            AllocateMarksRequest, PublicQuestion, Question, QuestionBatchRequest, QuestionEdit,
        },
        quiz::{Availability, Quiz, QuizDraft, QuizSummary},
    },
    store::QuizRepository,
};

#[derive(Clone)]
pub struct AuthoringService {
    quizzes: Arc<dyn QuizRepository>,
}

impl AuthoringService {
    pub fn new(quizzes: Arc<dyn QuizRepository>) -> Self {
        Self { quizzes }
    }

    async fn require_quiz(&self, quiz_id: i64) -> Result<Quiz, AppError> {
        self.quizzes
            .get_quiz(quiz_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Quiz not found".to_string()))
    }

    async fn managed_quiz(&self, quiz_id: i64, user_id: i64, is_admin: bool) -> Result<Quiz, AppError> {
        let quiz = self.require_quiz(quiz_id).await?;
        quiz.ensure_managed_by(user_id, is_admin)?;
        Ok(quiz)
    }

    pub async fn create_quiz(&self, owner_id: i64, draft: &QuizDraft) -> Result<Quiz, AppError> {
        draft.check()?;
        let quiz = self.quizzes.create_quiz(owner_id, draft).await?;
        tracing::info!("Quiz {} created by user {}", quiz.id, owner_id);
        Ok(quiz)
    }

    pub async fn update_quiz(
        &self,
        quiz_id: i64,
        user_id: i64,
        is_admin: bool,
        draft: &QuizDraft,
    ) -> Result<Quiz, AppError> {
        draft.check()?;
        self.managed_quiz(quiz_id, user_id, is_admin).await?;
        self.quizzes.update_quiz(quiz_id, draft).await
    }

    /// Deletes a quiz nobody has submitted yet.
    pub async fn delete_quiz(&self, quiz_id: i64, user_id: i64, is_admin: bool) -> Result<(), AppError> {
        self.managed_quiz(quiz_id, user_id, is_admin).await?;
        self.quizzes.delete_quiz(quiz_id).await?;
        tracing::info!("Quiz {} deleted by user {}", quiz_id, user_id);
        Ok(())
    }

    pub async fn get_quiz(&self, quiz_id: i64) -> Result<QuizSummary, AppError> {
        let quiz = self.require_quiz(quiz_id).await?;
        let question_count = self.quizzes.questions_for_quiz(quiz_id).await?.len();
        Ok(QuizSummary {
            quiz,
            question_count,
        })
    }

    /// Full question list, answers included, for the quiz's managers.
    pub async fn managed_questions(
        &self,
        quiz_id: i64,
        user_id: i64,
        is_admin: bool,
    ) -> Result<Vec<Question>, AppError> {
        self.managed_quiz(quiz_id, user_id, is_admin).await?;
        self.quizzes.questions_for_quiz(quiz_id).await
    }

    /// Adds questions and rebalances the whole quiz.
    pub async fn add_questions(
        &self,
        quiz_id: i64,
        user_id: i64,
        is_admin: bool,
        batch: &QuestionBatchRequest,
    ) -> Result<Vec<Question>, AppError> {
        batch.check()?;
        self.managed_quiz(quiz_id, user_id, is_admin).await?;

        let questions = self.quizzes.add_questions(quiz_id, &batch.questions).await?;
        tracing::info!(
            "Added {} questions to quiz {}, {} in total",
            batch.questions.len(),
            quiz_id,
            questions.len()
        );
        Ok(questions)
    }

    /// Adds questions paid for out of the quiz's unused marks only.
    pub async fn append_questions(
        &self,
        quiz_id: i64,
        user_id: i64,
        is_admin: bool,
        batch: &QuestionBatchRequest,
    ) -> Result<Vec<Question>, AppError> {
        batch.check()?;
        self.managed_quiz(quiz_id, user_id, is_admin).await?;

        let appended = self
            .quizzes
            .append_questions(quiz_id, &batch.questions)
            .await
            .inspect_err(|e| {
                if let AppError::InsufficientBudget {
                    remaining_budget,
                    question_count,
                } = e
                {
                    tracing::warn!(
                        "Quiz {} has {} marks left for {} new questions",
                        quiz_id,
                        remaining_budget,
                        question_count
                    );
                }
            })?;
        tracing::info!("Appended {} questions to quiz {}", appended.len(), quiz_id);
        Ok(appended)
    }

    async fn managed_question(
        &self,
        question_id: i64,
        user_id: i64,
        is_admin: bool,
    ) -> Result<Question, AppError> {
        let question = self
            .quizzes
            .get_question(question_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;
        self.managed_quiz(question.quiz_id, user_id, is_admin).await?;
        Ok(question)
    }

    /// Edits question text, options or answer. Allowed even after students
    /// answered it; their reviews keep the text they saw.
    pub async fn update_question(
        &self,
        question_id: i64,
        user_id: i64,
        is_admin: bool,
        edit: &QuestionEdit,
    ) -> Result<Question, AppError> {
        let current = self.managed_question(question_id, user_id, is_admin).await?;
        if edit.is_empty() {
            return Ok(current);
        }
        let draft = edit.apply_to(&current)?;
        self.quizzes.update_question(question_id, &draft).await
    }

    /// Deletes an unanswered question and rebalances the rest of the quiz.
    pub async fn delete_question(
        &self,
        question_id: i64,
        user_id: i64,
        is_admin: bool,
    ) -> Result<Vec<Question>, AppError> {
        let question = self.managed_question(question_id, user_id, is_admin).await?;
        let remaining = self.quizzes.delete_question(question_id).await?;
        tracing::info!(
            "Question {} deleted from quiz {}, {} left",
            question_id,
            question.quiz_id,
            remaining.len()
        );
        Ok(remaining)
    }

    pub async fn allocate_marks(
        &self,
        quiz_id: i64,
        user_id: i64,
        is_admin: bool,
        request: &AllocateMarksRequest,
    ) -> Result<Vec<Question>, AppError> {
        self.managed_quiz(quiz_id, user_id, is_admin).await?;
        self.quizzes
            .allocate_marks(quiz_id, request.total_marks, &request.target())
            .await
    }

    /// Questions as a student sees them during an exam, answers stripped.
    pub async fn exam_questions(
        &self,
        quiz_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<PublicQuestion>, AppError> {
        let quiz = self.require_quiz(quiz_id).await?;

        match quiz.availability(now) {
            Availability::Open => {}
            Availability::NotPublished => {
                return Err(AppError::Forbidden("Quiz is not published".to_string()));
            }
            Availability::NotStarted => {
                return Err(AppError::Forbidden("Quiz has not started yet".to_string()));
            }
            Availability::Ended => {
                return Err(AppError::Gone("Quiz has ended".to_string()));
            }
        }

        let questions = self.quizzes.questions_for_quiz(quiz_id).await?;
        Ok(questions.into_iter().map(PublicQuestion::from).collect())
    }
}
