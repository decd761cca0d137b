// src/store/mod.rs

//! Persistence seams for the quiz core.
//!
//! `PgStore` is the production implementation. `MemoryStore` keeps the same
//! invariants in process and backs the test suite.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{
    error::AppError,
    models::{
        attempt::{
            Attempt, AttemptSummary, Finalization, LeaderboardEntry, NewAttempt, StartOutcome,
            SubmittedAnswer,
        },
        question::{MarkTarget, Question, QuestionDraft},
        quiz::{Quiz, QuizDraft},
        usage::DailyUsage,
        user::User,
    },
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Quizzes, their questions, and the user rows the core reads.
#[async_trait]
pub trait QuizRepository: Send + Sync {
    async fn find_user(&self, id: i64) -> Result<Option<User>, AppError>;

    async fn get_quiz(&self, id: i64) -> Result<Option<Quiz>, AppError>;

    async fn create_quiz(&self, owner_id: i64, draft: &QuizDraft) -> Result<Quiz, AppError>;

    /// Overwrites quiz metadata. When the total changes and the quiz has
    /// questions, all of them are reallocated in the same transaction.
    async fn update_quiz(&self, id: i64, draft: &QuizDraft) -> Result<Quiz, AppError>;

    /// Deletes a quiz with its questions. Fails with `Conflict` once any
    /// attempt at it has been submitted.
    async fn delete_quiz(&self, id: i64) -> Result<(), AppError>;

    /// Questions of a quiz in creation order.
    async fn questions_for_quiz(&self, quiz_id: i64) -> Result<Vec<Question>, AppError>;

    async fn get_question(&self, id: i64) -> Result<Option<Question>, AppError>;

    /// Inserts the drafts and reallocates every question of the quiz.
    /// Returns all questions of the quiz.
    async fn add_questions(
        &self,
        quiz_id: i64,
        drafts: &[QuestionDraft],
    ) -> Result<Vec<Question>, AppError>;

    /// Inserts the drafts with marks taken from the quiz's unused budget.
    /// Fails with `InsufficientBudget` without inserting anything.
    /// Returns only the new questions.
    async fn append_questions(
        &self,
        quiz_id: i64,
        drafts: &[QuestionDraft],
    ) -> Result<Vec<Question>, AppError>;

    /// Replaces the text, options and answer of a question. Marks stay.
    async fn update_question(&self, id: i64, draft: &QuestionDraft) -> Result<Question, AppError>;

    /// Deletes a question nobody has answered yet and reallocates the quiz
    /// total over the remaining ones, atomically. Fails with `Conflict` when a
    /// submitted answer references it. Returns the remaining questions.
    async fn delete_question(&self, id: i64) -> Result<Vec<Question>, AppError>;

    /// Explicit allocation of `budget` over `target`. Returns all questions.
    async fn allocate_marks(
        &self,
        quiz_id: i64,
        budget: i32,
        target: &MarkTarget,
    ) -> Result<Vec<Question>, AppError>;

    /// `None` when the user does not exist.
    async fn ai_usage(&self, user_id: i64) -> Result<Option<DailyUsage>, AppError>;

    /// Advances the user's daily counter, failing once `limit` is reached.
    async fn consume_ai_usage(
        &self,
        user_id: i64,
        today: NaiveDate,
        limit: u32,
    ) -> Result<DailyUsage, AppError>;
}

/// Attempt rows keyed by (student, quiz).
#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn find_active_attempt(
        &self,
        student_id: i64,
        quiz_id: i64,
    ) -> Result<Option<Attempt>, AppError>;

    /// Creates the active attempt unless one exists, atomically.
    async fn create_attempt(&self, new: NewAttempt) -> Result<StartOutcome, AppError>;

    /// Overwrites `remaining_seconds` of the active attempt, if any.
    /// Never touches submitted rows and never creates one.
    async fn update_remaining_seconds(
        &self,
        student_id: i64,
        quiz_id: i64,
        seconds: i32,
    ) -> Result<Option<Attempt>, AppError>;

    /// Turns the active attempt `attempt_id` terminal in place.
    /// Fails with `StaleSubmission` when it was already submitted.
    async fn finalize_attempt(
        &self,
        attempt_id: i64,
        finalization: &Finalization,
    ) -> Result<Attempt, AppError>;

    /// Inserts an already-terminal attempt (submit without a prior start).
    async fn record_submitted_attempt(
        &self,
        new: NewAttempt,
        finalization: &Finalization,
    ) -> Result<Attempt, AppError>;

    async fn get_attempt(&self, id: i64) -> Result<Option<Attempt>, AppError>;

    async fn submitted_answers(&self, attempt_id: i64) -> Result<Vec<SubmittedAnswer>, AppError>;

    /// Most recently submitted attempt of a student at a quiz.
    async fn latest_submitted(
        &self,
        student_id: i64,
        quiz_id: i64,
    ) -> Result<Option<Attempt>, AppError>;

    /// Submitted attempts of a student, newest first.
    async fn list_attempts(&self, student_id: i64) -> Result<Vec<AttemptSummary>, AppError>;

    /// Students ranked by total score over submitted attempts.
    async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>, AppError>;
}
