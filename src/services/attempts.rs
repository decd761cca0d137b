// src/services/attempts.rs

//! Attempt lifecycle: start, timer reports, status checks and submission.
//!
//! An attempt is Active while `submitted_at` is unset and Submitted once it
//! is set. Pausing is only a timer report; there is no paused state.

use std::sync::Arc;

use chrono::Utc;

use crate::{
    error::AppError,
    models::{
        attempt::{
            AnswerSubmission, Attempt, AttemptResult, AttemptStatus, Finalization, NewAttempt,
            StartOutcome,
        },
        quiz::Quiz,
        user::User,
    },
    services::scoring::{ScoredSubmission, score},
    store::{AttemptStore, QuizRepository},
};

#[derive(Clone)]
pub struct AttemptService {
    quizzes: Arc<dyn QuizRepository>,
    attempts: Arc<dyn AttemptStore>,
}

impl AttemptService {
    pub fn new(quizzes: Arc<dyn QuizRepository>, attempts: Arc<dyn AttemptStore>) -> Self {
        Self { quizzes, attempts }
    }

    async fn require_quiz(&self, quiz_id: i64) -> Result<Quiz, AppError> {
        self.quizzes
            .get_quiz(quiz_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Quiz not found".to_string()))
    }

    async fn require_student(&self, student_id: i64) -> Result<User, AppError> {
        self.quizzes
            .find_user(student_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Student not found".to_string()))
    }

    /// Opens an attempt, or hands back the one already running.
    ///
    /// A retried or duplicated start never creates a second timer and never
    /// changes the running attempt.
    pub async fn start(&self, student_id: i64, quiz_id: i64) -> Result<StartOutcome, AppError> {
        self.require_student(student_id).await?;
        let quiz = self.require_quiz(quiz_id).await?;

        let outcome = self
            .attempts
            .create_attempt(NewAttempt::for_quiz(student_id, &quiz, Utc::now()))
            .await?;

        match &outcome {
            StartOutcome::Created(a) => tracing::info!(
                "Student {} started quiz {} (attempt {}, {}s)",
                student_id,
                quiz_id,
                a.id,
                a.remaining_seconds
            ),
            StartOutcome::AlreadyActive(a) => tracing::debug!(
                "Student {} resumed attempt {} on quiz {}",
                student_id,
                a.id,
                quiz_id
            ),
        }

        Ok(outcome)
    }

    /// Stores the client's remaining time verbatim.
    ///
    /// Returns `None` when no attempt is active; a report against a finished
    /// session must not bring it back.
    pub async fn update_remaining_time(
        &self,
        student_id: i64,
        quiz_id: i64,
        seconds_left: i64,
    ) -> Result<Option<Attempt>, AppError> {
        let seconds = i32::try_from(seconds_left)
            .ok()
            .filter(|s| *s >= 0)
            .ok_or(AppError::InvalidTimerValue(seconds_left))?;

        let updated = self
            .attempts
            .update_remaining_seconds(student_id, quiz_id, seconds)
            .await?;

        if updated.is_none() {
            tracing::debug!(
                "Ignoring timer report from student {} on quiz {}: no active attempt",
                student_id,
                quiz_id
            );
        }
        Ok(updated)
    }

    pub async fn status(&self, student_id: i64, quiz_id: i64) -> Result<AttemptStatus, AppError> {
        let active = self.attempts.find_active_attempt(student_id, quiz_id).await?;
        Ok(AttemptStatus::from(active))
    }

    /// Scores the answers and makes the attempt terminal.
    ///
    /// The active attempt is finalized in place so its start time and mark
    /// snapshot survive. Without an active attempt a terminal one is recorded
    /// on the spot, which is how a re-submission becomes a new attempt.
    pub async fn submit(
        &self,
        student_id: i64,
        quiz_id: i64,
        answers: &[AnswerSubmission],
    ) -> Result<AttemptResult, AppError> {
        self.require_student(student_id).await?;
        let quiz = self.require_quiz(quiz_id).await?;
        let question_bank = self.quizzes.questions_for_quiz(quiz_id).await?;
        let now = Utc::now();

        let attempt = match self.attempts.find_active_attempt(student_id, quiz_id).await? {
            Some(active) => {
                let ScoredSubmission { result, answers } =
                    score(&quiz, &question_bank, answers, active.total_marks);
                let finalization = Finalization {
                    submitted_at: now,
                    score: result,
                    answers,
                };

                self.attempts
                    .finalize_attempt(active.id, &finalization)
                    .await
                    .inspect_err(|e| {
                        if let AppError::StaleSubmission { attempt_id } = e {
                            tracing::info!(
                                "Attempt {} was finalized by a concurrent submit",
                                attempt_id
                            );
                        }
                    })?
            }
            None => {
                tracing::warn!(
                    "Student {} submitted quiz {} without an active attempt; recording a new one",
                    student_id,
                    quiz_id
                );
                let new = NewAttempt::for_quiz(student_id, &quiz, now);
                let ScoredSubmission { result, answers } =
                    score(&quiz, &question_bank, answers, new.total_marks);
                let finalization = Finalization {
                    submitted_at: now,
                    score: result,
                    answers,
                };

                self.attempts
                    .record_submitted_attempt(new, &finalization)
                    .await?
            }
        };

        tracing::info!(
            "Student {} submitted attempt {} on quiz {}: {}/{}",
            student_id,
            attempt.id,
            quiz_id,
            attempt.score_obtained,
            attempt.total_marks
        );

        Ok(AttemptResult::new(attempt, quiz.title))
    }
}
