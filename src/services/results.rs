// src/services/results.rs

use std::sync::Arc;

use crate::{
    config::DEFAULT_LEADERBOARD_SIZE,
    error::AppError,
    models::attempt::{AttemptResult, AttemptSummary, LeaderboardEntry},
    store::{AttemptStore, QuizRepository},
};

/// Upper bound on leaderboard rows per request.
const MAX_LEADERBOARD_SIZE: i64 = 100;

/// Read side over submitted attempts.
#[derive(Clone)]
pub struct ResultService {
    quizzes: Arc<dyn QuizRepository>,
    attempts: Arc<dyn AttemptStore>,
}

impl ResultService {
    pub fn new(quizzes: Arc<dyn QuizRepository>, attempts: Arc<dyn AttemptStore>) -> Self {
        Self { quizzes, attempts }
    }

    async fn quiz_title(&self, quiz_id: i64) -> Result<String, AppError> {
        Ok(self
            .quizzes
            .get_quiz(quiz_id)
            .await?
            .map(|q| q.title)
            .unwrap_or_default())
    }

    /// The stored review of a submitted attempt. Visible to the student who
    /// took it, to the quiz owner, and to admins.
    pub async fn get_result(
        &self,
        attempt_id: i64,
        requester_id: i64,
        is_admin: bool,
    ) -> Result<AttemptResult, AppError> {
        let attempt = self
            .attempts
            .get_attempt(attempt_id)
            .await?
            .filter(|a| !a.is_active())
            .ok_or_else(|| AppError::NotFound("Result not found".to_string()))?;

        let quiz = self.quizzes.get_quiz(attempt.quiz_id).await?;
        let owns_quiz = quiz
            .as_ref()
            .is_some_and(|q| q.owner_id == Some(requester_id));

        if attempt.student_id != requester_id && !owns_quiz && !is_admin {
            return Err(AppError::Forbidden(
                "You do not have permission to view this result".to_string(),
            ));
        }

        let title = quiz.map(|q| q.title).unwrap_or_default();
        Ok(AttemptResult::new(attempt, title))
    }

    pub async fn latest_result(
        &self,
        student_id: i64,
        quiz_id: i64,
    ) -> Result<AttemptResult, AppError> {
        let attempt = self
            .attempts
            .latest_submitted(student_id, quiz_id)
            .await?
            .ok_or_else(|| AppError::NotFound("No submitted attempt for this quiz".to_string()))?;

        let title = self.quiz_title(quiz_id).await?;
        Ok(AttemptResult::new(attempt, title))
    }

    pub async fn list_attempts(&self, student_id: i64) -> Result<Vec<AttemptSummary>, AppError> {
        self.attempts.list_attempts(student_id).await
    }

    /// Submitted attempts that lost at least one mark.
    pub async fn mistakes(&self, student_id: i64) -> Result<Vec<AttemptSummary>, AppError> {
        let attempts = self.attempts.list_attempts(student_id).await?;
        Ok(attempts
            .into_iter()
            .filter(|a| a.score_obtained < a.total_marks)
            .collect())
    }

    pub async fn leaderboard(&self, limit: Option<i64>) -> Result<Vec<LeaderboardEntry>, AppError> {
        let limit = limit
            .unwrap_or(DEFAULT_LEADERBOARD_SIZE)
            .clamp(1, MAX_LEADERBOARD_SIZE);
        self.attempts.leaderboard(limit).await
    }
}
