// src/models/quiz.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::error::AppError;

/// Lifecycle status, stored as the Postgres enum `quiz_status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "quiz_status", rename_all = "lowercase")]
#[serde(rename_all = "UPPERCASE")]
pub enum QuizStatus {
    /// Still being edited; students cannot open it.
    #[default]
    Draft,
    Published,
    /// No longer accepting responses.
    Closed,
}

/// Represents the 'quizzes' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,

    /// Instructor who authored the quiz. `None` for public practice quizzes.
    pub owner_id: Option<i64>,

    pub title: String,
    pub description: Option<String>,
    pub subject: String,

    /// Mark budget. Question marks always sum to this after an allocation pass.
    pub total_marks: i32,
    pub passing_marks: Option<i32>,
    pub timer_minutes: i32,

    pub status: QuizStatus,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,

    pub created_at: Option<DateTime<Utc>>,
}

/// Whether students may open a quiz right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Open,
    NotPublished,
    NotStarted,
    Ended,
}

impl Quiz {
    /// Seconds a fresh attempt starts with.
    pub fn timer_seconds(&self) -> i32 {
        self.timer_minutes.saturating_mul(60)
    }

    /// Missing passing marks count as zero.
    pub fn passing_threshold(&self) -> i32 {
        self.passing_marks.unwrap_or(0)
    }

    pub fn availability(&self, now: DateTime<Utc>) -> Availability {
        if self.status != QuizStatus::Published {
            return Availability::NotPublished;
        }
        if self.starts_at.is_some_and(|start| now < start) {
            return Availability::NotStarted;
        }
        if self.ends_at.is_some_and(|end| now > end) {
            return Availability::Ended;
        }
        Availability::Open
    }

    /// Instructors may only manage their own quizzes; admins manage all.
    pub fn ensure_managed_by(&self, user_id: i64, is_admin: bool) -> Result<(), AppError> {
        if is_admin || self.owner_id == Some(user_id) {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "You do not have permission to manage this quiz".to_string(),
            ))
        }
    }
}

/// Quiz metadata plus the number of questions it holds.
#[derive(Debug, Serialize)]
pub struct QuizSummary {
    #[serde(flatten)]
    pub quiz: Quiz,
    pub question_count: usize,
}

/// DTO for creating or updating a quiz.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct QuizDraft {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub subject: String,
    #[validate(range(min = 1, max = 1440))]
    pub timer_minutes: i32,
    #[validate(range(min = 0))]
    pub total_marks: i32,
    #[validate(range(min = 0))]
    pub passing_marks: Option<i32>,
    #[serde(default)]
    pub status: QuizStatus,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl QuizDraft {
    /// Field validation plus the cross-field rules.
    pub fn check(&self) -> Result<(), AppError> {
        if let Err(validation_errors) = self.validate() {
            return Err(AppError::BadRequest(validation_errors.to_string()));
        }
        if self.passing_marks.is_some_and(|p| p > self.total_marks) {
            return Err(AppError::BadRequest(
                "Passing marks cannot exceed total marks".to_string(),
            ));
        }
        if let (Some(start), Some(end)) = (self.starts_at, self.ends_at) {
            if start > end {
                return Err(AppError::BadRequest(
                    "Start date cannot be after end date".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn draft() -> QuizDraft {
        QuizDraft {
            title: "Capitals".to_string(),
            description: None,
            subject: "Geography".to_string(),
            timer_minutes: 10,
            total_marks: 100,
            passing_marks: Some(40),
            status: QuizStatus::Published,
            starts_at: None,
            ends_at: None,
        }
    }

    fn quiz(status: QuizStatus) -> Quiz {
        Quiz {
            id: 1,
            owner_id: Some(9),
            title: "Capitals".to_string(),
            description: None,
            subject: "Geography".to_string(),
            total_marks: 100,
            passing_marks: None,
            timer_minutes: 10,
            status,
            starts_at: None,
            ends_at: None,
            created_at: None,
        }
    }

    #[test]
    fn draft_rejects_passing_above_total() {
        let mut d = draft();
        d.passing_marks = Some(101);
        assert!(matches!(d.check(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn draft_rejects_inverted_window() {
        let mut d = draft();
        let now = Utc::now();
        d.starts_at = Some(now);
        d.ends_at = Some(now - Duration::hours(1));
        assert!(matches!(d.check(), Err(AppError::BadRequest(_))));
        assert!(draft().check().is_ok());
    }

    #[test]
    fn availability_follows_status_and_window() {
        let now = Utc::now();
        assert_eq!(quiz(QuizStatus::Draft).availability(now), Availability::NotPublished);

        let mut q = quiz(QuizStatus::Published);
        assert_eq!(q.availability(now), Availability::Open);

        q.starts_at = Some(now + Duration::minutes(5));
        assert_eq!(q.availability(now), Availability::NotStarted);

        q.starts_at = None;
        q.ends_at = Some(now - Duration::minutes(5));
        assert_eq!(q.availability(now), Availability::Ended);
    }

    #[test]
    fn missing_passing_marks_means_zero() {
        let q = quiz(QuizStatus::Published);
        assert_eq!(q.passing_threshold(), 0);
        assert_eq!(q.timer_seconds(), 600);
    }
}
