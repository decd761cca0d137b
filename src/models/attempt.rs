// src/models/attempt.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};

use crate::models::quiz::Quiz;

/// Represents the 'attempts' table in the database.
///
/// One row per attempt instance. A row with `submitted_at = NULL` is the
/// active attempt for its (student, quiz) pair; at most one such row exists.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    pub student_id: i64,
    pub quiz_id: i64,
    pub started_at: DateTime<Utc>,

    /// Last value reported by the client, stored verbatim.
    pub remaining_seconds: i32,

    pub submitted_at: Option<DateTime<Utc>>,
    pub score_obtained: i32,
    pub correct_count: i32,

    /// Copied from the quiz when the attempt is created.
    pub total_marks: i32,

    pub percentage: Option<f64>,
    pub passed: Option<bool>,

    /// Review captured at scoring time. Empty while active.
    pub review: Json<Vec<QuestionReview>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    Active,
    Submitted,
}

impl Attempt {
    pub fn state(&self) -> AttemptState {
        if self.submitted_at.is_some() {
            AttemptState::Submitted
        } else {
            AttemptState::Active
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == AttemptState::Active
    }
}

/// Values for a freshly created attempt row.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub student_id: i64,
    pub quiz_id: i64,
    pub started_at: DateTime<Utc>,
    pub remaining_seconds: i32,
    pub total_marks: i32,
}

impl NewAttempt {
    /// Seeds the timer from the quiz duration and snapshots its mark budget.
    pub fn for_quiz(student_id: i64, quiz: &Quiz, now: DateTime<Utc>) -> Self {
        Self {
            student_id,
            quiz_id: quiz.id,
            started_at: now,
            remaining_seconds: quiz.timer_seconds(),
            total_marks: quiz.total_marks,
        }
    }
}

/// Result of a compare-and-create on the active slot.
#[derive(Debug, Clone)]
pub enum StartOutcome {
    Created(Attempt),
    AlreadyActive(Attempt),
}

impl StartOutcome {
    pub fn into_attempt(self) -> Attempt {
        match self {
            StartOutcome::Created(a) | StartOutcome::AlreadyActive(a) => a,
        }
    }
}

/// Represents the 'submitted_answers' table. Written once at submission.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SubmittedAnswer {
    pub id: i64,
    pub attempt_id: i64,
    pub question_id: Option<i64>,
    /// Raw option text, not an index.
    pub selected_response: String,
}

/// Longest response persisted, in characters (`submitted_answers.selected_response`).
pub const MAX_RESPONSE_CHARS: usize = 500;

/// One answer as sent by the client. Not validated up front: a bad answer
/// costs only its own marks, never the whole submission.
#[derive(Debug, Clone, Deserialize)]
pub struct AnswerSubmission {
    pub question_id: i64,
    pub response: Option<String>,
}

/// DTO for submitting an attempt.
#[derive(Debug, Deserialize)]
pub struct SubmitAttemptRequest {
    pub answers: Vec<AnswerSubmission>,
}

/// DTO for the pause / periodic timer report.
#[derive(Debug, Deserialize)]
pub struct TimerUpdateRequest {
    pub remaining_seconds: i64,
}

/// Per-question review line, frozen at scoring time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionReview {
    pub question_id: i64,
    pub question_text: String,
    pub options: Vec<String>,
    pub selected_answer: String,
    pub correct_answer: String,
    pub is_correct: bool,
    pub marks: i32,
    pub earned_marks: i32,
}

/// Output of the scoring engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub score_obtained: i32,
    pub correct_count: i32,
    pub total_marks: i32,
    pub percentage: f64,
    pub passed: bool,
    pub question_reviews: Vec<QuestionReview>,
}

/// An answer accepted for persistence (its question belongs to the quiz).
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedAnswer {
    pub question_id: i64,
    pub response: String,
}

/// Everything written when an attempt becomes terminal.
#[derive(Debug, Clone)]
pub struct Finalization {
    pub submitted_at: DateTime<Utc>,
    pub score: ScoreResult,
    pub answers: Vec<RecordedAnswer>,
}

/// Full result returned after submission and on result pages.
#[derive(Debug, Serialize, Deserialize)]
pub struct AttemptResult {
    pub id: i64,
    pub quiz_id: i64,
    pub quiz_title: String,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub time_taken_seconds: Option<i64>,
    pub score_obtained: i32,
    pub correct_count: i32,
    pub total_marks: i32,
    pub percentage: f64,
    pub passed: bool,
    pub question_reviews: Vec<QuestionReview>,
}

impl AttemptResult {
    pub fn new(attempt: Attempt, quiz_title: String) -> Self {
        let time_taken_seconds = attempt
            .submitted_at
            .map(|end| (end - attempt.started_at).num_seconds().max(0));

        Self {
            id: attempt.id,
            quiz_id: attempt.quiz_id,
            quiz_title,
            started_at: attempt.started_at,
            submitted_at: attempt.submitted_at,
            time_taken_seconds,
            score_obtained: attempt.score_obtained,
            correct_count: attempt.correct_count,
            total_marks: attempt.total_marks,
            percentage: attempt.percentage.unwrap_or(0.0),
            passed: attempt.passed.unwrap_or(false),
            question_reviews: attempt.review.0,
        }
    }
}

/// Response for the attempt-status check.
#[derive(Debug, Serialize, Deserialize)]
pub struct AttemptStatus {
    pub active: bool,
    pub attempt_id: Option<i64>,
    pub remaining_seconds: Option<i32>,
}

impl From<Option<Attempt>> for AttemptStatus {
    fn from(active: Option<Attempt>) -> Self {
        match active {
            Some(a) => Self {
                active: true,
                attempt_id: Some(a.id),
                remaining_seconds: Some(a.remaining_seconds),
            },
            None => Self {
                active: false,
                attempt_id: None,
                remaining_seconds: None,
            },
        }
    }
}

/// Row for "my attempts" listings, joined with the quiz.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AttemptSummary {
    pub id: i64,
    pub quiz_id: i64,
    pub quiz_title: String,
    pub subject: String,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub score_obtained: i32,
    pub total_marks: i32,
    pub percentage: Option<f64>,
    pub passed: Option<bool>,
}

/// Aggregated leaderboard row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LeaderboardEntry {
    pub rank: i64,
    pub student_id: i64,
    pub username: String,
    pub score: i64,
    pub attempts: i64,
}
