// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

use crate::error::AppError;

/// Options every question carries.
pub const OPTION_COUNT: usize = 4;

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    /// Owning quiz. Deleting the quiz deletes its questions.
    pub quiz_id: i64,

    /// The text content of the question.
    pub content: String,

    /// The four options, stored as a JSON array.
    pub options: Json<Vec<String>>,

    /// Text of the correct option (by value, not index).
    pub answer: String,

    /// Marks assigned by the allocator.
    pub marks: i32,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Question {
    pub fn accepts(&self, response: &str) -> bool {
        answers_match(response, &self.answer)
    }
}

/// Trimmed, case-insensitive comparison of two option texts.
pub fn answers_match(given: &str, expected: &str) -> bool {
    given.trim().to_lowercase() == expected.trim().to_lowercase()
}

/// DTO for sending question to a student (excludes the answer).
#[derive(Debug, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub content: String,
    pub options: Json<Vec<String>>,
    pub marks: i32,
}

impl From<Question> for PublicQuestion {
    fn from(q: Question) -> Self {
        Self {
            id: q.id,
            content: q.content,
            options: q.options,
            marks: q.marks,
        }
    }
}

/// DTO for authoring a question. Marks are never supplied by the author;
/// the allocator assigns them.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct QuestionDraft {
    #[validate(length(min = 1, max = 1000))]
    pub content: String,
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,
    #[validate(length(min = 1, max = 500))]
    pub answer: String,
}

impl QuestionDraft {
    pub fn check(&self) -> Result<(), AppError> {
        if let Err(validation_errors) = self.validate() {
            return Err(AppError::BadRequest(validation_errors.to_string()));
        }
        if !self.options.iter().any(|opt| answers_match(opt, &self.answer)) {
            return Err(AppError::BadRequest(format!(
                "Answer '{}' is not one of the options",
                self.answer
            )));
        }
        Ok(())
    }
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    if options.len() != OPTION_COUNT {
        return Err(validator::ValidationError::new("exactly_four_options"));
    }
    for opt in options {
        if opt.trim().is_empty() {
            return Err(validator::ValidationError::new("option_cannot_be_empty"));
        }
        if opt.len() > 500 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}

/// DTO for editing a question. Omitted fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuestionEdit {
    pub content: Option<String>,
    pub options: Option<Vec<String>>,
    pub answer: Option<String>,
}

impl QuestionEdit {
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.options.is_none() && self.answer.is_none()
    }

    /// The edited question as a full draft, validated like a new one.
    pub fn apply_to(&self, current: &Question) -> Result<QuestionDraft, AppError> {
        let draft = QuestionDraft {
            content: self.content.clone().unwrap_or_else(|| current.content.clone()),
            options: self.options.clone().unwrap_or_else(|| current.options.0.clone()),
            answer: self.answer.clone().unwrap_or_else(|| current.answer.clone()),
        };
        draft.check()?;
        Ok(draft)
    }
}

/// Request body carrying a batch of drafts.
#[derive(Debug, Deserialize)]
pub struct QuestionBatchRequest {
    pub questions: Vec<QuestionDraft>,
}

impl QuestionBatchRequest {
    pub fn check(&self) -> Result<(), AppError> {
        self.questions.iter().try_for_each(QuestionDraft::check)
    }
}

/// Which questions a mark allocation pass covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkTarget {
    /// Every question of the quiz, in creation order.
    All,
    /// Only the listed questions, in the listed order.
    Questions(Vec<i64>),
}

/// DTO for an explicit allocation request. Omitting `question_ids`
/// reallocates the whole quiz.
#[derive(Debug, Deserialize)]
pub struct AllocateMarksRequest {
    pub total_marks: i32,
    pub question_ids: Option<Vec<i64>>,
}

impl AllocateMarksRequest {
    pub fn target(&self) -> MarkTarget {
        match &self.question_ids {
            Some(ids) => MarkTarget::Questions(ids.clone()),
            None => MarkTarget::All,
        }
    }
}
