// src/services/scoring.rs

use std::collections::{HashMap, HashSet};

use crate::models::{
    attempt::{AnswerSubmission, MAX_RESPONSE_CHARS, QuestionReview, RecordedAnswer, ScoreResult},
    question::Question,
    quiz::Quiz,
};

/// A scored submission: the result plus the answers worth persisting.
#[derive(Debug, Clone)]
pub struct ScoredSubmission {
    pub result: ScoreResult,
    pub answers: Vec<RecordedAnswer>,
}

/// Percentage of `total`, rounded half-up to one decimal place.
/// A zero (or negative) total yields 0.
pub fn percentage(score: i32, total: i32) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    let score = i64::from(score.max(0));
    let total = i64::from(total);
    // tenths of a percent, rounded half-up in integer arithmetic
    let tenths = (score * 2000 + total) / (2 * total);
    tenths as f64 / 10.0
}

/// Scores `answers` against the quiz's question bank.
///
/// * Answers referencing questions outside the bank are ignored.
/// * A repeated question id only counts the first time it appears.
/// * A response longer than `MAX_RESPONSE_CHARS` is wrong and is kept
///   truncated to that length.
/// * Marks come from each question's current `marks`; the percentage is
///   taken against `total_marks_snapshot` (the attempt's copy).
/// * The review captures option and answer text now, so later edits to the
///   bank never change it.
pub fn score(
    quiz: &Quiz,
    question_bank: &[Question],
    answers: &[AnswerSubmission],
    total_marks_snapshot: i32,
) -> ScoredSubmission {
    let bank: HashMap<i64, &Question> = question_bank
        .iter()
        .filter(|q| q.quiz_id == quiz.id)
        .map(|q| (q.id, q))
        .collect();

    let mut seen = HashSet::new();
    let mut reviews = Vec::new();
    let mut recorded = Vec::new();
    let mut score_obtained = 0;
    let mut correct_count = 0;

    for answer in answers {
        let Some(question) = bank.get(&answer.question_id) else {
            continue;
        };
        if !seen.insert(question.id) {
            continue;
        }

        let response = answer.response.as_deref();
        let overlong = response.is_some_and(|r| r.chars().count() > MAX_RESPONSE_CHARS);
        let is_correct = !overlong && response.is_some_and(|r| question.accepts(r));
        let selected: String = response
            .unwrap_or_default()
            .chars()
            .take(MAX_RESPONSE_CHARS)
            .collect();
        let earned = if is_correct { question.marks } else { 0 };

        if is_correct {
            correct_count += 1;
            score_obtained += question.marks;
        }

        reviews.push(QuestionReview {
            question_id: question.id,
            question_text: question.content.clone(),
            options: question.options.0.clone(),
            selected_answer: selected.clone(),
            correct_answer: question.answer.clone(),
            is_correct,
            marks: question.marks,
            earned_marks: earned,
        });
        recorded.push(RecordedAnswer {
            question_id: question.id,
            response: selected,
        });
    }

    ScoredSubmission {
        result: ScoreResult {
            score_obtained,
            correct_count,
            total_marks: total_marks_snapshot,
            percentage: percentage(score_obtained, total_marks_snapshot),
            passed: score_obtained >= quiz.passing_threshold(),
            question_reviews: reviews,
        },
        answers: recorded,
    }
}
